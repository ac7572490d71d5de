//! Cache statistics

use serde::{Deserialize, Serialize};

/// Snapshot of cache occupancy, taken from the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of indexed entries
    pub entries: u64,

    /// Sum of audio sizes in bytes
    pub total_bytes: u64,

    /// Configured budget; 0 means unlimited
    pub max_size_bytes: u64,
}

impl CacheStats {
    /// Usage as a percentage of the budget; 0 when unlimited.
    pub fn usage_percentage(&self) -> f64 {
        if self.max_size_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.max_size_bytes as f64) * 100.0
    }

    /// True when the next eviction pass would remove something.
    pub fn is_over_budget(&self) -> bool {
        self.max_size_bytes > 0 && self.total_bytes > self.max_size_bytes
    }
}
