//! Typed wrapper for operations whose failure must not abort the caller.

use crate::error::{CacheError, Result};
use tracing::warn;

/// Outcome of a best-effort operation.
///
/// The caller has to either [`log`](BestEffort::log) it or inspect it; a
/// silently dropped failure is a compile-time warning.
#[must_use = "best-effort results must be logged or inspected"]
#[derive(Debug)]
pub struct BestEffort<T> {
    action: &'static str,
    result: Result<T>,
}

impl<T> BestEffort<T> {
    pub fn new(action: &'static str, result: Result<T>) -> Self {
        Self { action, result }
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Warn on failure and continue.
    pub fn log(self) -> Option<T> {
        match self.result {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(action = self.action, error = %error, "Best-effort operation failed");
                None
            }
        }
    }

    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

impl BestEffort<()> {
    /// Collapse the failures of a multi-step cleanup into one outcome.
    pub fn from_failures(action: &'static str, failures: Vec<String>) -> Self {
        if failures.is_empty() {
            Self::new(action, Ok(()))
        } else {
            Self::new(action, Err(CacheError::Cleanup(failures.join("; "))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_yields_value_on_success() {
        let outcome = BestEffort::new("probe", Ok(7));
        assert!(outcome.is_ok());
        assert_eq!(outcome.log(), Some(7));
    }

    #[test]
    fn test_log_swallows_failure() {
        let outcome: BestEffort<u8> =
            BestEffort::new("touch", Err(CacheError::Internal("boom".to_string())));
        assert!(!outcome.is_ok());
        assert_eq!(outcome.action(), "touch");
        assert_eq!(outcome.log(), None);
    }

    #[test]
    fn test_from_failures() {
        assert!(BestEffort::from_failures("remove", Vec::new()).is_ok());

        let outcome = BestEffort::from_failures(
            "remove",
            vec!["folder: denied".to_string(), "index: locked".to_string()],
        );
        let message = outcome.into_result().unwrap_err().to_string();
        assert!(message.contains("folder: denied; index: locked"));
    }
}
