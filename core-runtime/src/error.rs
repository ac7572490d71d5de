use thiserror::Error;

/// Startup failures: bad environment values or a subscriber that could not
/// be installed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{key} has invalid value '{value}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_the_variable() {
        let err = Error::InvalidValue {
            key: "PORT".into(),
            value: "eighty".into(),
            reason: "invalid digit found in string".into(),
        };
        assert_eq!(
            err.to_string(),
            "PORT has invalid value 'eighty': invalid digit found in string"
        );
    }
}
