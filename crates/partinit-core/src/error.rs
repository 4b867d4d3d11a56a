//! Partition table error types

use thiserror::Error;

/// The main error type for table initialization
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error against the image or an auxiliary input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing, conflicting or malformed option
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Option is well-formed but its value cannot be used
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed identifier string
    #[error("Parse error: {0}")]
    Parse(String),

    /// Sector range outside the device
    #[error("LBA range {lba}+{count} is outside the device ({size} sectors)")]
    OutOfRange { lba: u64, count: u64, size: u64 },

    /// Operation not permitted in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// On-disk structure does not describe a valid table
    #[error("Invalid table: {0}")]
    InvalidTable(String),

    /// Checksum verification failed
    #[error("Checksum verification failed: {0}")]
    ChecksumVerification(String),
}

/// Result type alias for table operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    /// Create an invalid table error
    pub fn invalid_table(msg: impl Into<String>) -> Self {
        Error::InvalidTable(msg.into())
    }

    /// True for errors raised before anything touched the device
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::Validation(_) | Error::Parse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message() {
        let err = Error::OutOfRange { lba: 10, count: 2, size: 11 };
        assert_eq!(
            err.to_string(),
            "LBA range 10+2 is outside the device (11 sectors)"
        );
    }

    #[test]
    fn test_fail_fast_classification() {
        assert!(Error::configuration("x").is_fail_fast());
        assert!(Error::validation("x").is_fail_fast());
        assert!(Error::parse("x").is_fail_fast());
        assert!(!Error::invalid_table("x").is_fail_fast());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert!(!Error::from(io).is_fail_fast());
    }
}
