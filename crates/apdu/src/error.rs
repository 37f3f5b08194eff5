//! Error types for APDU parsing

/// Error for APDU response processing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    /// Incomplete response (less than 2 bytes)
    #[error("Incomplete response")]
    Incomplete,

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(&'static str),
}
