//! Error type for eID card operations

use beid_apdu::StatusWord;

/// Result type for eID card operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for eID card operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// CCID and transport errors
    #[error(transparent)]
    Ccid(#[from] beid_ccid::Error),

    /// APDU response errors
    #[error(transparent)]
    Response(#[from] beid_apdu::ResponseError),

    /// Operation attempted with no active card
    #[error("No card inserted")]
    NoCardInserted,

    /// Logical path not in the card's file table
    #[error("File not found: {0}")]
    UnknownFile(String),

    /// SELECT returned a non-success status word
    #[error("Failed to select file: status {0}")]
    FileSelectFailed(StatusWord),

    /// READ BINARY returned a non-success status word
    #[error("Failed to read file: status {0}")]
    FileReadFailed(StatusWord),

    /// The card kept producing full chunks past the offset space
    #[error("File exceeds the {0} byte limit")]
    FileTooLarge(usize),

    /// GET CARD DATA returned a non-success status word
    #[error("Failed to fetch card data: status {0}")]
    CardDataFailed(StatusWord),

    /// A delimiter pair was missing from the identity file
    #[error("Identity field {0:#04x} missing")]
    IdentityFieldMissing(u8),

    /// The PIN could not be encoded
    #[error("Invalid PIN: {0}")]
    InvalidPin(&'static str),

    /// VERIFY failed outright (not a tries-remaining warning)
    #[error("PIN verification failed: status {0}")]
    PinVerifyFailed(StatusWord),
}
