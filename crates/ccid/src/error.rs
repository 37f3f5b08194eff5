//! Core error type for CCID operations
//!
//! All error variants are consolidated here to simplify error handling and
//! facilitate better error bubbling up through the call stack.

use crate::transport::TransportError;

/// Result type for CCID operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    //
    // Initialization errors
    //
    /// No CCID class descriptor in the configuration descriptor
    #[error("No CCID descriptor found")]
    DescriptorNotFound,

    /// The device's exchange level supports neither short nor extended APDUs
    #[error("Device not supported: exchange level {0:#04x}")]
    UnsupportedDevice(u8),

    /// No suitable smart card interface on the device
    #[error("No smart card interface found")]
    NoInterfaceFound,

    //
    // Protocol errors
    //
    /// A message's leading type byte did not match the expected kind
    ///
    /// This indicates protocol desynchronization and is not retried.
    #[error("Invalid message type: expected {expected:#04x}, got {actual:#04x}")]
    InvalidMessageType {
        /// The type byte the caller was waiting for
        expected: u8,
        /// The type byte actually received
        actual: u8,
    },

    /// A message was shorter than its fixed layout requires
    #[error("Message too short: got {actual} bytes, need {expected}")]
    MessageTooShort {
        /// Minimum length of the expected layout
        expected: usize,
        /// Length actually received
        actual: usize,
    },

    /// The response sequence number did not echo the request's
    #[error("Sequence mismatch: sent {sent}, response carries {received}")]
    SequenceMismatch {
        /// Sequence number assigned to the request
        sent: u8,
        /// Sequence number found in the response
        received: u8,
    },

    /// The command APDU requires the extended encoding
    ///
    /// Rejected before any transfer is issued; this stack is short-form
    /// only by contract.
    #[error("Extended APDU not supported: {0} byte payload")]
    ExtendedApduUnsupported(usize),

    /// Too many consecutive interrupt poll failures
    #[error("Slot monitor degraded after {0} consecutive poll failures")]
    SlotMonitorDegraded(u32),

    //
    // Wrapped errors
    //
    /// APDU response errors
    #[error(transparent)]
    Response(#[from] beid_apdu::ResponseError),

    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),
}
