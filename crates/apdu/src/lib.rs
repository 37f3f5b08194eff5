//! Short-form APDU command and response types
//!
//! This crate provides the types for building ISO/IEC 7816-4 command APDUs
//! and decoding response APDUs, limited by contract to the short encoding
//! (one-byte length fields, payloads of at most 255 bytes).
//!
//! ## Overview
//!
//! APDU (Application Protocol Data Unit) is the command/response unit
//! understood by a smart card. This crate provides:
//!
//! - [`Command`] — a short-form command APDU with builder constructors
//! - [`Response`] — response data plus the trailing status word
//! - [`StatusWord`] — SW1/SW2 interpretation helpers
//!
//! Extended-length encoding is detected (via [`Command::is_extended`]) but
//! never produced; rejecting extended commands is the transport's job.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod status;

mod error;
pub use error::ResponseError;

pub use command::Command;
pub use response::Response;
pub use status::StatusWord;

#[cfg(test)]
mod tests {
    use super::*;

    // Test the basic types are re-exported correctly
    #[test]
    fn test_reexports() {
        let cmd = Command::new(0x00, 0xA4, 0x04, 0x00);
        assert_eq!(cmd.cla, 0x00);
        assert_eq!(cmd.ins, 0xA4);

        let resp = Response::new(Bytes::from_static(&[0x01, 0x02]), (0x90, 0x00));
        assert!(resp.is_success());
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
    }
}
