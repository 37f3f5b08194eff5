//! Belgian eID card access over USB CCID
//!
//! This crate is the application layer of the stack: it drives a generic
//! chip-card reader through [`beid_ccid`] and speaks the eID card's own
//! protocol on top — file selection by fixed path, chunked READ BINARY
//! with the wrong-length end-of-file convention, the tag-delimited
//! identity record, and PIN verification.
//!
//! ## Overview
//!
//! - [`EidCard`] — lifecycle (`init`/`exit`), slot events, file access and
//!   the derived accessors (identity, address, photo, certificates)
//! - [`EidFile`] — the static table of logical files and their 6-byte
//!   path selectors
//! - [`IdentityRecord`] — the decoded identity file
//! - [`PinBlock`] / [`PinVerification`] — VERIFY payload encoding and its
//!   typed outcome
//!
//! Card-side cryptography (signing, certificate validation) is out of
//! scope; certificates are fetched as opaque bytes.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod card;
pub mod files;
pub mod identity;
pub mod pin;

mod error;
pub use error::{Error, Result};

pub use card::{CardData, EidCard};
pub use files::{CertKind, EidFile};
pub use identity::IdentityRecord;
pub use pin::{PinBlock, PinVerification};

// Re-export the layers below for convenience
pub use beid_apdu::StatusWord;
pub use beid_ccid::{SlotEvent, TransportError, UsbDevice};
