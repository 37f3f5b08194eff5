//! USB CCID (chip card interface device) protocol stack
//!
//! This crate turns the raw USB transfers of a generic chip-card reader
//! into structured smart-card exchanges, without a card-specific driver:
//!
//! - [`transport`] — the capability contract an implementation of the USB
//!   device must provide (control/bulk/interrupt transfers, interface
//!   ownership)
//! - [`descriptor`] — discovery and parsing of the CCID class descriptor
//! - [`message`] — the CCID command/response wire framing
//! - [`session`] — bulk command/response round trips and the sequence
//!   counter, the single point of bulk-pipe access
//! - [`monitor`] — interrupt-endpoint polling turned into slot
//!   insertion/removal events
//!
//! The stack is short-APDU only by contract: extended commands are
//! detected and rejected before any transfer is issued.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod descriptor;
pub mod message;
pub mod monitor;
pub mod session;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use descriptor::CcidDescriptor;
pub use message::{CcidCommand, CcidResponse, DataBlock, NotifySlotChange, Parameters};
pub use monitor::{SlotEvent, SlotMonitor};
pub use session::{CcidSession, Endpoints};
pub use transport::{ControlSetup, TransportError, UsbDevice};
