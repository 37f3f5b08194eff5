//! APDU command definitions
//!
//! This module provides the short-form command APDU type according to
//! ISO/IEC 7816-4: `CLA INS P1 P2 [Lc data] [Le]`, with one-byte length
//! fields. Payloads longer than 255 bytes would require the extended
//! encoding, which this stack does not produce; such commands are flagged
//! by [`Command::is_extended`] and rejected before any transfer.

use bytes::{BufMut, Bytes, BytesMut};

/// Generic short-form APDU command structure
///
/// An expected length (`le`) of 0 encodes "up to 256 bytes expected", per
/// the short-form convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<u8>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Whether this command cannot be expressed in the short encoding
    ///
    /// True whenever the payload length does not fit a single Lc byte.
    pub fn is_extended(&self) -> bool {
        self.data.as_ref().is_some_and(|data| data.len() > 255)
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        // Header (CLA, INS, P1, P2) is always 4 bytes
        let mut length = 4;

        if let Some(data) = &self.data {
            length += 1 + data.len();
        }

        if self.le.is_some() {
            length += 1;
        }

        length
    }

    /// Convert to raw APDU bytes
    ///
    /// Lc is emitted only when a payload is present, Le only when an
    /// expected length was given. Callers must reject extended commands
    /// before serializing; a payload longer than 255 bytes cannot be
    /// represented here.
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        // Add Lc and data if present
        if let Some(data) = &self.data {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        // Add Le if present
        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }
}
