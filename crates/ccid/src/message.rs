//! CCID message framing
//!
//! Every CCID exchange is a 10-byte header, optionally followed by payload
//! bytes:
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Message type
//! 1       4     Payload length (little-endian)
//! 5       1     Slot number
//! 6       1     Sequence number
//! 7       1     Type-specific parameter
//! 8       2     Type-specific parameters / reserved
//! 10      N     Payload
//! ```
//!
//! Outgoing commands are modeled by [`CcidCommand`] and serialized here;
//! incoming messages are modeled by [`CcidResponse`] and decoded by an
//! exhaustive match on the leading type byte.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Length of the fixed CCID message header
pub const CCID_HEADER_LEN: usize = 10;

/// Maximum length of an RDR_to_PC_Parameters message
pub const PARAMETERS_MAX_LEN: usize = 17;

/// Maximum length of an RDR_to_PC_DataBlock carrying a short-form response
/// (header plus 255 data bytes plus the status word)
pub const DATA_BLOCK_MAX_LEN: usize = CCID_HEADER_LEN + 255 + 2;

/// Message type bytes, PC to reader
pub mod command_type {
    /// PC_to_RDR_IccPowerOn
    pub const ICC_POWER_ON: u8 = 0x62;
    /// PC_to_RDR_GetParameters
    pub const GET_PARAMETERS: u8 = 0x6C;
    /// PC_to_RDR_XfrBlock
    pub const XFR_BLOCK: u8 = 0x6F;
}

/// Message type bytes, reader to PC
pub mod response_type {
    /// RDR_to_PC_NotifySlotChange (interrupt endpoint)
    pub const NOTIFY_SLOT_CHANGE: u8 = 0x50;
    /// RDR_to_PC_HardwareError (interrupt endpoint)
    pub const HARDWARE_ERROR: u8 = 0x51;
    /// RDR_to_PC_DataBlock
    pub const DATA_BLOCK: u8 = 0x80;
    /// RDR_to_PC_Parameters
    pub const PARAMETERS: u8 = 0x82;
}

/// Block waiting time integer forwarded with every XfrBlock
const XFR_BLOCK_BWI: u8 = 10;

/// Power select parameter of IccPowerOn: automatic voltage selection
const POWER_SELECT_AUTOMATIC: u8 = 0x00;

/// Outgoing CCID command message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CcidCommand {
    /// Request the slot's protocol parameters
    GetParameters {
        /// Target slot
        slot: u8,
    },
    /// Power the card up, automatic voltage selection
    IccPowerOn {
        /// Target slot
        slot: u8,
    },
    /// Forward a command APDU to the card
    XfrBlock {
        /// Target slot
        slot: u8,
        /// Serialized command APDU
        apdu: Bytes,
    },
}

impl CcidCommand {
    /// Message type byte of this command
    pub const fn message_type(&self) -> u8 {
        match self {
            Self::GetParameters { .. } => command_type::GET_PARAMETERS,
            Self::IccPowerOn { .. } => command_type::ICC_POWER_ON,
            Self::XfrBlock { .. } => command_type::XFR_BLOCK,
        }
    }

    /// Serialize to the wire format, stamping the given sequence number
    pub fn serialize(&self, seq: u8) -> Bytes {
        let (slot, param, payload): (u8, u8, &[u8]) = match self {
            Self::GetParameters { slot } => (*slot, 0x00, &[]),
            Self::IccPowerOn { slot } => (*slot, POWER_SELECT_AUTOMATIC, &[]),
            Self::XfrBlock { slot, apdu } => (*slot, XFR_BLOCK_BWI, apdu.as_ref()),
        };

        let mut buffer = BytesMut::with_capacity(CCID_HEADER_LEN + payload.len());
        buffer.put_u8(self.message_type());
        buffer.put_u32_le(payload.len() as u32);
        buffer.put_u8(slot);
        buffer.put_u8(seq);
        buffer.put_u8(param);
        // wLevelParameter for XfrBlock (0 = APDU begins and ends here),
        // reserved for the other commands
        buffer.put_u16_le(0x0000);
        buffer.put_slice(payload);
        buffer.freeze()
    }
}

/// Incoming CCID message (bulk response or interrupt notification)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CcidResponse {
    /// Slot state change notification
    NotifySlotChange(NotifySlotChange),
    /// Hardware error notification
    HardwareError(HardwareError),
    /// Data block carrying a response APDU or an ATR
    DataBlock(DataBlock),
    /// Protocol parameters
    Parameters(Parameters),
}

impl CcidResponse {
    /// Decode an incoming message by its leading type byte
    ///
    /// Unrecognized types yield `None`, not an error: interrupt traffic may
    /// carry message kinds this stack does not act on.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        let Some(&message_type) = data.first() else {
            return Ok(None);
        };

        match message_type {
            response_type::NOTIFY_SLOT_CHANGE => {
                Ok(Some(Self::NotifySlotChange(NotifySlotChange::parse(data)?)))
            }
            response_type::HARDWARE_ERROR => {
                Ok(Some(Self::HardwareError(HardwareError::parse(data)?)))
            }
            response_type::DATA_BLOCK => Ok(Some(Self::DataBlock(DataBlock::parse(data)?))),
            response_type::PARAMETERS => Ok(Some(Self::Parameters(Parameters::parse(data)?))),
            _ => Ok(None),
        }
    }
}

/// RDR_to_PC_NotifySlotChange: bit-packed slot state vector
///
/// For slot `i`, bit `2i` is "card present" and bit `2i+1` is "state
/// changed since the last notification".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySlotChange {
    slot_state: Bytes,
}

impl NotifySlotChange {
    /// Parse a notification, validating the type byte
    pub fn parse(data: &[u8]) -> Result<Self> {
        expect_type(data, response_type::NOTIFY_SLOT_CHANGE)?;
        Ok(Self {
            slot_state: Bytes::copy_from_slice(&data[1..]),
        })
    }

    /// Whether a card is present in the slot
    pub fn present(&self, slot: u8) -> bool {
        self.bit(2 * slot as usize)
    }

    /// Whether the slot's state changed since the last notification
    pub fn changed(&self, slot: u8) -> bool {
        self.bit(2 * slot as usize + 1)
    }

    fn bit(&self, index: usize) -> bool {
        self.slot_state
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }
}

/// RDR_to_PC_HardwareError notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareError {
    /// Slot the error occurred on
    pub slot: u8,
    /// Sequence number of the command the error aborted
    pub seq: u8,
    /// Hardware error code
    pub code: u8,
}

impl HardwareError {
    /// Parse a hardware error notification, validating the type byte
    pub fn parse(data: &[u8]) -> Result<Self> {
        expect_type(data, response_type::HARDWARE_ERROR)?;
        check_len(data, 4)?;
        Ok(Self {
            slot: data[1],
            seq: data[2],
            code: data[3],
        })
    }
}

/// RDR_to_PC_DataBlock: response APDU bytes or an ATR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    /// Slot the block came from
    pub slot: u8,
    /// Echoed sequence number
    pub seq: u8,
    /// Slot status register
    pub status: u8,
    /// Slot error register
    pub error: u8,
    /// Chain parameter
    pub chain_parameter: u8,
    /// Payload bytes (response APDU including status word, or ATR)
    pub data: Bytes,
}

impl DataBlock {
    /// Parse a data block, validating the type byte
    pub fn parse(data: &[u8]) -> Result<Self> {
        expect_type(data, response_type::DATA_BLOCK)?;
        check_len(data, CCID_HEADER_LEN)?;

        let declared = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
        let end = (CCID_HEADER_LEN + declared).min(data.len());

        Ok(Self {
            slot: data[5],
            seq: data[6],
            status: data[7],
            error: data[8],
            chain_parameter: data[9],
            data: Bytes::copy_from_slice(&data[CCID_HEADER_LEN..end]),
        })
    }
}

/// Protocol-specific tail of an RDR_to_PC_Parameters message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolParameters {
    /// T=0 parameters
    T0 {
        /// Fi/Di clock rate and baud rate conversion indices
        findex_dindex: u8,
        /// TCCKS convention byte
        tccks: u8,
        /// Extra guard time
        guard_time: u8,
        /// Waiting integer
        waiting_integer: u8,
        /// Clock stop support
        clock_stop: u8,
    },
    /// T=1 parameters
    T1 {
        /// Fi/Di clock rate and baud rate conversion indices
        findex_dindex: u8,
        /// TCCKS convention byte
        tccks: u8,
        /// Extra guard time
        guard_time: u8,
        /// Waiting integers (BWI/CWI)
        waiting_integer: u8,
        /// Clock stop support
        clock_stop: u8,
        /// Maximum information field size for the card
        ifsc: u8,
        /// NAD value
        nad: u8,
    },
    /// Unrecognized protocol number; tail left undecoded
    Unknown(u8),
}

/// RDR_to_PC_Parameters message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    /// Slot the parameters describe
    pub slot: u8,
    /// Echoed sequence number
    pub seq: u8,
    /// Slot status register
    pub status: u8,
    /// Slot error register
    pub error: u8,
    /// Protocol-specific parameters
    pub protocol: ProtocolParameters,
}

impl Parameters {
    /// Parse a parameters message, validating the type byte
    ///
    /// The tail layout is selected by the protocol number byte; numbers
    /// other than T=0 and T=1 leave the tail undecoded, which is not an
    /// error (callers only rely on the common prefix).
    pub fn parse(data: &[u8]) -> Result<Self> {
        expect_type(data, response_type::PARAMETERS)?;
        check_len(data, CCID_HEADER_LEN)?;

        let protocol_number = data[9];
        let protocol = match protocol_number {
            0 => {
                check_len(data, 15)?;
                ProtocolParameters::T0 {
                    findex_dindex: data[10],
                    tccks: data[11],
                    guard_time: data[12],
                    waiting_integer: data[13],
                    clock_stop: data[14],
                }
            }
            1 => {
                check_len(data, 17)?;
                ProtocolParameters::T1 {
                    findex_dindex: data[10],
                    tccks: data[11],
                    guard_time: data[12],
                    waiting_integer: data[13],
                    clock_stop: data[14],
                    ifsc: data[15],
                    nad: data[16],
                }
            }
            other => ProtocolParameters::Unknown(other),
        };

        Ok(Self {
            slot: data[5],
            seq: data[6],
            status: data[7],
            error: data[8],
            protocol,
        })
    }
}

fn expect_type(data: &[u8], expected: u8) -> Result<()> {
    let actual = *data.first().ok_or(Error::MessageTooShort {
        expected: 1,
        actual: 0,
    })?;
    if actual != expected {
        return Err(Error::InvalidMessageType { expected, actual });
    }
    Ok(())
}

fn check_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(Error::MessageTooShort {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
