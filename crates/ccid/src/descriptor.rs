//! CCID class descriptor discovery and parsing
//!
//! The class-specific descriptor (type 0x21) is embedded in the device's
//! configuration descriptor as one of its length-prefixed records. It is
//! fetched and parsed once per session; everything in it is immutable for
//! the session's lifetime.

use crate::error::{Error, Result};

/// Descriptor type byte of the CCID class-specific functional descriptor
pub const CCID_DESCRIPTOR_TYPE: u8 = 0x21;

/// Size of the fixed CCID class descriptor layout
pub const CCID_DESCRIPTOR_LEN: usize = 54;

/// Exchange level: short APDUs (bits 16-23 of `features`)
pub const EXCHANGE_SHORT_APDU: u8 = 0x02;

/// Exchange level: short and extended APDUs (bits 16-23 of `features`)
pub const EXCHANGE_EXTENDED_APDU: u8 = 0x04;

/// Parsed CCID class descriptor
///
/// Multi-byte fields are little-endian on the wire, except `lcd_layout`
/// which is big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcidDescriptor {
    /// CCID specification release number (bcdCCID)
    pub ccid_version: u16,
    /// Index of the highest available slot
    pub max_slot_index: u8,
    /// Supported voltages bitmask
    pub voltage_support: u8,
    /// Supported protocols bitmask (T=0 / T=1)
    pub protocols: u32,
    /// Default ICC clock frequency in kHz
    pub default_clock: u32,
    /// Maximum supported ICC clock frequency in kHz
    pub maximum_clock: u32,
    /// Number of clock frequencies supported
    pub num_clocks_supported: u8,
    /// Default ICC I/O data rate in bps
    pub data_rate: u32,
    /// Maximum supported ICC I/O data rate in bps
    pub max_data_rate: u32,
    /// Number of data rates supported
    pub num_data_rates_supported: u8,
    /// Maximum IFSD supported for T=1
    pub max_ifsd: u32,
    /// Supported synchronous protocols bitmask
    pub synch_protocols: u32,
    /// Mechanical characteristics bitmask
    pub mechanical: u32,
    /// Intelligent features bitmask
    pub features: u32,
    /// Maximum CCID message length, header included
    pub max_message_length: u32,
    /// Class value for GET RESPONSE echoing
    pub class_get_response: u8,
    /// Class value for ENVELOPE echoing
    pub class_envelope: u8,
    /// LCD layout (big-endian on the wire)
    pub lcd_layout: u16,
    /// PIN support bitmask
    pub pin_support: u8,
    /// Maximum number of simultaneously busy slots
    pub max_busy_slots: u8,
}

impl CcidDescriptor {
    /// Parse the fixed 54-byte CCID class descriptor layout
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CCID_DESCRIPTOR_LEN {
            return Err(Error::MessageTooShort {
                expected: CCID_DESCRIPTOR_LEN,
                actual: data.len(),
            });
        }
        if data[1] != CCID_DESCRIPTOR_TYPE {
            return Err(Error::InvalidMessageType {
                expected: CCID_DESCRIPTOR_TYPE,
                actual: data[1],
            });
        }

        Ok(Self {
            ccid_version: le16(data, 2),
            max_slot_index: data[4],
            voltage_support: data[5],
            protocols: le32(data, 6),
            default_clock: le32(data, 10),
            maximum_clock: le32(data, 14),
            num_clocks_supported: data[18],
            data_rate: le32(data, 19),
            max_data_rate: le32(data, 23),
            num_data_rates_supported: data[27],
            max_ifsd: le32(data, 28),
            synch_protocols: le32(data, 32),
            mechanical: le32(data, 36),
            features: le32(data, 40),
            max_message_length: le32(data, 44),
            class_get_response: data[48],
            class_envelope: data[49],
            lcd_layout: be16(data, 50),
            pin_support: data[52],
            max_busy_slots: data[53],
        })
    }

    /// Exchange level of the device (bits 16-23 of `features`)
    pub const fn exchange_level(&self) -> u8 {
        ((self.features >> 16) & 0xFF) as u8
    }

    /// Whether the device exchanges whole APDUs (short or extended form)
    ///
    /// Character- and TPDU-level devices would require the host to run the
    /// card protocol itself, which this stack does not do.
    pub const fn supports_apdu_exchange(&self) -> bool {
        matches!(
            self.exchange_level(),
            EXCHANGE_SHORT_APDU | EXCHANGE_EXTENDED_APDU
        )
    }
}

/// Locate the CCID class descriptor inside a configuration descriptor
///
/// Walks the length-prefixed descriptor records (`length` at offset 0,
/// `type` at offset 1) until a record of type 0x21 is found or the cursor
/// reaches `total_length`.
pub fn find_class_descriptor(buffer: &[u8], total_length: usize) -> Result<&[u8]> {
    let end = total_length.min(buffer.len());
    let mut offset = 0;

    while offset + 1 < end {
        let length = buffer[offset] as usize;
        let descriptor_type = buffer[offset + 1];
        if length == 0 {
            break;
        }
        if descriptor_type == CCID_DESCRIPTOR_TYPE {
            let record_end = (offset + length).min(end);
            return Ok(&buffer[offset..record_end]);
        }
        offset += length;
    }

    Err(Error::DescriptorNotFound)
}

fn le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn le32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Build a plausible descriptor blob for tests
#[cfg(test)]
pub(crate) fn descriptor_bytes(max_slot_index: u8, exchange_level: u8) -> Vec<u8> {
    let mut data = vec![0u8; CCID_DESCRIPTOR_LEN];
    data[0] = CCID_DESCRIPTOR_LEN as u8;
    data[1] = CCID_DESCRIPTOR_TYPE;
    data[2..4].copy_from_slice(&0x0110u16.to_le_bytes()); // bcdCCID 1.10
    data[4] = max_slot_index;
    data[5] = 0x07; // 5V/3V/1.8V
    data[6..10].copy_from_slice(&0x0003u32.to_le_bytes()); // T=0 + T=1
    data[10..14].copy_from_slice(&4000u32.to_le_bytes());
    data[14..18].copy_from_slice(&4000u32.to_le_bytes());
    data[19..23].copy_from_slice(&9600u32.to_le_bytes());
    data[23..27].copy_from_slice(&9600u32.to_le_bytes());
    data[28..32].copy_from_slice(&254u32.to_le_bytes());
    let features = (0x0001_0000u32 * u32::from(exchange_level)) | 0x0000_00BA;
    data[40..44].copy_from_slice(&features.to_le_bytes());
    data[44..48].copy_from_slice(&271u32.to_le_bytes());
    data[50..52].copy_from_slice(&0x1234u16.to_be_bytes());
    data[52] = 0x00;
    data[53] = 0x01;
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let data = descriptor_bytes(1, EXCHANGE_SHORT_APDU);
        let desc = CcidDescriptor::parse(&data).unwrap();
        assert_eq!(desc.ccid_version, 0x0110);
        assert_eq!(desc.max_slot_index, 1);
        assert_eq!(desc.protocols, 0x0003);
        assert_eq!(desc.max_ifsd, 254);
        assert_eq!(desc.max_message_length, 271);
        assert_eq!(desc.lcd_layout, 0x1234);
        assert_eq!(desc.exchange_level(), EXCHANGE_SHORT_APDU);
        assert!(desc.supports_apdu_exchange());
    }

    #[test]
    fn test_parse_descriptor_too_short() {
        let data = vec![0u8; 10];
        assert!(matches!(
            CcidDescriptor::parse(&data),
            Err(Error::MessageTooShort { .. })
        ));
    }

    #[test]
    fn test_unsupported_exchange_level() {
        // TPDU-level device
        let data = descriptor_bytes(0, 0x01);
        let desc = CcidDescriptor::parse(&data).unwrap();
        assert!(!desc.supports_apdu_exchange());
    }

    #[test]
    fn test_find_class_descriptor_skips_preceding_records() {
        // config(9) + interface(9) + CCID descriptor
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&[0x09, 0x02, 0x5D, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32]);
        buffer.extend_from_slice(&[0x09, 0x04, 0x00, 0x00, 0x03, 0x0B, 0x00, 0x00, 0x00]);
        buffer.extend_from_slice(&descriptor_bytes(0, EXCHANGE_SHORT_APDU));
        let total = buffer.len();

        let record = find_class_descriptor(&buffer, total).unwrap();
        assert_eq!(record.len(), CCID_DESCRIPTOR_LEN);
        let desc = CcidDescriptor::parse(record).unwrap();
        assert_eq!(desc.max_slot_index, 0);
    }

    #[test]
    fn test_find_class_descriptor_missing() {
        let buffer = [0x09, 0x02, 0x12, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32, 0x09, 0x04, 0x00,
            0x00, 0x03, 0x0B, 0x00, 0x00, 0x00];
        assert_eq!(
            find_class_descriptor(&buffer, buffer.len()),
            Err(Error::DescriptorNotFound)
        );
    }

    #[test]
    fn test_find_class_descriptor_respects_total_length() {
        // The CCID record sits past the declared total length
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&[0x09, 0x02, 0x5D, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32]);
        buffer.extend_from_slice(&descriptor_bytes(0, EXCHANGE_SHORT_APDU));
        assert_eq!(
            find_class_descriptor(&buffer, 9),
            Err(Error::DescriptorNotFound)
        );
    }
}
