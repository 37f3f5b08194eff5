//! Identity record parsing
//!
//! The identity file is a run of UTF-8 fields, each sitting between a pair
//! of single-byte markers `(tag, tag + 1)` with tags in strictly ascending
//! order (0x01..0x11). The scanner's cursor never rewinds, which is a
//! structural property of the card's on-disk format, not a tunable.
//!
//! Field text is decoded by a minimal 1/2/3-byte UTF-8 decoder; the card
//! never writes 4-byte forms.

use crate::error::{Error, Result};

/// Decoded identity record of the card holder
///
/// Pure function of the file bytes: parsing the same buffer twice yields
/// field-for-field identical records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Card number
    pub card_number: String,
    /// Chip number
    pub chip_number: String,
    /// Start of the card validity window
    pub validity_begin: String,
    /// End of the card validity window
    pub validity_end: String,
    /// Municipality that delivered the card
    pub delivery_municipality: String,
    /// National number of the holder
    pub national_number: String,
    /// Last name
    pub last_name: String,
    /// First name
    pub first_name: String,
    /// Third name (first letter)
    pub third_name: String,
    /// Nationality
    pub nationality: String,
    /// Birth location
    pub birth_location: String,
    /// Birth date
    pub birth_date: String,
    /// Sex
    pub sex: String,
    /// Noble condition, if any
    pub noble_condition: String,
    /// Document type
    pub document_type: String,
    /// Special status, if any
    pub special_status: String,
    /// Hash of the holder photo
    pub photo_hash: String,
}

impl IdentityRecord {
    /// Parse the raw bytes of the identity file
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut scanner = FieldScanner::new(data);
        Ok(Self {
            card_number: scanner.field(0x01)?,
            chip_number: scanner.field(0x02)?,
            validity_begin: scanner.field(0x03)?,
            validity_end: scanner.field(0x04)?,
            delivery_municipality: scanner.field(0x05)?,
            national_number: scanner.field(0x06)?,
            last_name: scanner.field(0x07)?,
            first_name: scanner.field(0x08)?,
            third_name: scanner.field(0x09)?,
            nationality: scanner.field(0x0A)?,
            birth_location: scanner.field(0x0B)?,
            birth_date: scanner.field(0x0C)?,
            sex: scanner.field(0x0D)?,
            noble_condition: scanner.field(0x0E)?,
            document_type: scanner.field(0x0F)?,
            special_status: scanner.field(0x10)?,
            photo_hash: scanner.field(0x11)?,
        })
    }
}

/// Forward-only scanner over the tag-delimited identity buffer
struct FieldScanner<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> FieldScanner<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    /// Extract the field between the `tag` and `tag + 1` markers
    ///
    /// The byte after the opening marker is the field's length byte and is
    /// skipped; the value runs from there to the closing marker, which is
    /// also the next field's opening tag.
    fn field(&mut self, tag: u8) -> Result<String> {
        let open = self.data[self.cursor..]
            .iter()
            .position(|&byte| byte == tag)
            .ok_or(Error::IdentityFieldMissing(tag))?
            + self.cursor;

        let value_start = open + 2;
        if value_start > self.data.len() {
            return Err(Error::IdentityFieldMissing(tag));
        }

        let close = self.data[value_start..]
            .iter()
            .position(|&byte| byte == tag + 1)
            .ok_or(Error::IdentityFieldMissing(tag))?
            + value_start;

        self.cursor = close;
        Ok(decode_utf8_minimal(&self.data[value_start..close]))
    }
}

/// Decode the address file: UTF-8 text of the whole buffer
pub fn decode_address(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Minimal UTF-8 decoder handling the 1-, 2- and 3-byte forms only
///
/// No 4-byte sequences and no surrogate handling; bytes that do not start
/// a recognized form are skipped.
fn decode_utf8_minimal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        let lead = bytes[index];
        index += 1;

        let code_point = match lead >> 4 {
            // 0xxxxxxx
            0x0..=0x7 => u32::from(lead),
            // 110xxxxx 10xxxxxx
            0xC | 0xD => {
                let Some(&cont) = bytes.get(index) else {
                    break;
                };
                index += 1;
                (u32::from(lead & 0x1F) << 6) | u32::from(cont & 0x3F)
            }
            // 1110xxxx 10xxxxxx 10xxxxxx
            0xE => {
                let (Some(&cont1), Some(&cont2)) = (bytes.get(index), bytes.get(index + 1)) else {
                    break;
                };
                index += 2;
                (u32::from(lead & 0x0F) << 12)
                    | (u32::from(cont1 & 0x3F) << 6)
                    | u32::from(cont2 & 0x3F)
            }
            _ => continue,
        };

        out.push(char::from_u32(code_point).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    out
}
