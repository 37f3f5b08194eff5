//! APDU response definitions
//!
//! A response APDU is the payload bytes followed by the two-byte status
//! word (SW1 SW2).

use bytes::Bytes;
use tracing::trace;

use crate::error::ResponseError;
use crate::status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data (without the status word)
    payload: Bytes,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Parse response from raw bytes (including the trailing status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self, ResponseError> {
        let (status, payload) = extract_status_and_payload(data)?;

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status,
        })
    }

    /// Get the response payload data
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the response and return the payload data
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = ResponseError;

    fn try_from(data: &[u8]) -> Result<Self, ResponseError> {
        Self::from_bytes(data)
    }
}

/// Extract the status word and payload from raw APDU response data
///
/// The status word is the trailing two bytes; everything before it is the
/// payload.
///
/// # Errors
/// Returns an error if the data is too short to contain a status word.
pub fn extract_status_and_payload(data: &[u8]) -> Result<(StatusWord, &[u8]), ResponseError> {
    if data.len() < 2 {
        return Err(ResponseError::Incomplete);
    }

    let len = data.len();
    let status = StatusWord::new(data[len - 2], data[len - 1]);
    Ok((status, &data[..len - 2]))
}
