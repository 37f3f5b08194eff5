//! USB transport contract for CCID devices
//!
//! This module defines the capability contract the rest of the crate
//! consumes: device-level open/close, interface ownership, and
//! control/bulk/interrupt transfers, plus the nested configuration →
//! interface → alternate-setting → endpoint records used for interface
//! discovery. Concrete implementations (rusb, nusb, a WebUSB bridge, ...)
//! live outside this crate.

use std::fmt;

use bytes::Bytes;

/// Standard USB control request type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// Standard request defined by the USB specification
    Standard,
    /// Class-specific request
    Class,
    /// Vendor-specific request
    Vendor,
}

/// Recipient of a USB control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// The device itself
    Device,
    /// A specific interface
    Interface,
    /// A specific endpoint
    Endpoint,
    /// Other recipient
    Other,
}

/// Setup packet for a USB control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    /// Request type (standard/class/vendor)
    pub request_type: RequestType,
    /// Request recipient
    pub recipient: Recipient,
    /// bRequest value
    pub request: u8,
    /// wValue field
    pub value: u16,
    /// wIndex field
    pub index: u16,
}

/// Direction of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

/// Transfer type of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// Control transfers
    Control,
    /// Interrupt transfers
    Interrupt,
    /// Bulk transfers
    Bulk,
    /// Isochronous transfers
    Isochronous,
}

/// Endpoint record of an alternate setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint number
    pub number: u8,
    /// Endpoint direction
    pub direction: Direction,
    /// Endpoint transfer type
    pub transfer_type: TransferType,
}

/// Alternate setting record of an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateSetting {
    /// Alternate setting number
    pub alternate_setting: u8,
    /// Interface class code of this alternate
    pub interface_class: u8,
    /// Endpoints of this alternate
    pub endpoints: Vec<Endpoint>,
}

/// Interface record of a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbInterface {
    /// Interface number
    pub interface_number: u8,
    /// Alternate settings of this interface
    pub alternates: Vec<AlternateSetting>,
}

/// Configuration record of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// bConfigurationValue of this configuration
    pub configuration_value: u8,
    /// Interfaces of this configuration
    pub interfaces: Vec<UsbInterface>,
}

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to device")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Device error
    #[error("Device error")]
    Device,

    /// Endpoint stalled
    #[error("Endpoint stalled")]
    Stall,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

/// Trait for USB devices hosting a CCID interface
///
/// One transfer is in flight per endpoint at a time per this design; the
/// `&mut self` receivers make a second outstanding request on the same
/// pipe unrepresentable.
pub trait UsbDevice: Send + fmt::Debug {
    /// Open a device-level session
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the device-level session
    fn close(&mut self) -> Result<(), TransportError>;

    /// The device's configuration descriptor tree
    fn configurations(&self) -> &[Configuration];

    /// Claim ownership of an interface
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Release a previously claimed interface
    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Select an alternate setting on a claimed interface
    fn select_alternate_interface(
        &mut self,
        interface: u8,
        alternate: u8,
    ) -> Result<(), TransportError>;

    /// Issue an IN control transfer, reading up to `length` bytes
    fn control_transfer_in(
        &mut self,
        setup: ControlSetup,
        length: usize,
    ) -> Result<Bytes, TransportError>;

    /// Issue an OUT control transfer carrying `data`
    fn control_transfer_out(
        &mut self,
        setup: ControlSetup,
        data: &[u8],
    ) -> Result<usize, TransportError>;

    /// Read up to `length` bytes from a bulk or interrupt IN endpoint
    fn transfer_in(&mut self, endpoint: u8, length: usize) -> Result<Bytes, TransportError>;

    /// Write `data` to a bulk OUT endpoint
    fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;

    use super::*;

    /// Scripted in-memory device for unit tests
    #[derive(Debug, Default)]
    pub(crate) struct MockUsbDevice {
        pub(crate) configurations: Vec<Configuration>,
        /// Responses for control IN transfers, in order
        pub(crate) control_responses: VecDeque<Bytes>,
        /// Responses for bulk IN transfers, in order
        pub(crate) bulk_responses: VecDeque<Bytes>,
        /// Results for interrupt IN transfers, in order
        pub(crate) interrupt_results: VecDeque<Result<Bytes, TransportError>>,
        /// Endpoint number treated as the interrupt endpoint
        pub(crate) interrupt_endpoint: u8,
        /// Recorded OUT transfers (endpoint, data)
        pub(crate) out_transfers: Vec<(u8, Bytes)>,
        /// Recorded IN requests (endpoint, length)
        pub(crate) in_requests: Vec<(u8, usize)>,
        pub(crate) claimed: Vec<u8>,
        pub(crate) released: Vec<u8>,
        pub(crate) selected_alternates: Vec<(u8, u8)>,
        pub(crate) opened: bool,
        pub(crate) closed: bool,
    }

    impl MockUsbDevice {
        pub(crate) fn new(configurations: Vec<Configuration>) -> Self {
            Self {
                configurations,
                interrupt_endpoint: u8::MAX,
                ..Self::default()
            }
        }
    }

    impl UsbDevice for MockUsbDevice {
        fn open(&mut self) -> Result<(), TransportError> {
            self.opened = true;
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }

        fn configurations(&self) -> &[Configuration] {
            &self.configurations
        }

        fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
            self.claimed.push(interface);
            Ok(())
        }

        fn release_interface(&mut self, interface: u8) -> Result<(), TransportError> {
            self.released.push(interface);
            Ok(())
        }

        fn select_alternate_interface(
            &mut self,
            interface: u8,
            alternate: u8,
        ) -> Result<(), TransportError> {
            self.selected_alternates.push((interface, alternate));
            Ok(())
        }

        fn control_transfer_in(
            &mut self,
            _setup: ControlSetup,
            _length: usize,
        ) -> Result<Bytes, TransportError> {
            self.control_responses
                .pop_front()
                .ok_or(TransportError::Transmission)
        }

        fn control_transfer_out(
            &mut self,
            _setup: ControlSetup,
            data: &[u8],
        ) -> Result<usize, TransportError> {
            Ok(data.len())
        }

        fn transfer_in(&mut self, endpoint: u8, length: usize) -> Result<Bytes, TransportError> {
            self.in_requests.push((endpoint, length));
            if endpoint == self.interrupt_endpoint {
                self.interrupt_results
                    .pop_front()
                    .unwrap_or(Err(TransportError::Timeout))
            } else {
                self.bulk_responses
                    .pop_front()
                    .ok_or(TransportError::Transmission)
            }
        }

        fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError> {
            self.out_transfers
                .push((endpoint, Bytes::copy_from_slice(data)));
            Ok(data.len())
        }
    }
}
