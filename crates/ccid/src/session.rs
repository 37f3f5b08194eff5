//! CCID session management
//!
//! The session owns the USB device, the claimed smart card interface, the
//! parsed class descriptor and the outgoing sequence counter, and is the
//! single point of bulk-pipe access. Every bulk exchange is a strict
//! request/response pair; the `&mut self` receivers serialize them, so a
//! second outstanding request is unrepresentable.

use bytes::Bytes;
use tracing::{instrument, trace, warn};

use beid_apdu::{Command, Response};

use crate::descriptor::{self, CcidDescriptor};
use crate::error::{Error, Result};
use crate::message::{CcidCommand, DataBlock, Parameters, DATA_BLOCK_MAX_LEN, PARAMETERS_MAX_LEN};
use crate::transport::{
    Configuration, ControlSetup, Direction, Recipient, RequestType, TransferType, UsbDevice,
};

/// USB interface class code of smart card (CCID) interfaces
pub const SMART_CARD_CLASS: u8 = 0x0B;

/// GET_DESCRIPTOR standard request code
const GET_DESCRIPTOR: u8 = 0x06;

/// wValue selecting the configuration descriptor
const CONFIGURATION_DESCRIPTOR: u16 = 0x0200;

/// Read size for the configuration descriptor fetch
const CONFIG_DESCRIPTOR_READ_LEN: usize = 256;

/// Endpoint numbers of the claimed CCID interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Bulk IN endpoint number
    pub bulk_in: u8,
    /// Bulk OUT endpoint number
    pub bulk_out: u8,
    /// Interrupt IN endpoint number, if the interface has one
    pub interrupt: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
struct SelectedInterface {
    configuration_value: u8,
    interface_number: u8,
    alternate_setting: u8,
    endpoints: Endpoints,
}

/// A claimed CCID interface with its bulk pipe and sequence counter
#[derive(Debug)]
pub struct CcidSession<D: UsbDevice> {
    device: D,
    interface_number: u8,
    descriptor: CcidDescriptor,
    endpoints: Endpoints,
    seq: u8,
}

impl<D: UsbDevice> CcidSession<D> {
    /// Open the device, claim its smart card interface and parse the CCID
    /// class descriptor
    ///
    /// Walks the configuration tree for the first alternate setting with
    /// interface class 0x0B and a bulk IN/OUT endpoint pair, claims it,
    /// fetches the configuration descriptor and parses the embedded class
    /// descriptor, enforcing the APDU-exchange-level invariant. A failed
    /// initialization never leaves the interface claimed or the device
    /// open.
    pub fn initialize(mut device: D) -> Result<Self> {
        device.open()?;

        match Self::claim_and_setup(&mut device) {
            Ok((interface_number, descriptor, endpoints)) => Ok(Self {
                device,
                interface_number,
                descriptor,
                endpoints,
                seq: 0,
            }),
            Err(err) => {
                let _ = device.close();
                Err(err)
            }
        }
    }

    fn claim_and_setup(device: &mut D) -> Result<(u8, CcidDescriptor, Endpoints)> {
        let selected =
            Self::find_interface(device.configurations()).ok_or(Error::NoInterfaceFound)?;

        device.claim_interface(selected.interface_number)?;

        match Self::read_class_descriptor(device, selected) {
            Ok(descriptor) => Ok((
                selected.interface_number,
                descriptor,
                selected.endpoints,
            )),
            Err(err) => {
                let _ = device.release_interface(selected.interface_number);
                Err(err)
            }
        }
    }

    fn find_interface(configurations: &[Configuration]) -> Option<SelectedInterface> {
        for configuration in configurations {
            for interface in &configuration.interfaces {
                for alternate in &interface.alternates {
                    if alternate.interface_class != SMART_CARD_CLASS {
                        continue;
                    }

                    let mut bulk_in = None;
                    let mut bulk_out = None;
                    let mut interrupt = None;
                    for endpoint in &alternate.endpoints {
                        match (endpoint.direction, endpoint.transfer_type) {
                            (Direction::In, TransferType::Bulk) => bulk_in = Some(endpoint.number),
                            (Direction::Out, TransferType::Bulk) => {
                                bulk_out = Some(endpoint.number)
                            }
                            (Direction::In, TransferType::Interrupt) => {
                                interrupt = Some(endpoint.number)
                            }
                            _ => {}
                        }
                    }

                    // The bulk pair is mandatory, the interrupt endpoint is not
                    let (Some(bulk_in), Some(bulk_out)) = (bulk_in, bulk_out) else {
                        continue;
                    };

                    return Some(SelectedInterface {
                        configuration_value: configuration.configuration_value,
                        interface_number: interface.interface_number,
                        alternate_setting: alternate.alternate_setting,
                        endpoints: Endpoints {
                            bulk_in,
                            bulk_out,
                            interrupt,
                        },
                    });
                }
            }
        }
        None
    }

    fn read_class_descriptor(device: &mut D, selected: SelectedInterface) -> Result<CcidDescriptor> {
        if let Err(err) = device
            .select_alternate_interface(selected.interface_number, selected.alternate_setting)
        {
            // some readers refuse the request for their only alternate
            warn!(error = %err, "failed to select alternate setting, continuing");
        }

        let setup = ControlSetup {
            request_type: RequestType::Standard,
            recipient: Recipient::Device,
            request: GET_DESCRIPTOR,
            value: CONFIGURATION_DESCRIPTOR,
            index: u16::from(selected.configuration_value),
        };
        let blob = device.control_transfer_in(setup, CONFIG_DESCRIPTOR_READ_LEN)?;
        if blob.len() < 4 {
            return Err(Error::MessageTooShort {
                expected: 4,
                actual: blob.len(),
            });
        }
        let total_length = u16::from_le_bytes([blob[2], blob[3]]) as usize;

        let record = descriptor::find_class_descriptor(&blob, total_length)?;
        let parsed = CcidDescriptor::parse(record)?;
        if !parsed.supports_apdu_exchange() {
            return Err(Error::UnsupportedDevice(parsed.exchange_level()));
        }
        Ok(parsed)
    }

    /// The parsed CCID class descriptor
    pub const fn descriptor(&self) -> &CcidDescriptor {
        &self.descriptor
    }

    /// Endpoint numbers recorded during initialization
    pub const fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// One bulk round trip: serialize, send, read back
    fn exchange(&mut self, command: CcidCommand, read_len: usize) -> Result<(u8, Bytes)> {
        let seq = self.next_seq();
        let raw = command.serialize(seq);
        trace!(command = %hex::encode(&raw), "bulk out");
        self.device.transfer_out(self.endpoints.bulk_out, &raw)?;
        let response = self.device.transfer_in(self.endpoints.bulk_in, read_len)?;
        trace!(response = %hex::encode(&response), "bulk in");
        Ok((seq, response))
    }

    const fn check_seq(sent: u8, received: u8) -> Result<()> {
        if sent == received {
            Ok(())
        } else {
            Err(Error::SequenceMismatch { sent, received })
        }
    }

    /// Request the slot's protocol parameters
    #[instrument(level = "debug", skip(self))]
    pub fn get_parameters(&mut self, slot: u8) -> Result<Parameters> {
        let (seq, raw) = self.exchange(CcidCommand::GetParameters { slot }, PARAMETERS_MAX_LEN)?;
        let parameters = Parameters::parse(&raw)?;
        Self::check_seq(seq, parameters.seq)?;
        Ok(parameters)
    }

    /// Power the card up (automatic voltage selection)
    ///
    /// The returned data block carries the ATR; interpreting it is the
    /// caller's business.
    #[instrument(level = "debug", skip(self))]
    pub fn icc_power_on(&mut self, slot: u8) -> Result<DataBlock> {
        let (seq, raw) = self.exchange(CcidCommand::IccPowerOn { slot }, DATA_BLOCK_MAX_LEN)?;
        let block = DataBlock::parse(&raw)?;
        Self::check_seq(seq, block.seq)?;
        Ok(block)
    }

    /// Forward a command APDU to the card and return the data block
    ///
    /// Commands requiring the extended encoding are rejected before any
    /// transfer is issued.
    #[instrument(level = "debug", skip(self, command))]
    pub fn xfr_block(&mut self, slot: u8, command: &Command) -> Result<DataBlock> {
        if command.is_extended() {
            let payload_len = command.data.as_ref().map_or(0, Bytes::len);
            return Err(Error::ExtendedApduUnsupported(payload_len));
        }

        let (seq, raw) = self.exchange(
            CcidCommand::XfrBlock {
                slot,
                apdu: command.to_bytes(),
            },
            DATA_BLOCK_MAX_LEN,
        )?;
        let block = DataBlock::parse(&raw)?;
        Self::check_seq(seq, block.seq)?;
        Ok(block)
    }

    /// Send a command APDU and decode the returned data block as a
    /// response APDU (payload plus status word)
    pub fn send_apdu(&mut self, slot: u8, command: &Command) -> Result<Response> {
        let block = self.xfr_block(slot, command)?;
        Ok(Response::from_bytes(&block.data)?)
    }

    /// Read size for one slot-change notification: the type byte plus the
    /// bit-packed state vector (two bits per slot)
    pub const fn interrupt_read_len(&self) -> usize {
        1 + ((self.descriptor.max_slot_index as usize + 1) * 2).div_ceil(8)
    }

    /// Issue one interrupt-IN transfer
    ///
    /// Returns `None` when the interface has no interrupt endpoint.
    pub fn transfer_interrupt(&mut self) -> Result<Option<Bytes>> {
        let Some(endpoint) = self.endpoints.interrupt else {
            return Ok(None);
        };
        let length = self.interrupt_read_len();
        let data = self.device.transfer_in(endpoint, length)?;
        Ok(Some(data))
    }

    /// Release the claimed interface and close the device
    ///
    /// Consumes the session; operations against a torn-down session are
    /// impossible rather than failing at runtime.
    pub fn exit(mut self) -> Result<()> {
        let released = self.device.release_interface(self.interface_number);
        let closed = self.device.close();
        released?;
        closed?;
        Ok(())
    }
}
