//! Shared mock USB device for the integration tests
//!
//! The mock behaves like a one-slot CCID reader: it frames every scripted
//! card response as an RDR_to_PC_DataBlock echoing the sequence number of
//! the bulk command that asked for it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use beid::{TransportError, UsbDevice};
use beid_ccid::transport::{
    AlternateSetting, Configuration, ControlSetup, Direction, Endpoint, TransferType, UsbInterface,
};
use bytes::Bytes;

pub const BULK_OUT: u8 = 0x01;
pub const BULK_IN: u8 = 0x02;
pub const INTERRUPT_IN: u8 = 0x03;

/// A plausible ATR
pub const ATR: &[u8] = &[
    0x3B, 0x98, 0x13, 0x40, 0x0A, 0xA5, 0x03, 0x01, 0x01, 0x01, 0xAD, 0x13, 0x11,
];

/// Serial number reported by GET CARD DATA
pub const SERIAL: &[u8] = &[
    0x53, 0x4C, 0x47, 0x38, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
    0x0C,
];

/// Applet version reported by GET CARD DATA
pub const APPLET_VERSION: u8 = 0x17;

/// Observable device state, shared with the test after the device moves
/// into the stack
#[derive(Debug, Default)]
pub struct DeviceState {
    pub control_responses: VecDeque<Bytes>,
    /// Card-level responses (APDU payload plus status word, or an ATR);
    /// framed as data blocks on the way out
    pub card_responses: VecDeque<Bytes>,
    pub interrupt_results: VecDeque<Result<Bytes, TransportError>>,
    pub out_transfers: Vec<(u8, Bytes)>,
    pub interrupt_requests: Vec<usize>,
    pub claimed: Vec<u8>,
    pub released: Vec<u8>,
    pub selected_alternates: Vec<(u8, u8)>,
    pub opened: bool,
    pub closed: bool,
    last_seq: u8,
}

/// Mock one-slot CCID reader
#[derive(Debug, Clone)]
pub struct MockDevice {
    configurations: Vec<Configuration>,
    pub state: Arc<Mutex<DeviceState>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        let mut state = DeviceState::default();
        state
            .control_responses
            .push_back(Bytes::from(config_descriptor_blob()));
        Self {
            configurations: ccid_configurations(),
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl UsbDevice for MockDevice {
    fn open(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().opened = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }

    fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.state.lock().unwrap().claimed.push(interface);
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.state.lock().unwrap().released.push(interface);
        Ok(())
    }

    fn select_alternate_interface(
        &mut self,
        interface: u8,
        alternate: u8,
    ) -> Result<(), TransportError> {
        self.state
            .lock()
            .unwrap()
            .selected_alternates
            .push((interface, alternate));
        Ok(())
    }

    fn control_transfer_in(
        &mut self,
        _setup: ControlSetup,
        _length: usize,
    ) -> Result<Bytes, TransportError> {
        self.state
            .lock()
            .unwrap()
            .control_responses
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
        let mut state = self.state.lock().unwrap();
        if endpoint == INTERRUPT_IN {
            state.interrupt_requests.push(length);
            return state
                .interrupt_results
                .pop_front()
                .unwrap_or(Err(TransportError::Timeout));
        }

        let seq = state.last_seq;
        state
            .card_responses
            .pop_front()
            .map(|payload| data_block_frame(seq, &payload))
            .ok_or(TransportError::Transmission)
    }

    fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        if endpoint == BULK_OUT && data.len() > 6 {
            state.last_seq = data[6];
        }
        state
            .out_transfers
            .push((endpoint, Bytes::copy_from_slice(data)));
        Ok(data.len())
    }
}

fn ccid_configurations() -> Vec<Configuration> {
    vec![Configuration {
        configuration_value: 1,
        interfaces: vec![UsbInterface {
            interface_number: 0,
            alternates: vec![AlternateSetting {
                alternate_setting: 0,
                interface_class: 0x0B,
                endpoints: vec![
                    Endpoint {
                        number: BULK_OUT,
                        direction: Direction::Out,
                        transfer_type: TransferType::Bulk,
                    },
                    Endpoint {
                        number: BULK_IN,
                        direction: Direction::In,
                        transfer_type: TransferType::Bulk,
                    },
                    Endpoint {
                        number: INTERRUPT_IN,
                        direction: Direction::In,
                        transfer_type: TransferType::Interrupt,
                    },
                ],
            }],
        }],
    }]
}

/// One-slot, short-APDU CCID class descriptor wrapped in a configuration
/// descriptor blob
fn config_descriptor_blob() -> Vec<u8> {
    let mut blob = Vec::new();
    blob.extend_from_slice(&[0x09, 0x02, 0x00, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32]);
    blob.extend_from_slice(&[0x09, 0x04, 0x00, 0x00, 0x03, 0x0B, 0x00, 0x00, 0x00]);

    let mut descriptor = vec![0u8; 54];
    descriptor[0] = 54;
    descriptor[1] = 0x21;
    descriptor[2..4].copy_from_slice(&0x0110u16.to_le_bytes());
    descriptor[4] = 0; // one slot
    descriptor[5] = 0x07;
    descriptor[6..10].copy_from_slice(&0x0003u32.to_le_bytes());
    // short-APDU exchange level
    descriptor[40..44].copy_from_slice(&0x0002_00BAu32.to_le_bytes());
    descriptor[44..48].copy_from_slice(&271u32.to_le_bytes());
    blob.extend_from_slice(&descriptor);

    let total = blob.len() as u16;
    blob[2..4].copy_from_slice(&total.to_le_bytes());
    blob
}

/// Frame a card response as an RDR_to_PC_DataBlock
fn data_block_frame(seq: u8, payload: &[u8]) -> Bytes {
    let mut frame = vec![0x80u8];
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.push(0x00);
    frame.push(seq);
    frame.extend_from_slice(&[0x00, 0x00, 0x00]);
    frame.extend_from_slice(payload);
    Bytes::from(frame)
}

/// Slot 0: present and changed
pub fn insertion_notification() -> Bytes {
    Bytes::from_static(&[0x50, 0b0000_0011])
}

/// Slot 0: changed, no longer present
pub fn removal_notification() -> Bytes {
    Bytes::from_static(&[0x50, 0b0000_0010])
}

/// Append a success status word to a payload
pub fn success(payload: &[u8]) -> Bytes {
    let mut data = payload.to_vec();
    data.extend_from_slice(&[0x90, 0x00]);
    Bytes::from(data)
}

/// A bare status word response
pub fn status(sw1: u8, sw2: u8) -> Bytes {
    Bytes::from(vec![sw1, sw2])
}

/// GET CARD DATA response payload: serial number, filler, applet version
pub fn card_data_response() -> Bytes {
    let mut payload = Vec::with_capacity(0x1C);
    payload.extend_from_slice(SERIAL);
    payload.extend_from_slice(&[0x01, 0x01, 0x01, 0x01, 0x01]);
    payload.push(APPLET_VERSION);
    payload.extend_from_slice(&[0x00; 6]);
    success(&payload)
}

/// Queue the full insertion script: notification, power-on ATR, card data
pub fn queue_insertion(state: &Arc<Mutex<DeviceState>>) {
    let mut state = state.lock().unwrap();
    state
        .interrupt_results
        .push_back(Ok(insertion_notification()));
    state.card_responses.push_back(Bytes::copy_from_slice(ATR));
    state.card_responses.push_back(card_data_response());
}

/// Build an identity file in the card's tag/length/value layout
pub fn identity_file(fields: &[&[u8]; 17]) -> Bytes {
    let mut buffer = Vec::new();
    for (i, value) in fields.iter().enumerate() {
        buffer.push(i as u8 + 1);
        buffer.push(value.len() as u8);
        buffer.extend_from_slice(value);
    }
    buffer.push(0x12);
    Bytes::from(buffer)
}
