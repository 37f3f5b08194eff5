//! eID card lifecycle, file access and PIN verification
//!
//! [`EidCard`] is the upward interface of the stack: it owns the CCID
//! session and slot monitor, keeps the card presence state machine, and
//! exposes the card's file-selection/chunked-read protocol plus the
//! derived accessors (identity, address, photo, certificates).

use std::fmt;

use bytes::{Bytes, BytesMut};
use tracing::{debug, instrument, warn};

use beid_apdu::{Command, Response};
use beid_ccid::{CcidSession, SlotEvent, SlotMonitor, UsbDevice};

use crate::error::{Error, Result};
use crate::files::{CertKind, EidFile};
use crate::identity::{decode_address, IdentityRecord};
use crate::pin::{PinBlock, PinVerification};

/// Instruction bytes used with the card
mod instruction {
    /// VERIFY
    pub(super) const VERIFY: u8 = 0x20;
    /// SELECT FILE
    pub(super) const SELECT: u8 = 0xA4;
    /// READ BINARY
    pub(super) const READ_BINARY: u8 = 0xB0;
    /// GET CARD DATA (proprietary)
    pub(super) const GET_CARD_DATA: u8 = 0xE4;
}

/// SELECT P1: select by path from the master file
const SELECT_BY_PATH: u8 = 0x08;
/// SELECT P2: no FCI in the response
const SELECT_NO_FCI: u8 = 0x0C;
/// VERIFY P2: cardholder PIN reference
const PIN_REFERENCE: u8 = 0x01;
/// Class byte of the card's proprietary commands
const PROPRIETARY_CLASS: u8 = 0x80;
/// Chunk length requested per READ BINARY
const READ_BINARY_MAX_LEN: u8 = 0xFF;
/// READ BINARY offsets are 16 bits, which bounds any file's size
const MAX_FILE_LEN: usize = 0x1_0000;
/// Expected length of the GET CARD DATA response
const CARD_DATA_LEN: u8 = 0x1C;

/// Card data captured when a card is inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardData {
    /// 16-byte card serial number
    pub serial_number: Bytes,
    /// Applet version byte
    pub applet_version: u8,
}

impl CardData {
    fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 22 {
            return Err(Error::Response(beid_apdu::ResponseError::Parse(
                "card data too short",
            )));
        }
        Ok(Self {
            serial_number: Bytes::copy_from_slice(&payload[..16]),
            applet_version: payload[21],
        })
    }
}

/// Card presence state, driven only by slot-monitor events
#[derive(Debug, Clone, PartialEq, Eq)]
enum CardState {
    Idle,
    CardPresent { slot: u8, data: CardData },
}

type SlotHandler = Box<dyn FnMut(u8) + Send>;

/// An eID card behind a generic USB CCID reader
pub struct EidCard<D: UsbDevice> {
    session: CcidSession<D>,
    monitor: SlotMonitor,
    state: CardState,
    on_inserted: Option<SlotHandler>,
    on_removed: Option<SlotHandler>,
}

impl<D: UsbDevice> fmt::Debug for EidCard<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EidCard")
            .field("session", &self.session)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<D: UsbDevice> EidCard<D> {
    /// Open the device, claim its CCID interface and arm the first
    /// interrupt poll
    ///
    /// A card already sitting in the reader when we attach is picked up by
    /// the initial poll. Initialization failures unwind through teardown
    /// before surfacing, so a failed `init` never leaves the interface
    /// claimed.
    pub fn init(device: D) -> Result<Self> {
        let session = CcidSession::initialize(device)?;
        let mut card = Self {
            session,
            monitor: SlotMonitor::new(),
            state: CardState::Idle,
            on_inserted: None,
            on_removed: None,
        };
        card.poll_events()?;
        Ok(card)
    }

    /// Register the card-inserted observer
    ///
    /// At most one handler per event kind; a new registration replaces the
    /// previous one. The handler only ever observes powered, addressable
    /// slots.
    pub fn on_card_inserted<F>(&mut self, handler: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.on_inserted = Some(Box::new(handler));
    }

    /// Register the card-removed observer
    ///
    /// At most one handler per event kind; a new registration replaces the
    /// previous one.
    pub fn on_card_removed<F>(&mut self, handler: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.on_removed = Some(Box::new(handler));
    }

    /// Run one slot-monitor poll and dispatch any resulting events
    ///
    /// The host's event loop calls this repeatedly; each call issues and
    /// completes at most one interrupt transfer, so exactly one is ever
    /// outstanding.
    #[instrument(level = "debug", skip(self))]
    pub fn poll_events(&mut self) -> Result<()> {
        let events = self.monitor.poll(&mut self.session)?;
        for event in events {
            match event {
                SlotEvent::Inserted { slot } => self.handle_insertion(slot)?,
                SlotEvent::Removed { slot } => self.handle_removal(slot),
            }
        }
        Ok(())
    }

    fn handle_insertion(&mut self, slot: u8) -> Result<()> {
        if let CardState::CardPresent { .. } = self.state {
            // At most one active card context; late insertions are dropped
            debug!(slot, "discarding insertion while a card is active");
            return Ok(());
        }

        let data = self.fetch_card_data(slot)?;
        self.state = CardState::CardPresent { slot, data };
        if let Some(handler) = self.on_inserted.as_mut() {
            handler(slot);
        }
        Ok(())
    }

    fn handle_removal(&mut self, slot: u8) {
        if self.active_slot() != Ok(slot) {
            return;
        }
        self.state = CardState::Idle;
        if let Some(handler) = self.on_removed.as_mut() {
            handler(slot);
        }
    }

    fn active_slot(&self) -> Result<u8> {
        match &self.state {
            CardState::CardPresent { slot, .. } => Ok(*slot),
            CardState::Idle => Err(Error::NoCardInserted),
        }
    }

    fn fetch_card_data(&mut self, slot: u8) -> Result<CardData> {
        let response = self.session.send_apdu(
            slot,
            &Command::new_with_le(
                PROPRIETARY_CLASS,
                instruction::GET_CARD_DATA,
                0x00,
                0x00,
                CARD_DATA_LEN,
            ),
        )?;
        if !response.is_success() {
            return Err(Error::CardDataFailed(response.status()));
        }
        CardData::parse(response.payload())
    }

    /// Card data captured when the active card was inserted
    pub fn card_data(&self) -> Result<&CardData> {
        match &self.state {
            CardState::CardPresent { data, .. } => Ok(data),
            CardState::Idle => Err(Error::NoCardInserted),
        }
    }

    /// Select a file by its fixed path
    #[instrument(level = "debug", skip(self))]
    pub fn select_file(&mut self, file: EidFile) -> Result<()> {
        let slot = self.active_slot()?;
        let response = self.session.send_apdu(
            slot,
            &Command::new_with_data(
                0x00,
                instruction::SELECT,
                SELECT_BY_PATH,
                SELECT_NO_FCI,
                file.file_id().to_vec(),
            ),
        )?;
        if !response.is_success() {
            return Err(Error::FileSelectFailed(response.status()));
        }
        Ok(())
    }

    /// Read the currently selected file in full
    ///
    /// Chunks are requested at the maximum short-form length with an
    /// ascending 16-bit offset. The card reports the true size of the
    /// final chunk through the wrong-length status family (6C xx), which
    /// ends the read; a short successful chunk is the other end-of-file
    /// signal.
    pub fn read_file(&mut self) -> Result<Bytes> {
        let slot = self.active_slot()?;
        let mut data = BytesMut::new();
        let mut offset = 0usize;

        loop {
            if offset >= MAX_FILE_LEN {
                return Err(Error::FileTooLarge(MAX_FILE_LEN));
            }

            let response = self.read_binary(slot, offset as u16, READ_BINARY_MAX_LEN)?;
            let status = response.status();

            if let Some(le) = status.wrong_length_le() {
                // The true final-chunk size is in SW2; reissue at the same
                // offset and stop after this chunk regardless of its size
                let response = self.read_binary(slot, offset as u16, le)?;
                if !response.is_success() {
                    return Err(Error::FileReadFailed(response.status()));
                }
                data.extend_from_slice(response.payload());
                return Ok(data.freeze());
            }
            if !status.is_success() {
                return Err(Error::FileReadFailed(status));
            }

            let chunk = response.payload();
            data.extend_from_slice(chunk);
            if chunk.len() < READ_BINARY_MAX_LEN as usize {
                return Ok(data.freeze());
            }
            offset += READ_BINARY_MAX_LEN as usize;
        }
    }

    fn read_binary(&mut self, slot: u8, offset: u16, le: u8) -> Result<Response> {
        let [p1, p2] = offset.to_be_bytes();
        Ok(self.session.send_apdu(
            slot,
            &Command::new_with_le(0x00, instruction::READ_BINARY, p1, p2, le),
        )?)
    }

    /// Select a file and read it in full
    #[instrument(level = "debug", skip(self))]
    pub fn get_file(&mut self, file: EidFile) -> Result<Bytes> {
        self.select_file(file)?;
        self.read_file()
    }

    /// Look a file up by its logical path, then fetch it
    pub fn get_file_by_path(&mut self, path: &str) -> Result<Bytes> {
        let file = EidFile::from_path(path).ok_or_else(|| Error::UnknownFile(path.to_owned()))?;
        self.get_file(file)
    }

    /// Fetch and parse the identity record
    pub fn get_identity(&mut self) -> Result<IdentityRecord> {
        let data = self.get_file(EidFile::Identity)?;
        IdentityRecord::parse(&data)
    }

    /// Fetch the holder's address
    pub fn get_address(&mut self) -> Result<String> {
        let data = self.get_file(EidFile::Address)?;
        Ok(decode_address(&data))
    }

    /// Fetch the holder's photo as raw JPEG bytes
    pub fn get_photo(&mut self) -> Result<Bytes> {
        self.get_file(EidFile::Photo)
    }

    /// Fetch one of the card's certificates
    pub fn get_certificate(&mut self, kind: CertKind) -> Result<Bytes> {
        self.get_file(kind.file())
    }

    /// Verify the cardholder PIN
    ///
    /// Rejections that leave tries on the counter come back as
    /// [`PinVerification::TriesRemaining`]; statuses outside the
    /// verification family fail.
    #[instrument(level = "debug", skip_all)]
    pub fn verify_pin(&mut self, pin: &PinBlock) -> Result<PinVerification> {
        let slot = self.active_slot()?;
        let response = self.session.send_apdu(
            slot,
            &Command::new_with_data(
                0x00,
                instruction::VERIFY,
                0x00,
                PIN_REFERENCE,
                pin.as_bytes().to_vec(),
            ),
        )?;

        let status = response.status();
        if status.is_success() {
            return Ok(PinVerification::Verified);
        }
        status.tries_remaining().map_or_else(
            || Err(Error::PinVerifyFailed(status)),
            |tries| {
                warn!(tries, "PIN rejected");
                Ok(PinVerification::TriesRemaining(tries))
            },
        )
    }

    /// Release the claimed interface and close the device
    ///
    /// Consumes the card; in-flight operations against a torn-down session
    /// are impossible rather than left to fail at runtime.
    pub fn exit(self) -> Result<()> {
        Ok(self.session.exit()?)
    }
}
