//! Slot presence monitoring over the interrupt endpoint
//!
//! Each [`SlotMonitor::poll`] call issues one interrupt-IN transfer and
//! turns the raw slot-state bitmap into edge-triggered insertion/removal
//! events. Insertions are powered on through the session before being
//! returned, so consumers only ever observe powered, addressable slots.
//! The host re-arms simply by polling again.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::message::CcidResponse;
use crate::session::CcidSession;
use crate::transport::{TransportError, UsbDevice};

/// Consecutive poll failures after which the monitor reports itself
/// degraded instead of silently swallowing a dead interrupt pipe
pub const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 5;

/// Edge-triggered slot presence event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEvent {
    /// A card was inserted and powered on
    Inserted {
        /// Slot the card was inserted into
        slot: u8,
    },
    /// The card was removed
    Removed {
        /// Slot the card was removed from
        slot: u8,
    },
}

/// Converts interrupt-endpoint notifications into slot events
#[derive(Debug, Default)]
pub struct SlotMonitor {
    consecutive_failures: u32,
}

impl SlotMonitor {
    /// Create a new monitor
    pub const fn new() -> Self {
        Self {
            consecutive_failures: 0,
        }
    }

    /// Run one interrupt poll against the session
    ///
    /// A transport timeout is a quiet poll, not a failure. Other transport
    /// errors are logged and swallowed as transient, but
    /// [`MAX_CONSECUTIVE_POLL_FAILURES`] consecutive ones surface as
    /// [`Error::SlotMonitorDegraded`].
    pub fn poll<D: UsbDevice>(&mut self, session: &mut CcidSession<D>) -> Result<Vec<SlotEvent>> {
        let raw = match session.transfer_interrupt() {
            // No interrupt endpoint on this interface
            Ok(None) => return Ok(Vec::new()),
            Ok(Some(raw)) => {
                self.consecutive_failures = 0;
                raw
            }
            Err(Error::Transport(TransportError::Timeout)) => {
                self.consecutive_failures = 0;
                return Ok(Vec::new());
            }
            Err(err) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                    return Err(Error::SlotMonitorDegraded(self.consecutive_failures));
                }
                warn!(error = %err, "interrupt transfer failed");
                return Ok(Vec::new());
            }
        };

        let Some(CcidResponse::NotifySlotChange(notify)) = CcidResponse::parse(&raw)? else {
            // Interrupt traffic this stack does not act on
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for slot in 0..=session.descriptor().max_slot_index {
            if !notify.changed(slot) {
                continue;
            }
            if notify.present(slot) {
                session.icc_power_on(slot)?;
                debug!(slot, "card inserted");
                events.push(SlotEvent::Inserted { slot });
            } else {
                debug!(slot, "card removed");
                events.push(SlotEvent::Removed { slot });
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::session::tests::{data_block_frame, mock_device};

    #[test]
    fn test_insertion_event_powers_slot_on() {
        let mut device = mock_device(0);
        device
            .interrupt_results
            .push_back(Ok(Bytes::from_static(&[0x50, 0b0000_0011])));
        // ATR for the implicit power-on
        device
            .bulk_responses
            .push_back(data_block_frame(0, &[0x3B, 0x98]));
        let mut session = CcidSession::initialize(device).unwrap();

        let mut monitor = SlotMonitor::new();
        let events = monitor.poll(&mut session).unwrap();
        assert_eq!(events, vec![SlotEvent::Inserted { slot: 0 }]);
    }

    #[test]
    fn test_no_change_no_event() {
        let mut device = mock_device(0);
        device
            .interrupt_results
            .push_back(Ok(Bytes::from_static(&[0x50, 0b0000_0000])));
        let mut session = CcidSession::initialize(device).unwrap();

        let mut monitor = SlotMonitor::new();
        assert!(monitor.poll(&mut session).unwrap().is_empty());
    }

    #[test]
    fn test_removal_event() {
        let mut device = mock_device(0);
        // Changed bit set, present bit clear
        device
            .interrupt_results
            .push_back(Ok(Bytes::from_static(&[0x50, 0b0000_0010])));
        let mut session = CcidSession::initialize(device).unwrap();

        let mut monitor = SlotMonitor::new();
        let events = monitor.poll(&mut session).unwrap();
        assert_eq!(events, vec![SlotEvent::Removed { slot: 0 }]);
    }

    #[test]
    fn test_timeout_is_a_quiet_poll() {
        let mut device = mock_device(0);
        device
            .interrupt_results
            .push_back(Err(TransportError::Timeout));
        let mut session = CcidSession::initialize(device).unwrap();

        let mut monitor = SlotMonitor::new();
        assert!(monitor.poll(&mut session).unwrap().is_empty());
    }

    #[test]
    fn test_unrecognized_interrupt_traffic_is_ignored() {
        let mut device = mock_device(0);
        // Hardware error notification: decoded, but not a slot change
        device
            .interrupt_results
            .push_back(Ok(Bytes::from_static(&[0x51, 0x00, 0x00, 0x01])));
        let mut session = CcidSession::initialize(device).unwrap();

        let mut monitor = SlotMonitor::new();
        assert!(monitor.poll(&mut session).unwrap().is_empty());
    }

    #[test]
    fn test_degraded_after_consecutive_failures() {
        let mut device = mock_device(0);
        for _ in 0..MAX_CONSECUTIVE_POLL_FAILURES {
            device
                .interrupt_results
                .push_back(Err(TransportError::Device));
        }
        let mut session = CcidSession::initialize(device).unwrap();

        let mut monitor = SlotMonitor::new();
        for _ in 0..MAX_CONSECUTIVE_POLL_FAILURES - 1 {
            assert!(monitor.poll(&mut session).unwrap().is_empty());
        }
        assert_eq!(
            monitor.poll(&mut session),
            Err(Error::SlotMonitorDegraded(MAX_CONSECUTIVE_POLL_FAILURES))
        );
    }

    #[test]
    fn test_failure_counter_resets_on_success() {
        let mut device = mock_device(0);
        device
            .interrupt_results
            .push_back(Err(TransportError::Device));
        device
            .interrupt_results
            .push_back(Ok(Bytes::from_static(&[0x50, 0b0000_0000])));
        device
            .interrupt_results
            .push_back(Err(TransportError::Device));
        let mut session = CcidSession::initialize(device).unwrap();

        let mut monitor = SlotMonitor::new();
        assert!(monitor.poll(&mut session).unwrap().is_empty());
        assert!(monitor.poll(&mut session).unwrap().is_empty());
        assert!(monitor.poll(&mut session).unwrap().is_empty());
        assert_eq!(monitor.consecutive_failures, 1);
    }
}
