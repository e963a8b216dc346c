//! Tracing hooks: observational-only.
//!
//! ns-3's `CsmaNetDevice::GetTraceResolver` wires `rx`/`drop` sources through a
//! `CompositeTraceResolver`. This crate does not reimplement that generic trace-resolver
//! machinery; instead it exposes the narrow sink this component actually needs to fire, which is
//! enough to make its observable behavior assertable from a test.

use crate::mac_address::MacAddress;

/// One observable event a [`crate::device::CsmaDevice`] or the ARP resolver can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A frame was accepted on the receive path and forwarded upward.
    Rx {
        device: MacAddress,
        protocol: u16,
        len: usize,
    },
    /// A frame was dropped; `reason` is a short, stable tag for assertions in tests.
    Drop { device: MacAddress, reason: DropReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ReceiveDisabled,
    BadFcs,
    AddressFilter,
    BackoffExhausted,
    ArpPendingReplaced,
    /// An `Incomplete` entry's request timed out and it just transitioned to `Dead`.
    ArpTimeout,
    /// A packet was rejected against an entry that was already negatively cached, with no
    /// state transition happening.
    ArpDeadEntry,
}

/// Where trace events go. `log::debug!` is used for free-text diagnostics throughout this crate;
/// `TraceSink` exists alongside it for callers and tests that want to count or assert on
/// specific protocol events rather than parse log output.
pub trait TraceSink {
    fn on_event(&self, event: TraceEvent);
}

/// A `TraceSink` that logs every event at `debug!` and otherwise does nothing. The default for
/// any device that isn't given an explicit sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn on_event(&self, event: TraceEvent) {
        match &event {
            TraceEvent::Rx { device, protocol, len } => {
                log::debug!("dev-rx device={device} protocol=0x{protocol:04x} len={len}");
            }
            TraceEvent::Drop { device, reason } => {
                log::debug!("dev-drop device={device} reason={reason:?}");
            }
        }
    }
}

/// A `TraceSink` that records every event in order, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::cell::RefCell<Vec<TraceEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    pub fn drop_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, TraceEvent::Drop { .. }))
            .count()
    }

    pub fn rx_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, TraceEvent::Rx { .. }))
            .count()
    }
}

impl TraceSink for RecordingSink {
    fn on_event(&self, event: TraceEvent) {
        self.events.borrow_mut().push(event);
    }
}
