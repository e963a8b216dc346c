//! The shared bus all attached devices contend for.
//!
//! Grounded in `CsmaChannel`/`CsmaNetDevice::TransmitStart`/`TransmitCompleteEvent` from the
//! original source: a channel has at most one transmitter at a time, and delivery to the other
//! attached devices happens after a fixed propagation delay.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::frame::Frame;
use crate::sim::{Scheduler, SimTime};

/// Fixed, channel-wide parameters a device mirrors onto itself on [`SharedChannel::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParams {
    /// Bits per second.
    pub data_rate_bps: u64,
    pub propagation_delay: SimTime,
    /// Mandatory idle time a device observes after `end_transmit` before it may transmit again.
    pub inter_frame_gap: SimTime,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            data_rate_bps: 10_000_000,
            propagation_delay: Duration::from_nanos(6_560), // ~1000m of copper at ~2/3 c
            inter_frame_gap: Duration::from_nanos(9_600),   // 96 bit-times at 10 Mbps
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Transmitting,
    Propagating,
}

/// Anything the channel can deliver a frame to. Implemented on the device's own `RefCell<Inner>`
/// rather than on [`crate::device::CsmaDevice`] directly, so attaching can downgrade the
/// allocation callers actually keep alive instead of a disposable wrapper; kept as a trait so
/// `channel` never depends on the concrete device type.
pub trait ChannelEndpoint {
    fn receive(&self, frame: Frame);
}

struct Inner {
    state: ChannelState,
    transmitter: Option<usize>,
    in_flight: Option<Frame>,
    devices: Vec<Weak<dyn ChannelEndpoint>>,
}

/// A shared CSMA bus. Devices hold this strongly (`Rc<SharedChannel>`); the channel holds
/// devices only weakly, by dense integer id, to avoid a reference cycle.
pub struct SharedChannel {
    params: ChannelParams,
    scheduler: Rc<dyn Scheduler>,
    inner: RefCell<Inner>,
}

impl SharedChannel {
    pub fn new(params: ChannelParams, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        Rc::new(Self {
            params,
            scheduler,
            inner: RefCell::new(Inner {
                state: ChannelState::Idle,
                transmitter: None,
                in_flight: None,
                devices: Vec::new(),
            }),
        })
    }

    pub fn params(&self) -> ChannelParams {
        self.params
    }

    /// Attaches `endpoint`, returning its dense device id.
    pub fn attach(&self, endpoint: &Rc<dyn ChannelEndpoint>) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.devices.push(Rc::downgrade(endpoint));
        inner.devices.len() - 1
    }

    pub fn state(&self) -> ChannelState {
        self.inner.borrow().state
    }

    /// Succeeds (and becomes the sole transmitter) iff the channel is `Idle`.
    pub fn begin_transmit(&self, frame: Frame, from_id: usize) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.state != ChannelState::Idle {
            return false;
        }
        inner.state = ChannelState::Transmitting;
        inner.transmitter = Some(from_id);
        inner.in_flight = Some(frame);
        true
    }

    /// Ends the current transmission. `from_id` must be the id that began it; a mismatch is a
    /// fatal invariant violation, never a recoverable error.
    pub fn end_transmit(self: &Rc<Self>, from_id: usize) {
        let frame = {
            let mut inner = self.inner.borrow_mut();
            assert_eq!(
                inner.state,
                ChannelState::Transmitting,
                "end_transmit called while channel is not Transmitting"
            );
            assert_eq!(
                inner.transmitter,
                Some(from_id),
                "end_transmit called by a sender that did not begin the transmission"
            );
            inner.state = ChannelState::Propagating;
            inner.in_flight.take().expect("Transmitting with no in-flight frame")
        };

        let channel = self.clone();
        self.scheduler.schedule(
            self.params.propagation_delay,
            Box::new(move || channel.deliver(frame, from_id)),
        );
    }

    fn deliver(&self, frame: Frame, from_id: usize) {
        let devices: Vec<_> = {
            let inner = self.inner.borrow();
            inner.devices.clone()
        };
        for (id, weak) in devices.iter().enumerate() {
            if id == from_id {
                continue;
            }
            if let Some(device) = weak.upgrade() {
                device.receive(frame.clone());
            }
        }
        let mut inner = self.inner.borrow_mut();
        inner.state = ChannelState::Idle;
        inner.transmitter = None;
    }
}
