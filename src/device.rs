//! The CSMA network device: framing, the outbound queue, the carrier-sense transmit state
//! machine, and receive-side filtering.
//!
//! Grounded in `CsmaNetDevice`'s `TransmitStart`/`TransmitAbort`/`TransmitCompleteEvent`/
//! `TransmitReadyEvent`/`Receive` from the original source.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::backoff::{BackoffController, BackoffParams};
use crate::channel::{ChannelEndpoint, ChannelState, SharedChannel};
use crate::frame::{self, EncapsulationMode, Frame, FrameError};
use crate::mac_address::{self, MacAddress};
use crate::packet::Packet;
use crate::queue::Queue;
use crate::sim::{self, Scheduler};
use crate::trace::{DropReason, TraceEvent, TraceSink};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("device is not attached to a channel")]
    LinkDown,
    #[error("send is disabled on this device")]
    SendDisabled,
    #[error("outbound queue is full")]
    QueueFull,
}

/// The transmit state machine's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Ready,
    Backoff,
    Busy,
    Gap,
}

struct Inner {
    address: MacAddress,
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn TraceSink>,
    channel: Option<Rc<SharedChannel>>,
    device_id: Option<usize>,
    data_rate_bps: u64,
    inter_frame_gap: sim::SimTime,
    queue: Option<Box<dyn Queue<Frame>>>,
    current: Option<Frame>,
    backoff: BackoffController,
    encapsulation: EncapsulationMode,
    send_enabled: bool,
    receive_enabled: bool,
    fsm: TxState,
    on_receive: Option<Box<dyn FnMut(Vec<u8>, u16, MacAddress)>>,
}

/// A cheap-to-clone handle onto one CSMA device. Every method call borrows the shared `Inner`
/// for the duration of the call only; nothing here is re-entrant across a scheduled event.
#[derive(Clone)]
pub struct CsmaDevice(Rc<RefCell<Inner>>);

impl CsmaDevice {
    pub fn new(address: MacAddress, scheduler: Rc<dyn Scheduler>, sink: Rc<dyn TraceSink>) -> Self {
        Self(Rc::new(RefCell::new(Inner {
            address,
            scheduler,
            sink,
            channel: None,
            device_id: None,
            data_rate_bps: 0,
            inter_frame_gap: Duration::ZERO,
            queue: None,
            current: None,
            backoff: BackoffController::new(BackoffParams::default()),
            encapsulation: EncapsulationMode::default(),
            send_enabled: true,
            receive_enabled: true,
            fsm: TxState::Ready,
            on_receive: None,
        })))
    }

    pub fn address(&self) -> MacAddress {
        self.0.borrow().address
    }

    pub fn transmit_state(&self) -> TxState {
        self.0.borrow().fsm
    }

    pub fn is_attached(&self) -> bool {
        self.0.borrow().channel.is_some()
    }

    fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.0.borrow().scheduler.clone()
    }

    fn sink(&self) -> Rc<dyn TraceSink> {
        self.0.borrow().sink.clone()
    }

    /// Binds `channel`; copies its data rate and inter-frame gap onto this device.
    ///
    /// Downgrades this device's own `Rc<RefCell<Inner>>` (coerced to `Rc<dyn ChannelEndpoint>`)
    /// rather than allocating a fresh wrapper to downgrade: a disposable `Rc` dropped at the end
    /// of this function would leave the channel holding a `Weak` that can never upgrade.
    pub fn attach(&self, channel: Rc<SharedChannel>) {
        let endpoint: Rc<dyn ChannelEndpoint> = self.0.clone();
        let id = channel.attach(&endpoint);
        let params = channel.params();

        let mut inner = self.0.borrow_mut();
        inner.data_rate_bps = params.data_rate_bps;
        inner.inter_frame_gap = params.inter_frame_gap;
        inner.channel = Some(channel);
        inner.device_id = Some(id);
    }

    pub fn set_queue(&self, queue: Box<dyn Queue<Frame>>) {
        self.0.borrow_mut().queue = Some(queue);
    }

    pub fn set_backoff(&self, params: BackoffParams) {
        self.0.borrow_mut().backoff = BackoffController::new(params);
    }

    pub fn set_encapsulation(&self, mode: EncapsulationMode) {
        self.0.borrow_mut().encapsulation = mode;
    }

    pub fn set_send_enabled(&self, enabled: bool) {
        self.0.borrow_mut().send_enabled = enabled;
    }

    pub fn set_receive_enabled(&self, enabled: bool) {
        self.0.borrow_mut().receive_enabled = enabled;
    }

    /// Installs the upward delivery callback, `(payload, protocol, source_mac)`.
    pub fn set_on_receive(&self, callback: impl FnMut(Vec<u8>, u16, MacAddress) + 'static) {
        self.0.borrow_mut().on_receive = Some(Box::new(callback));
    }

    /// Encodes and enqueues `payload`, starting transmission immediately if the device is
    /// `Ready`. Returns the reason for rejection, if any; see [`Self::send`] for the simple
    /// boolean-accept surface most callers use.
    pub fn send_detailed(&self, payload: &[u8], dest: MacAddress, protocol: u16) -> Result<(), SendError> {
        let (attached, send_enabled, address, encapsulation) = {
            let inner = self.0.borrow();
            (
                inner.channel.is_some(),
                inner.send_enabled,
                inner.address,
                inner.encapsulation,
            )
        };
        if !attached {
            return Err(SendError::LinkDown);
        }
        if !send_enabled {
            return Err(SendError::SendDisabled);
        }

        let encoded = frame::encode(payload, dest, address, encapsulation, protocol);

        let enqueued = {
            let mut inner = self.0.borrow_mut();
            let queue = inner
                .queue
                .as_mut()
                .expect("send called before set_queue installed an outbound queue");
            queue.enqueue(encoded)
        };
        if !enqueued {
            return Err(SendError::QueueFull);
        }

        let ready = self.0.borrow().fsm == TxState::Ready;
        if ready {
            let next = self.0.borrow_mut().queue.as_mut().unwrap().dequeue();
            self.0.borrow_mut().current = next;
            self.transmit_start();
        }
        Ok(())
    }

    pub fn send(&self, payload: &[u8], dest: MacAddress, protocol: u16) -> bool {
        match self.send_detailed(payload, dest, protocol) {
            Ok(()) => true,
            Err(err) => {
                log::debug!("device {} rejected send: {err}", self.address());
                false
            }
        }
    }

    fn transmit_start(&self) {
        let (channel, id) = {
            let inner = self.0.borrow();
            (inner.channel.clone(), inner.device_id)
        };
        let channel = channel.expect("transmit_start without an attached channel");
        let id = id.expect("transmit_start without a device id");

        if channel.state() != ChannelState::Idle {
            self.handle_busy_channel();
            return;
        }

        let frame = self
            .0
            .borrow()
            .current
            .clone()
            .expect("transmit_start with no current frame");
        let began = channel.begin_transmit(frame.clone(), id);
        assert!(began, "channel reported Idle but rejected begin_transmit");

        let data_rate_bps = self.0.borrow().data_rate_bps;
        let tx_time = Duration::from_secs_f64((frame.size() as f64 * 8.0) / data_rate_bps as f64);
        self.0.borrow_mut().backoff.reset();
        self.0.borrow_mut().fsm = TxState::Busy;

        let scheduler = self.scheduler();
        sim::schedule_weak(scheduler.as_ref(), tx_time, &self.0, |inner| {
            CsmaDevice(inner.clone()).transmit_complete();
        });
    }

    fn handle_busy_channel(&self) {
        let exhausted = self.0.borrow().backoff.exhausted();
        if exhausted {
            let address = self.0.borrow().address;
            let dropped = self.0.borrow_mut().current.take();
            if dropped.is_some() {
                self.sink().on_event(TraceEvent::Drop {
                    device: address,
                    reason: DropReason::BackoffExhausted,
                });
            }
            self.0.borrow_mut().backoff.reset();
            let next = self.0.borrow_mut().queue.as_mut().unwrap().dequeue();
            match next {
                Some(frame) => {
                    self.0.borrow_mut().current = Some(frame);
                    self.0.borrow_mut().fsm = TxState::Ready;
                    self.transmit_start();
                }
                None => {
                    self.0.borrow_mut().fsm = TxState::Ready;
                }
            }
            return;
        }

        self.0.borrow_mut().backoff.record_attempt();
        let delay = self.0.borrow().backoff.next_delay();
        self.0.borrow_mut().fsm = TxState::Backoff;

        let scheduler = self.scheduler();
        sim::schedule_weak(scheduler.as_ref(), delay, &self.0, |inner| {
            CsmaDevice(inner.clone()).transmit_start();
        });
    }

    fn transmit_complete(&self) {
        let (channel, id, fsm) = {
            let inner = self.0.borrow();
            (inner.channel.clone(), inner.device_id, inner.fsm)
        };
        let channel = channel.expect("transmit_complete without an attached channel");
        let id = id.expect("transmit_complete without a device id");
        assert_eq!(fsm, TxState::Busy, "transmit_complete while device not Busy");
        assert_eq!(
            channel.state(),
            ChannelState::Transmitting,
            "transmit_complete while channel not Transmitting"
        );

        channel.end_transmit(id);

        let gap = self.0.borrow().inter_frame_gap;
        self.0.borrow_mut().fsm = TxState::Gap;

        let scheduler = self.scheduler();
        sim::schedule_weak(scheduler.as_ref(), gap, &self.0, |inner| {
            CsmaDevice(inner.clone()).transmit_ready();
        });
    }

    fn transmit_ready(&self) {
        let next = self.0.borrow_mut().queue.as_mut().unwrap().dequeue();
        match next {
            None => {
                self.0.borrow_mut().current = None;
                self.0.borrow_mut().fsm = TxState::Ready;
            }
            Some(frame) => {
                self.0.borrow_mut().current = Some(frame);
                self.0.borrow_mut().fsm = TxState::Ready;
                self.transmit_start();
            }
        }
    }
}

fn sink_of(inner: &RefCell<Inner>) -> Rc<dyn TraceSink> {
    inner.borrow().sink.clone()
}

fn forward_up(inner: &RefCell<Inner>, payload: Vec<u8>, protocol: u16, source: MacAddress) {
    let mut inner = inner.borrow_mut();
    if let Some(callback) = inner.on_receive.as_mut() {
        callback(payload, protocol, source);
    }
}

/// Receive-side filtering and decode, run against the raw `Inner` cell so it can be driven
/// straight from a `Weak<dyn ChannelEndpoint>` upgrade without reconstructing a `CsmaDevice`.
fn handle_receive(inner: &RefCell<Inner>, frame: Frame) {
    let (receive_enabled, encapsulation, address) = {
        let guard = inner.borrow();
        (guard.receive_enabled, guard.encapsulation, guard.address)
    };

    if !receive_enabled {
        sink_of(inner).on_event(TraceEvent::Drop {
            device: address,
            reason: DropReason::ReceiveDisabled,
        });
        return;
    }

    if encapsulation == EncapsulationMode::Raw {
        let bytes = frame.into_bytes();
        sink_of(inner).on_event(TraceEvent::Rx {
            device: address,
            protocol: 0,
            len: bytes.len(),
        });
        forward_up(inner, bytes, 0, mac_address::BROADCAST);
        return;
    }

    match frame::decode(&frame, encapsulation, address) {
        Ok(decoded) => {
            sink_of(inner).on_event(TraceEvent::Rx {
                device: address,
                protocol: decoded.protocol_or_length,
                len: decoded.payload.len(),
            });
            forward_up(inner, decoded.payload, decoded.protocol_or_length, decoded.source);
        }
        Err(FrameError::BadFcs) | Err(FrameError::TooShort { .. }) => {
            sink_of(inner).on_event(TraceEvent::Drop {
                device: address,
                reason: DropReason::BadFcs,
            });
        }
        Err(FrameError::AddressFilter(_)) => {
            sink_of(inner).on_event(TraceEvent::Drop {
                device: address,
                reason: DropReason::AddressFilter,
            });
        }
    }
}

impl ChannelEndpoint for RefCell<Inner> {
    fn receive(&self, frame: Frame) {
        handle_receive(self, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelParams;
    use crate::queue::FifoQueue;
    use crate::sim::reference::ReferenceScheduler;
    use crate::trace::RecordingSink;
    use std::cell::RefCell as StdRefCell;

    fn new_device(address: [u8; 6], scheduler: &Rc<ReferenceScheduler>, sink: &Rc<RecordingSink>) -> CsmaDevice {
        let device = CsmaDevice::new(MacAddress::new(address), scheduler.clone(), sink.clone());
        device.set_queue(Box::new(FifoQueue::new(8)));
        device
    }

    #[test]
    fn send_without_channel_is_link_down() {
        let scheduler = ReferenceScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let device = new_device([0, 0, 0, 0, 0, 1], &scheduler, &sink);
        assert_eq!(
            device.send_detailed(&[1, 2, 3], mac_address::BROADCAST, 0x0800),
            Err(SendError::LinkDown)
        );
    }

    #[test]
    fn disabled_send_has_no_side_effects() {
        let scheduler = ReferenceScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let channel = SharedChannel::new(ChannelParams::default(), scheduler.clone());
        let device = new_device([0, 0, 0, 0, 0, 1], &scheduler, &sink);
        device.attach(channel);
        device.set_send_enabled(false);

        assert_eq!(
            device.send_detailed(&[1], mac_address::BROADCAST, 0x0800),
            Err(SendError::SendDisabled)
        );
        assert_eq!(device.transmit_state(), TxState::Ready);
    }

    #[test]
    fn two_device_unicast_round_trip_delivers_and_traces_rx() {
        let scheduler = ReferenceScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let channel = SharedChannel::new(ChannelParams::default(), scheduler.clone());

        let a = new_device([0, 0, 0, 0, 0, 1], &scheduler, &sink);
        let b = new_device([0, 0, 0, 0, 0, 2], &scheduler, &sink);
        a.attach(channel.clone());
        b.attach(channel);

        let received = Rc::new(StdRefCell::new(None));
        let received_clone = received.clone();
        b.set_on_receive(move |payload, protocol, source| {
            *received_clone.borrow_mut() = Some((payload, protocol, source));
        });

        let payload = vec![0u8; 64];
        assert!(a.send(&payload, b.address(), 0x0800));
        scheduler.run_until_idle();

        let (got_payload, protocol, source) = received.borrow().clone().unwrap();
        assert_eq!(got_payload, payload);
        assert_eq!(protocol, 0x0800);
        assert_eq!(source, a.address());
        assert_eq!(sink.drop_count(), 0);
        assert_eq!(sink.rx_count(), 1);
    }

    #[test]
    fn busy_channel_forces_sender_into_backoff() {
        let scheduler = ReferenceScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let channel = SharedChannel::new(ChannelParams::default(), scheduler.clone());

        let a = new_device([0, 0, 0, 0, 0, 1], &scheduler, &sink);
        let b = new_device([0, 0, 0, 0, 0, 2], &scheduler, &sink);
        a.attach(channel.clone());
        b.attach(channel);

        assert!(a.send(&[0u8; 64], b.address(), 0x0800));
        assert_eq!(a.transmit_state(), TxState::Busy);

        assert!(b.send(&[0u8; 8], a.address(), 0x0800));
        assert_eq!(b.transmit_state(), TxState::Backoff);

        scheduler.run_until_idle();
        assert_eq!(sink.drop_count(), 0);
    }

    #[test]
    fn backoff_exhaustion_drops_current_frame_and_continues() {
        let scheduler = ReferenceScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let channel = SharedChannel::new(ChannelParams::default(), scheduler.clone());

        let jammer = new_device([0, 0, 0, 0, 0, 9], &scheduler, &sink);
        jammer.attach(channel.clone());
        // Hold the channel busy for the whole test by never calling end_transmit.
        let jam_frame = frame::encode(&[0u8; 4], mac_address::BROADCAST, jammer.address(), EncapsulationMode::IpArp, 0);
        assert!(channel.begin_transmit(jam_frame, 0));

        let a = new_device([0, 0, 0, 0, 0, 1], &scheduler, &sink);
        a.attach(channel);
        a.set_backoff(BackoffParams {
            slot_time: Duration::from_nanos(1),
            min_slots: 1,
            max_slots: 2,
            ceiling: 2,
            max_retries: 2,
        });

        assert!(a.send(&[1, 2, 3], MacAddress::new([0, 0, 0, 0, 0, 2]), 0x0800));
        scheduler.run_until_idle();

        assert_eq!(sink.drop_count(), 1);
        assert_eq!(a.transmit_state(), TxState::Ready);
    }

    #[test]
    fn raw_mode_receive_never_emits_a_drop_trace() {
        let scheduler = ReferenceScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let channel = SharedChannel::new(ChannelParams::default(), scheduler.clone());

        let a = new_device([0, 0, 0, 0, 0, 1], &scheduler, &sink);
        let b = new_device([0, 0, 0, 0, 0, 2], &scheduler, &sink);
        a.set_encapsulation(EncapsulationMode::Raw);
        b.set_encapsulation(EncapsulationMode::Raw);
        a.attach(channel.clone());
        b.attach(channel);

        assert!(a.send(&[5, 6, 7], b.address(), 0));
        scheduler.run_until_idle();

        assert_eq!(sink.drop_count(), 0);
        assert_eq!(sink.rx_count(), 1);
    }

    #[test]
    fn receive_disabled_device_drops_and_does_not_forward() {
        let scheduler = ReferenceScheduler::new();
        let sink = Rc::new(RecordingSink::new());
        let channel = SharedChannel::new(ChannelParams::default(), scheduler.clone());

        let a = new_device([0, 0, 0, 0, 0, 1], &scheduler, &sink);
        let b = new_device([0, 0, 0, 0, 0, 2], &scheduler, &sink);
        a.attach(channel.clone());
        b.attach(channel);
        b.set_receive_enabled(false);

        let forwarded = Rc::new(StdRefCell::new(false));
        let forwarded_clone = forwarded.clone();
        b.set_on_receive(move |_, _, _| *forwarded_clone.borrow_mut() = true);

        assert!(a.send(&[1, 2, 3], b.address(), 0x0800));
        scheduler.run_until_idle();

        assert!(!*forwarded.borrow());
        assert_eq!(sink.drop_count(), 1);
    }
}
