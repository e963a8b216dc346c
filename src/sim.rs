//! The discrete-event scheduler collaborator.
//!
//! The scheduler itself is an out-of-scope collaborator: this module defines the interface a
//! production simulation core is expected to implement (`Scheduler`), plus a small reference
//! implementation (`reference::ReferenceScheduler`) this crate's own tests drive against.

use core::time::Duration;
use std::rc::Rc;

/// Simulated time, measured as an offset from the scheduler's epoch.
///
/// A newtype over [`Duration`] rather than a bare integer so that call sites read as time, not
/// counts of some unstated unit.
pub type SimTime = Duration;

/// A scheduled action. Boxed so the scheduler need not know the concrete closure type.
pub type Action = Box<dyn FnOnce()>;

/// Opaque handle to a scheduled event. Reference schedulers may use this for cancellation; this
/// crate never cancels an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

/// The collaborator interface consumed by the device, channel, and ARP resolver.
///
/// Implementations must guarantee: `now()` is monotonically non-decreasing, and two actions
/// scheduled for the same simulated time run in the order they were scheduled (FIFO tie-break).
pub trait Scheduler {
    fn now(&self) -> SimTime;
    fn schedule(&self, delay: SimTime, action: Action) -> EventId;
}

/// Schedules `action` against a weak handle to `target`, turning a wakeup addressed to an
/// already-disposed object into a safe no-op.
///
/// Every self-rescheduling callback in `device` and `arp` goes through this helper instead of
/// capturing an `Rc` directly, so a disposed device can never be kept alive purely by its own
/// pending timers.
pub fn schedule_weak<T: 'static>(
    scheduler: &dyn Scheduler,
    delay: SimTime,
    target: &Rc<std::cell::RefCell<T>>,
    action: impl FnOnce(&Rc<std::cell::RefCell<T>>) + 'static,
) -> EventId {
    let weak = Rc::downgrade(target);
    scheduler.schedule(
        delay,
        Box::new(move || {
            if let Some(strong) = weak.upgrade() {
                action(&strong);
            }
        }),
    )
}

/// A deterministic, single-threaded reference [`Scheduler`] for tests and small embedders.
///
/// Not part of the core spec (the scheduler is a collaborator by interface only), but kept here
/// so the crate's own test suite is self-contained without pulling in a full simulation core.
pub mod reference {
    use super::*;
    use std::cell::RefCell;
    use std::cmp::Ordering as CmpOrdering;
    use std::collections::BinaryHeap;

    struct Event {
        time: SimTime,
        seq: u64,
        action: Action,
    }

    impl PartialEq for Event {
        fn eq(&self, other: &Self) -> bool {
            self.time == other.time && self.seq == other.seq
        }
    }
    impl Eq for Event {}

    impl PartialOrd for Event {
        fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Event {
        fn cmp(&self, other: &Self) -> CmpOrdering {
            // BinaryHeap is a max-heap; invert so earlier time (then lower seq) pops first.
            other
                .time
                .cmp(&self.time)
                .then_with(|| other.seq.cmp(&self.seq))
        }
    }

    #[derive(Default)]
    struct Inner {
        now: SimTime,
        next_seq: u64,
        queue: BinaryHeap<Event>,
    }

    /// A min-heap based scheduler: `run_until_idle` pops events in `(time, insertion order)`.
    #[derive(Default)]
    pub struct ReferenceScheduler {
        inner: RefCell<Inner>,
    }

    impl ReferenceScheduler {
        pub fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        /// Runs every scheduled event, including ones scheduled by earlier events, until the
        /// queue is empty. `now()` tracks the most recently executed event's time.
        pub fn run_until_idle(&self) {
            loop {
                let next = self.inner.borrow_mut().queue.pop();
                match next {
                    Some(event) => {
                        self.inner.borrow_mut().now = event.time;
                        (event.action)();
                    }
                    None => break,
                }
            }
        }

        /// Runs events up to and including `deadline`.
        pub fn run_until(&self, deadline: SimTime) {
            loop {
                let ready = matches!(self.inner.borrow().queue.peek(), Some(e) if e.time <= deadline);
                if !ready {
                    break;
                }
                let event = self.inner.borrow_mut().queue.pop().unwrap();
                self.inner.borrow_mut().now = event.time;
                (event.action)();
            }
            let mut inner = self.inner.borrow_mut();
            if inner.now < deadline {
                inner.now = deadline;
            }
        }
    }

    impl Scheduler for ReferenceScheduler {
        fn now(&self) -> SimTime {
            self.inner.borrow().now
        }

        fn schedule(&self, delay: SimTime, action: Action) -> EventId {
            let mut inner = self.inner.borrow_mut();
            let time = inner.now + delay;
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.queue.push(Event { time, seq, action });
            EventId(seq)
        }
    }

}
