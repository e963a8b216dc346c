//! ARP cache entry lifecycle: `Incomplete` (one pending frame, awaiting a reply), `Alive`
//! (resolved), `Dead` (resolution failed, negatively cached).
//!
//! Grounded in `ArpCache::Entry`'s `ALIVE`/`WAIT_REPLY`/`DEAD` states from
//! `examples/original_source/src/internet-node/arp-l3-protocol.cc`.

use crate::sim::SimTime;

/// A payload parked at an `Incomplete` entry, waiting for the hardware address that will let it
/// be handed to [`crate::device::CsmaDevice::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPacket {
    pub payload: Vec<u8>,
    pub protocol: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpEntryState {
    Incomplete {
        pending: PendingPacket,
        request_time: SimTime,
    },
    Alive {
        mac: crate::mac_address::MacAddress,
        learned_time: SimTime,
    },
    Dead {
        since: SimTime,
    },
}

impl ArpEntryState {
    /// True once `now` is past this entry's lifetime for its current state: the request timeout
    /// while `Incomplete`, or the (shared) entry lifetime while `Alive`/`Dead`.
    pub fn is_expired(&self, now: SimTime, timers: &super::cache::ArpTimers) -> bool {
        match self {
            ArpEntryState::Incomplete { request_time, .. } => {
                now.saturating_sub(*request_time) > timers.request_timeout
            }
            ArpEntryState::Alive { learned_time, .. } => {
                now.saturating_sub(*learned_time) > timers.entry_lifetime
            }
            ArpEntryState::Dead { since } => now.saturating_sub(*since) > timers.entry_lifetime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arp::cache::ArpTimers;
    use crate::mac_address::MacAddress;
    use std::time::Duration;

    #[test]
    fn incomplete_expires_after_request_timeout() {
        let timers = ArpTimers {
            request_timeout: Duration::from_secs(3),
            entry_lifetime: Duration::from_secs(1200),
        };
        let entry = ArpEntryState::Incomplete {
            pending: PendingPacket {
                payload: vec![],
                protocol: 0,
            },
            request_time: Duration::from_secs(0),
        };
        assert!(!entry.is_expired(Duration::from_secs(2), &timers));
        assert!(entry.is_expired(Duration::from_secs(4), &timers));
    }

    #[test]
    fn alive_expires_after_entry_lifetime() {
        let timers = ArpTimers {
            request_timeout: Duration::from_secs(3),
            entry_lifetime: Duration::from_secs(100),
        };
        let entry = ArpEntryState::Alive {
            mac: MacAddress::new([0; 6]),
            learned_time: Duration::from_secs(0),
        };
        assert!(!entry.is_expired(Duration::from_secs(50), &timers));
        assert!(entry.is_expired(Duration::from_secs(200), &timers));
    }
}
