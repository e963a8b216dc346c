//! Per-device map from IPv4 address to [`ArpEntryState`], plus the two expiry timers.
//!
//! Grounded in `ArpCache` from `examples/original_source/src/internet-node/arp-l3-protocol.cc`.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::entry::ArpEntryState;
use crate::sim::SimTime;

/// Expiry configuration. Defaults match ns-3's `ArpCache::m_arpTimeout` (request timeout) and
/// `ArpCache::m_arpAliveTimeout` (positive/negative cache lifetime). This crate uses a single
/// `entry_lifetime` for both `Alive` and `Dead` rather than separate positive/negative timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpTimers {
    pub request_timeout: SimTime,
    pub entry_lifetime: SimTime,
}

impl Default for ArpTimers {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            entry_lifetime: Duration::from_secs(1200),
        }
    }
}

/// One device's ARP cache.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, ArpEntryState>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: &Ipv4Addr) -> Option<&ArpEntryState> {
        self.entries.get(ip)
    }

    pub fn insert(&mut self, ip: Ipv4Addr, entry: ArpEntryState) {
        self.entries.insert(ip, entry);
    }

    /// Removes and returns every entry, in arbitrary order; used by link-change flush.
    pub fn drain(&mut self) -> Vec<(Ipv4Addr, ArpEntryState)> {
        self.entries.drain().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
