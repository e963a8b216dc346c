//! 48-bit hardware addresses and the process-wide unicast allocator.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// A 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress([u8; 6]);

/// `01:00:5e:00:00:00`, the low-order 23 bits of which carry an IPv4 multicast group.
pub const MULTICAST_BASE: MacAddress = MacAddress([0x01, 0x00, 0x5e, 0x00, 0x00, 0x00]);

/// `ff:ff:ff:ff:ff:ff`.
pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub const fn is_broadcast(&self) -> bool {
        self.0[0] == 0xff
            && self.0[1] == 0xff
            && self.0[2] == 0xff
            && self.0[3] == 0xff
            && self.0[4] == 0xff
            && self.0[5] == 0xff
    }

    /// True iff masking out the low-order 23 bits yields [`MULTICAST_BASE`].
    ///
    /// Mirrors `CsmaNetDevice::Receive`'s `mcBuf[3] &= 0x80; mcBuf[4] = 0; mcBuf[5] = 0;` masking.
    pub fn is_multicast(&self) -> bool {
        let mut masked = self.0;
        masked[3] &= 0x80;
        masked[4] = 0;
        masked[5] = 0;
        masked == MULTICAST_BASE.0
    }

    /// Maps an IPv4 multicast group to its Ethernet multicast address per RFC 1112:
    /// the low-order 23 bits of the group address become the low-order 23 bits of
    /// `01:00:5e:00:00:00`.
    pub fn from_ipv4_multicast(group: [u8; 4]) -> Self {
        let mut bytes = MULTICAST_BASE.0;
        bytes[3] |= group[1] & 0x7f;
        bytes[4] = group[2];
        bytes[5] = group[3];
        Self(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

static NEXT_UNICAST: AtomicU64 = AtomicU64::new(1);

/// Allocates the next unicast address from the process-wide counter, mirroring
/// `Mac48Address::Allocate()` in the original source.
///
/// This is process-wide state by design: a real simulator ties this to its own lifetime, but
/// within one process run addresses must never collide, so a single monotonic counter is the
/// simplest faithful reproduction.
pub fn allocate_unicast() -> MacAddress {
    let id = NEXT_UNICAST.fetch_add(1, Ordering::Relaxed);
    let bytes = id.to_be_bytes();
    MacAddress::new([bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
}
