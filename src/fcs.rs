//! The Ethernet frame check sequence: standard CRC-32 (ISO-HDLC / IEEE 802.3), computed over
//! everything ahead of the trailer.

use crc::{Crc, CRC_32_ISO_HDLC};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Computes the FCS over `bytes` (destination, source, length/type, optional LLC/SNAP, payload).
pub fn compute(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}
