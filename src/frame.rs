//! Binary Ethernet framing: header/trailer layout, the four encapsulation modes, and the
//! destination address filter.
//!
//! Grounded in `CsmaNetDevice::AddHeader`/`ProcessHeader`/`Receive` from the original source
//! (`examples/original_source/src/devices/csma/csma-net-device.cc`).

use crate::fcs;
use crate::mac_address::MacAddress;
use crate::packet::{Buffer, Packet};

/// Header: 6-byte dest + 6-byte src + 2-byte length/type.
pub const ETHERNET_HEADER_LEN: usize = 14;
/// Trailer: 4-byte FCS.
pub const ETHERNET_TRAILER_LEN: usize = 4;
/// `DSAP | SSAP | Control | OUI(3) | Protocol(2)`.
pub const LLC_SNAP_LEN: usize = 8;

pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_IPV4: u16 = 0x0800;

const LLC_DSAP: u8 = 0xaa;
const LLC_SSAP: u8 = 0xaa;
const LLC_CONTROL: u8 = 0x03;

/// A device-level framing discipline. Default is `IpArp`, matching `CsmaNetDevice`'s default
/// constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncapsulationMode {
    EthernetV1,
    IpArp,
    Llc,
    Raw,
}

impl Default for EncapsulationMode {
    fn default() -> Self {
        EncapsulationMode::IpArp
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame shorter than the minimum header+trailer size: have {have}, need {need}")]
    TooShort { have: usize, need: usize },
    #[error("frame check sequence mismatch")]
    BadFcs,
    #[error("destination {0} rejected by address filter")]
    AddressFilter(MacAddress),
}

/// The logical view of a decoded frame, as returned by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub payload: Vec<u8>,
    pub protocol_or_length: u16,
    pub source: MacAddress,
    pub destination: MacAddress,
}

/// A frame on the wire. Just the serialized bytes; `Raw` mode frames are payload bytes verbatim.
pub type Frame = Buffer;

/// Encodes `payload` for transmission, per the rules of `mode`.
pub fn encode(
    payload: &[u8],
    dest: MacAddress,
    src: MacAddress,
    mode: EncapsulationMode,
    protocol: u16,
) -> Frame {
    match mode {
        EncapsulationMode::Raw => Buffer::new(payload.to_vec()),
        EncapsulationMode::IpArp => with_ethernet_header(payload, dest, src, protocol),
        EncapsulationMode::EthernetV1 => {
            let length_or_type =
                (payload.len() + ETHERNET_HEADER_LEN + ETHERNET_TRAILER_LEN) as u16;
            with_ethernet_header(payload, dest, src, length_or_type)
        }
        EncapsulationMode::Llc => {
            let mut inner = Vec::with_capacity(LLC_SNAP_LEN + payload.len());
            inner.extend_from_slice(&llc_snap_header(protocol));
            inner.extend_from_slice(payload);
            let length_or_type = (inner.len() + ETHERNET_HEADER_LEN + ETHERNET_TRAILER_LEN) as u16;
            with_ethernet_header(&inner, dest, src, length_or_type)
        }
    }
}

fn with_ethernet_header(inner: &[u8], dest: MacAddress, src: MacAddress, length_or_type: u16) -> Frame {
    let mut buf = Buffer::new(inner.to_vec());
    let mut header = Vec::with_capacity(ETHERNET_HEADER_LEN);
    header.extend_from_slice(&dest.octets());
    header.extend_from_slice(&src.octets());
    header.extend_from_slice(&length_or_type.to_be_bytes());
    buf.add_header(&header);
    let fcs = fcs::compute(buf.as_bytes());
    buf.add_trailer(&fcs.to_be_bytes());
    buf
}

fn llc_snap_header(protocol: u16) -> [u8; LLC_SNAP_LEN] {
    let p = protocol.to_be_bytes();
    [LLC_DSAP, LLC_SSAP, LLC_CONTROL, 0, 0, 0, p[0], p[1]]
}

/// Decodes a frame received on a device whose own unicast address is `own`.
///
/// `Raw` mode always succeeds with `protocol = 0` and `source = broadcast`: the address filter
/// does not apply in `Raw` mode, since there is no header to read a destination from.
pub fn decode(frame: &Frame, mode: EncapsulationMode, own: MacAddress) -> Result<DecodedFrame, FrameError> {
    if mode == EncapsulationMode::Raw {
        return Ok(DecodedFrame {
            payload: frame.as_bytes().to_vec(),
            protocol_or_length: 0,
            source: crate::mac_address::BROADCAST,
            destination: crate::mac_address::BROADCAST,
        });
    }

    let min_len = ETHERNET_HEADER_LEN + ETHERNET_TRAILER_LEN;
    if frame.size() < min_len {
        return Err(FrameError::TooShort {
            have: frame.size(),
            need: min_len,
        });
    }

    let mut buf = frame.clone();
    let trailer = buf.remove_trailer(ETHERNET_TRAILER_LEN);
    let stored_fcs = u32::from_be_bytes(trailer.try_into().unwrap());
    let computed_fcs = fcs::compute(buf.as_bytes());
    if stored_fcs != computed_fcs {
        return Err(FrameError::BadFcs);
    }

    let header = buf.remove_header(ETHERNET_HEADER_LEN);
    let destination = MacAddress::new(header[0..6].try_into().unwrap());
    let source = MacAddress::new(header[6..12].try_into().unwrap());
    let length_or_type = u16::from_be_bytes(header[12..14].try_into().unwrap());

    if destination != own && !destination.is_broadcast() && !destination.is_multicast() {
        return Err(FrameError::AddressFilter(destination));
    }

    let protocol_or_length = match mode {
        EncapsulationMode::Llc => {
            if buf.size() < LLC_SNAP_LEN {
                return Err(FrameError::TooShort {
                    have: buf.size(),
                    need: LLC_SNAP_LEN,
                });
            }
            let llc = buf.remove_header(LLC_SNAP_LEN);
            u16::from_be_bytes([llc[6], llc[7]])
        }
        _ => length_or_type,
    };

    Ok(DecodedFrame {
        payload: buf.into_bytes(),
        protocol_or_length,
        source,
        destination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> (MacAddress, MacAddress) {
        (
            MacAddress::new([0, 0, 0, 0, 0, 1]),
            MacAddress::new([0, 0, 0, 0, 0, 2]),
        )
    }

    #[test]
    fn ip_arp_round_trips() {
        let (src, dest) = addrs();
        let payload = vec![0u8; 64];
        let frame = encode(&payload, dest, src, EncapsulationMode::IpArp, ETHERTYPE_IPV4);
        let decoded = decode(&frame, EncapsulationMode::IpArp, dest).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.protocol_or_length, ETHERTYPE_IPV4);
        assert_eq!(decoded.source, src);
        assert_eq!(decoded.destination, dest);
    }

    #[test]
    fn ethernet_v1_length_covers_header_and_trailer() {
        let (src, dest) = addrs();
        let payload = vec![7u8; 10];
        let frame = encode(&payload, dest, src, EncapsulationMode::EthernetV1, 0);
        let decoded = decode(&frame, EncapsulationMode::EthernetV1, dest).unwrap();
        assert_eq!(
            decoded.protocol_or_length as usize,
            payload.len() + ETHERNET_HEADER_LEN + ETHERNET_TRAILER_LEN
        );
    }

    #[test]
    fn llc_round_trips_and_carries_protocol_in_snap() {
        let (src, dest) = addrs();
        let payload = vec![1, 2, 3, 4];
        let frame = encode(&payload, dest, src, EncapsulationMode::Llc, 0x1234);
        let decoded = decode(&frame, EncapsulationMode::Llc, dest).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.protocol_or_length, 0x1234);
    }

    #[test]
    fn raw_mode_passes_bytes_through_unfiltered() {
        let (src, dest) = addrs();
        let payload = vec![9, 9, 9];
        let frame = encode(&payload, dest, src, EncapsulationMode::Raw, 0);
        let decoded = decode(&frame, EncapsulationMode::Raw, src).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.protocol_or_length, 0);
        assert_eq!(decoded.source, crate::mac_address::BROADCAST);
    }

    #[test]
    fn bad_fcs_is_rejected() {
        let (src, dest) = addrs();
        let mut frame = encode(&[1, 2, 3], dest, src, EncapsulationMode::IpArp, 1);
        let mut bytes = frame.clone().into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        frame = Buffer::new(bytes);
        assert_eq!(
            decode(&frame, EncapsulationMode::IpArp, dest).unwrap_err(),
            FrameError::BadFcs
        );
    }

    #[test]
    fn wrong_unicast_destination_is_filtered() {
        let (src, dest) = addrs();
        let other = MacAddress::new([0, 0, 0, 0, 0, 3]);
        let frame = encode(&[1], dest, src, EncapsulationMode::IpArp, 1);
        assert_eq!(
            decode(&frame, EncapsulationMode::IpArp, other).unwrap_err(),
            FrameError::AddressFilter(dest)
        );
    }

    #[test]
    fn broadcast_and_multicast_destinations_pass_the_filter() {
        let (src, _dest) = addrs();
        let own = MacAddress::new([0, 0, 0, 0, 0, 99]);

        let bcast_frame = encode(&[1], crate::mac_address::BROADCAST, src, EncapsulationMode::IpArp, 1);
        assert!(decode(&bcast_frame, EncapsulationMode::IpArp, own).is_ok());

        let group = MacAddress::from_ipv4_multicast([239, 1, 2, 3]);
        let mcast_frame = encode(&[1], group, src, EncapsulationMode::IpArp, 1);
        assert!(decode(&mcast_frame, EncapsulationMode::IpArp, own).is_ok());
    }
}
