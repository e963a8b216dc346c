//! The ARP wire message: RFC 826/5227 layout as implemented by ns-3's `ArpHeader`.

use std::net::Ipv4Addr;

use crate::mac_address::MacAddress;

const HARDWARE_TYPE_ETHERNET: u16 = 1;
const PROTOCOL_TYPE_IPV4: u16 = 0x0800;
const HARDWARE_LEN: u8 = 6;
const PROTOCOL_LEN: u8 = 4;

pub const WIRE_LEN: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOpcode {
    Request,
    Reply,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArpError {
    #[error("ARP message shorter than {WIRE_LEN} bytes: have {0}")]
    TooShort(usize),
    #[error("unsupported ARP hardware type {0}")]
    UnsupportedHardwareType(u16),
    #[error("unsupported ARP protocol type {0}")]
    UnsupportedProtocolType(u16),
    #[error("unknown ARP opcode {0}")]
    UnknownOpcode(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub opcode: ArpOpcode,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Addr,
}

impl ArpMessage {
    pub fn encode(&self) -> [u8; WIRE_LEN] {
        let mut bytes = [0u8; WIRE_LEN];
        bytes[0..2].copy_from_slice(&HARDWARE_TYPE_ETHERNET.to_be_bytes());
        bytes[2..4].copy_from_slice(&PROTOCOL_TYPE_IPV4.to_be_bytes());
        bytes[4] = HARDWARE_LEN;
        bytes[5] = PROTOCOL_LEN;
        let opcode: u16 = match self.opcode {
            ArpOpcode::Request => 1,
            ArpOpcode::Reply => 2,
        };
        bytes[6..8].copy_from_slice(&opcode.to_be_bytes());
        bytes[8..14].copy_from_slice(&self.sender_mac.octets());
        bytes[14..18].copy_from_slice(&self.sender_ip.octets());
        bytes[18..24].copy_from_slice(&self.target_mac.octets());
        bytes[24..28].copy_from_slice(&self.target_ip.octets());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ArpError> {
        if bytes.len() < WIRE_LEN {
            return Err(ArpError::TooShort(bytes.len()));
        }
        let hardware_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        if hardware_type != HARDWARE_TYPE_ETHERNET {
            return Err(ArpError::UnsupportedHardwareType(hardware_type));
        }
        let protocol_type = u16::from_be_bytes([bytes[2], bytes[3]]);
        if protocol_type != PROTOCOL_TYPE_IPV4 {
            return Err(ArpError::UnsupportedProtocolType(protocol_type));
        }
        let opcode = match u16::from_be_bytes([bytes[6], bytes[7]]) {
            1 => ArpOpcode::Request,
            2 => ArpOpcode::Reply,
            other => return Err(ArpError::UnknownOpcode(other)),
        };
        let sender_mac = MacAddress::new(bytes[8..14].try_into().unwrap());
        let sender_ip = Ipv4Addr::new(bytes[14], bytes[15], bytes[16], bytes[17]);
        let target_mac = MacAddress::new(bytes[18..24].try_into().unwrap());
        let target_ip = Ipv4Addr::new(bytes[24], bytes[25], bytes[26], bytes[27]);

        Ok(Self {
            opcode,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }
}
