//! A CSMA-style shared-medium network device bound to a shared channel, cooperating with an
//! ARP resolver that sits between the link layer and an IPv4 layer.
//!
//! Modules are laid out leaf-first: [`mac_address`], [`packet`], [`queue`], [`trace`], [`sim`],
//! and [`fcs`] are the collaborators and small data types everything else builds on; [`frame`]
//! and [`backoff`] are the two independent link-layer building blocks; [`channel`] and
//! [`device`] implement the CSMA bus and the per-device transmit state machine; [`arp`]
//! implements the resolver that sits above the device.

pub mod arp;
pub mod backoff;
pub mod channel;
pub mod device;
pub mod fcs;
pub mod frame;
pub mod mac_address;
pub mod packet;
pub mod queue;
pub mod sim;
pub mod trace;

pub use arp::{ArpResolver, ArpTimers, ResolveOutcome};
pub use backoff::{BackoffController, BackoffParams};
pub use channel::{ChannelParams, ChannelState, SharedChannel};
pub use device::{CsmaDevice, SendError, TxState};
pub use frame::EncapsulationMode;
pub use mac_address::MacAddress;
