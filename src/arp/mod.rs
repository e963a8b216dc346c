//! ARP: cache entry lifecycle, per-device cache, and the resolver that sits between the IPv4
//! layer and [`crate::device::CsmaDevice`].

pub mod cache;
pub mod entry;
pub mod message;
pub mod resolver;

pub use cache::{ArpCache, ArpTimers};
pub use entry::{ArpEntryState, PendingPacket};
pub use message::{ArpError, ArpMessage, ArpOpcode};
pub use resolver::{ArpResolver, ResolveOutcome};
