//! The ARP resolver: the above-link protocol that turns an IPv4 destination into a hardware
//! address before a frame can be handed to a [`crate::device::CsmaDevice`].
//!
//! Grounded in `ArpL3Protocol::Lookup`/`::Receive`/`SendArpRequest`/`SendArpReply` from
//! `examples/original_source/src/internet-node/arp-l3-protocol.cc`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

use super::cache::{ArpCache, ArpTimers};
use super::entry::{ArpEntryState, PendingPacket};
use super::message::{ArpMessage, ArpOpcode};
use crate::device::CsmaDevice;
use crate::frame::ETHERTYPE_ARP;
use crate::mac_address::MacAddress;
use crate::sim::Scheduler;
use crate::trace::{DropReason, TraceEvent, TraceSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Ready(MacAddress),
    Pending,
}

/// One resolver serves every device attached to it, each with its own cache and interface IP.
pub struct ArpResolver {
    scheduler: Rc<dyn Scheduler>,
    sink: Rc<dyn TraceSink>,
    timers: ArpTimers,
    caches: RefCell<HashMap<MacAddress, ArpCache>>,
    interface_ips: RefCell<HashMap<MacAddress, Ipv4Addr>>,
}

impl ArpResolver {
    pub fn new(scheduler: Rc<dyn Scheduler>, sink: Rc<dyn TraceSink>, timers: ArpTimers) -> Rc<Self> {
        Rc::new(Self {
            scheduler,
            sink,
            timers,
            caches: RefCell::new(HashMap::new()),
            interface_ips: RefCell::new(HashMap::new()),
        })
    }

    pub fn set_interface_ip(&self, device: &CsmaDevice, ip: Ipv4Addr) {
        self.interface_ips.borrow_mut().insert(device.address(), ip);
    }

    fn interface_ip(&self, device: &CsmaDevice) -> Option<Ipv4Addr> {
        self.interface_ips.borrow().get(&device.address()).copied()
    }

    /// Wires this resolver in front of `device`'s receive path: ARP-protocol frames are consumed
    /// here, everything else is forwarded to `upper_layer` exactly as the device delivered it.
    pub fn attach(
        self: &Rc<Self>,
        device: &CsmaDevice,
        interface_ip: Ipv4Addr,
        mut upper_layer: impl FnMut(Vec<u8>, u16, MacAddress) + 'static,
    ) {
        self.set_interface_ip(device, interface_ip);
        let resolver = self.clone();
        let dev = device.clone();
        device.set_on_receive(move |payload, protocol, source| {
            if protocol == ETHERTYPE_ARP {
                resolver.receive(&dev, &payload, source);
            } else {
                upper_layer(payload, protocol, source);
            }
        });
    }

    /// Drops `device`'s entire cache, reporting any parked pending frames as dropped. Call on
    /// link-change.
    pub fn flush(&self, device: &CsmaDevice) {
        let Some(mut cache) = self.caches.borrow_mut().remove(&device.address()) else {
            return;
        };
        for (_, entry) in cache.drain() {
            if let ArpEntryState::Incomplete { .. } = entry {
                self.sink.on_event(TraceEvent::Drop {
                    device: device.address(),
                    reason: DropReason::ArpTimeout,
                });
            }
        }
    }

    /// Resolves `destination_ip` for a `payload`/`protocol` pair the IPv4 layer wants to send
    /// from `device`, driving the cache entry through its full state table.
    pub fn resolve(
        &self,
        device: &CsmaDevice,
        destination_ip: Ipv4Addr,
        payload: &[u8],
        protocol: u16,
    ) -> ResolveOutcome {
        let now = self.scheduler.now();
        let mut caches = self.caches.borrow_mut();
        let cache = caches.entry(device.address()).or_insert_with(ArpCache::new);

        let existing = cache.get(&destination_ip).cloned();
        match existing {
            None => {
                cache.insert(
                    destination_ip,
                    ArpEntryState::Incomplete {
                        pending: PendingPacket {
                            payload: payload.to_vec(),
                            protocol,
                        },
                        request_time: now,
                    },
                );
                drop(caches);
                self.send_arp_request(device, destination_ip);
                ResolveOutcome::Pending
            }
            Some(entry) if entry.is_expired(now, &self.timers) => {
                match entry {
                    ArpEntryState::Alive { .. } | ArpEntryState::Dead { .. } => {
                        cache.insert(
                            destination_ip,
                            ArpEntryState::Incomplete {
                                pending: PendingPacket {
                                    payload: payload.to_vec(),
                                    protocol,
                                },
                                request_time: now,
                            },
                        );
                        drop(caches);
                        self.send_arp_request(device, destination_ip);
                        ResolveOutcome::Pending
                    }
                    ArpEntryState::Incomplete { .. } => {
                        cache.insert(destination_ip, ArpEntryState::Dead { since: now });
                        drop(caches);
                        self.sink.on_event(TraceEvent::Drop {
                            device: device.address(),
                            reason: DropReason::ArpTimeout,
                        });
                        ResolveOutcome::Pending
                    }
                }
            }
            Some(ArpEntryState::Alive { mac, .. }) => ResolveOutcome::Ready(mac),
            Some(ArpEntryState::Dead { .. }) => {
                drop(caches);
                self.sink.on_event(TraceEvent::Drop {
                    device: device.address(),
                    reason: DropReason::ArpDeadEntry,
                });
                ResolveOutcome::Pending
            }
            Some(ArpEntryState::Incomplete { request_time, .. }) => {
                cache.insert(
                    destination_ip,
                    ArpEntryState::Incomplete {
                        pending: PendingPacket {
                            payload: payload.to_vec(),
                            protocol,
                        },
                        request_time,
                    },
                );
                drop(caches);
                self.sink.on_event(TraceEvent::Drop {
                    device: device.address(),
                    reason: DropReason::ArpPendingReplaced,
                });
                ResolveOutcome::Pending
            }
        }
    }

    /// Handles an inbound ARP message already stripped of its Ethernet framing.
    pub fn receive(&self, device: &CsmaDevice, payload: &[u8], _source: MacAddress) {
        let Ok(message) = ArpMessage::decode(payload) else {
            log::debug!("device {} received an unparseable ARP message", device.address());
            return;
        };
        let Some(own_ip) = self.interface_ip(device) else {
            return;
        };

        match message.opcode {
            ArpOpcode::Request if message.target_ip == own_ip => {
                self.send_arp_reply(device, message.sender_mac, message.sender_ip, own_ip);
            }
            ArpOpcode::Reply if message.target_ip == own_ip && message.target_mac == device.address() => {
                let now = self.scheduler.now();
                let pending = {
                    let mut caches = self.caches.borrow_mut();
                    let cache = caches.entry(device.address()).or_insert_with(ArpCache::new);
                    match cache.get(&message.sender_ip) {
                        Some(ArpEntryState::Incomplete { pending, .. }) => {
                            let pending = pending.clone();
                            cache.insert(
                                message.sender_ip,
                                ArpEntryState::Alive {
                                    mac: message.sender_mac,
                                    learned_time: now,
                                },
                            );
                            Some(pending)
                        }
                        _ => None,
                    }
                };
                if let Some(pending) = pending {
                    device.send(&pending.payload, message.sender_mac, pending.protocol);
                }
                // A reply for an entry that was never waiting is silently dropped: possible
                // cache poisoning.
            }
            _ => {}
        }
    }

    fn send_arp_request(&self, device: &CsmaDevice, target_ip: Ipv4Addr) {
        let Some(sender_ip) = self.interface_ip(device) else {
            return;
        };
        let message = ArpMessage {
            opcode: ArpOpcode::Request,
            sender_mac: device.address(),
            sender_ip,
            target_mac: MacAddress::new([0; 6]),
            target_ip,
        };
        device.send(&message.encode(), crate::mac_address::BROADCAST, ETHERTYPE_ARP);
    }

    fn send_arp_reply(&self, device: &CsmaDevice, target_mac: MacAddress, target_ip: Ipv4Addr, sender_ip: Ipv4Addr) {
        let message = ArpMessage {
            opcode: ArpOpcode::Reply,
            sender_mac: device.address(),
            sender_ip,
            target_mac,
            target_ip,
        };
        device.send(&message.encode(), target_mac, ETHERTYPE_ARP);
    }
}
