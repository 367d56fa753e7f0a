//! Router statistics.
//!
//! Counters are bumped from the receive tasks and the sweeper thread without
//! locking. The per-interface table is only written while the router is
//! being built, so the hot path takes the read side of its lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Monotonic event count
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last-written value
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One direction of traffic on a link
#[derive(Debug, Default)]
struct Direction {
    packets: Counter,
    bytes: Counter,
    errors: Counter,
}

impl Direction {
    fn frame(&self, len: usize) {
        self.packets.inc();
        self.bytes.add(len as u64);
    }
}

/// Receive and transmit counters of one interface.
///
/// Receive errors are frames dropped as malformed. Transmit errors are
/// frames the transport refused.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    rx: Direction,
    tx: Direction,
}

impl InterfaceStats {
    fn snapshot(&self) -> InterfaceSnapshot {
        InterfaceSnapshot {
            rx_packets: self.rx.packets.get(),
            rx_bytes: self.rx.bytes.get(),
            rx_errors: self.rx.errors.get(),
            tx_packets: self.tx.packets.get(),
            tx_bytes: self.tx.bytes.get(),
            tx_errors: self.tx.errors.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_errors: u64,
}

/// Values of every metric at one instant, interfaces sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_forwarded: u64,
    pub packets_dropped: u64,
    pub icmp_echo_replies: u64,
    pub icmp_errors_sent: u64,
    pub arp_requests_sent: u64,
    pub arp_replies_sent: u64,
    pub arp_resolution_failures: u64,
    pub arp_cache_size: u64,
    pub arp_pending_requests: u64,
    pub interfaces: BTreeMap<String, InterfaceSnapshot>,
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    links: RwLock<HashMap<String, InterfaceStats>>,

    pub packets_forwarded: Counter,
    /// Any drop: no route, expired TTL, bad checksum, unresolved next hop
    pub packets_dropped: Counter,

    pub icmp_echo_replies: Counter,
    /// Unreachable and time-exceeded messages
    pub icmp_errors_sent: Counter,

    pub arp_requests_sent: Counter,
    pub arp_replies_sent: Counter,
    /// Next hops given up on after the last retry
    pub arp_resolution_failures: Counter,

    /// Refreshed by each sweep
    pub arp_cache_size: Gauge,
    pub arp_pending_requests: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty counter set for `name`. Frames on names never
    /// registered are not counted.
    pub fn register_interface(&self, name: &str) {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_owned())
            .or_default();
    }

    fn link(&self, name: &str, update: impl FnOnce(&InterfaceStats)) {
        let links = self.links.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(stats) = links.get(name) {
            update(stats);
        }
    }

    pub fn record_rx(&self, interface: &str, len: usize) {
        self.link(interface, |s| s.rx.frame(len));
    }

    pub fn record_tx(&self, interface: &str, len: usize) {
        self.link(interface, |s| s.tx.frame(len));
    }

    pub fn record_rx_error(&self, interface: &str) {
        self.link(interface, |s| s.rx.errors.inc());
    }

    pub fn record_tx_error(&self, interface: &str) {
        self.link(interface, |s| s.tx.errors.inc());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let interfaces = self
            .links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect();

        MetricsSnapshot {
            packets_forwarded: self.packets_forwarded.get(),
            packets_dropped: self.packets_dropped.get(),
            icmp_echo_replies: self.icmp_echo_replies.get(),
            icmp_errors_sent: self.icmp_errors_sent.get(),
            arp_requests_sent: self.arp_requests_sent.get(),
            arp_replies_sent: self.arp_replies_sent.get(),
            arp_resolution_failures: self.arp_resolution_failures.get(),
            arp_cache_size: self.arp_cache_size.get(),
            arp_pending_requests: self.arp_pending_requests.get(),
            interfaces,
        }
    }
}
