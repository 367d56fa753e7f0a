//! ARP cache and pending-request queue
//!
//! Maps next-hop IPs to MAC addresses. Packets whose next hop is not yet
//! resolved wait in a per-IP [`PendingRequest`] until a reply arrives or the
//! retry budget runs out.
//!
//! Every public method takes the cache lock once, does a bounded amount of
//! work and returns. Nothing here transmits: decisions come back to the caller
//! as [`RequestAction`]s, to be carried out after the lock is released.

use super::clock::Clock;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Tunables for cache aging and request retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpCacheConfig {
    /// Number of entry slots
    pub capacity: usize,
    /// Age after which an entry is no longer used
    pub entry_timeout: Duration,
    /// Minimum gap between two ARP requests for the same IP
    pub retry_interval: Duration,
    /// Requests sent before giving up on an IP
    pub max_requests: u32,
}

impl Default for ArpCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            entry_timeout: Duration::from_secs(15),
            retry_interval: Duration::from_secs(1),
            max_requests: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ArpEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
    added: Instant,
    valid: bool,
}

impl ArpEntry {
    fn is_live(&self, now: Instant, timeout: Duration) -> bool {
        self.valid && now.saturating_duration_since(self.added) <= timeout
    }
}

/// Read-only copy of a cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntrySnapshot {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub age: Duration,
}

/// A frame parked until its next hop resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    /// Complete Ethernet frame; its MAC addresses are rewritten on flush
    pub frame: Vec<u8>,
    /// Interface the frame leaves on once resolved
    pub out_iface: String,
    /// Interface the frame arrived on, used for host-unreachable errors
    pub in_iface: String,
}

/// Outstanding resolution for one IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub ip: Ipv4Addr,
    /// When the last ARP request went out, `None` before the first one
    pub last_sent: Option<Instant>,
    pub times_sent: u32,
    /// Packets in enqueue order
    pub packets: Vec<QueuedPacket>,
}

impl PendingRequest {
    fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            last_sent: None,
            times_sent: 0,
            packets: Vec::new(),
        }
    }
}

/// Names a pending request without borrowing the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(Ipv4Addr);

impl RequestHandle {
    pub fn ip(&self) -> Ipv4Addr {
        self.0
    }
}

/// What the caller must do for a pending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// Nothing yet
    Wait,
    /// Broadcast an ARP request for `ip`.
    ///
    /// `fallback_interface` is the outgoing interface of the oldest queued
    /// packet, for when routing cannot name one.
    Retry {
        ip: Ipv4Addr,
        fallback_interface: Option<String>,
    },
    /// Retries exhausted; the request has been removed from the queue
    GiveUp(PendingRequest),
}

#[derive(Debug, Default)]
struct CacheState {
    entries: Vec<ArpEntry>,
    requests: HashMap<Ipv4Addr, PendingRequest>,
}

/// Thread-safe ARP cache with its pending-request queue
#[derive(Debug)]
pub struct ArpCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    config: ArpCacheConfig,
}

impl ArpCache {
    pub fn new(config: ArpCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: Vec::with_capacity(config.capacity),
                requests: HashMap::new(),
            }),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ArpCacheConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // A panic elsewhere cannot leave the state half-written; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the MAC for `ip` if a valid, unexpired entry exists.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        let now = self.clock.now();
        let state = self.state();
        state
            .entries
            .iter()
            .find(|e| e.ip == ip && e.is_live(now, self.config.entry_timeout))
            .map(|e| e.mac)
    }

    /// Parks a copy of `frame` until `ip` resolves.
    ///
    /// The first packet for an IP creates its request; later ones join it.
    pub fn queue_request(
        &self,
        ip: Ipv4Addr,
        frame: &[u8],
        out_iface: &str,
        in_iface: &str,
    ) -> RequestHandle {
        let mut state = self.state();
        let request = state
            .requests
            .entry(ip)
            .or_insert_with(|| PendingRequest::new(ip));
        request.packets.push(QueuedPacket {
            frame: frame.to_vec(),
            out_iface: out_iface.to_string(),
            in_iface: in_iface.to_string(),
        });
        RequestHandle(ip)
    }

    /// Records `ip -> mac` and hands back the request waiting on `ip`, if any.
    pub fn insert(&self, mac: MacAddr, ip: Ipv4Addr) -> Option<PendingRequest> {
        let now = self.clock.now();
        let mut state = self.state();
        let capacity = self.config.capacity;

        let entry = ArpEntry {
            ip,
            mac,
            added: now,
            valid: true,
        };

        let slot = state
            .entries
            .iter()
            .position(|e| e.valid && e.ip == ip)
            .or_else(|| state.entries.iter().position(|e| !e.valid));

        match slot {
            Some(i) => state.entries[i] = entry,
            None if state.entries.len() < capacity => state.entries.push(entry),
            None => {
                let oldest = state
                    .entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.added)
                    .map(|(i, _)| i);
                if let Some(i) = oldest {
                    debug!(
                        evicted = %state.entries[i].ip,
                        inserted = %ip,
                        "ARP cache full, evicting oldest entry"
                    );
                    state.entries[i] = entry;
                }
            }
        }

        state.requests.remove(&ip)
    }

    /// Removes a pending request and returns it with its packets.
    pub fn destroy_request(&self, handle: RequestHandle) -> Option<PendingRequest> {
        self.state().requests.remove(&handle.0)
    }

    /// Applies the retry policy to one request.
    ///
    /// Returns [`RequestAction::Wait`] if the request is no longer pending.
    pub fn service_request(&self, handle: RequestHandle) -> RequestAction {
        let now = self.clock.now();
        let mut state = self.state();
        apply_retry_policy(&mut state, handle.0, now, &self.config)
    }

    /// Periodic maintenance.
    ///
    /// Invalidates entries older than the entry timeout, then runs the retry
    /// policy over every pending request. Only non-`Wait` actions are returned.
    pub fn sweep(&self) -> Vec<RequestAction> {
        let now = self.clock.now();
        let mut state = self.state();

        for entry in state.entries.iter_mut() {
            if entry.valid && !entry.is_live(now, self.config.entry_timeout) {
                debug!(ip = %entry.ip, mac = %entry.mac, "ARP entry expired");
                entry.valid = false;
            }
        }

        let pending: Vec<Ipv4Addr> = state.requests.keys().copied().collect();
        pending
            .into_iter()
            .map(|ip| apply_retry_policy(&mut state, ip, now, &self.config))
            .filter(|action| *action != RequestAction::Wait)
            .collect()
    }

    /// Live entries, for logging and inspection
    pub fn snapshot(&self) -> Vec<ArpEntrySnapshot> {
        let now = self.clock.now();
        let state = self.state();
        state
            .entries
            .iter()
            .filter(|e| e.is_live(now, self.config.entry_timeout))
            .map(|e| ArpEntrySnapshot {
                ip: e.ip,
                mac: e.mac,
                age: now.saturating_duration_since(e.added),
            })
            .collect()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.state()
            .entries
            .iter()
            .filter(|e| e.is_live(now, self.config.entry_timeout))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.state().requests.len()
    }
}

/// Single retry/give-up policy shared by the on-demand path and the sweep.
fn apply_retry_policy(
    state: &mut CacheState,
    ip: Ipv4Addr,
    now: Instant,
    config: &ArpCacheConfig,
) -> RequestAction {
    let Some(request) = state.requests.get_mut(&ip) else {
        return RequestAction::Wait;
    };

    if let Some(last_sent) = request.last_sent {
        if now.saturating_duration_since(last_sent) < config.retry_interval {
            return RequestAction::Wait;
        }
    }

    if request.times_sent >= config.max_requests {
        return match state.requests.remove(&ip) {
            Some(request) => RequestAction::GiveUp(request),
            None => RequestAction::Wait,
        };
    }

    request.times_sent += 1;
    request.last_sent = Some(now);
    RequestAction::Retry {
        ip,
        fallback_interface: request.packets.first().map(|p| p.out_iface.clone()),
    }
}
