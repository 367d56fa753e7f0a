//! Data plane components
//!
//! Packet processing for the router: interface and routing tables, the ARP
//! cache with its pending-request queue, and the dispatcher tying them
//! together.

mod arp_cache;
mod clock;
mod interfaces;
mod router;
mod routing;
mod sweeper;

pub use arp_cache::{
    ArpCache, ArpCacheConfig, ArpEntrySnapshot, PendingRequest, QueuedPacket, RequestAction,
    RequestHandle,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use interfaces::{Interface, InterfaceTable, IFACE_NAME_MAX};
pub use router::{Router, RouterOptions};
pub use routing::{Route, RoutingTable};
pub use sweeper::Sweeper;
