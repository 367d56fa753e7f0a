//! Routing table

use std::net::Ipv4Addr;

/// Route entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network
    pub destination: Ipv4Addr,
    /// Network mask
    pub mask: Ipv4Addr,
    /// Next hop (0.0.0.0 for directly connected)
    pub gateway: Ipv4Addr,
    /// Outgoing interface name
    pub interface: String,
}

impl Route {
    pub fn new(
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            destination,
            mask,
            gateway,
            interface: interface.into(),
        }
    }

    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        (u32::from(self.destination) & mask) == (u32::from(addr) & mask)
    }

    /// Number of leading one bits in the mask
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).leading_ones()
    }

    pub fn is_connected(&self) -> bool {
        self.gateway.is_unspecified()
    }

    /// All-ones host address of a connected subnet. /31 and /32 have none.
    pub fn broadcast(&self) -> Option<Ipv4Addr> {
        if !self.is_connected() || self.prefix_len() > 30 {
            return None;
        }
        let mask = u32::from(self.mask);
        Some(Ipv4Addr::from(u32::from(self.destination) | !mask))
    }

    /// Where a packet to `destination` goes next on this route
    pub fn next_hop(&self, destination: Ipv4Addr) -> Ipv4Addr {
        if self.is_connected() {
            destination
        } else {
            self.gateway
        }
    }
}

/// Static routing table using longest prefix match
///
/// Entries keep their load order; lookup scans all of them.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Lookup route using longest prefix match
    ///
    /// The numerically largest matching mask wins; on a tie the entry loaded
    /// first is kept.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&Route> {
        let mut best: Option<&Route> = None;

        for route in self.routes.iter().filter(|r| r.matches(addr)) {
            match best {
                Some(b) if u32::from(b.mask) >= u32::from(route.mask) => {}
                _ => best = Some(route),
            }
        }

        best
    }

    /// Whether `addr` is the broadcast address of a directly connected subnet
    pub fn is_directed_broadcast(&self, addr: Ipv4Addr) -> bool {
        self.routes.iter().any(|r| r.broadcast() == Some(addr))
    }

    /// Interface of the first route whose gateway is `gateway`
    pub fn interface_for_gateway(&self, gateway: Ipv4Addr) -> Option<&str> {
        self.routes
            .iter()
            .find(|r| r.gateway == gateway)
            .map(|r| r.interface.as_str())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl From<Vec<Route>> for RoutingTable {
    fn from(routes: Vec<Route>) -> Self {
        Self { routes }
    }
}
