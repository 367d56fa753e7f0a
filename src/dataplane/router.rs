//! Packet dispatcher and forwarding engine
//!
//! [`Router::handle_frame`] classifies each received frame and either answers
//! it (ARP, ICMP echo, ICMP errors) or forwards it toward its next hop. Frames
//! waiting on address resolution are parked in the [`ArpCache`] and released
//! either by an ARP reply or by the periodic [`Router::sweep`].

use super::arp_cache::{ArpCache, ArpCacheConfig, PendingRequest, RequestAction};
use super::clock::{Clock, SystemClock};
use super::interfaces::{Interface, InterfaceTable};
use super::routing::{Route, RoutingTable};
use super::sweeper::Sweeper;
use crate::capture::Transport;
use crate::protocol::arp::{build_arp_reply, build_arp_request, ArpOp, ArpPacket};
use crate::protocol::ethernet::{
    self, ethernet_type, rewrite_addresses, EthernetHeader, FrameBuilder, FrameKind,
};
use crate::protocol::icmp::{
    build_echo_reply, build_icmp_error, dest_unreachable, time_exceeded, IcmpPacket, IcmpType,
    ICMP_ERROR_SIZE,
};
use crate::protocol::ipv4::{self, build_ip_reply, protocol, Ipv4Header, Ipv4HeaderMut};
use crate::protocol::{EtherType, MacAddr};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Behaviour knobs for a [`Router`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    pub arp: ArpCacheConfig,
    /// Period of the background ARP sweep
    pub sweep_interval: Duration,
    /// Answer ARP requests for addresses the router does not own by
    /// broadcasting a reply on the receiving interface
    pub reply_to_foreign_requests: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            arp: ArpCacheConfig::default(),
            sweep_interval: Duration::from_secs(1),
            reply_to_foreign_requests: false,
        }
    }
}

/// A software IPv4 router
pub struct Router {
    interfaces: InterfaceTable,
    routes: RoutingTable,
    arp_cache: ArpCache,
    transport: Arc<dyn Transport>,
    options: RouterOptions,
    metrics: Arc<MetricsRegistry>,
}

impl Router {
    /// Builds a router over a fixed set of interfaces and routes.
    ///
    /// Fails if `interfaces` is empty.
    pub fn new(
        interfaces: Vec<Interface>,
        routes: Vec<Route>,
        transport: Arc<dyn Transport>,
        options: RouterOptions,
    ) -> Result<Self> {
        if interfaces.is_empty() {
            return Err(Error::Config("router needs at least one interface".into()));
        }

        let interfaces = InterfaceTable::new(interfaces);
        for route in &routes {
            if interfaces.get(&route.interface).is_none() {
                warn!(
                    destination = %route.destination,
                    interface = %route.interface,
                    "route uses an unknown interface"
                );
            }
        }

        let metrics = Arc::new(MetricsRegistry::new());
        for iface in interfaces.iter() {
            metrics.register_interface(&iface.name);
        }

        Ok(Self {
            arp_cache: ArpCache::new(options.arp, Arc::new(SystemClock)),
            interfaces,
            routes: RoutingTable::from(routes),
            transport,
            options,
            metrics,
        })
    }

    /// Replaces the time source used for ARP aging.
    ///
    /// Must be called before any frame is handled; the cache starts empty.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.arp_cache = ArpCache::new(self.options.arp, clock);
        self
    }

    /// Reports into a shared registry instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        for iface in self.interfaces.iter() {
            metrics.register_interface(&iface.name);
        }
        self.metrics = metrics;
        self
    }

    /// Starts the background ARP sweep.
    pub fn initialize(self: &Arc<Self>) -> Result<Sweeper> {
        let router = Arc::clone(self);
        let sweeper = Sweeper::spawn("arp-sweeper", self.options.sweep_interval, move || {
            router.sweep()
        })?;

        info!(
            interfaces = self.interfaces.len(),
            routes = self.routes.len(),
            "router initialized"
        );
        Ok(sweeper)
    }

    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// One pass of ARP cache maintenance: expire entries, retry or abandon
    /// pending requests.
    pub fn sweep(&self) {
        for action in self.arp_cache.sweep() {
            self.execute_action(action);
        }

        self.metrics
            .arp_cache_size
            .set(self.arp_cache.len() as u64);
        self.metrics
            .arp_pending_requests
            .set(self.arp_cache.pending_count() as u64);
    }

    /// Processes one frame received on `ingress`.
    ///
    /// Forwarded frames are rewritten in place and sent from this buffer.
    pub fn handle_frame(&self, ingress: &str, frame: &mut [u8]) {
        let Some(iface) = self.interfaces.get(ingress) else {
            debug!(interface = ingress, "frame from unknown interface");
            return;
        };

        self.metrics.record_rx(ingress, frame.len());

        if frame.len() < ethernet::HEADER_SIZE {
            trace!(interface = ingress, len = frame.len(), "runt frame");
            self.metrics.record_rx_error(ingress);
            return;
        }

        match ethernet_type(frame) {
            FrameKind::Arp => self.handle_arp(iface, frame),
            FrameKind::Ipv4 => self.handle_ipv4(iface, frame),
            FrameKind::Unknown(ethertype) => {
                trace!(interface = ingress, "unsupported EtherType 0x{:04x}", ethertype);
            }
        }
    }

    fn handle_arp(&self, ingress: &Interface, frame: &[u8]) {
        let arp = match ArpPacket::parse(&frame[ethernet::HEADER_SIZE..]) {
            Ok(arp) => arp,
            Err(e) => {
                trace!(interface = %ingress.name, "dropping ARP: {}", e);
                self.metrics.record_rx_error(&ingress.name);
                return;
            }
        };

        match arp.operation {
            ArpOp::Request => self.answer_arp_request(ingress, &arp),
            ArpOp::Reply => {
                debug!(ip = %arp.sender_ip, mac = %arp.sender_mac, "ARP reply");
                if let Some(request) = self.arp_cache.insert(arp.sender_mac, arp.sender_ip) {
                    self.flush_pending(request, arp.sender_mac);
                }
            }
        }
    }

    /// Replies on the interface the request came in on, so the requester's
    /// segment hears it. Addresses owned by another interface are answered
    /// with the receiving interface's MAC.
    fn answer_arp_request(&self, ingress: &Interface, request: &ArpPacket) {
        let (answered, dst) = match self.interfaces.get_by_ip(request.target_ip) {
            Some(owner) => (owner.ip, request.sender_mac),
            None if self.options.reply_to_foreign_requests => (ingress.ip, MacAddr::BROADCAST),
            None => {
                trace!(ip = %request.target_ip, "ignoring ARP request for foreign address");
                return;
            }
        };

        let reply = build_arp_reply(request, ingress.mac, answered);
        let header = EthernetHeader {
            dst,
            src: ingress.mac,
            ethertype: EtherType::Arp,
        };
        let frame = FrameBuilder::new(header).payload(&reply.to_bytes()).build();

        debug!(
            interface = %ingress.name,
            to = %request.sender_ip,
            "sending ARP reply for {}",
            reply.sender_ip
        );
        self.transmit(&ingress.name, &frame);
        self.metrics.arp_replies_sent.inc();
    }

    fn flush_pending(&self, request: PendingRequest, mac: MacAddr) {
        debug!(
            ip = %request.ip,
            packets = request.packets.len(),
            "ARP resolved, flushing queued packets"
        );

        for packet in request.packets {
            let Some(out) = self.interfaces.get(&packet.out_iface) else {
                self.metrics.packets_dropped.inc();
                continue;
            };
            let mut frame = packet.frame;
            rewrite_addresses(&mut frame, out.mac, mac);
            self.transmit(&out.name, &frame);
            self.metrics.packets_forwarded.inc();
        }
    }

    fn handle_ipv4(&self, ingress: &Interface, frame: &mut [u8]) {
        let eth_dst = ethernet::dst_mac(frame);
        let eth_src = ethernet::src_mac(frame);

        // Promiscuous sockets also see unicast traffic between other hosts
        if eth_dst != ingress.mac && !eth_dst.is_multicast() {
            trace!(interface = %ingress.name, dst = %eth_dst, "frame not addressed to us");
            return;
        }

        let ip = match Ipv4Header::parse(&frame[ethernet::HEADER_SIZE..]) {
            Ok(ip) => ip,
            Err(e) => {
                trace!(interface = %ingress.name, "dropping IPv4: {}", e);
                self.metrics.record_rx_error(&ingress.name);
                return;
            }
        };

        if !ip.validate_checksum() {
            debug!(src = %ip.src_addr(), "bad IPv4 header checksum");
            self.metrics.packets_dropped.inc();
            return;
        }

        let dst = ip.dst_addr();
        if self.interfaces.get_by_ip(dst).is_some() {
            self.deliver_local(ingress, eth_src, &ip);
            return;
        }

        // Link-layer broadcast and multicast stay on their segment
        if eth_dst.is_multicast() {
            trace!(interface = %ingress.name, dst = %dst, "not routing group-addressed frame");
            self.metrics.packets_dropped.inc();
            return;
        }

        self.forward(ingress, eth_src, dst, frame);
    }

    fn deliver_local(&self, ingress: &Interface, eth_src: MacAddr, ip: &Ipv4Header<'_>) {
        let addressed = ip.dst_addr();

        match ip.protocol() {
            protocol::ICMP => {
                let icmp = match IcmpPacket::parse(ip.payload()) {
                    Ok(icmp) if icmp.is_echo_request() => icmp,
                    Ok(icmp) => {
                        trace!(icmp_type = icmp.icmp_type(), "ignoring ICMP to router");
                        return;
                    }
                    Err(e) => {
                        trace!(interface = %ingress.name, "dropping ICMP: {}", e);
                        self.metrics.record_rx_error(&ingress.name);
                        return;
                    }
                };

                let reply = build_echo_reply(&icmp);
                let Ok(total_length) = u16::try_from(ipv4::HEADER_SIZE + reply.len()) else {
                    return;
                };
                let ip_header = build_ip_reply(ip, protocol::ICMP, addressed, total_length);
                let header = EthernetHeader {
                    dst: eth_src,
                    src: ingress.mac,
                    ethertype: EtherType::Ipv4,
                };
                let frame = FrameBuilder::new(header)
                    .payload(&ip_header)
                    .payload(&reply)
                    .build();

                debug!(to = %ip.src_addr(), "sending echo reply");
                self.transmit(&ingress.name, &frame);
                self.metrics.icmp_echo_replies.inc();
            }
            protocol::TCP | protocol::UDP => {
                debug!(from = %ip.src_addr(), "no listener, sending port unreachable");
                self.send_icmp_error(
                    ingress,
                    eth_src,
                    addressed,
                    ip,
                    IcmpType::DestinationUnreachable,
                    dest_unreachable::PORT_UNREACHABLE,
                );
            }
            other => {
                trace!(protocol = other, "ignoring IP protocol addressed to router");
            }
        }
    }

    /// Forwards a transit datagram whose header checksum has been verified.
    ///
    /// The TTL is decremented and the checksum refreshed in the received
    /// buffer before routing, so ICMP errors quote the updated header.
    fn forward(&self, ingress: &Interface, eth_src: MacAddr, dst: Ipv4Addr, frame: &mut [u8]) {
        if dst.is_broadcast() || dst.is_multicast() || self.routes.is_directed_broadcast(dst) {
            trace!(dst = %dst, "not routing broadcast or multicast destination");
            self.metrics.packets_dropped.inc();
            return;
        }

        let ttl = match Ipv4HeaderMut::new(&mut frame[ethernet::HEADER_SIZE..]) {
            Ok(mut header) => {
                let ttl = header.decrement_ttl();
                header.update_checksum();
                ttl
            }
            Err(e) => {
                trace!("dropping IPv4: {}", e);
                return;
            }
        };

        let route = if ttl == 0 {
            debug!(dst = %dst, "TTL exceeded");
            None
        } else {
            self.routes.lookup(dst)
        };

        let Some(route) = route else {
            let (icmp_type, code) = if ttl == 0 {
                (IcmpType::TimeExceeded, time_exceeded::TTL_EXCEEDED)
            } else {
                debug!(dst = %dst, "no route");
                (
                    IcmpType::DestinationUnreachable,
                    dest_unreachable::NET_UNREACHABLE,
                )
            };
            if let Ok(ip) = Ipv4Header::parse(&frame[ethernet::HEADER_SIZE..]) {
                self.send_icmp_error(ingress, eth_src, ingress.ip, &ip, icmp_type, code);
            }
            self.metrics.packets_dropped.inc();
            return;
        };

        let Some(out) = self.interfaces.get(&route.interface) else {
            warn!(interface = %route.interface, "route points at unknown interface");
            self.metrics.packets_dropped.inc();
            return;
        };

        let next_hop = route.next_hop(dst);
        match self.arp_cache.lookup(next_hop) {
            Some(mac) => {
                rewrite_addresses(frame, out.mac, mac);
                trace!(dst = %dst, via = %next_hop, interface = %out.name, "forwarding");
                self.transmit(&out.name, frame);
                self.metrics.packets_forwarded.inc();
            }
            None => {
                trace!(next_hop = %next_hop, "next hop unresolved, queueing");
                let handle = self
                    .arp_cache
                    .queue_request(next_hop, frame, &out.name, &ingress.name);
                let action = self.arp_cache.service_request(handle);
                self.execute_action(action);
            }
        }
    }

    /// Carries out one retry-policy decision.
    fn execute_action(&self, action: RequestAction) {
        match action {
            RequestAction::Wait => {}
            RequestAction::Retry {
                ip,
                fallback_interface,
            } => {
                let Some(out) = self.retry_interface(ip, fallback_interface.as_deref()) else {
                    warn!(ip = %ip, "no interface to send ARP request on");
                    return;
                };

                let (header, request) = build_arp_request(ip, out.mac, out.ip);
                let frame = FrameBuilder::new(header)
                    .payload(&request.to_bytes())
                    .build();

                debug!(ip = %ip, interface = %out.name, "sending ARP request");
                self.transmit(&out.name, &frame);
                self.metrics.arp_requests_sent.inc();
            }
            RequestAction::GiveUp(request) => {
                warn!(
                    ip = %request.ip,
                    attempts = request.times_sent,
                    packets = request.packets.len(),
                    "ARP resolution failed"
                );
                self.metrics.arp_resolution_failures.inc();

                for packet in &request.packets {
                    self.metrics.packets_dropped.inc();
                    let Some(ingress) = self.interfaces.get(&packet.in_iface) else {
                        continue;
                    };
                    let Some(eth_src) = packet.frame.get(6..12).map(MacAddr::from_slice) else {
                        continue;
                    };
                    let Some(ip) = packet
                        .frame
                        .get(ethernet::HEADER_SIZE..)
                        .and_then(|datagram| Ipv4Header::parse(datagram).ok())
                    else {
                        continue;
                    };
                    self.send_icmp_error(
                        ingress,
                        eth_src,
                        ingress.ip,
                        &ip,
                        IcmpType::DestinationUnreachable,
                        dest_unreachable::HOST_UNREACHABLE,
                    );
                }
            }
        }
    }

    /// Interface to broadcast an ARP request for `ip` on.
    ///
    /// Prefers a route that names `ip` as its gateway, then the route toward
    /// `ip` itself, then the interface recorded with the queued packet.
    fn retry_interface(&self, ip: Ipv4Addr, fallback: Option<&str>) -> Option<&Interface> {
        self.routes
            .interface_for_gateway(ip)
            .or_else(|| self.routes.lookup(ip).map(|r| r.interface.as_str()))
            .or(fallback)
            .and_then(|name| self.interfaces.get(name))
    }

    /// Sends an ICMP error about `original` back toward its sender.
    fn send_icmp_error(
        &self,
        out: &Interface,
        dst_mac: MacAddr,
        source_ip: Ipv4Addr,
        original: &Ipv4Header<'_>,
        icmp_type: IcmpType,
        code: u8,
    ) {
        let icmp = build_icmp_error(icmp_type, code, original.datagram());
        let ip_header = build_ip_reply(
            original,
            protocol::ICMP,
            source_ip,
            (ipv4::HEADER_SIZE + ICMP_ERROR_SIZE) as u16,
        );
        let header = EthernetHeader {
            dst: dst_mac,
            src: out.mac,
            ethertype: EtherType::Ipv4,
        };
        let frame = FrameBuilder::new(header)
            .payload(&ip_header)
            .payload(&icmp)
            .build();

        debug!(
            to = %original.src_addr(),
            interface = %out.name,
            icmp_type = icmp_type as u8,
            code,
            "sending ICMP error"
        );
        self.transmit(&out.name, &frame);
        self.metrics.icmp_errors_sent.inc();
    }

    fn transmit(&self, interface: &str, frame: &[u8]) {
        match self.transport.send_frame(interface, frame) {
            Ok(()) => self.metrics.record_tx(interface, frame.len()),
            Err(e) => {
                warn!(interface, "transmit failed: {}", e);
                self.metrics.record_tx_error(interface);
            }
        }
    }
}
