//! In-memory router fixture
//!
//! Topology:
//!   client (10.0.1.2) -- eth1 -- router -- eth2 -- 10.0.2.0/24 (gw 10.0.2.254)
//!                                       `-- eth3 -- 10.0.3.0/24 (connected)

use ipfwd::capture::Transport;
use ipfwd::dataplane::{Interface, ManualClock, Route, Router, RouterOptions};
use ipfwd::protocol::arp::{ArpOp, ArpPacket};
use ipfwd::protocol::ethernet::{self, EthernetHeader, FrameBuilder};
use ipfwd::protocol::ipv4::{self, checksum};
use ipfwd::protocol::{EtherType, MacAddr};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

pub const ETH1_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0x01, 0x01]);
pub const ETH2_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0x02, 0x01]);
pub const ETH3_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0x03, 0x01]);
pub const CLIENT_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0x01, 0x02]);
pub const GATEWAY_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0x02, 0xfe]);

pub const ETH1_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);
pub const ETH2_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 1);
pub const ETH3_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 3, 1);
pub const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
pub const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 254);

/// Transport that records every frame instead of sending it
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingTransport {
    /// Removes and returns everything sent so far.
    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Transport for RecordingTransport {
    fn send_frame(&self, interface: &str, frame: &[u8]) -> ipfwd::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((interface.to_string(), frame.to_vec()));
        Ok(())
    }
}

pub struct Fixture {
    pub router: Arc<Router>,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        let interfaces = vec![
            Interface::new("eth1", ETH1_MAC, ETH1_IP).unwrap(),
            Interface::new("eth2", ETH2_MAC, ETH2_IP).unwrap(),
            Interface::new("eth3", ETH3_MAC, ETH3_IP).unwrap(),
        ];
        let routes = vec![
            Route::new(
                Ipv4Addr::new(10, 0, 1, 0),
                Ipv4Addr::new(255, 255, 255, 0),
                Ipv4Addr::UNSPECIFIED,
                "eth1",
            ),
            Route::new(
                Ipv4Addr::new(10, 0, 2, 0),
                Ipv4Addr::new(255, 255, 255, 0),
                GATEWAY_IP,
                "eth2",
            ),
            Route::new(
                Ipv4Addr::new(10, 0, 3, 0),
                Ipv4Addr::new(255, 255, 255, 0),
                Ipv4Addr::UNSPECIFIED,
                "eth3",
            ),
        ];

        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(ManualClock::new());
        let router = Router::new(interfaces, routes, transport.clone(), options)
            .unwrap()
            .with_clock(clock.clone());

        Self {
            router: Arc::new(router),
            transport,
            clock,
        }
    }

    /// Delivers a frame from the client side.
    pub fn receive(&self, interface: &str, mut frame: Vec<u8>) {
        self.router.handle_frame(interface, &mut frame);
    }
}

/// Builds a client-to-router IPv4 frame carrying `payload`.
pub fn ipv4_frame(
    dst_mac: MacAddr,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    protocol: u8,
    payload: &[u8],
) -> Vec<u8> {
    let total_length = (ipv4::HEADER_SIZE + payload.len()) as u16;
    let mut header = [0u8; ipv4::HEADER_SIZE];
    header[0] = 0x45;
    header[2..4].copy_from_slice(&total_length.to_be_bytes());
    header[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
    header[8] = ttl;
    header[9] = protocol;
    header[12..16].copy_from_slice(&src.octets());
    header[16..20].copy_from_slice(&dst.octets());
    let sum = checksum(&header);
    header[10..12].copy_from_slice(&sum.to_be_bytes());

    FrameBuilder::new(EthernetHeader {
        dst: dst_mac,
        src: CLIENT_MAC,
        ethertype: EtherType::Ipv4,
    })
    .payload(&header)
    .payload(payload)
    .build()
}

/// ICMP echo request with a valid checksum.
pub fn echo_request(id: u16, seq: u16, data: &[u8]) -> Vec<u8> {
    let mut icmp = vec![8, 0, 0, 0];
    icmp.extend_from_slice(&id.to_be_bytes());
    icmp.extend_from_slice(&seq.to_be_bytes());
    icmp.extend_from_slice(data);
    let sum = checksum(&icmp);
    icmp[2..4].copy_from_slice(&sum.to_be_bytes());
    icmp
}

/// A small UDP datagram; the router never looks past the ports.
pub fn udp_payload() -> Vec<u8> {
    let mut udp = vec![0u8; 12];
    udp[0..2].copy_from_slice(&40000u16.to_be_bytes());
    udp[2..4].copy_from_slice(&33434u16.to_be_bytes());
    udp[4..6].copy_from_slice(&12u16.to_be_bytes());
    udp[8..12].copy_from_slice(b"ping");
    udp
}

pub fn arp_frame(
    op: ArpOp,
    eth_dst: MacAddr,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let arp = ArpPacket {
        operation: op,
        sender_mac,
        sender_ip,
        target_mac,
        target_ip,
    };
    FrameBuilder::new(EthernetHeader {
        dst: eth_dst,
        src: sender_mac,
        ethertype: EtherType::Arp,
    })
    .payload(&arp.to_bytes())
    .build()
}

/// IPv4 datagram following the Ethernet header.
pub fn ip_of(frame: &[u8]) -> &[u8] {
    &frame[ethernet::HEADER_SIZE..]
}

pub fn arp_of(frame: &[u8]) -> ArpPacket {
    ArpPacket::parse(&frame[ethernet::HEADER_SIZE..]).unwrap()
}
