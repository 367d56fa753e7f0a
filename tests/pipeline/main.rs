//! Frame-in, frame-out tests of the whole forwarding pipeline
//!
//! Frames are fed to a router wired to a recording transport and a manual
//! clock, so ARP timing is fully deterministic.

mod harness;

use harness::*;
use ipfwd::dataplane::RouterOptions;
use ipfwd::protocol::arp::ArpOp;
use ipfwd::protocol::icmp::{IcmpPacket, IcmpType};
use ipfwd::protocol::ipv4::{checksum, protocol, Ipv4Header};
use ipfwd::protocol::MacAddr;
use std::net::Ipv4Addr;
use std::time::Duration;

const HOST_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0x03, 0x05]);
const HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 3, 5);

fn assert_icmp_error(frame: &[u8], source: Ipv4Addr, icmp_type: IcmpType, code: u8) {
    assert_eq!(MacAddr::from_slice(&frame[0..6]), CLIENT_MAC);
    assert_eq!(MacAddr::from_slice(&frame[6..12]), ETH1_MAC);

    let ip = Ipv4Header::parse(ip_of(frame)).unwrap();
    assert!(ip.validate_checksum());
    assert_eq!(ip.protocol(), protocol::ICMP);
    assert_eq!(ip.src_addr(), source);
    assert_eq!(ip.dst_addr(), CLIENT_IP);
    assert_eq!(ip.ttl(), 64);
    assert_eq!(ip.total_length(), 56);

    let icmp = IcmpPacket::parse(ip.payload()).unwrap();
    assert!(icmp.validate_checksum());
    assert_eq!(icmp.icmp_type(), icmp_type as u8);
    assert_eq!(icmp.code(), code);
}

#[test]
fn test_echo_request_to_router_is_answered() {
    let fx = Fixture::new();
    let request = echo_request(0x4242, 7, b"hello router");

    fx.receive(
        "eth1",
        ipv4_frame(ETH1_MAC, CLIENT_IP, ETH1_IP, 64, protocol::ICMP, &request),
    );

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    let (iface, frame) = &sent[0];
    assert_eq!(iface, "eth1");
    assert_eq!(MacAddr::from_slice(&frame[0..6]), CLIENT_MAC);
    assert_eq!(MacAddr::from_slice(&frame[6..12]), ETH1_MAC);

    let ip = Ipv4Header::parse(ip_of(frame)).unwrap();
    assert!(ip.validate_checksum());
    assert_eq!(ip.src_addr(), ETH1_IP);
    assert_eq!(ip.dst_addr(), CLIENT_IP);
    assert_eq!(ip.ttl(), 64);

    let icmp = IcmpPacket::parse(ip.payload()).unwrap();
    assert!(icmp.validate_checksum());
    assert_eq!(icmp.icmp_type(), IcmpType::EchoReply as u8);
    assert_eq!(icmp.identifier(), 0x4242);
    assert_eq!(icmp.sequence(), 7);
    assert_eq!(icmp.payload(), b"hello router");

    assert_eq!(fx.router.metrics().snapshot().icmp_echo_replies, 1);
}

#[test]
fn test_echo_reply_comes_from_addressed_interface_ip() {
    let fx = Fixture::new();
    let request = echo_request(1, 1, b"x");

    fx.receive(
        "eth1",
        ipv4_frame(ETH1_MAC, CLIENT_IP, ETH3_IP, 64, protocol::ICMP, &request),
    );

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "eth1");
    let ip = Ipv4Header::parse(ip_of(&sent[0].1)).unwrap();
    assert_eq!(ip.src_addr(), ETH3_IP);
}

#[test]
fn test_udp_to_router_gets_port_unreachable() {
    let fx = Fixture::new();
    let frame = ipv4_frame(ETH1_MAC, CLIENT_IP, ETH1_IP, 64, protocol::UDP, &udp_payload());
    let original = ip_of(&frame).to_vec();

    fx.receive("eth1", frame);

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "eth1");
    assert_icmp_error(&sent[0].1, ETH1_IP, IcmpType::DestinationUnreachable, 3);

    let ip = Ipv4Header::parse(ip_of(&sent[0].1)).unwrap();
    let icmp = IcmpPacket::parse(ip.payload()).unwrap();
    assert_eq!(icmp.payload(), &original[..28]);
}

#[test]
fn test_ttl_expiry_sends_time_exceeded() {
    let fx = Fixture::new();
    let request = echo_request(1, 1, b"trace");

    fx.receive(
        "eth1",
        ipv4_frame(ETH1_MAC, CLIENT_IP, HOST_IP, 1, protocol::ICMP, &request),
    );

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "eth1");
    assert_icmp_error(&sent[0].1, ETH1_IP, IcmpType::TimeExceeded, 0);

    let snapshot = fx.router.metrics().snapshot();
    assert_eq!(snapshot.packets_forwarded, 0);
    assert_eq!(snapshot.arp_requests_sent, 0);
}

#[test]
fn test_no_route_sends_net_unreachable() {
    let fx = Fixture::new();
    let frame = ipv4_frame(
        ETH1_MAC,
        CLIENT_IP,
        Ipv4Addr::new(192, 168, 9, 9),
        64,
        protocol::UDP,
        &udp_payload(),
    );
    let original = ip_of(&frame).to_vec();

    fx.receive("eth1", frame);

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_icmp_error(&sent[0].1, ETH1_IP, IcmpType::DestinationUnreachable, 0);

    // The quoted header already carries the decremented TTL
    let ip = Ipv4Header::parse(ip_of(&sent[0].1)).unwrap();
    let icmp = IcmpPacket::parse(ip.payload()).unwrap();
    let quoted = icmp.payload();
    assert_eq!(quoted[8], 63);
    assert_eq!(checksum(&quoted[..20]), 0);
    assert_eq!(&quoted[12..28], &original[12..28]);
}

#[test]
fn test_cache_miss_queues_until_arp_reply() {
    let fx = Fixture::new();

    for seq in 1..=2 {
        let request = echo_request(9, seq, b"queued");
        fx.receive(
            "eth1",
            ipv4_frame(ETH1_MAC, CLIENT_IP, HOST_IP, 64, protocol::ICMP, &request),
        );
    }

    // One request covers both packets
    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    let (iface, frame) = &sent[0];
    assert_eq!(iface, "eth3");
    assert_eq!(MacAddr::from_slice(&frame[0..6]), MacAddr::BROADCAST);
    let request = arp_of(frame);
    assert_eq!(request.operation, ArpOp::Request);
    assert_eq!(request.sender_mac, ETH3_MAC);
    assert_eq!(request.sender_ip, ETH3_IP);
    assert_eq!(request.target_ip, HOST_IP);
    assert_eq!(fx.router.arp_cache().pending_count(), 1);

    fx.receive(
        "eth3",
        arp_frame(ArpOp::Reply, ETH3_MAC, HOST_MAC, HOST_IP, ETH3_MAC, ETH3_IP),
    );

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 2);
    for (expected_seq, (iface, frame)) in (1..=2).zip(&sent) {
        assert_eq!(iface, "eth3");
        assert_eq!(MacAddr::from_slice(&frame[0..6]), HOST_MAC);
        assert_eq!(MacAddr::from_slice(&frame[6..12]), ETH3_MAC);

        let ip = Ipv4Header::parse(ip_of(frame)).unwrap();
        assert!(ip.validate_checksum());
        assert_eq!(ip.ttl(), 63);
        assert_eq!(ip.src_addr(), CLIENT_IP);
        let icmp = IcmpPacket::parse(ip.payload()).unwrap();
        assert_eq!(icmp.sequence(), expected_seq);
    }

    assert_eq!(fx.router.arp_cache().pending_count(), 0);
    assert_eq!(fx.router.arp_cache().lookup(HOST_IP), Some(HOST_MAC));
    assert_eq!(fx.router.metrics().snapshot().packets_forwarded, 2);
}

#[test]
fn test_cache_hit_forwards_immediately() {
    let fx = Fixture::new();
    fx.receive(
        "eth3",
        arp_frame(ArpOp::Reply, ETH3_MAC, HOST_MAC, HOST_IP, ETH3_MAC, ETH3_IP),
    );
    assert!(fx.transport.take().is_empty());

    let frame = ipv4_frame(ETH1_MAC, CLIENT_IP, HOST_IP, 10, protocol::UDP, &udp_payload());
    let payload = frame[34..].to_vec();
    fx.receive("eth1", frame);

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    let (iface, out) = &sent[0];
    assert_eq!(iface, "eth3");
    assert_eq!(MacAddr::from_slice(&out[0..6]), HOST_MAC);

    let ip = Ipv4Header::parse(ip_of(out)).unwrap();
    assert!(ip.validate_checksum());
    assert_eq!(ip.ttl(), 9);
    assert_eq!(ip.payload(), &payload[..]);
}

#[test]
fn test_gateway_route_resolves_gateway_address() {
    let fx = Fixture::new();
    let frame = ipv4_frame(
        ETH1_MAC,
        CLIENT_IP,
        Ipv4Addr::new(10, 0, 2, 50),
        64,
        protocol::UDP,
        &udp_payload(),
    );

    fx.receive("eth1", frame);

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "eth2");
    let request = arp_of(&sent[0].1);
    assert_eq!(request.target_ip, GATEWAY_IP);
    assert_eq!(request.sender_ip, ETH2_IP);

    fx.receive(
        "eth2",
        arp_frame(ArpOp::Reply, ETH2_MAC, GATEWAY_MAC, GATEWAY_IP, ETH2_MAC, ETH2_IP),
    );
    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(MacAddr::from_slice(&sent[0].1[0..6]), GATEWAY_MAC);
}

#[test]
fn test_unanswered_arp_gives_up_with_host_unreachable() {
    let fx = Fixture::new();
    let silent = Ipv4Addr::new(10, 0, 3, 9);

    for seq in 1..=2 {
        let request = echo_request(3, seq, b"lost");
        fx.receive(
            "eth1",
            ipv4_frame(ETH1_MAC, CLIENT_IP, silent, 64, protocol::ICMP, &request),
        );
    }
    assert_eq!(fx.transport.take().len(), 1);

    // Four retries, one per interval
    for _ in 0..4 {
        fx.router.sweep();
        assert!(fx.transport.take().is_empty());

        fx.clock.advance(Duration::from_secs(1));
        fx.router.sweep();
        let sent = fx.transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(arp_of(&sent[0].1).target_ip, silent);
    }
    assert_eq!(fx.router.metrics().snapshot().arp_requests_sent, 5);

    fx.clock.advance(Duration::from_secs(1));
    fx.router.sweep();

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 2);
    for (iface, frame) in &sent {
        assert_eq!(iface, "eth1");
        assert_icmp_error(frame, ETH1_IP, IcmpType::DestinationUnreachable, 1);
    }

    assert_eq!(fx.router.arp_cache().pending_count(), 0);
    let snapshot = fx.router.metrics().snapshot();
    assert_eq!(snapshot.arp_resolution_failures, 1);
    assert_eq!(snapshot.arp_pending_requests, 0);

    // Nothing left to retry
    fx.clock.advance(Duration::from_secs(1));
    fx.router.sweep();
    assert!(fx.transport.take().is_empty());
}

#[test]
fn test_expired_entry_triggers_new_request() {
    let fx = Fixture::new();
    fx.receive(
        "eth3",
        arp_frame(ArpOp::Reply, ETH3_MAC, HOST_MAC, HOST_IP, ETH3_MAC, ETH3_IP),
    );

    fx.clock.advance(Duration::from_secs(16));
    fx.router.sweep();
    assert_eq!(fx.router.arp_cache().lookup(HOST_IP), None);

    fx.receive(
        "eth1",
        ipv4_frame(ETH1_MAC, CLIENT_IP, HOST_IP, 64, protocol::UDP, &udp_payload()),
    );
    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(arp_of(&sent[0].1).operation, ArpOp::Request);
}

#[test]
fn test_arp_request_for_router_is_answered() {
    let fx = Fixture::new();

    fx.receive(
        "eth1",
        arp_frame(
            ArpOp::Request,
            MacAddr::BROADCAST,
            CLIENT_MAC,
            CLIENT_IP,
            MacAddr::ZERO,
            ETH1_IP,
        ),
    );

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    let (iface, frame) = &sent[0];
    assert_eq!(iface, "eth1");
    assert_eq!(MacAddr::from_slice(&frame[0..6]), CLIENT_MAC);

    let reply = arp_of(frame);
    assert_eq!(reply.operation, ArpOp::Reply);
    assert_eq!(reply.sender_mac, ETH1_MAC);
    assert_eq!(reply.sender_ip, ETH1_IP);
    assert_eq!(reply.target_mac, CLIENT_MAC);
    assert_eq!(reply.target_ip, CLIENT_IP);
}

#[test]
fn test_arp_request_for_other_interface_answered_on_ingress() {
    let fx = Fixture::new();

    fx.receive(
        "eth1",
        arp_frame(
            ArpOp::Request,
            MacAddr::BROADCAST,
            CLIENT_MAC,
            CLIENT_IP,
            MacAddr::ZERO,
            ETH3_IP,
        ),
    );

    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    let (iface, frame) = &sent[0];
    assert_eq!(iface, "eth1");
    assert_eq!(MacAddr::from_slice(&frame[0..6]), CLIENT_MAC);
    assert_eq!(MacAddr::from_slice(&frame[6..12]), ETH1_MAC);

    let reply = arp_of(frame);
    assert_eq!(reply.sender_ip, ETH3_IP);
    assert_eq!(reply.sender_mac, ETH1_MAC);
    assert_eq!(reply.target_ip, CLIENT_IP);
}

#[test]
fn test_broadcast_frames_stay_on_their_segment() {
    let fx = Fixture::new();

    for dst in [Ipv4Addr::new(10, 0, 3, 255), Ipv4Addr::BROADCAST] {
        fx.receive(
            "eth1",
            ipv4_frame(MacAddr::BROADCAST, CLIENT_IP, dst, 64, protocol::UDP, &udp_payload()),
        );
    }

    assert!(fx.transport.take().is_empty());
    assert_eq!(fx.router.arp_cache().pending_count(), 0);
    let snapshot = fx.router.metrics().snapshot();
    assert_eq!(snapshot.packets_dropped, 2);
    assert_eq!(snapshot.icmp_errors_sent, 0);
}

#[test]
fn test_broadcast_and_multicast_destinations_are_not_routed() {
    let fx = Fixture::new();

    for dst in [
        Ipv4Addr::new(10, 0, 3, 255),
        Ipv4Addr::BROADCAST,
        Ipv4Addr::new(224, 0, 0, 9),
    ] {
        fx.receive(
            "eth1",
            ipv4_frame(ETH1_MAC, CLIENT_IP, dst, 64, protocol::UDP, &udp_payload()),
        );
    }

    assert!(fx.transport.take().is_empty());
    assert_eq!(fx.router.arp_cache().pending_count(), 0);
    assert_eq!(fx.router.metrics().snapshot().packets_dropped, 3);

    // A host address in the same subnet is still forwarded
    fx.receive(
        "eth1",
        ipv4_frame(ETH1_MAC, CLIENT_IP, HOST_IP, 64, protocol::UDP, &udp_payload()),
    );
    assert_eq!(fx.router.arp_cache().pending_count(), 1);
}

#[test]
fn test_foreign_arp_request_ignored_by_default() {
    let fx = Fixture::new();

    fx.receive(
        "eth1",
        arp_frame(
            ArpOp::Request,
            MacAddr::BROADCAST,
            CLIENT_MAC,
            CLIENT_IP,
            MacAddr::ZERO,
            Ipv4Addr::new(10, 0, 1, 77),
        ),
    );
    assert!(fx.transport.take().is_empty());

    let fx = Fixture::with_options(RouterOptions {
        reply_to_foreign_requests: true,
        ..Default::default()
    });
    fx.receive(
        "eth1",
        arp_frame(
            ArpOp::Request,
            MacAddr::BROADCAST,
            CLIENT_MAC,
            CLIENT_IP,
            MacAddr::ZERO,
            Ipv4Addr::new(10, 0, 1, 77),
        ),
    );
    let sent = fx.transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(MacAddr::from_slice(&sent[0].1[0..6]), MacAddr::BROADCAST);
}

#[test]
fn test_bad_header_checksum_is_dropped() {
    let fx = Fixture::new();
    let mut frame = ipv4_frame(ETH1_MAC, CLIENT_IP, HOST_IP, 64, protocol::UDP, &udp_payload());
    frame[24] ^= 0xff;

    fx.receive("eth1", frame);

    assert!(fx.transport.take().is_empty());
    assert_eq!(fx.router.metrics().snapshot().packets_dropped, 1);
    assert_eq!(fx.router.arp_cache().pending_count(), 0);
}

#[test]
fn test_bad_header_checksum_to_router_gets_no_reply() {
    let fx = Fixture::new();
    let request = echo_request(9, 1, b"corrupt");
    let mut frame = ipv4_frame(ETH1_MAC, CLIENT_IP, ETH1_IP, 64, protocol::ICMP, &request);
    frame[24] ^= 0xff;

    fx.receive("eth1", frame);

    assert!(fx.transport.take().is_empty());
    let snapshot = fx.router.metrics().snapshot();
    assert_eq!(snapshot.icmp_echo_replies, 0);
    assert_eq!(snapshot.packets_dropped, 1);
}

#[test]
fn test_frame_for_another_host_is_ignored() {
    let fx = Fixture::new();
    let request = echo_request(1, 1, b"not yours");

    fx.receive(
        "eth1",
        ipv4_frame(HOST_MAC, CLIENT_IP, ETH1_IP, 64, protocol::ICMP, &request),
    );

    assert!(fx.transport.take().is_empty());
}

#[test]
fn test_sweeper_thread_drives_retries() {
    let fx = Fixture::with_options(RouterOptions {
        sweep_interval: Duration::from_millis(10),
        ..Default::default()
    });
    let sweeper = fx.router.initialize().unwrap();

    fx.receive(
        "eth1",
        ipv4_frame(ETH1_MAC, CLIENT_IP, HOST_IP, 64, protocol::UDP, &udp_payload()),
    );
    fx.clock.advance(Duration::from_secs(1));
    std::thread::sleep(Duration::from_millis(200));
    sweeper.shutdown();

    let requests = fx
        .transport
        .take()
        .iter()
        .filter(|(_, frame)| arp_of(frame).operation == ArpOp::Request)
        .count();
    assert_eq!(requests, 2);
}
