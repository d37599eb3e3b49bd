// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Integration tests for the header-check elements.
//!
//! Packets are built programmatically, byte-for-byte, with the
//! engine's raw header types, then fed through the elements the way
//! the runtime would: by matching on the [`ProcessResult`] and
//! following the output port.

use sluice::checksum::Checksum;
use sluice::checksum::HeaderChecksum;
use sluice::element::Element;
use sluice::element::ProcessResult;
use sluice::ip4::Ipv4HdrRaw;
use sluice::ip4::Protocol;
use sluice::ip4::IPV4_HDR_SZ;
use sluice::packet::Packet;
use sluice::tcp::TcpFlags;
use sluice::tcp::TcpHdrRaw;
use sluice::tcp::TCP_HDR_SZ;
use sluice::udp::UdpHdrRaw;
use sluice::udp::UDP_HDR_SZ;
use sluice_elements::check::tcp::CheckTcpHeader;
use sluice_elements::check::udp::CheckUdpHeader;
use sluice_elements::check::CheckConfig;
use sluice_elements::check::Reason;
use zerocopy::AsBytes;

const SRC: [u8; 4] = [10, 0, 0, 1];
const DST: [u8; 4] = [10, 0, 0, 2];

/// Build an IPv4 packet around `l4`, mark the network header, and
/// hand it back as a plain (shared-capable) packet.
fn ipv4_packet(proto: Protocol, l4: &[u8]) -> Packet {
    let mut iph = Ipv4HdrRaw::default();
    iph.total_len = ((IPV4_HDR_SZ + l4.len()) as u16).to_be_bytes();
    iph.proto = proto as u8;
    iph.src = SRC;
    iph.dst = DST;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(iph.as_bytes());
    bytes.extend_from_slice(l4);

    let mut w = Packet::copy(&bytes).unwrap();
    w.set_ip_header(0, IPV4_HDR_SZ);
    w.into_packet()
}

fn tcp_segment(payload: &[u8]) -> Vec<u8> {
    let mut tcph = TcpHdrRaw::default();
    tcph.src_port = 43210u16.to_be_bytes();
    tcph.dst_port = 443u16.to_be_bytes();
    tcph.flags = TcpFlags::ACK | TcpFlags::PSH;

    let mut seg = Vec::with_capacity(TCP_HDR_SZ + payload.len());
    seg.extend_from_slice(tcph.as_bytes());
    seg.extend_from_slice(payload);
    seg
}

fn udp_datagram(payload: &[u8]) -> Vec<u8> {
    let mut udph = UdpHdrRaw::default();
    udph.src_port = 5353u16.to_be_bytes();
    udph.dst_port = 53u16.to_be_bytes();
    udph.length = ((UDP_HDR_SZ + payload.len()) as u16).to_be_bytes();

    let mut dgram = Vec::with_capacity(UDP_HDR_SZ + payload.len());
    dgram.extend_from_slice(udph.as_bytes());
    dgram.extend_from_slice(payload);
    dgram
}

/// Store a freshly computed L4 checksum in the packet's transport
/// header, at `csum_off` bytes into the L4 header.
fn store_l4_csum(pkt: Packet, csum_off: usize) -> Packet {
    let mut w = pkt.uniqueify().unwrap();

    {
        let seg = w.transport_header_mut().unwrap();
        seg[csum_off] = 0;
        seg[csum_off + 1] = 0;
    }

    let seg_len = w.transport_header().unwrap().len();
    let mut csum = {
        let iph = w.ip_header().unwrap();
        iph.pseudo_csum(seg_len as u16)
    };
    csum.add(w.transport_header().unwrap());
    let stored = HeaderChecksum::from(csum).bytes();

    let seg = w.transport_header_mut().unwrap();
    seg[csum_off] = stored[0];
    seg[csum_off + 1] = stored[1];
    w.into_packet()
}

fn good_tcp_packet(payload: &[u8]) -> Packet {
    // TCP stores its checksum at bytes 16..18 of the header.
    store_l4_csum(ipv4_packet(Protocol::TCP, &tcp_segment(payload)), 16)
}

fn good_udp_packet(payload: &[u8]) -> Packet {
    // UDP stores its checksum at bytes 6..8 of the header.
    store_l4_csum(ipv4_packet(Protocol::UDP, &udp_datagram(payload)), 6)
}

fn details_cfg() -> CheckConfig {
    CheckConfig { details: true, ..Default::default() }
}

fn expect_emit(res: ProcessResult, port: usize) -> Packet {
    match res {
        ProcessResult::Emit(p, pkt) if p == port => pkt,
        other => panic!("expected emit on port {}, got {:?}", port, other),
    }
}

// ================================================================
// TCP
// ================================================================

#[test]
fn tcp_forwards_valid_packet() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 1).unwrap();
    let pkt = good_tcp_packet(b"GET / HTTP/1.1\r\n");

    let out = expect_emit(check.process(pkt), 0);
    assert_eq!(check.count(), 1);
    assert_eq!(check.drops(), 0);
    // The packet comes through unmodified.
    assert_eq!(out.len(), IPV4_HDR_SZ + TCP_HDR_SZ + 16);
}

#[test]
fn tcp_rejects_other_protocol() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 2).unwrap();
    let pkt = good_udp_packet(b"not tcp");

    // Two outputs: the reject is emitted on port 1, not killed.
    expect_emit(check.process(pkt), 1);
    assert_eq!(check.count(), 0);
    assert_eq!(check.drops(), 1);
    assert_eq!(check.reason_drops(Reason::NotProtocol), Some(1));
}

#[test]
fn tcp_rejects_missing_network_header() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 2).unwrap();
    let seg = tcp_segment(b"floating");
    // Raw bytes, no header ever marked.
    let pkt = Packet::copy(&seg).unwrap().into_packet();

    expect_emit(check.process(pkt), 1);
    assert_eq!(check.reason_drops(Reason::NotProtocol), Some(1));
}

#[test]
fn tcp_rejects_short_data_offset() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 2).unwrap();

    let mut seg = tcp_segment(b"");
    // Data offset of 4 words: below the 20-byte minimum.
    seg[12] = 0x40;
    let pkt = ipv4_packet(Protocol::TCP, &seg);

    expect_emit(check.process(pkt), 1);
    assert_eq!(check.reason_drops(Reason::BadLength), Some(1));
}

#[test]
fn tcp_rejects_truncated_segment() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 2).unwrap();

    // The IP header claims 8 more payload bytes than were captured.
    let seg = tcp_segment(b"short");
    let mut iph = Ipv4HdrRaw::default();
    iph.total_len = ((IPV4_HDR_SZ + seg.len() + 8) as u16).to_be_bytes();
    iph.proto = Protocol::TCP as u8;
    iph.src = SRC;
    iph.dst = DST;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(iph.as_bytes());
    bytes.extend_from_slice(&seg);
    let mut w = Packet::copy(&bytes).unwrap();
    w.set_ip_header(0, IPV4_HDR_SZ);

    expect_emit(check.process(w.into_packet()), 1);
    assert_eq!(check.reason_drops(Reason::BadLength), Some(1));
}

#[test]
fn tcp_rejects_total_len_underflow() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 2).unwrap();

    let pkt = ipv4_packet(Protocol::TCP, &tcp_segment(b""));
    let mut w = pkt.uniqueify().unwrap();
    // An IP total length smaller than the IP header itself.
    w.ip_header_mut().unwrap().total_len = 8u16.to_be_bytes();

    expect_emit(check.process(w.into_packet()), 1);
    assert_eq!(check.reason_drops(Reason::BadLength), Some(1));
}

#[test]
fn tcp_checksum_verification() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 2).unwrap();

    // A correct checksum passes.
    let good = good_tcp_packet(b"payload bytes");
    expect_emit(check.process(good.clone()), 0);

    // One flipped payload byte fails it.
    let mut w = good.clone().uniqueify().unwrap();
    let seg = w.transport_header_mut().unwrap();
    seg[TCP_HDR_SZ] ^= 0x01;
    let bad = w.into_packet();
    expect_emit(check.process(bad.clone()), 1);
    assert_eq!(check.reason_drops(Reason::BadChecksum), Some(1));

    // The same corrupt packet passes with CHECKSUM disabled.
    let lax_cfg = CheckConfig { checksum: false, ..Default::default() };
    let lax = CheckTcpHeader::new("tcp1", lax_cfg, 2).unwrap();
    expect_emit(lax.process(bad), 0);
    assert_eq!(lax.count(), 1);

    good.kill();
}

#[test]
fn tcp_one_output_kills_rejects() {
    let check = CheckTcpHeader::new("tcp0", CheckConfig::default(), 1)
        .unwrap();
    let pkt = good_udp_packet(b"");

    match check.process(pkt) {
        ProcessResult::Consumed => (),
        other => panic!("expected the packet to be killed, got {:?}", other),
    }
    assert_eq!(check.drops(), 1);
    // Per-reason counters were never allocated.
    assert_eq!(check.reason_drops(Reason::NotProtocol), None);
}

// ================================================================
// UDP
// ================================================================

#[test]
fn udp_forwards_valid_packet() {
    let check = CheckUdpHeader::new("udp0", details_cfg(), 1).unwrap();
    let pkt = good_udp_packet(b"a dns answer, say");

    expect_emit(check.process(pkt), 0);
    assert_eq!(check.count(), 1);
    assert_eq!(check.drops(), 0);
}

#[test]
fn udp_zero_checksum_is_accepted() {
    // A stored checksum of zero means "not computed"; such packets
    // pass whether or not checksum verification is enabled, and
    // whatever the payload happens to be.
    for checksum in [true, false] {
        let cfg = CheckConfig { checksum, ..Default::default() };
        let check = CheckUdpHeader::new("udp0", cfg, 1).unwrap();
        let pkt = ipv4_packet(Protocol::UDP, &udp_datagram(b"\xde\xad\xbe\xef"));
        expect_emit(check.process(pkt), 0);
        assert_eq!(check.count(), 1);
    }
}

#[test]
fn udp_checksum_verification() {
    let check = CheckUdpHeader::new("udp0", details_cfg(), 2).unwrap();

    let good = good_udp_packet(b"some payload");
    expect_emit(check.process(good.clone()), 0);

    let mut w = good.uniqueify().unwrap();
    let seg = w.transport_header_mut().unwrap();
    seg[UDP_HDR_SZ] ^= 0x80;
    expect_emit(check.process(w.into_packet()), 1);
    assert_eq!(check.reason_drops(Reason::BadChecksum), Some(1));
}

#[test]
fn udp_rejects_short_length() {
    let check = CheckUdpHeader::new("udp0", details_cfg(), 2).unwrap();

    let mut dgram = udp_datagram(b"");
    // A stored length of 7: less than the header alone.
    dgram[4..6].copy_from_slice(&7u16.to_be_bytes());
    let pkt = ipv4_packet(Protocol::UDP, &dgram);

    expect_emit(check.process(pkt), 1);
    assert_eq!(check.reason_drops(Reason::BadLength), Some(1));
}

#[test]
fn udp_rejects_oversized_length() {
    let check = CheckUdpHeader::new("udp0", details_cfg(), 2).unwrap();

    let mut dgram = udp_datagram(b"four");
    // A stored length claiming more bytes than were captured.
    dgram[4..6].copy_from_slice(&64u16.to_be_bytes());
    let pkt = ipv4_packet(Protocol::UDP, &dgram);

    expect_emit(check.process(pkt), 1);
    assert_eq!(check.reason_drops(Reason::BadLength), Some(1));
}

#[test]
fn udp_rejects_non_udp() {
    let check = CheckUdpHeader::new("udp0", details_cfg(), 2).unwrap();
    let pkt = good_tcp_packet(b"");

    expect_emit(check.process(pkt), 1);
    assert_eq!(check.reason_drops(Reason::NotProtocol), Some(1));
}

// ================================================================
// Counters and handlers
// ================================================================

#[test]
fn counters_account_for_every_packet() {
    let check = CheckUdpHeader::new("udp0", details_cfg(), 2).unwrap();

    let mut dispatched = 0;
    for i in 0..12u32 {
        let pkt = match i % 4 {
            0 => good_udp_packet(b"ok"),
            1 => good_tcp_packet(b"nope"),
            2 => {
                let mut dgram = udp_datagram(b"");
                dgram[4..6].copy_from_slice(&3u16.to_be_bytes());
                ipv4_packet(Protocol::UDP, &dgram)
            }
            _ => {
                let mut w =
                    good_udp_packet(b"soon corrupt").uniqueify().unwrap();
                w.transport_header_mut().unwrap()[UDP_HDR_SZ] ^= 0xFF;
                w.into_packet()
            }
        };

        match check.process(pkt) {
            ProcessResult::Emit(_, pkt) => pkt.kill(),
            ProcessResult::Consumed => (),
        }
        dispatched += 1;
    }

    assert_eq!(check.count() + check.drops(), dispatched);
    let by_reason = [
        Reason::NotProtocol,
        Reason::BadLength,
        Reason::BadChecksum,
    ]
    .iter()
    .map(|r| check.reason_drops(*r).unwrap())
    .sum::<u64>();
    assert_eq!(by_reason, check.drops());
    assert_eq!(check.count(), 3);
    assert_eq!(check.drops(), 9);
}

#[test]
fn read_handlers() {
    let check = CheckTcpHeader::new("tcp0", details_cfg(), 2).unwrap();
    assert_eq!(check.name(), "tcp0");
    assert_eq!(check.noutputs(), 2);

    expect_emit(check.process(good_tcp_packet(b"x")), 0);
    expect_emit(check.process(good_udp_packet(b"y")), 1);

    assert_eq!(check.read_handler("count").as_deref(), Some("1"));
    assert_eq!(check.read_handler("drops").as_deref(), Some("1"));
    assert_eq!(check.read_handler("nonesuch"), None);

    let details = check.read_handler("drop_details").unwrap();
    assert_eq!(
        details.lines().next().unwrap(),
        format!("{:>15} packets due to: {:>24}", 1, "not TCP")
    );
    assert_eq!(details.lines().count(), 3);

    // Without DETAILS there is no drop_details handler.
    let plain =
        CheckTcpHeader::new("tcp1", CheckConfig::default(), 2).unwrap();
    assert_eq!(plain.read_handler("drop_details"), None);
}
