// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! IPv4 headers.

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Ref;
use zerocopy::Unaligned;

use crate::checksum::Checksum;
use crate::packet::ReadErr;
use crate::packet::ReadResult;

pub const IPV4_HDR_LEN_MASK: u8 = 0x0F;
pub const IPV4_HDR_VER_SHIFT: u8 = 4;
pub const IPV4_HDR_SZ: usize = core::mem::size_of::<Ipv4HdrRaw>();
pub const IPV4_VERSION: u8 = 4;

/// An IP protocol number.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Protocol {
    ICMP = 0x1,
    IGMP = 0x2,
    TCP = 0x6,
    UDP = 0x11,
    Reserved = 0xFF,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Reserved
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::ICMP => write!(f, "ICMP"),
            Protocol::IGMP => write!(f, "IGMP"),
            Protocol::TCP => write!(f, "TCP"),
            Protocol::UDP => write!(f, "UDP"),
            Protocol::Reserved => write!(f, "Reserved"),
        }
    }
}

impl TryFrom<u8> for Protocol {
    type Error = String;

    fn try_from(proto: u8) -> core::result::Result<Self, Self::Error> {
        match proto {
            0x1 => Ok(Protocol::ICMP),
            0x2 => Ok(Protocol::IGMP),
            0x6 => Ok(Protocol::TCP),
            0x11 => Ok(Protocol::UDP),
            proto => Err(format!("unhandled IP protocol: 0x{:X}", proto)),
        }
    }
}

/// Note: For now we keep this unaligned to be safe.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: [u8; 2],
    pub ident: [u8; 2],
    pub frag_and_flags: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub csum: [u8; 2],
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Ipv4HdrRaw {
    pub fn parse(bytes: &[u8]) -> ReadResult<&Self> {
        let (hdr, _) = Ref::<_, Self>::new_from_prefix(bytes)
            .ok_or(ReadErr::NotEnoughBytes)?;
        Ok(hdr.into_ref())
    }

    pub fn parse_mut(bytes: &mut [u8]) -> ReadResult<&mut Self> {
        let (hdr, _) = Ref::<_, Self>::new_from_prefix(bytes)
            .ok_or(ReadErr::NotEnoughBytes)?;
        Ok(hdr.into_mut())
    }

    pub fn version(&self) -> u8 {
        self.ver_hdr_len >> IPV4_HDR_VER_SHIFT
    }

    /// Return the header length, in bytes (the IHL field is in 32-bit
    /// words).
    pub fn hdr_len(&self) -> usize {
        ((self.ver_hdr_len & IPV4_HDR_LEN_MASK) as usize) * 4
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes(self.total_len)
    }

    /// Seed a checksum with this header's pseudo-header: source and
    /// destination address, a zero-padded protocol byte, and the ULP
    /// length (RFC 793 §3.1 / RFC 768).
    pub fn pseudo_csum(&self, ulp_len: u16) -> Checksum {
        let mut csum = Checksum::compute(&self.src);
        csum.add(&self.dst);
        csum.add(&[0, self.proto]);
        csum.add(&ulp_len.to_be_bytes());
        csum
    }
}

impl Default for Ipv4HdrRaw {
    fn default() -> Self {
        Ipv4HdrRaw {
            ver_hdr_len: (IPV4_VERSION << IPV4_HDR_VER_SHIFT) | 0x5,
            dscp_ecn: 0x0,
            total_len: [0x0; 2],
            ident: [0x0; 2],
            frag_and_flags: [0x0; 2],
            ttl: 64,
            proto: Protocol::Reserved as u8,
            csum: [0x0; 2],
            src: [0x0; 4],
            dst: [0x0; 4],
        }
    }
}

#[test]
fn hdr_len_is_words() {
    let mut iph = Ipv4HdrRaw::default();
    assert_eq!(iph.version(), 4);
    assert_eq!(iph.hdr_len(), 20);
    iph.ver_hdr_len = 0x46;
    assert_eq!(iph.hdr_len(), 24);
}

#[test]
fn parse_needs_twenty_bytes() {
    let bytes = [0u8; IPV4_HDR_SZ];
    assert!(Ipv4HdrRaw::parse(&bytes).is_ok());
    assert_eq!(
        Ipv4HdrRaw::parse(&bytes[..19]).err(),
        Some(ReadErr::NotEnoughBytes)
    );
}
