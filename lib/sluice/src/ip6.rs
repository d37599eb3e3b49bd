// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! IPv6 headers.

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Ref;
use zerocopy::Unaligned;

use crate::packet::ReadErr;
use crate::packet::ReadResult;

/// The fixed IPv6 header is always 40 bytes; extension headers are
/// chained behind it via `next_hdr`.
pub const IPV6_HDR_SZ: usize = core::mem::size_of::<Ipv6HdrRaw>();
pub const IPV6_VERSION: u8 = 6;

#[repr(C)]
#[derive(Clone, Copy, Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct Ipv6HdrRaw {
    pub vsn_class_flow: [u8; 4],
    pub payload_len: [u8; 2],
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

impl Ipv6HdrRaw {
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
        self.vsn_class_flow[0] >> 4
    }

    pub fn payload_len(&self) -> u16 {
        u16::from_be_bytes(self.payload_len)
    }
}

#[test]
fn fixed_header_is_forty_bytes() {
    assert_eq!(IPV6_HDR_SZ, 40);
}
