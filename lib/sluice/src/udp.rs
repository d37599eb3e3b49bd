// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! UDP headers.

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Ref;
use zerocopy::Unaligned;

use crate::packet::ReadErr;
use crate::packet::ReadResult;

pub const UDP_HDR_SZ: usize = core::mem::size_of::<UdpHdrRaw>();

/// Note: For now we keep this unaligned to be safe.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct UdpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub length: [u8; 2],
    pub csum: [u8; 2],
}

impl UdpHdrRaw {
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

    /// Return the datagram length stored in the header. It covers the
    /// header itself as well as the payload (RFC 768).
    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.length)
    }

    /// A stored checksum of zero means the sender did not compute one;
    /// IPv4 allows that.
    pub fn csum_is_zero(&self) -> bool {
        self.csum == [0, 0]
    }
}

impl Default for UdpHdrRaw {
    fn default() -> Self {
        UdpHdrRaw {
            src_port: [0x0; 2],
            dst_port: [0x0; 2],
            length: [0x0; 2],
            csum: [0x0; 2],
        }
    }
}

#[test]
fn length_is_big_endian() {
    let mut udph = UdpHdrRaw::default();
    udph.length = 12u16.to_be_bytes();
    assert_eq!(udph.length(), 12);
    assert!(udph.csum_is_zero());
    assert_eq!(UDP_HDR_SZ, 8);
}
