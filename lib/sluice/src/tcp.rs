// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! TCP headers.

use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Ref;
use zerocopy::Unaligned;

use crate::packet::ReadErr;
use crate::packet::ReadResult;

/// Size of the option-less TCP header.
pub const TCP_HDR_SZ: usize = core::mem::size_of::<TcpHdrRaw>();

/// The standard TCP flags. We don't bother with the experimental NS
/// flag.
pub mod TcpFlags {
    pub const FIN: u8 = crate::bit_on(0);
    pub const SYN: u8 = crate::bit_on(1);
    pub const RST: u8 = crate::bit_on(2);
    pub const PSH: u8 = crate::bit_on(3);
    pub const ACK: u8 = crate::bit_on(4);
    pub const URG: u8 = crate::bit_on(5);
    pub const ECE: u8 = crate::bit_on(6);
    pub const CWR: u8 = crate::bit_on(7);
}

/// Note: For now we keep this unaligned to be safe.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct TcpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub seq: [u8; 4],
    pub ack: [u8; 4],
    pub offset: u8,
    pub flags: u8,
    pub win: [u8; 2],
    pub csum: [u8; 2],
    pub urg: [u8; 2],
}

impl TcpHdrRaw {
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

    /// Return the header length, in bytes (the data offset field is
    /// in 32-bit words).
    pub fn hdr_len(&self) -> usize {
        ((self.offset >> 4) as usize) * 4
    }

    pub fn set_hdr_len(&mut self, bytes: usize) {
        debug_assert!(bytes % 4 == 0 && bytes / 4 <= 0xF);
        self.offset = (self.offset & 0x0F) | (((bytes / 4) as u8) << 4);
    }
}

impl Default for TcpHdrRaw {
    fn default() -> Self {
        TcpHdrRaw {
            src_port: [0x0; 2],
            dst_port: [0x0; 2],
            seq: [0x0; 4],
            ack: [0x0; 4],
            // Data offset of 5 words: the option-less header.
            offset: 0x50,
            flags: 0x0,
            win: [0x0; 2],
            csum: [0x0; 2],
            urg: [0x0; 2],
        }
    }
}

#[test]
fn hdr_len_is_words() {
    let mut tcph = TcpHdrRaw::default();
    assert_eq!(tcph.hdr_len(), TCP_HDR_SZ);
    tcph.set_hdr_len(32);
    assert_eq!(tcph.hdr_len(), 32);
    assert_eq!(TCP_HDR_SZ, 20);
}
