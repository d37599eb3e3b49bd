// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Types for calculating the internet checksum.
//!
//! The [`Checksum`] type provides a rolling one's complement sum,
//! allowing one to build up a sum over several byte ranges (say, a
//! pseudo-header followed by a ULP segment) before finalizing it. The
//! [`HeaderChecksum`] type is the value actually stored in the header
//! bytes: the one's complement of the one's complement sum.
//!
//! A note on endianness: you never perform byte-order conversion on a
//! checksum field. Both the bytes being summed and the checksum field
//! itself are treated as native 16-bit integers
//! (`{to,from}_ne_bytes()`). The bytes being summed are in network
//! order, so the finalized sum lands in memory in network order as
//! well. See RFC 1071 §1.B.

/// A checksum in the form it is stored in a header: the one's
/// complement of the one's complement sum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderChecksum {
    inner: [u8; 2],
}

impl HeaderChecksum {
    /// Return the bytes that represent this header checksum.
    pub fn bytes(&self) -> [u8; 2] {
        self.inner
    }

    /// Wrap raw bytes that represent a header checksum.
    pub fn wrap(hc: [u8; 2]) -> Self {
        Self { inner: hc }
    }
}

impl From<Checksum> for HeaderChecksum {
    fn from(mut csum: Checksum) -> HeaderChecksum {
        Self { inner: (!u16::from_ne_bytes(csum.finalize())).to_ne_bytes() }
    }
}

/// A rolling one's complement sum.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    inner: u32,
}

impl Checksum {
    /// Sum `bytes` over a zero seed.
    pub fn compute(bytes: &[u8]) -> Self {
        Self { inner: csum_add(0, bytes) }
    }

    /// Add `bytes` to the running sum.
    pub fn add(&mut self, bytes: &[u8]) {
        self.inner = csum_add(self.inner, bytes);
    }

    /// Fold the carries back in and return the sum as it would sit in
    /// memory.
    pub fn finalize(&mut self) -> [u8; 2] {
        while (self.inner >> 16) != 0 {
            self.inner = (self.inner >> 16) + (self.inner & 0xFFFF);
        }

        ((self.inner & 0xFFFF) as u16).to_ne_bytes()
    }

    /// Verify a sum which covered both the data and the stored
    /// checksum field.
    ///
    /// Summing a valid header/segment together with its own stored
    /// checksum yields all-ones; anything else means the data and the
    /// stored checksum disagree.
    pub fn verify(mut self) -> bool {
        u16::from_ne_bytes(self.finalize()) == 0xFFFF
    }
}

impl From<HeaderChecksum> for Checksum {
    fn from(hc: HeaderChecksum) -> Self {
        Self { inner: (!u16::from_ne_bytes(hc.bytes())) as u32 }
    }
}

fn csum_add(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut len = bytes.len();
    let mut pos = 0;

    while len > 1 {
        csum += u16::from_ne_bytes([bytes[pos], bytes[pos + 1]]) as u32;
        pos += 2;
        len -= 2;
    }

    // An odd trailing byte is summed as if padded with a zero.
    if len == 1 {
        csum += bytes[pos] as u32;
    }

    csum
}
