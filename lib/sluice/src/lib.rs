// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The sluice packet-buffer engine.
//!
//! This crate provides the primitives a modular packet-processing
//! pipeline is built out of: a refcounted packet buffer with cheap
//! cloning and copy-on-write ([`packet::Packet`] and
//! [`packet::WritablePacket`]), a fixed-size per-handle annotation
//! block ([`anno::Anno`]), raw views of the protocol headers the
//! engine cares about ([`ip4`], [`ip6`], [`tcp`], [`udp`]), the
//! internet checksum ([`checksum`]), and the seam a processing
//! element plugs into ([`element`]).
//!
//! The runtime that wires elements together, parses their
//! configuration, and routes packets between output ports lives
//! outside this crate. The engine only promises that moving a packet
//! between elements is a pointer-sized move and that sharing a packet
//! between pipeline branches is a refcount bump.
#![allow(clippy::len_without_is_empty)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod anno;
pub mod checksum;
pub mod element;
pub mod ip4;
pub mod ip6;
pub mod packet;
pub mod tcp;
pub mod udp;

/// Return value with `bit` set.
pub const fn bit_on(bit: u8) -> u8 {
    0x1 << bit
}
