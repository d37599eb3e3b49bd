// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Per-packet annotations.
//!
//! Every packet handle carries a fixed-size annotation block alongside
//! the payload: a destination-address slot shared between IPv4 and
//! IPv6, twelve bytes of user-defined scratch space, a receive
//! timestamp, the receiving device, and a link-layer classification.
//! Annotations belong to the handle, not to the shared buffer --
//! cloning a packet copies them, and mutating them never requires
//! uniquifying the buffer.

use core::fmt;
use core::fmt::Display;
use core::num::NonZeroU32;
use serde::Deserialize;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

/// Size of the user scratch area, in bytes.
pub const USER_ANNO_SZ: usize = 12;

/// Number of `u32`/`i32` slots overlaying the user scratch area.
pub const USER_ANNO_WORDS: usize = USER_ANNO_SZ / 4;

/// The link-layer classification of a packet.
///
/// The discriminants agree with the classes a receive path reports
/// (`if_packet.h`).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(u8)]
pub enum PacketType {
    Host = 0,
    Broadcast = 1,
    Multicast = 2,
    Otherhost = 3,
    Outgoing = 4,
    Loopback = 5,
    Fastroute = 6,
}

impl Default for PacketType {
    fn default() -> Self {
        PacketType::Host
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PacketType::Host => "HOST",
            PacketType::Broadcast => "BROADCAST",
            PacketType::Multicast => "MULTICAST",
            PacketType::Otherhost => "OTHERHOST",
            PacketType::Outgoing => "OUTGOING",
            PacketType::Loopback => "LOOPBACK",
            PacketType::Fastroute => "FASTROUTE",
        };
        write!(f, "{}", s)
    }
}

/// A receive timestamp, seconds plus microseconds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Timestamp {
    pub sec: u64,
    pub usec: u32,
}

impl Timestamp {
    pub fn new(sec: u64, usec: u32) -> Self {
        Self { sec, usec }
    }
}

/// An opaque identifier for the network device a packet was received
/// on. Zero is reserved to mean "no device".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceTag(NonZeroU32);

impl DeviceTag {
    /// Wrap a raw device identifier. Returns `None` for zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

/// The annotation block itself.
///
/// The destination-address slot is 16 bytes of storage; the IPv4
/// accessors alias its first four bytes, the IPv6 accessors all
/// sixteen. The user scratch area is likewise one 12-byte region with
/// three views (`u8`/`u32`/`i32`) in the platform's native
/// representation -- writing through one view and reading through
/// another is well-defined on a single host, but no cross-host layout
/// is promised.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Anno {
    dst: [u8; 16],
    user: [u8; USER_ANNO_SZ],
    timestamp: Timestamp,
    device: Option<DeviceTag>,
    packet_type: PacketType,
}

impl Anno {
    /// Return the destination address interpreted as IPv4.
    pub fn dst_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from([self.dst[0], self.dst[1], self.dst[2], self.dst[3]])
    }

    /// Set the IPv4 view of the destination address. The remaining
    /// twelve bytes of the slot are left alone.
    pub fn set_dst_ip(&mut self, ip: Ipv4Addr) {
        self.dst[0..4].copy_from_slice(&ip.octets());
    }

    /// Return the destination address interpreted as IPv6.
    pub fn dst_ip6(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.dst)
    }

    pub fn set_dst_ip6(&mut self, ip: Ipv6Addr) {
        self.dst = ip.octets();
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, ts: Timestamp) {
        self.timestamp = ts;
    }

    pub fn device(&self) -> Option<DeviceTag> {
        self.device
    }

    pub fn set_device(&mut self, device: Option<DeviceTag>) {
        self.device = device;
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn set_packet_type(&mut self, pt: PacketType) {
        self.packet_type = pt;
    }

    /// Read byte `i` of the user scratch area.
    ///
    /// # Panics
    ///
    /// Panics if `i >= USER_ANNO_SZ`.
    pub fn user_u8(&self, i: usize) -> u8 {
        self.user[i]
    }

    pub fn set_user_u8(&mut self, i: usize, val: u8) {
        self.user[i] = val;
    }

    /// Read word `i` of the user scratch area in the platform's
    /// native representation.
    ///
    /// # Panics
    ///
    /// Panics if `i >= USER_ANNO_WORDS`.
    pub fn user_u32(&self, i: usize) -> u32 {
        let bytes = &self.user[i * 4..i * 4 + 4];
        u32::from_ne_bytes(bytes.try_into().unwrap())
    }

    pub fn set_user_u32(&mut self, i: usize, val: u32) {
        self.user[i * 4..i * 4 + 4].copy_from_slice(&val.to_ne_bytes());
    }

    pub fn user_i32(&self, i: usize) -> i32 {
        let bytes = &self.user[i * 4..i * 4 + 4];
        i32::from_ne_bytes(bytes.try_into().unwrap())
    }

    pub fn set_user_i32(&mut self, i: usize, val: i32) {
        self.user[i * 4..i * 4 + 4].copy_from_slice(&val.to_ne_bytes());
    }
}
