// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Types for creating, sharing, and mutating packets.
//!
//! A [`Packet`] is a handle onto a refcounted byte buffer. The handle
//! carries everything that is private to one consumer of the packet:
//! the payload window (`data`/`tail` offsets), the cached header
//! positions, and the annotation block. Only the bytes themselves are
//! shared. This is what makes [`Packet::clone`] cheap enough for
//! per-packet use on the forwarding path: a clone is a refcount bump
//! plus a small struct copy, and two clones can thereafter trim their
//! own view of the payload independently.
//!
//! Mutating the shared bytes requires proof of exclusive ownership,
//! which is what [`WritablePacket`] is: a witness that the handle it
//! wraps is the buffer's only owner. [`Packet::uniqueify`] produces
//! one, copying the buffer first if anyone else still holds a
//! reference. The growth operations ([`Packet::push`] and
//! [`Packet::put`]) imply uniquification and hand back a
//! `WritablePacket` for the same reason.
//!
//! # Concurrency
//!
//! A single handle must not be used from two threads at once; hand
//! another thread its own clone instead. Clones sharing one buffer
//! may read concurrently. The refcount is the only cross-thread
//! shared state, and [`Arc`] updates it with exactly the discipline
//! required here: relaxed increments, release decrements, and an
//! acquire fence before the buffer is freed.

use core::fmt;
use core::fmt::Display;
use core::ops::Deref;
use core::ops::DerefMut;
use std::cmp;
use std::sync::Arc;
use tracing::warn;

use crate::anno::Anno;
use crate::ip4::Ipv4HdrRaw;
use crate::ip6::Ipv6HdrRaw;
use crate::ip6::IPV6_HDR_SZ;
use crate::tcp::TcpHdrRaw;
use crate::udp::UdpHdrRaw;

/// Headroom reserved by the default constructors, enough for an
/// Ethernet header plus a VLAN tag with change to spare. Upstream
/// elements can prepend a link-layer header without forcing a
/// reallocation.
pub const DEFAULT_HEADROOM: usize = 28;

/// No buffer is ever allocated smaller than this.
pub const MIN_BUFFER_LEN: usize = 64;

// When a growth request misses the fast path, round the new room up
// so that subsequent small growths on the same side stay on the fast
// path.
const GROW_SLOP: usize = 128;

const fn grow_room(nbytes: usize) -> usize {
    (nbytes + GROW_SLOP) & !3
}

/// The allocator declined to produce a buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AllocError;

impl Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "packet buffer allocation failed")
    }
}

impl std::error::Error for AllocError {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadErr {
    BadLayout,
    NotEnoughBytes,
}

pub type ReadResult<T> = core::result::Result<T, ReadErr>;

/// The byte region backing one or more packet handles.
///
/// The region is a single contiguous allocation; `head` is always
/// offset 0 and `end` is always the capacity. Which bytes currently
/// constitute "the packet" is the business of each handle, not of the
/// buffer.
#[derive(Debug)]
struct Buffer {
    bytes: Box<[u8]>,
}

impl Buffer {
    /// Allocate a zero-filled region of `len` bytes.
    fn alloc(len: usize) -> Result<Self, AllocError> {
        let mut v = Vec::new();
        v.try_reserve_exact(len).map_err(|_| AllocError)?;
        v.resize(len, 0);
        Ok(Self { bytes: v.into_boxed_slice() })
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// A handle onto a (possibly shared) packet buffer.
///
/// The payload is the window `[data, tail)` of the buffer; the bytes
/// before it are headroom, the bytes after it tailroom. The handle
/// additionally caches where the network and transport headers begin
/// (absolute buffer offsets, set by whichever element located them)
/// and carries a per-handle [`Anno`] block.
///
/// Dropping the handle releases its buffer reference; [`Packet::kill`]
/// is the same thing spelled out at the call site.
#[derive(Clone, Debug)]
pub struct Packet {
    buf: Arc<Buffer>,
    data: usize,
    tail: usize,
    nh: Option<usize>,
    th: Option<usize>,
    anno: Anno,
}

impl Packet {
    /// Allocate a new packet.
    ///
    /// The buffer has capacity `max(headroom + len + tailroom, 64)`,
    /// with the payload window starting `headroom` bytes in and
    /// running for `len` bytes. When `src` is given its contents
    /// become the payload (its length must equal `len`); otherwise
    /// the payload is zero-filled.
    ///
    /// # Panics
    ///
    /// Panics if `src` is given and its length differs from `len`.
    pub fn make(
        headroom: usize,
        src: Option<&[u8]>,
        len: usize,
        tailroom: usize,
    ) -> Result<WritablePacket, AllocError> {
        if let Some(src) = src {
            assert_eq!(src.len(), len, "src length does not match len");
        }

        let cap = cmp::max(headroom + len + tailroom, MIN_BUFFER_LEN);
        let mut buf = Buffer::alloc(cap)?;
        if let Some(src) = src {
            buf.bytes[headroom..headroom + len].copy_from_slice(src);
        }

        Ok(WritablePacket::wrap(Packet {
            buf: Arc::new(buf),
            data: headroom,
            tail: headroom + len,
            nh: None,
            th: None,
            anno: Anno::default(),
        }))
    }

    /// Allocate a packet with a zero-filled payload of `len` bytes
    /// and the default headroom.
    pub fn alloc(len: usize) -> Result<WritablePacket, AllocError> {
        Packet::make(DEFAULT_HEADROOM, None, len, 0)
    }

    /// Allocate a packet whose payload is a copy of `bytes`, with the
    /// default headroom.
    pub fn copy(bytes: &[u8]) -> Result<WritablePacket, AllocError> {
        Packet::make(DEFAULT_HEADROOM, Some(bytes), bytes.len(), 0)
    }

    /// Release this handle. The buffer is freed along with the last
    /// handle referencing it.
    pub fn kill(self) {}

    // ================================================================
    // Payload geometry
    // ================================================================

    /// The payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf.bytes[self.data..self.tail]
    }

    /// The payload length.
    pub fn len(&self) -> usize {
        self.tail - self.data
    }

    /// Bytes available in front of the payload for prepending.
    pub fn headroom(&self) -> usize {
        self.data
    }

    /// Bytes available behind the payload for appending.
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.tail
    }

    /// Capacity of the underlying buffer.
    pub fn buffer_len(&self) -> usize {
        self.buf.len()
    }

    // ================================================================
    // Sharing
    // ================================================================

    /// True whenever another handle references the same buffer.
    pub fn shared(&self) -> bool {
        Arc::strong_count(&self.buf) > 1
    }

    /// The number of handles currently referencing the buffer.
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.buf)
    }

    /// Assert exclusive ownership of the buffer, copying it first if
    /// it is shared.
    ///
    /// This is the only route to write access for the payload and the
    /// cached headers. On the copy path the full buffer window is
    /// duplicated, so headroom, tailroom, and the cached header
    /// offsets all carry over unchanged.
    pub fn uniqueify(self) -> Result<WritablePacket, AllocError> {
        if !self.shared() {
            return Ok(WritablePacket::wrap(self));
        }

        let mut buf = Buffer::alloc(self.buffer_len())?;
        buf.bytes.copy_from_slice(&self.buf.bytes);
        Ok(WritablePacket::wrap(Packet { buf: Arc::new(buf), ..self }))
    }

    // ================================================================
    // Headroom/tailroom operations
    // ================================================================

    /// Grow the payload by `nbytes` at the front.
    ///
    /// When the handle is the sole owner and the headroom suffices
    /// this just moves `data` backwards. Otherwise the payload is
    /// copied into a fresh buffer with room to spare.
    pub fn push(self, nbytes: usize) -> Result<WritablePacket, AllocError> {
        if self.headroom() >= nbytes && !self.shared() {
            let mut pkt = self;
            pkt.data -= nbytes;
            Ok(WritablePacket::wrap(pkt))
        } else {
            self.expensive_push(nbytes)
        }
    }

    /// [`Packet::push`] without the uniqueness demand: a fast-path
    /// push only moves this handle's `data` offset, which is fine on
    /// a shared buffer as long as the caller only intends to read.
    pub fn nonunique_push(self, nbytes: usize) -> Result<Packet, AllocError> {
        if self.headroom() >= nbytes {
            let mut pkt = self;
            pkt.data -= nbytes;
            Ok(pkt)
        } else {
            self.expensive_push(nbytes).map(Packet::from)
        }
    }

    /// Shrink the payload by `nbytes` at the front. Never reallocates.
    /// Asking for more than the payload length clamps and warns.
    pub fn pull(&mut self, nbytes: usize) {
        let nbytes = if nbytes > self.len() {
            warn!("pull {} > length {}", nbytes, self.len());
            self.len()
        } else {
            nbytes
        };
        self.data += nbytes;
    }

    /// Grow the payload by `nbytes` at the back; the counterpart of
    /// [`Packet::push`].
    pub fn put(self, nbytes: usize) -> Result<WritablePacket, AllocError> {
        if self.tailroom() >= nbytes && !self.shared() {
            let mut pkt = self;
            pkt.tail += nbytes;
            Ok(WritablePacket::wrap(pkt))
        } else {
            self.expensive_put(nbytes)
        }
    }

    /// [`Packet::put`] without the uniqueness demand.
    pub fn nonunique_put(self, nbytes: usize) -> Result<Packet, AllocError> {
        if self.tailroom() >= nbytes {
            let mut pkt = self;
            pkt.tail += nbytes;
            Ok(pkt)
        } else {
            self.expensive_put(nbytes).map(Packet::from)
        }
    }

    /// Shrink the payload by `nbytes` at the back. Never reallocates.
    /// Asking for more than the payload length clamps and warns.
    pub fn take(&mut self, nbytes: usize) {
        let nbytes = if nbytes > self.len() {
            warn!("take {} > length {}", nbytes, self.len());
            self.len()
        } else {
            nbytes
        };
        self.tail -= nbytes;
    }

    /// Reposition the payload window inside the buffer, valid when
    /// `headroom + len <= buffer_len()` and silently a no-op
    /// otherwise. The cached header offsets are left alone and will
    /// usually be stale afterwards; the caller is expected to re-set
    /// them.
    pub fn change_headroom_and_length(&mut self, headroom: usize, len: usize) {
        if headroom + len <= self.buffer_len() {
            self.data = headroom;
            self.tail = headroom + len;
        }
    }

    fn expensive_push(
        self,
        nbytes: usize,
    ) -> Result<WritablePacket, AllocError> {
        let mut w = self.reallocate(grow_room(nbytes), None)?;
        w.pkt.data -= nbytes;
        Ok(w)
    }

    fn expensive_put(
        self,
        nbytes: usize,
    ) -> Result<WritablePacket, AllocError> {
        let headroom = self.headroom();
        let mut w = self.reallocate(headroom, Some(grow_room(nbytes)))?;
        w.pkt.tail += nbytes;
        Ok(w)
    }

    /// Copy the payload into a fresh buffer with the given headroom.
    /// `tailroom` of `None` preserves the current tailroom.
    fn reallocate(
        self,
        headroom: usize,
        tailroom: Option<usize>,
    ) -> Result<WritablePacket, AllocError> {
        let len = self.len();
        let tailroom = tailroom.unwrap_or_else(|| self.tailroom());
        let cap = cmp::max(headroom + len + tailroom, MIN_BUFFER_LEN);
        let mut buf = Buffer::alloc(cap)?;
        buf.bytes[headroom..headroom + len].copy_from_slice(self.data());

        // Keep the cached headers naming the same payload bytes
        // across the move. An offset that lands outside the new
        // buffer (the header was pulled out of the window before the
        // reallocation) is dropped rather than left dangling.
        let shift = headroom as isize - self.data as isize;
        let move_off = |off: usize| -> Option<usize> {
            match off as isize + shift {
                new if new < 0 || new as usize > cap => None,
                new => Some(new as usize),
            }
        };

        Ok(WritablePacket::wrap(Packet {
            buf: Arc::new(buf),
            data: headroom,
            tail: headroom + len,
            nh: self.nh.and_then(move_off),
            th: self.th.and_then(move_off),
            anno: self.anno,
        }))
    }

    // ================================================================
    // Header cache
    //
    // The offsets are trusted as set: elements that pull or take past
    // a cached header are expected to re-validate on the consumer
    // side. The typed accessors below return None rather than a view
    // of bytes that are no longer there.
    // ================================================================

    /// True once an element has recorded where the network header
    /// begins.
    pub fn has_network_header(&self) -> bool {
        self.nh.is_some()
    }

    /// The network header bytes, from the recorded start of the
    /// network header up to the recorded start of the transport
    /// header.
    pub fn network_header(&self) -> Option<&[u8]> {
        self.buf.bytes.get(self.nh?..self.th?)
    }

    /// The bytes from the recorded start of the transport header to
    /// the end of the payload.
    pub fn transport_header(&self) -> Option<&[u8]> {
        self.buf.bytes.get(self.th?..self.tail)
    }

    /// The network header viewed as IPv4.
    pub fn ip_header(&self) -> Option<&Ipv4HdrRaw> {
        Ipv4HdrRaw::parse(self.buf.bytes.get(self.nh?..)?).ok()
    }

    /// The network header viewed as IPv6.
    pub fn ip6_header(&self) -> Option<&Ipv6HdrRaw> {
        Ipv6HdrRaw::parse(self.buf.bytes.get(self.nh?..)?).ok()
    }

    /// The transport header viewed as TCP.
    pub fn tcp_header(&self) -> Option<&TcpHdrRaw> {
        TcpHdrRaw::parse(self.buf.bytes.get(self.th?..self.tail)?).ok()
    }

    /// The transport header viewed as UDP.
    pub fn udp_header(&self) -> Option<&UdpHdrRaw> {
        UdpHdrRaw::parse(self.buf.bytes.get(self.th?..self.tail)?).ok()
    }

    /// Offset of the network header relative to `data`. Negative once
    /// the packet has been pulled past the header.
    pub fn network_header_offset(&self) -> Option<isize> {
        Some(self.nh? as isize - self.data as isize)
    }

    /// Length of the network header as recorded when it was set.
    pub fn network_header_len(&self) -> Option<usize> {
        Some(self.th? - self.nh?)
    }

    pub fn ip_header_offset(&self) -> Option<isize> {
        self.network_header_offset()
    }

    pub fn ip_header_len(&self) -> Option<usize> {
        self.network_header_len()
    }

    pub fn ip6_header_offset(&self) -> Option<isize> {
        self.network_header_offset()
    }

    pub fn ip6_header_len(&self) -> Option<usize> {
        self.network_header_len()
    }

    /// Offset of the transport header relative to `data`.
    pub fn transport_header_offset(&self) -> Option<isize> {
        Some(self.th? as isize - self.data as isize)
    }

    // ================================================================
    // Annotations
    // ================================================================

    pub fn anno(&self) -> &Anno {
        &self.anno
    }

    /// Annotations are per-handle, so mutating them is allowed on any
    /// handle, shared or not.
    pub fn anno_mut(&mut self) -> &mut Anno {
        &mut self.anno
    }

    /// Reset every annotation to its default and forget the cached
    /// header offsets.
    pub fn clear_annotations(&mut self) {
        self.anno = Anno::default();
        self.nh = None;
        self.th = None;
    }

    /// Adopt `src`'s annotation block. The header cache is *not*
    /// copied; it describes this handle's buffer, not `src`'s.
    pub fn copy_annotations(&mut self, src: &Packet) {
        self.anno = src.anno;
    }
}

/// A witness that the wrapped [`Packet`] is its buffer's only owner,
/// and therefore may mutate the bytes.
///
/// A `WritablePacket` derefs to [`Packet`], so the whole read API is
/// available, and it converts back into a plain `Packet` with
/// [`From`] when write access is no longer needed. Creating new
/// shared references through the read view (cloning out of a
/// `&Packet`) re-shares the buffer; the mutable accessors will panic
/// if that has happened, rather than write through a shared buffer.
#[derive(Debug)]
pub struct WritablePacket {
    pkt: Packet,
}

impl WritablePacket {
    fn wrap(pkt: Packet) -> Self {
        debug_assert!(!pkt.shared());
        Self { pkt }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let buf = Arc::get_mut(&mut self.pkt.buf)
            .expect("writable packet over a shared buffer");
        &mut buf.bytes
    }

    /// The payload bytes, mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let (data, tail) = (self.pkt.data, self.pkt.tail);
        &mut self.bytes_mut()[data..tail]
    }

    /// The whole buffer window, headroom and tailroom included.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.bytes_mut()
    }

    pub fn network_header_mut(&mut self) -> Option<&mut [u8]> {
        let (nh, th) = (self.pkt.nh?, self.pkt.th?);
        self.bytes_mut().get_mut(nh..th)
    }

    pub fn transport_header_mut(&mut self) -> Option<&mut [u8]> {
        let (th, tail) = (self.pkt.th?, self.pkt.tail);
        self.bytes_mut().get_mut(th..tail)
    }

    pub fn ip_header_mut(&mut self) -> Option<&mut Ipv4HdrRaw> {
        let nh = self.pkt.nh?;
        Ipv4HdrRaw::parse_mut(self.bytes_mut().get_mut(nh..)?).ok()
    }

    pub fn ip6_header_mut(&mut self) -> Option<&mut Ipv6HdrRaw> {
        let nh = self.pkt.nh?;
        Ipv6HdrRaw::parse_mut(self.bytes_mut().get_mut(nh..)?).ok()
    }

    pub fn tcp_header_mut(&mut self) -> Option<&mut TcpHdrRaw> {
        let (th, tail) = (self.pkt.th?, self.pkt.tail);
        TcpHdrRaw::parse_mut(self.bytes_mut().get_mut(th..tail)?).ok()
    }

    pub fn udp_header_mut(&mut self) -> Option<&mut UdpHdrRaw> {
        let (th, tail) = (self.pkt.th?, self.pkt.tail);
        UdpHdrRaw::parse_mut(self.bytes_mut().get_mut(th..tail)?).ok()
    }

    /// Record that the network header starts `off` bytes into the
    /// payload and runs for `len` bytes; the transport header is
    /// taken to start immediately after it.
    pub fn set_network_header(&mut self, off: usize, len: usize) {
        let nh = self.pkt.data + off;
        debug_assert!(nh + len <= self.pkt.buf.len());
        self.pkt.nh = Some(nh);
        self.pkt.th = Some(nh + len);
    }

    /// [`WritablePacket::set_network_header`] for an IPv4 header of
    /// `len` bytes (the IHL in bytes, options included).
    pub fn set_ip_header(&mut self, off: usize, len: usize) {
        self.set_network_header(off, len);
    }

    /// [`WritablePacket::set_network_header`] for the fixed 40-byte
    /// IPv6 header.
    pub fn set_ip6_header(&mut self, off: usize) {
        self.set_network_header(off, IPV6_HDR_SZ);
    }

    /// See [`Packet::push`]. A writable handle is already unique, so
    /// this only reallocates when the headroom runs out.
    pub fn push(self, nbytes: usize) -> Result<WritablePacket, AllocError> {
        self.pkt.push(nbytes)
    }

    /// See [`Packet::put`].
    pub fn put(self, nbytes: usize) -> Result<WritablePacket, AllocError> {
        self.pkt.put(nbytes)
    }

    /// See [`Packet::uniqueify`]; on a writable handle this is the
    /// identity.
    pub fn into_packet(self) -> Packet {
        self.pkt
    }
}

impl Deref for WritablePacket {
    type Target = Packet;

    fn deref(&self) -> &Packet {
        &self.pkt
    }
}

impl DerefMut for WritablePacket {
    fn deref_mut(&mut self) -> &mut Packet {
        &mut self.pkt
    }
}

impl From<WritablePacket> for Packet {
    fn from(w: WritablePacket) -> Packet {
        w.pkt
    }
}
