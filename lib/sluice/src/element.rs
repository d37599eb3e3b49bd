// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The processing-element seam.
//!
//! An element is one node of the pipeline: it takes ownership of a
//! packet, inspects or rewrites it, and either emits it on one of its
//! output ports or consumes it. The runtime that instantiates
//! elements, binds their configuration, and routes [`ProcessResult`]
//! values between ports lives outside this crate.

use crate::packet::Packet;

/// What became of a processed packet.
#[derive(Debug)]
pub enum ProcessResult {
    /// Emit the packet on the numbered output port.
    Emit(usize, Packet),

    /// The element consumed (killed) the packet.
    Consumed,
}

/// A single processing stage.
///
/// Elements are run single-threaded per packet: `process` never
/// blocks, and every packet handed in must either come back out in
/// the [`ProcessResult`] or be killed.
pub trait Element {
    /// The instance name, used in log messages and by the handler
    /// plumbing.
    fn name(&self) -> &str;

    /// How many output ports this instance was configured with.
    fn noutputs(&self) -> usize;

    /// Process one packet.
    fn process(&self, pkt: Packet) -> ProcessResult;

    /// Look up a named read handler, returning its current value
    /// rendered as text. Handlers are how operators inspect counters
    /// without stopping the pipeline.
    fn read_handler(&self, _name: &str) -> Option<String> {
        None
    }
}
