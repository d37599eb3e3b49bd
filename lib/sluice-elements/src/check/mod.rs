// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Header-check elements.
//!
//! A check element is a pure consumer: it classifies the packet
//! against one protocol's framing and checksum rules and then either
//! forwards it unchanged on output 0 or rejects it. A rejected packet
//! goes out on output 1 when the instance has two outputs, and is
//! killed when it has one. The protocol-specific validation lives in
//! [`tcp`] and [`udp`]; everything they share -- configuration,
//! counters, the drop path, and the read handlers -- lives here.

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use tracing::warn;

use sluice::element::ProcessResult;
use sluice::packet::Packet;

pub mod tcp;
pub mod udp;

/// Why a packet was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reason {
    /// The packet has no network header, or its IP protocol is not
    /// the one this element checks.
    NotProtocol = 0,

    /// The length fields of the IP/L4 headers disagree with each
    /// other or with the bytes actually present.
    BadLength = 1,

    /// The L4 checksum over the segment and pseudo-header does not
    /// verify.
    BadChecksum = 2,
}

pub const NREASONS: usize = 3;

/// Configuration shared by the check elements. The keys follow the
/// element configuration language, hence the shouting.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct CheckConfig {
    /// Log every rejection, not just the first.
    pub verbose: bool,

    /// Keep per-reason drop counters (and expose the `drop_details`
    /// handler).
    pub details: bool,

    /// Verify L4 checksums. On by default.
    pub checksum: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self { verbose: false, details: false, checksum: true }
    }
}

/// An element was instantiated with a configuration it cannot honor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Check elements take one output (rejects are killed) or two
    /// (rejects go out on output 1).
    BadOutputCount(usize),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::BadOutputCount(n) => {
                write!(f, "check elements take 1 or 2 outputs, not {}", n)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// The state both check elements share: identity, configuration, and
/// counters. The counters are independent 64-bit atomics so a control
/// thread can read them through the handlers while the data path
/// keeps running; no cross-counter snapshot consistency is promised.
pub(crate) struct CheckerCore {
    pub(crate) name: String,
    pub(crate) reason_texts: [&'static str; NREASONS],
    pub(crate) cfg: CheckConfig,
    pub(crate) noutputs: usize,
    count: AtomicU64,
    drops: AtomicU64,
    reason_drops: Option<[AtomicU64; NREASONS]>,
}

impl CheckerCore {
    pub(crate) fn new(
        name: String,
        reason_texts: [&'static str; NREASONS],
        cfg: CheckConfig,
        noutputs: usize,
    ) -> Result<Self, ConfigError> {
        if noutputs == 0 || noutputs > 2 {
            return Err(ConfigError::BadOutputCount(noutputs));
        }

        let reason_drops = if cfg.details {
            Some([AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)])
        } else {
            None
        };

        Ok(Self {
            name,
            reason_texts,
            cfg,
            noutputs,
            count: AtomicU64::new(0),
            drops: AtomicU64::new(0),
            reason_drops,
        })
    }

    pub(crate) fn accept(&self, pkt: Packet) -> ProcessResult {
        self.count.fetch_add(1, Relaxed);
        ProcessResult::Emit(0, pkt)
    }

    pub(crate) fn reject(&self, reason: Reason, pkt: Packet) -> ProcessResult {
        if self.drops.load(Relaxed) == 0 || self.cfg.verbose {
            warn!(
                "{}: header check failed: {}",
                self.name, self.reason_texts[reason as usize]
            );
        }

        self.drops.fetch_add(1, Relaxed);
        if let Some(rd) = &self.reason_drops {
            rd[reason as usize].fetch_add(1, Relaxed);
        }

        if self.noutputs == 2 {
            ProcessResult::Emit(1, pkt)
        } else {
            pkt.kill();
            ProcessResult::Consumed
        }
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Relaxed)
    }

    pub(crate) fn drops(&self) -> u64 {
        self.drops.load(Relaxed)
    }

    pub(crate) fn reason_drops(&self, reason: Reason) -> Option<u64> {
        Some(self.reason_drops.as_ref()?[reason as usize].load(Relaxed))
    }

    /// One line per reason, fixed-width so the columns line up when
    /// an operator dumps several elements at once.
    pub(crate) fn drop_details(&self) -> Option<String> {
        let rd = self.reason_drops.as_ref()?;
        let mut out = String::new();
        for (i, text) in self.reason_texts.iter().enumerate() {
            out.push_str(&format!(
                "{:>15} packets due to: {:>24}\n",
                rd[i].load(Relaxed),
                text
            ));
        }
        Some(out)
    }

    pub(crate) fn read_handler(&self, name: &str) -> Option<String> {
        match name {
            "count" => Some(self.count().to_string()),
            "drops" => Some(self.drops().to_string()),
            "drop_details" => self.drop_details(),
            _ => None,
        }
    }
}
