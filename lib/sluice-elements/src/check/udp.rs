// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! An element which checks UDP framing and checksums.

use sluice::element::Element;
use sluice::element::ProcessResult;
use sluice::ip4::Protocol;
use sluice::packet::Packet;
use sluice::udp::UDP_HDR_SZ;

use super::CheckConfig;
use super::CheckerCore;
use super::ConfigError;
use super::Reason;
use super::NREASONS;

const REASON_TEXTS: [&str; NREASONS] =
    ["not UDP", "bad packet length", "bad UDP checksum"];

/// Validate the UDP framing of IPv4 packets.
///
/// The UDP length field must cover at least the 8-byte header and
/// must not claim more bytes than were captured. A stored checksum of
/// zero means the sender opted out, which IPv4 permits; such packets
/// are accepted without verification regardless of the `CHECKSUM`
/// setting.
pub struct CheckUdpHeader {
    core: CheckerCore,
}

impl CheckUdpHeader {
    pub fn new(
        name: impl Into<String>,
        cfg: CheckConfig,
        noutputs: usize,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            core: CheckerCore::new(name.into(), REASON_TEXTS, cfg, noutputs)?,
        })
    }

    /// Packets accepted so far.
    pub fn count(&self) -> u64 {
        self.core.count()
    }

    /// Packets rejected so far.
    pub fn drops(&self) -> u64 {
        self.core.drops()
    }

    /// Rejections attributed to `reason`; `None` unless the instance
    /// was configured with `DETAILS`.
    pub fn reason_drops(&self, reason: Reason) -> Option<u64> {
        self.core.reason_drops(reason)
    }

    fn check(&self, pkt: &Packet) -> Result<(), Reason> {
        if !pkt.has_network_header() {
            return Err(Reason::NotProtocol);
        }

        let iph = pkt.ip_header().ok_or(Reason::NotProtocol)?;
        if Protocol::try_from(iph.proto) != Ok(Protocol::UDP) {
            return Err(Reason::NotProtocol);
        }

        let udph = pkt.udp_header().ok_or(Reason::BadLength)?;
        let dgram_len = udph.length() as usize;
        if dgram_len < UDP_HDR_SZ {
            return Err(Reason::BadLength);
        }

        let seg = pkt.transport_header().ok_or(Reason::BadLength)?;
        if seg.len() < dgram_len {
            return Err(Reason::BadLength);
        }

        if !udph.csum_is_zero() && self.core.cfg.checksum {
            let mut csum = iph.pseudo_csum(dgram_len as u16);
            csum.add(&seg[..dgram_len]);
            if !csum.verify() {
                return Err(Reason::BadChecksum);
            }
        }

        Ok(())
    }
}

impl Element for CheckUdpHeader {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn noutputs(&self) -> usize {
        self.core.noutputs
    }

    fn process(&self, pkt: Packet) -> ProcessResult {
        match self.check(&pkt) {
            Ok(()) => self.core.accept(pkt),
            Err(reason) => self.core.reject(reason, pkt),
        }
    }

    fn read_handler(&self, name: &str) -> Option<String> {
        self.core.read_handler(name)
    }
}
