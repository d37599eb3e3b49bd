// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! An element which checks TCP framing and checksums.

use sluice::element::Element;
use sluice::element::ProcessResult;
use sluice::ip4::Protocol;
use sluice::packet::Packet;
use sluice::tcp::TCP_HDR_SZ;

use super::CheckConfig;
use super::CheckerCore;
use super::ConfigError;
use super::Reason;
use super::NREASONS;

const REASON_TEXTS: [&str; NREASONS] =
    ["not TCP", "bad packet length", "bad TCP checksum"];

/// Validate the TCP framing of IPv4 packets.
///
/// A packet passes when it has a network header marking an IPv4/TCP
/// header pair, the IP and TCP length fields agree with each other
/// and with the bytes actually captured, and (unless disabled) the
/// TCP checksum verifies against the segment plus pseudo-header.
/// Passing packets are forwarded unchanged on output 0.
pub struct CheckTcpHeader {
    core: CheckerCore,
}

impl CheckTcpHeader {
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
        if Protocol::try_from(iph.proto) != Ok(Protocol::TCP) {
            return Err(Reason::NotProtocol);
        }

        // The segment length claimed by the IP header...
        let seg_len = (iph.total_len() as usize)
            .checked_sub(iph.hdr_len())
            .ok_or(Reason::BadLength)?;

        let tcph = pkt.tcp_header().ok_or(Reason::BadLength)?;
        let tcph_len = tcph.hdr_len();
        if tcph_len < TCP_HDR_SZ || seg_len < tcph_len {
            return Err(Reason::BadLength);
        }

        // ...must actually have been captured, or the checksum below
        // would run off the end of the packet.
        let seg = pkt.transport_header().ok_or(Reason::BadLength)?;
        if seg.len() < seg_len {
            return Err(Reason::BadLength);
        }

        if self.core.cfg.checksum {
            let mut csum = iph.pseudo_csum(seg_len as u16);
            csum.add(&seg[..seg_len]);
            if !csum.verify() {
                return Err(Reason::BadChecksum);
            }
        }

        Ok(())
    }
}

impl Element for CheckTcpHeader {
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
