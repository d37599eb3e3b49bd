// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Processing elements built on the sluice engine.
//!
//! For now that means the L4 header validators: [`check::tcp::CheckTcpHeader`]
//! and [`check::udp::CheckUdpHeader`].
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod check;
