// Copyright 2025 The dcSCTP Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::api::Options;
use crate::path::Path;
use crate::types::Tsn;
use std::cmp::max;
use std::cmp::min;

/// What one processed SACK newly acknowledged on one path.
#[derive(Debug)]
pub struct AckSummary {
    /// Bytes newly acknowledged on the path (cumulative ack and gap blocks combined).
    pub bytes_acked: usize,

    /// The subset of `bytes_acked` belonging to chunks that were never retransmitted.
    pub bytes_unretransmitted: usize,

    /// Whether this SACK advanced the association's cumulative ack point.
    pub cumulative_moved: bool,

    /// Whether the path's congestion window was (close to) fully utilized before this SACK
    /// arrived. Windows that aren't being filled must not grow.
    pub was_fully_utilized: bool,
}

/// The congestion-control strategy of an association, chosen at creation time.
///
/// Implementations mutate the congestion fields of [`Path`] (`cwnd`, `ssthresh`,
/// `partial_bytes_acked`, `fast_recovery_exit`); the engine owns flight-size accounting and calls
/// in here at the points the RFC prescribes.
pub trait CongestionControl {
    /// Called once per path before a SACK is processed, before any acknowledgement accounting.
    fn prepare_for_sack(&mut self, path: &mut Path);

    /// Called for every path on which the SACK newly acknowledged data.
    fn on_new_ack(&mut self, path: &mut Path, ack: &AckSummary);

    /// Called when loss was detected on a path (a chunk reached the fast-retransmit threshold,
    /// or an ECN congestion mark arrived). Enters fast recovery with `highest_outstanding` as
    /// the exit point, unless already in it.
    fn on_packet_loss(&mut self, path: &mut Path, highest_outstanding: Tsn);
}

/// The standard RFC 9260 congestion control: slow start, congestion avoidance and fast recovery.
#[derive(Debug)]
pub struct NewReno {
    mtu: usize,
    cwnd_mtus_min: usize,
}

impl NewReno {
    pub fn new(options: &Options) -> Self {
        Self { mtu: options.mtu, cwnd_mtus_min: options.cwnd_mtus_min }
    }
}

impl CongestionControl for NewReno {
    fn prepare_for_sack(&mut self, _path: &mut Path) {}

    fn on_new_ack(&mut self, path: &mut Path, ack: &AckSummary) {
        if !ack.cumulative_moved {
            return;
        }
        let old_cwnd = path.cwnd;
        if path.cwnd <= path.ssthresh {
            // From <https://datatracker.ietf.org/doc/html/rfc9260#section-7.2.1>:
            //
            //   Only when these three conditions are met can the cwnd be increased; otherwise,
            //   the cwnd MUST not be increased. If these conditions are met, then cwnd MUST be
            //   increased by, at most, the lesser of 1) the total size of the previously
            //   outstanding DATA chunk(s) acknowledged, and 2) the destination's path MTU.
            if ack.was_fully_utilized && !path.is_in_fast_recovery() {
                path.cwnd += min(ack.bytes_acked, self.mtu);
                log::debug!("SS increase cwnd={} ({})", path.cwnd, old_cwnd);
            }
        } else {
            // From <https://datatracker.ietf.org/doc/html/rfc9260#section-7.2.2>:
            //
            //   Whenever cwnd is greater than ssthresh, upon each SACK arrival that advances the
            //   Cumulative TSN Ack Point, increase partial_bytes_acked by the total number of
            //   bytes of all new chunks acknowledged in that SACK [...]
            //
            //   When partial_bytes_acked is equal to or greater than cwnd and before the arrival
            //   of the SACK the sender had cwnd or more bytes of data outstanding, increase cwnd
            //   by MTU, and reset partial_bytes_acked to (partial_bytes_acked - cwnd).
            path.partial_bytes_acked += ack.bytes_acked;
            if path.partial_bytes_acked >= path.cwnd && ack.was_fully_utilized {
                path.partial_bytes_acked -= path.cwnd;
                path.cwnd += self.mtu;
                log::debug!(
                    "CA increase cwnd={} ({}), pba={}",
                    path.cwnd,
                    old_cwnd,
                    path.partial_bytes_acked
                );
            }
        }
    }

    fn on_packet_loss(&mut self, path: &mut Path, highest_outstanding: Tsn) {
        if path.is_in_fast_recovery() {
            // From <https://datatracker.ietf.org/doc/html/rfc9260#section-7.2.4-5.6.1>:
            //
            //   While in Fast Recovery, the ssthresh and cwnd SHOULD NOT change for any
            //   destinations due to a subsequent Fast Recovery event [...]
            log::debug!("packet loss while in fast recovery, no window change");
            return;
        }
        let old_cwnd = path.cwnd;
        path.ssthresh = max(path.cwnd / 2, self.cwnd_mtus_min * self.mtu);
        path.cwnd = path.ssthresh;
        path.partial_bytes_acked = 0;
        path.fast_recovery_exit = Some(highest_outstanding);
        log::debug!(
            "packet loss: cwnd={} ({}), ssthresh={}, fast recovery until {}",
            path.cwnd,
            old_cwnd,
            path.ssthresh,
            highest_outstanding
        );
    }
}
