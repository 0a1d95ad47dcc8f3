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
use crate::types::Tsn;
use std::time::Duration;

const RTO_ALPHA: f64 = 0.125;
const RTO_BETA: f64 = 0.25;

/// RFC 6298-style smoothed round-trip estimator, one per destination path.
#[derive(Debug)]
pub struct RtoEstimator {
    min_rto: f64,
    max_rto: f64,
    max_rtt: Duration,
    min_rtt_variance: f64,
    first_measurement: bool,
    srtt: f64,
    rtt_var: f64,
    rto: Duration,
}

impl RtoEstimator {
    pub fn new(options: &Options) -> Self {
        Self {
            min_rto: options.rto_min.as_secs_f64(),
            max_rto: options.rto_max.as_secs_f64(),
            max_rtt: options.rtt_max,
            min_rtt_variance: options.min_rtt_variance.as_secs_f64(),
            first_measurement: true,
            srtt: options.rto_initial.as_secs_f64(),
            rtt_var: 0.0,
            rto: options.rto_initial,
        }
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn srtt(&self) -> Duration {
        Duration::from_secs_f64(self.srtt)
    }

    pub fn observe(&mut self, measured_rtt: Duration) {
        // Unrealistic values are skipped; a corrupt measurement would take a long time to smooth
        // back out.
        if measured_rtt > self.max_rtt {
            return;
        }
        let rtt = measured_rtt.as_secs_f64();

        // See <https://datatracker.ietf.org/doc/html/rfc9260#section-6.3.1>.
        if self.first_measurement {
            self.srtt = rtt;
            self.rtt_var = rtt / 2.0;
            self.first_measurement = false;
        } else {
            self.rtt_var = (1.0 - RTO_BETA) * self.rtt_var + RTO_BETA * (self.srtt - rtt).abs();
            self.srtt = (1.0 - RTO_ALPHA) * self.srtt + RTO_ALPHA * rtt;
        }

        if self.rtt_var < self.min_rtt_variance {
            self.rtt_var = self.min_rtt_variance;
        }

        let rto = (self.srtt + 4.0 * self.rtt_var).clamp(self.min_rto, self.max_rto);
        self.rto = Duration::from_secs_f64(rto);
    }
}

/// One destination transport address of the association.
///
/// Carries the per-path congestion state mutated by the SACK processor and congestion-control
/// implementation, plus the per-SACK scratch values of the CMT split-fast-retransmit (SFR) and
/// HTNA algorithms: `saw_newack` and `this_sack_highest_newack` are reset before each SACK is
/// processed and only ever describe the SACK being processed.
#[derive(Debug)]
pub struct Path {
    /// Congestion window: bytes that may be in flight on this path.
    pub cwnd: usize,

    /// Slow start threshold. See RFC 9260 section 7.2.
    pub ssthresh: usize,

    /// Partial bytes acked, the congestion-avoidance accumulator. See RFC 9260 section 7.2.2.
    pub partial_bytes_acked: usize,

    /// Bytes sent on this path and not yet acknowledged.
    pub flight_size: usize,

    /// If set, this path is in fast recovery until the cumulative ack passes this TSN.
    pub fast_recovery_exit: Option<Tsn>,

    /// Whether the path has missed enough acknowledgements to be considered potentially failed
    /// (set by the timer layer, consulted when picking retransmission destinations).
    pub potentially_failed: bool,

    /// A zero-window probe is outstanding on this path.
    pub window_probe_outstanding: bool,

    pub rto: RtoEstimator,

    // Per-SACK scratch (SFR/HTNA).
    pub saw_newack: bool,
    pub this_sack_highest_newack: Tsn,

    // Per-SACK byte totals handed to the congestion-control implementation.
    pub new_ack_bytes: usize,
    pub new_unretransmitted_bytes: usize,
}

impl Path {
    pub fn new(options: &Options) -> Self {
        Self {
            cwnd: options.cwnd_mtus_initial * options.mtu,
            ssthresh: usize::MAX,
            partial_bytes_acked: 0,
            flight_size: 0,
            fast_recovery_exit: None,
            potentially_failed: false,
            window_probe_outstanding: false,
            rto: RtoEstimator::new(options),
            saw_newack: false,
            this_sack_highest_newack: Tsn(0),
            new_ack_bytes: 0,
            new_unretransmitted_bytes: 0,
        }
    }

    pub fn is_in_fast_recovery(&self) -> bool {
        self.fast_recovery_exit.is_some()
    }

    /// Resets the per-SACK scratch. Called before each SACK is processed.
    pub fn prepare_for_sack(&mut self, cumulative_tsn_ack: Tsn) {
        self.saw_newack = false;
        self.this_sack_highest_newack = cumulative_tsn_ack;
        self.new_ack_bytes = 0;
        self.new_unretransmitted_bytes = 0;
    }

    /// Records that `tsn` (`bytes` on the wire, never retransmitted if `unretransmitted`) was
    /// newly acknowledged on this path by the SACK being processed.
    pub fn record_newack(&mut self, tsn: Tsn, bytes: usize, unretransmitted: bool) {
        self.saw_newack = true;
        if tsn > self.this_sack_highest_newack {
            self.this_sack_highest_newack = tsn;
        }
        self.new_ack_bytes += bytes;
        if unretransmitted {
            self.new_unretransmitted_bytes += bytes;
        }
    }
}
