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

use crate::api::AssocEvent;
use crate::api::AssocTime;
use crate::api::ErrorKind;
use crate::api::Options;
use crate::api::SackOutcome;
use crate::api::SackResult;
use crate::api::ShutdownState;
use crate::packet::error_causes::ErrorCause;
use crate::packet::forward_tsn_chunk::ForwardTsnChunk;
use crate::packet::sack_chunk::GapAckBlock;
use crate::packet::sack_chunk::SackChunk;
use crate::path::Path;
use crate::tx::congestion::AckSummary;
use crate::tx::congestion::CongestionControl;
use crate::tx::sent_queue::SentQueue;
use crate::types::PathId;
use crate::types::Tsn;
use crate::EventSink;
use std::cell::RefCell;
use std::rc::Rc;

/// Processes inbound SACK/NR-SACK chunks against the sent queue: acknowledgement release,
/// revocation, retransmission marking, the peer receive window, congestion control and the
/// T3-rtx bookkeeping reported back to the timer layer.
pub struct SackProcessor {
    sent: SentQueue,
    cc: Box<dyn CongestionControl>,

    /// The peer's receive window, shrunk by what's in flight.
    peers_rwnd: u32,

    mtu: usize,
    per_chunk_overhead: usize,
    sws_threshold: usize,
    fast_resend_threshold: u8,
    partial_reliability: bool,

    events: Rc<RefCell<dyn EventSink>>,
}

impl SackProcessor {
    pub fn new(
        my_initial_tsn: Tsn,
        options: &Options,
        cc: Box<dyn CongestionControl>,
        events: Rc<RefCell<dyn EventSink>>,
    ) -> Self {
        Self {
            sent: SentQueue::new(my_initial_tsn),
            cc,
            peers_rwnd: 0,
            mtu: options.mtu,
            per_chunk_overhead: options.per_chunk_overhead,
            sws_threshold: options.rwnd_silly_window_threshold,
            fast_resend_threshold: options.fast_resend_threshold,
            partial_reliability: options.enable_partial_reliability,
            events,
        }
    }

    pub fn sent_queue(&self) -> &SentQueue {
        &self.sent
    }

    pub fn sent_queue_mut(&mut self) -> &mut SentQueue {
        &mut self.sent
    }

    pub fn peers_rwnd(&self) -> u32 {
        self.peers_rwnd
    }

    pub fn create_forward_tsn(&self) -> ForwardTsnChunk {
        self.sent.create_forward_tsn()
    }

    /// Processes one SACK. All validation happens before any state is touched, so a malformed
    /// SACK aborts with the sent queue exactly as it was.
    pub fn process(
        &mut self,
        now: AssocTime,
        sack: &SackChunk,
        ecn_observed: bool,
        paths: &mut [Path],
        shutdown: ShutdownState,
    ) -> SackResult {
        if let Err(reason) = validate_gap_blocks(&sack.gap_ack_blocks)
            .and_then(|_| validate_gap_blocks(&sack.nr_gap_ack_blocks))
        {
            return self.abort(reason);
        }
        if sack.cumulative_tsn_ack > self.sent.highest_outstanding_tsn() {
            // A SACK can't acknowledge data that was never sent.
            return self.abort("SACK acknowledges unsent data");
        }
        if sack.cumulative_tsn_ack < self.sent.cumulative_acked() {
            // From <https://datatracker.ietf.org/doc/html/rfc9260#section-6.2.1-5.4.2.1.1>:
            //
            //   If Cumulative TSN Ack is less than the Cumulative TSN Ack Point, then drop the
            //   SACK chunk. [...] a SACK chunk whose Cumulative TSN Ack is less than the
            //   Cumulative TSN Ack Point indicates an out-of-order SACK chunk.
            log::debug!("dropping out-of-order SACK with cum_ack_tsn {}", sack.cumulative_tsn_ack);
            return SackResult::Invalid;
        }

        let old_cumulative = self.sent.cumulative_acked();
        let old_total_flight = self.sent.total_flight();
        let accum_moved = sack.cumulative_tsn_ack > old_cumulative;

        if !accum_moved && sack.gap_ack_blocks.is_empty() && sack.nr_gap_ack_blocks.is_empty() {
            // Pure window update: nothing is newly acknowledged or reported missing.
            self.recompute_rwnd(sack.a_rwnd);
            return SackResult::Processed(SackOutcome {
                rwnd: self.peers_rwnd,
                fwd_tsn_needed: false,
                rtt: None,
                reset_error_counter: false,
                restart_t3: vec![],
                stop_t3: vec![],
                shutdown_ready: self.handle_shutdown_sequencing(shutdown),
            });
        }

        let old_flights: Vec<usize> = paths.iter().map(|p| p.flight_size).collect();
        for path in paths.iter_mut() {
            if path.fast_recovery_exit.is_some_and(|exit| sack.cumulative_tsn_ack >= exit) {
                log::debug!("exiting fast recovery at {}", sack.cumulative_tsn_ack);
                path.fast_recovery_exit = None;
            }
            path.prepare_for_sack(sack.cumulative_tsn_ack);
            self.cc.prepare_for_sack(path);
        }

        let info = self.sent.apply_sack(
            now,
            sack.cumulative_tsn_ack,
            &sack.gap_ack_blocks,
            &sack.nr_gap_ack_blocks,
            paths,
            self.fast_resend_threshold,
            self.partial_reliability,
        );
        debug_assert!(self.sent.is_consistent(paths));

        self.recompute_rwnd(sack.a_rwnd);
        if self.peers_rwnd > 0 {
            // The window opened again; any zero-window probe has served its purpose.
            for path in paths.iter_mut() {
                path.window_probe_outstanding = false;
            }
        }

        log::debug!(
            "processed SACK, cum_ack_tsn={} ({}), flight={} ({}), rwnd={}",
            sack.cumulative_tsn_ack,
            old_cumulative,
            self.sent.total_flight(),
            old_total_flight,
            self.peers_rwnd,
        );

        // Congestion control, per path that saw new acknowledgements.
        for (i, path) in paths.iter_mut().enumerate() {
            if path.new_ack_bytes == 0 {
                continue;
            }
            let was_fully_utilized = old_flights[i] + self.mtu >= path.cwnd;
            let summary = AckSummary {
                bytes_acked: path.new_ack_bytes,
                bytes_unretransmitted: path.new_unretransmitted_bytes,
                cumulative_moved: accum_moved,
                was_fully_utilized,
            };
            self.cc.on_new_ack(path, &summary);
        }
        let highest_outstanding = self.sent.highest_outstanding_tsn();
        for path_id in &info.loss_paths {
            self.cc.on_packet_loss(&mut paths[path_id.0], highest_outstanding);
        }
        if ecn_observed && !paths.is_empty() {
            // An ECN congestion mark is a loss-equivalent signal on the primary path.
            self.cc.on_packet_loss(&mut paths[0], highest_outstanding);
        }

        let fwd_tsn_needed =
            self.sent.advance_peer_ack_point(now, self.partial_reliability, paths);

        // T3-rtx decisions for the external timer layer.
        let mut restart_t3: Vec<PathId> = vec![];
        let mut stop_t3: Vec<PathId> = vec![];
        for (i, path) in paths.iter().enumerate() {
            let path_id = PathId(i);
            if path.flight_size == 0 {
                if old_flights[i] > 0 {
                    // From <https://datatracker.ietf.org/doc/html/rfc9260#section-6.3.2-2.2.1>:
                    //
                    //   Whenever all outstanding data sent to an address have been acknowledged,
                    //   turn off the T3-rtx timer of that address.
                    stop_t3.push(path_id);
                }
            } else if path.new_ack_bytes > 0 || info.revoked_paths.contains(&path_id) {
                // From <https://datatracker.ietf.org/doc/html/rfc9260#section-6.3.2>:
                //
                //   Whenever a SACK chunk is received that acknowledges the DATA chunk with the
                //   earliest outstanding TSN for that address, restart the T3-rtx timer [...]
                //
                //   Whenever a SACK chunk is received missing a TSN that was previously
                //   acknowledged via a Gap Ack Block, start the T3-rtx [...] if it is not
                //   already running.
                restart_t3.push(path_id);
            }
        }

        SackResult::Processed(SackOutcome {
            rwnd: self.peers_rwnd,
            fwd_tsn_needed,
            rtt: info.rtt,
            reset_error_counter: info.bytes_acked > 0,
            restart_t3,
            stop_t3,
            shutdown_ready: self.handle_shutdown_sequencing(shutdown),
        })
    }

    fn abort(&mut self, reason: &str) -> SackResult {
        log::debug!("aborting association: {}", reason);
        let mut events = self.events.borrow_mut();
        events.add(AssocEvent::SendAbort(ErrorCause::protocol_violation(reason)));
        events.add(AssocEvent::OnAborted(ErrorKind::ProtocolViolation, reason.to_string()));
        SackResult::Aborted
    }

    fn recompute_rwnd(&mut self, a_rwnd: u32) {
        let used = self.sent.total_flight() + self.per_chunk_overhead * self.sent.flight_count();
        let mut rwnd = (a_rwnd as usize).saturating_sub(used);
        if rwnd < self.sws_threshold {
            // Below the silly window threshold the window is treated as closed.
            rwnd = 0;
        }
        self.peers_rwnd = rwnd as u32;
    }

    /// With everything acknowledged, a pending graceful shutdown can proceed.
    fn handle_shutdown_sequencing(&mut self, shutdown: ShutdownState) -> bool {
        if !self.sent.is_empty() {
            return false;
        }
        match shutdown {
            ShutdownState::Pending => self.events.borrow_mut().add(AssocEvent::SendShutdown),
            ShutdownState::Received => self.events.borrow_mut().add(AssocEvent::SendShutdownAck),
            ShutdownState::None => {}
        }
        true
    }
}

fn validate_gap_blocks(blocks: &[GapAckBlock]) -> Result<(), &'static str> {
    let mut prev_end: u32 = 0;
    for block in blocks {
        if block.start > block.end {
            return Err("gap ack block start beyond its end");
        }
        if (block.start as u32) <= prev_end {
            return Err("gap ack blocks out of order or overlapping");
        }
        prev_end = block.end as u32;
    }
    Ok(())
}
