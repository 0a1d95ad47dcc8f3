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

use crate::api::AssocTime;
use crate::packet::forward_tsn_chunk::ForwardTsnChunk;
use crate::packet::sack_chunk::GapAckBlock;
use crate::packet::SkippedStream;
use crate::path::Path;
use crate::types::PathId;
use crate::types::Ssn;
use crate::types::StreamKey;
use crate::types::Tsn;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Bound::Excluded;
use std::ops::Bound::Included;
use std::time::Duration;

/// Where a transmitted chunk is in its acknowledgement lifecycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChunkState {
    /// Handed to the queue but not yet put on the wire. Cannot be acknowledged.
    Unsent,

    /// In flight, awaiting acknowledgement.
    Sent,

    /// Acknowledged through a renegable gap-ack-block. May still be revoked by a later SACK;
    /// held until the cumulative ack passes it.
    Acked,

    /// Acknowledged through a non-renegable (NR-SACK) gap-ack-block. Never revoked.
    NrAcked,

    /// Reported missing often enough to be scheduled for retransmission.
    MarkedForResend,

    /// Retransmitted and back in flight.
    Resent,

    /// Abandoned under PR-SCTP; the FORWARD-TSN advance point may pass over it.
    ForwardSkip,
}

impl ChunkState {
    /// In flight: counts against the flight size.
    fn is_outstanding(self) -> bool {
        matches!(self, ChunkState::Sent | ChunkState::Resent)
    }

    fn is_acked(self) -> bool {
        matches!(self, ChunkState::Acked | ChunkState::NrAcked)
    }
}

/// The partial-reliability policy a chunk was sent under.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PrPolicy {
    /// Fully reliable; retransmitted until acknowledged or the association fails.
    Reliable,

    /// Time-limited: abandoned once the deadline passes.
    Ttl(AssocTime),

    /// Retry-limited: abandoned after this many transmissions.
    Rtx(u16),

    /// Buffer-limited: abandoned by the send-buffer layer under memory pressure. Carried so a
    /// FORWARD-TSN can pass over chunks that layer abandons via [`SentQueue::abandon`].
    Buf(usize),
}

impl PrPolicy {
    fn is_reliable(self) -> bool {
        matches!(self, PrPolicy::Reliable)
    }
}

/// One transmitted DATA chunk awaiting acknowledgement.
#[derive(Debug)]
pub struct SentChunk {
    pub stream_key: StreamKey,
    pub ssn: Ssn,

    /// Wire size of the chunk, the unit of all flight-size accounting.
    pub size: usize,

    /// The destination path the latest transmission used.
    pub path: PathId,

    pub state: ChunkState,
    pub send_count: u16,
    pub strikes: u8,

    /// An RTT measurement is pending on this chunk. Cleared on retransmission (Karn's rule) and
    /// when marked for resend.
    pub do_rtt: bool,

    pub time_sent: AssocTime,

    /// The chunk was acked and later revoked; its size was compensated into the path cwnd and
    /// must be deflated again when it is re-acked or resent.
    pub was_revoked: bool,

    /// The chunk has been fast-retransmitted before. Further strikes only count once the peer
    /// has acked past `fast_retran_tsn` (data sent after the retransmission).
    pub fast_retransmitted: bool,
    pub fast_retran_tsn: Tsn,

    pub pr: PrPolicy,
}

/// What one SACK did to the queue, for the processor's congestion and timer decisions.
#[derive(Debug)]
pub struct AckInfo {
    /// Bytes newly acknowledged (cumulative ack and gap blocks combined, all paths).
    pub bytes_acked: usize,

    /// Highest TSN covered by the SACK (cumulative ack or any gap block).
    pub highest_tsn_acked: Tsn,

    /// Highest TSN that this SACK acknowledged for the first time.
    pub highest_tsn_newly_acked: Tsn,

    /// RTT measured from the first newly-acked chunk eligible under Karn's rule.
    pub rtt: Option<Duration>,

    /// Paths on which a chunk reached the fast-retransmit threshold.
    pub loss_paths: BTreeSet<PathId>,

    /// Paths that had a previously-acked chunk revoked.
    pub revoked_paths: BTreeSet<PathId>,
}

/// The per-association list of outstanding transmitted chunks, keyed by TSN.
///
/// Chunks enter when the sender hands data to the path layer and leave when the cumulative ack
/// passes them. Everything the SACK processor does to chunk state lives here; the processor
/// itself handles validation, windows and congestion control.
#[derive(Debug)]
pub struct SentQueue {
    chunks: BTreeMap<Tsn, SentChunk>,
    next_tsn: Tsn,
    cumulative_acked: Tsn,
    advanced_peer_ack_point: Tsn,
    total_flight: usize,
    flight_count: usize,
}

impl SentQueue {
    pub fn new(my_initial_tsn: Tsn) -> Self {
        Self {
            chunks: BTreeMap::new(),
            next_tsn: my_initial_tsn,
            cumulative_acked: my_initial_tsn - 1,
            advanced_peer_ack_point: my_initial_tsn - 1,
            total_flight: 0,
            flight_count: 0,
        }
    }

    pub fn next_tsn(&self) -> Tsn {
        self.next_tsn
    }

    pub fn highest_outstanding_tsn(&self) -> Tsn {
        self.next_tsn - 1
    }

    pub fn cumulative_acked(&self) -> Tsn {
        self.cumulative_acked
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_flight(&self) -> usize {
        self.total_flight
    }

    pub fn flight_count(&self) -> usize {
        self.flight_count
    }

    pub fn get(&self, tsn: Tsn) -> Option<&SentChunk> {
        self.chunks.get(&tsn)
    }

    /// Assigns the next TSN to a chunk that has been produced but not yet transmitted.
    pub fn enqueue(&mut self, stream_key: StreamKey, ssn: Ssn, size: usize, pr: PrPolicy) -> Tsn {
        let tsn = self.next_tsn;
        self.next_tsn += 1;
        self.chunks.insert(
            tsn,
            SentChunk {
                stream_key,
                ssn,
                size,
                path: PathId(0),
                state: ChunkState::Unsent,
                send_count: 0,
                strikes: 0,
                do_rtt: false,
                time_sent: AssocTime::zero(),
                was_revoked: false,
                fast_retransmitted: false,
                fast_retran_tsn: tsn,
                pr,
            },
        );
        tsn
    }

    /// Records that `tsn` went on the wire towards `path`. Enters the flight.
    pub fn mark_sent(&mut self, tsn: Tsn, now: AssocTime, path: PathId, paths: &mut [Path]) {
        let Some(chunk) = self.chunks.get_mut(&tsn) else {
            return;
        };
        debug_assert!(chunk.state == ChunkState::Unsent);
        chunk.state = ChunkState::Sent;
        chunk.send_count = 1;
        chunk.do_rtt = true;
        chunk.time_sent = now;
        chunk.path = path;
        self.total_flight += chunk.size;
        self.flight_count += 1;
        paths[path.0].flight_size += chunk.size;
    }

    /// Abandons a chunk under its PR-SCTP policy (e.g. the send-buffer layer dropping a
    /// buffer-limited message). Leaves the flight if it was in it.
    pub fn abandon(&mut self, tsn: Tsn, paths: &mut [Path]) {
        let Some(chunk) = self.chunks.get_mut(&tsn) else {
            return;
        };
        if chunk.state == ChunkState::ForwardSkip {
            return;
        }
        if chunk.state.is_outstanding() {
            self.total_flight -= chunk.size;
            self.flight_count -= 1;
            paths[chunk.path.0].flight_size -= chunk.size;
        }
        log::debug!("abandoning chunk {}", tsn);
        chunk.state = ChunkState::ForwardSkip;
    }

    /// Applies one validated SACK to the queue: releases cumulatively acked chunks, marks
    /// gap-acked chunks, reverts revoked acknowledgements and runs the fast-retransmit strike
    /// pass. `fast_recovery` is evaluated per chunk against its path.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_sack(
        &mut self,
        now: AssocTime,
        cumulative_tsn_ack: Tsn,
        gap_ack_blocks: &[GapAckBlock],
        nr_gap_ack_blocks: &[GapAckBlock],
        paths: &mut [Path],
        fast_resend_threshold: u8,
        partial_reliability: bool,
    ) -> AckInfo {
        let mut info = AckInfo {
            bytes_acked: 0,
            highest_tsn_acked: cumulative_tsn_ack,
            highest_tsn_newly_acked: cumulative_tsn_ack,
            rtt: None,
            loss_paths: BTreeSet::new(),
            revoked_paths: BTreeSet::new(),
        };
        let accum_moved = cumulative_tsn_ack > self.cumulative_acked;

        self.release_cumulative(now, cumulative_tsn_ack, paths, &mut info);

        let covered = self.ack_gap_blocks(
            now,
            cumulative_tsn_ack,
            gap_ack_blocks,
            nr_gap_ack_blocks,
            paths,
            &mut info,
        );

        self.check_for_revoked(cumulative_tsn_ack, &covered, paths, &mut info);

        self.strike_chunks(
            now,
            accum_moved,
            paths,
            fast_resend_threshold,
            partial_reliability,
            &mut info,
        );

        info
    }

    /// Walks the front of the queue releasing every chunk at or below the cumulative ack.
    fn release_cumulative(
        &mut self,
        now: AssocTime,
        cumulative_tsn_ack: Tsn,
        paths: &mut [Path],
        info: &mut AckInfo,
    ) {
        while let Some(entry) = self.chunks.first_entry() {
            let tsn = *entry.key();
            if tsn > cumulative_tsn_ack {
                break;
            }
            let chunk = entry.remove();
            if chunk.state.is_outstanding() {
                self.total_flight -= chunk.size;
                self.flight_count -= 1;
                let path = &mut paths[chunk.path.0];
                path.flight_size -= chunk.size;
                let unretransmitted = chunk.send_count == 1;
                path.record_newack(tsn, chunk.size, unretransmitted);
                info.bytes_acked += chunk.size;
                if tsn > info.highest_tsn_newly_acked {
                    info.highest_tsn_newly_acked = tsn;
                }
                if unretransmitted && chunk.do_rtt {
                    let sample = now - chunk.time_sent;
                    path.rto.observe(sample);
                    if info.rtt.is_none() {
                        info.rtt = Some(sample);
                    }
                }
            }
        }
        if cumulative_tsn_ack > self.cumulative_acked {
            self.cumulative_acked = cumulative_tsn_ack;
        }
        if self.advanced_peer_ack_point < self.cumulative_acked {
            self.advanced_peer_ack_point = self.cumulative_acked;
        }
    }

    /// Marks every chunk covered by the gap-ack-blocks as Acked (renegable blocks) or NrAcked
    /// (non-renegable blocks), returning the set of covered TSNs for the revocation pass.
    fn ack_gap_blocks(
        &mut self,
        now: AssocTime,
        cumulative_tsn_ack: Tsn,
        gap_ack_blocks: &[GapAckBlock],
        nr_gap_ack_blocks: &[GapAckBlock],
        paths: &mut [Path],
        info: &mut AckInfo,
    ) -> BTreeSet<Tsn> {
        let mut covered = BTreeSet::new();
        let blocks = gap_ack_blocks
            .iter()
            .map(|b| (b, ChunkState::Acked))
            .chain(nr_gap_ack_blocks.iter().map(|b| (b, ChunkState::NrAcked)));

        for (block, acked_state) in blocks {
            let start = cumulative_tsn_ack.add_to(block.start as u32);
            let end = cumulative_tsn_ack.add_to(block.end as u32);
            if end > info.highest_tsn_acked {
                info.highest_tsn_acked = end;
            }
            for (tsn, chunk) in self.chunks.range_mut((Included(start), Included(end))) {
                covered.insert(*tsn);
                match chunk.state {
                    ChunkState::Sent | ChunkState::Resent => {
                        self.total_flight -= chunk.size;
                        self.flight_count -= 1;
                        let path = &mut paths[chunk.path.0];
                        path.flight_size -= chunk.size;
                        let unretransmitted = chunk.send_count == 1;
                        path.record_newack(*tsn, chunk.size, unretransmitted);
                        info.bytes_acked += chunk.size;
                        if *tsn > info.highest_tsn_newly_acked {
                            info.highest_tsn_newly_acked = *tsn;
                        }
                        if unretransmitted && chunk.do_rtt {
                            let sample = now - chunk.time_sent;
                            path.rto.observe(sample);
                            chunk.do_rtt = false;
                            if info.rtt.is_none() {
                                info.rtt = Some(sample);
                            }
                        }
                        if chunk.was_revoked {
                            // Undo the cwnd compensation made when the ack was revoked.
                            path.cwnd = path.cwnd.saturating_sub(chunk.size);
                            chunk.was_revoked = false;
                        }
                        chunk.state = acked_state;
                    }
                    ChunkState::MarkedForResend => {
                        // Acked before the retransmission went out; it never rejoins the flight.
                        chunk.state = acked_state;
                    }
                    ChunkState::Acked => {
                        if acked_state == ChunkState::NrAcked {
                            chunk.state = ChunkState::NrAcked;
                        }
                    }
                    ChunkState::NrAcked | ChunkState::ForwardSkip | ChunkState::Unsent => {}
                }
            }
        }
        covered
    }

    /// Reverts previously-acked chunks above the cumulative ack that this SACK's blocks no
    /// longer cover: back to Sent, back into the flight, with the path cwnd compensated for the
    /// deflation that happened when they were first acked.
    fn check_for_revoked(
        &mut self,
        cumulative_tsn_ack: Tsn,
        covered: &BTreeSet<Tsn>,
        paths: &mut [Path],
        info: &mut AckInfo,
    ) {
        let mut flight_add = 0;
        let mut count_add = 0;
        for (tsn, chunk) in self
            .chunks
            .range_mut((Excluded(cumulative_tsn_ack), Included(info.highest_tsn_acked)))
        {
            if chunk.state == ChunkState::Unsent {
                break;
            }
            if chunk.state == ChunkState::Acked && !covered.contains(tsn) {
                log::debug!("tsn {} revoked by peer", tsn);
                chunk.state = ChunkState::Sent;
                chunk.was_revoked = true;
                flight_add += chunk.size;
                count_add += 1;
                let path = &mut paths[chunk.path.0];
                path.flight_size += chunk.size;
                // Compensate the window for the artificial flight inflation, so the revocation
                // doesn't stall the sender.
                path.cwnd += chunk.size;
                info.revoked_paths.insert(chunk.path);
            }
        }
        self.total_flight += flight_add;
        self.flight_count += count_add;
    }

    /// The fast-retransmit strike pass: walks chunks up to the highest TSN this SACK covered,
    /// striking those that the SFR/HTNA rules consider reported missing, and marks chunks that
    /// reach the threshold for resend. Expired PR-SCTP chunks are abandoned instead.
    fn strike_chunks(
        &mut self,
        now: AssocTime,
        accum_moved: bool,
        paths: &mut [Path],
        fast_resend_threshold: u8,
        partial_reliability: bool,
        info: &mut AckInfo,
    ) {
        let sending_seq = self.next_tsn;
        let multihomed = paths.len() > 1;
        let mut flight_sub = 0;
        let mut count_sub = 0;

        for (tsn, chunk) in self.chunks.iter_mut() {
            if chunk.state == ChunkState::Unsent {
                break;
            }
            if *tsn > info.highest_tsn_acked {
                break;
            }

            if partial_reliability
                && !chunk.state.is_acked()
                && chunk.state != ChunkState::ForwardSkip
            {
                match chunk.pr {
                    PrPolicy::Ttl(expires_at) if now >= expires_at => {
                        if chunk.state.is_outstanding() {
                            flight_sub += chunk.size;
                            count_sub += 1;
                            paths[chunk.path.0].flight_size -= chunk.size;
                        }
                        log::debug!("chunk {} expired (ttl), abandoning", tsn);
                        chunk.state = ChunkState::ForwardSkip;
                        continue;
                    }
                    PrPolicy::Rtx(limit) if chunk.send_count > limit => {
                        if chunk.state.is_outstanding() {
                            flight_sub += chunk.size;
                            count_sub += 1;
                            paths[chunk.path.0].flight_size -= chunk.size;
                        }
                        log::debug!("chunk {} exceeded its retransmit limit, abandoning", tsn);
                        chunk.state = ChunkState::ForwardSkip;
                        continue;
                    }
                    _ => {}
                }
            }

            if !chunk.state.is_outstanding() {
                // MarkedForResend, Acked, NrAcked or ForwardSkip: nothing to strike.
                continue;
            }

            // CMT SFR: a path that saw no new ack in this SACK tells us nothing about its
            // chunks; and chunks sent after the path's highest newly-acked TSN may simply be
            // reordered (this also covers the HTNA rule for the single-homed case).
            let path = &paths[chunk.path.0];
            if !path.saw_newack || *tsn > path.this_sack_highest_newack {
                continue;
            }

            let strike = if accum_moved && path.is_in_fast_recovery() {
                // From <https://datatracker.ietf.org/doc/html/rfc9260#section-7.2.4-3>:
                //
                //   If an endpoint is in Fast Recovery and a SACK chunk arrives that advances
                //   the Cumulative TSN Ack Point, the miss indications are incremented for all
                //   TSNs reported missing in the SACK chunk.
                true
            } else if chunk.fast_retransmitted {
                // Already fast-retransmitted once; only acks of data sent after that
                // retransmission may strike it again.
                info.highest_tsn_newly_acked >= chunk.fast_retran_tsn
            } else {
                *tsn <= info.highest_tsn_newly_acked
            };
            if !strike {
                continue;
            }

            chunk.strikes += 1;
            log::debug!("striking chunk {} ({} strikes)", tsn, chunk.strikes);
            if chunk.strikes < fast_resend_threshold {
                continue;
            }

            chunk.state = ChunkState::MarkedForResend;
            chunk.fast_retransmitted = true;
            chunk.fast_retran_tsn = sending_seq;
            chunk.do_rtt = false;
            flight_sub += chunk.size;
            count_sub += 1;
            paths[chunk.path.0].flight_size -= chunk.size;
            if chunk.was_revoked {
                paths[chunk.path.0].cwnd = paths[chunk.path.0].cwnd.saturating_sub(chunk.size);
                chunk.was_revoked = false;
            }
            info.loss_paths.insert(chunk.path);

            if multihomed {
                // CMT: retransmissions go to the alternate path with the most headroom.
                let alt = pick_alternate_path(paths, chunk.path);
                if alt != chunk.path {
                    log::debug!("reassigning chunk {} from path {} to {}", tsn, chunk.path, alt);
                    chunk.path = alt;
                }
            }
        }

        self.total_flight -= flight_sub;
        self.flight_count -= count_sub;
    }

    /// Takes every chunk marked for resend, moving it back into the flight as retransmitted.
    /// The caller transmits them on the returned path.
    pub fn take_chunks_to_resend(
        &mut self,
        now: AssocTime,
        paths: &mut [Path],
    ) -> Vec<(Tsn, PathId)> {
        let mut result = Vec::new();
        for (tsn, chunk) in self.chunks.iter_mut() {
            if chunk.state != ChunkState::MarkedForResend {
                continue;
            }
            chunk.state = ChunkState::Resent;
            chunk.send_count = chunk.send_count.saturating_add(1);
            chunk.strikes = 0;
            chunk.time_sent = now;
            self.total_flight += chunk.size;
            self.flight_count += 1;
            paths[chunk.path.0].flight_size += chunk.size;
            result.push((*tsn, chunk.path));
        }
        result
    }

    /// PR-SCTP: advances the peer-ack point over abandoned and non-renegably acked chunks at the
    /// front of the queue. Returns whether a FORWARD-TSN should be sent.
    pub fn advance_peer_ack_point(
        &mut self,
        now: AssocTime,
        partial_reliability: bool,
        paths: &mut [Path],
    ) -> bool {
        if !partial_reliability {
            return false;
        }
        let mut advanced = self.advanced_peer_ack_point.max(self.cumulative_acked);
        let mut to_abandon: Vec<Tsn> = Vec::new();
        for (tsn, chunk) in &self.chunks {
            if *tsn != advanced + 1 {
                break;
            }
            match chunk.state {
                ChunkState::ForwardSkip | ChunkState::NrAcked => {
                    advanced = *tsn;
                }
                ChunkState::MarkedForResend => {
                    // A chunk marked for resend whose lifetime has run out is abandoned now
                    // rather than retransmitted.
                    match chunk.pr {
                        PrPolicy::Ttl(expires_at) if now >= expires_at => {
                            to_abandon.push(*tsn);
                            advanced = *tsn;
                        }
                        _ => break,
                    }
                }
                _ => break,
            }
        }
        for tsn in to_abandon {
            self.abandon(tsn, paths);
        }
        if advanced > self.advanced_peer_ack_point {
            self.advanced_peer_ack_point = advanced;
        }
        self.advanced_peer_ack_point > self.cumulative_acked
    }

    /// Builds the FORWARD-TSN announcing the advanced peer-ack point, with the highest skipped
    /// SSN per ordered stream.
    pub fn create_forward_tsn(&self) -> ForwardTsnChunk {
        let mut skipped_per_stream: BTreeMap<crate::api::StreamId, Ssn> = BTreeMap::new();
        for (tsn, chunk) in &self.chunks {
            if *tsn > self.advanced_peer_ack_point {
                break;
            }
            if chunk.state == ChunkState::ForwardSkip && chunk.stream_key.is_ordered() {
                let entry = skipped_per_stream.entry(chunk.stream_key.id()).or_insert(chunk.ssn);
                if chunk.ssn > *entry {
                    *entry = chunk.ssn;
                }
            }
        }
        ForwardTsnChunk {
            new_cumulative_tsn: self.advanced_peer_ack_point,
            skipped_streams: skipped_per_stream
                .into_iter()
                .map(|(stream_id, ssn)| SkippedStream { stream_id, ssn })
                .collect(),
        }
    }

    /// Returns the internal state of all queued chunks. This is only used in unit-tests.
    pub fn chunk_states_for_testing(&self) -> Vec<(Tsn, ChunkState)> {
        self.chunks.iter().map(|(tsn, chunk)| (*tsn, chunk.state)).collect()
    }

    pub(crate) fn is_consistent(&self, paths: &[Path]) -> bool {
        let mut actual_flight = 0;
        let mut actual_count = 0;
        let mut per_path = vec![0usize; paths.len()];
        for chunk in self.chunks.values() {
            if chunk.state.is_outstanding() {
                actual_flight += chunk.size;
                actual_count += 1;
                per_path[chunk.path.0] += chunk.size;
            }
        }
        actual_flight == self.total_flight
            && actual_count == self.flight_count
            && paths.iter().enumerate().all(|(i, p)| p.flight_size == per_path[i])
    }
}

/// CMT retransmission policy: the alternate path with the largest ssthresh wins; a potentially
/// failed path is only used when there is no alternative.
fn pick_alternate_path(paths: &[Path], current: PathId) -> PathId {
    paths
        .iter()
        .enumerate()
        .filter(|(i, path)| *i != current.0 && !path.potentially_failed)
        .max_by_key(|(_, path)| path.ssthresh)
        .map(|(i, _)| PathId(i))
        .unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Options;
    use crate::api::StreamId;

    const INITIAL_TSN: Tsn = Tsn(10);
    const SIZE: usize = 100;

    fn now() -> AssocTime {
        AssocTime::zero()
    }

    fn make_paths(n: usize) -> Vec<Path> {
        (0..n).map(|_| Path::new(&Options::default())).collect()
    }

    fn send_chunks(queue: &mut SentQueue, paths: &mut [Path], count: usize) -> Vec<Tsn> {
        (0..count)
            .map(|_| {
                let tsn = queue.enqueue(
                    StreamKey::Ordered(StreamId(1)),
                    Ssn(0),
                    SIZE,
                    PrPolicy::Reliable,
                );
                queue.mark_sent(tsn, now(), PathId(0), paths);
                tsn
            })
            .collect()
    }

    fn apply(
        queue: &mut SentQueue,
        paths: &mut [Path],
        cumulative: Tsn,
        blocks: &[(u16, u16)],
    ) -> AckInfo {
        for path in paths.iter_mut() {
            path.prepare_for_sack(cumulative);
        }
        let blocks: Vec<GapAckBlock> =
            blocks.iter().map(|(s, e)| GapAckBlock::new(*s, *e)).collect();
        let info = queue.apply_sack(now(), cumulative, &blocks, &[], paths, 3, true);
        assert!(queue.is_consistent(paths));
        info
    }

    #[test]
    fn has_initial_state() {
        let queue = SentQueue::new(INITIAL_TSN);
        assert!(queue.is_empty());
        assert_eq!(queue.next_tsn(), Tsn(10));
        assert_eq!(queue.cumulative_acked(), Tsn(9));
        assert_eq!(queue.total_flight(), 0);
    }

    #[test]
    fn cumulative_ack_releases_chunks() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 3);
        assert_eq!(queue.total_flight(), 3 * SIZE);
        assert_eq!(paths[0].flight_size, 3 * SIZE);

        let info = apply(&mut queue, &mut paths, Tsn(11), &[]);
        assert_eq!(info.bytes_acked, 2 * SIZE);
        assert_eq!(queue.total_flight(), SIZE);
        assert_eq!(paths[0].flight_size, SIZE);
        assert_eq!(queue.cumulative_acked(), Tsn(11));
        assert_eq!(queue.chunk_states_for_testing(), vec![(Tsn(12), ChunkState::Sent)]);
    }

    #[test]
    fn cumulative_ack_measures_rtt_only_for_unretransmitted() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 1);

        let info = apply(&mut queue, &mut paths, Tsn(10), &[]);
        assert!(info.rtt.is_some());

        // A retransmitted chunk never yields a measurement.
        send_chunks(&mut queue, &mut paths, 1);
        queue.chunks.get_mut(&Tsn(11)).unwrap().send_count = 2;
        let info = apply(&mut queue, &mut paths, Tsn(11), &[]);
        assert!(info.rtt.is_none());
    }

    #[test]
    fn gap_blocks_mark_acked_and_leave_flight() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 4);

        // Cum ack 10; TSNs 12-13 gap-acked; 11 missing.
        let info = apply(&mut queue, &mut paths, Tsn(10), &[(2, 3)]);
        assert_eq!(info.bytes_acked, 3 * SIZE);
        assert_eq!(info.highest_tsn_newly_acked, Tsn(13));
        assert_eq!(queue.total_flight(), SIZE);
        assert_eq!(
            queue.chunk_states_for_testing(),
            vec![
                (Tsn(11), ChunkState::Sent),
                (Tsn(12), ChunkState::Acked),
                (Tsn(13), ChunkState::Acked),
            ]
        );
    }

    #[test]
    fn nr_gap_blocks_mark_nracked() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 3);

        for path in paths.iter_mut() {
            path.prepare_for_sack(Tsn(10));
        }
        queue.apply_sack(
            now(),
            Tsn(10),
            &[],
            &[GapAckBlock::new(2, 2)],
            &mut paths,
            3,
            true,
        );
        assert_eq!(queue.get(Tsn(12)).unwrap().state, ChunkState::NrAcked);
    }

    #[test]
    fn revocation_restores_flight_and_compensates_cwnd() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 2);
        let flight_before = queue.total_flight();
        let cwnd_before = paths[0].cwnd;

        // TSN 11 acked via gap block [10 + 1, 10 + 1].
        apply(&mut queue, &mut paths, Tsn(10), &[(1, 1)]);
        assert_eq!(queue.get(Tsn(11)).unwrap().state, ChunkState::Acked);
        assert_eq!(queue.total_flight(), flight_before - SIZE);

        // Same cumulative ack, no gap blocks: the ack is revoked.
        let info = apply(&mut queue, &mut paths, Tsn(10), &[]);
        assert!(info.revoked_paths.contains(&PathId(0)));
        assert_eq!(queue.get(Tsn(11)).unwrap().state, ChunkState::Sent);
        assert!(queue.get(Tsn(11)).unwrap().was_revoked);
        // Net effect on the flight: back to where it was before the ack.
        assert_eq!(queue.total_flight(), flight_before);
        assert_eq!(paths[0].flight_size, flight_before);
        assert_eq!(paths[0].cwnd, cwnd_before + SIZE);

        // Re-acking it removes the compensation again.
        apply(&mut queue, &mut paths, Tsn(10), &[(1, 1)]);
        assert_eq!(queue.get(Tsn(11)).unwrap().state, ChunkState::Acked);
        assert_eq!(paths[0].cwnd, cwnd_before);
    }

    #[test]
    fn nracked_chunks_are_never_revoked() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 2);

        for path in paths.iter_mut() {
            path.prepare_for_sack(Tsn(10));
        }
        queue.apply_sack(now(), Tsn(10), &[], &[GapAckBlock::new(1, 1)], &mut paths, 3, true);
        assert_eq!(queue.get(Tsn(11)).unwrap().state, ChunkState::NrAcked);

        let info = apply(&mut queue, &mut paths, Tsn(10), &[]);
        assert!(info.revoked_paths.is_empty());
        assert_eq!(queue.get(Tsn(11)).unwrap().state, ChunkState::NrAcked);
    }

    #[test]
    fn three_strikes_mark_for_resend() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 5);

        // TSN 10 is missing; each SACK acks a later TSN for the first time.
        apply(&mut queue, &mut paths, Tsn(9), &[(2, 2)]);
        assert_eq!(queue.get(Tsn(10)).unwrap().strikes, 1);
        apply(&mut queue, &mut paths, Tsn(9), &[(2, 3)]);
        assert_eq!(queue.get(Tsn(10)).unwrap().strikes, 2);
        let info = apply(&mut queue, &mut paths, Tsn(9), &[(2, 4)]);
        assert_eq!(queue.get(Tsn(10)).unwrap().state, ChunkState::MarkedForResend);
        assert!(info.loss_paths.contains(&PathId(0)));
        // No longer in flight, and the flight only carries TSN 14.
        assert_eq!(queue.total_flight(), SIZE);

        let resend = queue.take_chunks_to_resend(now(), &mut paths);
        assert_eq!(resend, vec![(Tsn(10), PathId(0))]);
        assert_eq!(queue.get(Tsn(10)).unwrap().state, ChunkState::Resent);
        assert_eq!(queue.get(Tsn(10)).unwrap().send_count, 2);
        assert_eq!(queue.total_flight(), 2 * SIZE);
        assert!(queue.is_consistent(&paths));
    }

    #[test]
    fn chunks_above_highest_newly_acked_are_not_struck() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 4);

        // TSN 12 newly acked: 10 and 11 are strikable, 13 is beyond (HTNA).
        apply(&mut queue, &mut paths, Tsn(9), &[(3, 3)]);
        assert_eq!(queue.get(Tsn(10)).unwrap().strikes, 1);
        assert_eq!(queue.get(Tsn(11)).unwrap().strikes, 1);
        assert_eq!(queue.get(Tsn(13)).unwrap().strikes, 0);
    }

    #[test]
    fn paths_without_new_acks_are_not_struck() {
        let mut paths = make_paths(2);
        let mut queue = SentQueue::new(INITIAL_TSN);
        // TSN 10 on path 1, TSNs 11-12 on path 0.
        let tsn = queue.enqueue(StreamKey::Ordered(StreamId(1)), Ssn(0), SIZE, PrPolicy::Reliable);
        queue.mark_sent(tsn, now(), PathId(1), &mut paths);
        send_chunks(&mut queue, &mut paths, 2);

        // A SACK acking only path-0 data must not strike the chunk on path 1 (SFR).
        apply(&mut queue, &mut paths, Tsn(9), &[(2, 3)]);
        assert_eq!(queue.get(Tsn(10)).unwrap().strikes, 0);
    }

    #[test]
    fn marked_resend_reassigns_to_alternate_path() {
        let mut paths = make_paths(2);
        paths[1].ssthresh = 100_000;
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 5);
        // Let path 1 look healthier than path 0.
        paths[0].ssthresh = 50_000;

        apply(&mut queue, &mut paths, Tsn(9), &[(2, 2)]);
        apply(&mut queue, &mut paths, Tsn(9), &[(2, 3)]);
        apply(&mut queue, &mut paths, Tsn(9), &[(2, 4)]);
        let chunk = queue.get(Tsn(10)).unwrap();
        assert_eq!(chunk.state, ChunkState::MarkedForResend);
        assert_eq!(chunk.path, PathId(1));
    }

    #[test]
    fn ttl_expired_chunks_are_abandoned_not_struck() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        let tsn = queue.enqueue(
            StreamKey::Ordered(StreamId(1)),
            Ssn(0),
            SIZE,
            PrPolicy::Ttl(AssocTime::zero()),
        );
        queue.mark_sent(tsn, now(), PathId(0), &mut paths);
        send_chunks(&mut queue, &mut paths, 2);

        apply(&mut queue, &mut paths, Tsn(9), &[(2, 2)]);
        assert_eq!(queue.get(Tsn(10)).unwrap().state, ChunkState::ForwardSkip);
        assert_eq!(queue.total_flight(), SIZE);
    }

    #[test]
    fn advance_peer_ack_point_over_abandoned() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 3);
        queue.abandon(Tsn(10), &mut paths);
        queue.abandon(Tsn(11), &mut paths);

        assert!(queue.advance_peer_ack_point(now(), true, &mut paths));
        let fwd = queue.create_forward_tsn();
        assert_eq!(fwd.new_cumulative_tsn, Tsn(11));
        assert_eq!(
            fwd.skipped_streams,
            vec![SkippedStream { stream_id: StreamId(1), ssn: Ssn(0) }]
        );
    }

    #[test]
    fn advance_stops_at_live_chunk() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 3);
        queue.abandon(Tsn(11), &mut paths);

        // TSN 10 is alive, so nothing can be skipped yet.
        assert!(!queue.advance_peer_ack_point(now(), true, &mut paths));
    }

    #[test]
    fn advance_crosses_nracked_chunks() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 3);
        queue.abandon(Tsn(10), &mut paths);
        for path in paths.iter_mut() {
            path.prepare_for_sack(Tsn(9));
        }
        queue.apply_sack(now(), Tsn(9), &[], &[GapAckBlock::new(2, 2)], &mut paths, 3, true);

        assert!(queue.advance_peer_ack_point(now(), true, &mut paths));
        assert_eq!(queue.create_forward_tsn().new_cumulative_tsn, Tsn(11));
    }

    #[test]
    fn advance_disabled_without_partial_reliability() {
        let mut paths = make_paths(1);
        let mut queue = SentQueue::new(INITIAL_TSN);
        send_chunks(&mut queue, &mut paths, 1);
        queue.abandon(Tsn(10), &mut paths);

        assert!(!queue.advance_peer_ack_point(now(), false, &mut paths));
    }
}
