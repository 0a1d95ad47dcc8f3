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

use crate::packet::sack_chunk::GapAckBlock;
use crate::types::Tsn;
use thiserror::Error;

/// Whether a marked TSN may still be un-acked by a later SACK from this side.
///
/// Data that has merely been queued (reassembly, reordering) is revocable: if this side ever had
/// to renege, the peer would learn about it through a SACK that no longer covers the TSN. Data
/// handed to the application can never be taken back and is tracked non-revocably.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarkKind {
    Revocable,
    NonRevocable,
}

#[derive(Debug, Error, PartialEq)]
#[error("TSN is beyond the tracking map span")]
pub struct OutOfWindow;

/// Tracks which TSNs have been received, as two bitmaps relative to a sliding base.
///
/// Both bitmaps are indexed by `tsn - base_tsn`, with `base_tsn` pinned at one past the
/// cumulative ack point. A bit set in either map means the TSN was received; which map it's in
/// records whether the acknowledgement could still be revoked. [`TsnMap::slide`] advances the
/// cumulative ack point over the contiguously received prefix a byte (8 TSNs) at a time, so
/// ack-point advancement costs O(window/8) rather than O(window) per inspection.
#[derive(Debug)]
pub struct TsnMap {
    base_tsn: Tsn,
    cumulative_ack: Tsn,
    highest_tsn: Tsn,
    nr_highest_tsn: Tsn,
    map: Vec<u8>,
    nr_map: Vec<u8>,
    span: u32,
}

#[inline]
fn get_bit(map: &[u8], offset: u32) -> bool {
    map[(offset / 8) as usize] & (1 << (offset % 8)) != 0
}

#[inline]
fn set_bit(map: &mut [u8], offset: u32) {
    map[(offset / 8) as usize] |= 1 << (offset % 8);
}

#[inline]
fn clear_bit(map: &mut [u8], offset: u32) {
    map[(offset / 8) as usize] &= !(1 << (offset % 8));
}

/// Shifts the bit array down so that the bit previously at `nbits` lands at offset zero.
fn shift_down(map: &mut [u8], nbits: u32) {
    let nbytes = (nbits / 8) as usize;
    let rem = nbits % 8;
    let len = map.len();
    map.copy_within(nbytes.., 0);
    map[len - nbytes..].fill(0);
    if rem > 0 {
        for i in 0..len {
            let next = if i + 1 < len { map[i + 1] } else { 0 };
            map[i] = (map[i] >> rem) | (next << (8 - rem));
        }
    }
}

impl TsnMap {
    /// Creates a map expecting `peer_initial_tsn` as the first TSN, spanning `span` TSNs (rounded
    /// up to a multiple of 8).
    pub fn new(peer_initial_tsn: Tsn, span: u32) -> TsnMap {
        let span = span.max(8).next_multiple_of(8);
        let cumulative_ack = peer_initial_tsn - 1;
        TsnMap {
            base_tsn: peer_initial_tsn,
            cumulative_ack,
            highest_tsn: cumulative_ack,
            nr_highest_tsn: cumulative_ack,
            map: vec![0; (span / 8) as usize],
            nr_map: vec![0; (span / 8) as usize],
            span,
        }
    }

    pub fn cumulative_ack(&self) -> Tsn {
        self.cumulative_ack
    }

    pub fn base_tsn(&self) -> Tsn {
        self.base_tsn
    }

    pub fn span(&self) -> u32 {
        self.span
    }

    /// The highest TSN marked in either map (or the cumulative ack point if none).
    pub fn highest_seen(&self) -> Tsn {
        self.highest_tsn.max(self.nr_highest_tsn)
    }

    /// Whether any received TSN lies beyond the cumulative ack point.
    pub fn has_gap(&self) -> bool {
        self.highest_seen() > self.cumulative_ack
    }

    fn offset_of(&self, tsn: Tsn) -> Result<u32, OutOfWindow> {
        debug_assert!(tsn > self.cumulative_ack);
        let offset = tsn.distance_to(self.base_tsn);
        if offset >= self.span {
            return Err(OutOfWindow);
        }
        Ok(offset)
    }

    /// Whether `tsn` is known received (at or below the cumulative ack, or marked in either map).
    /// TSNs beyond the span report as not received.
    pub fn is_marked(&self, tsn: Tsn) -> bool {
        if tsn <= self.cumulative_ack {
            return true;
        }
        match self.offset_of(tsn) {
            Ok(offset) => get_bit(&self.map, offset) || get_bit(&self.nr_map, offset),
            Err(OutOfWindow) => false,
        }
    }

    /// Whether `tsn` would land inside the map. Used by admission to distinguish "no resource to
    /// hold it" from valid data.
    pub fn is_in_window(&self, tsn: Tsn) -> bool {
        tsn <= self.cumulative_ack || self.offset_of(tsn).is_ok()
    }

    /// Marks `tsn` as received. Fails with [`OutOfWindow`] when the TSN is further ahead than the
    /// map spans; the caller drops such data silently.
    pub fn mark(&mut self, tsn: Tsn, kind: MarkKind) -> Result<(), OutOfWindow> {
        if tsn <= self.cumulative_ack {
            return Ok(());
        }
        let offset = self.offset_of(tsn)?;
        match kind {
            MarkKind::Revocable => {
                set_bit(&mut self.map, offset);
                if tsn > self.highest_tsn {
                    self.highest_tsn = tsn;
                }
            }
            MarkKind::NonRevocable => {
                set_bit(&mut self.nr_map, offset);
                if tsn > self.nr_highest_tsn {
                    self.nr_highest_tsn = tsn;
                }
            }
        }
        Ok(())
    }

    /// Promotes an already received TSN from the revocable to the non-revocable map, once its
    /// data has been handed to the application.
    pub fn promote(&mut self, tsn: Tsn) {
        if tsn <= self.cumulative_ack {
            return;
        }
        if let Ok(offset) = self.offset_of(tsn) {
            if get_bit(&self.map, offset) {
                clear_bit(&mut self.map, offset);
                set_bit(&mut self.nr_map, offset);
                if tsn > self.nr_highest_tsn {
                    self.nr_highest_tsn = tsn;
                }
            }
        }
    }

    /// Advances the cumulative ack point over the contiguously received prefix and re-bases both
    /// maps to `cumulative_ack + 1`. Returns whether the point moved. Calling it again without
    /// new marks is a no-op.
    pub fn slide(&mut self) -> bool {
        let mut contiguous: u32 = 0;
        for i in 0..self.map.len() {
            let b = self.map[i] | self.nr_map[i];
            if b == 0xff {
                contiguous += 8;
            } else {
                contiguous += b.trailing_ones();
                break;
            }
        }
        if contiguous == 0 {
            return false;
        }

        let old_cumulative = self.cumulative_ack;
        let new_cumulative = self.base_tsn + (contiguous - 1);
        self.cumulative_ack = new_cumulative;
        if new_cumulative >= self.highest_seen() {
            // The whole live window was consumed; reset instead of shifting.
            self.map.fill(0);
            self.nr_map.fill(0);
            self.highest_tsn = new_cumulative;
            self.nr_highest_tsn = new_cumulative;
        } else {
            shift_down(&mut self.map, contiguous);
            shift_down(&mut self.nr_map, contiguous);
        }
        self.base_tsn = new_cumulative + 1;
        log::debug!("map slide: cum_ack={} ({})", self.cumulative_ack, old_cumulative);
        debug_assert!(self.base_tsn == self.cumulative_ack + 1);
        true
    }

    /// Forces the cumulative ack point to `new_cumulative` (FORWARD-TSN). Skipped TSNs are marked
    /// non-revocable and a normal slide follows, which may advance further through already
    /// received data. A jump beyond the span resets the maps entirely. Returns false when
    /// `new_cumulative` is stale.
    pub fn advance_cumulative(&mut self, new_cumulative: Tsn) -> bool {
        if new_cumulative <= self.cumulative_ack {
            return false;
        }
        let gap = new_cumulative.distance_to(self.base_tsn);
        if gap >= self.span || new_cumulative >= self.highest_seen() {
            self.map.fill(0);
            self.nr_map.fill(0);
            self.cumulative_ack = new_cumulative;
            self.base_tsn = new_cumulative + 1;
            self.highest_tsn = new_cumulative;
            self.nr_highest_tsn = new_cumulative;
        } else {
            for offset in 0..=gap {
                set_bit(&mut self.nr_map, offset);
            }
            if new_cumulative > self.nr_highest_tsn {
                self.nr_highest_tsn = new_cumulative;
            }
            self.slide();
        }
        debug_assert!(self.base_tsn == self.cumulative_ack + 1);
        true
    }

    /// Summarizes the received TSNs beyond the cumulative ack point as gap-ack-blocks with
    /// offsets relative to the cumulative ack, for the next outgoing SACK.
    pub fn gap_ack_blocks(&self, max_blocks: usize) -> Vec<GapAckBlock> {
        let mut blocks: Vec<GapAckBlock> = Vec::new();
        if !self.has_gap() {
            return blocks;
        }
        let live = self.highest_seen().distance_to(self.base_tsn);
        let mut run_start: Option<u32> = None;
        for offset in 0..=live {
            let marked = get_bit(&self.map, offset) || get_bit(&self.nr_map, offset);
            match (marked, run_start) {
                (true, None) => run_start = Some(offset),
                (false, Some(start)) => {
                    blocks.push(GapAckBlock::new((start + 1) as u16, offset as u16));
                    run_start = None;
                    if blocks.len() == max_blocks {
                        return blocks;
                    }
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            blocks.push(GapAckBlock::new((start + 1) as u16, (live + 1) as u16));
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIAL_TSN: Tsn = Tsn(11);
    const SPAN: u32 = 256;

    fn mark_all(map: &mut TsnMap, tsns: &[u32]) {
        for tsn in tsns {
            map.mark(Tsn(*tsn), MarkKind::Revocable).unwrap();
        }
        map.slide();
    }

    #[test]
    fn empty_map() {
        let map = TsnMap::new(INITIAL_TSN, SPAN);
        assert_eq!(map.cumulative_ack(), Tsn(10));
        assert_eq!(map.base_tsn(), Tsn(11));
        assert!(!map.has_gap());
        assert!(map.gap_ack_blocks(20).is_empty());
    }

    #[test]
    fn in_order_marks_advance_cumulative_ack() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[11, 12, 13]);
        assert_eq!(map.cumulative_ack(), Tsn(13));
        assert_eq!(map.base_tsn(), Tsn(14));
        assert!(!map.has_gap());
    }

    #[test]
    fn out_of_order_marks_fill_gap() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[12, 13, 14]);
        assert_eq!(map.cumulative_ack(), Tsn(10));
        assert!(map.has_gap());
        assert!(map.is_marked(Tsn(13)));
        assert!(!map.is_marked(Tsn(11)));

        mark_all(&mut map, &[11]);
        assert_eq!(map.cumulative_ack(), Tsn(14));
        assert!(!map.has_gap());
    }

    #[test]
    fn slide_is_idempotent() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[11, 12, 14]);
        assert_eq!(map.cumulative_ack(), Tsn(12));
        let base = map.base_tsn();

        assert!(!map.slide());
        assert_eq!(map.cumulative_ack(), Tsn(12));
        assert_eq!(map.base_tsn(), base);
    }

    #[test]
    fn slide_crosses_byte_boundaries() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        // 30 contiguous TSNs, then a gap, then one more.
        let tsns: Vec<u32> = (11..41).chain([42]).collect();
        mark_all(&mut map, &tsns);
        assert_eq!(map.cumulative_ack(), Tsn(40));
        assert_eq!(map.base_tsn(), Tsn(41));
        assert!(map.is_marked(Tsn(42)));
        assert!(!map.is_marked(Tsn(41)));

        mark_all(&mut map, &[41]);
        assert_eq!(map.cumulative_ack(), Tsn(42));
        assert!(!map.has_gap());
    }

    #[test]
    fn marks_beyond_span_are_rejected() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        assert_eq!(map.mark(Tsn(11 + SPAN), MarkKind::Revocable), Err(OutOfWindow));
        assert!(map.mark(Tsn(11 + SPAN - 1), MarkKind::Revocable).is_ok());
    }

    #[test]
    fn example_from_rfc9260_section334() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[11, 12, 14, 15, 17]);
        assert_eq!(map.cumulative_ack(), Tsn(12));
        assert_eq!(
            map.gap_ack_blocks(20),
            vec![GapAckBlock::new(2, 3), GapAckBlock::new(5, 5)]
        );
    }

    #[test]
    fn promote_moves_bit_between_maps() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[12]);
        map.promote(Tsn(12));
        assert!(map.is_marked(Tsn(12)));
        // The combined view (SACK generation) is unaffected by promotion.
        assert_eq!(map.gap_ack_blocks(20), vec![GapAckBlock::new(2, 2)]);

        mark_all(&mut map, &[11]);
        assert_eq!(map.cumulative_ack(), Tsn(12));
    }

    #[test]
    fn advance_cumulative_within_window() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[11, 12, 15]);
        assert!(map.advance_cumulative(Tsn(13)));
        assert_eq!(map.cumulative_ack(), Tsn(13));
        assert_eq!(map.gap_ack_blocks(20), vec![GapAckBlock::new(2, 2)]);
    }

    #[test]
    fn advance_cumulative_merges_with_existing_marks() {
        // Example from RFC 3758: received 102, 104, 105, 107; FORWARD-TSN to 103 must land on 105.
        let mut map = TsnMap::new(Tsn(102), SPAN);
        mark_all(&mut map, &[102, 104, 105, 107]);
        assert!(map.advance_cumulative(Tsn(103)));
        assert_eq!(map.cumulative_ack(), Tsn(105));
        assert_eq!(map.gap_ack_blocks(20), vec![GapAckBlock::new(2, 2)]);
    }

    #[test]
    fn advance_cumulative_beyond_window_resets() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[11, 13]);
        assert!(map.advance_cumulative(Tsn(11 + 10 * SPAN)));
        assert_eq!(map.cumulative_ack(), Tsn(11 + 10 * SPAN));
        assert_eq!(map.base_tsn(), Tsn(11 + 10 * SPAN) + 1);
        assert!(!map.has_gap());
    }

    #[test]
    fn advance_cumulative_stale_is_rejected() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        mark_all(&mut map, &[11, 12]);
        assert!(!map.advance_cumulative(Tsn(11)));
        assert_eq!(map.cumulative_ack(), Tsn(12));
    }

    #[test]
    fn survives_tsn_wraparound() {
        let initial = Tsn(u32::MAX - 2);
        let mut map = TsnMap::new(initial, SPAN);
        map.mark(initial, MarkKind::Revocable).unwrap();
        map.mark(initial + 1, MarkKind::Revocable).unwrap();
        map.mark(initial + 2, MarkKind::Revocable).unwrap();
        map.mark(initial + 3, MarkKind::Revocable).unwrap();
        map.slide();
        assert_eq!(map.cumulative_ack(), Tsn(0));
        assert_eq!(map.base_tsn(), Tsn(1));
    }

    #[test]
    fn gap_blocks_are_capped() {
        let mut map = TsnMap::new(INITIAL_TSN, SPAN);
        // Every second TSN, creating many one-TSN runs.
        let tsns: Vec<u32> = (0..30).map(|i| 12 + i * 2).collect();
        mark_all(&mut map, &tsns);
        assert_eq!(map.gap_ack_blocks(5).len(), 5);
    }
}
