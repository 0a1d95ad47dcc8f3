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

use crate::api::StreamId;
use crate::packet::data::Data;
use crate::packet::error_causes::ErrorCause;
use crate::rx::stream_reorder::StreamReorderSet;
use crate::rx::tsn_map::TsnMap;
use crate::rx::MessageIdentity;
use crate::rx::ReadableQueue;
use crate::types::Ssn;
use crate::types::Tsn;
use std::collections::BTreeMap;

/// The association-wide reassembly queue: fragments of the messages currently in flight, ordered
/// by TSN.
///
/// At most one message at a time is being handed to the application from here; when that happens
/// before all of its fragments have arrived (the message is large, or the rest is still in the
/// network), a partial delivery is open and this queue remembers which message it belongs to.
#[derive(Debug)]
pub struct ReassemblyQueue {
    fragments: BTreeMap<Tsn, Data>,
    queued_bytes: usize,
    /// The TSN of the last fragment consumed off this queue (not advanced by express-delivered
    /// complete messages, which never enter the queue).
    tsn_last_delivered: Tsn,
    pd: Option<MessageIdentity>,
    partial_delivery_point: usize,
}

/// What [`ReassemblyQueue::insert`] did with the fragment.
#[derive(Debug, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// Exact TSN already queued; the new copy was discarded.
    Duplicate,
}

/// The effect of purging the queue up to a FORWARD-TSN's cumulative point.
#[derive(Debug, Default)]
pub struct PurgeOutcome {
    pub removed: usize,
    /// An open partial delivery straddled the purge point; the application must be told that the
    /// message for this (stream, SSN) will never complete.
    pub pd_aborted: Option<(StreamId, Ssn)>,
}

impl ReassemblyQueue {
    pub fn new(peer_initial_tsn: Tsn, partial_delivery_point: usize) -> Self {
        Self {
            fragments: BTreeMap::new(),
            queued_bytes: 0,
            tsn_last_delivered: peer_initial_tsn - 1,
            pd: None,
            partial_delivery_point,
        }
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn pd_in_progress(&self) -> bool {
        self.pd.is_some()
    }

    pub fn pd_identity(&self) -> Option<MessageIdentity> {
        self.pd
    }

    pub fn tsn_last_delivered(&self) -> Tsn {
        self.tsn_last_delivered
    }

    /// Whether `tsn` falls inside the TSN range currently spanned by queued fragments. A complete
    /// message with such a TSN is a peer error (its TSN sits in the middle of a fragmented
    /// message).
    pub fn spans(&self, tsn: Tsn) -> bool {
        match (self.fragments.first_key_value(), self.fragments.last_key_value()) {
            (Some((first, _)), Some((last, _))) => tsn >= *first && tsn <= *last,
            _ => false,
        }
    }

    /// Whether `tsn`/`data` is the immediate continuation of the open partial-delivery message
    /// and can be appended without queueing.
    pub fn can_append_partial(&self, tsn: Tsn, data: &Data) -> bool {
        let Some(pd) = &self.pd else {
            return false;
        };
        // Another first fragment can never continue a message.
        !data.is_beginning
            && tsn == self.tsn_last_delivered + 1
            && pd.stream_id == data.stream_key.id()
            && pd.unordered == data.stream_key.is_unordered()
            && (pd.unordered || pd.ssn == data.ssn)
    }

    /// Appends the fragment to the open partial-delivery message (callers must have checked
    /// [`Self::can_append_partial`]). Closes the partial delivery when this was the last
    /// fragment.
    pub fn append_partial(
        &mut self,
        tsn: Tsn,
        data: Data,
        streams: &mut StreamReorderSet,
        tsn_map: &mut TsnMap,
        readables: &mut ReadableQueue,
    ) {
        let identity = self.pd.expect("partial delivery must be open");
        let is_end = data.is_end;
        tsn_map.promote(tsn);
        readables.append_partial(identity, tsn, data.payload, is_end);
        self.tsn_last_delivered = tsn;
        if is_end {
            log::debug!("partial delivery of stream {} ssn {} complete", identity.stream_id, identity.ssn);
            self.pd = None;
            if !identity.unordered {
                streams.note_delivered(identity.stream_id);
            }
        }
    }

    /// Inserts a fragment in TSN order, auditing the fragment flags against its TSN-adjacent
    /// neighbors. A fragment that cannot belong to any well-formed message sequence is a protocol
    /// violation and returns the abort cause.
    pub fn insert(&mut self, tsn: Tsn, data: Data) -> Result<InsertOutcome, ErrorCause> {
        if self.fragments.is_empty() && tsn == self.tsn_last_delivered + 1 {
            // This fragment directly follows everything consumed so far, so its flags are fully
            // determined by the delivery state.
            if self.pd.is_none() && !data.is_beginning {
                return Err(ErrorCause::protocol_violation(
                    "fragment following delivered data is not a first fragment",
                ));
            }
            if let Some(pd) = &self.pd {
                if data.is_beginning {
                    return Err(ErrorCause::protocol_violation(
                        "first fragment where a partial delivery continuation was expected",
                    ));
                }
                if pd.stream_id != data.stream_key.id() {
                    return Err(ErrorCause::protocol_violation(
                        "partial delivery continuation on wrong stream",
                    ));
                }
                if !pd.unordered && pd.ssn != data.ssn {
                    return Err(ErrorCause::protocol_violation(
                        "partial delivery continuation with wrong SSN",
                    ));
                }
            }
        }

        if self.fragments.contains_key(&tsn) {
            return Ok(InsertOutcome::Duplicate);
        }

        if let Some((prev_tsn, prev)) = self.fragments.range(..tsn).next_back() {
            if *prev_tsn == tsn - 1 {
                if !prev.is_end {
                    // The predecessor continues into this fragment: same message.
                    if data.is_beginning {
                        return Err(ErrorCause::protocol_violation(
                            "first fragment adjacent after a non-last fragment",
                        ));
                    }
                    if prev.stream_key != data.stream_key
                        || (data.stream_key.is_ordered() && prev.ssn != data.ssn)
                    {
                        return Err(ErrorCause::protocol_violation(
                            "adjacent fragments of one message disagree on stream or SSN",
                        ));
                    }
                } else if !data.is_beginning {
                    return Err(ErrorCause::protocol_violation(
                        "non-first fragment adjacent after a last fragment",
                    ));
                }
            }
        }

        if let Some((next_tsn, next)) = self.fragments.range(tsn..).next() {
            if *next_tsn == tsn + 1 {
                if next.is_beginning {
                    if !data.is_end {
                        return Err(ErrorCause::protocol_violation(
                            "non-last fragment adjacent before a first fragment",
                        ));
                    }
                } else {
                    // The successor continues this fragment: same message.
                    if data.is_end {
                        return Err(ErrorCause::protocol_violation(
                            "last fragment adjacent before a continuation fragment",
                        ));
                    }
                    if next.stream_key != data.stream_key
                        || (data.stream_key.is_ordered() && next.ssn != data.ssn)
                    {
                        return Err(ErrorCause::protocol_violation(
                            "adjacent fragments of one message disagree on stream or SSN",
                        ));
                    }
                }
            }
        }

        self.queued_bytes += data.payload.len();
        self.fragments.insert(tsn, data);
        Ok(InsertOutcome::Inserted)
    }

    /// Checks whether the head of the queue can be (or continue being) delivered, and drains as
    /// much as possible. Opens a partial delivery when the head message is next in order for its
    /// stream and is either complete on the queue or has accumulated enough contiguous bytes.
    /// Loops so that a finished message is immediately followed by a delivery attempt for the
    /// next one.
    pub fn deliver_check(
        &mut self,
        streams: &mut StreamReorderSet,
        tsn_map: &mut TsnMap,
        readables: &mut ReadableQueue,
    ) {
        loop {
            if self.pd.is_none() {
                let Some((first_tsn, head)) = self.fragments.first_key_value() else {
                    return;
                };
                if !head.is_beginning {
                    return;
                }
                if head.stream_key.is_ordered()
                    && streams.next_to_deliver(head.stream_key.id()) != head.ssn
                {
                    return;
                }
                let (complete, size) = self.head_message_status();
                if !complete && size < self.partial_delivery_point {
                    return;
                }
                let identity = MessageIdentity {
                    stream_id: head.stream_key.id(),
                    ssn: head.ssn,
                    ppid: head.ppid,
                    unordered: head.stream_key.is_unordered(),
                };
                log::debug!(
                    "opening {} delivery of stream {} ssn {} at tsn {}",
                    if complete { "full" } else { "partial" },
                    identity.stream_id,
                    identity.ssn,
                    first_tsn
                );
                self.tsn_last_delivered = *first_tsn - 1;
                self.pd = Some(identity);
            }

            if !self.service(streams, tsn_map, readables) {
                // Waiting for more fragments of the open message.
                return;
            }
        }
    }

    /// Drains contiguous fragments of the open message into the readable queue. Returns true
    /// when the message finished (and the partial delivery closed).
    fn service(
        &mut self,
        streams: &mut StreamReorderSet,
        tsn_map: &mut TsnMap,
        readables: &mut ReadableQueue,
    ) -> bool {
        loop {
            let next_tsn = self.tsn_last_delivered + 1;
            let Some(data) = self.fragments.remove(&next_tsn) else {
                return false;
            };
            self.queued_bytes -= data.payload.len();
            self.append_partial(next_tsn, data, streams, tsn_map, readables);
            if self.pd.is_none() {
                return true;
            }
        }
    }

    /// Size of the contiguous prefix of the head message, and whether the full message is
    /// present.
    fn head_message_status(&self) -> (bool, usize) {
        let mut size = 0;
        let mut expected = match self.fragments.first_key_value() {
            Some((tsn, _)) => *tsn,
            None => return (false, 0),
        };
        for (tsn, data) in &self.fragments {
            if *tsn != expected {
                break;
            }
            size += data.payload.len();
            if data.is_end {
                return (true, size);
            }
            expected = *tsn + 1;
        }
        (false, size)
    }

    /// FORWARD-TSN: drops every fragment at or below `new_cumulative`, closing (and reporting) an
    /// open partial delivery that the purge point cuts through. Ordered streams whose fragments
    /// are skipped get their delivered sequence advanced directly on `streams`.
    pub fn purge_to(
        &mut self,
        new_cumulative: Tsn,
        streams: &mut StreamReorderSet,
    ) -> PurgeOutcome {
        let mut outcome = PurgeOutcome::default();
        let old_last_delivered = self.tsn_last_delivered;

        while let Some(entry) = self.fragments.first_entry() {
            let tsn = *entry.key();
            if tsn > new_cumulative {
                break;
            }
            let data = entry.remove();
            self.queued_bytes -= data.payload.len();
            outcome.removed += 1;
            if tsn > self.tsn_last_delivered {
                self.tsn_last_delivered = tsn;
            }
            // The peer is skipping this ordered message; don't wait for its SSN anymore.
            if data.stream_key.is_ordered() {
                streams.force_delivered(data.stream_key.id(), data.ssn);
            }
        }

        if let Some(pd) = self.pd {
            if new_cumulative > old_last_delivered {
                // The purge point cut into (or skipped over) the open message.
                log::debug!(
                    "partial delivery of stream {} ssn {} aborted by forward-tsn",
                    pd.stream_id,
                    pd.ssn
                );
                if new_cumulative > self.tsn_last_delivered {
                    self.tsn_last_delivered = new_cumulative;
                }
                outcome.pd_aborted = Some((pd.stream_id, pd.ssn));
                if !pd.unordered {
                    streams.force_delivered(pd.stream_id, pd.ssn);
                }
                self.pd = None;
            }
        }

        outcome
    }
}
