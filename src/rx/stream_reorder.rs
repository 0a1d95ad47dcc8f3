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

use crate::api::ReadableMessage;
use crate::api::StreamId;
use crate::packet::error_causes::ErrorCause;
use crate::rx::tsn_map::TsnMap;
use crate::rx::ReadableQueue;
use crate::types::Ssn;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// One inbound ordered stream: messages held until their SSN continues the delivered sequence.
///
/// Only complete messages live here; fragmented messages are assembled on the reassembly queue
/// and delivered from there once their SSN is next (so they never wait here). Unordered messages
/// bypass reordering entirely.
#[derive(Debug, Default)]
struct StreamReorderQueue {
    last_delivered: Option<Ssn>,
    queue: BTreeMap<Ssn, ReadableMessage>,
}

impl StreamReorderQueue {
    fn next_to_deliver(&self) -> Ssn {
        match self.last_delivered {
            Some(ssn) => ssn + 1,
            None => Ssn(0),
        }
    }
}

/// All inbound ordered streams of one association.
#[derive(Debug, Default)]
pub struct StreamReorderSet {
    streams: HashMap<StreamId, StreamReorderQueue>,
    queued_bytes: usize,
    queued_count: usize,
}

impl StreamReorderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn queued_count(&self) -> usize {
        self.queued_count
    }

    fn get_or_create(&mut self, stream_id: StreamId) -> &mut StreamReorderQueue {
        self.streams.entry(stream_id).or_default()
    }

    /// The SSN that would be delivered next on `stream_id`.
    pub fn next_to_deliver(&self, stream_id: StreamId) -> Ssn {
        self.streams.get(&stream_id).map(|s| s.next_to_deliver()).unwrap_or(Ssn(0))
    }

    /// The last SSN delivered on `stream_id`, if any message has been delivered yet.
    pub fn last_delivered(&self, stream_id: StreamId) -> Option<Ssn> {
        self.streams.get(&stream_id).and_then(|s| s.last_delivered)
    }

    /// Whether `stream_id` has no queued messages (a precondition for express delivery).
    pub fn is_empty(&self, stream_id: StreamId) -> bool {
        self.streams.get(&stream_id).map(|s| s.queue.is_empty()).unwrap_or(true)
    }

    /// Whether `ssn` is at or behind what has already been delivered on `stream_id`. Receiving a
    /// first fragment for such an SSN is a protocol violation (admission aborts).
    pub fn is_behind_delivered(&self, stream_id: StreamId, ssn: Ssn) -> bool {
        match self.last_delivered(stream_id) {
            Some(last) => ssn <= last,
            None => false,
        }
    }

    /// Records that a message with the next SSN was delivered around this queue (express path or
    /// reassembly delivery).
    pub fn note_delivered(&mut self, stream_id: StreamId) {
        let stream = self.get_or_create(stream_id);
        stream.last_delivered = Some(stream.next_to_deliver());
    }

    /// Jumps the delivered sequence forward to `ssn` (FORWARD-TSN skipped over that message).
    /// Never moves backwards.
    pub fn force_delivered(&mut self, stream_id: StreamId, ssn: Ssn) {
        let stream = self.get_or_create(stream_id);
        if stream.last_delivered.is_none_or(|last| ssn > last) {
            stream.last_delivered = Some(ssn);
        }
    }

    /// Delivers `message` in SSN order: immediately if it continues the sequence (draining any
    /// messages it unblocks), otherwise queued sorted by SSN.
    ///
    /// A message at or behind the delivered sequence, or a queued duplicate SSN with differing
    /// content, is a protocol violation and returns the abort cause. Returns the number of
    /// messages handed to the readable queue otherwise.
    pub fn deliver_in_order(
        &mut self,
        message: ReadableMessage,
        tsn_map: &mut TsnMap,
        readables: &mut ReadableQueue,
    ) -> Result<usize, ErrorCause> {
        let stream_id = message.stream_id;
        let stream = self.streams.entry(stream_id).or_default();

        if stream.last_delivered.is_some_and(|last| message.ssn <= last) {
            log::debug!(
                "stream {}: ssn {} at or behind delivered {}",
                stream_id,
                message.ssn,
                stream.last_delivered.unwrap()
            );
            return Err(ErrorCause::protocol_violation("SSN at or behind delivered sequence"));
        }

        if message.ssn == stream.next_to_deliver() {
            stream.last_delivered = Some(message.ssn);
            tsn_map.promote(message.last_tsn);
            readables.push(message);

            let mut delivered = 1;
            while let Some(entry) = stream.queue.first_entry() {
                let next_to_deliver = match stream.last_delivered {
                    Some(ssn) => ssn + 1,
                    None => Ssn(0),
                };
                if *entry.key() != next_to_deliver {
                    break;
                }
                let next = entry.remove();
                self.queued_bytes -= next.payload.len();
                self.queued_count -= 1;
                stream.last_delivered = Some(next.ssn);
                tsn_map.promote(next.last_tsn);
                readables.push(next);
                delivered += 1;
            }
            return Ok(delivered);
        }

        if let Some(existing) = stream.queue.get(&message.ssn) {
            if existing.payload == message.payload {
                // Plain duplicate of something already queued.
                return Ok(0);
            }
            log::debug!("stream {}: duplicate ssn {} with differing content", stream_id, message.ssn);
            return Err(ErrorCause::protocol_violation("duplicate SSN with differing content"));
        }

        self.queued_bytes += message.payload.len();
        self.queued_count += 1;
        stream.queue.insert(message.ssn, message);
        Ok(0)
    }

    /// FORWARD-TSN handling for one skipped (stream, ssn) pair: everything at or below the
    /// skipped SSN is released to the application (it is complete data the peer gave up waiting
    /// for acknowledgement on), `last_delivered` jumps forward, and newly unblocked in-order
    /// messages drain.
    pub fn handle_forward(
        &mut self,
        stream_id: StreamId,
        skipped_ssn: Ssn,
        tsn_map: &mut TsnMap,
        readables: &mut ReadableQueue,
    ) {
        let stream = self.streams.entry(stream_id).or_default();

        // Deliver anything at or before the skipped SSN.
        while let Some(entry) = stream.queue.first_entry() {
            if *entry.key() > skipped_ssn {
                break;
            }
            let message = entry.remove();
            self.queued_bytes -= message.payload.len();
            self.queued_count -= 1;
            tsn_map.promote(message.last_tsn);
            readables.push(message);
        }

        if stream.last_delivered.is_none_or(|last| skipped_ssn > last) {
            stream.last_delivered = Some(skipped_ssn);
        }

        // Now drain whatever became deliverable in order.
        while let Some(entry) = stream.queue.first_entry() {
            let next_to_deliver = match stream.last_delivered {
                Some(ssn) => ssn + 1,
                None => Ssn(0),
            };
            if *entry.key() != next_to_deliver {
                break;
            }
            let message = entry.remove();
            self.queued_bytes -= message.payload.len();
            self.queued_count -= 1;
            stream.last_delivered = Some(message.ssn);
            tsn_map.promote(message.last_tsn);
            readables.push(message);
        }
    }
}
