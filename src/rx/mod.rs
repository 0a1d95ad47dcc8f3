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

use crate::api::PpId;
use crate::api::ReadableMessage;
use crate::api::StreamId;
use crate::types::Ssn;
use crate::types::Tsn;
use std::collections::VecDeque;

pub mod data_admission;
pub mod reassembly_queue;
pub mod stream_reorder;
pub mod tsn_map;

/// Identity of the user message a partial delivery belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MessageIdentity {
    pub stream_id: StreamId,
    pub ssn: Ssn,
    pub ppid: PpId,
    pub unordered: bool,
}

/// The queue of messages ready (or partially ready) to hand to the application.
///
/// While a partial delivery is open its message grows in place as long as the application hasn't
/// consumed it yet; after consumption, further fragments become follow-up segments with the same
/// identity. Either way each payload byte is delivered exactly once.
#[derive(Debug, Default)]
pub struct ReadableQueue {
    messages: VecDeque<ReadableMessage>,
    queued_bytes: usize,
    delivered_count: usize,
}

impl ReadableQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ReadableMessage) {
        self.delivered_count += 1;
        self.queued_bytes += message.payload.len();
        self.messages.push_back(message);
    }

    /// Appends one fragment of the open partial-delivery message.
    pub fn append_partial(
        &mut self,
        identity: MessageIdentity,
        tsn: Tsn,
        payload: Vec<u8>,
        is_end: bool,
    ) {
        if let Some(last) = self.messages.back_mut() {
            if !last.complete
                && last.stream_id == identity.stream_id
                && last.ssn == identity.ssn
                && last.unordered == identity.unordered
            {
                self.queued_bytes += payload.len();
                last.payload.extend(payload);
                last.last_tsn = tsn;
                last.complete = is_end;
                return;
            }
        }
        self.push(ReadableMessage {
            stream_id: identity.stream_id,
            ssn: identity.ssn,
            ppid: identity.ppid,
            unordered: identity.unordered,
            payload,
            first_tsn: tsn,
            last_tsn: tsn,
            complete: is_end,
        });
    }

    /// Bytes queued but not yet consumed by the application. Counts against the advertised
    /// receiver window.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn drain(&mut self) -> Vec<ReadableMessage> {
        self.queued_bytes = 0;
        self.messages.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Number of messages (or partial-delivery segments) pushed over the queue's lifetime.
    pub fn delivered_count(&self) -> usize {
        self.delivered_count
    }
}
