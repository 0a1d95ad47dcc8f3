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

use crate::api::AdmitResult;
use crate::api::AssocEvent;
use crate::api::ErrorKind;
use crate::api::ForwardTsnResult;
use crate::api::Options;
use crate::api::ReadableMessage;
use crate::packet::data::Data;
use crate::packet::error_causes::ErrorCause;
use crate::packet::forward_tsn_chunk::ForwardTsnChunk;
use crate::packet::invalid_stream_identifier_error_cause::InvalidStreamIdentifierErrorCause;
use crate::packet::out_of_resource_error_cause::OutOfResourceErrorCause;
use crate::packet::sack_chunk::SackChunk;
use crate::rx::reassembly_queue::InsertOutcome;
use crate::rx::reassembly_queue::ReassemblyQueue;
use crate::rx::stream_reorder::StreamReorderSet;
use crate::rx::tsn_map::MarkKind;
use crate::rx::tsn_map::TsnMap;
use crate::rx::ReadableQueue;
use crate::types::Tsn;
use crate::EventSink;
use std::cell::RefCell;
use std::rc::Rc;

/// The maximum number of duplicate TSNs that will be reported in a SACK.
const MAX_DUPLICATE_TSN_REPORTED: usize = 20;

/// The maximum number of gap-ack-blocks that will be reported in a SACK.
const MAX_GAP_ACK_BLOCKS_REPORTED: usize = 20;

/// The receive half of the engine: admits inbound DATA chunks and dispatches them to express
/// delivery, partial-delivery continuation, reassembly or stream reordering; processes received
/// FORWARD-TSN chunks; and builds outgoing SACKs describing what has arrived.
pub struct RecvEngine {
    tsn_map: TsnMap,
    reassembly: ReassemblyQueue,
    streams: StreamReorderSet,
    readables: ReadableQueue,

    /// Duplicate TSNs to report in the next outgoing SACK.
    duplicates: Vec<Tsn>,

    max_receive_window: usize,
    max_chunks_on_queue: usize,
    inbound_streams: u16,

    events: Rc<RefCell<dyn EventSink>>,
}

impl RecvEngine {
    pub fn new(
        peer_initial_tsn: Tsn,
        options: &Options,
        events: Rc<RefCell<dyn EventSink>>,
    ) -> Self {
        Self {
            tsn_map: TsnMap::new(peer_initial_tsn, options.tsn_map_span),
            reassembly: ReassemblyQueue::new(peer_initial_tsn, options.partial_delivery_point),
            streams: StreamReorderSet::new(),
            readables: ReadableQueue::new(),
            duplicates: vec![],
            max_receive_window: options.max_receive_window,
            max_chunks_on_queue: options.max_chunks_on_queue,
            inbound_streams: options.inbound_streams,
            events,
        }
    }

    pub fn cumulative_ack(&self) -> Tsn {
        self.tsn_map.cumulative_ack()
    }

    /// Bytes held across the reassembly, reordering and readable queues, counting against the
    /// advertised window.
    fn queued_bytes(&self) -> usize {
        self.reassembly.queued_bytes() + self.streams.queued_bytes() + self.readables.queued_bytes()
    }

    /// The window to advertise in the next outgoing SACK.
    pub fn advertised_rwnd(&self) -> usize {
        self.max_receive_window.saturating_sub(self.queued_bytes())
    }

    fn record_duplicate(&mut self, tsn: Tsn) {
        if self.duplicates.len() < MAX_DUPLICATE_TSN_REPORTED && !self.duplicates.contains(&tsn) {
            self.duplicates.push(tsn);
        }
    }

    fn abort(&mut self, cause: ErrorCause, kind: ErrorKind, message: &str) {
        log::debug!("aborting association: {}", message);
        let mut events = self.events.borrow_mut();
        events.add(AssocEvent::SendAbort(cause));
        events.add(AssocEvent::OnAborted(kind, message.to_string()));
    }

    fn abort_protocol_violation(&mut self, message: &'static str) -> AdmitResult {
        self.abort(
            ErrorCause::protocol_violation(message),
            ErrorKind::ProtocolViolation,
            message,
        );
        AdmitResult::Aborted
    }

    /// Admits one inbound DATA chunk. `receiver_closed` is set by the owning layer once the
    /// application side is gone and no receiver exists for new data.
    pub fn admit(&mut self, tsn: Tsn, data: Data, receiver_closed: bool) -> AdmitResult {
        if data.payload.is_empty() {
            // From <https://datatracker.ietf.org/doc/html/rfc9260#section-3.3.1>: a DATA chunk
            // with no user data must be aborted with a protocol violation.
            return self.abort_protocol_violation("received DATA chunk with no user data");
        }

        // Old chunk, at or below the cumulative ack?
        if tsn <= self.tsn_map.cumulative_ack() {
            self.record_duplicate(tsn);
            return AdmitResult::Duplicate;
        }

        // Further ahead than the tracking map spans: there is no resource to hold the bit, so
        // the chunk is dropped and the peer retransmits once the window slides.
        if !self.tsn_map.is_in_window(tsn) {
            log::debug!("dropping tsn {} beyond the tracking window", tsn);
            return AdmitResult::DroppedOutOfWindow;
        }

        // Seen before, inside the window?
        if self.tsn_map.is_marked(tsn) {
            self.record_duplicate(tsn);
            return AdmitResult::Duplicate;
        }

        if receiver_closed {
            // There no longer is a receiver for this data.
            self.abort(
                ErrorCause::OutOfResource(OutOfResourceErrorCause {}),
                ErrorKind::WrongSequence,
                "DATA received after the receiver was closed",
            );
            return AdmitResult::Aborted;
        }

        // Resource admission: over the ceiling, only data inside the already-accepted range may
        // still be stored (it can fill gaps and advance the cumulative ack).
        let chunk_count = self.reassembly.fragment_count() + self.streams.queued_count();
        if (self.advertised_rwnd() == 0 || chunk_count >= self.max_chunks_on_queue)
            && tsn > self.tsn_map.highest_seen()
        {
            log::debug!("receive window exhausted, dropping tsn {}", tsn);
            return AdmitResult::DroppedNoResources;
        }

        // The stream must exist. The TSN still counts as received so the cumulative point can
        // advance, but nothing will be delivered.
        let stream_id = data.stream_key.id();
        if stream_id.0 >= self.inbound_streams {
            log::debug!("tsn {} references invalid stream {}", tsn, stream_id);
            self.events.borrow_mut().add(AssocEvent::QueueOperationError(
                ErrorCause::InvalidStreamIdentifier(InvalidStreamIdentifierErrorCause {
                    stream_id,
                }),
            ));
            self.mark_received(tsn, MarkKind::NonRevocable);
            return AdmitResult::InvalidStream;
        }

        // An ordered message can never (re)start behind the delivered sequence.
        if data.is_beginning
            && data.stream_key.is_ordered()
            && self.streams.is_behind_delivered(stream_id, data.ssn)
        {
            return self.abort_protocol_violation("SSN at or behind the delivered sequence");
        }

        let delivered_before = self.readables.delivered_count();

        // Express path: a complete message that nothing can be waiting in front of.
        if data.is_complete()
            && !self.reassembly.pd_in_progress()
            && (data.stream_key.is_unordered()
                || (self.streams.next_to_deliver(stream_id) == data.ssn
                    && self.streams.is_empty(stream_id)))
        {
            self.mark_received(tsn, MarkKind::NonRevocable);
            let unordered = data.stream_key.is_unordered();
            self.readables.push(readable_from(tsn, data));
            if !unordered {
                self.streams.note_delivered(stream_id);
            }
            // Delivering this message may have unblocked the head of the reassembly queue.
            self.reassembly.deliver_check(&mut self.streams, &mut self.tsn_map, &mut self.readables);
            return AdmitResult::Delivered;
        }

        // Partial-delivery continuation: the immediate next fragment of the open message.
        if self.reassembly.can_append_partial(tsn, &data) {
            self.mark_received(tsn, MarkKind::NonRevocable);
            self.reassembly.append_partial(
                tsn,
                data,
                &mut self.streams,
                &mut self.tsn_map,
                &mut self.readables,
            );
            if !self.reassembly.is_empty() {
                // Queued fragments may have become contiguous with the appended one, and if the
                // message finished, another may be ready behind it.
                self.reassembly.deliver_check(
                    &mut self.streams,
                    &mut self.tsn_map,
                    &mut self.readables,
                );
            }
            return AdmitResult::Delivered;
        }

        if data.is_complete() {
            // A complete message whose TSN claims a spot inside a fragmented message, or that
            // arrives where the open partial delivery expects its continuation, exposes a broken
            // peer.
            if self.reassembly.pd_in_progress()
                && self.reassembly.is_empty()
                && tsn == self.reassembly.tsn_last_delivered() + 1
            {
                return self.abort_protocol_violation(
                    "complete message where a partial delivery continuation was expected",
                );
            }
            if self.reassembly.spans(tsn) {
                return self.abort_protocol_violation(
                    "complete message inside a fragmented TSN range",
                );
            }

            if data.stream_key.is_unordered() {
                self.mark_received(tsn, MarkKind::NonRevocable);
                self.readables.push(readable_from(tsn, data));
                return AdmitResult::Delivered;
            }

            self.mark_received(tsn, MarkKind::Revocable);
            match self.streams.deliver_in_order(
                readable_from(tsn, data),
                &mut self.tsn_map,
                &mut self.readables,
            ) {
                Err(cause) => {
                    let message = cause.to_string();
                    self.abort(cause, ErrorKind::ProtocolViolation, &message);
                    AdmitResult::Aborted
                }
                Ok(0) => AdmitResult::Queued,
                Ok(_) => {
                    self.reassembly.deliver_check(
                        &mut self.streams,
                        &mut self.tsn_map,
                        &mut self.readables,
                    );
                    AdmitResult::Delivered
                }
            }
        } else {
            // A fragment, off to reassembly.
            self.mark_received(tsn, MarkKind::Revocable);
            match self.reassembly.insert(tsn, data) {
                Err(cause) => {
                    let message = cause.to_string();
                    self.abort(cause, ErrorKind::ProtocolViolation, &message);
                    AdmitResult::Aborted
                }
                Ok(InsertOutcome::Duplicate) => {
                    self.record_duplicate(tsn);
                    AdmitResult::Duplicate
                }
                Ok(InsertOutcome::Inserted) => {
                    self.reassembly.deliver_check(
                        &mut self.streams,
                        &mut self.tsn_map,
                        &mut self.readables,
                    );
                    if self.readables.delivered_count() > delivered_before {
                        AdmitResult::Delivered
                    } else {
                        AdmitResult::Queued
                    }
                }
            }
        }
    }

    fn mark_received(&mut self, tsn: Tsn, kind: MarkKind) {
        self.tsn_map.mark(tsn, kind).expect("tsn was checked to be inside the window");
        self.tsn_map.slide();
    }

    /// Processes a received FORWARD-TSN: advances the cumulative point past abandoned data and
    /// purges everything the peer gave up on.
    pub fn handle_forward_tsn(&mut self, fwd: &ForwardTsnChunk) -> ForwardTsnResult {
        let new_cumulative = fwd.new_cumulative_tsn;
        if new_cumulative <= self.tsn_map.cumulative_ack() {
            // From <https://datatracker.ietf.org/doc/html/rfc3758#section-3.6>: an out-of-date
            // FORWARD-TSN may mean the previous SACK was lost; answer with a SACK.
            self.events.borrow_mut().add(AssocEvent::SendSackImmediately);
            return ForwardTsnResult::Stale;
        }

        // A jump far outside anything this side ever advertised can only be an attack.
        let distance = new_cumulative.distance_to(self.tsn_map.cumulative_ack());
        if distance > self.tsn_map.span() + self.max_receive_window as u32 {
            self.abort(
                ErrorCause::protocol_violation("FORWARD-TSN outside any advertised window"),
                ErrorKind::ProtocolViolation,
                "FORWARD-TSN outside any advertised window",
            );
            return ForwardTsnResult::Aborted;
        }

        log::debug!(
            "forward-tsn to {} (cum_ack_tsn={})",
            new_cumulative,
            self.tsn_map.cumulative_ack()
        );
        self.tsn_map.advance_cumulative(new_cumulative);

        let purge = self.reassembly.purge_to(new_cumulative, &mut self.streams);
        if let Some((stream_id, ssn)) = purge.pd_aborted {
            self.events.borrow_mut().add(AssocEvent::OnPartialDeliveryAborted(stream_id, ssn));
        }

        for skipped in &fwd.skipped_streams {
            if skipped.stream_id.0 >= self.inbound_streams {
                // Bogus stream list; stop processing it.
                break;
            }
            self.streams.handle_forward(
                skipped.stream_id,
                skipped.ssn,
                &mut self.tsn_map,
                &mut self.readables,
            );
        }

        // Anything now unblocked can be delivered.
        self.reassembly.deliver_check(&mut self.streams, &mut self.tsn_map, &mut self.readables);
        ForwardTsnResult::Processed
    }

    /// Builds the next outgoing SACK and consumes the duplicate-TSN log. The chunk must be sent.
    pub fn create_selective_ack(&mut self) -> SackChunk {
        SackChunk {
            cumulative_tsn_ack: self.tsn_map.cumulative_ack(),
            a_rwnd: self.advertised_rwnd() as u32,
            gap_ack_blocks: self.tsn_map.gap_ack_blocks(MAX_GAP_ACK_BLOCKS_REPORTED),
            nr_gap_ack_blocks: vec![],
            duplicate_tsns: std::mem::take(&mut self.duplicates),
        }
    }

    pub fn drain_readable(&mut self) -> Vec<ReadableMessage> {
        self.readables.drain()
    }

    /// Drops all queued state. Called when the association aborts.
    pub fn discard_all(&mut self) {
        let peer_next = self.tsn_map.cumulative_ack() + 1;
        self.reassembly = ReassemblyQueue::new(peer_next, 0);
        self.streams = StreamReorderSet::new();
        self.readables = ReadableQueue::new();
        self.duplicates.clear();
    }
}

fn readable_from(tsn: Tsn, data: Data) -> ReadableMessage {
    ReadableMessage {
        stream_id: data.stream_key.id(),
        ssn: data.ssn,
        ppid: data.ppid,
        unordered: data.stream_key.is_unordered(),
        payload: data.payload,
        first_tsn: tsn,
        last_tsn: tsn,
        complete: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StreamId;
    use crate::events::Events;
    use crate::testing::data_generator::DataGenerator;
    use crate::types::Ssn;
    use itertools::Itertools;

    const INITIAL_TSN: Tsn = Tsn(10);

    struct Fixture {
        engine: RecvEngine,
        events: Rc<RefCell<Events>>,
    }

    fn fixture() -> Fixture {
        fixture_with_options(Options::default())
    }

    fn fixture_with_options(options: Options) -> Fixture {
        let events = Rc::new(RefCell::new(Events::new()));
        let engine = RecvEngine::new(
            INITIAL_TSN,
            &options,
            Rc::clone(&events) as Rc<RefCell<dyn EventSink>>,
        );
        Fixture { engine, events }
    }

    impl Fixture {
        fn admit(&mut self, tsn: u32, data: Data) -> AdmitResult {
            self.engine.admit(Tsn(tsn), data, false)
        }
    }

    #[test]
    fn express_delivers_complete_ordered_message() {
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        assert_eq!(f.admit(10, gen.ordered("hello", "BE")), AdmitResult::Delivered);

        let messages = f.engine.drain_readable();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, b"hello".to_vec());
        assert!(!messages[0].unordered);

        let sack = f.engine.create_selective_ack();
        assert_eq!(sack.cumulative_tsn_ack, Tsn(10));
        assert!(sack.gap_ack_blocks.is_empty());
    }

    #[test]
    fn ordered_messages_are_observed_in_ssn_order() {
        // Arrival order 2, 1, 3 must surface as 1, 2, 3.
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        let msg1 = gen.ordered("one", "BE");
        let msg2 = gen.ordered("two", "BE");
        let msg3 = gen.ordered("three", "BE");

        assert_eq!(f.admit(11, msg2), AdmitResult::Queued);
        assert_eq!(f.admit(10, msg1), AdmitResult::Delivered);
        assert_eq!(f.admit(12, msg3), AdmitResult::Delivered);

        let payloads: Vec<Vec<u8>> =
            f.engine.drain_readable().into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn unordered_bypasses_reordering() {
        let mut f = fixture();
        let mut ordered = DataGenerator::new(StreamId(1));
        let mut unordered = DataGenerator::new(StreamId(1));
        ordered.ordered("zero", "BE"); // SSN 0 never arrives.
        assert_eq!(f.admit(11, ordered.ordered("one", "BE")), AdmitResult::Queued);
        assert_eq!(f.admit(12, unordered.unordered("now", "BE")), AdmitResult::Delivered);

        let messages = f.engine.drain_readable();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, b"now".to_vec());
    }

    #[test]
    fn duplicate_is_recorded_once_per_sack() {
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        let msg = gen.ordered("x", "BE");
        // TSN 5 is below the initial cumulative ack: always a duplicate.
        assert_eq!(f.admit(5, msg.clone()), AdmitResult::Duplicate);
        assert_eq!(f.admit(5, msg), AdmitResult::Duplicate);

        let sack = f.engine.create_selective_ack();
        assert_eq!(sack.duplicate_tsns, vec![Tsn(5)]);

        // The log was consumed by the SACK.
        let sack = f.engine.create_selective_ack();
        assert!(sack.duplicate_tsns.is_empty());
    }

    #[test]
    fn duplicate_of_received_chunk_does_not_mutate_map() {
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        let msg = gen.ordered("x", "BE");
        assert_eq!(f.admit(12, msg.clone()), AdmitResult::Queued);
        assert_eq!(f.admit(12, msg), AdmitResult::Duplicate);

        let sack = f.engine.create_selective_ack();
        assert_eq!(sack.cumulative_tsn_ack, Tsn(9));
        assert_eq!(sack.gap_ack_blocks.len(), 1);
        assert_eq!(sack.duplicate_tsns, vec![Tsn(12)]);
    }

    #[test]
    fn out_of_window_is_dropped_silently() {
        let options = Options { tsn_map_span: 64, ..Options::default() };
        let mut f = fixture_with_options(options);
        let mut gen = DataGenerator::new(StreamId(1));
        assert_eq!(f.admit(10 + 64, gen.ordered("x", "BE")), AdmitResult::DroppedOutOfWindow);
        assert!(f.engine.create_selective_ack().duplicate_tsns.is_empty());
    }

    #[test]
    fn exhausted_window_drops_new_data_but_accepts_gap_fillers() {
        let options = Options { max_receive_window: 8, ..Options::default() };
        let mut f = fixture_with_options(options);
        let mut gen = DataGenerator::new(StreamId(1));
        gen.ordered("?", "BE"); // SSN 0 missing, so everything queues.
        assert_eq!(f.admit(12, gen.ordered("aaaaaaaa", "BE")), AdmitResult::Queued);
        assert_eq!(f.engine.advertised_rwnd(), 0);

        // New data beyond the highest seen is dropped...
        assert_eq!(f.admit(14, gen.ordered("b", "BE")), AdmitResult::DroppedNoResources);
        // ...but a retransmission inside the accepted range is still stored.
        let mut first = DataGenerator::new(StreamId(1));
        assert_eq!(f.admit(10, first.ordered("!", "BE")), AdmitResult::Delivered);
    }

    #[test]
    fn invalid_stream_is_errored_but_counted_received() {
        let options = Options { inbound_streams: 4, ..Options::default() };
        let mut f = fixture_with_options(options);
        let mut gen = DataGenerator::new(StreamId(7));
        assert_eq!(f.admit(10, gen.ordered("x", "BE")), AdmitResult::InvalidStream);

        // Nothing is delivered, but the cumulative point advanced over the TSN.
        assert!(f.engine.drain_readable().is_empty());
        assert_eq!(f.engine.create_selective_ack().cumulative_tsn_ack, Tsn(10));
        assert!(matches!(
            f.events.borrow_mut().next_event(),
            Some(AssocEvent::QueueOperationError(ErrorCause::InvalidStreamIdentifier(_)))
        ));
    }

    #[test]
    fn receiver_closed_aborts_on_new_data() {
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        assert_eq!(f.engine.admit(Tsn(10), gen.ordered("x", "BE"), true), AdmitResult::Aborted);
        assert!(matches!(
            f.events.borrow_mut().next_event(),
            Some(AssocEvent::SendAbort(ErrorCause::OutOfResource(_)))
        ));
    }

    #[test]
    fn empty_payload_aborts() {
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        assert_eq!(f.admit(10, gen.ordered("", "BE")), AdmitResult::Aborted);
    }

    #[test]
    fn ssn_regression_aborts() {
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        assert_eq!(f.admit(10, gen.ordered("a", "BE")), AdmitResult::Delivered);
        // A new message claiming SSN 0 again.
        let mut replay = DataGenerator::new(StreamId(1));
        assert_eq!(f.admit(11, replay.ordered("b", "BE")), AdmitResult::Aborted);
    }

    #[test]
    fn fragmented_message_no_double_delivery() {
        // Every payload byte is handed over exactly once, under any arrival permutation that
        // interleaves the reassembly and partial-delivery paths.
        let tsns: Vec<u32> = vec![10, 11, 12, 13];
        for perm in tsns.iter().permutations(tsns.len()) {
            let mut f = fixture_with_options(Options {
                partial_delivery_point: 2,
                ..Options::default()
            });
            let mut gen = DataGenerator::new(StreamId(1));
            let fragments = [
                gen.ordered("ab", "B"),
                gen.ordered("cd", ""),
                gen.ordered("ef", ""),
                gen.ordered("gh", "E"),
            ];
            for tsn in &perm {
                let data = fragments[(**tsn - 10) as usize].clone();
                f.engine.admit(Tsn(**tsn), data, false);
            }
            let total: Vec<u8> =
                f.engine.drain_readable().into_iter().flat_map(|m| m.payload).collect();
            assert_eq!(total, b"abcdefgh".to_vec(), "arrival order {:?}", perm);
        }
    }

    #[test]
    fn forward_tsn_purges_and_notifies_partial_delivery() {
        let mut f = fixture_with_options(Options {
            partial_delivery_point: 2,
            ..Options::default()
        });
        let mut gen = DataGenerator::new(StreamId(2));
        // Fragments 10 and 11 of a message on stream 2 open a partial delivery; 12 and 13 are
        // lost and the peer abandons the message.
        assert_eq!(f.admit(10, gen.ordered("ab", "B")), AdmitResult::Delivered);
        assert_eq!(f.admit(11, gen.ordered("cd", "")), AdmitResult::Delivered);

        let fwd = ForwardTsnChunk {
            new_cumulative_tsn: Tsn(13),
            skipped_streams: vec![crate::packet::SkippedStream {
                stream_id: StreamId(2),
                ssn: Ssn(0),
            }],
        };
        assert_eq!(f.engine.handle_forward_tsn(&fwd), ForwardTsnResult::Processed);

        assert_eq!(f.engine.create_selective_ack().cumulative_tsn_ack, Tsn(13));
        let mut saw_pd_abort = false;
        while let Some(event) = f.events.borrow_mut().next_event() {
            if let AssocEvent::OnPartialDeliveryAborted(stream_id, ssn) = event {
                assert_eq!(stream_id, StreamId(2));
                assert_eq!(ssn, Ssn(0));
                saw_pd_abort = true;
            }
        }
        assert!(saw_pd_abort);

        // The next message on stream 2 is deliverable.
        assert_eq!(f.admit(14, gen.ordered("next", "BE")), AdmitResult::Delivered);
    }

    #[test]
    fn stale_forward_tsn_requests_sack() {
        let mut f = fixture();
        let mut gen = DataGenerator::new(StreamId(1));
        f.admit(10, gen.ordered("a", "BE"));

        let fwd = ForwardTsnChunk { new_cumulative_tsn: Tsn(10), skipped_streams: vec![] };
        assert_eq!(f.engine.handle_forward_tsn(&fwd), ForwardTsnResult::Stale);
        assert!(matches!(
            f.events.borrow_mut().next_event(),
            Some(AssocEvent::SendSackImmediately)
        ));
    }

    #[test]
    fn absurd_forward_tsn_aborts() {
        let mut f = fixture();
        let fwd = ForwardTsnChunk {
            new_cumulative_tsn: Tsn(10 + 2_000_000_000),
            skipped_streams: vec![],
        };
        assert_eq!(f.engine.handle_forward_tsn(&fwd), ForwardTsnResult::Aborted);
    }

    #[test]
    fn forward_tsn_fills_gap_from_received_data() {
        // RFC 3758 example: 102, 104, 105, 107 received, FORWARD-TSN to 103 lands on 105.
        let mut f = fixture();
        let mut engine = RecvEngine::new(
            Tsn(102),
            &Options::default(),
            Rc::clone(&f.events) as Rc<RefCell<dyn EventSink>>,
        );
        let mut gen = DataGenerator::new(StreamId(1));
        for tsn in [102, 104, 105, 107] {
            engine.admit(Tsn(tsn), gen.unordered("x", "BE"), false);
        }
        let fwd = ForwardTsnChunk { new_cumulative_tsn: Tsn(103), skipped_streams: vec![] };
        assert_eq!(engine.handle_forward_tsn(&fwd), ForwardTsnResult::Processed);
        let sack = engine.create_selective_ack();
        assert_eq!(sack.cumulative_tsn_ack, Tsn(105));
        assert_eq!(sack.gap_ack_blocks.len(), 1);
    }

    #[test]
    fn advertised_window_shrinks_with_queued_data() {
        let options = Options { max_receive_window: 1000, ..Options::default() };
        let mut f = fixture_with_options(options);
        let mut gen = DataGenerator::new(StreamId(1));
        gen.ordered("?", "BE"); // SSN 0 missing.
        assert_eq!(f.engine.advertised_rwnd(), 1000);
        f.admit(11, gen.ordered("0123456789", "BE"));
        assert_eq!(f.engine.advertised_rwnd(), 990);
    }
}
