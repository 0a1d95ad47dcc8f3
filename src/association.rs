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
use crate::api::AssocTime;
use crate::api::ForwardTsnResult;
use crate::api::Options;
use crate::api::ReadableMessage;
use crate::api::SackResult;
use crate::api::ShutdownState;
use crate::events::Events;
use crate::packet::data::Data;
use crate::packet::forward_tsn_chunk::ForwardTsnChunk;
use crate::packet::sack_chunk::SackChunk;
use crate::path::Path;
use crate::rx::data_admission::RecvEngine;
use crate::tx::congestion::CongestionControl;
use crate::tx::congestion::NewReno;
use crate::tx::sack_processor::SackProcessor;
use crate::tx::sent_queue::PrPolicy;
use crate::types::PathId;
use crate::types::Ssn;
use crate::types::StreamKey;
use crate::types::Tsn;
use crate::EventSink;
use std::cell::RefCell;
use std::rc::Rc;

/// One SCTP association's data-reception and acknowledgement engine.
///
/// All per-association state lives in this value; methods take `&mut self` and run to
/// completion, which gives the single-owner exclusion the protocol requires. Timers, sockets and
/// the wire codec live outside: this engine consumes parsed chunks and communicates back through
/// return values and [`Association::poll_event`].
///
/// An abort (protocol violation, either direction) is terminal: queued data is discarded and
/// every later call reports the aborted state.
pub struct Association {
    name: String,
    recv: RecvEngine,
    tx: SackProcessor,
    paths: Vec<Path>,
    events: Rc<RefCell<Events>>,
    shutdown: ShutdownState,
    receiver_closed: bool,
    aborted: bool,
}

impl Association {
    pub fn new(
        name: &str,
        options: &Options,
        peer_initial_tsn: Tsn,
        my_initial_tsn: Tsn,
        path_count: usize,
    ) -> Self {
        Self::with_congestion_control(
            name,
            options,
            peer_initial_tsn,
            my_initial_tsn,
            path_count,
            Box::new(NewReno::new(options)),
        )
    }

    /// Creates an association with a custom congestion-control strategy.
    pub fn with_congestion_control(
        name: &str,
        options: &Options,
        peer_initial_tsn: Tsn,
        my_initial_tsn: Tsn,
        path_count: usize,
        cc: Box<dyn CongestionControl>,
    ) -> Self {
        let events = Rc::new(RefCell::new(Events::new()));
        let paths = (0..path_count.max(1)).map(|_| Path::new(options)).collect();
        Self {
            name: name.to_string(),
            recv: RecvEngine::new(
                peer_initial_tsn,
                options,
                Rc::clone(&events) as Rc<RefCell<dyn EventSink>>,
            ),
            tx: SackProcessor::new(
                my_initial_tsn,
                options,
                cc,
                Rc::clone(&events) as Rc<RefCell<dyn EventSink>>,
            ),
            paths,
            events,
            shutdown: ShutdownState::None,
            receiver_closed: false,
            aborted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Returns the next queued event, if any.
    pub fn poll_event(&mut self) -> Option<AssocEvent> {
        self.events.borrow_mut().next_event()
    }

    /// The destination paths of this association. Path 0 is the primary.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// Informs the engine of the graceful-shutdown sub-state, driven by the owning association
    /// layer's handling of SHUTDOWN chunks.
    pub fn set_shutdown_state(&mut self, shutdown: ShutdownState) {
        self.shutdown = shutdown;
    }

    /// Marks the application side as gone; any further inbound DATA aborts the association.
    pub fn set_receiver_closed(&mut self) {
        self.receiver_closed = true;
    }

    /// Admits one inbound DATA chunk to the receive engine.
    pub fn admit_data(&mut self, tsn: Tsn, data: Data, _path: PathId) -> AdmitResult {
        if self.aborted {
            return AdmitResult::Aborted;
        }
        let result = self.recv.admit(tsn, data, self.receiver_closed);
        if result == AdmitResult::Aborted {
            self.enter_aborted();
        }
        result
    }

    /// Processes one inbound SACK or NR-SACK against the sent queue. `ecn_observed` carries the
    /// ECN congestion-experienced signal seen with this packet.
    pub fn process_sack(
        &mut self,
        now: AssocTime,
        sack: &SackChunk,
        ecn_observed: bool,
    ) -> SackResult {
        if self.aborted {
            return SackResult::Aborted;
        }
        let result = self.tx.process(now, sack, ecn_observed, &mut self.paths, self.shutdown);
        if result == SackResult::Aborted {
            self.enter_aborted();
        }
        result
    }

    /// Processes one inbound FORWARD-TSN chunk.
    pub fn process_forward_tsn(&mut self, fwd: &ForwardTsnChunk) -> ForwardTsnResult {
        if self.aborted {
            return ForwardTsnResult::Aborted;
        }
        let result = self.recv.handle_forward_tsn(fwd);
        if result == ForwardTsnResult::Aborted {
            self.enter_aborted();
        }
        result
    }

    /// Drains every message (and partial-delivery segment) ready for the application.
    pub fn drain_reassembly(&mut self) -> Vec<ReadableMessage> {
        self.recv.drain_readable()
    }

    /// Builds the next outgoing SACK. This consumes the duplicate-TSN log, so the chunk must be
    /// sent.
    pub fn create_selective_ack(&mut self) -> SackChunk {
        self.recv.create_selective_ack()
    }

    /// Builds the FORWARD-TSN announcing this side's advanced peer-ack point. Call when a
    /// processed SACK reported `fwd_tsn_needed`.
    pub fn create_forward_tsn(&self) -> ForwardTsnChunk {
        self.tx.create_forward_tsn()
    }

    /// The peer's receive window as recomputed by the last processed SACK.
    pub fn peers_rwnd(&self) -> u32 {
        self.tx.peers_rwnd()
    }

    /// Records a DATA chunk handed to the path layer: it gets the next TSN and enters the flight
    /// on `path`.
    pub fn record_sent(
        &mut self,
        now: AssocTime,
        stream_key: StreamKey,
        ssn: Ssn,
        size: usize,
        path: PathId,
        pr: PrPolicy,
    ) -> Tsn {
        let queue = self.tx.sent_queue_mut();
        let tsn = queue.enqueue(stream_key, ssn, size, pr);
        queue.mark_sent(tsn, now, path, &mut self.paths);
        tsn
    }

    /// Abandons an outstanding chunk under its partial-reliability policy (e.g. the send buffer
    /// dropping a buffer-limited message).
    pub fn abandon_sent(&mut self, tsn: Tsn) {
        self.tx.sent_queue_mut().abandon(tsn, &mut self.paths);
    }

    /// Hands out every chunk marked for (fast) retransmission, moving it back into the flight on
    /// the path it should be retransmitted on.
    pub fn take_chunks_to_resend(&mut self, now: AssocTime) -> Vec<(Tsn, PathId)> {
        self.tx.sent_queue_mut().take_chunks_to_resend(now, &mut self.paths)
    }

    fn enter_aborted(&mut self) {
        log::debug!("[{}] association aborted, discarding queued state", self.name);
        self.aborted = true;
        self.recv.discard_all();
    }
}
