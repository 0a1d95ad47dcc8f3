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

use crate::packet::error_causes::ErrorCause;
use crate::types::PathId;
use crate::types::Ssn;
use crate::types::Tsn;
use std::fmt;
use std::ops::Add;
use std::ops::Sub;
use std::time::Duration;

/// Represents a point in time relative to the creation of the association.
///
/// This is an absolute timestamp within the "association epoch".
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssocTime(Duration);

impl AssocTime {
    /// The moment the association was created (t=0).
    pub const fn zero() -> AssocTime {
        AssocTime(Duration::ZERO)
    }
    pub const fn infinite_future() -> AssocTime {
        AssocTime(Duration::MAX)
    }
}

impl Add<Duration> for AssocTime {
    type Output = AssocTime;
    fn add(self, rhs: Duration) -> AssocTime {
        AssocTime(self.0 + rhs)
    }
}

impl Sub<AssocTime> for AssocTime {
    type Output = Duration;
    fn sub(self, rhs: AssocTime) -> Duration {
        self.0 - rhs.0
    }
}

impl From<Duration> for AssocTime {
    fn from(value: Duration) -> Self {
        AssocTime(value)
    }
}

/// Stream Identifier
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StreamId(pub u16);

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload Protocol Identifier (PPID)
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct PpId(pub u32);

impl fmt::Debug for PpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
impl fmt::Display for PpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents the category of an error that has occurred.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ErrorKind {
    /// The peer has performed a protocol violation, such as sending malformed gap-ack-blocks or
    /// mis-flagged fragments. Always terminal for the association.
    ProtocolViolation,

    /// Chunks were received in an unexpected sequence, indicating a synchronization mismatch
    /// between the peers.
    WrongSequence,

    /// The peer has reported an issue by sending an `ERROR` or `ABORT` chunk.
    PeerReported,

    /// Receive buffers have been exhausted. The engine handles this by dropping data and letting
    /// the advertised window signal backpressure; it's only surfaced when the association must be
    /// torn down while draining.
    ResourceExhaustion,
}

/// User configurable options, set at association creation.
#[derive(Clone)]
pub struct Options {
    /// The number of TSNs the receive-side tracking map spans. Data received further than this
    /// beyond the cumulative ack point is dropped, which forces the transmitter to send data that
    /// actually advances the cumulative ack. Must be a multiple of 8.
    pub tsn_map_span: u32,

    /// Maximum received window buffer size. This should be a bit larger than the largest sized
    /// message you want to be able to receive, and bounds the memory held in the reassembly and
    /// reordering queues. It is also the basis of the advertised receiver window.
    pub max_receive_window: usize,

    /// Maximum number of chunks held across the reassembly queue and all stream reorder queues
    /// before admission starts dropping data beyond the already-accepted range.
    pub max_chunks_on_queue: usize,

    /// Once the head message on the reassembly queue has at least this many contiguous bytes, it
    /// becomes eligible for partial delivery before all its fragments have arrived.
    pub partial_delivery_point: usize,

    /// The number of times a chunk must be reported missing before it's marked for fast
    /// retransmission, see <https://datatracker.ietf.org/doc/html/rfc9260#section-7.2.4-5.1.1>.
    pub fast_resend_threshold: u8,

    /// Per-chunk overhead assumed when shrinking the peer's advertised window by in-flight data,
    /// accounting for headers and bookkeeping on the receiver.
    pub per_chunk_overhead: usize,

    /// Computed peer windows below this threshold are clamped to zero to avoid silly window
    /// syndrome on the sender side.
    pub rwnd_silly_window_threshold: usize,

    /// Path MTU. Used by the congestion-control implementation for window arithmetic.
    pub mtu: usize,

    /// The initial congestion window size, in number of MTUs.
    pub cwnd_mtus_initial: usize,

    /// The minimum congestion window size, in number of MTUs, upon detection of packet loss.
    pub cwnd_mtus_min: usize,

    /// Initial RTO value.
    pub rto_initial: Duration,

    /// Minimum RTO value. This must be larger than an expected peer delayed ack timeout.
    pub rto_min: Duration,

    /// Maximum RTO value.
    pub rto_max: Duration,

    /// Max allowed RTT value; larger measurements are discarded as unrealistic.
    pub rtt_max: Duration,

    /// The minimum limit for the measured RTT variance, keeping the RTO above stable RTTs.
    pub min_rtt_variance: Duration,

    /// The number of inbound streams negotiated for this association. DATA chunks referencing a
    /// stream at or beyond this count trigger an operation error to the peer.
    pub inbound_streams: u16,

    /// RFC 3758 Partial Reliability Extension.
    pub enable_partial_reliability: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            tsn_map_span: 4096,
            max_receive_window: 5 * 1024 * 1024,
            max_chunks_on_queue: 512,
            partial_delivery_point: 64 * 1024,
            fast_resend_threshold: 3,
            per_chunk_overhead: 256,
            rwnd_silly_window_threshold: 1420,
            mtu: 1280,
            cwnd_mtus_initial: 10,
            cwnd_mtus_min: 4,
            rto_initial: Duration::from_millis(500),
            rto_min: Duration::from_millis(400),
            rto_max: Duration::from_secs(60),
            rtt_max: Duration::from_secs(60),
            min_rtt_variance: Duration::from_millis(220),
            inbound_streams: u16::MAX,
            enable_partial_reliability: true,
        }
    }
}

/// A user message delivered, or in the middle of being delivered, to the application.
///
/// While a partial delivery is open, the message still sitting in the readable queue grows as
/// fragments are appended to it; once the application has consumed a partial message, subsequent
/// fragments arrive as follow-up `ReadableMessage` values with the same identity. `complete` is
/// set on the segment carrying the final fragment.
#[derive(Debug)]
pub struct ReadableMessage {
    pub stream_id: StreamId,
    pub ssn: Ssn,
    pub ppid: PpId,
    pub unordered: bool,
    pub payload: Vec<u8>,

    /// The TSN of the first fragment this message (segment) was assembled from.
    pub first_tsn: Tsn,

    /// The TSN of the last fragment appended so far.
    pub last_tsn: Tsn,

    /// Whether the full user message has been delivered once this segment is consumed.
    pub complete: bool,
}

/// Events generated by the engine for the owning association/timer/packet layer.
#[derive(Debug)]
pub enum AssocEvent {
    /// A non-fatal error. Should be logged; the association is still viable.
    OnError(ErrorKind, String),

    /// The association has aborted due to a protocol violation or local teardown. All engine
    /// state for the association is discarded and every later call is a no-op.
    OnAborted(ErrorKind, String),

    /// An open partial delivery was cut short (by a FORWARD-TSN skipping past it). The
    /// application has seen a partial message for this (stream, SSN) that will never complete.
    OnPartialDeliveryAborted(StreamId, Ssn),

    /// An ERROR chunk with this cause should be sent to the peer. The association continues.
    QueueOperationError(ErrorCause),

    /// An ABORT chunk with this cause should be sent to the peer.
    SendAbort(ErrorCause),

    /// All outstanding data is acknowledged and a graceful shutdown is pending: SHUTDOWN should
    /// be sent.
    SendShutdown,

    /// All outstanding data is acknowledged and the peer initiated shutdown: SHUTDOWN-ACK should
    /// be sent.
    SendShutdownAck,

    /// A SACK should be sent without delay (e.g. an out-of-date FORWARD-TSN hinted that a
    /// previous SACK was lost).
    SendSackImmediately,
}

/// The result of admitting one inbound DATA chunk.
#[derive(Debug, PartialEq)]
pub enum AdmitResult {
    /// The chunk produced at least one readable message (express delivery, partial-delivery
    /// append, or it unblocked queued messages).
    Delivered,

    /// The chunk was accepted and queued for reassembly or reordering.
    Queued,

    /// The chunk was a duplicate; it has been recorded for the next outgoing SACK's duplicate
    /// list and nothing else changed.
    Duplicate,

    /// The chunk was beyond the tracking window and silently dropped.
    DroppedOutOfWindow,

    /// Receive-side resources are exhausted and the chunk was beyond the already-accepted range;
    /// dropped, with the advertised window left to signal backpressure.
    DroppedNoResources,

    /// The stream id is outside the negotiated range. The TSN was marked received (so the
    /// cumulative point can advance) but nothing will be delivered, and an operation error has
    /// been queued for the peer.
    InvalidStream,

    /// The chunk exposed a protocol violation and the association has aborted.
    Aborted,
}

/// Everything a successfully processed SACK tells the layers around the engine.
#[derive(Debug, PartialEq)]
pub struct SackOutcome {
    /// The recomputed peer receiver window, after subtracting in-flight data and per-chunk
    /// overhead and applying the silly-window floor.
    pub rwnd: u32,

    /// The PR-SCTP advanced-peer-ack-point moved; a FORWARD-TSN should be generated (see
    /// [`crate::Association::create_forward_tsn`]) and sent.
    pub fwd_tsn_needed: bool,

    /// A round-trip-time sample measured from a newly acked, never-retransmitted chunk.
    pub rtt: Option<Duration>,

    /// At least one outstanding chunk was newly acknowledged, so the peer is alive and the
    /// association error counter should be reset.
    pub reset_error_counter: bool,

    /// Paths whose earliest outstanding chunk was acknowledged and that still have data in
    /// flight: their T3-rtx timer should be restarted.
    pub restart_t3: Vec<PathId>,

    /// Paths whose flight drained to zero: their T3-rtx timer should be stopped.
    pub stop_t3: Vec<PathId>,

    /// The sent queue is empty; combined with the association's shutdown sub-state this has
    /// already triggered [`AssocEvent::SendShutdown`] / [`AssocEvent::SendShutdownAck`].
    pub shutdown_ready: bool,
}

/// The result of processing one inbound SACK or NR-SACK.
#[derive(Debug, PartialEq)]
pub enum SackResult {
    /// The SACK was stale (cumulative ack behind the current point) and dropped without effect.
    Invalid,

    /// The SACK was malformed (gap blocks out of order/overlapping, or acking unsent data); the
    /// association has aborted and no sent-queue state was mutated.
    Aborted,

    /// The SACK was processed.
    Processed(SackOutcome),
}

/// The result of processing one inbound FORWARD-TSN.
#[derive(Debug, PartialEq)]
pub enum ForwardTsnResult {
    /// The new cumulative TSN was at or behind the current point. A SACK is requested via
    /// [`AssocEvent::SendSackImmediately`] since the peer may have missed one.
    Stale,

    /// The cumulative point advanced and affected queues were purged.
    Processed,

    /// The FORWARD-TSN jumped outside every window this side ever advertised; the association
    /// has aborted.
    Aborted,
}

/// Graceful-shutdown sub-state, owned by the association layer driving this engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShutdownState {
    /// Data transfer is ongoing.
    None,

    /// The local side requested shutdown; once the sent queue drains, SHUTDOWN is emitted.
    Pending,

    /// The peer sent SHUTDOWN; once the sent queue drains, SHUTDOWN-ACK is emitted.
    Received,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = Options::default();
        assert_eq!(options.tsn_map_span % 8, 0);
        assert_eq!(options.fast_resend_threshold, 3);
        assert!(options.enable_partial_reliability);
    }

    #[test]
    fn assoc_time_arithmetic() {
        let t0 = AssocTime::zero();
        let t1 = t0 + Duration::from_millis(250);
        assert_eq!(t1 - t0, Duration::from_millis(250));
        assert!(t1 < AssocTime::infinite_future());
    }
}
