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

//! The SCTP data-reception and acknowledgement engine.
//!
//! This crate implements the stateful core of an SCTP association that sits between a wire codec
//! and the application: admission of inbound DATA chunks (duplicate and window filtering, express
//! delivery, fragment reassembly with partial-delivery semantics, per-stream reordering),
//! processing of SACK and NR-SACK chunks against the queue of outstanding transmissions
//! (acknowledgement, revocation, fast-retransmit marking with multihomed path accounting), and
//! PR-SCTP FORWARD-TSN abandonment.
//!
//! The engine is a synchronous state machine. It never does I/O and never arms timers; it tells
//! the owning layer what to do through return values and a queued event stream. One
//! [`Association`] is one association, and all methods take `&mut self` - concurrent associations
//! are independent values.

use crate::api::Options;
use crate::types::Tsn;

pub mod api;
pub mod packet;
pub mod types;

pub(crate) mod association;
pub(crate) mod events;
pub(crate) mod path;
pub(crate) mod rx;
pub(crate) mod tx;

pub use crate::association::Association;
pub use crate::path::Path;
pub use crate::path::RtoEstimator;
pub use crate::tx::congestion::AckSummary;
pub use crate::tx::congestion::CongestionControl;
pub use crate::tx::congestion::NewReno;
pub use crate::tx::sent_queue::PrPolicy;

trait EventSink {
    fn add(&mut self, event: api::AssocEvent);
    fn next_event(&mut self) -> Option<api::AssocEvent>;
}

#[cfg(test)]
pub(crate) mod testing;

/// Returns the version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Creates a new [`Association`].
///
/// The provided `name` is only used for logging to identify this association. `peer_initial_tsn`
/// is the first TSN the peer will send, `my_initial_tsn` the first TSN this side will send, and
/// `path_count` the number of negotiated destination paths (at least one).
pub fn new_association(
    name: &str,
    options: &Options,
    peer_initial_tsn: Tsn,
    my_initial_tsn: Tsn,
    path_count: usize,
) -> Association {
    Association::new(name, options, peer_initial_tsn, my_initial_tsn, path_count)
}

pub(crate) mod math {
    macro_rules! round_up_to_4 {
        ($a: expr) => {
            ($a + 3) & !3
        };
    }

    pub(crate) use round_up_to_4;
}
