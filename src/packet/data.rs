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
use crate::api::StreamId;
use crate::types::Ssn;
use crate::types::StreamKey;

/// Represents data extracted from a received DATA chunk.
///
/// This is the same information the DATA chunk carries, minus the TSN (which travels next to this
/// structure through the engine), so that the reassembly and reordering components don't need to
/// know the wire layout.
#[derive(Clone, Debug)]
pub struct Data {
    pub stream_key: StreamKey,
    pub ssn: Ssn,
    pub ppid: PpId,
    pub payload: Vec<u8>,
    pub is_beginning: bool,
    pub is_end: bool,
}

impl Data {
    /// A complete, unfragmented message.
    pub fn is_complete(&self) -> bool {
        self.is_beginning && self.is_end
    }
}

impl Default for Data {
    fn default() -> Self {
        Self {
            stream_key: StreamKey::Ordered(StreamId(0)),
            ssn: Ssn(0),
            ppid: PpId(0),
            payload: Default::default(),
            is_beginning: false,
            is_end: false,
        }
    }
}
