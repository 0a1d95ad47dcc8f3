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
use crate::packet::ensure;
use crate::packet::parameter::write_parameter_header;
use crate::packet::parameter::RawParameter;
use crate::packet::read_u16_be;
use crate::packet::write_u16_be;
use crate::packet::ChunkParseError;
use crate::packet::SerializableTlv;
use std::fmt;

pub(crate) const CAUSE_CODE: u16 = 1;

/// Invalid Stream Identifier error cause
///
/// See <https://datatracker.ietf.org/doc/html/rfc9260#section-3.3.10.1>.
///
/// ```txt
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Cause Code = 1         |        Cause Length = 8     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        Stream Identifier        |         (Reserved)          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug)]
pub struct InvalidStreamIdentifierErrorCause {
    pub stream_id: StreamId,
}

impl TryFrom<RawParameter<'_>> for InvalidStreamIdentifierErrorCause {
    type Error = ChunkParseError;

    fn try_from(raw: RawParameter<'_>) -> Result<Self, ChunkParseError> {
        ensure!(raw.typ == CAUSE_CODE, ChunkParseError::InvalidType);
        ensure!(raw.value.len() == 4, ChunkParseError::InvalidLength);
        Ok(Self { stream_id: StreamId(read_u16_be!(&raw.value[0..2])) })
    }
}

impl SerializableTlv for InvalidStreamIdentifierErrorCause {
    fn serialize_to(&self, output: &mut [u8]) {
        let value = write_parameter_header(CAUSE_CODE, self.value_size(), output);
        write_u16_be!(&mut value[0..2], self.stream_id.0);
        write_u16_be!(&mut value[2..4], 0_u16);
    }

    fn value_size(&self) -> usize {
        4
    }
}

impl fmt::Display for InvalidStreamIdentifierErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid Stream Identifier, stream_id={}", self.stream_id)
    }
}
