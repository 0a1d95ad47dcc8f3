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

use crate::packet::invalid_stream_identifier_error_cause::InvalidStreamIdentifierErrorCause;
use crate::packet::invalid_stream_identifier_error_cause::{self};
use crate::packet::out_of_resource_error_cause::OutOfResourceErrorCause;
use crate::packet::out_of_resource_error_cause::{self};
use crate::packet::parameter::RawParameter;
use crate::packet::protocol_violation_error_cause::ProtocolViolationErrorCause;
use crate::packet::protocol_violation_error_cause::{self};
use crate::packet::ChunkParseError;
use crate::packet::SerializableTlv;
use std::fmt;

/// The error causes this engine can emit (in ERROR and ABORT chunks). The surrounding codec layer
/// wraps them into chunks; causes it receives from the peer are its own concern.
#[derive(Debug)]
pub enum ErrorCause {
    InvalidStreamIdentifier(InvalidStreamIdentifierErrorCause),
    OutOfResource(OutOfResourceErrorCause),
    ProtocolViolation(ProtocolViolationErrorCause),
}

impl ErrorCause {
    pub fn as_serializable(&self) -> &dyn SerializableTlv {
        match self {
            ErrorCause::InvalidStreamIdentifier(c) => c,
            ErrorCause::OutOfResource(c) => c,
            ErrorCause::ProtocolViolation(c) => c,
        }
    }
}

impl TryFrom<RawParameter<'_>> for ErrorCause {
    type Error = ChunkParseError;

    fn try_from(raw: RawParameter<'_>) -> Result<Self, ChunkParseError> {
        match raw.typ {
            invalid_stream_identifier_error_cause::CAUSE_CODE => {
                InvalidStreamIdentifierErrorCause::try_from(raw)
                    .map(ErrorCause::InvalidStreamIdentifier)
            }
            out_of_resource_error_cause::CAUSE_CODE => {
                OutOfResourceErrorCause::try_from(raw).map(ErrorCause::OutOfResource)
            }
            protocol_violation_error_cause::CAUSE_CODE => {
                ProtocolViolationErrorCause::try_from(raw).map(ErrorCause::ProtocolViolation)
            }
            _ => Err(ChunkParseError::InvalidType),
        }
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCause::InvalidStreamIdentifier(c) => c.fmt(f),
            ErrorCause::OutOfResource(c) => c.fmt(f),
            ErrorCause::ProtocolViolation(c) => c.fmt(f),
        }
    }
}

impl ErrorCause {
    /// Shorthand used all over the engine when aborting on peer misbehavior.
    pub fn protocol_violation(information: &str) -> ErrorCause {
        ErrorCause::ProtocolViolation(ProtocolViolationErrorCause {
            information: information.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StreamId;

    #[test]
    fn roundtrips_through_raw_parameter() {
        let causes = [
            ErrorCause::InvalidStreamIdentifier(InvalidStreamIdentifierErrorCause {
                stream_id: StreamId(3),
            }),
            ErrorCause::OutOfResource(OutOfResourceErrorCause {}),
            ErrorCause::protocol_violation("gap block out of order"),
        ];

        for cause in causes {
            let tlv = cause.as_serializable();
            let mut serialized = vec![0; tlv.serialized_size()];
            tlv.serialize_to(&mut serialized);

            let parsed =
                ErrorCause::try_from(RawParameter::from_bytes(&serialized).unwrap().0).unwrap();
            assert_eq!(parsed.to_string(), cause.to_string());
        }
    }
}
