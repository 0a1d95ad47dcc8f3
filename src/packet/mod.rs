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

//! Wire codecs for the chunks and error causes this engine consumes and produces.
//!
//! The full packet assembler (common header, checksum, bundling) is the surrounding layer's
//! concern; this module only knows the byte-exact layouts of DATA, SACK, NR-SACK and FORWARD-TSN
//! chunks plus the error causes the engine reports.

use thiserror::Error;

pub mod chunk;
pub mod data;
pub mod data_chunk;
pub mod error_causes;
pub mod forward_tsn_chunk;
pub mod invalid_stream_identifier_error_cause;
pub mod out_of_resource_error_cause;
pub mod parameter;
pub mod protocol_violation_error_cause;
pub mod sack_chunk;

/// Size of the Type-Length-Value header, used by chunks, parameters and error causes.
pub(crate) const TLV_HEADER_SIZE: usize = 4;

macro_rules! ensure {
    ($cond: expr, $err: expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}

macro_rules! read_u16_be {
    ($buf: expr) => {
        u16::from_be_bytes($buf[..2].try_into().unwrap())
    };
}

macro_rules! read_u32_be {
    ($buf: expr) => {
        u32::from_be_bytes($buf[..4].try_into().unwrap())
    };
}

macro_rules! write_u16_be {
    ($buf: expr, $n: expr) => {
        $buf[..2].copy_from_slice(&($n as u16).to_be_bytes());
    };
}

macro_rules! write_u32_be {
    ($buf: expr, $n: expr) => {
        $buf[..4].copy_from_slice(&($n as u32).to_be_bytes());
    };
}

pub(crate) use ensure;
pub(crate) use read_u16_be;
pub(crate) use read_u32_be;
pub(crate) use write_u16_be;
pub(crate) use write_u32_be;

use crate::api::StreamId;
use crate::types::Ssn;

/// One (stream, SSN) abandonment pair carried in a FORWARD-TSN chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkippedStream {
    pub stream_id: StreamId,
    pub ssn: Ssn,
}

/// Trait for serialization/deserialization methods on TLV data types (chunks, parameters, error
/// causes) that have the same framing, but handle metadata (type, flags etc) differently.
pub trait SerializableTlv {
    /// Serializes this TLV object to a byte array. Callers are expected to call
    /// [`Self::serialized_size`] prior to calling this method, to ensure that `output` is large
    /// enough.
    fn serialize_to(&self, output: &mut [u8]);

    /// Returns how many bytes of value payload this TLV object has, which together with the TLV
    /// header size becomes the full serialized size.
    fn value_size(&self) -> usize;

    /// Returns the number of bytes this TLV object serializes to.
    fn serialized_size(&self) -> usize {
        TLV_HEADER_SIZE + self.value_size()
    }
}

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ChunkParseError {
    #[error("The TLV data has an invalid length field, or payload size")]
    InvalidLength,

    #[error("Unexpected TLV type")]
    InvalidType,

    #[error("Invalid value")]
    InvalidValue,
}
