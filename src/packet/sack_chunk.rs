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

use crate::packet::chunk::write_chunk_header;
use crate::packet::chunk::RawChunk;
use crate::packet::ensure;
use crate::packet::read_u16_be;
use crate::packet::read_u32_be;
use crate::packet::write_u16_be;
use crate::packet::write_u32_be;
use crate::packet::ChunkParseError;
use crate::packet::SerializableTlv;
use crate::types::Tsn;
use std::fmt;

pub const CHUNK_TYPE: u8 = 3;
pub const NR_CHUNK_TYPE: u8 = 16;

/// Selective Acknowledgement (SACK) chunk
///
/// See <https://datatracker.ietf.org/doc/html/rfc9260#section-3.3.4>.
///
/// ```txt
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 3    |  Chunk Flags  |         Chunk Length          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Cumulative TSN Ack                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Advertised Receiver Window Credit (a_rwnd)           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Number of Gap Ack Blocks = N  |  Number of Duplicate TSNs = M |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    Gap Ack Block #1 Start     |     Gap Ack Block #1 End      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                              ...                              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                        Duplicate TSN 1..M                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The NR-SACK variant (type 16, from draft-natarajan-tsvwg-sctp-nrsack) carries a second list of
/// gap-ack-blocks whose acknowledgements are non-renegable; it parses into the same structure with
/// `nr_gap_ack_blocks` populated:
///
/// ```txt
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Type = 16   |  Chunk Flags  |         Chunk Length          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Cumulative TSN Ack                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Advertised Receiver Window Credit (a_rwnd)           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Number of Gap Ack Blocks = N  | Number of NR Gap Ack Blocks= K|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Number of Duplicate TSNs = M |           Reserved            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Gap Ack Blocks, NR Gap Ack Blocks, Duplicate TSNs ...        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct GapAckBlock {
    pub start: u16,
    pub end: u16,
}

impl GapAckBlock {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }
}

#[derive(Debug)]
pub struct SackChunk {
    pub cumulative_tsn_ack: Tsn,
    pub a_rwnd: u32,
    pub gap_ack_blocks: Vec<GapAckBlock>,

    /// Non-renegable gap-ack-blocks. Empty for plain SACKs; populated when parsing an NR-SACK.
    pub nr_gap_ack_blocks: Vec<GapAckBlock>,

    pub duplicate_tsns: Vec<Tsn>,
}

fn read_gap_blocks(data: &[u8]) -> Vec<GapAckBlock> {
    data.chunks_exact(4)
        .map(|c| {
            let start = read_u16_be!(&c[0..2]);
            let end = read_u16_be!(&c[2..4]);
            GapAckBlock { start, end }
        })
        .collect()
}

impl TryFrom<RawChunk<'_>> for SackChunk {
    type Error = ChunkParseError;

    fn try_from(raw: RawChunk<'_>) -> Result<Self, ChunkParseError> {
        match raw.typ {
            CHUNK_TYPE => {
                ensure!(raw.value.len() >= 12, ChunkParseError::InvalidLength);

                let cumulative_tsn_ack = Tsn(read_u32_be!(&raw.value[0..4]));
                let a_rwnd = read_u32_be!(&raw.value[4..8]);
                let nbr_of_gap_blocks = read_u16_be!(&raw.value[8..10]) as usize;
                let nbr_of_dup_tsns = read_u16_be!(&raw.value[10..12]) as usize;

                ensure!(
                    raw.value.len() == 12 + nbr_of_gap_blocks * 4 + nbr_of_dup_tsns * 4,
                    ChunkParseError::InvalidLength
                );

                let gap_blocks_end = 12 + nbr_of_gap_blocks * 4;
                let gap_ack_blocks = read_gap_blocks(&raw.value[12..gap_blocks_end]);
                let duplicate_tsns = raw.value[gap_blocks_end..]
                    .chunks_exact(4)
                    .map(|c| Tsn(read_u32_be!(c)))
                    .collect();

                Ok(Self {
                    cumulative_tsn_ack,
                    a_rwnd,
                    gap_ack_blocks,
                    nr_gap_ack_blocks: vec![],
                    duplicate_tsns,
                })
            }
            NR_CHUNK_TYPE => {
                ensure!(raw.value.len() >= 16, ChunkParseError::InvalidLength);

                let cumulative_tsn_ack = Tsn(read_u32_be!(&raw.value[0..4]));
                let a_rwnd = read_u32_be!(&raw.value[4..8]);
                let nbr_of_gap_blocks = read_u16_be!(&raw.value[8..10]) as usize;
                let nbr_of_nr_gap_blocks = read_u16_be!(&raw.value[10..12]) as usize;
                let nbr_of_dup_tsns = read_u16_be!(&raw.value[12..14]) as usize;

                ensure!(
                    raw.value.len()
                        == 16 + (nbr_of_gap_blocks + nbr_of_nr_gap_blocks + nbr_of_dup_tsns) * 4,
                    ChunkParseError::InvalidLength
                );

                let gap_blocks_end = 16 + nbr_of_gap_blocks * 4;
                let nr_gap_blocks_end = gap_blocks_end + nbr_of_nr_gap_blocks * 4;
                let gap_ack_blocks = read_gap_blocks(&raw.value[16..gap_blocks_end]);
                let nr_gap_ack_blocks =
                    read_gap_blocks(&raw.value[gap_blocks_end..nr_gap_blocks_end]);
                let duplicate_tsns = raw.value[nr_gap_blocks_end..]
                    .chunks_exact(4)
                    .map(|c| Tsn(read_u32_be!(c)))
                    .collect();

                Ok(Self {
                    cumulative_tsn_ack,
                    a_rwnd,
                    gap_ack_blocks,
                    nr_gap_ack_blocks,
                    duplicate_tsns,
                })
            }
            _ => Err(ChunkParseError::InvalidType),
        }
    }
}

impl SerializableTlv for SackChunk {
    fn serialize_to(&self, output: &mut [u8]) {
        if self.nr_gap_ack_blocks.is_empty() {
            let value = write_chunk_header(CHUNK_TYPE, 0, self.value_size(), output);
            write_u32_be!(&mut value[0..4], self.cumulative_tsn_ack.0);
            write_u32_be!(&mut value[4..8], self.a_rwnd);
            write_u16_be!(&mut value[8..10], self.gap_ack_blocks.len() as u16);
            write_u16_be!(&mut value[10..12], self.duplicate_tsns.len() as u16);

            let gap_blocks_end = 12 + self.gap_ack_blocks.len() * 4;
            write_gap_blocks(&self.gap_ack_blocks, &mut value[12..gap_blocks_end]);

            let mut chunks = value[gap_blocks_end..].chunks_exact_mut(4);
            for (dup_tsn, chunk) in self.duplicate_tsns.iter().zip(&mut chunks) {
                write_u32_be!(chunk, dup_tsn.0);
            }
        } else {
            let value = write_chunk_header(NR_CHUNK_TYPE, 0, self.value_size(), output);
            write_u32_be!(&mut value[0..4], self.cumulative_tsn_ack.0);
            write_u32_be!(&mut value[4..8], self.a_rwnd);
            write_u16_be!(&mut value[8..10], self.gap_ack_blocks.len() as u16);
            write_u16_be!(&mut value[10..12], self.nr_gap_ack_blocks.len() as u16);
            write_u16_be!(&mut value[12..14], self.duplicate_tsns.len() as u16);
            write_u16_be!(&mut value[14..16], 0_u16);

            let gap_blocks_end = 16 + self.gap_ack_blocks.len() * 4;
            let nr_gap_blocks_end = gap_blocks_end + self.nr_gap_ack_blocks.len() * 4;
            write_gap_blocks(&self.gap_ack_blocks, &mut value[16..gap_blocks_end]);
            write_gap_blocks(&self.nr_gap_ack_blocks, &mut value[gap_blocks_end..nr_gap_blocks_end]);

            let mut chunks = value[nr_gap_blocks_end..].chunks_exact_mut(4);
            for (dup_tsn, chunk) in self.duplicate_tsns.iter().zip(&mut chunks) {
                write_u32_be!(chunk, dup_tsn.0);
            }
        }
    }

    fn value_size(&self) -> usize {
        if self.nr_gap_ack_blocks.is_empty() {
            12 + self.gap_ack_blocks.len() * 4 + self.duplicate_tsns.len() * 4
        } else {
            16 + (self.gap_ack_blocks.len()
                + self.nr_gap_ack_blocks.len()
                + self.duplicate_tsns.len())
                * 4
        }
    }
}

fn write_gap_blocks(blocks: &[GapAckBlock], output: &mut [u8]) {
    let mut chunks = output.chunks_exact_mut(4);
    for (block, chunk) in blocks.iter().zip(&mut chunks) {
        write_u16_be!(&mut chunk[0..2], block.start);
        write_u16_be!(&mut chunk[2..4], block.end);
    }
}

impl fmt::Display for SackChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nr_gap_ack_blocks.is_empty() {
            write!(f, "SACK, cum_ack_tsn={}, a_rwnd={}", self.cumulative_tsn_ack, self.a_rwnd)
        } else {
            write!(f, "NR-SACK, cum_ack_tsn={}, a_rwnd={}", self.cumulative_tsn_ack, self.a_rwnd)
        }
    }
}
