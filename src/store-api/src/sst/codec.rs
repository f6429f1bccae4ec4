// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Binary encoding of cells, block index and footer.
//!
//! A cell is encoded as
//! `row_len: u16 | row | family_len: u8 | family | qualifier_len: u16 | qualifier | timestamp: u64 | op_type: u8 | value_len: u32 | value`.

use bytes::{Buf, BufMut};
use snafu::{ensure, OptionExt};

use crate::cell::{Cell, OpType};
use crate::error::{CorruptedSnafu, FieldTooLongSnafu, Result, UnexpectedMagicSnafu};
use crate::sst::{BlockHandle, Footer, MAGIC};

fn check_len(field: &'static str, len: usize, max: usize) -> Result<()> {
    ensure!(len <= max, FieldTooLongSnafu { field, len, max });
    Ok(())
}

/// Appends the encoded `cell` to `buf`.
pub fn encode_cell(cell: &Cell, buf: &mut Vec<u8>) -> Result<()> {
    check_len("row", cell.row.len(), u16::MAX as usize)?;
    check_len("family", cell.family.len(), u8::MAX as usize)?;
    check_len("qualifier", cell.qualifier.len(), u16::MAX as usize)?;
    check_len("value", cell.value.len(), u32::MAX as usize)?;

    buf.put_u16_le(cell.row.len() as u16);
    buf.put_slice(&cell.row);
    buf.put_u8(cell.family.len() as u8);
    buf.put_slice(cell.family.as_bytes());
    buf.put_u16_le(cell.qualifier.len() as u16);
    buf.put_slice(&cell.qualifier);
    buf.put_u64_le(cell.timestamp);
    buf.put_u8(cell.op_type.as_u8());
    buf.put_u32_le(cell.value.len() as u32);
    buf.put_slice(&cell.value);

    Ok(())
}

fn take_bytes(buf: &mut &[u8], len: usize, field: &str) -> Result<Vec<u8>> {
    ensure!(
        buf.remaining() >= len,
        CorruptedSnafu {
            reason: format!("truncated {field}, need {len}, remaining {}", buf.remaining()),
        }
    );
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

fn ensure_remaining(buf: &[u8], len: usize, field: &str) -> Result<()> {
    ensure!(
        buf.len() >= len,
        CorruptedSnafu {
            reason: format!("truncated {field}"),
        }
    );
    Ok(())
}

/// Decodes one cell from the front of `buf` and advances it.
pub fn decode_cell(buf: &mut &[u8]) -> Result<Cell> {
    ensure_remaining(buf, 2, "row length")?;
    let row_len = buf.get_u16_le() as usize;
    let row = take_bytes(buf, row_len, "row")?;

    ensure_remaining(buf, 1, "family length")?;
    let family_len = buf.get_u8() as usize;
    let family = take_bytes(buf, family_len, "family")?;
    let family = String::from_utf8(family).ok().context(CorruptedSnafu {
        reason: "family is not utf8",
    })?;

    ensure_remaining(buf, 2, "qualifier length")?;
    let qualifier_len = buf.get_u16_le() as usize;
    let qualifier = take_bytes(buf, qualifier_len, "qualifier")?;

    ensure_remaining(buf, 8 + 1 + 4, "cell header")?;
    let timestamp = buf.get_u64_le();
    let op = buf.get_u8();
    let op_type = OpType::from_u8(op).context(CorruptedSnafu {
        reason: format!("unknown op type {op}"),
    })?;
    let value_len = buf.get_u32_le() as usize;
    let value = take_bytes(buf, value_len, "value")?;

    Ok(Cell {
        row,
        family,
        qualifier,
        timestamp,
        op_type,
        value,
    })
}

/// Decodes every cell of a data block.
pub fn decode_block(mut block: &[u8], expected: u32) -> Result<Vec<Cell>> {
    let mut cells = Vec::with_capacity(expected as usize);
    while block.has_remaining() {
        cells.push(decode_cell(&mut block)?);
    }
    ensure!(
        cells.len() == expected as usize,
        CorruptedSnafu {
            reason: format!(
                "block cell count mismatch, expect {expected}, actual {}",
                cells.len()
            ),
        }
    );
    Ok(cells)
}

/// Encodes the block index: `count: u32` then per block
/// `row_len: u16 | first_row | offset: u64 | size: u32 | cell_count: u32`.
pub fn encode_index(handles: &[BlockHandle]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.put_u32_le(handles.len() as u32);
    for handle in handles {
        check_len("row", handle.first_row.len(), u16::MAX as usize)?;
        buf.put_u16_le(handle.first_row.len() as u16);
        buf.put_slice(&handle.first_row);
        buf.put_u64_le(handle.offset);
        buf.put_u32_le(handle.size);
        buf.put_u32_le(handle.cell_count);
    }
    Ok(buf)
}

pub fn decode_index(mut buf: &[u8]) -> Result<Vec<BlockHandle>> {
    ensure_remaining(buf, 4, "index length")?;
    let count = buf.get_u32_le() as usize;
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        ensure_remaining(buf, 2, "index row length")?;
        let row_len = buf.get_u16_le() as usize;
        let first_row = take_bytes(&mut buf, row_len, "index row")?;
        ensure_remaining(buf, 8 + 4 + 4, "block handle")?;
        handles.push(BlockHandle {
            first_row,
            offset: buf.get_u64_le(),
            size: buf.get_u32_le(),
            cell_count: buf.get_u32_le(),
        });
    }
    ensure!(
        !buf.has_remaining(),
        CorruptedSnafu {
            reason: "trailing bytes after block index",
        }
    );
    Ok(handles)
}

pub fn encode_footer(footer: &Footer) -> Vec<u8> {
    let mut buf = Vec::with_capacity(super::FOOTER_SIZE as usize);
    buf.put_u64_le(footer.index_offset);
    buf.put_u32_le(footer.index_size);
    buf.put_u64_le(footer.meta_offset);
    buf.put_u32_le(footer.meta_size);
    buf.put_slice(MAGIC);
    buf
}

pub fn decode_footer(mut buf: &[u8]) -> Result<Footer> {
    ensure_remaining(buf, super::FOOTER_SIZE as usize, "footer")?;
    let footer = Footer {
        index_offset: buf.get_u64_le(),
        index_size: buf.get_u32_le(),
        meta_offset: buf.get_u64_le(),
        meta_size: buf.get_u32_le(),
    };
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    ensure!(&magic == MAGIC, UnexpectedMagicSnafu { magic });

    Ok(footer)
}
