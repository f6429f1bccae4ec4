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

//! Region file format.
//!
//! ```text
//! +------------+-----+------------+-------------+----------+--------+
//! | data block | ... | data block | block index | metadata | footer |
//! +------------+-----+------------+-------------+----------+--------+
//! ```
//!
//! - A data block is a sequence of encoded cells, see [codec].
//! - The block index holds the first row, offset, size and cell count of each block.
//! - The metadata is a JSON encoded [SstMeta].
//! - The footer is `index_offset: u64 | index_size: u32 | meta_offset: u64 | meta_size: u32 | magic`,
//!   integers in little endian.

pub mod codec;
pub mod reader;
pub mod writer;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use crate::sst::reader::{open_file, SstReader};
pub use crate::sst::writer::{create_file, SstWriter};

/// Magic bytes at the end of a region file.
pub const MAGIC: &[u8; 4] = b"RSF1";

/// Size of the footer in bytes.
pub const FOOTER_SIZE: u64 = 8 + 4 + 8 + 4 + 4;

/// Default target size of a data block.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Location of a data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHandle {
    pub first_row: Vec<u8>,
    pub offset: u64,
    pub size: u32,
    pub cell_count: u32,
}

/// Metadata stored in a region file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SstMeta {
    pub family: String,
    pub cell_count: u64,
    pub put_count: u64,
    pub delete_count: u64,
    pub first_row: Option<String>,
    pub last_row: Option<String>,
    /// Creation time in milliseconds since the epoch.
    pub created_at_ms: i64,
}

/// Summary of a finished region file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstInfo {
    pub path: Option<PathBuf>,
    pub file_size: u64,
    pub meta: SstMeta,
}

/// Footer of a region file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: u64,
    pub index_size: u32,
    pub meta_offset: u64,
    pub meta_size: u32,
}
