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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use snafu::{ensure, ResultExt};

use crate::cell::{Cell, OpType};
use crate::error::{EncodeMetaSnafu, FamilyMismatchSnafu, IoSnafu, OutOfOrderSnafu, Result};
use crate::sst::codec::{encode_cell, encode_footer, encode_index};
use crate::sst::{BlockHandle, Footer, SstInfo, SstMeta};

/// Writes cells of one column family into a region file.
///
/// Cells must be appended in non-decreasing `(row, qualifier, timestamp)` order.
pub struct SstWriter<W> {
    writer: W,
    block_size: usize,
    /// Encoded cells of the current block.
    block: Vec<u8>,
    block_first_row: Vec<u8>,
    block_cells: u32,
    /// Bytes written so far.
    offset: u64,
    handles: Vec<BlockHandle>,
    last_key: Option<(Vec<u8>, Vec<u8>, u64)>,
    meta: SstMeta,
}

impl<W: Write> SstWriter<W> {
    pub fn new(writer: W, family: impl Into<String>, block_size: usize) -> Self {
        Self {
            writer,
            block_size: block_size.max(1),
            block: Vec::new(),
            block_first_row: Vec::new(),
            block_cells: 0,
            offset: 0,
            handles: Vec::new(),
            last_key: None,
            meta: SstMeta {
                family: family.into(),
                ..Default::default()
            },
        }
    }

    pub fn family(&self) -> &str {
        &self.meta.family
    }

    /// Number of cells appended so far.
    pub fn cell_count(&self) -> u64 {
        self.meta.cell_count
    }

    /// Appends a cell. Fails if the cell belongs to another family or sorts
    /// before the previous cell.
    pub fn append(&mut self, cell: &Cell) -> Result<()> {
        ensure!(
            cell.family == self.meta.family,
            FamilyMismatchSnafu {
                expected: &self.meta.family,
                actual: &cell.family,
            }
        );
        if let Some(last) = &self.last_key {
            let prev = (last.0.as_slice(), last.1.as_slice(), last.2);
            ensure!(
                prev <= cell.sort_key(),
                OutOfOrderSnafu {
                    prev: format_key(prev),
                    current: format_key(cell.sort_key()),
                }
            );
        }

        if self.block_cells == 0 {
            self.block_first_row.clone_from(&cell.row);
        }
        encode_cell(cell, &mut self.block)?;
        self.block_cells += 1;

        self.meta.cell_count += 1;
        match cell.op_type {
            OpType::Put => self.meta.put_count += 1,
            OpType::DeleteColumn => self.meta.delete_count += 1,
        }
        if self.meta.first_row.is_none() {
            self.meta.first_row = Some(String::from_utf8_lossy(&cell.row).to_string());
        }
        match &mut self.last_key {
            Some((row, qualifier, ts)) => {
                if *row != cell.row {
                    row.clone_from(&cell.row);
                }
                qualifier.clone_from(&cell.qualifier);
                *ts = cell.timestamp;
            }
            None => {
                self.last_key = Some((cell.row.clone(), cell.qualifier.clone(), cell.timestamp));
            }
        }

        if self.block.len() >= self.block_size {
            self.flush_block()?;
        }

        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_cells == 0 {
            return Ok(());
        }

        self.writer.write_all(&self.block).context(IoSnafu)?;
        self.handles.push(BlockHandle {
            first_row: std::mem::take(&mut self.block_first_row),
            offset: self.offset,
            size: self.block.len() as u32,
            cell_count: self.block_cells,
        });
        self.offset += self.block.len() as u64;
        self.block.clear();
        self.block_cells = 0;

        Ok(())
    }

    /// Writes the pending block, the index, the metadata and the footer, then
    /// flushes the underlying writer.
    pub fn finish(mut self) -> Result<SstInfo> {
        self.flush_block()?;

        self.meta.last_row = self
            .last_key
            .as_ref()
            .map(|(row, _, _)| String::from_utf8_lossy(row).to_string());
        self.meta.created_at_ms = chrono::Utc::now().timestamp_millis();

        let index = encode_index(&self.handles)?;
        let index_offset = self.offset;
        self.writer.write_all(&index).context(IoSnafu)?;
        self.offset += index.len() as u64;

        let meta = serde_json::to_vec(&self.meta).context(EncodeMetaSnafu)?;
        let meta_offset = self.offset;
        self.writer.write_all(&meta).context(IoSnafu)?;
        self.offset += meta.len() as u64;

        let footer = encode_footer(&Footer {
            index_offset,
            index_size: index.len() as u32,
            meta_offset,
            meta_size: meta.len() as u32,
        });
        self.writer.write_all(&footer).context(IoSnafu)?;
        self.offset += footer.len() as u64;
        self.writer.flush().context(IoSnafu)?;

        Ok(SstInfo {
            path: None,
            file_size: self.offset,
            meta: self.meta,
        })
    }
}

fn format_key((row, qualifier, ts): (&[u8], &[u8], u64)) -> String {
    format!(
        "{}:{}@{}",
        String::from_utf8_lossy(row),
        String::from_utf8_lossy(qualifier),
        ts
    )
}

/// A writer of a region file on local disk.
pub struct FileSstWriter {
    path: std::path::PathBuf,
    inner: SstWriter<BufWriter<File>>,
}

/// Creates a region file at `path`, failing if the file already exists.
pub fn create_file(
    path: impl AsRef<Path>,
    family: impl Into<String>,
    block_size: usize,
) -> Result<FileSstWriter> {
    let path = path.as_ref().to_path_buf();
    let file = File::options()
        .write(true)
        .create_new(true)
        .open(&path)
        .context(IoSnafu)?;

    Ok(FileSstWriter {
        path,
        inner: SstWriter::new(BufWriter::new(file), family, block_size),
    })
}

impl FileSstWriter {
    pub fn append(&mut self, cell: &Cell) -> Result<()> {
        self.inner.append(cell)
    }

    pub fn cell_count(&self) -> u64 {
        self.inner.cell_count()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finishes the file.
    pub fn finish(self) -> Result<SstInfo> {
        let FileSstWriter { path, inner } = self;
        let mut info = inner.finish()?;
        info.path = Some(path);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn put(row: &str, qualifier: &str, ts: u64) -> Cell {
        Cell::put(row.as_bytes().to_vec(), "cf", qualifier, ts, vec![1])
    }

    #[test]
    fn test_reject_out_of_order() {
        let mut writer = SstWriter::new(Vec::new(), "cf", 1024);
        writer.append(&put("user_0000000002", "segment_v1", 1)).unwrap();
        // Same key is allowed.
        writer.append(&put("user_0000000002", "segment_v1", 1)).unwrap();
        writer.append(&put("user_0000000002", "segment_v2", 1)).unwrap();

        let err = writer
            .append(&put("user_0000000001", "segment_v1", 1))
            .unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { .. }));
        assert!(err.to_string().contains("user_0000000002:segment_v2@1"));

        let err = writer
            .append(&put("user_0000000002", "segment_v1", 2))
            .unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { .. }));
        assert_eq!(3, writer.cell_count());
    }

    #[test]
    fn test_reject_other_family() {
        let mut writer = SstWriter::new(Vec::new(), "cf", 1024);
        let cell = Cell::put(b"user_0000000001".to_vec(), "other", "q", 1, vec![]);
        let err = writer.append(&cell).unwrap_err();
        assert!(matches!(err, Error::FamilyMismatch { .. }));
    }

    #[test]
    fn test_finish_counts() {
        let mut writer = SstWriter::new(Vec::new(), "cf", 16);
        writer
            .append(&Cell::delete_column(
                b"user_0000000001".to_vec(),
                "cf",
                "segment_v1",
                1,
            ))
            .unwrap();
        writer.append(&put("user_0000000001", "segment_v2", 1)).unwrap();
        writer.append(&put("user_0000000003", "segment_v2", 1)).unwrap();
        let info = writer.finish().unwrap();

        assert_eq!(3, info.meta.cell_count);
        assert_eq!(2, info.meta.put_count);
        assert_eq!(1, info.meta.delete_count);
        assert_eq!(Some("user_0000000001"), info.meta.first_row.as_deref());
        assert_eq!(Some("user_0000000003"), info.meta.last_row.as_deref());
        assert!(info.path.is_none());
    }

    #[test]
    fn test_create_file_twice() {
        let dir = common_test_util::temp_dir::create_temp_dir("test_create_file_twice");
        let path = dir.path().join("region_0.hfile");
        let writer = create_file(&path, "cf", 1024).unwrap();
        let info = writer.finish().unwrap();
        assert_eq!(Some(path.clone()), info.path);
        assert_eq!(info.file_size, std::fs::metadata(&path).unwrap().len());

        let err = create_file(&path, "cf", 1024).err().unwrap();
        assert!(matches!(err, Error::Io { .. }));
    }
}
