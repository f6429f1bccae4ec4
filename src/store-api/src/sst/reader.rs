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
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use snafu::{ensure, ResultExt};

use crate::cell::Cell;
use crate::error::{
    DecodeMetaSnafu, FileTooSmallSnafu, IoSnafu, Result, UnexpectedOffsetSizeSnafu,
};
use crate::sst::codec::{decode_block, decode_footer, decode_index};
use crate::sst::{BlockHandle, Footer, SstMeta, FOOTER_SIZE};

/// Reads a region file.
pub struct SstReader<R> {
    source: R,
    file_size: u64,
    footer: Footer,
    handles: Vec<BlockHandle>,
    meta: SstMeta,
}

impl<R: Read + Seek> SstReader<R> {
    /// Reads and validates the footer, the block index and the metadata.
    pub fn new(mut source: R) -> Result<Self> {
        let file_size = source.seek(SeekFrom::End(0)).context(IoSnafu)?;
        ensure!(file_size >= FOOTER_SIZE, FileTooSmallSnafu { size: file_size });

        let footer_buf = read_at(&mut source, file_size - FOOTER_SIZE, FOOTER_SIZE as usize)?;
        let footer = decode_footer(&footer_buf)?;

        let payload_limit = file_size - FOOTER_SIZE;
        for (offset, size) in [
            (footer.index_offset, footer.index_size as u64),
            (footer.meta_offset, footer.meta_size as u64),
        ] {
            ensure!(
                offset.checked_add(size).is_some_and(|end| end <= payload_limit),
                UnexpectedOffsetSizeSnafu {
                    offset,
                    size,
                    file_size,
                }
            );
        }

        let index_buf = read_at(&mut source, footer.index_offset, footer.index_size as usize)?;
        let handles = decode_index(&index_buf)?;
        for handle in &handles {
            ensure!(
                handle
                    .offset
                    .checked_add(handle.size as u64)
                    .is_some_and(|end| end <= footer.index_offset),
                UnexpectedOffsetSizeSnafu {
                    offset: handle.offset,
                    size: handle.size as u64,
                    file_size,
                }
            );
        }

        let meta_buf = read_at(&mut source, footer.meta_offset, footer.meta_size as usize)?;
        let meta: SstMeta = serde_json::from_slice(&meta_buf).context(DecodeMetaSnafu)?;

        Ok(Self {
            source,
            file_size,
            footer,
            handles,
            meta,
        })
    }

    pub fn meta(&self) -> &SstMeta {
        &self.meta
    }

    pub fn handles(&self) -> &[BlockHandle] {
        &self.handles
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    /// Reads all cells of the `i`-th block.
    pub fn read_block(&mut self, i: usize) -> Result<Vec<Cell>> {
        let handle = &self.handles[i];
        let (offset, size, cell_count) = (handle.offset, handle.size, handle.cell_count);
        let buf = read_at(&mut self.source, offset, size as usize)?;
        decode_block(&buf, cell_count)
    }

    /// Returns all cells of `row` in file order.
    pub fn get_row(&mut self, row: &[u8]) -> Result<Vec<Cell>> {
        // A row may span blocks, start from the last block that begins before it.
        let start = self
            .handles
            .partition_point(|h| h.first_row.as_slice() < row)
            .saturating_sub(1);

        let mut cells = Vec::new();
        for i in start..self.handles.len() {
            if self.handles[i].first_row.as_slice() > row {
                break;
            }
            let block = self.read_block(i)?;
            let mut past_row = false;
            for cell in block {
                match cell.row.as_slice().cmp(row) {
                    std::cmp::Ordering::Less => {}
                    std::cmp::Ordering::Equal => cells.push(cell),
                    std::cmp::Ordering::Greater => {
                        past_row = true;
                        break;
                    }
                }
            }
            if past_row {
                break;
            }
        }

        Ok(cells)
    }

    /// Turns the reader into an iterator of cells, loading one block at a time.
    pub fn into_cells(self) -> CellIter<R> {
        CellIter {
            reader: self,
            next_block: 0,
            buffered: Vec::new().into_iter(),
        }
    }
}

/// Iterator over the cells of a region file.
pub struct CellIter<R> {
    reader: SstReader<R>,
    next_block: usize,
    buffered: std::vec::IntoIter<Cell>,
}

impl<R: Read + Seek> Iterator for CellIter<R> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cell) = self.buffered.next() {
                return Some(Ok(cell));
            }
            if self.next_block >= self.reader.handles.len() {
                return None;
            }
            let i = self.next_block;
            self.next_block += 1;
            match self.reader.read_block(i) {
                Ok(cells) => self.buffered = cells.into_iter(),
                Err(e) => {
                    self.next_block = self.reader.handles.len();
                    return Some(Err(e));
                }
            }
        }
    }
}

fn read_at<R: Read + Seek>(source: &mut R, offset: u64, len: usize) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset)).context(IoSnafu)?;
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf).context(IoSnafu)?;
    Ok(buf)
}

/// Opens the region file at `path`.
pub fn open_file(path: impl AsRef<Path>) -> Result<SstReader<BufReader<File>>> {
    let file = File::open(path.as_ref()).context(IoSnafu)?;
    SstReader::new(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::error::Error;
    use crate::row_key::encode_row_key;
    use crate::sst::codec::{encode_footer, encode_index};
    use crate::sst::SstWriter;

    fn write_file(cells: &[Cell], block_size: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = SstWriter::new(&mut buf, "cf", block_size);
        for cell in cells {
            writer.append(cell).unwrap();
        }
        writer.finish().unwrap();
        buf
    }

    fn segment_cells(ids: impl Iterator<Item = u32>) -> Vec<Cell> {
        let mut cells = Vec::new();
        for id in ids {
            let row = encode_row_key(id);
            cells.push(Cell::delete_column(row.clone(), "cf", "segment_v1", 1));
            cells.push(Cell::put(row, "cf", "segment_v2", 1, 1i32.to_be_bytes().to_vec()));
        }
        cells
    }

    #[test]
    fn test_read_all_cells() {
        let cells = segment_cells(0..1000);
        let buf = write_file(&cells, 256);

        let reader = SstReader::new(Cursor::new(buf)).unwrap();
        assert!(reader.handles().len() > 1);
        assert_eq!(2000, reader.meta().cell_count);
        assert_eq!(1000, reader.meta().delete_count);
        assert_eq!("cf", reader.meta().family);

        let read = reader.into_cells().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(cells, read);
    }

    #[test]
    fn test_empty_file() {
        let buf = write_file(&[], 256);
        let reader = SstReader::new(Cursor::new(buf)).unwrap();
        assert!(reader.handles().is_empty());
        assert_eq!(0, reader.meta().cell_count);
        assert!(reader.meta().first_row.is_none());
        assert_eq!(0, reader.into_cells().count());
    }

    #[test]
    fn test_get_row() {
        // Tiny blocks so that the cells of one row span blocks.
        let cells = segment_cells((0..500).map(|i| i * 2));
        let buf = write_file(&cells, 40);
        let mut reader = SstReader::new(Cursor::new(buf)).unwrap();

        for id in [0u32, 2, 500, 998] {
            let row = reader.get_row(&encode_row_key(id)).unwrap();
            assert_eq!(2, row.len(), "id: {id}");
            assert_eq!(b"segment_v1".to_vec(), row[0].qualifier);
            assert_eq!(b"segment_v2".to_vec(), row[1].qualifier);
        }
        for id in [1u32, 501, 999, 10_000] {
            assert!(reader.get_row(&encode_row_key(id)).unwrap().is_empty());
        }
    }

    #[test]
    fn test_invalid_file() {
        let err = SstReader::new(Cursor::new(vec![0u8; 10])).err().unwrap();
        assert!(matches!(err, Error::FileTooSmall { size: 10, .. }));

        let mut buf = write_file(&segment_cells(0..10), 256);
        let len = buf.len();
        buf[len - 1] = b'X';
        let err = SstReader::new(Cursor::new(buf)).err().unwrap();
        assert!(matches!(err, Error::UnexpectedMagic { .. }));

        // Corrupt the index offset.
        let mut buf = write_file(&segment_cells(0..10), 256);
        let footer_start = buf.len() - FOOTER_SIZE as usize;
        buf[footer_start..footer_start + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        let err = SstReader::new(Cursor::new(buf)).err().unwrap();
        assert!(matches!(err, Error::UnexpectedOffsetSize { .. }));
    }

    /// Builds a file holding no block but an index with `handle`.
    fn file_with_handle(handle: BlockHandle) -> Vec<u8> {
        let index = encode_index(&[handle]).unwrap();
        let meta = serde_json::to_vec(&SstMeta {
            family: "cf".to_string(),
            ..Default::default()
        })
        .unwrap();
        let footer = Footer {
            index_offset: 0,
            index_size: index.len() as u32,
            meta_offset: index.len() as u64,
            meta_size: meta.len() as u32,
        };
        let mut buf = index;
        buf.extend_from_slice(&meta);
        buf.extend_from_slice(&encode_footer(&footer));
        buf
    }

    #[test]
    fn test_block_handle_out_of_range() {
        for (offset, size) in [(u64::MAX, 16), (u64::MAX - 3, 4), (0, 1)] {
            let buf = file_with_handle(BlockHandle {
                first_row: encode_row_key(1),
                offset,
                size,
                cell_count: 1,
            });
            let err = SstReader::new(Cursor::new(buf)).err().unwrap();
            assert!(
                matches!(err, Error::UnexpectedOffsetSize { .. }),
                "offset: {offset}, size: {size}"
            );
        }
    }

    #[test]
    fn test_open_file() {
        let dir = common_test_util::temp_dir::create_temp_dir("test_open_file");
        let path = dir.path().join("region_0.hfile");
        let mut writer = crate::sst::create_file(&path, "cf", 1024).unwrap();
        for cell in segment_cells(5..8) {
            writer.append(&cell).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = open_file(&path).unwrap();
        assert_eq!(6, reader.meta().cell_count);
        assert_eq!(2, reader.get_row(&encode_row_key(6)).unwrap().len());
    }
}
