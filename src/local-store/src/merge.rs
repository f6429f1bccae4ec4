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

//! Merges cells of several region files by row.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use store_api::cell::Cell;

use crate::resolve::SequencedCell;

pub(crate) type BoxedCellIter = Box<dyn Iterator<Item = store_api::error::Result<Cell>> + Send>;

/// Yields all cells of each row across sources, rows in ascending order.
pub(crate) struct RowMerger {
    heap: BinaryHeap<Node>,
}

impl RowMerger {
    /// `sources` are `(sequence, cells)` pairs, cells sorted within each source.
    pub(crate) fn new(
        sources: Vec<(u64, BoxedCellIter)>,
    ) -> store_api::error::Result<RowMerger> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (index, (sequence, source)) in sources.into_iter().enumerate() {
            if let Some(node) = Node::new(index, sequence, source)? {
                heap.push(node);
            }
        }
        Ok(RowMerger { heap })
    }

    /// Returns the next row key and its cells.
    pub(crate) fn next_row(
        &mut self,
    ) -> store_api::error::Result<Option<(Vec<u8>, Vec<SequencedCell>)>> {
        let Some(row) = self.heap.peek().map(|node| node.current.row.clone()) else {
            return Ok(None);
        };

        let mut cells = Vec::new();
        while let Some(mut node) = self.heap.peek_mut() {
            if node.current.row != row {
                break;
            }
            // Drain this row from the hottest node.
            loop {
                match node.source.next().transpose()? {
                    Some(next) => {
                        let cell = std::mem::replace(&mut node.current, next);
                        cells.push(SequencedCell {
                            cell,
                            sequence: node.sequence,
                        });
                        if node.current.row != row {
                            break;
                        }
                    }
                    None => {
                        let node = std::collections::binary_heap::PeekMut::pop(node);
                        cells.push(SequencedCell {
                            cell: node.current,
                            sequence: node.sequence,
                        });
                        break;
                    }
                }
            }
        }

        Ok(Some((row, cells)))
    }
}

/// An input source positioned at its current cell.
struct Node {
    index: usize,
    sequence: u64,
    current: Cell,
    source: BoxedCellIter,
}

impl Node {
    /// Returns `None` if the source is empty.
    fn new(
        index: usize,
        sequence: u64,
        mut source: BoxedCellIter,
    ) -> store_api::error::Result<Option<Node>> {
        Ok(source.next().transpose()?.map(|current| Node {
            index,
            sequence,
            current,
            source,
        }))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.current.row == other.current.row && self.index == other.index
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Node) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Node) -> Ordering {
        // The std binary heap is a max heap, compare in reverse order to pop
        // the smallest row first, and the earlier source among equal rows.
        other
            .current
            .row
            .cmp(&self.current.row)
            .then_with(|| other.index.cmp(&self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(rows: &[(&str, &str)]) -> BoxedCellIter {
        let cells: Vec<_> = rows
            .iter()
            .map(|(row, qualifier)| Ok(Cell::put(row.as_bytes().to_vec(), "cf", *qualifier, 1, vec![])))
            .collect();
        Box::new(cells.into_iter())
    }

    fn collect_rows(mut merger: RowMerger) -> Vec<(String, Vec<(String, u64)>)> {
        let mut rows = Vec::new();
        while let Some((row, cells)) = merger.next_row().unwrap() {
            rows.push((
                String::from_utf8(row).unwrap(),
                cells
                    .into_iter()
                    .map(|c| (String::from_utf8(c.cell.qualifier).unwrap(), c.sequence))
                    .collect(),
            ));
        }
        rows
    }

    #[test]
    fn test_merge_empty() {
        let merger = RowMerger::new(vec![(1, source(&[])), (2, source(&[]))]).unwrap();
        assert!(collect_rows(merger).is_empty());
    }

    #[test]
    fn test_merge_overlapping() {
        let merger = RowMerger::new(vec![
            (1, source(&[("a", "v1"), ("b", "v1"), ("d", "v1")])),
            (2, source(&[("b", "v1"), ("b", "v2"), ("c", "v2")])),
            (3, source(&[])),
        ])
        .unwrap();

        let rows = collect_rows(merger);
        assert_eq!(
            vec![
                ("a".to_string(), vec![("v1".to_string(), 1)]),
                (
                    "b".to_string(),
                    vec![
                        ("v1".to_string(), 1),
                        ("v1".to_string(), 2),
                        ("v2".to_string(), 2)
                    ]
                ),
                ("c".to_string(), vec![("v2".to_string(), 2)]),
                ("d".to_string(), vec![("v1".to_string(), 1)]),
            ],
            rows
        );
    }

    #[test]
    fn test_merge_propagates_error() {
        let failing: BoxedCellIter = Box::new(
            vec![
                Ok(Cell::put(b"a".to_vec(), "cf", "q", 1, vec![])),
                store_api::sst::codec::decode_cell(&mut [0u8].as_slice()),
            ]
            .into_iter(),
        );
        let mut merger = RowMerger::new(vec![(1, failing)]).unwrap();
        assert!(merger.next_row().is_err());
    }
}
