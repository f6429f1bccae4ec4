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

//! Resolves the visible columns of a row from its cells.

use std::collections::BTreeMap;

use store_api::cell::{Cell, OpType};
use store_api::region_store::ColumnValue;

/// A cell together with the sequence of the file it came from.
#[derive(Debug)]
pub(crate) struct SequencedCell {
    pub cell: Cell,
    pub sequence: u64,
}

#[derive(Default)]
struct ColumnState {
    /// Newest delete marker.
    delete_ts: Option<u64>,
    /// Puts as `(timestamp, sequence, value)`.
    puts: Vec<(u64, u64, Vec<u8>)>,
}

/// Returns the visible version of every column of one row, sorted by qualifier.
///
/// A delete marker at `T` masks puts of the same column with timestamp `<= T`.
/// Among the remaining puts the newest wins, ties go to the later sequence and
/// then to the later cell.
pub(crate) fn resolve_row(cells: Vec<SequencedCell>) -> Vec<ColumnValue> {
    let mut columns: BTreeMap<Vec<u8>, ColumnState> = BTreeMap::new();
    for SequencedCell { cell, sequence } in cells {
        let state = columns.entry(cell.qualifier).or_default();
        match cell.op_type {
            OpType::Put => state.puts.push((cell.timestamp, sequence, cell.value)),
            OpType::DeleteColumn => {
                state.delete_ts = state.delete_ts.max(Some(cell.timestamp));
            }
        }
    }

    columns
        .into_iter()
        .filter_map(|(qualifier, state)| {
            let ColumnState { delete_ts, puts } = state;
            puts.into_iter()
                .filter(|(ts, _, _)| delete_ts.map_or(true, |d| *ts > d))
                // `max_by` keeps the last of equal elements.
                .max_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)))
                .map(|(timestamp, _, value)| ColumnValue {
                    qualifier,
                    timestamp,
                    value,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &[u8] = b"user_0000000001";

    fn put(qualifier: &str, ts: u64, value: u8, sequence: u64) -> SequencedCell {
        SequencedCell {
            cell: Cell::put(ROW.to_vec(), "cf", qualifier, ts, vec![value]),
            sequence,
        }
    }

    fn delete(qualifier: &str, ts: u64, sequence: u64) -> SequencedCell {
        SequencedCell {
            cell: Cell::delete_column(ROW.to_vec(), "cf", qualifier, ts),
            sequence,
        }
    }

    #[test]
    fn test_delete_masks_older_and_equal_puts() {
        let columns = resolve_row(vec![
            put("segment_v1", 1, 1, 1),
            delete("segment_v1", 1, 2),
            put("segment_v2", 1, 1, 2),
        ]);
        assert_eq!(1, columns.len());
        assert_eq!(b"segment_v2".to_vec(), columns[0].qualifier);
    }

    #[test]
    fn test_newer_put_survives_delete() {
        let columns = resolve_row(vec![delete("segment_v1", 1, 1), put("segment_v1", 2, 7, 1)]);
        assert_eq!(1, columns.len());
        assert_eq!(2, columns[0].timestamp);
        assert_eq!(vec![7], columns[0].value);
    }

    #[test]
    fn test_newest_put_wins() {
        let columns = resolve_row(vec![
            put("q", 3, 1, 1),
            put("q", 5, 2, 1),
            put("q", 5, 3, 2),
            put("q", 4, 4, 3),
        ]);
        assert_eq!(vec![3], columns[0].value);

        // Same timestamp and sequence, the later cell wins.
        let columns = resolve_row(vec![put("q", 1, 1, 1), put("q", 1, 2, 1)]);
        assert_eq!(vec![2], columns[0].value);
    }

    #[test]
    fn test_sorted_by_qualifier() {
        let columns = resolve_row(vec![put("b", 1, 1, 1), put("a", 1, 1, 1)]);
        let qualifiers: Vec<_> = columns.iter().map(|c| c.qualifier.clone()).collect();
        assert_eq!(vec![b"a".to_vec(), b"b".to_vec()], qualifiers);
        assert!(resolve_row(vec![]).is_empty());
    }
}
