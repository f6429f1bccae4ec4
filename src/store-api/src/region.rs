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

use std::ops::Range;

use snafu::ensure;

use crate::error::{EmptyBoundariesSnafu, Result, UnsortedBoundariesSnafu};
use crate::row_key::{first_user_id_at_or_after, USER_ID_SPACE};

/// Ordered start keys of the regions of a table, one per region.
///
/// The start key of region 0 is implicit: it covers every key below the start
/// key of region 1, whatever value is stored at index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionBoundaries {
    start_keys: Vec<Vec<u8>>,
}

impl RegionBoundaries {
    /// Creates boundaries from start keys. The list must be non-empty and
    /// non-decreasing.
    pub fn new(start_keys: Vec<Vec<u8>>) -> Result<Self> {
        ensure!(!start_keys.is_empty(), EmptyBoundariesSnafu);
        for (i, pair) in start_keys.windows(2).enumerate() {
            ensure!(pair[0] <= pair[1], UnsortedBoundariesSnafu { index: i + 1 });
        }

        Ok(Self { start_keys })
    }

    /// Boundaries of a table with a single region.
    pub fn single() -> Self {
        Self {
            start_keys: vec![Vec::new()],
        }
    }

    /// Boundaries of a table pre-split at `split_keys`.
    pub fn with_split_keys(split_keys: Vec<Vec<u8>>) -> Result<Self> {
        let mut start_keys = Vec::with_capacity(split_keys.len() + 1);
        start_keys.push(Vec::new());
        start_keys.extend(split_keys);
        Self::new(start_keys)
    }

    pub fn start_keys(&self) -> &[Vec<u8>] {
        &self.start_keys
    }

    pub fn num_regions(&self) -> usize {
        self.start_keys.len()
    }

    /// Returns the region of `row`: the highest region whose start key is
    /// `<= row`, falling back to region 0.
    pub fn locate(&self, row: &[u8]) -> usize {
        self.start_keys
            .partition_point(|start| start.as_slice() <= row)
            .saturating_sub(1)
    }

    /// Splits the user id space into one half-open range per region, such that
    /// user `u` falls in range `i` iff `locate(encode_row_key(u)) == i`.
    ///
    /// Ranges of regions that share a start key with their successor are empty.
    pub fn user_id_ranges(&self) -> Vec<Range<u64>> {
        let n = self.start_keys.len();
        (0..n)
            .map(|i| {
                let start = if i == 0 {
                    0
                } else {
                    first_user_id_at_or_after(&self.start_keys[i])
                };
                let end = if i + 1 == n {
                    USER_ID_SPACE
                } else {
                    first_user_id_at_or_after(&self.start_keys[i + 1])
                };
                start..end.max(start)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::row_key::encode_row_key;

    fn boundaries(keys: &[&str]) -> RegionBoundaries {
        RegionBoundaries::new(keys.iter().map(|k| k.as_bytes().to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_invalid_boundaries() {
        let err = RegionBoundaries::new(vec![]).unwrap_err();
        assert!(matches!(err, Error::EmptyBoundaries { .. }));

        let err = RegionBoundaries::new(vec![b"".to_vec(), b"b".to_vec(), b"a".to_vec()])
            .unwrap_err();
        assert!(matches!(err, Error::UnsortedBoundaries { index: 2, .. }));
    }

    #[test]
    fn test_locate() {
        let b = boundaries(&["", "user_0020000000", "user_0040000000"]);
        assert_eq!(3, b.num_regions());
        assert_eq!(0, b.locate(&encode_row_key(1)));
        assert_eq!(0, b.locate(&encode_row_key(19_999_999)));
        assert_eq!(1, b.locate(&encode_row_key(20_000_000)));
        assert_eq!(1, b.locate(&encode_row_key(39_999_999)));
        assert_eq!(2, b.locate(&encode_row_key(40_000_000)));
        assert_eq!(2, b.locate(&encode_row_key(u32::MAX)));

        // Region 0 is the fallback even with an explicit start key.
        let b = boundaries(&["user_0000000100", "user_0000000200"]);
        assert_eq!(0, b.locate(&encode_row_key(5)));
        assert_eq!(1, b.locate(&encode_row_key(200)));

        // Duplicated start keys, the highest region wins.
        let b = boundaries(&["", "user_0000000100", "user_0000000100"]);
        assert_eq!(2, b.locate(&encode_row_key(100)));
        assert_eq!(0, b.locate(&encode_row_key(99)));
    }

    #[test]
    fn test_user_id_ranges() {
        let b = RegionBoundaries::single();
        assert_eq!(vec![0..USER_ID_SPACE], b.user_id_ranges());

        let b = boundaries(&["", "user_0020000000", "user_0040000000"]);
        assert_eq!(
            vec![
                0..20_000_000,
                20_000_000..40_000_000,
                40_000_000..USER_ID_SPACE
            ],
            b.user_id_ranges()
        );

        let b = boundaries(&["", "user_0000000100", "user_0000000100", "user_05"]);
        let ranges = b.user_id_ranges();
        assert_eq!(
            vec![0..100, 100..100, 100..500_000_000, 500_000_000..USER_ID_SPACE],
            ranges
        );
        for id in [0u32, 99, 100, 101, 499_999_999, 500_000_000, u32::MAX] {
            let region = b.locate(&encode_row_key(id));
            assert!(ranges[region].contains(&(id as u64)), "id: {id}");
        }
    }
}
