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

//! Row keys of the segment index.
//!
//! A row key is `user_` followed by the user id zero padded to ten digits, so the
//! byte order of keys equals the numeric order of ids.

/// Prefix of every row key.
pub const ROW_KEY_PREFIX: &str = "user_";

const DIGITS: usize = 10;

/// Number of distinct user ids, `u32::MAX + 1`.
pub const USER_ID_SPACE: u64 = 1 << 32;

/// Encodes `user_id` into its row key.
pub fn encode_row_key(user_id: u32) -> Vec<u8> {
    format!("{ROW_KEY_PREFIX}{user_id:010}").into_bytes()
}

/// Decodes a row key back to the user id. Returns `None` if `key` is not a row key.
pub fn decode_row_key(key: &[u8]) -> Option<u32> {
    let digits = key.strip_prefix(ROW_KEY_PREFIX.as_bytes())?;
    if digits.len() != DIGITS || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Returns the smallest user id whose row key is `>= boundary`, or
/// [USER_ID_SPACE] if every row key sorts below `boundary`.
pub fn first_user_id_at_or_after(boundary: &[u8]) -> u64 {
    let (mut lo, mut hi) = (0u64, USER_ID_SPACE);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if encode_row_key(mid as u32).as_slice() < boundary {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
