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

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Operation type of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
pub enum OpType {
    /// Writes a value.
    Put,
    /// Masks every version of the column up to the cell's timestamp.
    DeleteColumn,
}

impl OpType {
    pub fn as_u8(&self) -> u8 {
        match self {
            OpType::Put => 0,
            OpType::DeleteColumn => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OpType::Put),
            1 => Some(OpType::DeleteColumn),
            _ => None,
        }
    }
}

/// A single cell operation.
#[derive(Clone, PartialEq, Eq)]
pub struct Cell {
    pub row: Vec<u8>,
    pub family: String,
    pub qualifier: Vec<u8>,
    pub timestamp: u64,
    pub op_type: OpType,
    /// Empty for [OpType::DeleteColumn].
    pub value: Vec<u8>,
}

impl Cell {
    pub fn put(
        row: Vec<u8>,
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: u64,
        value: Vec<u8>,
    ) -> Self {
        Self {
            row,
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            op_type: OpType::Put,
            value,
        }
    }

    pub fn delete_column(
        row: Vec<u8>,
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: u64,
    ) -> Self {
        Self {
            row,
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            op_type: OpType::DeleteColumn,
            value: Vec::new(),
        }
    }

    /// The sort key of the cell inside a region file.
    pub fn sort_key(&self) -> (&[u8], &[u8], u64) {
        (&self.row, &self.qualifier, self.timestamp)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}/{}/{}",
            String::from_utf8_lossy(&self.row),
            self.family,
            String::from_utf8_lossy(&self.qualifier),
            self.timestamp,
            self.op_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_type() {
        for op in [OpType::Put, OpType::DeleteColumn] {
            assert_eq!(Some(op), OpType::from_u8(op.as_u8()));
        }
        assert_eq!(None, OpType::from_u8(2));
        assert_eq!("DeleteColumn", OpType::DeleteColumn.to_string());
    }

    #[test]
    fn test_cell_debug() {
        let cell = Cell::delete_column(b"user_0000000001".to_vec(), "cf", "segment_v1", 1);
        assert_eq!(
            "user_0000000001/cf:segment_v1/1/DeleteColumn",
            format!("{cell:?}")
        );
        assert!(cell.value.is_empty());
    }
}
