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

//! The key-value store interface used by the rebuild pipeline.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use common_error::ext::BoxedError;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{Error, InvalidTableNameSnafu};
use crate::region::RegionBoundaries;

/// Namespace of tables created without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Name of a table, `namespace:table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub namespace: String,
    pub table: String,
}

impl TableName {
    pub fn new(namespace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            table: table.into(),
        }
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, table) = match s.split_once(':') {
            Some((namespace, table)) => (namespace, table),
            None => (DEFAULT_NAMESPACE, s),
        };
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        };
        ensure!(
            valid(namespace) && valid(table),
            InvalidTableNameSnafu { name: s }
        );

        Ok(Self::new(namespace, table))
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.table)
    }
}

/// Describes a table to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: TableName,
    pub families: Vec<String>,
    /// Start keys of regions 1..n, region 0 starts at the empty key.
    pub split_keys: Vec<Vec<u8>>,
}

/// A visible version of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValue {
    pub qualifier: Vec<u8>,
    pub timestamp: u64,
    pub value: Vec<u8>,
}

/// Visible columns of a row, sorted by qualifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    pub row: Vec<u8>,
    pub columns: Vec<ColumnValue>,
}

impl RowResult {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, qualifier: &[u8]) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|c| c.qualifier.as_slice() == qualifier)
    }
}

/// A region-partitioned sorted key-value store that ingests region files.
#[async_trait]
pub trait RegionStore: Send + Sync {
    /// Creates the table unless it exists. Returns whether it was created.
    async fn create_table_if_not_exists(
        &self,
        desc: &TableDescriptor,
    ) -> Result<bool, BoxedError>;

    /// Returns the start keys of the regions of the table.
    async fn region_boundaries(&self, table: &TableName) -> Result<RegionBoundaries, BoxedError>;

    /// Atomically ingests the region files under `dir`, laid out as
    /// `<dir>/<family>/<file>`. Returns a process style exit code, `0` on success.
    async fn bulk_ingest(&self, dir: &Path, table: &TableName) -> Result<i32, BoxedError>;

    /// Point read. Only `qualifiers` are returned unless it is empty.
    async fn get(
        &self,
        table: &TableName,
        row: &[u8],
        family: &str,
        qualifiers: &[Vec<u8>],
    ) -> Result<RowResult, BoxedError>;

    /// Returns at most `limit` non-empty rows of `family` in key order.
    async fn scan(
        &self,
        table: &TableName,
        family: &str,
        limit: usize,
    ) -> Result<Vec<RowResult>, BoxedError>;
}

pub type RegionStoreRef = Arc<dyn RegionStore>;
