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

use std::path::{Path, PathBuf};
use std::sync::Arc;

use local_store::LocalStore;
use object_store::{build_object_store, util, ObjectStore};
use snafu::ResultExt;
use store_api::region_store::{RegionStoreRef, TableName};

use crate::error::{BuildBlobStoreSnafu, InvalidTableNameSnafu, OpenRegionStoreSnafu, Result};
use crate::options::RebuildOptions;

pub type RebuildContextRef = Arc<RebuildContext>;

/// Everything a phase needs, passed explicitly to each component.
pub struct RebuildContext {
    pub options: RebuildOptions,
    pub blob_store: ObjectStore,
    pub region_store: RegionStoreRef,
    pub table: TableName,
}

impl RebuildContext {
    pub fn new(
        options: RebuildOptions,
        blob_store: ObjectStore,
        region_store: RegionStoreRef,
    ) -> Result<Self> {
        let table = options.table_name().context(InvalidTableNameSnafu)?;
        Ok(Self {
            options,
            blob_store,
            region_store,
            table,
        })
    }

    /// Builds the blob store and opens the bundled region store from options.
    pub fn from_options(options: RebuildOptions) -> Result<Self> {
        let blob_store = build_object_store(&options.blob).context(BuildBlobStoreSnafu)?;
        let region_store =
            LocalStore::open(&options.store.data_home).context(OpenRegionStoreSnafu)?;
        Self::new(options, blob_store, Arc::new(region_store))
    }

    pub fn family(&self) -> &str {
        &self.options.store.column_family
    }

    pub fn staging_root(&self) -> &Path {
        Path::new(&self.options.staging.root)
    }

    /// Path of the blob of segment `name`.
    pub fn segment_path(&self, name: &str) -> String {
        util::join_path(&self.options.segment_prefix, &format!("{name}.bin"))
    }

    /// Directory of the column family inside an artifact.
    pub fn family_dir(&self, artifact_dir: &Path) -> PathBuf {
        artifact_dir.join(self.family())
    }
}
