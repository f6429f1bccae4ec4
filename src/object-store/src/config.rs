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

use common_telemetry::info;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};

use crate::error::{InitBackendSnafu, InvalidConfigSnafu, Result};
use crate::services::{Fs, Memory, S3};
use crate::ObjectStore;

/// Where the blobs live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ObjectStoreConfig {
    /// A local directory.
    Fs(FileConfig),
    /// Process memory, gone on exit.
    Memory,
    /// Any S3 compatible service, MinIO included.
    S3(S3Config),
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        ObjectStoreConfig::Fs(FileConfig::default())
    }
}

impl ObjectStoreConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectStoreConfig::Fs(_) => "Fs",
            ObjectStoreConfig::Memory => "Memory",
            ObjectStoreConfig::S3(_) => "S3",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub root: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: "/tmp/segment_rebuild/blobs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct S3Config {
    pub bucket: String,
    pub root: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "segments".to_string(),
            root: String::new(),
            endpoint: None,
            region: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

/// Builds an [ObjectStore] from the config.
pub fn build_object_store(config: &ObjectStoreConfig) -> Result<ObjectStore> {
    let store = match config {
        ObjectStoreConfig::Fs(file) => {
            ensure!(
                !file.root.is_empty(),
                InvalidConfigSnafu {
                    msg: "fs root must not be empty",
                }
            );
            let builder = Fs::default().root(&file.root);
            ObjectStore::new(builder)
                .context(InitBackendSnafu { backend: "Fs" })?
                .finish()
        }
        ObjectStoreConfig::Memory => ObjectStore::new(Memory::default())
            .context(InitBackendSnafu { backend: "Memory" })?
            .finish(),
        ObjectStoreConfig::S3(s3) => {
            ensure!(
                !s3.bucket.is_empty(),
                InvalidConfigSnafu {
                    msg: "s3 bucket must not be empty",
                }
            );
            let mut builder = S3::default()
                .root(&s3.root)
                .bucket(&s3.bucket)
                .access_key_id(&s3.access_key_id)
                .secret_access_key(&s3.secret_access_key);
            if let Some(endpoint) = &s3.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(region) = &s3.region {
                builder = builder.region(region);
            }
            ObjectStore::new(builder)
                .context(InitBackendSnafu { backend: "S3" })?
                .finish()
        }
    };

    info!("Built object store, backend: {}", config.name());

    Ok(store)
}
