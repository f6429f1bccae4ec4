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

//! Rebuilds a segment membership index through bulk load.
//!
//! The job runs six phases: generate the old and new segment bitmaps, write
//! and ingest region files of the old segment, write and ingest region files
//! retiring the old segment and adding the new one, then verify the result.

pub mod artifact;
pub mod bulk_load;
pub mod context;
pub mod driver;
pub mod error;
pub mod index_writer;
pub mod options;
pub mod segment;
pub mod verifier;

pub use context::{RebuildContext, RebuildContextRef};
pub use driver::{Phase, PhaseDriver, PhaseSelector};
pub use options::RebuildOptions;
