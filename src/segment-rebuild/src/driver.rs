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
use std::time::{Duration, Instant};

use common_error::ext::ErrorExt;
use common_telemetry::{error, info, warn};
use object_store::util::ensure_dir;
use snafu::{OptionExt, ResultExt};
use store_api::region_store::TableDescriptor;

use crate::artifact::ArtifactTag;
use crate::bulk_load::BulkLoader;
use crate::context::RebuildContextRef;
use crate::error::{BlobSnafu, InvalidPhaseSnafu, RegionStoreSnafu, Result};
use crate::index_writer::IndexFileWriter;
use crate::segment::SegmentGenerator;
use crate::verifier::{ValidationSummary, Verifier};

/// A step of the rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    GenerateSegments,
    WriteOldIndex,
    LoadOldIndex,
    WriteNewIndex,
    LoadNewIndex,
    Verify,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::GenerateSegments,
        Phase::WriteOldIndex,
        Phase::LoadOldIndex,
        Phase::WriteNewIndex,
        Phase::LoadNewIndex,
        Phase::Verify,
    ];

    /// The 1-based number of the phase.
    pub fn number(&self) -> u8 {
        match self {
            Phase::GenerateSegments => 1,
            Phase::WriteOldIndex => 2,
            Phase::LoadOldIndex => 3,
            Phase::WriteNewIndex => 4,
            Phase::LoadNewIndex => 5,
            Phase::Verify => 6,
        }
    }

    pub fn from_number(number: u8) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.number() == number)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Phase::GenerateSegments => "Generate segments",
            Phase::WriteOldIndex => "Write region files of the old segment",
            Phase::LoadOldIndex => "Bulk load region files of the old segment",
            Phase::WriteNewIndex => {
                "Write region files of the new segment with deletes of the old segment"
            }
            Phase::LoadNewIndex => "Bulk load region files of the new segment",
            Phase::Verify => "Verify segments",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase {}: {}", self.number(), self.description())
    }
}

/// Phases to run, in the order given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSelector {
    phases: Vec<Phase>,
}

impl PhaseSelector {
    pub fn all() -> Self {
        Self {
            phases: Phase::ALL.to_vec(),
        }
    }

    /// Parses a blank string, `all`, or a comma separated list of phase numbers.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self { phases: Vec::new() });
        }
        if input.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }

        let phases = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u8>()
                    .ok()
                    .and_then(Phase::from_number)
                    .context(InvalidPhaseSnafu { input: s })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Completed phases with their durations.
    pub phases: Vec<(Phase, Duration)>,
    /// Set if the verify phase ran.
    pub validation: Option<ValidationSummary>,
}

/// Runs the selected phases sequentially and stops at the first failure.
pub struct PhaseDriver {
    ctx: RebuildContextRef,
    generator: SegmentGenerator,
    writer: IndexFileWriter,
    loader: BulkLoader,
    verifier: Verifier,
}

impl PhaseDriver {
    pub fn new(ctx: RebuildContextRef) -> Self {
        Self {
            generator: SegmentGenerator::new(ctx.clone()),
            writer: IndexFileWriter::new(ctx.clone()),
            loader: BulkLoader::new(ctx.clone()),
            verifier: Verifier::new(ctx.clone()),
            ctx,
        }
    }

    /// Creates the target table and the segment directory if absent.
    pub async fn bootstrap(&self) -> Result<()> {
        let desc = TableDescriptor {
            name: self.ctx.table.clone(),
            families: vec![self.ctx.family().to_string()],
            split_keys: self.ctx.options.split_keys(),
        };
        let created = self
            .ctx
            .region_store
            .create_table_if_not_exists(&desc)
            .await
            .context(RegionStoreSnafu {
                operation: "create table",
            })?;
        if created {
            info!(
                "Created table {}, regions: {}",
                desc.name,
                desc.split_keys.len() + 1
            );
        } else {
            info!("Table {} already exists", desc.name);
        }

        let prefix = &self.ctx.options.segment_prefix;
        ensure_dir(&self.ctx.blob_store, prefix)
            .await
            .context(BlobSnafu { path: prefix })?;
        Ok(())
    }

    pub async fn run(&self, selector: &PhaseSelector) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        if selector.is_empty() {
            info!("No phase selected, set PHASE to 1-6, a comma separated list, or all");
            return Ok(summary);
        }

        self.bootstrap().await?;

        let total = Instant::now();
        for &phase in selector.phases() {
            info!("{} started", phase);
            let start = Instant::now();
            if let Err(e) = self.run_phase(phase, &mut summary).await {
                error!(e; "{} failed after {:?}: {}", phase, start.elapsed(), e.output_msg());
                if e.status_code().is_retryable() {
                    warn!("{} may succeed if rerun", phase);
                }
                return Err(e);
            }
            let elapsed = start.elapsed();
            info!("{} completed, cost: {:?}", phase, elapsed);
            summary.phases.push((phase, elapsed));
        }
        info!(
            "Completed {} phases, cost: {:?}",
            summary.phases.len(),
            total.elapsed()
        );

        Ok(summary)
    }

    async fn run_phase(&self, phase: Phase, summary: &mut RunSummary) -> Result<()> {
        match phase {
            Phase::GenerateSegments => {
                self.generator.run().await?;
            }
            Phase::WriteOldIndex => {
                self.writer.write_old().await?;
            }
            Phase::LoadOldIndex => {
                self.loader.load_latest(ArtifactTag::V1).await?;
            }
            Phase::WriteNewIndex => {
                self.writer.write_new().await?;
            }
            Phase::LoadNewIndex => {
                self.loader.load_latest(ArtifactTag::V2).await?;
            }
            Phase::Verify => {
                let verify = &self.ctx.options.verify;
                self.verifier.query_users(&verify.sample_user_ids).await?;
                let validation = self
                    .verifier
                    .validate_after_rebuild(&verify.sample_user_ids)
                    .await?;
                self.verifier.sample_scan(verify.scan_limit).await?;
                summary.validation = Some(validation);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_phase_numbers() {
        for (i, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(i as u8 + 1, phase.number());
            assert_eq!(Some(*phase), Phase::from_number(phase.number()));
        }
        assert_eq!(None, Phase::from_number(0));
        assert_eq!(None, Phase::from_number(7));
        assert_eq!(
            "Phase 3: Bulk load region files of the old segment",
            Phase::LoadOldIndex.to_string()
        );
    }

    #[test]
    fn test_parse_selector() {
        assert!(PhaseSelector::parse("").unwrap().is_empty());
        assert!(PhaseSelector::parse("   ").unwrap().is_empty());
        assert_eq!(PhaseSelector::all(), PhaseSelector::parse("all").unwrap());
        assert_eq!(PhaseSelector::all(), PhaseSelector::parse(" ALL ").unwrap());
        assert_eq!(
            &[Phase::LoadNewIndex, Phase::GenerateSegments, Phase::Verify],
            PhaseSelector::parse("5, 1,6,").unwrap().phases()
        );
        assert_eq!(
            &[Phase::WriteOldIndex],
            PhaseSelector::parse("2").unwrap().phases()
        );
    }

    #[test]
    fn test_parse_invalid_selector() {
        for input in ["0", "7", "1,x", "1;2", "-1"] {
            let err = PhaseSelector::parse(input).unwrap_err();
            assert!(matches!(err, Error::InvalidPhase { .. }), "{input}: {err:?}");
        }
    }
}
