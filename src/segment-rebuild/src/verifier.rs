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

use common_telemetry::{debug, info, warn};
use snafu::ResultExt;
use store_api::region_store::RowResult;
use store_api::row_key::encode_row_key;
use strum::{AsRefStr, Display};

use crate::context::RebuildContextRef;
use crate::error::{RegionStoreSnafu, Result};
use crate::options::SegmentsOptions;
use crate::segment::{NEW_SEGMENT, OLD_SEGMENT};

/// Which segment qualifiers a row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum SegmentState {
    #[strum(serialize = "EMPTY")]
    Empty,
    #[strum(serialize = "V1")]
    OldOnly,
    #[strum(serialize = "V2")]
    NewOnly,
    #[strum(serialize = "V1+V2")]
    Both,
}

impl SegmentState {
    pub fn new(has_old: bool, has_new: bool) -> Self {
        match (has_old, has_new) {
            (false, false) => SegmentState::Empty,
            (true, false) => SegmentState::OldOnly,
            (false, true) => SegmentState::NewOnly,
            (true, true) => SegmentState::Both,
        }
    }

    fn of_row(row: &RowResult) -> Self {
        Self::new(
            row.column(OLD_SEGMENT.as_bytes()).is_some(),
            row.column(NEW_SEGMENT.as_bytes()).is_some(),
        )
    }
}

/// Describes where a user is expected to be, before the rebuild completes.
pub fn expected_label(segments: &SegmentsOptions, user_id: u32) -> &'static str {
    match (segments.old.contains(user_id), segments.new.contains(user_id)) {
        (true, false) => "V1 only",
        (true, true) => "V1 (or V2 after phase 5)",
        (false, true) => "V2 only",
        (false, false) => "Not in any segment",
    }
}

/// The state of a user once the new segment has replaced the old one.
pub fn expected_after_rebuild(segments: &SegmentsOptions, user_id: u32) -> SegmentState {
    if segments.new.contains(user_id) {
        SegmentState::NewOnly
    } else {
        SegmentState::Empty
    }
}

/// A visible segment column of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentColumn {
    pub qualifier: String,
    pub timestamp: u64,
    /// The decoded big endian value, `None` if it is not four bytes.
    pub value: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReport {
    pub user_id: u32,
    pub state: SegmentState,
    pub expected: &'static str,
    pub columns: Vec<SegmentColumn>,
}

impl fmt::Display for UserReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {}: {} (expected: {})",
            self.user_id, self.state, self.expected
        )?;
        for column in &self.columns {
            write!(
                f,
                ", {}@{}={:?}",
                column.qualifier, column.timestamp, column.value
            )?;
        }
        Ok(())
    }
}

/// A user whose observed state differs from the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub user_id: u32,
    pub expected: SegmentState,
    pub actual: SegmentState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub success: usize,
    pub failure: usize,
    pub mismatches: Vec<Mismatch>,
}

impl ValidationSummary {
    pub fn passed(&self) -> bool {
        self.failure == 0
    }
}

/// Row counts of a bounded scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanCounts {
    pub total: usize,
    pub with_old: usize,
    pub with_new: usize,
    pub empty: usize,
    pub elapsed: Duration,
}

/// Reads users back from the region store and checks their segment state.
pub struct Verifier {
    ctx: RebuildContextRef,
}

impl Verifier {
    pub fn new(ctx: RebuildContextRef) -> Self {
        Self { ctx }
    }

    async fn get_user(&self, user_id: u32) -> Result<RowResult> {
        self.ctx
            .region_store
            .get(
                &self.ctx.table,
                &encode_row_key(user_id),
                self.ctx.family(),
                &[],
            )
            .await
            .context(RegionStoreSnafu {
                operation: "get row",
            })
    }

    /// Point reads each user and reports its visible segment columns.
    pub async fn query_users(&self, user_ids: &[u32]) -> Result<Vec<UserReport>> {
        let segments = &self.ctx.options.segments;
        let mut reports = Vec::with_capacity(user_ids.len());
        for &user_id in user_ids {
            let row = self.get_user(user_id).await?;
            let columns = row
                .columns
                .iter()
                .filter(|c| {
                    c.qualifier.as_slice() == OLD_SEGMENT.as_bytes()
                        || c.qualifier.as_slice() == NEW_SEGMENT.as_bytes()
                })
                .map(|c| SegmentColumn {
                    qualifier: String::from_utf8_lossy(&c.qualifier).to_string(),
                    timestamp: c.timestamp,
                    value: <[u8; 4]>::try_from(c.value.as_slice())
                        .ok()
                        .map(i32::from_be_bytes),
                })
                .collect();
            let report = UserReport {
                user_id,
                state: SegmentState::of_row(&row),
                expected: expected_label(segments, user_id),
                columns,
            };
            info!("{}", report);
            reports.push(report);
        }
        Ok(reports)
    }

    /// Compares each user with its expected state after the rebuild.
    pub async fn validate_after_rebuild(&self, user_ids: &[u32]) -> Result<ValidationSummary> {
        let segments = &self.ctx.options.segments;
        let mut summary = ValidationSummary::default();
        for &user_id in user_ids {
            let actual = SegmentState::of_row(&self.get_user(user_id).await?);
            let expected = expected_after_rebuild(segments, user_id);
            if actual == expected {
                debug!("User {} is {} as expected", user_id, actual);
                summary.success += 1;
            } else {
                warn!("User {} is {}, expected {}", user_id, actual, expected);
                summary.failure += 1;
                summary.mismatches.push(Mismatch {
                    user_id,
                    expected,
                    actual,
                });
            }
        }
        info!(
            "Validation finished, success: {}, failure: {}",
            summary.success, summary.failure
        );
        Ok(summary)
    }

    /// Scans at most `limit` rows and counts the segments they carry.
    pub async fn sample_scan(&self, limit: usize) -> Result<ScanCounts> {
        let start = Instant::now();
        let rows = self
            .ctx
            .region_store
            .scan(&self.ctx.table, self.ctx.family(), limit)
            .await
            .context(RegionStoreSnafu { operation: "scan" })?;

        let mut counts = ScanCounts {
            total: rows.len(),
            ..Default::default()
        };
        for row in &rows {
            match SegmentState::of_row(row) {
                SegmentState::Empty => counts.empty += 1,
                SegmentState::OldOnly => counts.with_old += 1,
                SegmentState::NewOnly => counts.with_new += 1,
                SegmentState::Both => {
                    counts.with_old += 1;
                    counts.with_new += 1;
                }
            }
        }
        counts.elapsed = start.elapsed();
        info!(
            "Scanned {} rows, with {}: {}, with {}: {}, empty: {}, cost: {:?}",
            counts.total,
            OLD_SEGMENT,
            counts.with_old,
            NEW_SEGMENT,
            counts.with_new,
            counts.empty,
            counts.elapsed
        );
        Ok(counts)
    }
}
