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

use std::io::Write;
use std::path::Path;

use clap::Parser;
use common_test_util::temp_dir::{create_named_temp_file, create_temp_dir, NamedTempFile};
use segment_rebuild_cmd::error::Error;
use segment_rebuild_cmd::options::GlobalOptions;
use segment_rebuild_cmd::rebuild::{Command, Instance, APP_NAME};
use segment_rebuild_cmd::{start_app, EXIT_SUCCESS, EXIT_VALIDATION_FAILURE};

fn write_config(dir: &Path) -> NamedTempFile {
    let mut file = create_named_temp_file();
    let dir = dir.display();
    write!(
        file,
        r#"
segment_prefix = "segments"

[blob]
type = "Fs"
root = "{dir}/blobs"

[store]
data_home = "{dir}/store"
table = "test:segment_index"
pre_split_regions = 3

[staging]
root = "{dir}/staging"

[segments]
old = {{ start = 1, end = 3001 }}
new = {{ start = 1001, end = 4001 }}

[verify]
sample_user_ids = [1, 1000, 1001, 3000, 3001, 4000, 4001]
scan_limit = 1000
"#
    )
    .unwrap();
    file
}

fn build_instance(config: &str, phase: &str) -> segment_rebuild_cmd::error::Result<Instance> {
    let cmd = Command::parse_from([
        APP_NAME,
        "--config-file",
        config,
        "--env-prefix",
        "SEGMENT_REBUILD_CMD_IT",
        "--phase",
        phase,
    ]);
    let opts = cmd.load_options(&GlobalOptions::default())?;
    assert_eq!("test:segment_index", opts.store.table);
    cmd.build(opts)
}

#[tokio::test]
async fn test_run_all_phases() {
    let dir = create_temp_dir("test_cmd_run_all_phases");
    let config = write_config(dir.path());

    let mut instance = build_instance(&config.path().to_string_lossy(), "all").unwrap();
    start_app(&mut instance).await.unwrap();

    let summary = instance.summary().unwrap();
    assert_eq!(6, summary.phases.len());
    let validation = summary.validation.as_ref().unwrap();
    assert_eq!(7, validation.success);
    assert_eq!(EXIT_SUCCESS, instance.exit_code());
    assert!(dir.path().join("blobs/segments/segment_v1.bin").is_file());
    assert!(dir.path().join("blobs/segments/segment_v2.bin").is_file());
}

#[tokio::test]
async fn test_verify_before_rebuild_completes() {
    let dir = create_temp_dir("test_cmd_verify_before_rebuild_completes");
    let config = write_config(dir.path());

    let mut instance = build_instance(&config.path().to_string_lossy(), "1,2,3,6").unwrap();
    start_app(&mut instance).await.unwrap();

    let validation = instance
        .summary()
        .unwrap()
        .validation
        .as_ref()
        .unwrap();
    // Only user 4001 is in its final state.
    assert_eq!(1, validation.success);
    assert_eq!(6, validation.failure);
    assert_eq!(EXIT_VALIDATION_FAILURE, instance.exit_code());

    // Finishing the rebuild in a later run fixes every user.
    let mut instance = build_instance(&config.path().to_string_lossy(), "4,5,6").unwrap();
    start_app(&mut instance).await.unwrap();
    assert_eq!(EXIT_SUCCESS, instance.exit_code());
}

#[tokio::test]
async fn test_failed_phase() {
    let dir = create_temp_dir("test_cmd_failed_phase");
    let config = write_config(dir.path());

    let mut instance = build_instance(&config.path().to_string_lossy(), "3").unwrap();
    let err = start_app(&mut instance).await.unwrap_err();
    assert!(matches!(err, Error::Rebuild { .. }), "{err:?}");
    assert!(instance.summary().is_none());
}

#[test]
fn test_invalid_phase() {
    let dir = create_temp_dir("test_cmd_invalid_phase");
    let config = write_config(dir.path());

    let err = build_instance(&config.path().to_string_lossy(), "1,9").err().unwrap();
    assert!(matches!(err, Error::ParsePhase { .. }), "{err:?}");
}

#[test]
fn test_invalid_config() {
    let mut file = create_named_temp_file();
    write!(
        file,
        r#"
[rebuild]
put_timestamp = 5
delete_timestamp = 1
"#
    )
    .unwrap();

    let cmd = Command::parse_from([
        APP_NAME,
        "--config-file",
        &file.path().to_string_lossy(),
        "--env-prefix",
        "SEGMENT_REBUILD_CMD_IT",
    ]);
    let err = cmd.load_options(&GlobalOptions::default()).unwrap_err();
    assert!(matches!(err, Error::LoadOptions { .. }), "{err:?}");
}
