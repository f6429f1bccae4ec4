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

use std::io;

use common_error::ext::StackError;
use common_macro::stack_trace_debug;
use snafu::{Location, ResultExt, Snafu};

#[derive(Snafu)]
#[stack_trace_debug]
enum ReadError {
    #[snafu(display("Failed to read {}", path))]
    Read {
        path: String,
        #[snafu(source)]
        error: io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Snafu)]
#[stack_trace_debug]
enum LoadError {
    #[snafu(display("Failed to load segment"))]
    Load {
        #[snafu(implicit)]
        location: Location,
        source: ReadError,
    },

    #[snafu(display("Nothing to load"))]
    Empty,
}

fn read_segment() -> Result<(), ReadError> {
    Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        .context(ReadSnafu { path: "segment_v1.bin" })
}

#[test]
fn test_debug_prints_every_layer() {
    let err = read_segment().context(LoadSnafu).unwrap_err();
    let debug = format!("{err:?}");
    let lines = debug.lines().collect::<Vec<_>>();

    assert_eq!(3, lines.len(), "{debug}");
    assert!(lines[0].starts_with("0: Failed to load segment, at "));
    assert!(lines[0].contains("stack_trace_debug_test.rs"));
    assert!(lines[1].starts_with("1: Failed to read segment_v1.bin, at "));
    assert!(lines[2].starts_with("2: "));
    assert!(lines[2].contains("no such file"));

    let next = err.next().unwrap();
    assert_eq!("Failed to read segment_v1.bin", next.to_string());
    assert!(next.next().is_none());
}

#[test]
fn test_debug_without_location() {
    assert_eq!("0: Nothing to load", format!("{:?}", LoadError::Empty));
    assert!(LoadError::Empty.next().is_none());
}
