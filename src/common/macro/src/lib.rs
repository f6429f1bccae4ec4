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

mod stack_trace_debug;

use proc_macro::TokenStream;

/// Attribute macro to derive [std::fmt::Debug] for the annotated `Error` type.
///
/// The generated `Debug` implementation prints the error in a stack trace
/// style, one layer per line:
///
/// ```plaintext
/// 0: Failed to read region file /data/cf/1_region_0.hfile, at src/local-store/src/store.rs:137:63
/// 1: Invalid region file: bad magic, at src/store-api/src/sst/reader.rs:80:13
/// ```
///
/// Fields named `source` are internal errors and are printed recursively.
/// Fields named `error` are external errors and are printed with their own
/// `Debug` as the last layer.
#[proc_macro_attribute]
pub fn stack_trace_debug(args: TokenStream, input: TokenStream) -> TokenStream {
    stack_trace_debug::stack_trace_style_impl(args.into(), input.into()).into()
}
