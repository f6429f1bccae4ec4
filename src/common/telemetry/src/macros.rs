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

//! Logging macros that accept an optional leading error, e.g.
//! `error!(e; "Failed to load artifact {}", path)`.

/// The standard logging macro.
#[macro_export]
macro_rules! log {
    // log!(target: "my_target", Level::INFO, "a {} event", "log");
    (target: $target:expr, $lvl:expr, $($arg:tt)+) => {{
        $crate::tracing::event!(target: $target, $lvl, $($arg)+)
    }};

    // log!(Level::INFO, "a log event")
    ($lvl:expr, $($arg:tt)+) => {{
        $crate::tracing::event!($lvl, $($arg)+)
    }};
}

/// Logs a message at the error level.
#[macro_export]
macro_rules! error {
    // error!(e; target: "my_target", "a {} event", "log")
    ($e:expr; target: $target:expr, $($arg:tt)+) => {{
        $crate::log!(
            target: $target,
            $crate::tracing::Level::ERROR,
            err = ?$e,
            $($arg)+
        )
    }};

    // error!(e; "a {} event", "log")
    ($e:expr; $($arg:tt)+) => {{
        $crate::log!(
            $crate::tracing::Level::ERROR,
            err = ?$e,
            $($arg)+
        )
    }};

    // error!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log!(target: $target, $crate::tracing::Level::ERROR, $($arg)+)
    }};

    // error!("a {} event", "log")
    ($($arg:tt)+) => {{
        $crate::log!($crate::tracing::Level::ERROR, $($arg)+)
    }};
}

/// Logs a message at the warn level.
#[macro_export]
macro_rules! warn {
    // warn!(e; "a {} event", "log")
    ($e:expr; $($arg:tt)+) => {{
        $crate::log!(
            $crate::tracing::Level::WARN,
            err = ?$e,
            $($arg)+
        )
    }};

    // warn!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log!(target: $target, $crate::tracing::Level::WARN, $($arg)+)
    }};

    // warn!("a {} event", "log")
    ($($arg:tt)+) => {{
        $crate::log!($crate::tracing::Level::WARN, $($arg)+)
    }};
}

/// Logs a message at the info level.
#[macro_export]
macro_rules! info {
    // info!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log!(target: $target, $crate::tracing::Level::INFO, $($arg)+)
    }};

    // info!("a {} event", "log")
    ($($arg:tt)+) => {{
        $crate::log!($crate::tracing::Level::INFO, $($arg)+)
    }};
}

/// Logs a message at the debug level.
#[macro_export]
macro_rules! debug {
    // debug!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log!(target: $target, $crate::tracing::Level::DEBUG, $($arg)+)
    }};

    // debug!("a {} event", "log")
    ($($arg:tt)+) => {{
        $crate::log!($crate::tracing::Level::DEBUG, $($arg)+)
    }};
}
