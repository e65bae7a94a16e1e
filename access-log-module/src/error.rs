// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Errors of the access log module

use rotating_file_module::RotationError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error compiling a log pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A `%` followed by a character that isn't a known directive
    #[error("unknown directive %{directive} at position {position}")]
    UnknownDirective {
        /// The character following `%`
        directive: char,
        /// Byte offset of the `%` character
        position: usize,
    },
    /// The pattern ends with a single `%`
    #[error("incomplete directive at the end of the pattern, position {position}")]
    IncompleteDirective {
        /// Byte offset of the `%` character
        position: usize,
    },
    /// A `%{` without the closing `}`
    #[error("unterminated %{{ at position {position}")]
    Unterminated {
        /// Byte offset of the `%` character
        position: usize,
    },
    /// A `%{…}` block not followed by `i`, `o` or `t`
    #[error("%{{{argument}}} at position {position} has to be followed by i, o or t")]
    MissingKind {
        /// Contents of the braces
        argument: String,
        /// Byte offset of the `%` character
        position: usize,
    },
    /// The name in `%{name}i` or `%{name}o` isn't a valid header name
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),
    /// The format in `%{format}t` isn't a valid `strftime` format
    #[error("invalid time format {0:?}")]
    InvalidTimeFormat(String),
}

/// Error setting up an access logger from its configuration
#[derive(Debug, Error)]
pub enum AccessLogError {
    /// The log format could not be compiled
    #[error("failed compiling log format: {0}")]
    Pattern(#[from] PatternError),
    /// The rotation settings are invalid
    #[error("invalid log rotation settings: {0}")]
    Rotation(#[from] RotationError),
    /// The log file could not be opened
    #[error("failed opening log file: {0}")]
    Io(#[from] io::Error),
    /// A configuration file could not be read
    #[error("failed reading configuration file {path}: {source}")]
    Config {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
