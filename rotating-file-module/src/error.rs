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

//! Errors returned when setting up rotation

use thiserror::Error;

/// Error constructing a rotation policy
#[derive(Debug, Error)]
pub enum RotationError {
    /// Pattern-based rotation was requested without a time format
    #[error("time pattern for log rotation is missing")]
    MissingPattern,
    /// The time format is not a valid `strftime` format
    #[error("invalid rotation time format {0:?}")]
    InvalidTimeFormat(String),
    /// The time format produces path separators and cannot be part of a file name
    #[error("rotation time format {0:?} produces a path separator")]
    PathSeparatorInFormat(String),
}
