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

//! Rotation policies deciding when the active file is archived and under which name
//!
//! A policy is consulted twice for every rotation. [`RotationPolicy::should_roll`] is an advisory
//! check that may run concurrently with writes and never changes the policy. Only once the writer
//! holds its exclusive lock is the decision re-evaluated and [`RotationPolicy::advance`] called.

mod daily;
mod pattern;

use chrono::{DateTime, Local};
use std::fmt::Debug;
use std::io::{Error, ErrorKind};
use std::path::Path;
use std::time::SystemTime;

pub use daily::DailyRotation;
pub use pattern::PatternRotation;

/// State of the active file as seen when it is opened
#[derive(Debug, Clone, Copy)]
pub struct FileState<'a> {
    /// Path of the active file
    pub path: &'a Path,
    /// Current size in bytes
    pub size: u64,
    /// Last modification time if the file system reports one
    pub modified: Option<SystemTime>,
}

/// Outcome of a rotation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollDecision {
    /// No boundary has been crossed
    Wait,
    /// A boundary has been crossed but the file is empty, only the boundary needs to move
    Skip,
    /// The active file has to be renamed to `target_name`, in the same directory
    Roll {
        /// File name of the archived file
        target_name: String,
    },
}

/// Decides when the active file is rotated
pub trait RotationPolicy: Debug + Send + Sync {
    /// Derives the policy state from the file that has just been opened.
    fn initialize(&mut self, file: &FileState<'_>, now: SystemTime) -> Result<(), Error>;

    /// Checks whether a boundary has been crossed at `now` given the current file size.
    fn should_roll(&self, now: SystemTime, size: u64) -> RollDecision;

    /// Moves on to the next boundary after a rotation or a skipped boundary.
    fn advance(&mut self, now: SystemTime);
}

/// Policy for files that are never rotated by the writer itself
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRotate;

impl RotationPolicy for NeverRotate {
    fn initialize(&mut self, _file: &FileState<'_>, _now: SystemTime) -> Result<(), Error> {
        Ok(())
    }

    fn should_roll(&self, _now: SystemTime, _size: u64) -> RollDecision {
        RollDecision::Wait
    }

    fn advance(&mut self, _now: SystemTime) {}
}

/// File name split into stem and extension, the timestamp of a rotated file goes in between
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ArchiveName {
    stem: String,
    extension: String,
}

impl ArchiveName {
    pub(crate) fn from_path(path: &Path) -> Result<Self, Error> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("log file path {} has no usable file name", path.display()),
                )
            })?;

        let (stem, extension) = match name.rfind('.') {
            Some(pos) => name.split_at(pos),
            None => (name, ""),
        };
        Ok(Self {
            stem: stem.to_owned(),
            extension: extension.to_owned(),
        })
    }

    pub(crate) fn with_timestamp(&self, timestamp: &str) -> String {
        format!("{}.{timestamp}{}", self.stem, self.extension)
    }
}

pub(crate) fn local_time(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}
