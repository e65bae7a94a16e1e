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

//! The rotating writer shared by all request handlers

use log::{debug, info};
use std::fs::{self, File};
use std::io::{Error, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::clock::{Clock, SystemClock};
use crate::policy::{FileState, RollDecision, RotationPolicy};

#[derive(Debug)]
struct Active {
    file: Option<File>,
    policy: Box<dyn RotationPolicy>,
}

/// Append-only file writer rotating the file according to a [`RotationPolicy`]
///
/// Writes from multiple threads proceed in parallel under a shared lock. Only a rotation takes
/// the exclusive lock: the rotation version seen before the policy reported a due rotation is
/// checked again under the exclusive lock, so that a generation is never rolled twice when
/// several writers notice the boundary at the same time.
///
/// An I/O error while rotating leaves the writer without an open file, all further writes fail
/// until [`RotatingWriter::reopen`] succeeds.
#[derive(Debug)]
pub struct RotatingWriter {
    path: PathBuf,
    active: RwLock<Active>,
    size: AtomicU64,
    version: AtomicU64,
    clock: Arc<dyn Clock>,
}

fn prepare_directory(path: &Path) -> Result<(), Error> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn open_file(path: &Path) -> Result<File, Error> {
    File::options().append(true).create(true).open(path)
}

fn open_and_initialize(
    path: &Path,
    policy: &mut dyn RotationPolicy,
    now: SystemTime,
) -> Result<(File, u64), Error> {
    prepare_directory(path)?;
    let file = open_file(path)?;
    let metadata = file.metadata()?;
    let state = FileState {
        path,
        size: metadata.len(),
        modified: metadata.modified().ok(),
    };
    policy.initialize(&state, now)?;
    Ok((file, state.size))
}

fn poisoned<T>(_: T) -> Error {
    Error::other("log writer lock poisoned")
}

fn unavailable(path: &Path) -> Error {
    Error::other(format!(
        "log file {} is not open, it was closed or a rotation failed",
        path.display()
    ))
}

impl RotatingWriter {
    /// Opens the file at `path` for appending, creating it and its parent directories if
    /// necessary.
    pub fn new(
        path: impl Into<PathBuf>,
        policy: impl RotationPolicy + 'static,
    ) -> Result<Self, Error> {
        Self::with_clock(path, Box::new(policy), Arc::new(SystemClock))
    }

    /// Same as [`RotatingWriter::new`] but taking the time from the given clock.
    pub fn with_clock(
        path: impl Into<PathBuf>,
        mut policy: Box<dyn RotationPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let path = path.into();
        let (file, size) = open_and_initialize(&path, policy.as_mut(), clock.now())?;
        debug!("Opened log file {} with {size} bytes", path.display());

        Ok(Self {
            path,
            active: RwLock::new(Active {
                file: Some(file),
                policy,
            }),
            size: AtomicU64::new(size),
            version: AtomicU64::new(0),
            clock,
        })
    }

    /// Path of the active file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the active file in bytes as far as this writer knows
    pub fn current_size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Number of rotations performed so far
    pub fn rotation_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Appends `buf` to the active file, rotating it first if the policy says so.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        self.check_rolling()?;

        let active = self.active.read().map_err(poisoned)?;
        let mut file = active.file.as_ref().ok_or_else(|| unavailable(&self.path))?;
        file.write_all(buf)?;
        self.size.fetch_add(buf.len() as u64, Ordering::AcqRel);
        Ok(buf.len())
    }

    fn check_rolling(&self) -> Result<(), Error> {
        let seen = self.rotation_version();
        let now = self.clock.now();
        let due = {
            let active = self.active.read().map_err(poisoned)?;
            active.policy.should_roll(now, self.current_size()) != RollDecision::Wait
        };

        if due {
            self.roll_if_due(seen, now)?;
        }
        Ok(())
    }

    fn roll_if_due(&self, seen: u64, now: SystemTime) -> Result<(), Error> {
        let mut active = self.active.write().map_err(poisoned)?;
        if self.rotation_version() != seen {
            // Another writer rotated in the meantime
            return Ok(());
        }
        if active.file.is_none() {
            return Err(unavailable(&self.path));
        }

        let decision = active.policy.should_roll(now, self.current_size());
        match decision {
            RollDecision::Wait => {}
            RollDecision::Skip => {
                debug!(
                    "Rotation boundary passed while {} is empty, nothing to rotate",
                    self.path.display()
                );
                active.policy.advance(now);
            }
            RollDecision::Roll { target_name } => {
                self.roll_locked(&mut active, &target_name)?;
                active.policy.advance(now);
            }
        }
        Ok(())
    }

    fn roll_locked(&self, active: &mut Active, target_name: &str) -> Result<(), Error> {
        drop(active.file.take());

        let target = self.path.with_file_name(target_name);
        fs::rename(&self.path, &target)?;
        active.file = Some(open_file(&self.path)?);
        self.size.store(0, Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);

        info!(
            "Rotated log file {} to {}",
            self.path.display(),
            target.display()
        );
        Ok(())
    }

    /// Rotates the active file to `target_name` (in the same directory) right away, regardless
    /// of the policy.
    pub fn roll(&self, target_name: &str) -> Result<(), Error> {
        let mut active = self.active.write().map_err(poisoned)?;
        self.roll_locked(&mut active, target_name)
    }

    /// Closes the active file and opens the configured path again, e.g. after the file has been
    /// moved away by an external tool. This also recovers from a failed rotation.
    pub fn reopen(&self) -> Result<(), Error> {
        let mut active = self.active.write().map_err(poisoned)?;
        drop(active.file.take());

        let (file, size) =
            open_and_initialize(&self.path, active.policy.as_mut(), self.clock.now())?;
        active.file = Some(file);
        self.size.store(size, Ordering::Release);

        info!("Reopened log file {}", self.path.display());
        Ok(())
    }

    /// Closes the active file, further writes will fail.
    pub fn close(&self) -> Result<(), Error> {
        let mut active = self.active.write().map_err(poisoned)?;
        match active.file.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        RotatingWriter::write(self, buf)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
