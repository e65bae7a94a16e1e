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

use chrono::format::{Item, StrftimeItems};
use std::io::Error;
use std::time::SystemTime;

use super::{local_time, ArchiveName, FileState, RollDecision, RotationPolicy};
use crate::RotationError;

/// Rotates the file whenever the current time formatted with a `strftime` format changes
///
/// With the format `%Y%m%d%H` the file is rotated hourly and archived as
/// `access.2024052910.log` for example. The formatted time is used as part of a file name, so it
/// cannot contain path separators.
#[derive(Debug, Clone)]
pub struct PatternRotation {
    format: String,
    naming: ArchiveName,
    timestamp: String,
}

impl PatternRotation {
    /// Creates the policy from a `strftime` format.
    ///
    /// Fails with [`RotationError::MissingPattern`] if the format is empty.
    pub fn new(format: impl Into<String>) -> Result<Self, RotationError> {
        let format = format.into();
        if format.is_empty() {
            return Err(RotationError::MissingPattern);
        }

        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(RotationError::InvalidTimeFormat(format));
        }

        let sample = local_time(SystemTime::UNIX_EPOCH)
            .format(&format)
            .to_string();
        if sample.contains(['/', '\\']) {
            return Err(RotationError::PathSeparatorInFormat(format));
        }

        Ok(Self {
            format,
            naming: ArchiveName::default(),
            timestamp: String::new(),
        })
    }

    /// The `strftime` format
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Formatted time of the data currently being written
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn stamp(&self, time: SystemTime) -> String {
        local_time(time).format(&self.format).to_string()
    }
}

impl RotationPolicy for PatternRotation {
    fn initialize(&mut self, file: &FileState<'_>, now: SystemTime) -> Result<(), Error> {
        self.naming = ArchiveName::from_path(file.path)?;

        let reference = match file.modified {
            Some(modified) if file.size > 0 => modified,
            _ => now,
        };
        self.timestamp = self.stamp(reference);
        Ok(())
    }

    fn should_roll(&self, now: SystemTime, size: u64) -> RollDecision {
        if self.stamp(now) == self.timestamp {
            RollDecision::Wait
        } else if size == 0 {
            RollDecision::Skip
        } else {
            RollDecision::Roll {
                target_name: self.naming.with_timestamp(&self.timestamp),
            }
        }
    }

    fn advance(&mut self, now: SystemTime) {
        self.timestamp = self.stamp(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Local, TimeZone};
    use std::path::Path;
    use test_log::test;

    fn at(day: u32, hour: u32) -> SystemTime {
        Local
            .with_ymd_and_hms(2024, 5, day, hour, 30, 0)
            .unwrap()
            .into()
    }

    fn initialized(
        format: &str,
        size: u64,
        modified: SystemTime,
        now: SystemTime,
    ) -> PatternRotation {
        let mut policy = PatternRotation::new(format).unwrap();
        policy
            .initialize(
                &FileState {
                    path: Path::new("logs/access.log"),
                    size,
                    modified: Some(modified),
                },
                now,
            )
            .unwrap();
        policy
    }

    #[test]
    fn invalid_formats() {
        assert!(matches!(
            PatternRotation::new(""),
            Err(RotationError::MissingPattern)
        ));
        assert!(matches!(
            PatternRotation::new("%Y%Q"),
            Err(RotationError::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            PatternRotation::new("%Y/%m/%d"),
            Err(RotationError::PathSeparatorInFormat(_))
        ));
        assert_eq!(
            PatternRotation::new("%Y%m%d%H").unwrap().format(),
            "%Y%m%d%H"
        );
    }

    #[test]
    fn timestamp_from_modification_time() {
        let policy = initialized("%Y%m%d%H", 10, at(28, 23), at(29, 10));
        assert_eq!(policy.timestamp(), "2024052823");

        let policy = initialized("%Y%m%d%H", 0, at(28, 23), at(29, 10));
        assert_eq!(policy.timestamp(), "2024052910");
    }

    #[test]
    fn roll_uses_previous_timestamp() {
        let mut policy = initialized("%Y%m%d%H", 10, at(29, 10), at(29, 10));
        assert_eq!(policy.should_roll(at(29, 10), 10), RollDecision::Wait);
        assert_eq!(
            policy.should_roll(at(29, 11), 10),
            RollDecision::Roll {
                target_name: "access.2024052910.log".to_owned()
            }
        );

        policy.advance(at(29, 11));
        assert_eq!(policy.timestamp(), "2024052911");
        assert_eq!(policy.should_roll(at(29, 11), 10), RollDecision::Wait);
    }

    #[test]
    fn empty_file_adopts_new_timestamp() {
        let mut policy = initialized("%Y%m%d", 0, at(27, 10), at(27, 10));
        assert_eq!(policy.should_roll(at(29, 10), 0), RollDecision::Skip);

        policy.advance(at(29, 10));
        assert_eq!(policy.timestamp(), "20240529");
        assert_eq!(policy.should_roll(at(29, 12), 30), RollDecision::Wait);
    }
}
