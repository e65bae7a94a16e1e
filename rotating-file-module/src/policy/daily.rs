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

use chrono::{DateTime, Duration, Local};
use std::io::Error;
use std::time::SystemTime;

use super::{local_time, ArchiveName, FileState, RollDecision, RotationPolicy};

/// Rotates the file once per calendar day (local time)
///
/// The rotated file is named after the day it contains, e.g. `access.20240529.log`.
#[derive(Debug, Default, Clone)]
pub struct DailyRotation {
    naming: ArchiveName,
    rolling_point: Option<DateTime<Local>>,
}

impl DailyRotation {
    /// Creates the policy, it becomes active once the writer initializes it.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next rotation boundary, `None` before initialization
    pub fn rolling_point(&self) -> Option<DateTime<Local>> {
        self.rolling_point
    }
}

fn start_of_next_day(time: DateTime<Local>) -> DateTime<Local> {
    time.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .unwrap_or_else(|| time + Duration::days(1))
}

impl RotationPolicy for DailyRotation {
    fn initialize(&mut self, file: &FileState<'_>, now: SystemTime) -> Result<(), Error> {
        self.naming = ArchiveName::from_path(file.path)?;

        // A non-empty file may contain data from an earlier day
        let reference = match file.modified {
            Some(modified) if file.size > 0 => modified,
            _ => now,
        };
        self.rolling_point = Some(start_of_next_day(local_time(reference)));
        Ok(())
    }

    fn should_roll(&self, now: SystemTime, size: u64) -> RollDecision {
        let Some(rolling_point) = self.rolling_point else {
            return RollDecision::Wait;
        };

        if local_time(now) < rolling_point {
            RollDecision::Wait
        } else if size == 0 {
            RollDecision::Skip
        } else {
            let boundary_day = rolling_point.date_naive();
            let day = boundary_day.pred_opt().unwrap_or(boundary_day);
            RollDecision::Roll {
                target_name: self
                    .naming
                    .with_timestamp(&day.format("%Y%m%d").to_string()),
            }
        }
    }

    fn advance(&mut self, now: SystemTime) {
        self.rolling_point = Some(start_of_next_day(local_time(now)));
    }
}
