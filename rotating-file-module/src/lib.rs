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

//! # Rotating File Module
//!
//! This crate implements an append-only file writer that moves the file it writes to out of the
//! way once a time boundary has been crossed. It is meant for access logs: many request handlers
//! write complete lines concurrently, and the file is rotated rarely.
//!
//! ```rust
//! use rotating_file_module::{DailyRotation, RotatingWriter};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let writer = RotatingWriter::new(dir.path().join("access.log"), DailyRotation::new()).unwrap();
//! writer.write(b"GET / 200\n").unwrap();
//! assert_eq!(writer.current_size(), 10);
//! ```
//!
//! Rotated files are placed next to the active file, named `<stem>.<timestamp><ext>`. With
//! [`DailyRotation`] the timestamp is the date of the day that ended (`access.20240529.log`),
//! with [`PatternRotation`] it is the time formatted with a caller-supplied `strftime` format.
//!
//! Nothing is rotated while the file is empty, a boundary passing without traffic merely moves
//! the next boundary.

mod clock;
mod error;
pub mod policy;
mod writer;

#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use error::RotationError;
pub use policy::{
    DailyRotation, FileState, NeverRotate, PatternRotation, RollDecision, RotationPolicy,
};
pub use writer::RotatingWriter;
