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

//! Unix signal processing

use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

use crate::logger::AccessLogger;

fn listen_to_signal(kind: SignalKind, logger: Arc<AccessLogger>) {
    tokio::spawn(async move {
        let mut sig = match signal(kind) {
            Ok(sig) => sig,
            Err(err) => {
                warn!(
                    "Failed registering for signal {}: {err}",
                    kind.as_raw_value()
                );
                return;
            }
        };

        while sig.recv().await.is_some() {
            info!("Received signal {}, reopening access log", kind.as_raw_value());
            if let Err(err) = logger.reopen() {
                error!("Failed reopening access log: {err}");
            }
        }
    });
}

/// Makes the logger reopen its destination whenever the process receives `HUP` or `USR1`.
///
/// This is useful after the log file has been moved away by external tools. Has to be called
/// within a tokio runtime.
pub fn reopen_on_signal(logger: &Arc<AccessLogger>) {
    listen_to_signal(SignalKind::hangup(), logger.clone());
    listen_to_signal(SignalKind::user_defined1(), logger.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    use rotating_file_module::{NeverRotate, RotatingWriter};
    use std::fs;
    use std::process::{self, Command};
    use std::time::Duration;
    use test_log::test;

    #[test(tokio::test)]
    async fn hangup_reopens_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let writer = RotatingWriter::new(&path, NeverRotate).unwrap();
        let logger = Arc::new(AccessLogger::new("%s", writer).unwrap());

        reopen_on_signal(&logger);
        // Give the listener tasks a chance to register
        tokio::time::sleep(Duration::from_millis(50)).await;

        logger.log(&logger.record()).unwrap();
        let moved = dir.path().join("access.moved.log");
        fs::rename(&path, &moved).unwrap();

        let status = Command::new("kill")
            .args(["-HUP", &process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(path.exists());

        logger.log(&logger.record()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "200\n");
        assert_eq!(fs::read_to_string(&moved).unwrap(), "200\n");
    }
}
