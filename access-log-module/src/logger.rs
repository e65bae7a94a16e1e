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

//! The access logger tying templates, pools and destinations together

use http::request::Parts;
use log::{debug, warn};
use rotating_file_module::{
    DailyRotation, NeverRotate, PatternRotation, RotatingWriter, RotationPolicy, SystemClock,
};
use std::fmt::Debug;
use std::io::{stdout, Error, Stdout, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::configuration::{AccessLogConf, RotationConf};
use crate::error::{AccessLogError, PatternError};
use crate::observer::{ResponseObserver, ResponseSink};
use crate::pattern::{resolve_preset, Template};
use crate::pool::{default_pool_size, Pool, Pooled};
use crate::record::RequestRecord;
use crate::renderer::Renderer;

/// Destination of rendered log lines
///
/// Implementations must write each line with a single write so that lines of concurrent requests
/// don’t interleave.
pub trait LogSink: Debug + Send + Sync {
    /// Writes one complete line including the trailing newline.
    fn write_line(&self, line: &[u8]) -> Result<(), Error>;

    /// Reopens the destination, e.g. after the file has been moved away.
    fn reopen(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Flushes and releases the destination, further writes may fail.
    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl LogSink for RotatingWriter {
    fn write_line(&self, line: &[u8]) -> Result<(), Error> {
        self.write(line).map(|_| ())
    }

    fn reopen(&self) -> Result<(), Error> {
        RotatingWriter::reopen(self)
    }

    fn close(&self) -> Result<(), Error> {
        RotatingWriter::close(self)
    }
}

impl LogSink for Stdout {
    fn write_line(&self, line: &[u8]) -> Result<(), Error> {
        self.lock().write_all(line)
    }

    fn close(&self) -> Result<(), Error> {
        self.lock().flush()
    }
}

impl<W: Write + Send + Debug> LogSink for Mutex<W> {
    fn write_line(&self, line: &[u8]) -> Result<(), Error> {
        let mut writer = self
            .lock()
            .map_err(|_| Error::other("log writer lock poisoned"))?;
        writer.write_all(line)?;
        writer.flush()
    }

    fn close(&self) -> Result<(), Error> {
        self.lock()
            .map_err(|_| Error::other("log writer lock poisoned"))?
            .flush()
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn write_line(&self, line: &[u8]) -> Result<(), Error> {
        (**self).write_line(line)
    }

    fn reopen(&self) -> Result<(), Error> {
        (**self).reopen()
    }

    fn close(&self) -> Result<(), Error> {
        (**self).close()
    }
}

/// Renders HTTP exchanges and writes them to a [`LogSink`]
///
/// The logger is meant to be shared between all request handlers, e.g. via `Arc`.
#[derive(Debug)]
pub struct AccessLogger {
    renderer: Renderer,
    records: Pool<RequestRecord>,
    sink: Box<dyn LogSink>,
}

impl AccessLogger {
    /// Compiles the pattern and creates a logger writing to `sink`.
    ///
    /// Preset names aren’t recognized here, see [`resolve_preset`] for that.
    pub fn new(pattern: &str, sink: impl LogSink + 'static) -> Result<Self, PatternError> {
        Self::with_pool_size(pattern, sink, default_pool_size())
    }

    /// Same as [`AccessLogger::new`] but keeping up to `pool_size` idle records and buffers.
    pub fn with_pool_size(
        pattern: &str,
        sink: impl LogSink + 'static,
        pool_size: usize,
    ) -> Result<Self, PatternError> {
        let template = Template::compile(pattern)?;
        Ok(Self::from_parts(template, Box::new(sink), pool_size))
    }

    fn from_parts(template: Template, sink: Box<dyn LogSink>, pool_size: usize) -> Self {
        Self {
            renderer: Renderer::new(Arc::new(template), pool_size),
            records: Pool::new(pool_size),
            sink,
        }
    }

    /// Creates a logger from configuration, `None` if logging is disabled.
    pub fn from_conf(conf: &AccessLogConf) -> Result<Option<Self>, AccessLogError> {
        if conf.log_file.as_os_str().is_empty() {
            debug!("Access logging is disabled");
            return Ok(None);
        }

        let template = Template::compile(resolve_preset(&conf.log_format))?;
        let pool_size = conf.pool_size.unwrap_or_else(default_pool_size);

        let sink: Box<dyn LogSink> = if conf.log_file.as_os_str() == "-" {
            if conf.rotation != RotationConf::None {
                warn!("Ignoring log rotation settings, logging to standard output");
            }
            Box::new(stdout())
        } else {
            let policy: Box<dyn RotationPolicy> = match &conf.rotation {
                RotationConf::None => Box::new(NeverRotate),
                RotationConf::Daily => Box::new(DailyRotation::new()),
                RotationConf::Pattern(format) => Box::new(PatternRotation::new(format.as_str())?),
            };
            Box::new(RotatingWriter::with_clock(
                conf.log_file.clone(),
                policy,
                Arc::new(SystemClock),
            )?)
        };

        Ok(Some(Self::from_parts(template, sink, pool_size)))
    }

    /// The compiled log format
    pub fn template(&self) -> &Template {
        self.renderer.template()
    }

    /// Checks out an empty record, it returns to the pool when dropped.
    pub fn record(&self) -> Pooled<'_, RequestRecord> {
        self.records.get()
    }

    /// Writes one line for the record. Errors of the destination are passed on unchanged.
    pub fn log(&self, record: &RequestRecord) -> Result<(), Error> {
        let line = self.renderer.render(record);
        self.sink.write_line(&line)
    }

    /// Captures a completed exchange and logs it.
    pub fn log_exchange<S: ResponseSink>(
        &self,
        request: &Parts,
        remote_addr: Option<SocketAddr>,
        response: &ResponseObserver<S>,
        received_at: SystemTime,
        latency: Duration,
    ) -> Result<(), Error> {
        let mut record = self.record();
        record.fill_request(request, remote_addr, received_at);
        record.fill_response(response, latency);
        self.log(&record)
    }

    /// Reopens the destination.
    pub fn reopen(&self) -> Result<(), Error> {
        self.sink.reopen()
    }

    /// Flushes and closes the destination. Logging afterwards fails for file destinations.
    pub fn close(&self) -> Result<(), Error> {
        self.sink.close()
    }
}
