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

//! Observes a response while it is being written

use http::{HeaderMap, StatusCode};
use log::warn;
use rotating_file_module::{Clock, SystemClock};
use std::io::{Error, Write};
use std::sync::Arc;
use std::time::SystemTime;

/// The response writing capability of an HTTP server
///
/// [`ResponseObserver`] forwards all calls to an implementation of this trait.
pub trait ResponseSink {
    /// Response headers to be sent
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the response headers, only effective before the header is sent
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and headers.
    fn send_header(&mut self, status: StatusCode) -> Result<(), Error>;

    /// Sends part of the response body, returns the number of bytes accepted.
    fn send_body(&mut self, data: &[u8]) -> Result<usize, Error>;

    /// Pushes buffered data to the network.
    fn flush(&mut self) -> Result<(), Error>;
}

/// Progress of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// Nothing sent yet
    NotStarted,
    /// Status and headers sent
    HeadersSent,
    /// Body data is being sent
    Streaming,
}

/// Wraps a [`ResponseSink`], recording status, body size and the time of the first byte sent
///
/// The status defaults to `200 OK` if body data is written or the response is flushed without
/// an explicit call to [`ResponseObserver::write_header`].
#[derive(Debug)]
pub struct ResponseObserver<S> {
    inner: S,
    clock: Arc<dyn Clock>,
    state: ResponseState,
    status: StatusCode,
    first_byte_at: Option<SystemTime>,
    bytes_sent: u64,
}

impl<S: ResponseSink> ResponseObserver<S> {
    /// Wraps a response.
    pub fn new(inner: S) -> Self {
        Self::with_clock(inner, Arc::new(SystemClock))
    }

    /// Wraps a response, taking timestamps from the given clock.
    pub fn with_clock(inner: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            clock,
            state: ResponseState::NotStarted,
            status: StatusCode::OK,
            first_byte_at: None,
            bytes_sent: 0,
        }
    }

    /// Sends status and headers.
    ///
    /// Only the first call has an effect. Once the header is on its way, the status cannot change
    /// any more: a repeated call with the same status is a no-op, a different status is ignored
    /// with a warning.
    pub fn write_header(&mut self, status: StatusCode) -> Result<(), Error> {
        if self.state != ResponseState::NotStarted {
            if status != self.status {
                warn!(
                    "Ignoring response status {status}, status {} has been sent already",
                    self.status
                );
            }
            return Ok(());
        }

        self.inner.send_header(status)?;
        self.status = status;
        if self.first_byte_at.is_none() {
            self.first_byte_at = Some(self.clock.now());
        }
        self.state = ResponseState::HeadersSent;
        Ok(())
    }

    /// Sends body data, sending the header first if necessary.
    pub fn write_body(&mut self, data: &[u8]) -> Result<usize, Error> {
        if self.state == ResponseState::NotStarted {
            self.write_header(StatusCode::OK)?;
        }

        let written = self.inner.send_body(data)?;
        self.bytes_sent += written as u64;
        self.state = ResponseState::Streaming;
        Ok(written)
    }

    /// Flushes the response, sending the header first if necessary.
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.state == ResponseState::NotStarted {
            self.write_header(StatusCode::OK)?;
        }
        self.inner.flush()
    }

    /// Status sent, or the default `200 OK`
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response body bytes sent so far, headers not included
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Time the header was sent, `None` if nothing was sent yet
    pub fn first_byte_at(&self) -> Option<SystemTime> {
        self.first_byte_at
    }

    /// Current state of the response
    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Mutable response headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// The wrapped response
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the response.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ResponseSink> Write for ResponseObserver<S> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.write_body(buf)
    }

    fn flush(&mut self) -> Result<(), Error> {
        ResponseObserver::flush(self)
    }
}

/// A response kept in memory
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BufferedResponse {
    /// Status sent, if any
    pub status: Option<StatusCode>,
    /// Number of times a header was sent
    pub header_writes: usize,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
    /// Number of flushes
    pub flushes: usize,
}

impl ResponseSink for BufferedResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn send_header(&mut self, status: StatusCode) -> Result<(), Error> {
        self.status = Some(status);
        self.header_writes += 1;
        Ok(())
    }

    fn send_body(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.flushes += 1;
        Ok(())
    }
}
