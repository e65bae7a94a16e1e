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

//! # Access Log Module
//!
//! This crate captures HTTP exchanges and renders them into access log lines described by
//! Apache-style patterns. A configuration could look like this:
//!
//! ```yaml
//! log_file: logs/access.log
//! log_format: combined
//! rotation: daily
//! ```
//!
//! The `log_file`, `log_format` and rotation settings are also available as command line
//! options, see [`AccessLogOpt`].
//!
//! Special values of `log_file` are an empty string (disable logging) and `-` (write to standard
//! output). `log_format` is either one of the presets `default`, `combined` and `json` or a
//! pattern. The supported directives are:
//!
//! * `%a`: client’s IP address
//! * `%A`: server’s IP address, discovered at startup if the connection doesn’t provide it
//! * `%b`: response body size, `-` if nothing was sent
//! * `%B`: response body size
//! * `%H`: request protocol, e.g. `HTTP/1.1`
//! * `%m`: request method
//! * `%q`: query string prefixed with `?`, empty if there is none
//! * `%r`: request line, e.g. `GET /?a=b HTTP/1.1`
//! * `%s`: response status code
//! * `%t`: time the request was received, e.g. `10/Oct/2000:13:55:36 -0700`
//! * `%{format}t`: time the request was received in a `strftime` format
//! * `%U`: request path without the query string
//! * `%D`: processing time in milliseconds
//! * `%T`: processing time in seconds with millisecond precision
//! * `%F`: milliseconds until the first response byte, `-` if nothing was sent
//! * `%{name}i`: value of a request header, `-` if missing
//! * `%{name}o`: value of a response header, `-` if missing
//! * `%%`: a literal percent sign
//!
//! Non-printable characters, quotation marks and backslashes in request-derived values are
//! escaped as `\xNN`.
//!
//! Rotation is either `none`, `daily` (rotated files are named like `access.20240529.log`) or
//! `{pattern: "%Y%m%d%H"}` where the file is rotated whenever the formatted time changes. On
//! Unix-based systems, [`signal::reopen_on_signal`] makes the process reopen the log file on
//! `HUP` or `USR1` signals.
//!
//! ## Code example
//!
//! ```rust
//! use access_log_module::{AccessLogger, BufferedResponse, ResponseObserver};
//! use http::{Request, StatusCode};
//! use std::sync::{Arc, Mutex};
//! use std::time::SystemTime;
//!
//! let output = Arc::new(Mutex::new(Vec::new()));
//! let logger = AccessLogger::new(r#"%a "%r" %s %b"#, output.clone()).unwrap();
//!
//! let received_at = SystemTime::now();
//! let (request, ()) = Request::get("/hello").body(()).unwrap().into_parts();
//!
//! let mut response = ResponseObserver::new(BufferedResponse::default());
//! response.write_header(StatusCode::OK).unwrap();
//! response.write_body(b"Hello!").unwrap();
//!
//! let latency = received_at.elapsed().unwrap_or_default();
//! let remote_addr = "127.0.0.1:1234".parse().ok();
//! logger
//!     .log_exchange(&request, remote_addr, &response, received_at, latency)
//!     .unwrap();
//!
//! assert_eq!(
//!     output.lock().unwrap().as_slice(),
//!     b"127.0.0.1 \"GET /hello HTTP/1.1\" 200 6\n"
//! );
//! ```

pub mod configuration;
mod error;
mod logger;
mod observer;
pub mod pattern;
mod pool;
mod record;
mod renderer;
#[cfg(unix)]
pub mod signal;

pub use configuration::{AccessLogConf, AccessLogOpt, RotationConf};
pub use error::{AccessLogError, PatternError};
pub use logger::{AccessLogger, LogSink};
pub use observer::{BufferedResponse, ResponseObserver, ResponseSink, ResponseState};
pub use pattern::Template;
pub use pool::{default_pool_size, Pool, Pooled, Reusable, MAX_RETAINED_CAPACITY};
pub use record::RequestRecord;
pub use renderer::Renderer;
