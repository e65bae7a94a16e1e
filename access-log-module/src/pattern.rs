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

//! Compiles log patterns into templates
//!
//! A pattern is text with percent-directives, e.g. `%a - - %t "%r" %s %b`. Compilation happens
//! once at startup, the resulting [`Template`] is shared by all requests.

use chrono::format::{Item, StrftimeItems};
use http::HeaderName;
use std::str::FromStr;

use crate::error::PatternError;

/// Time format of `%t`, e.g. `10/Oct/2000:13:55:36 -0700`
pub const COMMON_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// The default plain text layout, preset name `default`
pub const DEFAULT_PATTERN: &str = r#"%{%Y-%m-%dT%H:%M:%S%.3f%z}t %a %A %{Host}i "%r" %s - %T "%{X-Real-IP}i" "%{X-Forwarded-For}i" %{Content-Length}i - %{Content-Length}o %b %{CDN}i"#;

/// Apache’s combined log format, preset name `combined`
pub const COMBINED_PATTERN: &str = r#"%a - - [%t] "%r" %s %b "%{Referer}i" "%{User-Agent}i""#;

/// A JSON object per line, preset name `json`
pub const JSON_PATTERN: &str = r#"{"category":"access","@timestamp":"%{%Y-%m-%dT%H:%M:%S%.3f%z}t","remote_addr":"%a","server_addr":"%A","host":"%{Host}i","request":"%r","status":"%s","first_byte_commit_time":"%F","request_time":"%T","http_x_real_ip":"%{X-Real-IP}i","http_x_forwarded_for":"%{X-Forwarded-For}i","content_length":"%{Content-Length}i","sent_http_content_length":"%{Content-Length}o","body_bytes_sent":"%b","http_cdn":"%{CDN}i"}"#;

/// Replaces a preset name by the corresponding pattern, anything else is returned unchanged.
pub fn resolve_preset(format: &str) -> &str {
    match format {
        "default" => DEFAULT_PATTERN,
        "combined" => COMBINED_PATTERN,
        "json" => JSON_PATTERN,
        pattern => pattern,
    }
}

/// A request or response property referenced by a directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogField {
    /// Client IP address, `%a`
    RemoteIp,
    /// Server IP address, `%A`
    LocalIp,
    /// Response body size or `-` if nothing was sent, `%b`
    BytesSentOrDash,
    /// Response body size, `%B`
    BytesSent,
    /// Request protocol like `HTTP/1.1`, `%H`
    Protocol,
    /// Request method, `%m`
    Method,
    /// Query string with the leading `?`, empty if there is none, `%q`
    QueryString,
    /// Request line like `GET /?a=b HTTP/1.1`, `%r`
    RequestLine,
    /// Response status code, `%s`
    Status,
    /// Request path, `%U`
    UrlPath,
    /// Processing time in milliseconds, `%D`
    LatencyMillis,
    /// Processing time in seconds, `%T`
    LatencySeconds,
    /// Milliseconds until the first response byte or `-`, `%F`
    FirstByteMillis,
    /// Request header value or `-`, `%{name}i`
    RequestHeader(HeaderName),
    /// Response header value or `-`, `%{name}o`
    ResponseHeader(HeaderName),
    /// Time the request was received in a `strftime` format, `%t` or `%{format}t`
    ReceivedAt(String),
}

impl LogField {
    fn from_directive(directive: char) -> Option<Self> {
        Some(match directive {
            'a' => Self::RemoteIp,
            'A' => Self::LocalIp,
            'b' => Self::BytesSentOrDash,
            'B' => Self::BytesSent,
            'H' => Self::Protocol,
            'm' => Self::Method,
            'q' => Self::QueryString,
            'r' => Self::RequestLine,
            's' => Self::Status,
            't' => Self::ReceivedAt(COMMON_TIME_FORMAT.to_owned()),
            'U' => Self::UrlPath,
            'D' => Self::LatencyMillis,
            'T' => Self::LatencySeconds,
            'F' => Self::FirstByteMillis,
            _ => return None,
        })
    }
}

/// Part of a compiled template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied verbatim
    Literal(String),
    /// A field resolved for each request
    Field(LogField),
}

/// A compiled log pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

fn header_name(argument: &str) -> Result<HeaderName, PatternError> {
    HeaderName::from_bytes(argument.to_ascii_lowercase().as_bytes())
        .map_err(|_| PatternError::InvalidHeaderName(argument.to_owned()))
}

fn time_format(argument: String) -> Result<String, PatternError> {
    if argument.is_empty() || StrftimeItems::new(&argument).any(|item| matches!(item, Item::Error))
    {
        Err(PatternError::InvalidTimeFormat(argument))
    } else {
        Ok(argument)
    }
}

impl Template {
    /// Compiles a pattern.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.char_indices();

        while let Some((position, c)) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let field = match chars.next() {
                None => return Err(PatternError::IncompleteDirective { position }),
                Some((_, '%')) => {
                    literal.push('%');
                    continue;
                }
                Some((_, '{')) => {
                    let mut argument = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) => argument.push(c),
                            None => return Err(PatternError::Unterminated { position }),
                        }
                    }

                    match chars.next() {
                        Some((_, 'i')) => LogField::RequestHeader(header_name(&argument)?),
                        Some((_, 'o')) => LogField::ResponseHeader(header_name(&argument)?),
                        Some((_, 't')) => LogField::ReceivedAt(time_format(argument)?),
                        _ => return Err(PatternError::MissingKind { argument, position }),
                    }
                }
                Some((_, directive)) => LogField::from_directive(directive)
                    .ok_or(PatternError::UnknownDirective {
                        directive,
                        position,
                    })?,
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field(field));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Literal text and fields in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Checks whether the template references the given field.
    pub fn uses(&self, field: &LogField) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Field(f) if f == field))
    }
}

impl FromStr for Template {
    type Err = PatternError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        Self::compile(pattern)
    }
}
