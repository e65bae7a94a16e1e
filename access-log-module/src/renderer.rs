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

//! Turns request records into log lines

use chrono::{DateTime, Local};
use http::{HeaderMap, HeaderName};
use log::{debug, warn};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;

use crate::pattern::{LogField, Segment, Template};
use crate::pool::{Pool, Pooled};
use crate::record::RequestRecord;

fn write_escaped(buf: &mut Vec<u8>, data: impl AsRef<[u8]>) -> Result<(), std::io::Error> {
    fn is_allowed(byte: u8) -> bool {
        (b' '..=b'~').contains(&byte) && byte != b'"' && byte != b'\\'
    }

    for byte in data.as_ref() {
        if is_allowed(*byte) {
            buf.push(*byte);
        } else {
            let _ = write!(buf, "\\x{byte:02x}");
        }
    }

    Ok(())
}

fn write_header(
    buf: &mut Vec<u8>,
    headers: &HeaderMap,
    name: &HeaderName,
) -> Result<(), std::io::Error> {
    match headers.get(name) {
        Some(value) if !value.is_empty() => write_escaped(buf, value),
        _ => write!(buf, "-"),
    }
}

/// Determines the address of the interface used for outgoing traffic.
///
/// Connecting a UDP socket doesn’t send anything, it merely selects a route.
fn discover_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(1, 2, 3, 4), 1)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Renders records according to a compiled template
#[derive(Debug)]
pub struct Renderer {
    template: Arc<Template>,
    local_ip: Option<IpAddr>,
    buffers: Pool<Vec<u8>>,
}

impl Renderer {
    /// Creates a renderer keeping up to `pool_size` idle line buffers.
    ///
    /// The server address is only looked up if the template contains `%A`. If it cannot be
    /// determined, records without a local address are logged with `-` there.
    pub fn new(template: Arc<Template>, pool_size: usize) -> Self {
        let local_ip = if template.uses(&LogField::LocalIp) {
            let local_ip = discover_local_ip();
            match local_ip {
                Some(ip) => debug!("Using {ip} as local IP address"),
                None => warn!("Failed determining local IP address, logging - instead"),
            }
            local_ip
        } else {
            None
        };

        Self {
            template,
            local_ip,
            buffers: Pool::new(pool_size),
        }
    }

    /// The template used by this renderer
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Renders a record into a newline-terminated line.
    ///
    /// The buffer returns to the renderer’s pool once dropped.
    pub fn render(&self, record: &RequestRecord) -> Pooled<'_, Vec<u8>> {
        let mut buf = self.buffers.get();
        for segment in self.template.segments() {
            match segment {
                Segment::Literal(text) => buf.extend_from_slice(text.as_bytes()),
                Segment::Field(field) => self.render_field(&mut buf, field, record),
            }
        }
        buf.push(b'\n');
        buf
    }

    fn render_field(&self, buf: &mut Vec<u8>, field: &LogField, record: &RequestRecord) {
        let _ = match field {
            LogField::RemoteIp => match record.remote_addr {
                Some(addr) => write!(buf, "{}", addr.ip()),
                None => write!(buf, "-"),
            },
            LogField::LocalIp => match record.local_addr.map(|addr| addr.ip()).or(self.local_ip) {
                Some(ip) => write!(buf, "{ip}"),
                None => write!(buf, "-"),
            },
            LogField::BytesSentOrDash => {
                if record.bytes_sent == 0 {
                    write!(buf, "-")
                } else {
                    write!(buf, "{}", record.bytes_sent)
                }
            }
            LogField::BytesSent => write!(buf, "{}", record.bytes_sent),
            LogField::Protocol => write!(buf, "{:?}", record.version),
            LogField::Method => write_escaped(buf, record.method.as_str()),
            LogField::QueryString => match record.query_string() {
                Some(query) => {
                    buf.push(b'?');
                    write_escaped(buf, query)
                }
                None => Ok(()),
            },
            LogField::RequestLine => {
                let _ = write_escaped(buf, record.method.as_str());
                buf.push(b' ');
                let _ = write_escaped(buf, record.request_uri());
                write!(buf, " {:?}", record.version)
            }
            LogField::Status => write!(buf, "{}", record.status.as_u16()),
            LogField::UrlPath => write_escaped(buf, record.uri.path()),
            LogField::LatencyMillis => write!(buf, "{}", record.latency.as_millis()),
            LogField::LatencySeconds => write!(buf, "{:.3}", record.latency.as_secs_f64()),
            LogField::FirstByteMillis => match record.first_byte_offset() {
                Some(offset) => write!(buf, "{}", offset.as_millis()),
                None => write!(buf, "-"),
            },
            LogField::RequestHeader(name) => write_header(buf, &record.request_headers, name),
            LogField::ResponseHeader(name) => write_header(buf, &record.response_headers, name),
            LogField::ReceivedAt(format) => {
                let time = DateTime::<Local>::from(record.received_at).format(format);
                write!(buf, "{time}")
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::header::{CONTENT_LENGTH, REFERER, USER_AGENT};
    use http::{HeaderValue, Method, StatusCode, Version};
    use std::time::{Duration, SystemTime};
    use test_log::test;

    use crate::pattern::{COMBINED_PATTERN, COMMON_TIME_FORMAT};

    fn renderer(pattern: &str, local_ip: Option<IpAddr>) -> Renderer {
        Renderer {
            template: Arc::new(Template::compile(pattern).unwrap()),
            local_ip,
            buffers: Pool::new(2),
        }
    }

    fn render(renderer: &Renderer, record: &RequestRecord) -> String {
        String::from_utf8(renderer.render(record).to_vec()).unwrap()
    }

    fn record() -> RequestRecord {
        // 2024-05-29 10:53:19 UTC
        let received_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1716979999);

        let mut record = RequestRecord {
            uri: "/search?q=rust&page=2".parse().unwrap(),
            remote_addr: Some("192.0.2.3:4567".parse().unwrap()),
            local_addr: Some("10.0.0.1:8080".parse().unwrap()),
            method: Method::GET,
            version: Version::HTTP_11,
            received_at,
            first_byte_at: Some(received_at + Duration::from_millis(25)),
            latency: Duration::from_micros(1_234_567),
            bytes_sent: 876,
            status: StatusCode::NOT_FOUND,
            ..Default::default()
        };
        record
            .request_headers
            .insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        record
            .response_headers
            .insert(CONTENT_LENGTH, HeaderValue::from_static("876"));
        record
    }

    #[test]
    fn escaping() {
        let mut buf = Vec::<u8>::new();
        let _ = write_escaped(&mut buf, b"abcd");
        assert_eq!(&buf, b"abcd");

        buf.truncate(0);
        let _ = write_escaped(&mut buf, b"\0ab\"\\+-=! cd");
        assert_eq!(&buf, b"\\x00ab\\x22\\x5c+-=! cd");

        buf.truncate(0);
        let _ = write_escaped(&mut buf, b"ab~\x7f\x80\xfe\xffcd");
        assert_eq!(&buf, b"ab~\\x7f\\x80\\xfe\\xffcd");
    }

    #[test]
    fn request_fields() {
        let renderer = renderer("%a %A %H %m %U %q %r", None);
        assert_eq!(
            render(&renderer, &record()),
            "192.0.2.3 10.0.0.1 HTTP/1.1 GET /search ?q=rust&page=2 GET /search?q=rust&page=2 HTTP/1.1\n"
        );

        let mut record = record();
        record.uri = "/a%20b".parse().unwrap();
        record.remote_addr = None;
        assert_eq!(
            render(&renderer, &record),
            "- 10.0.0.1 HTTP/1.1 GET /a%20b  GET /a%20b HTTP/1.1\n"
        );
    }

    #[test]
    fn local_ip_fallback() {
        let mut record = record();
        record.local_addr = None;

        let renderer_with_ip = renderer("%A", Some(Ipv4Addr::new(10, 1, 2, 3).into()));
        assert_eq!(render(&renderer_with_ip, &record), "10.1.2.3\n");

        let renderer_without_ip = renderer("%A", None);
        assert_eq!(render(&renderer_without_ip, &record), "-\n");
    }

    #[test]
    fn response_fields() {
        let renderer = renderer("%s %b %B %D %T %F", None);
        assert_eq!(
            render(&renderer, &record()),
            "404 876 876 1234 1.235 25\n"
        );

        let mut record = record();
        record.bytes_sent = 0;
        record.first_byte_at = None;
        record.latency = Duration::from_micros(999);
        assert_eq!(render(&renderer, &record), "404 - 0 0 0.001 -\n");
    }

    #[test]
    fn headers() {
        let renderer = renderer(
            "%{user-agent}i|%{USER-AGENT}i|%{Referer}i|%{Content-Length}o|%{Content-Length}i",
            None,
        );
        assert_eq!(
            render(&renderer, &record()),
            "curl/8.0|curl/8.0|-|876|-\n"
        );

        let mut record = record();
        record
            .request_headers
            .insert(REFERER, HeaderValue::from_static(""));
        record.request_headers.insert(
            USER_AGENT,
            HeaderValue::from_bytes(b"Mozilla/1.0 \\\"invalid data\x80").unwrap(),
        );
        assert_eq!(
            render(&renderer, &record),
            "Mozilla/1.0 \\x5c\\x22invalid data\\x80|Mozilla/1.0 \\x5c\\x22invalid data\\x80|-|876|-\n"
        );
    }

    #[test]
    fn times() {
        let record = record();
        let local = DateTime::<Local>::from(record.received_at);

        let renderer = renderer("[%t] %{%Y}t %{%s}t", None);
        assert_eq!(
            render(&renderer, &record),
            format!("[{}] 2024 1716979999\n", local.format(COMMON_TIME_FORMAT))
        );
    }

    #[test]
    fn combined_line() {
        let renderer = renderer(COMBINED_PATTERN, None);
        let record = record();
        let time = DateTime::<Local>::from(record.received_at).format(COMMON_TIME_FORMAT);
        assert_eq!(
            render(&renderer, &record),
            format!(
                "192.0.2.3 - - [{time}] \"GET /search?q=rust&page=2 HTTP/1.1\" 404 876 \"-\" \"curl/8.0\"\n"
            )
        );
    }

    #[test]
    fn buffers_are_reused() {
        let renderer = renderer("%s", None);
        assert_eq!(renderer.buffers.idle(), 0);
        {
            let line = renderer.render(&record());
            assert_eq!(&**line, b"404\n");
        }
        assert_eq!(renderer.buffers.idle(), 1);
        let line = renderer.render(&record());
        assert_eq!(&**line, b"404\n");
        assert_eq!(renderer.buffers.idle(), 0);
    }
}
