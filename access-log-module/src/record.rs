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

//! Data captured about one HTTP exchange

use http::header::{HeaderValue, HOST};
use http::request::Parts;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use crate::observer::{ResponseObserver, ResponseSink};
use crate::pool::Reusable;

/// Everything the access log can show about a request and its response
///
/// `first_byte_at`, if set, is expected to be no earlier than `received_at`. Records are
/// usually checked out of the logger’s pool via [`AccessLogger::record`](crate::AccessLogger::record)
/// and filled by [`RequestRecord::fill_request`] and [`RequestRecord::fill_response`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    /// Request target
    pub uri: Uri,
    /// Request headers
    pub request_headers: HeaderMap,
    /// Response headers
    pub response_headers: HeaderMap,
    /// Client address
    pub remote_addr: Option<SocketAddr>,
    /// Address the request was received on, if known
    pub local_addr: Option<SocketAddr>,
    /// Request method
    pub method: Method,
    /// Protocol version of the request
    pub version: Version,
    /// Time the request was received
    pub received_at: SystemTime,
    /// Time the first byte of the response was committed, `None` if nothing was sent
    pub first_byte_at: Option<SystemTime>,
    /// Time it took to process the request
    pub latency: Duration,
    /// Response body bytes sent
    pub bytes_sent: u64,
    /// Response status
    pub status: StatusCode,
}

impl Default for RequestRecord {
    fn default() -> Self {
        Self {
            uri: Uri::default(),
            request_headers: HeaderMap::new(),
            response_headers: HeaderMap::new(),
            remote_addr: None,
            local_addr: None,
            method: Method::default(),
            version: Version::default(),
            received_at: SystemTime::UNIX_EPOCH,
            first_byte_at: None,
            latency: Duration::ZERO,
            bytes_sent: 0,
            status: StatusCode::default(),
        }
    }
}

impl Reusable for RequestRecord {
    fn reset(&mut self) {
        // Keep the header maps’ allocations
        let mut request_headers = std::mem::take(&mut self.request_headers);
        let mut response_headers = std::mem::take(&mut self.response_headers);
        request_headers.clear();
        response_headers.clear();

        *self = Self {
            request_headers,
            response_headers,
            ..Self::default()
        };
    }
}

impl RequestRecord {
    /// Copies the request data.
    ///
    /// A `Host` header is added from the URI’s authority if the request doesn’t have one, HTTP/2
    /// requests carry the host in the `:authority` pseudo-header only.
    pub fn fill_request(
        &mut self,
        parts: &Parts,
        remote_addr: Option<SocketAddr>,
        received_at: SystemTime,
    ) {
        self.uri = parts.uri.clone();
        self.method = parts.method.clone();
        self.version = parts.version;
        self.remote_addr = remote_addr;
        self.received_at = received_at;

        self.request_headers.clear();
        self.request_headers.extend(
            parts
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        if !self.request_headers.contains_key(HOST) {
            if let Some(value) = parts
                .uri
                .authority()
                .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
            {
                self.request_headers.insert(HOST, value);
            }
        }
    }

    /// Copies the response data collected by the observer.
    pub fn fill_response<S: ResponseSink>(
        &mut self,
        observer: &ResponseObserver<S>,
        latency: Duration,
    ) {
        self.status = observer.status();
        self.bytes_sent = observer.bytes_sent();
        self.first_byte_at = observer.first_byte_at();
        self.latency = latency;

        self.response_headers.clear();
        self.response_headers.extend(
            observer
                .headers()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
    }

    /// Path and query as sent in the request line
    pub fn request_uri(&self) -> &str {
        self.uri.path_and_query().map_or("/", |path| path.as_str())
    }

    /// Query string without the leading `?`, `None` if empty
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query().filter(|query| !query.is_empty())
    }

    /// Time from receiving the request to the first response byte
    pub fn first_byte_offset(&self) -> Option<Duration> {
        self.first_byte_at.map(|time| {
            time.duration_since(self.received_at)
                .unwrap_or(Duration::ZERO)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::header::{ACCEPT, CONTENT_TYPE, SET_COOKIE};
    use http::Request;
    use test_log::test;

    use crate::observer::BufferedResponse;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn request_data() {
        let received_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1716979999);
        let mut record = RequestRecord::default();
        record.fill_request(
            &parts(
                "/orders?id=5&x",
                &[("Host", "example.com"), ("Accept", "a"), ("accept", "b")],
            ),
            Some("192.0.2.3:4567".parse().unwrap()),
            received_at,
        );

        assert_eq!(record.method, Method::POST);
        assert_eq!(record.request_uri(), "/orders?id=5&x");
        assert_eq!(record.query_string(), Some("id=5&x"));
        assert_eq!(record.received_at, received_at);
        assert_eq!(record.request_headers[HOST], "example.com");
        let accept: Vec<_> = record.request_headers.get_all(ACCEPT).iter().collect();
        assert_eq!(accept, vec!["a", "b"]);
    }

    #[test]
    fn host_from_authority() {
        let mut record = RequestRecord::default();
        record.fill_request(
            &parts("https://example.com:8443/path", &[]),
            None,
            SystemTime::now(),
        );
        assert_eq!(record.request_headers[HOST], "example.com:8443");
        assert_eq!(record.request_uri(), "/path");
        assert_eq!(record.query_string(), None);

        record.fill_request(
            &parts("https://example.com/path", &[("Host", "other.example")]),
            None,
            SystemTime::now(),
        );
        assert_eq!(record.request_headers[HOST], "other.example");
    }

    #[test]
    fn response_data() {
        let mut observer = ResponseObserver::new(BufferedResponse::default());
        observer
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        observer
            .headers_mut()
            .append(SET_COOKIE, HeaderValue::from_static("a=1"));
        observer
            .headers_mut()
            .append(SET_COOKIE, HeaderValue::from_static("b=2"));
        observer.write_header(StatusCode::CREATED).unwrap();
        observer.write_body(b"created").unwrap();

        let mut record = RequestRecord::default();
        record.fill_response(&observer, Duration::from_millis(15));
        assert_eq!(record.status, StatusCode::CREATED);
        assert_eq!(record.bytes_sent, 7);
        assert_eq!(record.first_byte_at, observer.first_byte_at());
        assert_eq!(record.latency, Duration::from_millis(15));
        assert_eq!(record.response_headers.get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn first_byte_offset() {
        let mut record = RequestRecord {
            received_at: SystemTime::UNIX_EPOCH + Duration::from_secs(100),
            ..Default::default()
        };
        assert_eq!(record.first_byte_offset(), None);

        record.first_byte_at = Some(record.received_at + Duration::from_micros(2500));
        assert_eq!(record.first_byte_offset(), Some(Duration::from_micros(2500)));

        // Clock going backwards doesn’t produce nonsense
        record.first_byte_at = Some(record.received_at - Duration::from_secs(1));
        assert_eq!(record.first_byte_offset(), Some(Duration::ZERO));
    }

    #[test]
    fn reset_clears_everything() {
        let mut record = RequestRecord::default();
        record.fill_request(
            &parts("/a?b", &[("Accept", "x")]),
            Some("192.0.2.3:4567".parse().unwrap()),
            SystemTime::now(),
        );
        record.bytes_sent = 12;
        record.status = StatusCode::NOT_FOUND;
        record.first_byte_at = Some(SystemTime::now());

        record.reset();
        assert_eq!(record, RequestRecord::default());
    }
}
