// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A deliberately small HTTP request reader.  It understands one
//! request line and three headers, and it never fails outright:
//! whatever it cannot make sense of is skipped with a warning, and the
//! caller is told whether enough was found to go on.

use itertools::Itertools;
use std::collections::HashMap;
use tracing::warn;

use crate::protocol::{header, DELIMITER_FIELD};

/// The header fields the server looks at.  All others are ignored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HeaderField {
    /// `Host`, required.
    Host,
    /// `Accept`, optional.
    Accept,
    /// `Connection`, optional.
    Connection,
}

impl HeaderField {
    /// Recognize a header name, ignoring case.
    pub fn from_name(name: &str) -> Option<HeaderField> {
        [HeaderField::Host, HeaderField::Accept, HeaderField::Connection]
            .iter()
            .find(|field| field.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// The canonical spelling.
    pub fn name(self) -> &'static str {
        match self {
            HeaderField::Host => header::HOST,
            HeaderField::Accept => header::ACCEPT,
            HeaderField::Connection => header::CONNECTION,
        }
    }
}

/// A parsed request.  Fields the parser could not find are empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpRequest {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target, e.g. `/?centerX=...`.
    pub uri: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    headers: HashMap<HeaderField, String>,
}

/// The result of parsing: the request as far as it could be read, and
/// whether that is far enough to validate.
#[derive(Clone, Debug, PartialEq)]
pub struct Parsed {
    /// Everything recovered from the input.
    pub request: HttpRequest,
    /// True when the request line had three tokens and a `Host`
    /// header was present.
    pub complete: bool,
}

impl Parsed {
    /// The request, if parsing was successful.
    pub fn into_complete(self) -> Option<HttpRequest> {
        if self.complete {
            Some(self.request)
        } else {
            None
        }
    }
}

impl HttpRequest {
    /// Parse a buffered request.  Lines may end in CRLF or LF.
    pub fn parse(input: &str) -> Parsed {
        let mut request = HttpRequest::default();
        let mut lines = input.lines();

        let request_line = match lines.next() {
            Some(line) => line,
            None => {
                warn!("missing a request line");
                return Parsed {
                    request,
                    complete: false,
                };
            }
        };
        let has_request_line = match request_line.split_whitespace().collect_tuple() {
            Some((method, uri, version)) => {
                request.method = method.to_string();
                request.uri = uri.to_string();
                request.version = version.to_string();
                true
            }
            None => {
                warn!(line = request_line, "malformed request line");
                false
            }
        };

        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            let (name, value) = match line.find(DELIMITER_FIELD) {
                Some(index) => (line[..index].trim(), line[index + 1..].trim()),
                None => {
                    warn!(line, "a bad header field detected");
                    continue;
                }
            };
            if let Some(field) = HeaderField::from_name(name) {
                request.headers.insert(field, value.to_string());
            }
        }

        let complete = has_request_line && request.headers.contains_key(&HeaderField::Host);
        Parsed { request, complete }
    }

    /// The value of a recognized header.
    pub fn header(&self, field: HeaderField) -> Option<&str> {
        self.headers.get(&field).map(String::as_str)
    }

    /// The `Host` header value.
    pub fn host(&self) -> Option<&str> {
        self.header(HeaderField::Host)
    }

    /// The query component of the URI.
    pub fn query(&self) -> QueryParameters {
        QueryParameters::from_uri(&self.uri)
    }
}

/// True once `buffered` holds a complete header section, i.e. a blank
/// line has been seen.
pub fn is_complete(buffered: &[u8]) -> bool {
    buffered.windows(4).any(|w| w == b"\r\n\r\n") || buffered.windows(2).any(|w| w == b"\n\n")
}

/// Key/value pairs from a URI's query string.  Keys and values are
/// trimmed; a repeated key keeps its last value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParameters {
    values: HashMap<String, String>,
}

impl QueryParameters {
    /// Read the part of `uri` between `?` and an optional `#`.  A URI
    /// without `?` has no parameters.
    pub fn from_uri(uri: &str) -> QueryParameters {
        let mut values = HashMap::new();
        let query = match uri.find('?') {
            Some(index) => &uri[index + 1..],
            None => return QueryParameters { values },
        };
        let query = match query.find('#') {
            Some(index) => &query[..index],
            None => query,
        };

        for token in query.split('&').filter(|t| !t.trim().is_empty()) {
            match token.split('=').collect_tuple() {
                Some((key, value)) => {
                    values.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => warn!(token, "a bad query string field detected"),
            }
        }
        QueryParameters { values }
    }

    /// The value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the query string held no usable pairs.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
