// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Formats responses.  Errors are a status line and three headers;
//! a rendered frame goes out as a BMP image, base64 encoded, with
//! headers describing the pass it came from.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use http::StatusCode;
use image::bmp::BMPEncoder;
use image::ColorType;
use std::fmt::Write;
use std::io;

use crate::engine::Frame;
use crate::protocol::{header, value, DELIMITER_FIELD, DELIMITER_LINE, DELIMITER_TERM, VERSION};

/// `Date` header format, e.g. `Wed, 9 October 2024 09:12:18 GMT`.
const DATE_FORMAT: &str = "%a, %-d %B %Y %H:%M:%S GMT";

/// The text hashed into the freshness token.  One-second resolution:
/// responses built within the same second share a token.
const TOKEN_FORMAT: &str = "%A, %-d %B %Y %H:%M:%S UTC";

/// English date for the `Date` header.
pub fn http_date(now: &DateTime<Utc>) -> String {
    now.format(DATE_FORMAT).to_string()
}

/// Freshness token for the `ETag` header: CRC-32 of the current time
/// as long-form text, in lowercase hex.  Informational only.
pub fn freshness_token(now: &DateTime<Utc>) -> String {
    let text = now.format(TOKEN_FORMAT).to_string();
    format!("{:08x}", crc32fast::hash(text.as_bytes()))
}

/// Encode a frame's pixels as a BMP file.
pub fn encode_bmp(frame: &Frame) -> io::Result<Vec<u8>> {
    let (width, height) = frame.image.dimensions();
    let mut bmp = Vec::new();
    BMPEncoder::new(&mut bmp).encode(&frame.image, width, height, ColorType::RGB(8))?;
    Ok(bmp)
}

fn status_line(out: &mut String, status: StatusCode) {
    let _ = write!(
        out,
        "{}{}{}{}{}{}",
        VERSION,
        DELIMITER_TERM,
        status.as_u16(),
        DELIMITER_TERM,
        status.canonical_reason().unwrap_or(""),
        DELIMITER_LINE
    );
}

fn header_line<V: std::fmt::Display>(out: &mut String, name: &str, value: V) {
    let _ = write!(
        out,
        "{}{}{}{}{}",
        name, DELIMITER_FIELD, DELIMITER_TERM, value, DELIMITER_LINE
    );
}

/// An error response: status line, `Date`, `Server`, `Connection`, and
/// no body.
pub fn error_response(status: StatusCode) -> Vec<u8> {
    error_response_at(status, &Utc::now())
}

fn error_response_at(status: StatusCode, now: &DateTime<Utc>) -> Vec<u8> {
    let mut out = String::new();
    status_line(&mut out, status);
    header_line(&mut out, header::DATE, http_date(now));
    header_line(&mut out, header::SERVER, value::SERVER);
    header_line(&mut out, header::CONNECTION, value::CONNECTION_CLOSE);
    out.push_str(DELIMITER_LINE);
    out.into_bytes()
}

/// A `200 OK` carrying `frame` as base64 BMP text.
pub fn success_response(frame: &Frame) -> io::Result<Vec<u8>> {
    success_response_at(frame, &Utc::now())
}

fn success_response_at(frame: &Frame, now: &DateTime<Utc>) -> io::Result<Vec<u8>> {
    let body = STANDARD.encode(encode_bmp(frame)?);

    let mut out = String::with_capacity(body.len() + 512);
    status_line(&mut out, StatusCode::OK);
    header_line(&mut out, header::DATE, http_date(now));
    header_line(&mut out, header::CONTENT_TYPE, value::CONTENT_TYPE_TEXT_PLAIN);
    header_line(&mut out, header::CONTENT_LENGTH, body.len());
    header_line(&mut out, header::INFO, frame.info());
    header_line(&mut out, header::ETAG, freshness_token(now));
    header_line(&mut out, header::SERVER, value::SERVER);
    header_line(&mut out, header::SCALE_FACTOR, format!("{:.5}", frame.scale_factor));
    header_line(&mut out, header::CONNECTION, value::CONNECTION_CLOSE);
    out.push_str(DELIMITER_LINE);
    out.push_str(&body);
    Ok(out.into_bytes())
}
