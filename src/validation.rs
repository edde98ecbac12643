// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Server policy applied to a parsed request.  Checks run in a fixed
//! order and the first failure decides the status code.

use failure::Fail;
use http::StatusCode;
use num::Complex;
use std::net::IpAddr;
use std::str::FromStr;

use crate::engine::RenderParameters;
use crate::protocol::{query, METHOD_GET, VERSION};
use crate::request::{HttpRequest, QueryParameters};

/// Largest rendered image side, in device pixels.
pub const MAX_PIXEL_EXTENT: u32 = 8192;

/// Why a request was turned away.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum Rejection {
    /// The request line or the `Host` header could not be read.
    #[fail(display = "malformed request")]
    Malformed,
    /// `Host` named an address other than the one the server is bound to.
    #[fail(display = "host {:?} does not match the bound address", _0)]
    HostMismatch(String),
    /// Anything but `GET`.
    #[fail(display = "method {:?} is not implemented", _0)]
    MethodNotImplemented(String),
    /// The URI is not of the form `/?<query>`.
    #[fail(display = "no resource at {:?}", _0)]
    UnknownResource(String),
    /// Anything but `HTTP/1.1`.
    #[fail(display = "version {:?} is not supported", _0)]
    VersionNotSupported(String),
    /// A required query key is absent or empty.
    #[fail(display = "missing query parameter {}", _0)]
    MissingParameter(&'static str),
    /// A value could not be parsed as the number it should be.
    #[fail(display = "query parameter {} has unparseable value {:?}", key, value)]
    InvalidValue {
        /// The offending key.
        key: &'static str,
        /// Its raw value.
        value: String,
    },
    /// The values parse but describe an image that cannot be rendered.
    #[fail(display = "render parameters out of range: {}", _0)]
    OutOfRange(String),
}

impl Rejection {
    /// The status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Malformed => StatusCode::BAD_REQUEST,
            Rejection::HostMismatch(_) => StatusCode::NOT_ACCEPTABLE,
            Rejection::MethodNotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Rejection::UnknownResource(_) => StatusCode::NOT_FOUND,
            Rejection::VersionNotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            Rejection::MissingParameter(_) => StatusCode::BAD_REQUEST,
            Rejection::InvalidValue { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Rejection::OutOfRange(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Check `request` against the server's rules and extract what to
/// render.  `bound` is the address the server listens on.
pub fn validate(request: &HttpRequest, bound: IpAddr) -> Result<RenderParameters, Rejection> {
    let host = request.host().ok_or(Rejection::Malformed)?;
    if host_address(host) != Some(bound) {
        return Err(Rejection::HostMismatch(host.to_string()));
    }
    if request.method != METHOD_GET {
        return Err(Rejection::MethodNotImplemented(request.method.clone()));
    }
    if request.uri.len() <= 2 || !request.uri.starts_with("/?") {
        return Err(Rejection::UnknownResource(request.uri.clone()));
    }
    if request.version != VERSION {
        return Err(Rejection::VersionNotSupported(request.version.clone()));
    }

    let arguments = request.query();
    for &key in query::REQUIRED.iter() {
        match arguments.get(key) {
            Some(value) if !value.is_empty() => {}
            _ => return Err(Rejection::MissingParameter(key)),
        }
    }

    let width: i32 = value_of(&arguments, query::RESULT_WIDTH)?;
    let height: i32 = value_of(&arguments, query::RESULT_HEIGHT)?;
    let params = RenderParameters {
        center: Complex::new(
            value_of(&arguments, query::CENTER_X)?,
            value_of(&arguments, query::CENTER_Y)?,
        ),
        scale_factor: value_of(&arguments, query::SCALE_FACTOR)?,
        width: positive(width, query::RESULT_WIDTH)?,
        height: positive(height, query::RESULT_HEIGHT)?,
        pixel_ratio: value_of(&arguments, query::PIXEL_RATIO)?,
        color: value_of(&arguments, query::COLOR)?,
    };
    check_ranges(&params)?;
    Ok(params)
}

/// The address part of a `Host` value: everything before the first
/// `:`, or the bracketed part of an IPv6 literal.
fn host_address(host: &str) -> Option<IpAddr> {
    let address = if host.starts_with('[') {
        &host[1..host.find(']')?]
    } else {
        host.split(':').next().unwrap_or("")
    };
    address.trim().parse().ok()
}

fn value_of<T: FromStr>(arguments: &QueryParameters, key: &'static str) -> Result<T, Rejection> {
    let raw = arguments.get(key).unwrap_or("");
    raw.parse().map_err(|_| Rejection::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn positive(value: i32, key: &str) -> Result<u32, Rejection> {
    if value > 0 {
        Ok(value as u32)
    } else {
        Err(Rejection::OutOfRange(format!("{} must be positive, got {}", key, value)))
    }
}

fn check_ranges(params: &RenderParameters) -> Result<(), Rejection> {
    let finite = params.center.re.is_finite()
        && params.center.im.is_finite()
        && params.scale_factor.is_finite();
    if !finite {
        return Err(Rejection::OutOfRange("center and scale must be finite".to_string()));
    }
    if !(params.pixel_ratio.is_finite() && params.pixel_ratio > 0.0) {
        return Err(Rejection::OutOfRange(format!(
            "pixel ratio must be positive, got {}",
            params.pixel_ratio
        )));
    }
    let (width, height) = params.pixel_grid();
    if width == 0 || height == 0 || width > MAX_PIXEL_EXTENT || height > MAX_PIXEL_EXTENT {
        return Err(Rejection::OutOfRange(format!(
            "rendered size {}x{} outside 1..={} per side",
            width, height, MAX_PIXEL_EXTENT
        )));
    }
    Ok(())
}
