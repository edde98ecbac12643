// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors raised by the server outside of request handling.  Problems
//! with an individual request are not errors in this sense; they are
//! [`Rejection`](crate::validation::Rejection)s and turn into an
//! HTTP status on the wire.

use failure::Fail;
use std::io;

/// Everything that can stop the server from starting or from serving.
#[derive(Debug, Fail)]
pub enum ServerError {
    /// Socket or file I/O failed.
    #[fail(display = "i/o error: {}", _0)]
    Io(#[cause] io::Error),

    /// A configuration value was out of range or unparseable.
    #[fail(display = "invalid configuration: {}", _0)]
    Config(String),

    /// The configuration file was not valid JSON of the expected shape.
    #[fail(display = "could not read configuration file: {}", _0)]
    ConfigFormat(#[cause] serde_json::Error),

    /// The background render worker could not be started.
    #[fail(display = "could not start render worker: {}", _0)]
    Worker(#[cause] io::Error),

    /// The render engine has been shut down and takes no more jobs.
    #[fail(display = "render engine is shut down")]
    EngineStopped,
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::Io(err)
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::ConfigFormat(err)
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ServerError>;
