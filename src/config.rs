// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Server configuration: where to listen, how many refinement passes
//! to render, and how patiently to wait for a client's request bytes.
//!
//! Values come from three layers, later ones winning: built-in
//! defaults, an optional JSON file, and the command line.

use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ServerError};

/// Fewest refinement passes a job may be configured with.
pub const MIN_PASSES: u32 = 1;
/// Most refinement passes a job may be configured with.
pub const MAX_PASSES: u32 = 8;
/// Pass count used when nothing else is configured.
pub const DEFAULT_PASSES: u32 = 2;

/// Bounds on reading one request off a freshly accepted connection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReadLimits {
    /// How long to wait for the first bytes after accepting.
    pub first_byte_timeout: Duration,
    /// How long to wait for further bytes once some have arrived.
    pub idle_timeout: Duration,
    /// Stop reading once this many bytes are buffered.
    pub max_request_bytes: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        ReadLimits {
            first_byte_timeout: Duration::from_millis(3000),
            idle_timeout: Duration::from_millis(200),
            max_request_bytes: 16 * 1024,
        }
    }
}

/// Fully resolved configuration handed to the server.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Address to bind; also the only address accepted in `Host`.
    pub address: IpAddr,
    /// Port to bind.  Zero lets the operating system choose.
    pub port: u16,
    /// Number of refinement passes per render job.
    pub passes: u32,
    /// Request reading limits.
    pub read: ReadLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            passes: DEFAULT_PASSES,
            read: ReadLimits::default(),
        }
    }
}

/// The on-disk shape of a configuration file.  Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    listening_ip: Option<String>,
    listening_port: Option<u16>,
    passes: Option<u32>,
}

impl ServerConfig {
    /// Overlay the settings found in a JSON configuration file.
    pub fn load_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&data)?;
        debug!(path = %path.display(), ?file, "loaded configuration file");

        if let Some(ip) = file.listening_ip {
            self.address = parse_address(&ip)?;
        }
        if let Some(port) = file.listening_port {
            self.port = port;
        }
        if let Some(passes) = file.passes {
            self = self.with_passes(passes)?;
        }
        Ok(self)
    }

    /// Set the bind address from its textual form.
    pub fn with_address(mut self, address: &str) -> Result<Self> {
        self.address = parse_address(address)?;
        Ok(self)
    }

    /// Set the bind port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the pass count, rejecting values outside
    /// `MIN_PASSES..=MAX_PASSES`.
    pub fn with_passes(mut self, passes: u32) -> Result<Self> {
        if passes < MIN_PASSES || passes > MAX_PASSES {
            return Err(ServerError::Config(format!(
                "Pass count must be between {} and {}, got {}",
                MIN_PASSES, MAX_PASSES, passes
            )));
        }
        self.passes = passes;
        Ok(self)
    }

    /// The socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Parse a listening address.  `localhost` is accepted as a synonym
/// for the IPv4 loopback address.
pub fn parse_address(text: &str) -> Result<IpAddr> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    text.parse()
        .map_err(|_| ServerError::Config(format!("Could not parse listening address {:?}", text)))
}
