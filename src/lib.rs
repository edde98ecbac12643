#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Progressive Mandelbrot render server
//!
//! A client asks for a view of the Mandelbrot set by sending a single
//! HTTP GET whose query names the center of the view, its scale, the
//! size of the output image and a tint.  The server renders the view
//! in a series of passes, each with four times the iteration budget of
//! the last, and answers with the first finished pass as a BMP image,
//! base64 encoded.  Clients that want more detail ask again.
//!
//! Only one view is ever being rendered.  A new request preempts the
//! job in progress.  A preempted client that already received a pass
//! keeps it; one that finished no pass never gets a reply, since its
//! job is abandoned.
//!
//! Rendering happens on a single dedicated thread ([`RenderEngine`]).
//! Connections are served by async tasks ([`Server`]), which find out
//! about finished frames through the [`server::ConnectionRegistry`].

pub mod cancellation;
pub mod colormap;
pub mod config;
pub mod engine;
pub mod error;
pub mod escape;
pub mod planes;
pub mod protocol;
pub mod request;
pub mod response;
pub mod server;
pub mod validation;

pub use config::ServerConfig;
pub use engine::{ConnectionId, Frame, Job, RenderEngine, RenderParameters};
pub use error::ServerError;
pub use server::Server;
