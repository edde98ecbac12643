// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wire constants of the render protocol.

/// The only protocol version spoken.
pub const VERSION: &str = "HTTP/1.1";

/// Separates the tokens of request and status lines.
pub const DELIMITER_TERM: char = ' ';
/// Separates a header name from its value.
pub const DELIMITER_FIELD: char = ':';
/// Ends every line.
pub const DELIMITER_LINE: &str = "\r\n";

/// The only method served.
pub const METHOD_GET: &str = "GET";

/// Header names.
pub mod header {
    /// Mandatory request header naming the server address.
    pub const HOST: &str = "Host";
    /// Optional request header.
    pub const ACCEPT: &str = "Accept";
    /// Request and response header.
    pub const CONNECTION: &str = "Connection";
    /// Response timestamp.
    pub const DATE: &str = "Date";
    /// Body media type.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Body length in bytes.
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// Server identification.
    pub const SERVER: &str = "Server";
    /// Freshness token.
    pub const ETAG: &str = "ETag";
    /// Pass, iteration and timing summary.
    pub const INFO: &str = "Info";
    /// The requested scale factor of the rendered frame.
    pub const SCALE_FACTOR: &str = "Scale-Factor";
}

/// Header values.
pub mod value {
    /// The response body is base64 text.
    pub const CONTENT_TYPE_TEXT_PLAIN: &str = "text/plain";
    /// Every response closes its connection.
    pub const CONNECTION_CLOSE: &str = "close";
    /// Value of the `Server` header.
    pub const SERVER: &str = concat!("mandelserver/", env!("CARGO_PKG_VERSION"));
}

/// The query keys every render request must carry.
pub mod query {
    /// Real part of the viewport center.
    pub const CENTER_X: &str = "centerX";
    /// Imaginary part of the viewport center.
    pub const CENTER_Y: &str = "centerY";
    /// Complex-plane units per output pixel.
    pub const SCALE_FACTOR: &str = "scaleFactor";
    /// Output width in pixels.
    pub const RESULT_WIDTH: &str = "resultWidth";
    /// Output height in pixels.
    pub const RESULT_HEIGHT: &str = "resultHeight";
    /// Device pixel ratio.
    pub const PIXEL_RATIO: &str = "pixelRatio";
    /// Packed RGB tint.
    pub const COLOR: &str = "color";

    /// All of the above, in the order they are checked.
    pub const REQUIRED: [&str; 7] = [
        CENTER_X,
        CENTER_Y,
        SCALE_FACTOR,
        RESULT_WIDTH,
        RESULT_HEIGHT,
        PIXEL_RATIO,
        COLOR,
    ];
}
