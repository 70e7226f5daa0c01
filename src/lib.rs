// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! # rfb-client
//!
//! A pure Rust implementation of an RFB (Remote Framebuffer, RFC 6143) VNC
//! *client*. It drives the byte-stream handshake, authentication, and
//! rectangle decoding needed to talk to any standard VNC server, and
//! exposes a high-level [`VncClient`] for scripting mouse, keyboard, and
//! screen-capture interactions against the connection.
//!
//! ## Features
//!
//! - **Two auth schemes**: VNC-DES (RFC 6143 §7.2.2) and Apple Remote
//!   Desktop (Diffie-Hellman key exchange + AES-128-ECB).
//! - **Six rectangle encodings**: Raw, CopyRect, RRE, CoRRE, Hextile, ZRLE.
//! - **Pseudo-encodings**: rich cursor, desktop resize, last-rect, and
//!   QEMU audio streaming.
//! - **Async I/O**: built on Tokio, generic over any `AsyncRead + AsyncWrite`
//!   transport.
//! - **Canonical RGB24 frame buffer**: every wire pixel format is decoded
//!   into packed 8-bit RGB for a uniform in-memory representation.
//!
//! ## Quick start
//!
//! ```no_run
//! use rfb_client::{ClientConfig, NullHandler, VncClient};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = TcpStream::connect("127.0.0.1:5900").await?;
//!     let config = ClientConfig::new().password("secret");
//!     let mut handler = NullHandler;
//!     let mut client = VncClient::connect(stream, config, &mut handler).await?;
//!
//!     client.mouse_move(100, 100).await?;
//!     client.key_press("Return").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               VncClient                 │
//! │                                          │
//! │  • mouse / keyboard scripting helpers    │
//! │  • screen capture & histogram matching   │
//! └──────────────────┬───────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │               Connection                │
//! │                                          │
//! │  • handshake & auth                      │
//! │  • message dispatch state machine        │
//! │  • rectangle decoders                    │
//! └──────────────────┬───────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │               FrameBuffer               │
//! │                                          │
//! │  • packed RGB24 pixel storage            │
//! │  • cursor compositing                    │
//! │  • histogram comparison                  │
//! └─────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod events;
pub mod facade;
pub mod framebuffer;
pub mod keys;
pub mod protocol;

// Internal modules
mod auth;
mod encoder;
mod translate;

// Re-exports
pub use config::ClientConfig;
pub use connection::Connection;
pub use error::{Result, RfbError};
pub use events::{NullHandler, VncHandler};
pub use facade::{ScreenSink, VncClient};
pub use framebuffer::{Cursor, FrameBuffer};
pub use protocol::{PixelFormat, Rectangle};

/// Highest protocol version this client speaks.
pub const PROTOCOL_VERSION: &str = "RFB 003.008\n";

/// Default VNC port.
pub const DEFAULT_PORT: u16 = 5900;
