//! Error types for the RFB client library.

use std::io;
use thiserror::Error;

/// Result type for RFB client operations.
pub type Result<T> = std::result::Result<T, RfbError>;

/// Errors that can occur while speaking RFB to a server.
///
/// Every variant is fatal: the connection is closed the moment one is
/// produced, there is no retry inside the core.
#[derive(Debug, Error)]
pub enum RfbError {
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server's version banner or a negotiated parameter could not be
    /// reconciled with what this client supports.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Authentication was attempted and rejected by the server.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The selected security type requires credentials that were not
    /// supplied.
    #[error("authentication required but no credentials were supplied")]
    AuthRequired,

    /// The server used an encoding the client never negotiated.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(i32),

    /// A message carried a field value that cannot be valid on the wire
    /// (e.g. a ZRLE palette size above 16, a desktop size at or beyond
    /// 0x10000).
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The transport half-closed or EOF'd in the middle of a message.
    #[error("transport closed")]
    TransportClosed,
}
