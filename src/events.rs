//! The capability interface the protocol engine reports into.
//!
//! The reference this crate is built from used subclassing: a client
//! subclass overrode `updateRectangle`, `commitUpdate`, and friends
//! directly on the connection object. Here that is inverted into an
//! observer capability passed into the engine at construction time — the
//! engine holds a `&mut dyn VncHandler` and never reaches back into
//! whatever owns it.

use crate::protocol::Rectangle;

/// Host-supplied reactions to protocol-level events.
///
/// Every method has a no-op default, matching the reference callbacks,
/// which are all optional overrides. Methods are synchronous: the engine
/// calls them inline while decoding, so a handler that needs to do
/// asynchronous work (write to disk, wake another task) should queue it
/// rather than block here.
pub trait VncHandler {
    /// The handshake completed and `ServerInit` has been processed; the
    /// frame buffer now has its initial geometry and pixel format. This is
    /// the conventional place to call `set_pixel_format`/`set_encodings`.
    fn connection_made(&mut self) {}

    /// Authentication was rejected. `reason` is the server-supplied text
    /// when available (protocol version `>= 3.8`), otherwise a generic
    /// message.
    fn auth_failed(&mut self, _reason: &str) {}

    /// The server rang the bell.
    fn bell(&mut self) {}

    /// The server's clipboard changed.
    fn copy_text(&mut self, _text: &str) {}

    /// A `FramebufferUpdate` header has been read and at least one
    /// rectangle is coming. Fires before the first rectangle is applied.
    fn begin_update(&mut self) {}

    /// Fires once per `FramebufferUpdate`, after every rectangle in it has
    /// been applied to the frame buffer. `rects` lists the real
    /// (non-pseudo) rectangle positions in server-declared order.
    fn commit_update(&mut self, _rects: &[Rectangle]) {}

    /// The cursor shape or hotspot changed (`PseudoCursor`). The new shape
    /// has already been composited into [`crate::framebuffer::FrameBuffer`];
    /// this is purely a notification.
    fn update_cursor(&mut self) {}

    /// The server resized the desktop (`PseudoDesktopSize`). The frame
    /// buffer has already been grown to `(width, height)`.
    fn update_desktop_size(&mut self, _width: u16, _height: u16) {}

    /// The server replaced the color map (palette) starting at palette
    /// index `first`. Only relevant to indexed pixel formats, which this
    /// client otherwise passes through unmodified.
    fn set_color_map(&mut self, _first: u16, _colors: &[(u16, u16, u16)]) {}

    /// The server began a QEMU audio stream.
    fn audio_stream_begin(&mut self) {}

    /// A chunk of QEMU audio stream PCM data arrived.
    fn audio_stream_data(&mut self, _data: &[u8]) {}

    /// The server ended a QEMU audio stream.
    fn audio_stream_end(&mut self) {}
}

/// A [`VncHandler`] that ignores every event. Useful for tests or for a
/// caller only interested in screen capture via the frame buffer.
#[derive(Debug, Default)]
pub struct NullHandler;

impl VncHandler for NullHandler {}
