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

//! High-level scripting client: the surface a caller actually drives.
//!
//! The reference this crate is built from exposed this same surface by
//! subclassing its connection type and overriding callbacks directly on
//! it. Here it is a separate [`VncClient`] that owns a [`Connection`] and
//! drives it explicitly; calls that need to know when an update has
//! landed (`refresh_screen`, `expect_screen`) wrap the caller's
//! [`VncHandler`] in [`CommitTracker`] just for the duration of the wait.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::events::VncHandler;
use crate::framebuffer::FrameBuffer;
use crate::keys;
use crate::protocol::{PixelFormat, Rectangle};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::sleep;

/// Mouse-drag step pacing, matching the reference client's fixed 200 ms
/// pause between increments.
const STEP_PAUSE: Duration = Duration::from_millis(200);

/// Destination for captured framebuffer pixels.
///
/// The core only ever hands over packed RGB24 bytes; file I/O and image
/// encoding are the host's concern.
pub trait ScreenSink {
    fn write_rgb(&mut self, width: u16, height: u16, data: &[u8]);
}

/// The five `PixelFormat`s this client recognizes without needing to
/// renegotiate, matching the reference client's `PF2IM` table.
fn known_image_mode(format: &PixelFormat) -> bool {
    *format == PixelFormat::rgb24()
        || *format == PixelFormat::rgb32()
        || *format == PixelFormat::bgr16()
        || *format == PixelFormat::bgr()
        || *format == PixelFormat::bgrx()
}

/// Forwards every [`VncHandler`] callback to an inner handler, additionally
/// latching `committed` once a `FramebufferUpdate` has been fully applied.
struct CommitTracker<'a> {
    inner: &'a mut dyn VncHandler,
    committed: bool,
}

impl VncHandler for CommitTracker<'_> {
    fn connection_made(&mut self) {
        self.inner.connection_made();
    }
    fn auth_failed(&mut self, reason: &str) {
        self.inner.auth_failed(reason);
    }
    fn bell(&mut self) {
        self.inner.bell();
    }
    fn copy_text(&mut self, text: &str) {
        self.inner.copy_text(text);
    }
    fn begin_update(&mut self) {
        self.inner.begin_update();
    }
    fn commit_update(&mut self, rects: &[Rectangle]) {
        self.inner.commit_update(rects);
        self.committed = true;
    }
    fn update_cursor(&mut self) {
        self.inner.update_cursor();
    }
    fn update_desktop_size(&mut self, width: u16, height: u16) {
        self.inner.update_desktop_size(width, height);
    }
    fn set_color_map(&mut self, first: u16, colors: &[(u16, u16, u16)]) {
        self.inner.set_color_map(first, colors);
    }
    fn audio_stream_begin(&mut self) {
        self.inner.audio_stream_begin();
    }
    fn audio_stream_data(&mut self, data: &[u8]) {
        self.inner.audio_stream_data(data);
    }
    fn audio_stream_end(&mut self) {
        self.inner.audio_stream_end();
    }
}

/// The scripting-level client: mouse/keyboard helpers, screen capture, and
/// histogram-based screen matching, built on [`Connection`]'s dispatch.
pub struct VncClient<S> {
    connection: Connection<S>,
    x: u16,
    y: u16,
    buttons: u8,
    force_caps: bool,
}

impl<S> VncClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Completes the handshake, falls back to a known pixel format if the
    /// server's isn't one this client recognizes, sends `SetEncodings`,
    /// then notifies `handler` the connection is ready. Mirrors the
    /// reference client's `vncConnectionMade`.
    pub async fn connect(stream: S, config: ClientConfig, handler: &mut dyn VncHandler) -> Result<Self> {
        let force_caps = config.force_caps;
        let mut connection = Connection::connect(stream, config).await?;

        if !known_image_mode(connection.pixel_format()) {
            let fallback = if connection.server_version() == (3, 889) {
                PixelFormat::bgr16()
            } else {
                PixelFormat::rgb32()
            };
            connection.set_pixel_format(fallback).await?;
        }
        connection.send_set_encodings().await?;

        handler.connection_made();

        Ok(Self { connection, x: 0, y: 0, buttons: 0, force_caps })
    }

    #[must_use]
    pub fn framebuffer(&self) -> &FrameBuffer {
        self.connection.framebuffer()
    }

    #[must_use]
    pub fn connection(&self) -> &Connection<S> {
        &self.connection
    }

    /// Presses and releases `key` — a literal character, a named key, or a
    /// `-`-joined combo (`"a"`, `"F5"`, `"ctrl-alt-del"`). Every segment
    /// goes down in order, then up in reverse order.
    pub async fn key_press(&mut self, key: &str) -> Result<()> {
        let keys = keys::decode_key(key, self.force_caps);
        for &k in &keys {
            self.connection.send_key_event(k, true).await?;
        }
        for &k in keys.iter().rev() {
            self.connection.send_key_event(k, false).await?;
        }
        Ok(())
    }

    /// Presses every segment of `key` down, in order, without releasing.
    pub async fn key_down(&mut self, key: &str) -> Result<()> {
        for k in keys::decode_key(key, self.force_caps) {
            self.connection.send_key_event(k, true).await?;
        }
        Ok(())
    }

    /// Releases every segment of `key`, in order.
    pub async fn key_up(&mut self, key: &str) -> Result<()> {
        for k in keys::decode_key(key, self.force_caps) {
            self.connection.send_key_event(k, false).await?;
        }
        Ok(())
    }

    /// Clicks mouse button `button` (`1..=n`) at the last-set position.
    pub async fn mouse_press(&mut self, button: u8) -> Result<()> {
        self.mouse_down(button).await?;
        self.mouse_up(button).await
    }

    /// Holds mouse button `button` down at the last-set position.
    pub async fn mouse_down(&mut self, button: u8) -> Result<()> {
        self.buttons |= 1 << (button - 1);
        self.connection.send_pointer_event(self.buttons, self.x, self.y).await
    }

    /// Releases mouse button `button` at the last-set position.
    pub async fn mouse_up(&mut self, button: u8) -> Result<()> {
        self.buttons &= !(1 << (button - 1));
        self.connection.send_pointer_event(self.buttons, self.x, self.y).await
    }

    /// Moves the pointer to `(x, y)` in one jump.
    pub async fn mouse_move(&mut self, x: u16, y: u16) -> Result<()> {
        self.x = x;
        self.y = y;
        self.connection.send_pointer_event(self.buttons, x, y).await
    }

    /// Moves the pointer to `(x, y)` in `step`-sized increments, pausing
    /// 200 ms between each — Y axis first, then X, then a final direct
    /// move to land exactly on `(x, y)`, matching the reference client's
    /// `mouseDrag` ordering.
    pub async fn mouse_drag(&mut self, x: u16, y: u16, step: u16) -> Result<()> {
        let step = step.max(1);
        let ysteps = stepped_range(self.y, y, step);
        let xsteps = stepped_range(self.x, x, step);

        for ypos in ysteps {
            self.mouse_move(self.x, ypos).await?;
            sleep(STEP_PAUSE).await;
        }
        for xpos in xsteps {
            self.mouse_move(xpos, self.y).await?;
            sleep(STEP_PAUSE).await;
        }
        self.mouse_move(x, y).await
    }

    /// Sends `text` as the clipboard contents.
    pub async fn paste(&mut self, text: &str) -> Result<()> {
        self.connection.send_cut_text(text).await
    }

    /// Requests a full or incremental update and processes server messages
    /// until that request's `commit_update` fires.
    pub async fn refresh_screen(&mut self, incremental: bool, handler: &mut dyn VncHandler) -> Result<()> {
        self.connection.request_update(incremental).await?;
        self.wait_for_commit(handler).await
    }

    /// Refreshes, then hands the whole surface to `sink` as packed RGB24.
    pub async fn capture_screen(
        &mut self,
        sink: &mut dyn ScreenSink,
        incremental: bool,
        handler: &mut dyn VncHandler,
    ) -> Result<()> {
        self.refresh_screen(incremental, handler).await?;
        let fb = self.connection.framebuffer();
        let pixels = fb.snapshot(i32::from(self.x), i32::from(self.y));
        sink.write_rgb(fb.width(), fb.height(), &pixels);
        Ok(())
    }

    /// Refreshes, then hands the `w`x`h` region at `(x, y)` to `sink`.
    #[allow(clippy::too_many_arguments)]
    pub async fn capture_region(
        &mut self,
        sink: &mut dyn ScreenSink,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        incremental: bool,
        handler: &mut dyn VncHandler,
    ) -> Result<()> {
        self.refresh_screen(incremental, handler).await?;
        let fb = self.connection.framebuffer();
        let snapshot = fb.snapshot(i32::from(self.x), i32::from(self.y));
        let region = crop_rgb24(&snapshot, fb.width(), x, y, w, h);
        sink.write_rgb(w, h, &region);
        Ok(())
    }

    /// Waits until the whole surface's histogram matches
    /// `expected_histogram` (768 bins, matching
    /// [`FrameBuffer::histogram`]) within `max_rms`.
    pub async fn expect_screen(
        &mut self,
        expected_histogram: &[u32],
        max_rms: f64,
        handler: &mut dyn VncHandler,
    ) -> Result<()> {
        let (w, h) = (self.connection.framebuffer().width(), self.connection.framebuffer().height());
        self.expect_region(0, 0, w, h, expected_histogram, max_rms, handler).await
    }

    /// Waits until the `w`x`h` box at `(x, y)` matches `expected_histogram`
    /// within `max_rms`, requesting another incremental update and
    /// retrying otherwise.
    #[allow(clippy::too_many_arguments)]
    pub async fn expect_region(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        expected_histogram: &[u32],
        max_rms: f64,
        handler: &mut dyn VncHandler,
    ) -> Result<()> {
        loop {
            let hist = self.connection.framebuffer().histogram(x, y, w, h);
            if hist.len() == expected_histogram.len() {
                let sum_sq: f64 = hist
                    .iter()
                    .zip(expected_histogram)
                    .map(|(h, e)| {
                        let d = f64::from(*h) - f64::from(*e);
                        d * d
                    })
                    .sum();
                let rms = (sum_sq / hist.len() as f64).sqrt();
                if rms <= max_rms {
                    return Ok(());
                }
            }
            self.refresh_screen(true, handler).await?;
        }
    }

    async fn wait_for_commit(&mut self, handler: &mut dyn VncHandler) -> Result<()> {
        let mut tracker = CommitTracker { inner: handler, committed: false };
        while !tracker.committed {
            self.connection.process_message(&mut tracker).await?;
        }
        Ok(())
    }
}

/// The intermediate stops `mouse_drag` walks from `from` to `to`,
/// exclusive of `to` itself (the caller always lands there with one final
/// direct move).
fn stepped_range(from: u16, to: u16, step: u16) -> Vec<u16> {
    let mut out = Vec::new();
    let (from, to, step) = (i64::from(from), i64::from(to), i64::from(step));
    if to < from {
        let mut v = from - step;
        while v > to {
            out.push(v as u16);
            v -= step;
        }
    } else if to > from {
        let mut v = from + step;
        while v < to {
            out.push(v as u16);
            v += step;
        }
    }
    out
}

fn crop_rgb24(data: &[u8], full_width: u16, x: u16, y: u16, w: u16, h: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(usize::from(w) * usize::from(h) * 3);
    for row in 0..h {
        let src_row = usize::from(y) + usize::from(row);
        let start = (src_row * usize::from(full_width) + usize::from(x)) * 3;
        let end = start + usize::from(w) * 3;
        out.extend_from_slice(&data[start..end]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepped_range_matches_reference_drag_scenario() {
        assert_eq!(stepped_range(0, 10, 5), vec![5]);
        assert_eq!(stepped_range(0, 0, 5), Vec::<u16>::new());
    }

    #[test]
    fn stepped_range_descending() {
        assert_eq!(stepped_range(10, 0, 5), vec![5]);
    }

    #[test]
    fn known_image_mode_recognizes_all_five() {
        assert!(known_image_mode(&PixelFormat::rgb24()));
        assert!(known_image_mode(&PixelFormat::rgb32()));
        assert!(known_image_mode(&PixelFormat::bgr16()));
        assert!(known_image_mode(&PixelFormat::bgr()));
        assert!(known_image_mode(&PixelFormat::bgrx()));
        assert!(!known_image_mode(&PixelFormat {
            bits_per_pixel: 8,
            depth: 8,
            big_endian: false,
            true_colour: false,
            red_max: 7,
            green_max: 7,
            blue_max: 3,
            red_shift: 0,
            green_shift: 3,
            blue_shift: 6,
        }));
    }

    #[test]
    fn crop_rgb24_extracts_the_requested_window() {
        let full_width = 4u16;
        let mut data = Vec::new();
        for row in 0..3u8 {
            for col in 0..4u8 {
                data.extend_from_slice(&[row, col, 0]);
            }
        }
        let cropped = crop_rgb24(&data, full_width, 1, 1, 2, 2);
        assert_eq!(cropped, vec![1, 1, 0, 1, 2, 0, 2, 1, 0, 2, 2, 0]);
    }
}
