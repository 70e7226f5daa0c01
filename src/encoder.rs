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

//! Client-to-server message serialization.
//!
//! Every message here is written into a fresh [`BytesMut`] and handed back
//! for an immediate write to the transport — the wire format never needs a
//! reply before the next message can be built, so there is no state to
//! carry between calls (contrast [`crate::connection`], which does need
//! one for everything the server sends).

use crate::protocol::{
    PixelFormat, CLIENT_MSG_CLIENT_CUT_TEXT, CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST,
    CLIENT_MSG_KEY_EVENT, CLIENT_MSG_POINTER_EVENT, CLIENT_MSG_QEMU, CLIENT_MSG_SET_ENCODINGS,
    CLIENT_MSG_SET_PIXEL_FORMAT, QEMU_CLIENT_AUDIO_OP_DISABLE, QEMU_CLIENT_AUDIO_OP_ENABLE,
    QEMU_CLIENT_AUDIO_OP_SET_FORMAT, QEMU_SUBTYPE_AUDIO,
};
use bytes::{BufMut, BytesMut};

/// `SetPixelFormat` (message type 0): tells the server what pixel layout to
/// send framebuffer updates in from now on.
#[must_use]
pub fn set_pixel_format(format: &PixelFormat) -> BytesMut {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
    buf.put_bytes(0, 3);
    format.write_to(&mut buf);
    buf
}

/// `SetEncodings` (message type 2): the ordered list of encodings the
/// client is willing to accept, most preferred first.
#[must_use]
pub fn set_encodings(encodings: &[i32]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4 + encodings.len() * 4);
    buf.put_u8(CLIENT_MSG_SET_ENCODINGS);
    buf.put_u8(0);
    buf.put_u16(encodings.len() as u16);
    for &encoding in encodings {
        buf.put_i32(encoding);
    }
    buf
}

/// `FramebufferUpdateRequest` (message type 3).
#[must_use]
pub fn framebuffer_update_request(incremental: bool, x: u16, y: u16, width: u16, height: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(10);
    buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
    buf.put_u8(u8::from(incremental));
    buf.put_u16(x);
    buf.put_u16(y);
    buf.put_u16(width);
    buf.put_u16(height);
    buf
}

/// `KeyEvent` (message type 4): `down` is `true` for a key press, `false`
/// for a release.
#[must_use]
pub fn key_event(keysym: u32, down: bool) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8(CLIENT_MSG_KEY_EVENT);
    buf.put_u8(u8::from(down));
    buf.put_bytes(0, 2);
    buf.put_u32(keysym);
    buf
}

/// `PointerEvent` (message type 5): `button_mask` bit `n` set means button
/// `n+1` is currently held down.
#[must_use]
pub fn pointer_event(button_mask: u8, x: u16, y: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u8(CLIENT_MSG_POINTER_EVENT);
    buf.put_u8(button_mask);
    buf.put_u16(x);
    buf.put_u16(y);
    buf
}

/// `ClientCutText` (message type 6): `text` is encoded as ISO-8859-1,
/// replacing any codepoint outside that range with `?` since the wire
/// format has no way to carry it.
#[must_use]
pub fn client_cut_text(text: &str) -> BytesMut {
    let payload: Vec<u8> = text
        .chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect();
    let mut buf = BytesMut::with_capacity(8 + payload.len());
    buf.put_u8(CLIENT_MSG_CLIENT_CUT_TEXT);
    buf.put_bytes(0, 3);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    buf
}

/// QEMU audio (message type 255, subtype 1): asks the server to set the
/// PCM sample format and start streaming. Two messages are written back to
/// back — a `SetFormat` followed by `Enable` — mirroring how the caller
/// should flush both onto the wire in one go.
#[must_use]
pub fn qemu_audio_start(sample_format: u8, channels: u8, frequency: u32) -> BytesMut {
    let mut buf = BytesMut::with_capacity(12);
    buf.put_u8(CLIENT_MSG_QEMU);
    buf.put_u8(QEMU_SUBTYPE_AUDIO);
    buf.put_u16(QEMU_CLIENT_AUDIO_OP_SET_FORMAT);
    buf.put_u8(sample_format);
    buf.put_u8(channels);
    buf.put_u32(frequency);

    buf.put_u8(CLIENT_MSG_QEMU);
    buf.put_u8(QEMU_SUBTYPE_AUDIO);
    buf.put_u16(QEMU_CLIENT_AUDIO_OP_ENABLE);
    buf
}

/// QEMU audio (message type 255, subtype 1): asks the server to stop.
#[must_use]
pub fn qemu_audio_stop() -> BytesMut {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u8(CLIENT_MSG_QEMU);
    buf.put_u8(QEMU_SUBTYPE_AUDIO);
    buf.put_u16(QEMU_CLIENT_AUDIO_OP_DISABLE);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_pixel_format_wire_shape() {
        let buf = set_pixel_format(&PixelFormat::rgb32());
        assert_eq!(buf.len(), 20);
        assert_eq!(buf[0], 0);
        assert_eq!(&buf[1..4], &[0, 0, 0]);
    }

    #[test]
    fn set_encodings_wire_shape() {
        let buf = set_encodings(&[0, 1, -239]);
        assert_eq!(buf[0], 2);
        assert_eq!(buf[1], 0);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 3);
        assert_eq!(i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 0);
        assert_eq!(i32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]), -239);
    }

    #[test]
    fn framebuffer_update_request_wire_shape() {
        let buf = framebuffer_update_request(true, 10, 20, 640, 480);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf[0], 3);
        assert_eq!(buf[1], 1);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 10);
        assert_eq!(u16::from_be_bytes([buf[8], buf[9]]), 480);
    }

    #[test]
    fn key_event_wire_shape() {
        let buf = key_event(0xFF0D, true);
        assert_eq!(buf.len(), 8);
        assert_eq!(buf[0], 4);
        assert_eq!(buf[1], 1);
        assert_eq!(&buf[2..4], &[0, 0]);
        assert_eq!(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 0xFF0D);
    }

    #[test]
    fn pointer_event_wire_shape() {
        let buf = pointer_event(0b101, 100, 200);
        assert_eq!(buf.len(), 6);
        assert_eq!(buf[0], 5);
        assert_eq!(buf[1], 0b101);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 100);
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]), 200);
    }

    #[test]
    fn client_cut_text_replaces_non_latin1_codepoints() {
        let buf = client_cut_text("a\u{1F600}b");
        assert_eq!(buf[0], 6);
        let len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(len, 3);
        assert_eq!(&buf[8..], b"a?b");
    }

    #[test]
    fn qemu_audio_control_wire_shape() {
        let start = qemu_audio_start(3, 2, 44100);
        assert_eq!(
            &start[..],
            &[255, 1, 0, 2, 3, 2, 0, 0, 172, 68, 255, 1, 0, 0]
        );
        let stop = qemu_audio_stop();
        assert_eq!(&stop[..], &[255, 1, 0, 1]);
    }
}
