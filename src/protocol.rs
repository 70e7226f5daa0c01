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

//! RFB (Remote Framebuffer) protocol constants and wire structures.
//!
//! This module provides the fundamental building blocks for speaking RFB
//! to a server, per RFC 6143 plus the Apple Remote Desktop and QEMU vendor
//! extensions. All multi-byte integers on the wire are big-endian; all
//! booleans are a single byte.

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// Maximum protocol version this client will ever offer to a server,
/// regardless of what the server advertises.
pub const MAX_CLIENT_VERSION: (u16, u16) = (3, 8);

/// Server protocol versions this client knows how to negotiate down to.
/// `(3, 889)` is Apple Remote Desktop's non-standard minor version.
pub const SUPPORTED_SERVER_VERSIONS: &[(u16, u16)] = &[
    (3, 3),
    (3, 7),
    (3, 8),
    (3, 889),
    (4, 0),
    (4, 1),
    (5, 0),
];

// --- Security (authentication) types ---------------------------------

/// Security type: invalid/unknown, only ever seen as a server error marker.
pub const SECURITY_TYPE_INVALID: u8 = 0;
/// Security type: no authentication.
pub const SECURITY_TYPE_NONE: u8 = 1;
/// Security type: standard VNC DES challenge/response.
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;
#[allow(dead_code)]
pub const SECURITY_TYPE_RSA_AES: u8 = 5;
#[allow(dead_code)]
pub const SECURITY_TYPE_RSA_AES_UNENCRYPTED: u8 = 6;
#[allow(dead_code)]
pub const SECURITY_TYPE_TIGHT: u8 = 16;
#[allow(dead_code)]
pub const SECURITY_TYPE_ULTRA: u8 = 17;
#[allow(dead_code)]
pub const SECURITY_TYPE_TLS: u8 = 18;
#[allow(dead_code)]
pub const SECURITY_TYPE_VENCRYPT: u8 = 19;
#[allow(dead_code)]
pub const SECURITY_TYPE_SASL: u8 = 20;
#[allow(dead_code)]
pub const SECURITY_TYPE_XVP: u8 = 22;
#[allow(dead_code)]
pub const SECURITY_TYPE_SECURE_TUNNEL: u8 = 23;
#[allow(dead_code)]
pub const SECURITY_TYPE_INTEGRATED_SSH: u8 = 24;
/// Security type: Apple Remote Desktop, Diffie-Hellman key exchange + AES.
pub const SECURITY_TYPE_ARD: u8 = 30;

/// The security types this client can actually perform.
pub const SUPPORTED_SECURITY_TYPES: &[u8] =
    &[SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH, SECURITY_TYPE_ARD];

// --- Security result ----------------------------------------------------

pub const SECURITY_RESULT_OK: u32 = 0;
pub const SECURITY_RESULT_FAILED: u32 = 1;
pub const SECURITY_RESULT_TOO_MANY: u32 = 2;

// --- Server-to-client message types -------------------------------------

pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;
pub const SERVER_MSG_BELL: u8 = 2;
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;
#[allow(dead_code)]
pub const SERVER_MSG_KEY_FRAME_UPDATE: u8 = 5;
#[allow(dead_code)]
pub const SERVER_MSG_FILE_TRANSFER: u8 = 7;
#[allow(dead_code)]
pub const SERVER_MSG_TEXT_CHAT: u8 = 11;
#[allow(dead_code)]
pub const SERVER_MSG_KEEP_ALIVE: u8 = 13;
#[allow(dead_code)]
pub const SERVER_MSG_CAR_CONNECTIVITY: u8 = 128;
#[allow(dead_code)]
pub const SERVER_MSG_END_OF_CONTINUOUS_UPDATES: u8 = 150;
#[allow(dead_code)]
pub const SERVER_MSG_SERVER_STATE: u8 = 173;
#[allow(dead_code)]
pub const SERVER_MSG_SERVER_FENCE: u8 = 248;
#[allow(dead_code)]
pub const SERVER_MSG_OLIVE_CALL_CONTROL: u8 = 249;
#[allow(dead_code)]
pub const SERVER_MSG_XVP_SERVER_MESSAGE: u8 = 250;
#[allow(dead_code)]
pub const SERVER_MSG_TIGHT: u8 = 252;
#[allow(dead_code)]
pub const SERVER_MSG_GII_SERVER_MESSAGE: u8 = 253;
pub const SERVER_MSG_QEMU: u8 = 255;

/// Returns a human name for a server-to-client message type, used only for
/// diagnostics when a recognized-but-unhandled type is encountered.
#[must_use]
pub fn server_message_name(msg_type: u8) -> &'static str {
    match msg_type {
        SERVER_MSG_FRAMEBUFFER_UPDATE => "FramebufferUpdate",
        SERVER_MSG_SET_COLOUR_MAP_ENTRIES => "SetColourMapEntries",
        SERVER_MSG_BELL => "Bell",
        SERVER_MSG_SERVER_CUT_TEXT => "ServerCutText",
        SERVER_MSG_KEY_FRAME_UPDATE => "KeyFrameUpdate",
        SERVER_MSG_FILE_TRANSFER => "FileTransfer",
        SERVER_MSG_TEXT_CHAT => "TextChat",
        SERVER_MSG_KEEP_ALIVE => "KeepAlive",
        SERVER_MSG_CAR_CONNECTIVITY => "CarConnectivity",
        SERVER_MSG_END_OF_CONTINUOUS_UPDATES => "EndOfContinuousUpdates",
        SERVER_MSG_SERVER_STATE => "ServerState",
        SERVER_MSG_SERVER_FENCE => "ServerFence",
        SERVER_MSG_OLIVE_CALL_CONTROL => "OliveCallControl",
        SERVER_MSG_XVP_SERVER_MESSAGE => "XvpServerMessage",
        SERVER_MSG_TIGHT => "Tight",
        SERVER_MSG_GII_SERVER_MESSAGE => "GiiServerMessage",
        SERVER_MSG_QEMU => "Qemu",
        _ => "Unknown",
    }
}

// --- Client-to-server message types -------------------------------------

pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;
pub const CLIENT_MSG_QEMU: u8 = 255;

// --- Encoding types ------------------------------------------------------

pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPYRECT: i32 = 1;
pub const ENCODING_RRE: i32 = 2;
pub const ENCODING_CORRE: i32 = 4;
pub const ENCODING_HEXTILE: i32 = 5;
#[allow(dead_code)]
pub const ENCODING_ZLIB: i32 = 6;
#[allow(dead_code)]
pub const ENCODING_TIGHT: i32 = 7;
#[allow(dead_code)]
pub const ENCODING_ZLIBHEX: i32 = 8;
#[allow(dead_code)]
pub const ENCODING_ULTRA: i32 = 9;
#[allow(dead_code)]
pub const ENCODING_TRLE: i32 = 15;
pub const ENCODING_ZRLE: i32 = 16;
#[allow(dead_code)]
pub const ENCODING_ZYWRLE: i32 = 17;
#[allow(dead_code)]
pub const ENCODING_JPEG: i32 = 21;
#[allow(dead_code)]
pub const ENCODING_JRLE: i32 = 22;

/// Pseudo-encoding: server supports resizing the desktop on the fly.
pub const ENCODING_PSEUDO_DESKTOP_SIZE: i32 = -223;
/// Pseudo-encoding: marks the final rectangle of an update, regardless of
/// the `nRects` header count.
pub const ENCODING_PSEUDO_LAST_RECT: i32 = -224;
#[allow(dead_code)]
pub const ENCODING_POINTER_POS: i32 = -225;
/// Pseudo-encoding: rich cursor shape (image + bitmask).
pub const ENCODING_PSEUDO_CURSOR: i32 = -239;
#[allow(dead_code)]
pub const ENCODING_PSEUDO_X_CURSOR: i32 = -240;
#[allow(dead_code)]
pub const ENCODING_PSEUDO_QEMU_POINTER_MOTION_CHANGE: i32 = -257;
/// Pseudo-encoding: server accepts extended (X11 keysym) key events.
pub const ENCODING_PSEUDO_QEMU_EXTENDED_KEY_EVENT: i32 = -258;
/// Pseudo-encoding: server supports the QEMU audio extension.
pub const ENCODING_PSEUDO_QEMU_AUDIO: i32 = -259;

/// Returns a human name for an encoding, used only for diagnostics.
#[must_use]
pub fn encoding_name(encoding: i32) -> &'static str {
    match encoding {
        ENCODING_RAW => "Raw",
        ENCODING_COPYRECT => "CopyRect",
        ENCODING_RRE => "RRE",
        ENCODING_CORRE => "CoRRE",
        ENCODING_HEXTILE => "Hextile",
        ENCODING_ZLIB => "Zlib",
        ENCODING_TIGHT => "Tight",
        ENCODING_ZLIBHEX => "ZlibHex",
        ENCODING_ULTRA => "Ultra",
        ENCODING_TRLE => "TRLE",
        ENCODING_ZRLE => "ZRLE",
        ENCODING_ZYWRLE => "ZYWRLE",
        ENCODING_JPEG => "JPEG",
        ENCODING_JRLE => "JRLE",
        ENCODING_PSEUDO_DESKTOP_SIZE => "PseudoDesktopSize",
        ENCODING_PSEUDO_LAST_RECT => "PseudoLastRect",
        ENCODING_POINTER_POS => "PointerPos",
        ENCODING_PSEUDO_CURSOR => "PseudoCursor",
        ENCODING_PSEUDO_X_CURSOR => "PseudoXCursor",
        ENCODING_PSEUDO_QEMU_POINTER_MOTION_CHANGE => "PseudoQemuPointerMotionChange",
        ENCODING_PSEUDO_QEMU_EXTENDED_KEY_EVENT => "PseudoQemuExtendedKeyEvent",
        ENCODING_PSEUDO_QEMU_AUDIO => "PseudoQemuAudio",
        _ => "Unknown",
    }
}

/// The encodings this client negotiates, in priority order: the structural
/// encoding always comes first, then whichever pseudo-encodings the caller
/// enabled (see `ClientConfig`).
pub const DEFAULT_STRUCTURAL_ENCODINGS: &[i32] = &[
    ENCODING_ZRLE,
    ENCODING_HEXTILE,
    ENCODING_CORRE,
    ENCODING_RRE,
    ENCODING_COPYRECT,
    ENCODING_RAW,
];

// --- Hextile subencoding flags -------------------------------------------

pub const HEXTILE_RAW: u8 = 1 << 0;
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;
pub const HEXTILE_ANY_SUBRECTS: u8 = 1 << 3;
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 1 << 4;

// --- QEMU extension -------------------------------------------------------

pub const QEMU_SUBTYPE_AUDIO: u8 = 1;

/// Server-to-client audio sub-op (follows the `255, 1` prefix).
pub const QEMU_AUDIO_OP_STOP: u16 = 0;
pub const QEMU_AUDIO_OP_START: u16 = 1;
pub const QEMU_AUDIO_OP_DATA: u16 = 2;

/// Client-to-server audio sub-op. Numerically distinct meanings from the
/// server-to-client ops above despite sharing values — this extension's
/// client and server op namespaces are simply not symmetric.
pub const QEMU_CLIENT_AUDIO_OP_ENABLE: u16 = 0;
pub const QEMU_CLIENT_AUDIO_OP_DISABLE: u16 = 1;
pub const QEMU_CLIENT_AUDIO_OP_SET_FORMAT: u16 = 2;

/// PixelFormat describes the byte layout of one pixel on the wire.
///
/// Wire size is always 16 bytes: `!BB??HHHBBBxxx` (bits-per-pixel, depth,
/// big-endian flag, true-colour flag, three 16-bit maxima, three 8-bit
/// shifts, 3 bytes padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    /// Number of bits per pixel: 8, 16, 24, or 32.
    pub bits_per_pixel: u8,
    /// Number of significant bits of colour information, `1..=bits_per_pixel`.
    pub depth: u8,
    /// `true` if multi-byte pixel values are big-endian on the wire.
    pub big_endian: bool,
    /// `true` for true-colour; `false` for colour-mapped (indexed) formats.
    pub true_colour: bool,
    /// Maximum red value, always `2^n - 1`.
    pub red_max: u16,
    /// Maximum green value, always `2^n - 1`.
    pub green_max: u16,
    /// Maximum blue value, always `2^n - 1`.
    pub blue_max: u16,
    /// Bit shift to the red component.
    pub red_shift: u8,
    /// Bit shift to the green component.
    pub green_shift: u8,
    /// Bit shift to the blue component.
    pub blue_shift: u8,
}

impl Default for PixelFormat {
    /// The default format offered before any `ServerInit` / `SetPixelFormat`
    /// has taken place: 32-bit RGBA with alpha unused, matching `RGB32`.
    fn default() -> Self {
        Self::rgb32()
    }
}

impl PixelFormat {
    /// Bytes needed to hold one pixel: `ceil(bits_per_pixel / 8)`.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        (usize::from(self.bits_per_pixel) + 7) / 8
    }

    /// Standard 32-bit RGBX/RGBA truecolor format.
    #[must_use]
    pub fn rgb32() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    /// Standard 24-bit packed RGB truecolor format.
    #[must_use]
    pub fn rgb24() -> Self {
        Self {
            bits_per_pixel: 24,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    /// 16-bit 5-6-5 BGR format, the default Apple Remote Desktop falls back
    /// to when its advertised format is not one this client recognizes.
    #[must_use]
    pub fn bgr16() -> Self {
        Self {
            bits_per_pixel: 16,
            depth: 16,
            big_endian: false,
            true_colour: true,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// 24-bit packed BGR truecolor format.
    #[must_use]
    pub fn bgr() -> Self {
        Self {
            bits_per_pixel: 24,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// 32-bit BGRX truecolor format.
    #[must_use]
    pub fn bgrx() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Serializes this format into its 16-byte wire representation.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(u8::from(self.big_endian));
        buf.put_u8(u8::from(self.true_colour));
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3);
    }

    /// Parses a `PixelFormat` from a 16-byte wire slice.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 16 bytes are available.
    pub fn from_bytes(buf: &mut impl Buf) -> io::Result<Self> {
        if buf.remaining() < 16 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes for PixelFormat",
            ));
        }
        let pf = Self {
            bits_per_pixel: buf.get_u8(),
            depth: buf.get_u8(),
            big_endian: buf.get_u8() != 0,
            true_colour: buf.get_u8() != 0,
            red_max: buf.get_u16(),
            green_max: buf.get_u16(),
            blue_max: buf.get_u16(),
            red_shift: buf.get_u8(),
            green_shift: buf.get_u8(),
            blue_shift: buf.get_u8(),
        };
        buf.advance(3);
        Ok(pf)
    }
}

/// A rectangle's position and size, as carried in a `FramebufferUpdate`
/// header and returned to `commitUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// The `ServerInit` message: framebuffer geometry, native pixel format, and
/// desktop name, sent once after a successful handshake.
#[derive(Debug, Clone)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}
