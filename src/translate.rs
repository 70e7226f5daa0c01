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

//! Pixel format translation: every rectangle decoder hands its raw wire
//! bytes here to get packed RGB24, the frame buffer's canonical format.
//!
//! # Supported source formats
//!
//! 8/16/24/32 bits per pixel, any shift/max combination, either
//! endianness.

use crate::protocol::PixelFormat;

/// Decodes `count` pixels of raw wire data in `format` into packed RGB24.
///
/// # Panics
///
/// Panics if `src` is shorter than `count * format.bytes_per_pixel()`.
#[must_use]
pub fn decode_pixels(src: &[u8], format: &PixelFormat, count: usize) -> Vec<u8> {
    let bypp = format.bytes_per_pixel();
    assert!(src.len() >= count * bypp, "truncated pixel data");

    let mut out = Vec::with_capacity(count * 3);
    for chunk in src[..count * bypp].chunks_exact(bypp) {
        let (r, g, b) = extract_rgb(chunk, format);
        out.extend_from_slice(&[r, g, b]);
    }
    out
}

/// Decodes a single pixel, for callers (RRE/CoRRE/Hextile background and
/// foreground colors) that only ever need one.
#[must_use]
pub fn decode_one(src: &[u8], format: &PixelFormat) -> [u8; 3] {
    let (r, g, b) = extract_rgb(src, format);
    [r, g, b]
}

/// Extracts 8-bit RGB components from one pixel encoded per `format`.
fn extract_rgb(pixel: &[u8], format: &PixelFormat) -> (u8, u8, u8) {
    let pixel_value: u32 = match format.bits_per_pixel {
        8 => u32::from(pixel[0]),
        16 => {
            if format.big_endian {
                u32::from(u16::from_be_bytes([pixel[0], pixel[1]]))
            } else {
                u32::from(u16::from_le_bytes([pixel[0], pixel[1]]))
            }
        }
        24 => {
            if format.big_endian {
                (u32::from(pixel[0]) << 16) | (u32::from(pixel[1]) << 8) | u32::from(pixel[2])
            } else {
                (u32::from(pixel[2]) << 16) | (u32::from(pixel[1]) << 8) | u32::from(pixel[0])
            }
        }
        32 => {
            if format.big_endian {
                u32::from_be_bytes([pixel[0], pixel[1], pixel[2], pixel[3]])
            } else {
                u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]])
            }
        }
        _ => u32::from(pixel[0]),
    };

    let r_raw = (pixel_value >> format.red_shift) & u32::from(format.red_max);
    let g_raw = (pixel_value >> format.green_shift) & u32::from(format.green_max);
    let b_raw = (pixel_value >> format.blue_shift) & u32::from(format.blue_max);

    (
        scale_component(r_raw, format.red_max),
        scale_component(g_raw, format.green_max),
        scale_component(b_raw, format.blue_max),
    )
}

/// Scales a component from its format-native range `0..=max` to `0..=255`.
#[inline]
fn scale_component(value: u32, max: u16) -> u8 {
    if max == 0 {
        return 0;
    }
    if max == 255 {
        return value as u8;
    }
    ((u64::from(value) * 255) / u64::from(max)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb24_passthrough_is_identity() {
        let format = PixelFormat::rgb24();
        let src = [0xFFu8, 0x00, 0x00, 0x00, 0xFF, 0x00];
        let out = decode_pixels(&src, &format, 2);
        assert_eq!(out, vec![0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn rgb32_red_green_pair() {
        let format = PixelFormat::rgb32();
        // red shift=0, green shift=8, blue shift=16
        let src = [0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00];
        let out = decode_pixels(&src, &format, 2);
        assert_eq!(&out[0..3], &[0xFF, 0x00, 0x00]);
        assert_eq!(&out[3..6], &[0x00, 0xFF, 0x00]);
    }

    #[test]
    fn rgb565_scales_up_to_8_bit() {
        let format = PixelFormat::bgr16(); // not rgb565 but exercises scaling path
        let pixel_value: u16 = 0b1111_1_000000_00000; // red_max 31 at shift 11, all red
        let bytes = pixel_value.to_le_bytes();
        let out = decode_pixels(&bytes, &format, 1);
        assert_eq!(out[0], 255);
        assert_eq!(out[1], 0);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn decode_one_matches_decode_pixels() {
        let format = PixelFormat::rgb32();
        let src = [10u8, 20, 30, 0];
        assert_eq!(decode_one(&src, &format), [10, 20, 30]);
    }
}
