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

//! RRE and CoRRE subrectangle parsing.
//!
//! Both encodings share the same shape: a background fill followed by a run
//! of colored subrectangles. They differ only in how a subrectangle's
//! position/size are encoded on the wire (`u16` for RRE, `u8` for CoRRE) —
//! this is exactly the fix called for in place of the source's CoRRE loop,
//! which iterated on a fixed byte count instead of the buffer's actual end.

use super::SubRect;
use crate::protocol::PixelFormat;
use crate::translate;

/// Parses `nSub` RRE subrectangles (`color: bypp, x: u16, y: u16, w: u16,
/// h: u16` each) out of `data`.
///
/// # Panics
///
/// Panics if `data` is shorter than `nSub * (bypp + 8)`.
#[must_use]
pub fn parse_subrects_rre(data: &[u8], format: &PixelFormat, n_sub: usize) -> Vec<SubRect> {
    let bypp = format.bytes_per_pixel();
    let stride = bypp + 8;
    assert!(data.len() >= n_sub * stride, "truncated RRE subrects");

    let mut out = Vec::with_capacity(n_sub);
    for chunk in data[..n_sub * stride].chunks_exact(stride) {
        let color = translate::decode_one(&chunk[..bypp], format);
        let mut rest = &chunk[bypp..];
        let x = u16::from_be_bytes([rest[0], rest[1]]);
        let y = u16::from_be_bytes([rest[2], rest[3]]);
        let width = u16::from_be_bytes([rest[4], rest[5]]);
        let height = u16::from_be_bytes([rest[6], rest[7]]);
        rest = &rest[8..];
        debug_assert!(rest.is_empty());
        out.push(SubRect {
            x,
            y,
            width,
            height,
            color,
        });
    }
    out
}

/// Parses `nSub` CoRRE subrectangles (`color: bypp, x: u8, y: u8, w: u8, h:
/// u8` each) out of `data`.
///
/// # Panics
///
/// Panics if `data` is shorter than `nSub * (bypp + 4)`.
#[must_use]
pub fn parse_subrects_corre(data: &[u8], format: &PixelFormat, n_sub: usize) -> Vec<SubRect> {
    let bypp = format.bytes_per_pixel();
    let stride = bypp + 4;
    assert!(data.len() >= n_sub * stride, "truncated CoRRE subrects");

    let mut out = Vec::with_capacity(n_sub);
    for chunk in data[..n_sub * stride].chunks_exact(stride) {
        let color = translate::decode_one(&chunk[..bypp], format);
        let rest = &chunk[bypp..];
        out.push(SubRect {
            x: u16::from(rest[0]),
            y: u16::from(rest[1]),
            width: u16::from(rest[2]),
            height: u16::from(rest[3]),
            color,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rre_subrect_roundtrip() {
        let format = PixelFormat::rgb32();
        // color (4 bytes) + x,y,w,h (u16 each, big-endian)
        let mut data = vec![0xFF, 0x00, 0x00, 0x00];
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&4u16.to_be_bytes());

        let subs = parse_subrects_rre(&data, &format, 1);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0], SubRect { x: 1, y: 2, width: 3, height: 4, color: [0xFF, 0, 0] });
    }

    #[test]
    fn corre_subrect_stops_at_declared_count_not_fixed_size() {
        let format = PixelFormat::rgb32();
        let stride = format.bytes_per_pixel() + 4;
        let data = vec![0u8; stride * 3];
        // only ask for 2 of the 3 available subrects worth of bytes
        let subs = parse_subrects_corre(&data[..stride * 2], &format, 2);
        assert_eq!(subs.len(), 2);
    }
}
