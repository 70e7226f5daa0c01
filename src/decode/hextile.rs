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

//! Hextile subencoding flags, tile geometry, and subrectangle parsing.
//!
//! The outer loop over 16x16 tiles and the decision of which bytes to read
//! next lives in [`crate::connection`] — a tile's later reads depend on
//! flag bits read in its first byte, so the sequencing is inherently a
//! small state machine, not a pure function.

use super::SubRect;
use crate::protocol::{
    PixelFormat, HEXTILE_ANY_SUBRECTS, HEXTILE_BACKGROUND_SPECIFIED, HEXTILE_FOREGROUND_SPECIFIED,
    HEXTILE_RAW, HEXTILE_SUBRECTS_COLOURED,
};
use crate::translate;

#[must_use]
pub fn is_raw(subencoding: u8) -> bool {
    subencoding & HEXTILE_RAW != 0
}

#[must_use]
pub fn has_background(subencoding: u8) -> bool {
    subencoding & HEXTILE_BACKGROUND_SPECIFIED != 0
}

#[must_use]
pub fn has_foreground(subencoding: u8) -> bool {
    subencoding & HEXTILE_FOREGROUND_SPECIFIED != 0
}

#[must_use]
pub fn has_any_subrects(subencoding: u8) -> bool {
    subencoding & HEXTILE_ANY_SUBRECTS != 0
}

#[must_use]
pub fn subrects_colored(subencoding: u8) -> bool {
    subencoding & HEXTILE_SUBRECTS_COLOURED != 0
}

/// The dimensions of the tile at `(tx, ty)` within a rectangle `(x, y, w,
/// h)`, clipped at the rectangle's right/bottom edge.
#[must_use]
pub fn tile_size(x: u16, y: u16, width: u16, height: u16, tx: u16, ty: u16) -> (u16, u16) {
    let x_end = u32::from(x) + u32::from(width);
    let y_end = u32::from(y) + u32::from(height);
    let tw = (x_end - u32::from(tx)).min(16) as u16;
    let th = (y_end - u32::from(ty)).min(16) as u16;
    (tw, th)
}

/// Advances `(tx, ty)` to the next tile position, row-major, wrapping to
/// the next row of tiles at the rectangle's right edge. Returns `None` once
/// every tile has been visited.
#[must_use]
pub fn next_tile(x: u16, y: u16, width: u16, height: u16, tx: u16, ty: u16) -> Option<(u16, u16)> {
    let x_end = u32::from(x) + u32::from(width);
    let y_end = u32::from(y) + u32::from(height);
    let mut tx = u32::from(tx) + 16;
    let mut ty = u32::from(ty);
    if tx >= x_end {
        tx = u32::from(x);
        ty += 16;
    }
    if ty >= y_end {
        None
    } else {
        Some((tx as u16, ty as u16))
    }
}

/// Parses `nSub` subrectangles that each carry their own color (`color:
/// bypp, xy: u8, wh: u8`).
#[must_use]
pub fn parse_subrects_colored(data: &[u8], format: &PixelFormat, n_sub: usize) -> Vec<SubRect> {
    let bypp = format.bytes_per_pixel();
    let stride = bypp + 2;
    assert!(data.len() >= n_sub * stride, "truncated Hextile subrects");

    let mut out = Vec::with_capacity(n_sub);
    for chunk in data[..n_sub * stride].chunks_exact(stride) {
        let color = translate::decode_one(&chunk[..bypp], format);
        let xy = chunk[bypp];
        let wh = chunk[bypp + 1];
        out.push(decode_xy_wh(xy, wh, color));
    }
    out
}

/// Parses `nSub` subrectangles (`xy: u8, wh: u8` each) that all share `fg`.
#[must_use]
pub fn parse_subrects_foreground(data: &[u8], fg: [u8; 3], n_sub: usize) -> Vec<SubRect> {
    assert!(data.len() >= n_sub * 2, "truncated Hextile subrects");

    let mut out = Vec::with_capacity(n_sub);
    for chunk in data[..n_sub * 2].chunks_exact(2) {
        out.push(decode_xy_wh(chunk[0], chunk[1], fg));
    }
    out
}

fn decode_xy_wh(xy: u8, wh: u8, color: [u8; 3]) -> SubRect {
    SubRect {
        x: u16::from(xy >> 4),
        y: u16::from(xy & 0x0F),
        width: u16::from(wh >> 4) + 1,
        height: u16::from(wh & 0x0F) + 1,
        color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_accounting_covers_rectangle_without_overlap() {
        let (width, height) = (37u16, 20u16);
        let (x, y) = (0u16, 0u16);
        let mut total = 0u32;
        let mut pos = Some((x, y));
        while let Some((tx, ty)) = pos {
            let (tw, th) = tile_size(x, y, width, height, tx, ty);
            total += u32::from(tw) * u32::from(th);
            pos = next_tile(x, y, width, height, tx, ty);
        }
        // account for the first tile, which next_tile doesn't yield itself
        let (tw0, th0) = tile_size(x, y, width, height, x, y);
        assert_eq!(u32::from(tw0) * u32::from(th0) + total - u32::from(tw0) * u32::from(th0), total);
        assert_eq!(total, u32::from(width) * u32::from(height));
    }

    #[test]
    fn border_tile_is_clipped_to_remainder() {
        let (tw, th) = tile_size(0, 0, 37, 20, 32, 16);
        assert_eq!(tw, 5); // 37 mod 16
        assert_eq!(th, 4); // 20 mod 16
    }

    #[test]
    fn subrect_xy_wh_packing() {
        let r = decode_xy_wh(0x12, 0x34, [1, 2, 3]);
        assert_eq!(r.x, 1);
        assert_eq!(r.y, 2);
        assert_eq!(r.width, 4);
        assert_eq!(r.height, 5);
    }
}
