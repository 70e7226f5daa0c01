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

//! Rectangle decoders.
//!
//! Each submodule turns one encoding's wire bytes into instructions for the
//! frame buffer (`update_rectangle`/`fill_rectangle`/`copy_rectangle`). The
//! multi-step sequencing some encodings need (RRE's subrect count, Hextile's
//! per-tile subencoding byte) lives in [`crate::connection`]'s state enum,
//! not here — these functions only ever run once every byte they need is
//! already buffered.

pub mod hextile;
pub mod rre;
pub mod zrle;

/// One fill-colored subrectangle, relative to its parent rectangle's
/// origin, as produced by RRE/CoRRE/Hextile subrect parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub color: [u8; 3],
}
