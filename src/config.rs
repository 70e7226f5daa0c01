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

//! Connection configuration.
//!
//! The core never reads a file or an environment variable — per spec this
//! is a host concern — but it still needs a single typed entry point for
//! the handful of knobs a caller must supply before a handshake can start.

/// Credentials and negotiation preferences supplied by the host before
/// connecting.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) shared: bool,
    pub(crate) force_caps: bool,
    pub(crate) pseudo_cursor: bool,
    pub(crate) no_cursor: bool,
    pub(crate) pseudo_desktop_size: bool,
    pub(crate) last_rect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            shared: true,
            force_caps: false,
            pseudo_cursor: true,
            no_cursor: false,
            pseudo_desktop_size: true,
            last_rect: true,
        }
    }
}

impl ClientConfig {
    /// Starts a new config with the library's defaults: shared session,
    /// cursor/desktop-size/last-rect pseudo-encodings all enabled, no
    /// credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ARD username. VNC-DES auth ignores this.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password used by VNC-DES and ARD auth.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the `shared` flag sent in `ClientInit` (whether other clients
    /// may stay connected).
    #[must_use]
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// When set, uppercase ASCII letters and the 14 US-layout shifted
    /// symbols are prefixed with `shift-` before key-name decoding.
    #[must_use]
    pub fn force_caps(mut self, force_caps: bool) -> Self {
        self.force_caps = force_caps;
        self
    }

    /// Disables the rich cursor pseudo-encoding and any cursor compositing.
    #[must_use]
    pub fn no_cursor(mut self, no_cursor: bool) -> Self {
        self.no_cursor = no_cursor;
        self
    }

    /// Advertises (or withholds) the `DesktopSize` pseudo-encoding.
    #[must_use]
    pub fn pseudo_desktop_size(mut self, enabled: bool) -> Self {
        self.pseudo_desktop_size = enabled;
        self
    }

    /// Advertises (or withholds) the `LastRect` pseudo-encoding.
    #[must_use]
    pub fn last_rect(mut self, enabled: bool) -> Self {
        self.last_rect = enabled;
        self
    }

}
