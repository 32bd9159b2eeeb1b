// git34 - A library to bridge Git repositories with NIP-34 and other code-related events in Nostr
// Copyright (C) 2025 Awiteb <a@4rs.nl>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://gnu.org/licenses/gpl-3.0.html>.

/// Repository announcement events (kind 30617).
pub mod announcement;
/// NIP-22 comment events (kind 1111).
pub mod comment;
/// Issue events (kind 1621).
pub mod issue;
/// NIP-32 label events (kind 1985).
pub mod label;
/// Patch, pull-request and pull-request-update events.
pub mod patch;
/// Repository state events (kind 30618).
pub mod state;
/// Status events (kinds 1630-1633).
pub mod status;
/// Tag accessors and immutable tag mutation helpers.
pub mod tags;
#[cfg(test)]
mod tests;

use std::sync::{
    OnceLock,
    atomic::{AtomicBool, Ordering},
};

use nostr::event::Kind;

/// Repository state announcements kind
pub const REPO_STATE_KIND: Kind = Kind::Custom(30618);
/// Pull request kind
pub const PULL_REQUEST_KIND: Kind = Kind::Custom(1618);
/// Pull request update kind
pub const PULL_REQUEST_UPDATE_KIND: Kind = Kind::Custom(1619);
/// User GRASP server list kind
pub const USER_GRASP_LIST_KIND: Kind = Kind::Custom(10317);
/// Permalink kind
pub const PERMALINK_KIND: Kind = Kind::Custom(1623);
/// Code snippet kind
pub const CODE_SNIPPET_KIND: Kind = Kind::Custom(1337);
/// Merge-analysis metadata kind
pub const MERGE_METADATA_KIND: Kind = Kind::Custom(30411);
/// Conflict metadata kind
pub const CONFLICT_METADATA_KIND: Kind = Kind::Custom(30412);

/// Environment variable controlling runtime event validation.
const VALIDATE_EVENTS_ENV: &str = "GIT34_VALIDATE_EVENTS";

/// Runtime validation flag. Defaults from the environment, falling back
/// to on in debug builds and off in release builds.
fn validation_flag() -> &'static AtomicBool {
    static FLAG: OnceLock<AtomicBool> = OnceLock::new();
    FLAG.get_or_init(|| {
        let default = std::env::var(VALIDATE_EVENTS_ENV)
            .map(|value| value != "0" && !value.eq_ignore_ascii_case("false"))
            .unwrap_or(cfg!(debug_assertions));
        AtomicBool::new(default)
    })
}

/// Whether incoming events are schema-validated before parsing.
pub fn validation_enabled() -> bool {
    validation_flag().load(Ordering::Relaxed)
}

/// Turns runtime event validation on or off.
pub fn set_validation(enabled: bool) {
    validation_flag().store(enabled, Ordering::Relaxed);
}
