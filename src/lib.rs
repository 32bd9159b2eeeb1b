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

//! Bridge Git repositories with the NIP-34 family of signed events on
//! Nostr: discover repositories from relay-broadcast announcements,
//! materialize and sync them locally, analyze and apply patches, and
//! track review lifecycles through status events, without trusting any
//! single git host.
//!
//! The embedded git implementation, the signed-event transport and the
//! filesystem are injected collaborators (see [`io`]); the crate itself
//! holds no sockets and no keys.

/// Durable cache for repo snapshots, histories and merge analyses.
pub mod cache;
/// Library configuration.
pub mod config;
/// git34 errors
pub mod error;
/// Event schema, parsers, builders and tag helpers.
pub mod events;
/// Multi-URL fallback, mirror writes and per-host credentials.
pub mod fallback;
/// Canonical repository identity and permalinks.
pub mod identity;
/// Collaborator traits: git backend, event transport, filesystem.
pub mod io;
/// Patch parsing, merge analysis and application.
pub mod merge;
/// The NostrGit provider facade.
pub mod provider;
/// Thread, status, label and repo-group resolvers.
pub mod resolvers;
/// Tiered cloning and remote reconciliation.
pub mod sync;
/// Unified REST abstraction over git-hosting providers.
pub mod vendor;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::{
    config::Config,
    error::{Git34Error, Git34Result, PreflightReason},
    provider::NostrGit,
};
