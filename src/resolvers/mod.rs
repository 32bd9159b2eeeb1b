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

/// Group announcements by earliest unique commit.
pub mod group;
/// Merge effective labels for a target.
pub mod labels;
/// Resolve the authoritative status of a thread.
pub mod status;
/// Assemble issue/patch threads from comments and statuses.
pub mod thread;

pub use group::{RepoGroup, derive_maintainers, group_by_euc};
pub use labels::effective_labels;
pub use status::{StatusResolution, StatusSummary, resolve_status, summarize_status};
pub use thread::{Thread, assemble_issue_thread};
