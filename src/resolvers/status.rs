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

use std::collections::HashSet;

use nostr::{
    event::{Event, Kind},
    key::PublicKey,
};

use crate::events::status::is_status_event;

/// The resolved authoritative status of a thread.
#[derive(Debug, Clone)]
pub struct StatusResolution {
    /// The winning status event, `None` when no valid candidate exists.
    pub status: Option<Event>,
    /// Human-readable justification naming the dominant criterion.
    pub reason: String,
}

/// Coarse status summary of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSummary {
    Open,
    Draft,
    /// Kind 1631: "resolved" for issues, "applied" for patches and PRs.
    Resolved,
    Closed,
}

/// Rank of the status author: maintainers outrank the root author, who
/// outranks everyone else.
fn role_rank(author: &PublicKey, root_author: &PublicKey, maintainers: &HashSet<PublicKey>) -> u8 {
    if maintainers.contains(author) {
        2
    } else if author == root_author {
        1
    } else {
        0
    }
}

/// Rank of the status kind: draft < open < applied < closed. Unknown
/// kinds rank below all.
fn kind_rank(kind: Kind) -> u8 {
    if kind == Kind::GitStatusDraft {
        1
    } else if kind == Kind::GitStatusOpen {
        2
    } else if kind == Kind::GitStatusApplied {
        3
    } else if kind == Kind::GitStatusClosed {
        4
    } else {
        0
    }
}

/// Resolves the final status among candidates.
///
/// The winner maximizes `(role_rank, kind_rank, created_at)`; remaining
/// ties are broken by event id for determinism. Events outside the four
/// status kinds are discarded.
pub fn resolve_status(
    statuses: &[Event],
    root_author: &PublicKey,
    maintainers: &HashSet<PublicKey>,
) -> StatusResolution {
    let winner = statuses
        .iter()
        .filter(|status| is_status_event(status))
        .max_by_key(|status| {
            (
                role_rank(&status.pubkey, root_author, maintainers),
                kind_rank(status.kind),
                status.created_at,
                status.id,
            )
        });

    let Some(winner) = winner else {
        return StatusResolution {
            status: None,
            reason: "no valid status events".to_owned(),
        };
    };

    let role = role_rank(&winner.pubkey, root_author, maintainers);
    let contested = statuses
        .iter()
        .filter(|status| is_status_event(status) && status.id != winner.id)
        .any(|status| role_rank(&status.pubkey, root_author, maintainers) == role);

    let reason = match (role, contested) {
        (2, _) => "set by a maintainer".to_owned(),
        (1, false) => "set by the author".to_owned(),
        (1, true) => "most recent status from the author".to_owned(),
        (_, false) => "only available status".to_owned(),
        _ => "most recent status".to_owned(),
    };

    StatusResolution {
        status: Some(winner.clone()),
        reason,
    }
}

/// Maps the final status kind to a summary. Missing or unknown kinds
/// summarize as open.
pub fn summarize_status(final_kind: Option<Kind>) -> StatusSummary {
    match final_kind {
        Some(kind) if kind == Kind::GitStatusDraft => StatusSummary::Draft,
        Some(kind) if kind == Kind::GitStatusApplied => StatusSummary::Resolved,
        Some(kind) if kind == Kind::GitStatusClosed => StatusSummary::Closed,
        _ => StatusSummary::Open,
    }
}

/// The display word for a summary, `applied` instead of `resolved` when
/// the root is a patch or pull request.
pub fn status_label(summary: StatusSummary, root_kind: Kind) -> &'static str {
    match summary {
        StatusSummary::Open => "open",
        StatusSummary::Draft => "draft",
        StatusSummary::Closed => "closed",
        StatusSummary::Resolved if root_kind == Kind::GitIssue => "resolved",
        StatusSummary::Resolved => "applied",
    }
}
