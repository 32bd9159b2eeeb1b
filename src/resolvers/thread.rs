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

use nostr::{event::Event, nips::nip01::Coordinate};

use crate::events::{
    comment::{belongs_to_thread, comment_refs, is_comment_event},
    status::is_status_event,
    tags::EventTagsExt,
};

/// A root event with its comments and statuses, both in ascending
/// `created_at` order (ties broken by event id, so assembly is
/// deterministic).
#[derive(Debug, Clone)]
pub struct Thread {
    pub root:     Event,
    pub comments: Vec<Event>,
    pub statuses: Vec<Event>,
}

/// Assembles the thread rooted at `root` out of candidate comments and
/// statuses.
///
/// A comment joins the thread only when its NIP-22 markers reference the
/// root *and* carry the root's kind; a matching id with a mismatched `K`
/// is excluded. Statuses join when their `e` tag names the root or their
/// `a` tag names the root's address.
pub fn assemble_issue_thread(
    root: &Event,
    comments: &[Event],
    statuses: &[Event],
) -> Thread {
    let root_address = root_coordinate(root);

    let mut thread_comments: Vec<Event> = comments
        .iter()
        .filter(|comment| is_comment_event(comment))
        .filter(|comment| {
            belongs_to_thread(
                &comment_refs(comment),
                &root.id,
                root_address.as_ref(),
                root.kind,
            )
        })
        .cloned()
        .collect();
    sort_by_time(&mut thread_comments);

    let address = root_address.as_ref().map(Coordinate::to_string);
    let mut thread_statuses: Vec<Event> = statuses
        .iter()
        .filter(|status| is_status_event(status))
        .filter(|status| {
            status
                .get_tag_value("e")
                .is_some_and(|id| id == root.id.to_hex())
                || status
                    .get_tag_value("a")
                    .is_some_and(|a| Some(a.to_owned()) == address)
        })
        .cloned()
        .collect();
    sort_by_time(&mut thread_statuses);

    Thread {
        root: root.clone(),
        comments: thread_comments,
        statuses: thread_statuses,
    }
}

/// The address of an addressable root, when it has a `d` tag.
fn root_coordinate(root: &Event) -> Option<Coordinate> {
    let identifier = root.get_tag_value("d")?;
    Some(Coordinate::new(root.kind, root.pubkey).identifier(identifier))
}

/// Ascending `created_at`, ties broken by event id.
fn sort_by_time(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
