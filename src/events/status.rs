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

use nostr::{
    event::{Event, EventBuilder, EventId, Kind, Tag, TagKind},
    hashes::sha1::Hash as Sha1Hash,
    key::PublicKey,
    nips::{nip01::Coordinate, nip10::Marker},
    types::{RelayUrl, Timestamp},
};

use super::tags::{EventTagsExt, event_reply_tag};
use crate::error::{Git34Error, Git34Result};

/// The four status kinds, in ascending precedence order.
pub fn status_kinds() -> [Kind; 4] {
    [
        Kind::GitStatusDraft,
        Kind::GitStatusOpen,
        Kind::GitStatusApplied,
        Kind::GitStatusClosed,
    ]
}

/// A parsed status event (kinds 1630-1633).
#[derive(Debug, Clone)]
pub struct Status {
    pub id:              EventId,
    pub author:          PublicKey,
    pub kind:            Kind,
    /// The root issue/patch/PR this status applies to.
    pub root:            Option<EventId>,
    /// Repository addresses.
    pub repos:           Vec<String>,
    /// Commits the proposal landed as, for applied statuses.
    pub applied_commits: Vec<Sha1Hash>,
    /// Merge commit, for merged statuses.
    pub merge_commit:    Option<Sha1Hash>,
    pub created_at:      Timestamp,
}

/// Whether the event is a status event.
#[inline]
pub fn is_status_event(event: &Event) -> bool {
    status_kinds().contains(&event.kind)
}

/// Checks the status schema: a status kind and a root reference.
pub fn validate_status_event(event: &Event) -> Git34Result<()> {
    if !is_status_event(event) {
        return Err(Git34Error::InvalidEvent(format!(
            "Expected a status kind (1630-1633), found {}",
            event.kind
        )));
    }
    if event.get_tag_value("e").is_none() && event.get_tag_value("a").is_none() {
        return Err(Git34Error::InvalidEvent(
            "Status event without a root reference".to_owned(),
        ));
    }
    Ok(())
}

/// Parses a status event.
pub fn parse_status_event(event: &Event) -> Git34Result<Status> {
    if super::validation_enabled() {
        validate_status_event(event)?;
    } else if !is_status_event(event) {
        return Err(Git34Error::InvalidEvent("Not a status event".to_owned()));
    }

    Ok(Status {
        id:              event.id,
        author:          event.pubkey,
        kind:            event.kind,
        root:            event
            .get_tag_value("e")
            .and_then(|id| EventId::parse(id).ok()),
        repos:           event
            .get_tags("a")
            .into_iter()
            .filter_map(|tag| tag.content().map(ToOwned::to_owned))
            .collect(),
        applied_commits: event
            .get_tag_values("applied-as-commits")
            .into_iter()
            .filter_map(|oid| oid.parse().ok())
            .collect(),
        merge_commit:    event
            .get_tag_value("merge-commit")
            .and_then(|oid| oid.parse().ok()),
        created_at:      event.created_at,
    })
}

/// Options for building a status template.
#[derive(Debug, Clone)]
pub struct StatusOptions {
    /// One of the four status kinds.
    pub kind:            Kind,
    /// The root issue/patch/PR.
    pub root:            EventId,
    /// The root author, always tagged as a recipient.
    pub root_author:     PublicKey,
    /// Maintainers, tagged as recipients.
    pub maintainers:     Vec<PublicKey>,
    /// Repository coordinates.
    pub repos:           Vec<Coordinate>,
    pub relay_hint:      Option<RelayUrl>,
    /// Commits the proposal landed as; only meaningful for 1631.
    pub applied_commits: Vec<Sha1Hash>,
    /// Merge commit; only meaningful for 1631.
    pub merge_commit:    Option<Sha1Hash>,
    /// Optional human-readable note.
    pub content:         String,
}

/// Creates an unsigned status template addressed to the root author and
/// every maintainer.
pub fn build_status_event(options: StatusOptions) -> Git34Result<EventBuilder> {
    if !status_kinds().contains(&options.kind) {
        return Err(Git34Error::InvalidEvent(format!(
            "{} is not a status kind",
            options.kind
        )));
    }

    let mut event_builder = EventBuilder::new(options.kind, options.content)
        .tag(event_reply_tag(
            &options.root,
            options.relay_hint.as_ref(),
            Marker::Root,
        ))
        .tag(Tag::public_key(options.root_author))
        .tags(options.maintainers.iter().map(|p| Tag::public_key(*p)))
        .tags(
            options
                .repos
                .into_iter()
                .map(|repo| Tag::coordinate(repo, options.relay_hint.clone())),
        );

    if !options.applied_commits.is_empty() {
        event_builder = event_builder.tag(Tag::custom(
            TagKind::custom("applied-as-commits"),
            options
                .applied_commits
                .iter()
                .map(Sha1Hash::to_string)
                .collect::<Vec<_>>(),
        ));
    }

    if let Some(merge_commit) = options.merge_commit {
        event_builder = event_builder.tag(Tag::custom(TagKind::custom("merge-commit"), [
            merge_commit.to_string(),
        ]));
    }

    Ok(event_builder.dedup_tags())
}
