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
    key::PublicKey,
    nips::nip01::Coordinate,
    types::{RelayUrl, Timestamp},
};

use super::tags::EventTagsExt;
use crate::error::{Git34Error, Git34Result};

/// Thread markers of a NIP-22 comment.
///
/// Uppercase tags point at the thread root, lowercase ones at the
/// immediate parent. A comment belongs to a thread only when the root
/// marker matches and `K` equals the root kind.
#[derive(Debug, Clone, Default)]
pub struct CommentRefs {
    /// Root event id (`E`).
    pub root_event:     Option<EventId>,
    /// Root address (`A`).
    pub root_address:   Option<String>,
    /// Root external id (`I`).
    pub root_external:  Option<String>,
    /// Root kind (`K`).
    pub root_kind:      Option<Kind>,
    /// Root author hint (`P`).
    pub root_author:    Option<PublicKey>,
    /// Parent event id (`e`).
    pub parent_event:   Option<EventId>,
    /// Parent address (`a`).
    pub parent_address: Option<String>,
    /// Parent kind (`k`).
    pub parent_kind:    Option<Kind>,
}

/// A parsed NIP-22 comment (kind 1111).
#[derive(Debug, Clone)]
pub struct Comment {
    pub id:         EventId,
    pub author:     PublicKey,
    pub refs:       CommentRefs,
    pub content:    String,
    pub created_at: Timestamp,
}

/// Whether the event is a NIP-22 comment.
#[inline]
pub fn is_comment_event(event: &Event) -> bool {
    event.kind == Kind::Comment
}

/// Checks the comment schema: the kind and at least one root marker.
pub fn validate_comment_event(event: &Event) -> Git34Result<()> {
    if !is_comment_event(event) {
        return Err(Git34Error::InvalidEvent(format!(
            "Expected kind {}, found {}",
            Kind::Comment,
            event.kind
        )));
    }
    if event.get_tag_value("E").is_none()
        && event.get_tag_value("A").is_none()
        && event.get_tag_value("I").is_none()
    {
        return Err(Git34Error::InvalidEvent(
            "Comment without an uppercase root marker".to_owned(),
        ));
    }
    Ok(())
}

/// Parses a NIP-22 comment event.
pub fn parse_comment_event(event: &Event) -> Git34Result<Comment> {
    if super::validation_enabled() {
        validate_comment_event(event)?;
    } else if !is_comment_event(event) {
        return Err(Git34Error::InvalidEvent("Not a comment".to_owned()));
    }

    Ok(Comment {
        id:         event.id,
        author:     event.pubkey,
        refs:       comment_refs(event),
        content:    event.content.clone(),
        created_at: event.created_at,
    })
}

/// Extracts the thread markers of a comment.
pub fn comment_refs(event: &Event) -> CommentRefs {
    let parse_kind = |value: &str| value.parse::<u16>().ok().map(Kind::from_u16);

    CommentRefs {
        root_event:     event
            .get_tag_value("E")
            .and_then(|id| EventId::parse(id).ok()),
        root_address:   event.get_tag_value("A").map(ToOwned::to_owned),
        root_external:  event.get_tag_value("I").map(ToOwned::to_owned),
        root_kind:      event.get_tag_value("K").and_then(parse_kind),
        root_author:    event
            .get_tag_value("P")
            .and_then(|pubkey| PublicKey::parse(pubkey).ok()),
        parent_event:   event
            .get_tag_value("e")
            .and_then(|id| EventId::parse(id).ok()),
        parent_address: event.get_tag_value("a").map(ToOwned::to_owned),
        parent_kind:    event.get_tag_value("k").and_then(parse_kind),
    }
}

/// Whether the comment belongs to the thread rooted at the given event.
///
/// Matching is kind-scoped: a root marker whose `K` disagrees with the
/// root kind is not part of the thread, even when the id matches. A
/// lowercase parent marker with a matching `k` also qualifies, so direct
/// replies published by legacy clients without uppercase markers are
/// kept.
pub fn belongs_to_thread(
    refs: &CommentRefs,
    root_id: &EventId,
    root_address: Option<&Coordinate>,
    root_kind: Kind,
) -> bool {
    let address = root_address.map(Coordinate::to_string);

    let via_root = (refs.root_event.as_ref() == Some(root_id)
        || (refs.root_address.is_some() && refs.root_address == address))
        && refs.root_kind == Some(root_kind);

    let via_parent = (refs.parent_event.as_ref() == Some(root_id)
        || (refs.parent_address.is_some() && refs.parent_address == address))
        && refs.parent_kind == Some(root_kind);

    via_root || via_parent
}

/// Options for building a comment template.
#[derive(Debug, Clone)]
pub struct CommentOptions {
    /// The thread root event.
    pub root:       Event,
    /// The event being replied to; the root itself when absent.
    pub parent:     Option<Event>,
    /// Root address, for addressable roots.
    pub root_address: Option<Coordinate>,
    pub relay_hint: Option<RelayUrl>,
    /// Markdown body.
    pub content:    String,
}

/// Creates an unsigned NIP-22 comment template with uppercase root and
/// lowercase parent markers.
pub fn build_comment_event(options: CommentOptions) -> EventBuilder {
    let root = &options.root;
    let parent = options.parent.as_ref().unwrap_or(root);
    let relay = options
        .relay_hint
        .as_ref()
        .map(RelayUrl::to_string)
        .unwrap_or_default();

    let mut event_builder = EventBuilder::new(Kind::Comment, options.content)
        .tag(Tag::custom(TagKind::custom("E"), [
            root.id.to_hex(),
            relay.clone(),
            root.pubkey.to_hex(),
        ]))
        .tag(Tag::custom(TagKind::custom("K"), [
            root.kind.as_u16().to_string(),
        ]))
        .tag(Tag::custom(TagKind::custom("P"), [root.pubkey.to_hex()]))
        .tag(Tag::custom(TagKind::e(), [
            parent.id.to_hex(),
            relay.clone(),
            parent.pubkey.to_hex(),
        ]))
        .tag(Tag::custom(TagKind::custom("k"), [
            parent.kind.as_u16().to_string(),
        ]))
        .tag(Tag::public_key(parent.pubkey));

    if let Some(address) = options.root_address {
        event_builder = event_builder
            .tag(Tag::custom(TagKind::custom("A"), [
                address.to_string(),
                relay.clone(),
            ]))
            .tag(Tag::custom(TagKind::custom("a"), [
                address.to_string(),
                relay,
            ]));
    }

    event_builder.dedup_tags()
}
