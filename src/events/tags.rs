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

//! The only sanctioned readers and writers of raw tag arrays. Everything
//! else in the crate (and in downstream code) goes through these helpers;
//! direct traversal of `event.tags` elsewhere is a lint violation.

use nostr::{
    event::{Event, EventId, Tag, TagKind, Tags},
    hashes::sha1::Hash as Sha1Hash,
    nips::nip10::Marker,
    types::RelayUrl,
};

/// Returns the first element (the name) of a tag, if any.
#[inline]
fn tag_name(tag: &Tag) -> Option<&str> {
    tag.as_slice().first().map(String::as_str)
}

/// A trait to add tag accessors and immutable tag mutation to [`Event`]
#[easy_ext::ext(EventTagsExt)]
impl Event {
    /// The first tag with the given name.
    #[inline]
    pub fn get_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|tag| tag_name(tag) == Some(name))
    }

    /// All tags with the given name, in event order.
    #[inline]
    pub fn get_tags(&self, name: &str) -> Vec<&Tag> {
        self.tags
            .iter()
            .filter(|tag| tag_name(tag) == Some(name))
            .collect()
    }

    /// The second element of the first tag with the given name.
    #[inline]
    pub fn get_tag_value(&self, name: &str) -> Option<&str> {
        self.get_tag(name)
            .and_then(|tag| tag.as_slice().get(1))
            .map(String::as_str)
    }

    /// All values (elements after the name) across every tag with the
    /// given name. Multi-value tags such as `clone` and `maintainers`
    /// contribute each of their elements.
    #[inline]
    pub fn get_tag_values(&self, name: &str) -> Vec<&str> {
        self.get_tags(name)
            .into_iter()
            .flat_map(|tag| tag.as_slice().iter().skip(1).map(String::as_str))
            .collect()
    }

    /// All tags whose name starts with the given prefix, in event order.
    /// Used for state encodings where the tag name is a full ref.
    #[inline]
    pub fn get_tags_with_prefix(&self, prefix: &str) -> Vec<&Tag> {
        self.tags
            .iter()
            .filter(|tag| tag_name(tag).is_some_and(|name| name.starts_with(prefix)))
            .collect()
    }

    /// A new event with the tag appended. The input is untouched.
    pub fn with_tag(&self, tag: Tag) -> Event {
        let mut tags: Vec<Tag> = self.tags.iter().cloned().collect();
        tags.push(tag);
        replace_tags(self, tags)
    }

    /// A new event with every tag of the same name replaced by the given
    /// one. The input is untouched.
    pub fn with_tag_set(&self, tag: Tag) -> Event {
        let name = tag_name(&tag).map(ToOwned::to_owned);
        let mut tags: Vec<Tag> = self
            .tags
            .iter()
            .filter(|t| tag_name(t).map(ToOwned::to_owned) != name)
            .cloned()
            .collect();
        tags.push(tag);
        replace_tags(self, tags)
    }

    /// A new event without any tag of the given name. The input is
    /// untouched.
    pub fn without_tag(&self, name: &str) -> Event {
        let tags: Vec<Tag> = self
            .tags
            .iter()
            .filter(|tag| tag_name(tag) != Some(name))
            .cloned()
            .collect();
        replace_tags(self, tags)
    }

    /// The `r <oid> euc` marker value, if present.
    #[inline]
    pub fn euc(&self) -> Option<Sha1Hash> {
        parse_euc_tag(&self.tags)
    }
}

/// Clones the event with a fresh tag list. The id and signature are
/// carried over unchanged; callers deriving a new event for publication
/// rebuild both through the event transport.
fn replace_tags(event: &Event, tags: Vec<Tag>) -> Event {
    let mut event = event.clone();
    event.tags = Tags::from_list(tags);
    event
}

/// Generate a reply tag for an event with the given ID, relay URL (if any), and
/// marker.
#[inline]
pub fn event_reply_tag(reply_to: &EventId, relay: Option<&RelayUrl>, marker: Marker) -> Tag {
    Tag::custom(TagKind::e(), [
        reply_to.to_hex(),
        relay.map(|r| r.to_string()).unwrap_or_default(),
        marker.to_string(),
    ])
}

/// Returns the `r <oid> euc` value from a tag list, if present.
pub fn parse_euc_tag(tags: &Tags) -> Option<Sha1Hash> {
    tags.iter()
        .filter(|tag| tag.as_slice().first().is_some_and(|name| name == "r"))
        .find(|tag| tag.as_slice().last().is_some_and(|marker| marker == "euc"))
        .and_then(|tag| tag.as_slice().get(1))
        .and_then(|oid| oid.parse().ok())
}
