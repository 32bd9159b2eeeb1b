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

use std::collections::{BTreeMap, BTreeSet};

use nostr::{
    event::{Event, EventBuilder, EventId, Kind, Tag, TagKind},
    key::PublicKey,
    types::Timestamp,
};

use super::tags::EventTagsExt;
use crate::error::{Git34Error, Git34Result};

/// Namespace assigned to label values without an `L` declaration.
pub const UGC_NAMESPACE: &str = "ugc";

/// One namespaced label value from a NIP-32 event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelValue {
    pub namespace: String,
    pub value:     String,
}

/// A parsed NIP-32 label event (kind 1985).
#[derive(Debug, Clone)]
pub struct LabelEvent {
    pub id:              EventId,
    pub author:          PublicKey,
    /// Declared namespaces from `L` tags.
    pub namespaces:      Vec<String>,
    /// Label values; values without a namespace default to `ugc`.
    pub values:          Vec<LabelValue>,
    /// Targeted event ids (`e`).
    pub target_events:   Vec<EventId>,
    /// Targeted addresses (`a`).
    pub target_addrs:    Vec<String>,
    /// Targeted pubkeys (`p`).
    pub target_pubkeys:  Vec<PublicKey>,
    /// Targeted references (`r`) and topics (`t`).
    pub target_refs:     Vec<String>,
    pub created_at:      Timestamp,
}

/// Merged labels effective for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveLabels {
    /// Namespace to values.
    pub by_namespace: BTreeMap<String, BTreeSet<String>>,
    /// `"<ns>/<value>"` pairs.
    pub flat:         BTreeSet<String>,
    /// Legacy `t` hashtags from the target's own tags.
    pub legacy_t:     BTreeSet<String>,
}

impl EffectiveLabels {
    /// Adds one namespaced value.
    pub fn insert(&mut self, namespace: &str, value: &str) {
        self.by_namespace
            .entry(namespace.to_owned())
            .or_default()
            .insert(value.to_owned());
        self.flat.insert(format!("{namespace}/{value}"));
    }
}

/// Whether the event is a NIP-32 label.
#[inline]
pub fn is_label_event(event: &Event) -> bool {
    event.kind == Kind::Label
}

/// Checks the label schema: the kind and at least one `l` value.
pub fn validate_label_event(event: &Event) -> Git34Result<()> {
    if !is_label_event(event) {
        return Err(Git34Error::InvalidEvent(format!(
            "Expected kind {}, found {}",
            Kind::Label,
            event.kind
        )));
    }
    if event.get_tag_value("l").is_none() {
        return Err(Git34Error::InvalidEvent(
            "Label event without an `l` value".to_owned(),
        ));
    }
    Ok(())
}

/// Parses a NIP-32 label event.
pub fn parse_label_event(event: &Event) -> Git34Result<LabelEvent> {
    if super::validation_enabled() {
        validate_label_event(event)?;
    } else if !is_label_event(event) {
        return Err(Git34Error::InvalidEvent("Not a label event".to_owned()));
    }

    let namespaces: Vec<String> = event
        .get_tags("L")
        .into_iter()
        .filter_map(|tag| tag.content().map(ToOwned::to_owned))
        .collect();

    let values = event
        .get_tags("l")
        .into_iter()
        .filter_map(|tag| {
            let values = tag.as_slice();
            let value = values.get(1)?.clone();
            // The namespace may ride in the tag itself; otherwise the
            // single declared `L` namespace applies, else `ugc`.
            let namespace = values
                .get(2)
                .cloned()
                .or_else(|| (namespaces.len() == 1).then(|| namespaces[0].clone()))
                .unwrap_or_else(|| UGC_NAMESPACE.to_owned());
            Some(LabelValue { namespace, value })
        })
        .collect();

    Ok(LabelEvent {
        id: event.id,
        author: event.pubkey,
        namespaces,
        values,
        target_events: event
            .get_tags("e")
            .into_iter()
            .filter_map(|tag| tag.content())
            .filter_map(|id| EventId::parse(id).ok())
            .collect(),
        target_addrs: event
            .get_tags("a")
            .into_iter()
            .filter_map(|tag| tag.content().map(ToOwned::to_owned))
            .collect(),
        target_pubkeys: event
            .get_tags("p")
            .into_iter()
            .filter_map(|tag| tag.content())
            .filter_map(|pubkey| PublicKey::parse(pubkey).ok())
            .collect(),
        target_refs: event
            .get_tags("r")
            .into_iter()
            .chain(event.get_tags("t"))
            .filter_map(|tag| tag.content().map(ToOwned::to_owned))
            .collect(),
        created_at: event.created_at,
    })
}

/// Options for building a label template.
#[derive(Debug, Clone, Default)]
pub struct LabelOptions {
    /// Values to attach, each with its namespace.
    pub values:        Vec<LabelValue>,
    /// Targeted event ids.
    pub target_events: Vec<EventId>,
    /// Targeted addresses.
    pub target_addrs:  Vec<String>,
}

/// Creates an unsigned NIP-32 label template.
pub fn build_label_event(options: LabelOptions) -> EventBuilder {
    let namespaces: BTreeSet<&str> = options
        .values
        .iter()
        .map(|value| value.namespace.as_str())
        .collect();

    EventBuilder::new(Kind::Label, "")
        .tags(
            namespaces
                .into_iter()
                .map(|ns| Tag::custom(TagKind::custom("L"), [ns])),
        )
        .tags(options.values.iter().map(|value| {
            Tag::custom(TagKind::custom("l"), [
                value.value.clone(),
                value.namespace.clone(),
            ])
        }))
        .tags(
            options
                .target_events
                .iter()
                .map(|id| Tag::custom(TagKind::e(), [id.to_hex()])),
        )
        .tags(
            options
                .target_addrs
                .iter()
                .map(|address| Tag::custom(TagKind::a(), [address.clone()])),
        )
        .dedup_tags()
}
