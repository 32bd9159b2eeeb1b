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
    label::{EffectiveLabels, parse_label_event},
    tags::EventTagsExt,
};

/// Merges the labels effective for a target event.
///
/// Self-labels come only from the target's own `t` tags (the legacy
/// set); other actors contribute exclusively through kind-1985 events
/// whose `e` tag names the target id or whose `a` tag names its address.
pub fn effective_labels(target: &Event, label_events: &[Event]) -> EffectiveLabels {
    let mut labels = EffectiveLabels::default();

    for tag in target.get_tags("t") {
        if let Some(value) = tag.content() {
            labels.legacy_t.insert(value.to_owned());
        }
    }

    let address = target
        .get_tag_value("d")
        .map(|identifier| Coordinate::new(target.kind, target.pubkey).identifier(identifier))
        .map(|coordinate| coordinate.to_string());

    for event in label_events {
        let Ok(label) = parse_label_event(event) else {
            tracing::trace!(id = %event.id, "Skipping unparsable label event");
            continue;
        };

        let targets_event = label.target_events.contains(&target.id);
        let targets_address = address
            .as_ref()
            .is_some_and(|address| label.target_addrs.contains(address));
        if !targets_event && !targets_address {
            continue;
        }

        for value in &label.values {
            labels.insert(&value.namespace, &value.value);
        }
    }

    labels
}
