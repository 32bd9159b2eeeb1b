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

use std::collections::{BTreeMap, HashSet};

use nostr::{key::PublicKey, types::RelayUrl};

use crate::{events::announcement::RepoAnnouncement, identity::dedup};

/// Announcements of the same repository lineage, grouped by their
/// earliest unique commit.
#[derive(Debug, Clone)]
pub struct RepoGroup {
    /// The EUC oid, or the repo address for announcements without one.
    pub key:           String,
    /// Unique `<npub>/<identifier>`-style handles.
    pub handles:       Vec<String>,
    pub web:           Vec<String>,
    pub clone:         Vec<String>,
    pub relays:        Vec<RelayUrl>,
    /// The trusted maintainer set; always includes every announcement
    /// author.
    pub maintainers:   Vec<PublicKey>,
    pub announcements: Vec<RepoAnnouncement>,
}

/// Groups announcements by EUC.
///
/// The result is a set: inputs differing only in announcement order
/// produce equal groups. Announcements without an EUC each form their
/// own group keyed by their repository address.
pub fn group_by_euc(announcements: &[RepoAnnouncement]) -> Vec<RepoGroup> {
    let mut buckets: BTreeMap<String, Vec<&RepoAnnouncement>> = BTreeMap::new();
    for announcement in announcements {
        let key = announcement
            .euc
            .map(|euc| euc.to_string())
            .unwrap_or_else(|| announcement.address().to_string());
        buckets.entry(key).or_default().push(announcement);
    }

    buckets
        .into_iter()
        .map(|(key, members)| {
            let mut maintainers = Vec::new();
            for announcement in &members {
                // The author is always trusted for its own announcement.
                maintainers.push(announcement.author);
                maintainers.extend(announcement.maintainers.iter().copied());
            }

            RepoGroup {
                key,
                handles: dedup(members.iter().map(|a| handle(a))),
                web: dedup(members.iter().flat_map(|a| a.web.iter().cloned())),
                clone: dedup(members.iter().flat_map(|a| a.clone.iter().cloned())),
                relays: dedup(members.iter().flat_map(|a| a.relays.iter().cloned())),
                maintainers: dedup(maintainers.into_iter()),
                announcements: members.into_iter().cloned().collect(),
            }
        })
        .collect()
}

/// The trust set used to gate repo-state merges and privileged statuses.
pub fn derive_maintainers(group: &RepoGroup) -> HashSet<PublicKey> {
    group.maintainers.iter().copied().collect()
}

/// The `npub/<identifier>` handle of an announcement. Falls back to the
/// hex pubkey if bech32 encoding fails.
fn handle(announcement: &RepoAnnouncement) -> String {
    use nostr::nips::nip19::ToBech32;

    let head = announcement
        .author
        .to_bech32()
        .unwrap_or_else(|_| announcement.author.to_hex());
    if announcement.identifier.is_empty() {
        head
    } else {
        format!("{head}/{}", announcement.identifier)
    }
}
