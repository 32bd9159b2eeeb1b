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

use convert_case::{Case, Casing};
use nostr::{
    event::{Event, EventBuilder, Kind, Tag},
    hashes::sha1::Hash as Sha1Hash,
    key::PublicKey,
    nips::{nip01::Coordinate, nip34::GitRepositoryAnnouncement},
    types::{RelayUrl, Timestamp, Url},
};

use super::tags::EventTagsExt;
use crate::error::{Git34Error, Git34Result};

/// A parsed repository announcement (kind 30617).
///
/// Canonical identity is `(author, identifier)`; every other field is
/// advisory and may be empty on malformed but accepted events.
#[derive(Debug, Clone)]
pub struct RepoAnnouncement {
    /// The announcement author.
    pub author:      PublicKey,
    /// The `d` tag, usually a kebab-case short name.
    pub identifier:  String,
    /// Human-readable project name.
    pub name:        Option<String>,
    /// Brief project description.
    pub description: Option<String>,
    /// Webpage URLs.
    pub web:         Vec<String>,
    /// Clone URLs, any protocol.
    pub clone:       Vec<String>,
    /// Relays the repository monitors for patches and issues.
    pub relays:      Vec<RelayUrl>,
    /// Recognized maintainers, excluding invalid entries.
    pub maintainers: Vec<PublicKey>,
    /// Topic labels from `t` tags.
    pub topics:      Vec<String>,
    /// Earliest unique commit, the fork-grouping key.
    pub euc:         Option<Sha1Hash>,
    /// Announcement timestamp.
    pub created_at:  Timestamp,
}

impl RepoAnnouncement {
    /// The repository address coordinate `30617:<pubkey>:<d>`.
    pub fn address(&self) -> Coordinate {
        Coordinate::new(Kind::GitRepoAnnouncement, self.author).identifier(&self.identifier)
    }
}

/// Whether the event is a repository announcement.
#[inline]
pub fn is_announcement_event(event: &Event) -> bool {
    event.kind == Kind::GitRepoAnnouncement
}

/// Checks the announcement schema: the kind and a non-empty `d` tag.
pub fn validate_announcement_event(event: &Event) -> Git34Result<()> {
    if !is_announcement_event(event) {
        return Err(Git34Error::InvalidEvent(format!(
            "Expected kind {}, found {}",
            Kind::GitRepoAnnouncement,
            event.kind
        )));
    }
    if event.get_tag_value("d").is_none_or(str::is_empty) {
        return Err(Git34Error::InvalidEvent(
            "Repository announcement without a `d` identifier".to_owned(),
        ));
    }
    Ok(())
}

/// Parses a repository announcement event.
///
/// Missing optional tags yield empty fields; values that fail to parse
/// (relay URLs, maintainer pubkeys) are dropped rather than failing the
/// whole announcement.
pub fn parse_announcement_event(event: &Event) -> Git34Result<RepoAnnouncement> {
    if super::validation_enabled() {
        validate_announcement_event(event)?;
    } else if !is_announcement_event(event) {
        return Err(Git34Error::InvalidEvent(
            "Not a repository announcement".to_owned(),
        ));
    }

    Ok(RepoAnnouncement {
        author:      event.pubkey,
        identifier:  event.get_tag_value("d").unwrap_or_default().to_owned(),
        name:        event.get_tag_value("name").map(ToOwned::to_owned),
        description: event.get_tag_value("description").map(ToOwned::to_owned),
        web:         event
            .get_tag_values("web")
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
        clone:       event
            .get_tag_values("clone")
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
        relays:      event
            .get_tag_values("relays")
            .into_iter()
            .filter_map(|relay| {
                let parsed = RelayUrl::parse(relay);
                if parsed.is_err() {
                    tracing::trace!(relay, "Dropping unparsable relay URL");
                }
                parsed.ok()
            })
            .collect(),
        maintainers: event
            .get_tag_values("maintainers")
            .into_iter()
            .filter_map(|pubkey| {
                let parsed = PublicKey::parse(pubkey);
                if parsed.is_err() {
                    tracing::trace!(pubkey, "Dropping invalid maintainer pubkey");
                }
                parsed.ok()
            })
            .collect(),
        topics:      event
            .get_tags("t")
            .into_iter()
            .filter_map(|tag| tag.content().map(ToOwned::to_owned))
            .collect(),
        euc:         event.euc(),
        created_at:  event.created_at,
    })
}

/// Options for building a repository announcement template.
#[derive(Debug, Clone, Default)]
pub struct AnnouncementOptions {
    pub identifier:  String,
    pub name:        Option<String>,
    pub description: Option<String>,
    pub web:         Vec<Url>,
    pub clone:       Vec<Url>,
    pub relays:      Vec<RelayUrl>,
    pub maintainers: Vec<PublicKey>,
    pub euc:         Option<Sha1Hash>,
    pub labels:      Vec<String>,
    /// Skip the kebab-case identifier check.
    pub force_id:    bool,
}

/// Creates an unsigned repository announcement template.
///
/// The identifier must be kebab-case unless `force_id` is set.
pub fn build_announcement_event(options: AnnouncementOptions) -> Git34Result<EventBuilder> {
    let identifier = options.identifier.trim();
    let kebab_identifier = identifier.to_case(Case::Kebab);
    if identifier.is_empty() || (!options.force_id && identifier != kebab_identifier) {
        if identifier != kebab_identifier {
            tracing::error!(
                "The repo id should be `{kebab_identifier}` (kebab-case). Set `force_id` to \
                 override this check"
            );
        }
        return Err(Git34Error::InvalidRepoId);
    }

    Ok(
        EventBuilder::git_repository_announcement(GitRepositoryAnnouncement {
            id:          identifier.to_owned(),
            name:        options.name,
            description: options.description,
            web:         options.web,
            clone:       options.clone,
            relays:      options.relays,
            euc:         options.euc,
            maintainers: options.maintainers,
        })?
        .dedup_tags()
        .tags(options.labels.into_iter().map(Tag::hashtag)),
    )
}
