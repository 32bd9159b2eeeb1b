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
    event::{Event, EventBuilder, EventId, Kind, Tag},
    key::PublicKey,
    nips::{nip01::Coordinate, nip34::GitIssue},
    types::Timestamp,
};

use super::tags::EventTagsExt;
use crate::error::{Git34Error, Git34Result};

/// A parsed issue (kind 1621).
#[derive(Debug, Clone)]
pub struct Issue {
    pub id:         EventId,
    pub author:     PublicKey,
    /// Repository addresses the issue belongs to.
    pub repos:      Vec<Coordinate>,
    pub subject:    Option<String>,
    /// Labels from the issue's own `t` tags.
    pub labels:     Vec<String>,
    /// Markdown body.
    pub content:    String,
    pub created_at: Timestamp,
}

/// Whether the event is an issue.
#[inline]
pub fn is_issue_event(event: &Event) -> bool {
    event.kind == Kind::GitIssue
}

/// Checks the issue schema: the kind and at least one repository address.
pub fn validate_issue_event(event: &Event) -> Git34Result<()> {
    if !is_issue_event(event) {
        return Err(Git34Error::InvalidEvent(format!(
            "Expected kind {}, found {}",
            Kind::GitIssue,
            event.kind
        )));
    }
    if event.get_tag_value("a").is_none() {
        return Err(Git34Error::InvalidEvent(
            "Issue without a repository address".to_owned(),
        ));
    }
    Ok(())
}

/// Parses an issue event.
pub fn parse_issue_event(event: &Event) -> Git34Result<Issue> {
    if super::validation_enabled() {
        validate_issue_event(event)?;
    } else if !is_issue_event(event) {
        return Err(Git34Error::InvalidEvent("Not an issue".to_owned()));
    }

    Ok(Issue {
        id:         event.id,
        author:     event.pubkey,
        repos:      event
            .get_tags("a")
            .into_iter()
            .filter_map(|tag| tag.content())
            .filter_map(|address| Coordinate::parse(address).ok())
            .collect(),
        subject:    event.get_tag_value("subject").map(ToOwned::to_owned),
        labels:     event
            .get_tags("t")
            .into_iter()
            .filter_map(|tag| tag.content().map(ToOwned::to_owned))
            .collect(),
        content:    event.content.clone(),
        created_at: event.created_at,
    })
}

/// Options for building an issue template.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    /// Repository addresses; the first is the primary one.
    pub repos:   Vec<Coordinate>,
    pub subject: Option<String>,
    pub labels:  Vec<String>,
    /// Markdown body.
    pub content: String,
}

/// Creates an unsigned issue template. The issue is addressed to every
/// repository coordinate and its owner.
pub fn build_issue_event(options: IssueOptions) -> Git34Result<EventBuilder> {
    let mut repos = options.repos.into_iter();
    let first = repos
        .next()
        .ok_or_else(|| Git34Error::InvalidInput("An issue needs a repository".to_owned()))?;

    let event_builder = EventBuilder::git_issue(GitIssue {
        repository: first,
        content:    options.content,
        subject:    options.subject,
        labels:     options
            .labels
            .into_iter()
            .map(|label| label.trim().to_owned())
            .collect(),
    })?
    .tags(repos.clone().map(|c| Tag::coordinate(c, None)))
    .tags(repos.map(|c| Tag::public_key(c.public_key)))
    .dedup_tags();

    Ok(event_builder)
}
