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

use std::{borrow::Cow, collections::BTreeMap, collections::HashSet, sync::LazyLock};

use nostr::{
    event::{Event, EventBuilder, Tag, TagKind},
    hashes::sha1::Hash as Sha1Hash,
    key::PublicKey,
    types::Timestamp,
};
use regex::Regex;

use super::{REPO_STATE_KIND, tags::EventTagsExt};
use crate::error::{Git34Error, Git34Result};

/// Prefix for branch references in Git.
pub const HEADS_REFS: &str = "refs/heads/";

/// Prefix for tag references in Git.
pub const TAGS_REFS: &str = "refs/tags/";

/// `HEAD` tag kind
const HEAD_TAG_KIND: TagKind = TagKind::Custom(Cow::Borrowed("HEAD"));

/// A ref value must be a branch or tag under the standard namespaces;
/// entries failing this are dropped.
static FULL_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^refs/(heads|tags)/.+$").unwrap());

/// Whether a ref names a branch or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefType {
    Head,
    Tag,
}

/// One `(ref, commit)` entry of a repository state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// Full ref name, e.g. `refs/heads/main`.
    pub name:   String,
    /// Commit the ref points at.
    pub commit: Sha1Hash,
}

impl RefEntry {
    /// Branch or tag, derived from the ref namespace.
    pub fn ref_type(&self) -> RefType {
        if self.name.starts_with(TAGS_REFS) {
            RefType::Tag
        } else {
            RefType::Head
        }
    }

    /// The name without its `refs/heads/` or `refs/tags/` prefix.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix(HEADS_REFS)
            .or_else(|| self.name.strip_prefix(TAGS_REFS))
            .unwrap_or(&self.name)
    }
}

/// A parsed repository state (kind 30618).
#[derive(Debug, Clone)]
pub struct RepoState {
    /// The state author.
    pub author:     PublicKey,
    /// Repository identifier (`d` tag).
    pub identifier: String,
    /// Symbolic `HEAD` target, e.g. `refs/heads/main`.
    pub head:       Option<String>,
    /// Ref entries, malformed ones dropped.
    pub refs:       Vec<RefEntry>,
    /// State timestamp.
    pub created_at: Timestamp,
}

/// Whether the event is a repository state.
#[inline]
pub fn is_state_event(event: &Event) -> bool {
    event.kind == REPO_STATE_KIND
}

/// Checks the state schema: the kind and a non-empty `d` tag.
pub fn validate_state_event(event: &Event) -> Git34Result<()> {
    if !is_state_event(event) {
        return Err(Git34Error::InvalidEvent(format!(
            "Expected kind {REPO_STATE_KIND}, found {}",
            event.kind
        )));
    }
    if event.get_tag_value("d").is_none_or(str::is_empty) {
        return Err(Git34Error::InvalidEvent(
            "Repository state without a `d` identifier".to_owned(),
        ));
    }
    Ok(())
}

/// Parses a repository state event.
///
/// Three ref encodings are accepted: the modern `["ref", <fullRef>,
/// <commit>]`, the direct `["refs/heads/<name>", <commit>]` form, and the
/// legacy paired `["r", <ref>, "ref"]` + `["r", <oid>, "commit"]` form.
/// Entries whose ref is outside `refs/(heads|tags)/` or whose commit id
/// fails to parse are dropped.
pub fn parse_state_event(event: &Event) -> Git34Result<RepoState> {
    if super::validation_enabled() {
        validate_state_event(event)?;
    } else if !is_state_event(event) {
        return Err(Git34Error::InvalidEvent("Not a repository state".to_owned()));
    }

    let mut refs = Vec::new();

    // Modern form.
    for tag in event.get_tags("ref") {
        let values = tag.as_slice();
        if let (Some(name), Some(commit)) = (values.get(1), values.get(2))
            && let Some(entry) = ref_entry(name, commit)
        {
            refs.push(entry);
        }
    }

    // Direct form: the tag name is the full ref.
    for tag in direct_ref_tags(event) {
        let values = tag.as_slice();
        if let (Some(name), Some(commit)) = (values.first(), values.get(1))
            && let Some(entry) = ref_entry(name, commit)
        {
            refs.push(entry);
        }
    }

    // Legacy form: an `["r", <ref>, "ref"]` tag immediately paired with an
    // `["r", <oid>, "commit"]` tag.
    let r_tags = event.get_tags("r");
    let mut index = 0;
    while index < r_tags.len() {
        let values = r_tags[index].as_slice();
        if values.get(2).is_some_and(|marker| marker == "ref")
            && let Some(name) = values.get(1)
            && let Some(next) = r_tags.get(index + 1)
            && next.as_slice().get(2).is_some_and(|marker| marker == "commit")
            && let Some(commit) = next.as_slice().get(1)
        {
            if let Some(entry) = ref_entry(name, commit) {
                refs.push(entry);
            }
            index += 2;
            continue;
        }
        index += 1;
    }

    Ok(RepoState {
        author: event.pubkey,
        identifier: event.get_tag_value("d").unwrap_or_default().to_owned(),
        head: event
            .get_tag_value("HEAD")
            .map(|head| head.trim_start_matches("ref: ").to_owned()),
        refs,
        created_at: event.created_at,
    })
}

/// Builds a `RefEntry`, dropping invalid names and unparsable commits.
fn ref_entry(name: &str, commit: &str) -> Option<RefEntry> {
    if !FULL_REF_RE.is_match(name) {
        tracing::trace!(name, "Dropping state ref outside refs/(heads|tags)/");
        return None;
    }
    let commit = commit.parse().ok()?;
    Some(RefEntry {
        name: name.to_owned(),
        commit,
    })
}

/// Tags whose name itself is a full ref.
fn direct_ref_tags(event: &Event) -> Vec<&Tag> {
    let mut tags = Vec::new();
    for prefix in [HEADS_REFS, TAGS_REFS] {
        for tag in event.get_tags_with_prefix(prefix) {
            tags.push(tag);
        }
    }
    tags
}

/// Options for building a repository state template.
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    pub identifier: String,
    /// Short name of the primary branch, such as `master` or `main`.
    pub head:       Option<String>,
    /// Branch and tag entries to announce.
    pub refs:       Vec<RefEntry>,
}

/// Creates an unsigned repository state template. Always emits the modern
/// `["ref", <fullRef>, <commit>]` encoding.
pub fn build_state_event(options: StateOptions) -> EventBuilder {
    let mut event_builder = EventBuilder::new(REPO_STATE_KIND, "")
        .dedup_tags()
        .tag(Tag::identifier(&options.identifier));

    if let Some(head) = options.head {
        event_builder = event_builder.tag(Tag::custom(
            HEAD_TAG_KIND,
            [format!("ref: {HEADS_REFS}{head}")],
        ));
    }

    event_builder.tags(options.refs.into_iter().map(|entry| {
        Tag::custom(
            TagKind::custom("ref"),
            [entry.name, entry.commit.to_string()],
        )
    }))
}

/// Deterministically merges states into one ref table.
///
/// Entries from untrusted authors are excluded; for each `(type, name)`
/// key the entry with the greatest `created_at` wins, ties broken in
/// favor of the state seen later in the (already sorted) input.
pub fn merge_states(
    states: &[RepoState],
    trusted: &HashSet<PublicKey>,
) -> BTreeMap<(RefType, String), RefEntry> {
    let mut merged: BTreeMap<(RefType, String), (Timestamp, RefEntry)> = BTreeMap::new();

    for state in states {
        if !trusted.contains(&state.author) {
            tracing::debug!(author = %state.author, "Skipping state from untrusted author");
            continue;
        }
        for entry in &state.refs {
            let key = (entry.ref_type(), entry.short_name().to_owned());
            match merged.get(&key) {
                Some((seen_at, _)) if *seen_at > state.created_at => {}
                _ => {
                    merged.insert(key, (state.created_at, entry.clone()));
                }
            }
        }
    }

    merged
        .into_iter()
        .map(|(key, (_, entry))| (key, entry))
        .collect()
}
