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

use std::{
    collections::{BTreeMap, HashMap},
    sync::LazyLock,
};

use nostr::{
    event::{Event, EventBuilder, EventId, Kind, Tag, TagKind},
    hashes::sha1::Hash as Sha1Hash,
    key::PublicKey,
    nips::{nip01::Coordinate, nip10::Marker},
    types::{RelayUrl, Timestamp},
};
use regex::Regex;

use super::{PULL_REQUEST_KIND, PULL_REQUEST_UPDATE_KIND, tags::EventTagsExt};
use crate::error::{Git34Error, Git34Result};

/// Content of the hashtag representing the root patch.
pub const ROOT_HASHTAG_CONTENT: &str = "root";
/// Content of the hashtag representing the root revision patch.
pub const REVISION_ROOT_HASHTAG_CONTENT: &str = "root-revision";
/// The revision-root hashtag emitted by old `ngit-cli` versions. This was
/// a typo, kept for compatibility.
pub const LEGACY_NGIT_REVISION_ROOT_HASHTAG_CONTENT: &str = "revision-root";

/// Regular expression for checking the first line in a patch.
pub static FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^From (?<commit>[a-f0-9]{40}) \w+ \w+ \d{1,2} \d{2}:\d{2}:\d{2} \d{4}$").unwrap()
});

/// Regular expression for extracting the patch subject.
static SUBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Subject: (.*(?:\n .*)*)").unwrap());

/// The three proposal kinds: patch, pull request and pull request update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalKind {
    Patch,
    PullRequest,
    PullRequestUpdate,
}

/// A parsed patch, pull request or pull-request update.
///
/// The three kinds share their tag vocabulary; [`Patch::kind`] tells them
/// apart where it matters.
#[derive(Debug, Clone)]
pub struct Patch {
    pub id:             EventId,
    pub author:         PublicKey,
    pub kind:           ProposalKind,
    /// The repository address from the first `a` tag.
    pub repo:           Option<Coordinate>,
    /// Commit ids from `c` and `commit` tags, with a fallback to the
    /// `From <sha1>` line of the patch content.
    pub commits:        Vec<Sha1Hash>,
    /// Parent commits from `parent-commit` tags.
    pub parent_commits: Vec<Sha1Hash>,
    pub merge_base:     Option<Sha1Hash>,
    /// Clone URLs for pull requests.
    pub clone:          Vec<String>,
    pub branch_name:    Option<String>,
    pub subject:        Option<String>,
    /// Labels from the event's own `t` tags.
    pub labels:         Vec<String>,
    /// Thread root ids (`e` with root marker or uppercase `E`).
    pub root_ids:       Vec<EventId>,
    /// Immediate parent ids (`e` with reply marker).
    pub parent_ids:     Vec<EventId>,
    /// Recipients from `p` tags.
    pub recipients:     Vec<PublicKey>,
    /// Commit oid this patch supersedes, from a `supersedes` tag.
    pub supersedes:     Option<Sha1Hash>,
    pub content:        String,
    pub created_at:     Timestamp,
}

impl Patch {
    /// The branch the proposal targets, when one was named.
    pub fn base_branch(&self) -> Option<&str> {
        self.branch_name.as_deref()
    }

    /// Whether this is a root proposal.
    pub fn is_root(&self) -> bool {
        self.labels.iter().any(|label| label == ROOT_HASHTAG_CONTENT) || self.parent_ids.is_empty()
    }

    /// Whether this is a revision root, accepting the legacy ngit
    /// spelling.
    pub fn is_revision_root(&self) -> bool {
        self.labels.iter().any(|label| {
            label == REVISION_ROOT_HASHTAG_CONTENT
                || label == LEGACY_NGIT_REVISION_ROOT_HASHTAG_CONTENT
        })
    }
}

/// Whether the event is a patch, pull request or pull-request update.
#[inline]
pub fn is_proposal_event(event: &Event) -> bool {
    proposal_kind(event).is_some()
}

/// The proposal kind of the event, if it is one.
pub fn proposal_kind(event: &Event) -> Option<ProposalKind> {
    if event.kind == Kind::GitPatch {
        Some(ProposalKind::Patch)
    } else if event.kind == PULL_REQUEST_KIND {
        Some(ProposalKind::PullRequest)
    } else if event.kind == PULL_REQUEST_UPDATE_KIND {
        Some(ProposalKind::PullRequestUpdate)
    } else {
        None
    }
}

/// Checks the proposal schema: a proposal kind plus either a commit id or
/// patch content carrying one.
pub fn validate_proposal_event(event: &Event) -> Git34Result<()> {
    if !is_proposal_event(event) {
        return Err(Git34Error::InvalidEvent(format!(
            "Expected a patch, pull request or update, found kind {}",
            event.kind
        )));
    }
    if event.get_tag_value("a").is_none() {
        return Err(Git34Error::InvalidEvent(
            "Proposal without a repository address".to_owned(),
        ));
    }
    Ok(())
}

/// Parses a patch, pull request or pull-request update event.
pub fn parse_proposal_event(event: &Event) -> Git34Result<Patch> {
    let Some(kind) = proposal_kind(event) else {
        return Err(Git34Error::InvalidEvent("Not a proposal".to_owned()));
    };
    if super::validation_enabled() {
        validate_proposal_event(event)?;
    }

    let mut commits: Vec<Sha1Hash> = event
        .get_tags("c")
        .into_iter()
        .chain(event.get_tags("commit"))
        .filter_map(|tag| tag.content())
        .filter_map(|oid| oid.parse().ok())
        .collect();
    commits.dedup();

    // Old patches carry the commit id only in the `From <sha1>` line.
    if commits.is_empty()
        && let Some(oid) = commit_from_content(&event.content)
    {
        commits.push(oid);
    }

    let (root_ids, parent_ids) = thread_markers(event);

    Ok(Patch {
        id: event.id,
        author: event.pubkey,
        kind,
        repo: event
            .get_tag_value("a")
            .and_then(|address| Coordinate::parse(address).ok()),
        commits,
        parent_commits: event
            .get_tags("parent-commit")
            .into_iter()
            .filter_map(|tag| tag.content())
            .filter_map(|oid| oid.parse().ok())
            .collect(),
        merge_base: event
            .get_tag_value("merge-base")
            .and_then(|oid| oid.parse().ok()),
        clone: event
            .get_tag_values("clone")
            .into_iter()
            .map(ToOwned::to_owned)
            .collect(),
        branch_name: event.get_tag_value("branch-name").map(ToOwned::to_owned),
        subject: event
            .get_tag_value("subject")
            .map(ToOwned::to_owned)
            .or_else(|| subject_from_content(&event.content)),
        labels: event
            .get_tags("t")
            .into_iter()
            .filter_map(|tag| tag.content().map(ToOwned::to_owned))
            .collect(),
        root_ids,
        parent_ids,
        recipients: event
            .get_tags("p")
            .into_iter()
            .filter_map(|tag| tag.content())
            .filter_map(|pubkey| PublicKey::parse(pubkey).ok())
            .collect(),
        supersedes: event
            .get_tag_value("supersedes")
            .and_then(|oid| oid.parse().ok()),
        content: event.content.clone(),
        created_at: event.created_at,
    })
}

/// Splits `e`/`E` tags into thread roots and immediate parents.
fn thread_markers(event: &Event) -> (Vec<EventId>, Vec<EventId>) {
    let mut roots = Vec::new();
    let mut parents = Vec::new();

    for tag in event.get_tags("E") {
        if let Some(id) = tag.content().and_then(|id| EventId::parse(id).ok()) {
            roots.push(id);
        }
    }
    for tag in event.get_tags("e") {
        let values = tag.as_slice();
        let Some(id) = values.get(1).and_then(|id| EventId::parse(id).ok()) else {
            continue;
        };
        match values.get(3).map(String::as_str) {
            Some("root") => roots.push(id),
            Some("reply") => parents.push(id),
            // Positional `e` tags without a marker are parents.
            _ => parents.push(id),
        }
    }

    (roots, parents)
}

/// Extracts the commit id from a `From <sha1> …` first line.
pub fn commit_from_content(content: &str) -> Option<Sha1Hash> {
    let first_line = content.lines().next()?;
    FROM_RE
        .captures(first_line)?
        .name("commit")?
        .as_str()
        .parse()
        .ok()
}

/// Extracts the patch subject from the content, folding multi-line
/// subjects the way `git format-patch` wraps them.
pub fn subject_from_content(content: &str) -> Option<String> {
    SUBJECT_RE
        .captures(content)
        .and_then(|captures| captures.get(1))
        .map(|subject| subject.as_str().trim().replace('\n', ""))
}

/// Options for building a patch template.
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Repository address.
    pub repo:           Coordinate,
    /// Relay hint attached to address and event tags.
    pub relay_hint:     Option<RelayUrl>,
    /// `git format-patch` style content.
    pub content:        String,
    pub commit:         Sha1Hash,
    pub parent_commit:  Sha1Hash,
    /// Earliest unique commit of the repository.
    pub euc:            Option<Sha1Hash>,
    /// Root patch this one replies to; `None` makes this patch a root.
    pub in_reply_to:    Option<EventId>,
    /// Marks the patch as a revision root of the given proposal.
    pub revision_of:    Option<EventId>,
    pub branch_name:    Option<String>,
    pub maintainers:    Vec<PublicKey>,
    pub labels:         Vec<String>,
}

/// Creates an unsigned patch template.
pub fn build_patch_event(options: PatchOptions) -> EventBuilder {
    let mut event_builder = EventBuilder::new(Kind::GitPatch, options.content)
        .tag(Tag::coordinate(
            options.repo.clone(),
            options.relay_hint.clone(),
        ))
        .tag(Tag::custom(
            TagKind::custom("commit"),
            [options.commit.to_string()],
        ))
        .tag(Tag::reference(options.commit.to_string()))
        .tag(Tag::custom(
            TagKind::custom("parent-commit"),
            [options.parent_commit.to_string()],
        ))
        .tags(options.maintainers.iter().map(|p| Tag::public_key(*p)));

    if let Some(euc) = options.euc {
        event_builder = event_builder.tag(Tag::reference(euc.to_string()));
    }

    event_builder = match (options.in_reply_to, options.revision_of) {
        (Some(root), _) => {
            event_builder.tag(super::tags::event_reply_tag(
                &root,
                options.relay_hint.as_ref(),
                Marker::Root,
            ))
        }
        (None, Some(proposal)) => {
            event_builder
                .tag(Tag::hashtag(ROOT_HASHTAG_CONTENT))
                .tag(Tag::hashtag(REVISION_ROOT_HASHTAG_CONTENT))
                .tag(super::tags::event_reply_tag(
                    &proposal,
                    options.relay_hint.as_ref(),
                    Marker::Reply,
                ))
        }
        (None, None) => event_builder.tag(Tag::hashtag(ROOT_HASHTAG_CONTENT)),
    };

    if let Some(branch_name) = options.branch_name {
        event_builder = event_builder.tag(Tag::custom(TagKind::custom("branch-name"), [
            branch_name,
        ]));
    }

    event_builder
        .tags(options.labels.into_iter().map(Tag::hashtag))
        .dedup_tags()
}

/// Options for building a pull request or pull-request update template.
#[derive(Debug, Clone)]
pub struct PullRequestOptions {
    /// Repository addresses; every maintainer fork counts.
    pub repos:       Vec<Coordinate>,
    pub relay_hint:  Option<RelayUrl>,
    pub subject:     String,
    /// Markdown body.
    pub content:     String,
    /// Tip commit of the PR branch.
    pub commit:      Sha1Hash,
    pub merge_base:  Option<Sha1Hash>,
    pub clone:       Vec<String>,
    pub branch_name: Option<String>,
    pub maintainers: Vec<PublicKey>,
    pub labels:      Vec<String>,
    /// Root pull request; set for updates.
    pub update_of:   Option<EventId>,
}

/// Creates an unsigned pull request template, or an update template when
/// `update_of` names the root.
pub fn build_pull_request_event(options: PullRequestOptions) -> EventBuilder {
    let kind = if options.update_of.is_some() {
        PULL_REQUEST_UPDATE_KIND
    } else {
        PULL_REQUEST_KIND
    };

    let mut event_builder = EventBuilder::new(kind, options.content)
        .tags(
            options
                .repos
                .into_iter()
                .map(|repo| Tag::coordinate(repo, options.relay_hint.clone())),
        )
        .tag(Tag::custom(TagKind::custom("subject"), [options.subject]))
        .tag(Tag::custom(TagKind::custom("c"), [
            options.commit.to_string(),
        ]))
        .tags(options.maintainers.iter().map(|p| Tag::public_key(*p)))
        .tags(options.labels.into_iter().map(Tag::hashtag));

    if let Some(merge_base) = options.merge_base {
        event_builder = event_builder.tag(Tag::custom(TagKind::custom("merge-base"), [
            merge_base.to_string(),
        ]));
    }

    if !options.clone.is_empty() {
        event_builder = event_builder.tag(Tag::custom(TagKind::custom("clone"), options.clone));
    }

    if let Some(branch_name) = options.branch_name {
        event_builder = event_builder.tag(Tag::custom(TagKind::custom("branch-name"), [
            branch_name,
        ]));
    }

    if let Some(root) = options.update_of {
        event_builder = event_builder.tag(super::tags::event_reply_tag(
            &root,
            options.relay_hint.as_ref(),
            Marker::Root,
        ));
    }

    event_builder.dedup_tags()
}

/// One node of a patch stack graph.
#[derive(Debug, Clone)]
pub struct PatchNode {
    pub patch:    Patch,
    /// Commit oids of patches whose `parent-commit` points here.
    pub children: Vec<Sha1Hash>,
}

/// A DAG of patches keyed by commit oid.
///
/// Roots are patches tagged `root` or without parents in the set;
/// revision roots are kept separately. Patches superseded by a newer
/// revision (via `supersedes` tags) are folded out of `roots`.
#[derive(Debug, Clone, Default)]
pub struct StackGraph {
    pub nodes:          BTreeMap<Sha1Hash, PatchNode>,
    pub roots:          Vec<Sha1Hash>,
    pub revision_roots: Vec<Sha1Hash>,
}

/// Builds the stack graph for a set of patches.
pub fn build_stack_graph(patches: &[Patch]) -> StackGraph {
    let mut graph = StackGraph::default();
    let mut superseded: HashMap<Sha1Hash, Sha1Hash> = HashMap::new();

    for patch in patches {
        let Some(oid) = patch.commits.first().copied() else {
            tracing::debug!(id = %patch.id, "Skipping patch without a commit id");
            continue;
        };
        if let Some(old) = patch.supersedes {
            superseded.insert(old, oid);
        }
        graph.nodes.insert(oid, PatchNode {
            patch:    patch.clone(),
            children: Vec::new(),
        });
    }

    // Wire children and collect roots.
    let oids: Vec<Sha1Hash> = graph.nodes.keys().copied().collect();
    for oid in oids {
        let (parents, is_root_tagged, is_revision) = {
            let node = &graph.nodes[&oid];
            (
                node.patch.parent_commits.clone(),
                node.patch
                    .labels
                    .iter()
                    .any(|label| label == ROOT_HASHTAG_CONTENT),
                node.patch.is_revision_root(),
            )
        };

        let mut has_parent_in_graph = false;
        for parent in parents {
            if let Some(parent_node) = graph.nodes.get_mut(&parent) {
                parent_node.children.push(oid);
                has_parent_in_graph = true;
            }
        }

        if is_revision {
            graph.revision_roots.push(oid);
        }
        if (is_root_tagged || !has_parent_in_graph) && !superseded.contains_key(&oid) {
            graph.roots.push(oid);
        }
    }

    graph.roots.sort_unstable();
    graph.revision_roots.sort_unstable();
    graph
}
