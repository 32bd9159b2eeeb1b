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

use nostr::event::{Event, EventBuilder, Kind, Tag, TagKind};

use super::{
    announcement::parse_announcement_event,
    comment::{belongs_to_thread, comment_refs},
    label::parse_label_event,
    patch::{
        Patch, build_stack_graph, commit_from_content, parse_proposal_event,
        subject_from_content,
    },
    state::{RefEntry, RefType, StateOptions, build_state_event, merge_states,
            parse_state_event},
    status::{StatusOptions, build_status_event, parse_status_event},
    tags::{EventTagsExt, parse_euc_tag},
};
use crate::testutil::{announcement_event, keys, oid, sign};

fn tags_json(event: &Event) -> String {
    serde_json::to_string(&event.tags).unwrap()
}

#[test]
fn tag_mutation_never_touches_the_input() {
    let keys = keys();
    let event = announcement_event(
        &keys,
        "demo-repo",
        vec![Tag::custom(TagKind::custom("name"), ["Demo"])],
        100,
    );
    let before = tags_json(&event);

    let added = event.with_tag(Tag::custom(TagKind::custom("web"), ["https://example.com"]));
    let replaced = event.with_tag_set(Tag::custom(TagKind::custom("name"), ["Renamed"]));
    let removed = event.without_tag("name");

    // The input survives a serialization round-trip structurally
    // unchanged.
    assert_eq!(tags_json(&event), before);
    let round_trip: Event = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
    assert_eq!(tags_json(&round_trip), before);

    assert_eq!(added.get_tag_value("web"), Some("https://example.com"));
    assert_eq!(replaced.get_tag_value("name"), Some("Renamed"));
    assert_eq!(replaced.get_tags("name").len(), 1);
    assert!(removed.get_tag("name").is_none());
}

#[test]
fn tag_accessors() {
    let keys = keys();
    let event = announcement_event(
        &keys,
        "demo-repo",
        vec![
            Tag::custom(TagKind::custom("clone"), [
                "https://h/demo.git",
                "ssh://git@h/demo.git",
            ]),
            Tag::custom(TagKind::custom("clone"), ["https://mirror/demo.git"]),
            Tag::custom(TagKind::custom("r"), [oid(1).to_string(), "euc".to_owned()]),
        ],
        100,
    );

    assert_eq!(event.get_tag_value("d"), Some("demo-repo"));
    assert_eq!(event.get_tags("clone").len(), 2);
    assert_eq!(event.get_tag_values("clone"), vec![
        "https://h/demo.git",
        "ssh://git@h/demo.git",
        "https://mirror/demo.git",
    ]);
    assert_eq!(parse_euc_tag(&event.tags), Some(oid(1)));
    assert_eq!(event.euc(), Some(oid(1)));
}

#[test]
fn announcement_parsing_drops_invalid_values() {
    let keys = keys();
    let maintainer = crate::testutil::keys().public_key();
    let event = announcement_event(
        &keys,
        "demo-repo",
        vec![
            Tag::custom(TagKind::custom("maintainers"), [
                maintainer.to_hex(),
                "not-a-pubkey".to_owned(),
            ]),
            Tag::custom(TagKind::custom("relays"), [
                "wss://relay.example.com",
                "::broken::",
            ]),
            Tag::custom(TagKind::custom("t"), ["rust"]),
        ],
        100,
    );

    let announcement = parse_announcement_event(&event).unwrap();
    assert_eq!(announcement.identifier, "demo-repo");
    assert_eq!(announcement.maintainers, vec![maintainer]);
    assert_eq!(announcement.relays.len(), 1);
    assert_eq!(announcement.topics, vec!["rust"]);
    assert!(announcement.euc.is_none());
}

#[test]
fn state_accepts_all_three_ref_encodings() {
    let keys = keys();
    let event = sign(
        EventBuilder::new(super::REPO_STATE_KIND, "")
            .tag(Tag::identifier("demo-repo"))
            .tag(Tag::custom(TagKind::custom("HEAD"), [
                "ref: refs/heads/main",
            ]))
            // Modern form.
            .tag(Tag::custom(TagKind::custom("ref"), [
                "refs/heads/main".to_owned(),
                oid(1).to_string(),
            ]))
            // Direct form.
            .tag(Tag::custom(TagKind::custom("refs/tags/v1.0.0"), [
                oid(2).to_string(),
            ]))
            // Legacy paired form.
            .tag(Tag::custom(TagKind::custom("r"), [
                "refs/heads/dev",
                "ref",
            ]))
            .tag(Tag::custom(TagKind::custom("r"), [
                oid(3).to_string(),
                "commit".to_owned(),
            ]))
            // Outside refs/(heads|tags)/: dropped.
            .tag(Tag::custom(TagKind::custom("ref"), [
                "refs/notes/commits".to_owned(),
                oid(4).to_string(),
            ])),
        &keys,
        100,
    );

    let state = parse_state_event(&event).unwrap();
    assert_eq!(state.head.as_deref(), Some("refs/heads/main"));
    assert_eq!(state.refs.len(), 3);
    assert!(
        state
            .refs
            .iter()
            .any(|entry| entry.name == "refs/heads/main" && entry.commit == oid(1))
    );
    assert!(
        state
            .refs
            .iter()
            .any(|entry| entry.name == "refs/tags/v1.0.0"
                && entry.commit == oid(2)
                && entry.ref_type() == RefType::Tag)
    );
    assert!(
        state
            .refs
            .iter()
            .any(|entry| entry.name == "refs/heads/dev" && entry.commit == oid(3))
    );
}

#[test]
fn state_builder_emits_modern_form() {
    let keys = keys();
    let event = sign(
        build_state_event(StateOptions {
            identifier: "demo-repo".to_owned(),
            head:       Some("main".to_owned()),
            refs:       vec![RefEntry {
                name:   "refs/heads/main".to_owned(),
                commit: oid(1),
            }],
        }),
        &keys,
        100,
    );

    assert_eq!(event.get_tag_value("HEAD"), Some("ref: refs/heads/main"));
    let ref_tag = event.get_tag("ref").unwrap();
    assert_eq!(ref_tag.as_slice()[1], "refs/heads/main");
    assert_eq!(ref_tag.as_slice()[2], oid(1).to_string());
    // No legacy pairs on output.
    assert!(event.get_tags("r").is_empty());
}

#[test]
fn state_merge_is_deterministic_and_trust_gated() {
    let maintainer = keys();
    let stranger = keys();

    let state = |author: &nostr::key::Keys, commit, created_at| {
        parse_state_event(&sign(
            build_state_event(StateOptions {
                identifier: "demo-repo".to_owned(),
                head:       None,
                refs:       vec![RefEntry {
                    name: "refs/heads/main".to_owned(),
                    commit,
                }],
            }),
            author,
            created_at,
        ))
        .unwrap()
    };

    let states = vec![
        state(&maintainer, oid(1), 100),
        state(&maintainer, oid(2), 200),
        state(&stranger, oid(9), 300),
    ];
    let trusted = std::collections::HashSet::from([maintainer.public_key()]);

    let merged = merge_states(&states, &trusted);
    let entry = merged
        .get(&(RefType::Head, "main".to_owned()))
        .expect("main is present");
    // Newest trusted entry wins; the stranger's newer state is ignored.
    assert_eq!(entry.commit, oid(2));
}

#[test]
fn patch_commit_and_subject_from_content() {
    let content = "From 24e8522268ad675996fc3b35209ce23951236bdc Mon Sep 17 00:00:00 2001\n\
                   From: Awiteb <a@4rs.nl>\n\
                   Date: Tue, 27 May 2025 19:20:42 +0000\n\
                   Subject: [PATCH] chore: Some long subject yes so long one Some long\n \
                   subject continued\n\
                   \n\
                   Body\n";

    assert_eq!(
        commit_from_content(content).unwrap().to_string(),
        "24e8522268ad675996fc3b35209ce23951236bdc"
    );
    assert_eq!(
        subject_from_content(content).unwrap(),
        "[PATCH] chore: Some long subject yes so long one Some long subject continued"
    );
}

#[test]
fn patch_parse_falls_back_to_content_commit() {
    let keys = keys();
    let content = "From 24e8522268ad675996fc3b35209ce23951236bdc Mon Sep 17 00:00:00 2001\n\
                   Subject: [PATCH] fix\n\n\
                   body\n";
    let event = sign(
        EventBuilder::new(Kind::GitPatch, content)
            .tag(Tag::custom(TagKind::a(), [format!(
                "30617:{}:demo-repo",
                keys.public_key().to_hex()
            )]))
            .tag(Tag::hashtag("root")),
        &keys,
        100,
    );

    let patch = parse_proposal_event(&event).unwrap();
    assert_eq!(
        patch.commits.first().unwrap().to_string(),
        "24e8522268ad675996fc3b35209ce23951236bdc"
    );
    assert!(patch.is_root());
    assert!(!patch.is_revision_root());
}

#[test]
fn patch_accepts_legacy_revision_root_spelling() {
    let keys = keys();
    let event = sign(
        EventBuilder::new(Kind::GitPatch, "diff --git a/x b/x")
            .tag(Tag::custom(TagKind::a(), [format!(
                "30617:{}:demo-repo",
                keys.public_key().to_hex()
            )]))
            .tag(Tag::custom(TagKind::custom("c"), [oid(5).to_string()]))
            .tag(Tag::hashtag("root"))
            .tag(Tag::hashtag("revision-root")),
        &keys,
        100,
    );

    let patch = parse_proposal_event(&event).unwrap();
    assert!(patch.is_revision_root());
}

#[test]
fn comment_thread_matching_is_kind_scoped() {
    let keys = keys();
    let root = sign(
        EventBuilder::new(Kind::GitIssue, "the issue").tag(Tag::custom(TagKind::a(), [
            format!("30617:{}:demo-repo", keys.public_key().to_hex()),
        ])),
        &keys,
        100,
    );

    let comment = |root_kind: u16| {
        sign(
            EventBuilder::new(Kind::Comment, "reply")
                .tag(Tag::custom(TagKind::custom("E"), [root.id.to_hex()]))
                .tag(Tag::custom(TagKind::custom("K"), [root_kind.to_string()])),
            &keys,
            200,
        )
    };

    let matching = comment_refs(&comment(1621));
    let mismatched = comment_refs(&comment(1617));

    assert!(belongs_to_thread(&matching, &root.id, None, root.kind));
    // Same root id, wrong `K`: not part of the thread.
    assert!(!belongs_to_thread(&mismatched, &root.id, None, root.kind));
}

#[test]
fn label_values_default_to_ugc_namespace() {
    let keys = keys();
    let event = sign(
        EventBuilder::new(Kind::Label, "")
            .tag(Tag::custom(TagKind::custom("l"), ["bug"]))
            .tag(Tag::custom(TagKind::e(), [oid(7).to_string()])),
        &keys,
        100,
    );

    let label = parse_label_event(&event).unwrap();
    assert_eq!(label.values.len(), 1);
    assert_eq!(label.values[0].namespace, "ugc");
    assert_eq!(label.values[0].value, "bug");
}

#[test]
fn status_build_parse_round_trip() {
    let keys = keys();
    let author = crate::testutil::keys().public_key();
    let root = sign(EventBuilder::new(Kind::GitPatch, "diff"), &keys, 100);

    let event = sign(
        build_status_event(StatusOptions {
            kind:            Kind::GitStatusApplied,
            root:            root.id,
            root_author:     author,
            maintainers:     vec![keys.public_key()],
            repos:           Vec::new(),
            relay_hint:      None,
            applied_commits: vec![oid(1), oid(2)],
            merge_commit:    Some(oid(3)),
            content:         String::new(),
        })
        .unwrap(),
        &keys,
        200,
    );

    let status = parse_status_event(&event).unwrap();
    assert_eq!(status.kind, Kind::GitStatusApplied);
    assert_eq!(status.root, Some(root.id));
    assert_eq!(status.applied_commits, vec![oid(1), oid(2)]);
    assert_eq!(status.merge_commit, Some(oid(3)));
}

#[test]
fn stack_graph_folds_superseded_roots() {
    let keys = keys();
    let repo_tag = Tag::custom(TagKind::a(), [format!(
        "30617:{}:demo-repo",
        keys.public_key().to_hex()
    )]);

    let patch = |commit: u8, parent: Option<u8>, extra: Vec<Tag>| -> Patch {
        let mut builder = EventBuilder::new(Kind::GitPatch, "diff --git a/x b/x")
            .tag(repo_tag.clone())
            .tag(Tag::custom(TagKind::custom("c"), [oid(commit).to_string()]))
            .tags(extra);
        if let Some(parent) = parent {
            builder = builder.tag(Tag::custom(TagKind::custom("parent-commit"), [
                oid(parent).to_string(),
            ]));
        }
        parse_proposal_event(&sign(builder, &keys, 100)).unwrap()
    };

    let root = patch(1, None, vec![Tag::hashtag("root")]);
    let child = patch(2, Some(1), Vec::new());
    let revision = patch(3, None, vec![
        Tag::hashtag("root"),
        Tag::hashtag("root-revision"),
        Tag::custom(TagKind::custom("supersedes"), [oid(1).to_string()]),
    ]);

    let graph = build_stack_graph(&[root, child, revision]);
    assert_eq!(graph.nodes.len(), 3);
    // The superseded original root is folded out of the root set.
    assert_eq!(graph.roots, vec![oid(3)]);
    assert_eq!(graph.revision_roots, vec![oid(3)]);
    assert_eq!(graph.nodes[&oid(1)].children, vec![oid(2)]);
}
