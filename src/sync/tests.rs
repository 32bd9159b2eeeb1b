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

use std::{path::Path, sync::Arc, time::Duration};

use super::*;
use crate::{
    cache::{MemoryCacheStore, now_ms},
    io::git::{Remote, ServerRef},
    testutil::{MockGit, oid},
};

const TTL: Duration = Duration::from_secs(60 * 60);

fn engine(git: Arc<MockGit>, cache: Arc<MemoryCacheStore>) -> SyncEngine {
    SyncEngine::new(
        git,
        cache,
        Arc::new(UrlPreferenceStore::new()),
        std::env::temp_dir().join("git34-sync-tests"),
        TTL,
    )
}

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|url| (*url).to_owned()).collect()
}

#[tokio::test]
async fn resolve_branch_order_and_strict_contract() {
    let git = MockGit::new();
    git.set_ref("master", oid(1)).await;

    // Requested wins when it resolves.
    git.set_ref("feature", oid(2)).await;
    assert_eq!(
        resolve_branch(&git, Path::new("."), Some("feature"), false)
            .await
            .unwrap(),
        "feature"
    );

    // Otherwise the candidate list applies.
    assert_eq!(
        resolve_branch(&git, Path::new("."), None, false).await.unwrap(),
        "master"
    );

    // Strict mode passes an unresolvable requested name through, for
    // freshly fetched tracking refs without a local branch yet.
    let empty = MockGit::new();
    assert_eq!(
        resolve_branch(&empty, Path::new("."), Some("topic"), true)
            .await
            .unwrap(),
        "topic"
    );

    // Non-strict falls back to the first local branch.
    empty.branches.lock().await.push("exotic".to_owned());
    assert_eq!(
        resolve_branch(&empty, Path::new("."), Some("topic"), false)
            .await
            .unwrap(),
        "exotic"
    );

    // Nothing at all is an error.
    let bare = MockGit::new();
    assert!(resolve_branch(&bare, Path::new("."), None, false).await.is_err());
}

#[tokio::test]
async fn smart_initialize_prefers_cache() {
    let git = Arc::new(MockGit::new());
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache.clone());

    let first = sync
        .smart_initialize(
            InitializeOptions {
                repo_id:      "demo".to_owned(),
                clone_urls:   urls(&["https://h/demo.git"]),
                force_update: false,
            },
            None,
        )
        .await
        .unwrap();
    assert!(first.success);
    assert!(!first.from_cache);
    assert_eq!(git.clones.lock().await.len(), 1);

    // Second call is answered from the cache without cloning again.
    let second = sync
        .smart_initialize(
            InitializeOptions {
                repo_id:      "demo".to_owned(),
                clone_urls:   urls(&["https://h/demo.git"]),
                force_update: false,
            },
            None,
        )
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(git.clones.lock().await.len(), 1);
}

#[tokio::test]
async fn smart_initialize_walks_urls_in_order() {
    let git = Arc::new(MockGit::new());
    git.failing_urls.lock().await.insert(
        "ssh://git@h/demo.git".to_owned(),
        "connection refused".to_owned(),
    );
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache);

    let outcome = sync
        .smart_initialize(
            InitializeOptions {
                repo_id:      "demo".to_owned(),
                clone_urls:   urls(&["ssh://git@h/demo.git", "https://h/demo.git"]),
                force_update: false,
            },
            None,
        )
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    let clones = git.clones.lock().await;
    assert_eq!(clones.len(), 1);
    assert_eq!(clones[0].url, "https://h/demo.git");
    assert_eq!(clones[0].depth, Some(1));
}

#[tokio::test]
async fn smart_initialize_reports_cors_and_exhaustion() {
    let git = Arc::new(MockGit::new());
    git.failing_urls.lock().await.insert(
        "https://h/demo.git".to_owned(),
        "blocked by CORS policy".to_owned(),
    );
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache);

    let outcome = sync
        .smart_initialize(
            InitializeOptions {
                repo_id:      "demo".to_owned(),
                clone_urls:   urls(&["https://h/demo.git"]),
                force_update: false,
            },
            None,
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.cors_error);

    // Plain failures report the attempt count.
    let git = Arc::new(MockGit::new());
    git.failing_urls
        .lock()
        .await
        .insert("https://a/x.git".to_owned(), "boom".to_owned());
    git.failing_urls
        .lock()
        .await
        .insert("https://b/x.git".to_owned(), "boom".to_owned());
    let sync = engine(git.clone(), Arc::new(MemoryCacheStore::new()));
    let outcome = sync
        .smart_initialize(
            InitializeOptions {
                repo_id:      "x".to_owned(),
                clone_urls:   urls(&["https://a/x.git", "https://b/x.git"]),
                force_update: false,
            },
            None,
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(!outcome.cors_error);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.error.unwrap().contains("2 URL(s) tried"));
}

#[tokio::test]
async fn tiers_never_downgrade() {
    let git = Arc::new(MockGit::new());
    git.set_ref("main", oid(1)).await;
    git.remotes.lock().await.push(Remote {
        name: "origin".to_owned(),
        url:  Some("https://h/demo.git".to_owned()),
    });
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache.clone());

    sync.smart_initialize(
        InitializeOptions {
            repo_id:      "demo".to_owned(),
            clone_urls:   urls(&["https://h/demo.git"]),
            force_update: false,
        },
        None,
    )
    .await
    .unwrap();

    let full = sync
        .ensure_full_clone("demo", Some("main"), Some(500))
        .await
        .unwrap();
    assert_eq!(full.snapshot.unwrap().data_level, DataLevel::Full);

    // A later shallow ensure keeps the full tier.
    let shallow = sync.ensure_shallow("demo", Some("main")).await.unwrap();
    assert_eq!(shallow.snapshot.unwrap().data_level, DataLevel::Full);
}

#[tokio::test]
async fn ensure_full_clone_requires_origin_url() {
    let git = Arc::new(MockGit::new());
    git.set_ref("main", oid(1)).await;
    git.remotes.lock().await.push(Remote {
        name: "origin".to_owned(),
        url:  None,
    });
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache);

    sync.smart_initialize(
        InitializeOptions {
            repo_id:      "demo".to_owned(),
            clone_urls:   urls(&["https://h/demo.git"]),
            force_update: false,
        },
        None,
    )
    .await
    .unwrap();

    assert!(sync.ensure_full_clone("demo", Some("main"), None).await.is_err());
}

#[tokio::test]
async fn sync_with_remote_updates_local_branch() {
    let git = Arc::new(MockGit::new());
    git.set_ref("main", oid(1)).await;
    git.set_ref("refs/remotes/origin/main", oid(2)).await;
    git.set_ref("HEAD", oid(1)).await;
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache);

    let outcome = sync
        .sync_with_remote("demo", &urls(&["https://h/demo.git"]), Some("main"))
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(outcome.synced);
    assert_eq!(git.refs.lock().await.get("main"), Some(&oid(2)));
}

#[tokio::test]
async fn sync_with_remote_treats_cors_as_warning() {
    let git = Arc::new(MockGit::new());
    git.set_ref("main", oid(1)).await;
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache);

    sync.smart_initialize(
        InitializeOptions {
            repo_id:      "demo".to_owned(),
            clone_urls:   urls(&["https://h/demo.git"]),
            force_update: false,
        },
        None,
    )
    .await
    .unwrap();

    *git.fetch_error.lock().await = Some("Access-Control-Allow-Origin missing".to_owned());
    let outcome = sync
        .sync_with_remote("demo", &urls(&["https://h/demo.git"]), Some("main"))
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(!outcome.synced);
    assert!(outcome.cors_error);
    assert!(outcome.warning.is_some());
}

#[tokio::test]
async fn needs_update_rules() {
    let git = Arc::new(MockGit::new());
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = engine(git.clone(), cache.clone());
    let url = "https://h/demo.git";

    // Probe failure defaults to no update.
    assert!(!sync.needs_update("demo", url).await);

    // No cache + empty remote: the initial push is allowed.
    git.server_refs.lock().await.insert(url.to_owned(), Vec::new());
    assert!(!sync.needs_update("demo", url).await);

    // No cache + remote refs: update needed.
    git.server_refs.lock().await.insert(url.to_owned(), vec![ServerRef {
        name: "refs/heads/main".to_owned(),
        oid:  oid(2),
    }]);
    assert!(sync.needs_update("demo", url).await);

    // Fresh cache with the matching head: no update.
    cache
        .put_repo(crate::cache::RepoSnapshot {
            repo_id:      "demo".to_owned(),
            data_level:   DataLevel::Refs,
            head_commit:  Some(oid(2).to_string()),
            branches:     vec!["main".to_owned()],
            tags:         None,
            clone_urls:   vec![url.to_owned()],
            last_updated: now_ms(),
        })
        .await
        .unwrap();
    assert!(!sync.needs_update("demo", url).await);

    // Head moved on the server: update.
    git.server_refs.lock().await.insert(url.to_owned(), vec![ServerRef {
        name: "refs/heads/main".to_owned(),
        oid:  oid(3),
    }]);
    assert!(sync.needs_update("demo", url).await);

    // Stale cache: update regardless of heads.
    cache
        .put_repo(crate::cache::RepoSnapshot {
            repo_id:      "demo".to_owned(),
            data_level:   DataLevel::Refs,
            head_commit:  Some(oid(3).to_string()),
            branches:     vec!["main".to_owned()],
            tags:         None,
            clone_urls:   vec![url.to_owned()],
            last_updated: now_ms() - 2 * TTL.as_millis() as i64,
        })
        .await
        .unwrap();
    assert!(sync.needs_update("demo", url).await);
}

#[tokio::test]
async fn inflight_builds_are_coalesced() {
    let git = Arc::new(MockGit::new());
    let cache = Arc::new(MemoryCacheStore::new());
    let sync = Arc::new(engine(git.clone(), cache));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let sync = sync.clone();
        handles.push(tokio::spawn(async move {
            sync.smart_initialize(
                InitializeOptions {
                    repo_id:      "demo".to_owned(),
                    clone_urls:   vec!["https://h/demo.git".to_owned()],
                    force_update: false,
                },
                None,
            )
            .await
            .unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    // One clone total; everyone else was answered from the cache.
    assert_eq!(git.clones.lock().await.len(), 1);
}
