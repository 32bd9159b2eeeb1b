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

//! In-crate test doubles: a scriptable git backend, an in-memory event
//! transport and filesystem, plus event fixtures.

use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use nostr::{
    event::{Event, EventBuilder, Kind, Tag, TagKind},
    filter::Filter,
    hashes::{Hash as _, sha1::Hash as Sha1Hash},
    key::{Keys, PublicKey},
};
use tokio::sync::Mutex;

use crate::{
    error::{Git34Error, Git34Result},
    io::{
        EventIO, Fs, PublishOutcome,
        git::{
            CloneOptions, CommitOptions, FetchOptions, FileState, GitBackend, PushOptions,
            Remote, ServerRef, StatusEntry,
        },
    },
};

/// A deterministic fake oid.
pub fn oid(n: u8) -> Sha1Hash {
    Sha1Hash::from_byte_array([n; 20])
}

/// Fresh random keys for signing fixtures.
pub fn keys() -> Keys {
    Keys::generate()
}

/// Signs a builder into a full event with the given keys and timestamp.
pub fn sign(builder: EventBuilder, keys: &Keys, created_at: u64) -> Event {
    builder
        .custom_created_at(created_at.into())
        .sign_with_keys(keys)
        .expect("signing a fixture never fails")
}

/// A minimal repo announcement event.
pub fn announcement_event(keys: &Keys, repo_id: &str, tags: Vec<Tag>, created_at: u64) -> Event {
    sign(
        EventBuilder::new(Kind::GitRepoAnnouncement, "")
            .tag(Tag::identifier(repo_id))
            .tags(tags),
        keys,
        created_at,
    )
}

/// A status event replying to `root` with the given kind.
pub fn status_event(keys: &Keys, kind: Kind, root: &Event, created_at: u64) -> Event {
    sign(
        EventBuilder::new(kind, "").tag(Tag::custom(TagKind::e(), [root.id.to_hex()])),
        keys,
        created_at,
    )
}

/// Scriptable in-memory git backend.
///
/// One logical repository regardless of `dir`; tests script refs,
/// histories, blobs and per-URL failures through the public fields.
#[derive(Default)]
pub struct MockGit {
    /// Ref name to commit.
    pub refs:          Mutex<HashMap<String, Sha1Hash>>,
    /// Tip to its ancestry (tip first).
    pub histories:     Mutex<HashMap<Sha1Hash, Vec<Sha1Hash>>>,
    /// `(commit, path)` to blob bytes.
    pub blobs:         Mutex<HashMap<(Sha1Hash, String), Vec<u8>>>,
    /// `(from, to)` to changed paths.
    pub changed:       Mutex<HashMap<(Sha1Hash, Sha1Hash), Vec<String>>>,
    /// `(from, to)` to diff text.
    pub diffs:         Mutex<HashMap<(Sha1Hash, Sha1Hash), String>>,
    pub branches:      Mutex<Vec<String>>,
    pub remotes:       Mutex<Vec<Remote>>,
    /// Probe answers per URL.
    pub server_refs:   Mutex<HashMap<String, Vec<ServerRef>>>,
    pub status:        Mutex<Vec<StatusEntry>>,
    /// URLs whose clone/push fails, with the error message.
    pub failing_urls:  Mutex<HashMap<String, String>>,
    /// Remotes whose push fails, with the error message.
    pub failing_remotes: Mutex<HashMap<String, String>>,
    /// Exact refspecs whose push fails, with the error message.
    pub failing_refspecs: Mutex<HashMap<String, String>>,
    /// When set, `add`/`remove` do not reflect into the status matrix.
    pub suppress_staging: Mutex<bool>,
    /// Every recorded push.
    pub pushes:        Mutex<Vec<PushOptions>>,
    /// Every recorded clone.
    pub clones:        Mutex<Vec<CloneOptions>>,
    /// Error message returned by every fetch, when set.
    pub fetch_error:   Mutex<Option<String>>,
}

impl MockGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_ref(&self, name: &str, commit: Sha1Hash) {
        self.refs.lock().await.insert(name.to_owned(), commit);
    }

    pub async fn set_history(&self, tip: Sha1Hash, ancestry: Vec<Sha1Hash>) {
        self.histories.lock().await.insert(tip, ancestry);
    }

    pub async fn set_blob(&self, commit: Sha1Hash, path: &str, content: &str) {
        self.blobs
            .lock()
            .await
            .insert((commit, path.to_owned()), content.as_bytes().to_vec());
    }
}

#[async_trait]
impl GitBackend for MockGit {
    async fn clone_repo(&self, opts: CloneOptions) -> Git34Result<()> {
        if let Some(message) = self.failing_urls.lock().await.get(&opts.url) {
            return Err(Git34Error::network(message.clone()));
        }
        self.clones.lock().await.push(opts);
        Ok(())
    }

    async fn fetch(&self, _opts: FetchOptions) -> Git34Result<()> {
        if let Some(message) = self.fetch_error.lock().await.clone() {
            return Err(Git34Error::network(message));
        }
        Ok(())
    }

    async fn push(&self, opts: PushOptions) -> Git34Result<()> {
        if let Some(url) = &opts.url
            && let Some(message) = self.failing_urls.lock().await.get(url)
        {
            return Err(Git34Error::network(message.clone()));
        }
        if let Some(message) = self.failing_remotes.lock().await.get(&opts.remote) {
            return Err(Git34Error::git(message.clone()));
        }
        {
            let failing = self.failing_refspecs.lock().await;
            for refspec in &opts.refspecs {
                if let Some(message) = failing.get(refspec) {
                    return Err(Git34Error::git(message.clone()));
                }
            }
        }
        self.pushes.lock().await.push(opts);
        Ok(())
    }

    async fn checkout(&self, _dir: &Path, _reference: &str) -> Git34Result<()> {
        Ok(())
    }

    async fn add(&self, _dir: &Path, paths: &[String]) -> Git34Result<()> {
        if !*self.suppress_staging.lock().await {
            let mut status = self.status.lock().await;
            status.extend(paths.iter().map(|path| StatusEntry {
                path:  path.clone(),
                state: FileState::Added,
            }));
        }
        Ok(())
    }

    async fn remove(&self, _dir: &Path, paths: &[String]) -> Git34Result<()> {
        if !*self.suppress_staging.lock().await {
            let mut status = self.status.lock().await;
            status.extend(paths.iter().map(|path| StatusEntry {
                path:  path.clone(),
                state: FileState::Deleted,
            }));
        }
        Ok(())
    }

    async fn commit(&self, _dir: &Path, _opts: CommitOptions) -> Git34Result<Sha1Hash> {
        Ok(oid(0xcc))
    }

    async fn resolve_ref(&self, _dir: &Path, reference: &str) -> Git34Result<Sha1Hash> {
        self.refs
            .lock()
            .await
            .get(reference)
            .copied()
            .ok_or_else(|| Git34Error::NotFound(format!("ref `{reference}`")))
    }

    async fn status_matrix(&self, _dir: &Path) -> Git34Result<Vec<StatusEntry>> {
        Ok(self.status.lock().await.clone())
    }

    async fn list_branches(&self, _dir: &Path) -> Git34Result<Vec<String>> {
        Ok(self.branches.lock().await.clone())
    }

    async fn list_remotes(&self, _dir: &Path) -> Git34Result<Vec<Remote>> {
        Ok(self.remotes.lock().await.clone())
    }

    async fn list_server_refs(&self, url: &str) -> Git34Result<Vec<ServerRef>> {
        self.server_refs
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| Git34Error::network(format!("no server at `{url}`")))
    }

    async fn update_branch(&self, _dir: &Path, name: &str, commit: &Sha1Hash) -> Git34Result<()> {
        self.refs.lock().await.insert(name.to_owned(), *commit);
        let mut branches = self.branches.lock().await;
        if !branches.iter().any(|branch| branch == name) {
            branches.push(name.to_owned());
        }
        Ok(())
    }

    async fn commit_history(
        &self,
        _dir: &Path,
        tip: &Sha1Hash,
        limit: usize,
    ) -> Git34Result<Vec<Sha1Hash>> {
        Ok(self
            .histories
            .lock()
            .await
            .get(tip)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn merge_base(
        &self,
        _dir: &Path,
        ours: &Sha1Hash,
        theirs: &Sha1Hash,
    ) -> Git34Result<Option<Sha1Hash>> {
        let histories = self.histories.lock().await;
        let our_history = histories.get(ours).cloned().unwrap_or_default();
        let their_history = histories.get(theirs).cloned().unwrap_or_default();
        Ok(our_history
            .into_iter()
            .find(|commit| their_history.contains(commit)))
    }

    async fn is_descendant(
        &self,
        _dir: &Path,
        ancestor: &Sha1Hash,
        descendant: &Sha1Hash,
    ) -> Git34Result<bool> {
        Ok(self
            .histories
            .lock()
            .await
            .get(descendant)
            .is_some_and(|history| history.contains(ancestor)))
    }

    async fn read_blob(
        &self,
        _dir: &Path,
        commit: &Sha1Hash,
        path: &str,
    ) -> Git34Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .lock()
            .await
            .get(&(*commit, path.to_owned()))
            .cloned())
    }

    async fn changed_paths(
        &self,
        _dir: &Path,
        from: &Sha1Hash,
        to: &Sha1Hash,
    ) -> Git34Result<Vec<String>> {
        Ok(self
            .changed
            .lock()
            .await
            .get(&(*from, *to))
            .cloned()
            .unwrap_or_default())
    }

    async fn diff_commits(
        &self,
        _dir: &Path,
        from: &Sha1Hash,
        to: &Sha1Hash,
    ) -> Git34Result<String> {
        Ok(self
            .diffs
            .lock()
            .await
            .get(&(*from, *to))
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory event transport answering every filter from a fixed event
/// list and recording what was published.
pub struct MockEventIO {
    pub keys:      Keys,
    pub events:    Mutex<Vec<Event>>,
    pub published: Mutex<Vec<EventBuilder>>,
}

impl MockEventIO {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            keys:      keys(),
            events:    Mutex::new(events),
            published: Mutex::new(Vec::new()),
        }
    }

    /// The kinds of everything published so far.
    pub async fn published_kinds(&self) -> Vec<Kind> {
        self.published
            .lock()
            .await
            .iter()
            .map(|builder| {
                builder
                    .clone()
                    .sign_with_keys(&self.keys)
                    .expect("fixture signing")
                    .kind
            })
            .collect()
    }

    /// Everything published so far, signed for inspection.
    pub async fn published_events(&self) -> Vec<Event> {
        self.published
            .lock()
            .await
            .iter()
            .map(|builder| {
                builder
                    .clone()
                    .sign_with_keys(&self.keys)
                    .expect("fixture signing")
            })
            .collect()
    }
}

#[async_trait]
impl EventIO for MockEventIO {
    async fn fetch_events(&self, filters: Vec<Filter>) -> Git34Result<Vec<Event>> {
        // Every fixture answers every filter; the callers under test do
        // their own kind filtering.
        let _ = filters;
        Ok(self.events.lock().await.clone())
    }

    async fn publish_event(&self, template: EventBuilder) -> Git34Result<PublishOutcome> {
        self.published.lock().await.push(template);
        Ok(PublishOutcome {
            ok: true,
            relays: Vec::new(),
            error: None,
        })
    }

    async fn current_pubkey(&self) -> Git34Result<PublicKey> {
        Ok(self.keys.public_key())
    }
}

/// In-memory filesystem keyed by absolute path.
#[derive(Default)]
pub struct MockFs {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: &str, content: &str) {
        self.files
            .lock()
            .await
            .insert(path.to_owned(), content.as_bytes().to_vec());
    }

    pub async fn contents(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .await
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl Fs for MockFs {
    async fn mkdir(&self, _path: &Path) -> Git34Result<()> {
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Git34Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(&path.display().to_string())
            .cloned()
            .ok_or_else(|| Git34Error::NotFound(path.display().to_string()))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Git34Result<()> {
        self.files
            .lock()
            .await
            .insert(path.display().to_string(), contents.to_vec());
        Ok(())
    }

    async fn unlink(&self, path: &Path) -> Git34Result<()> {
        self.files
            .lock()
            .await
            .remove(&path.display().to_string());
        Ok(())
    }
}
