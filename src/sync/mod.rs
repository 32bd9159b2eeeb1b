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

#[cfg(test)]
mod tests;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::sync::Mutex;

use crate::{
    cache::{CacheStore, DataLevel, RepoSnapshot, now_ms},
    config::{DEFAULT_CLONE_TIMEOUT, DEFAULT_FETCH_TIMEOUT},
    error::{Git34Error, Git34Result},
    fallback::UrlPreferenceStore,
    io::{
        Progress, ProgressSink,
        cancel::{CancelHandle, with_timeout},
        git::{CloneOptions, FetchOptions, GitBackend},
    },
};

/// Branch names tried when none is requested, in order.
const BRANCH_CANDIDATES: [&str; 4] = ["main", "master", "develop", "dev"];

/// Depth cap for full-clone deepening fetches.
const MAX_FULL_CLONE_DEPTH: u32 = 100;

/// The outcome of a sync-engine operation that tolerates transient
/// failures.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub success:    bool,
    /// The operation was answered from the cache without touching the
    /// network.
    pub from_cache: bool,
    /// Remote refs were actually reconciled.
    pub synced:     bool,
    /// A CORS-class transport failure was detected.
    pub cors_error: bool,
    pub warning:    Option<String>,
    pub error:      Option<String>,
    /// URLs tried before giving up or succeeding.
    pub attempts:   usize,
    pub snapshot:   Option<RepoSnapshot>,
}

impl SyncOutcome {
    fn ok(snapshot: RepoSnapshot) -> Self {
        Self {
            success: true,
            snapshot: Some(snapshot),
            ..Self::default()
        }
    }
}

/// Options for [`SyncEngine::smart_initialize`].
#[derive(Debug, Clone, Default)]
pub struct InitializeOptions {
    pub repo_id:      String,
    pub clone_urls:   Vec<String>,
    /// Re-initialize even when a cache entry exists.
    pub force_update: bool,
}

/// Tiered repository materialization and reconciliation.
///
/// Repositories progress `Absent → Refs → Shallow → Full`; transitions
/// are idempotent and never downgrade a tier. At most one clone/fetch
/// runs per repository key; concurrent callers wait and are answered
/// from the cache.
pub struct SyncEngine {
    backend:   Arc<dyn GitBackend>,
    cache:     Arc<dyn CacheStore>,
    prefs:     Arc<UrlPreferenceStore>,
    /// Root directory holding one working directory per repository.
    root:      PathBuf,
    /// Freshness window for [`SyncEngine::needs_update`].
    state_ttl: Duration,
    progress:  Option<Arc<ProgressSink>>,
    inflight:  Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(
        backend: Arc<dyn GitBackend>,
        cache: Arc<dyn CacheStore>,
        prefs: Arc<UrlPreferenceStore>,
        root: PathBuf,
        state_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            cache,
            prefs,
            root,
            state_ttl,
            progress: None,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a progress callback channel.
    pub fn with_progress(mut self, progress: Arc<ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The working directory of a repository.
    pub fn repo_dir(&self, repo_id: &str) -> PathBuf {
        // Keys may contain `/` (npub/name); keep the tree flat.
        self.root.join(repo_id.replace('/', "_"))
    }

    fn report(&self, phase: &str, loaded: u64) {
        if let Some(progress) = &self.progress {
            progress(Progress {
                phase: phase.to_owned(),
                loaded,
                total: None,
            });
        }
    }

    /// A fetch with the default fetch deadline applied.
    async fn fetch_with_timeout(&self, opts: FetchOptions) -> Git34Result<()> {
        with_timeout("fetch", DEFAULT_FETCH_TIMEOUT, self.backend.fetch(opts)).await
    }

    /// The per-repository in-flight guard; serializes clone/fetch work
    /// for one canonical key.
    async fn build_lock(&self, repo_id: &str) -> Arc<Mutex<()>> {
        self.inflight
            .lock()
            .await
            .entry(repo_id.to_owned())
            .or_default()
            .clone()
    }

    /// Materializes a repository at the `refs` tier, preferring cached
    /// state.
    ///
    /// Existing cache entries short-circuit unless `force_update` is set.
    /// An existing working directory is refreshed with a fetch, where a
    /// CORS-class failure degrades to a warning. Initial cloning walks
    /// the candidate URLs in order; the first success mints the cache
    /// entry and records the URL preference.
    pub async fn smart_initialize(
        &self,
        options: InitializeOptions,
        cancel: Option<&CancelHandle>,
    ) -> Git34Result<SyncOutcome> {
        let lock = self.build_lock(&options.repo_id).await;
        let _guard = lock.lock().await;

        if let Some(snapshot) = self.cache.get_repo(&options.repo_id).await?
            && !options.force_update
        {
            let mut outcome = SyncOutcome::ok(snapshot);
            outcome.from_cache = true;
            return Ok(outcome);
        }

        let dir = self.repo_dir(&options.repo_id);

        // An existing working directory only needs a refresh.
        if self.backend.resolve_ref(&dir, "HEAD").await.is_ok() {
            match self.fetch_with_timeout(FetchOptions {
                dir: dir.clone(),
                ..FetchOptions::default()
            })
            .await
            {
                Ok(()) => {
                    let snapshot = self
                        .mint_snapshot(&options.repo_id, &dir, DataLevel::Refs, &options.clone_urls)
                        .await?;
                    return Ok(SyncOutcome::ok(snapshot));
                }
                Err(err) if err.is_cors() => {
                    tracing::warn!(repo = %options.repo_id, %err, "Fetch blocked by CORS, keeping local state");
                    let snapshot = self
                        .mint_snapshot(&options.repo_id, &dir, DataLevel::Refs, &options.clone_urls)
                        .await?;
                    let mut outcome = SyncOutcome::ok(snapshot);
                    outcome.warning = Some(err.to_string());
                    outcome.cors_error = true;
                    return Ok(outcome);
                }
                Err(err) => {
                    // Any other fetch error falls through to a fresh
                    // initialization below.
                    tracing::debug!(repo = %options.repo_id, %err, "Refresh fetch failed, re-initializing");
                }
            }
        }

        self.initialize(&options, &dir, cancel).await
    }

    /// Walks candidate URLs, cloning at depth 1.
    async fn initialize(
        &self,
        options: &InitializeOptions,
        dir: &Path,
        cancel: Option<&CancelHandle>,
    ) -> Git34Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        let mut last_error: Option<Git34Error> = None;
        let mut saw_cors = false;

        for url in &options.clone_urls {
            if let Some(cancel) = cancel {
                cancel.checkpoint()?;
            }
            outcome.attempts += 1;
            self.report("clone", outcome.attempts as u64);

            let clone = with_timeout(
                "clone",
                DEFAULT_CLONE_TIMEOUT,
                self.backend.clone_repo(CloneOptions {
                    dir:   dir.to_path_buf(),
                    url:   url.clone(),
                    depth: Some(1),
                }),
            )
            .await;
            match clone {
                Ok(()) => {
                    self.prefs.record_success(&options.repo_id, url).await;
                    let snapshot = self
                        .mint_snapshot(&options.repo_id, dir, DataLevel::Refs, &options.clone_urls)
                        .await?;
                    outcome.success = true;
                    outcome.snapshot = Some(snapshot);
                    return Ok(outcome);
                }
                Err(err) => {
                    tracing::warn!(repo = %options.repo_id, url, %err, "Clone attempt failed");
                    self.prefs.record_failure(&options.repo_id, url).await;
                    saw_cors = saw_cors || err.is_cors();
                    last_error = Some(err);
                }
            }
        }

        outcome.cors_error = saw_cors;
        outcome.error = Some(match last_error {
            Some(err) if saw_cors => err.to_string(),
            Some(err) => format!("{err} ({} URL(s) tried)", outcome.attempts),
            None => "No clone URLs provided".to_owned(),
        });
        Ok(outcome)
    }

    /// Reads the working directory into a cache snapshot at (at least)
    /// the given tier and stores it. Never downgrades a previously
    /// recorded tier.
    async fn mint_snapshot(
        &self,
        repo_id: &str,
        dir: &Path,
        tier: DataLevel,
        clone_urls: &[String],
    ) -> Git34Result<RepoSnapshot> {
        let previous = self.cache.get_repo(repo_id).await?;
        let data_level = previous
            .as_ref()
            .map(|snapshot| snapshot.data_level.max(tier))
            .unwrap_or(tier);

        let head_commit = self
            .backend
            .resolve_ref(dir, "HEAD")
            .await
            .ok()
            .map(|oid| oid.to_string());
        let branches = self.backend.list_branches(dir).await.unwrap_or_default();

        let snapshot = RepoSnapshot {
            repo_id: repo_id.to_owned(),
            data_level,
            head_commit,
            branches,
            tags: previous.as_ref().and_then(|snapshot| snapshot.tags.clone()),
            clone_urls: if clone_urls.is_empty() {
                previous
                    .map(|snapshot| snapshot.clone_urls)
                    .unwrap_or_default()
            } else {
                clone_urls.to_vec()
            },
            last_updated: now_ms(),
        };
        self.cache.put_repo(snapshot.clone()).await?;
        Ok(snapshot)
    }

    /// Ensures a depth-1 working tree of the given branch. Requires the
    /// repository to be at least at the `refs` tier.
    pub async fn ensure_shallow(&self, repo_id: &str, branch: Option<&str>) -> Git34Result<SyncOutcome> {
        let snapshot = self.require_initialized(repo_id).await?;
        let lock = self.build_lock(repo_id).await;
        let _guard = lock.lock().await;

        let dir = self.repo_dir(repo_id);
        let branch = resolve_branch(self.backend.as_ref(), &dir, branch, true).await?;
        self.report("fetch", 0);

        self.fetch_with_timeout(FetchOptions {
            dir:       dir.clone(),
            reference: Some(branch.clone()),
            depth:     Some(1),
            ..FetchOptions::default()
        })
        .await?;
        self.backend.checkout(&dir, &branch).await?;

        let snapshot = self
            .mint_snapshot(repo_id, &dir, DataLevel::Shallow, &snapshot.clone_urls)
            .await?;
        Ok(SyncOutcome::ok(snapshot))
    }

    /// Deepens the clone to full history (capped depth). Requires the
    /// repository to be at least at the `refs` tier and an `origin`
    /// remote with a URL.
    pub async fn ensure_full_clone(
        &self,
        repo_id: &str,
        branch: Option<&str>,
        depth: Option<u32>,
    ) -> Git34Result<SyncOutcome> {
        let snapshot = self.require_initialized(repo_id).await?;
        let lock = self.build_lock(repo_id).await;
        let _guard = lock.lock().await;

        let dir = self.repo_dir(repo_id);
        let origin_url = self
            .backend
            .list_remotes(&dir)
            .await?
            .into_iter()
            .find(|remote| remote.name == "origin")
            .and_then(|remote| remote.url)
            .ok_or_else(|| Git34Error::git("Remote `origin` has no URL"))?;

        let depth = depth.unwrap_or(MAX_FULL_CLONE_DEPTH).min(MAX_FULL_CLONE_DEPTH);
        let branch = resolve_branch(self.backend.as_ref(), &dir, branch, true).await?;
        self.report("fetch", 0);

        self.fetch_with_timeout(FetchOptions {
            dir:       dir.clone(),
            url:       Some(origin_url),
            reference: Some(branch),
            depth:     Some(depth),
            ..FetchOptions::default()
        })
        .await?;

        let snapshot = self
            .mint_snapshot(repo_id, &dir, DataLevel::Full, &snapshot.clone_urls)
            .await?;
        Ok(SyncOutcome::ok(snapshot))
    }

    /// Reconciles the local working directory with the remote.
    ///
    /// CORS-class fetch failures are reported as warnings with
    /// `synced = false`; local branch update failures are logged but not
    /// fatal. The cache entry keeps its previous tier.
    pub async fn sync_with_remote(
        &self,
        repo_id: &str,
        clone_urls: &[String],
        branch: Option<&str>,
    ) -> Git34Result<SyncOutcome> {
        let initialized = self
            .smart_initialize(
                InitializeOptions {
                    repo_id:      repo_id.to_owned(),
                    clone_urls:   clone_urls.to_vec(),
                    force_update: false,
                },
                None,
            )
            .await?;
        if !initialized.success {
            return Ok(initialized);
        }

        let dir = self.repo_dir(repo_id);
        let branch = resolve_branch(self.backend.as_ref(), &dir, branch, true).await?;

        if let Err(err) = self
            .fetch_with_timeout(FetchOptions {
                dir: dir.clone(),
                ..FetchOptions::default()
            })
            .await
        {
            if err.is_cors() {
                let mut outcome = SyncOutcome::ok(
                    self.cache
                        .get_repo(repo_id)
                        .await?
                        .expect("initialized above"),
                );
                outcome.warning = Some(err.to_string());
                outcome.cors_error = true;
                return Ok(outcome);
            }
            return Err(err);
        }

        // The remote tracking ref, falling back to HEAD.
        let tracking = format!("refs/remotes/origin/{branch}");
        let remote_commit = match self.backend.resolve_ref(&dir, &tracking).await {
            Ok(oid) => oid,
            Err(_) => self.backend.resolve_ref(&dir, "HEAD").await?,
        };

        let local_commit = self.backend.resolve_ref(&dir, &branch).await.ok();
        if local_commit != Some(remote_commit)
            && let Err(err) = self
                .backend
                .update_branch(&dir, &branch, &remote_commit)
                .await
        {
            tracing::warn!(repo = %repo_id, branch, %err, "Local branch update failed");
        }

        let snapshot = self
            .mint_snapshot(repo_id, &dir, DataLevel::Refs, clone_urls)
            .await?;
        let mut outcome = SyncOutcome::ok(snapshot);
        outcome.synced = local_commit != Some(remote_commit);
        Ok(outcome)
    }

    /// Whether the local copy is stale relative to the git server.
    ///
    /// No cache plus an empty remote allows the initial push; no cache
    /// plus existing remote refs means an update. Beyond the freshness
    /// window the answer is always yes; otherwise the main/master head is
    /// compared against the cached head. A failed network probe defaults
    /// to `false`.
    pub async fn needs_update(&self, repo_id: &str, probe_url: &str) -> bool {
        let snapshot = match self.cache.get_repo(repo_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(repo = %repo_id, %err, "Cache read failed in needs_update");
                None
            }
        };

        let server_refs = match self.backend.list_server_refs(probe_url).await {
            Ok(refs) => refs,
            Err(err) => {
                tracing::debug!(repo = %repo_id, %err, "Server ref probe failed");
                return false;
            }
        };

        let Some(snapshot) = snapshot else {
            // No cache: only a remote with refs requires an update; an
            // empty remote is a fresh repository awaiting its first push.
            return !server_refs.is_empty();
        };

        let age = now_ms() - snapshot.last_updated;
        if age > self.state_ttl.as_millis() as i64 {
            return true;
        }

        let remote_head = server_refs
            .iter()
            .find(|server_ref| server_ref.name == "refs/heads/main")
            .or_else(|| {
                server_refs
                    .iter()
                    .find(|server_ref| server_ref.name == "refs/heads/master")
            })
            .map(|server_ref| server_ref.oid.to_string());

        match (remote_head, snapshot.head_commit) {
            (Some(remote), Some(local)) => remote != local,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// The cache snapshot, requiring at least the `refs` tier.
    async fn require_initialized(&self, repo_id: &str) -> Git34Result<RepoSnapshot> {
        self.cache
            .get_repo(repo_id)
            .await?
            .ok_or_else(|| Git34Error::NotFound(format!("Repository `{repo_id}` is not cloned")))
    }
}

/// Resolves the branch to operate on.
///
/// Tries the requested name, then `main`, `master`, `develop`, `dev`.
/// When nothing resolves locally: in strict mode a requested name is
/// returned as-is so the caller can fetch it and create the local branch
/// from `refs/remotes/origin/<name>` (freshly fetched tracking refs have
/// no local branch yet); otherwise the first local branch wins, and an
/// empty repository is an error.
pub async fn resolve_branch(
    backend: &dyn GitBackend,
    dir: &Path,
    requested: Option<&str>,
    strict: bool,
) -> Git34Result<String> {
    let mut candidates: Vec<&str> = Vec::with_capacity(1 + BRANCH_CANDIDATES.len());
    if let Some(requested) = requested {
        candidates.push(requested);
    }
    candidates.extend(BRANCH_CANDIDATES);

    for candidate in candidates {
        if backend.resolve_ref(dir, candidate).await.is_ok() {
            return Ok(candidate.to_owned());
        }
    }

    if strict && let Some(requested) = requested {
        return Ok(requested.to_owned());
    }

    backend
        .list_branches(dir)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Git34Error::NotFound("No branches found".to_owned()))
}
