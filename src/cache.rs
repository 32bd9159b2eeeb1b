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

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::{Git34Error, Git34Result},
    merge::MergeAnalysisResult,
};

/// Current on-disk schema version. Upgrades are additive only; older
/// files keep their entries.
const SCHEMA_VERSION: u32 = 1;

/// Local materialization tier of a repository, in increasing order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataLevel {
    /// Refs and minimal objects only.
    Refs,
    /// Depth-1 working tree.
    Shallow,
    /// Deep history.
    Full,
}

/// Milliseconds since the unix epoch, the `last_updated` clock.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One cached repository snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RepoSnapshot {
    pub repo_id:      String,
    pub data_level:   DataLevel,
    pub head_commit:  Option<String>,
    pub branches:     Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags:         Option<Vec<String>>,
    pub clone_urls:   Vec<String>,
    pub last_updated: i64,
}

/// Cached commit history of one branch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CommitHistory {
    pub commits:      Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count:  Option<u64>,
    pub depth:        u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_commit:  Option<String>,
    pub last_updated: i64,
}

/// Cached merge analysis of one patch against one target branch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MergeAnalysisRecord {
    pub result:       MergeAnalysisResult,
    pub last_updated: i64,
}

/// Composite key of the commits table.
pub fn commits_key(repo_id: &str, branch: &str) -> String {
    format!("{repo_id}:{branch}")
}

/// Composite key of the merge-analysis table.
pub fn merge_analysis_key(repo_id: &str, patch_id: &str, target_branch: &str) -> String {
    format!("{repo_id}::{patch_id}::{target_branch}")
}

/// Durable store for repo snapshots, commit histories and merge-analysis
/// results.
///
/// This is the only component holding durable state; everything else is
/// deterministic from inputs plus the event stream. Implementations
/// serialize per-key writes; all operations propagate backend failure.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_repo(&self, repo_id: &str) -> Git34Result<Option<RepoSnapshot>>;
    async fn put_repo(&self, snapshot: RepoSnapshot) -> Git34Result<()>;
    async fn delete_repo(&self, repo_id: &str) -> Git34Result<()>;

    async fn get_commits(&self, repo_id: &str, branch: &str)
    -> Git34Result<Option<CommitHistory>>;
    async fn put_commits(
        &self,
        repo_id: &str,
        branch: &str,
        history: CommitHistory,
    ) -> Git34Result<()>;
    async fn delete_commits(&self, repo_id: &str, branch: &str) -> Git34Result<()>;

    async fn get_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
    ) -> Git34Result<Option<MergeAnalysisRecord>>;
    async fn put_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
        record: MergeAnalysisRecord,
    ) -> Git34Result<()>;
    async fn delete_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
    ) -> Git34Result<()>;

    /// Sweeps every table, dropping entries whose `last_updated` is older
    /// than `max_age`. Returns the number of evicted entries.
    async fn clear_old_cache(&self, max_age: Duration) -> Git34Result<u64>;
}

/// The three tables.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Tables {
    #[serde(default)]
    repos:          BTreeMap<String, RepoSnapshot>,
    #[serde(default)]
    commits:        BTreeMap<String, CommitHistory>,
    #[serde(default)]
    merge_analysis: BTreeMap<String, MergeAnalysisRecord>,
}

impl Tables {
    /// Age-sweeps all three tables.
    fn evict_older_than(&mut self, cutoff: i64) -> u64 {
        let repos = self.repos.len();
        let commits = self.commits.len();
        let merges = self.merge_analysis.len();

        self.repos.retain(|_, entry| entry.last_updated >= cutoff);
        self.commits.retain(|_, entry| entry.last_updated >= cutoff);
        self.merge_analysis
            .retain(|_, entry| entry.last_updated >= cutoff);

        ((repos - self.repos.len())
            + (commits - self.commits.len())
            + (merges - self.merge_analysis.len())) as u64
    }
}

/// In-memory cache store, also the unit-test double.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    tables: Mutex<Tables>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_repo(&self, repo_id: &str) -> Git34Result<Option<RepoSnapshot>> {
        Ok(self.tables.lock().await.repos.get(repo_id).cloned())
    }

    async fn put_repo(&self, snapshot: RepoSnapshot) -> Git34Result<()> {
        self.tables
            .lock()
            .await
            .repos
            .insert(snapshot.repo_id.clone(), snapshot);
        Ok(())
    }

    async fn delete_repo(&self, repo_id: &str) -> Git34Result<()> {
        self.tables.lock().await.repos.remove(repo_id);
        Ok(())
    }

    async fn get_commits(
        &self,
        repo_id: &str,
        branch: &str,
    ) -> Git34Result<Option<CommitHistory>> {
        Ok(self
            .tables
            .lock()
            .await
            .commits
            .get(&commits_key(repo_id, branch))
            .cloned())
    }

    async fn put_commits(
        &self,
        repo_id: &str,
        branch: &str,
        history: CommitHistory,
    ) -> Git34Result<()> {
        self.tables
            .lock()
            .await
            .commits
            .insert(commits_key(repo_id, branch), history);
        Ok(())
    }

    async fn delete_commits(&self, repo_id: &str, branch: &str) -> Git34Result<()> {
        self.tables
            .lock()
            .await
            .commits
            .remove(&commits_key(repo_id, branch));
        Ok(())
    }

    async fn get_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
    ) -> Git34Result<Option<MergeAnalysisRecord>> {
        Ok(self
            .tables
            .lock()
            .await
            .merge_analysis
            .get(&merge_analysis_key(repo_id, patch_id, target_branch))
            .cloned())
    }

    async fn put_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
        record: MergeAnalysisRecord,
    ) -> Git34Result<()> {
        self.tables
            .lock()
            .await
            .merge_analysis
            .insert(merge_analysis_key(repo_id, patch_id, target_branch), record);
        Ok(())
    }

    async fn delete_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
    ) -> Git34Result<()> {
        self.tables
            .lock()
            .await
            .merge_analysis
            .remove(&merge_analysis_key(repo_id, patch_id, target_branch));
        Ok(())
    }

    async fn clear_old_cache(&self, max_age: Duration) -> Git34Result<u64> {
        let cutoff = now_ms() - max_age.as_millis() as i64;
        Ok(self.tables.lock().await.evict_older_than(cutoff))
    }
}

/// The on-disk envelope: a schema version plus the tables. Unknown
/// top-level fields written by newer versions round-trip untouched.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CacheFile {
    schema_version: u32,
    #[serde(default)]
    tables:         Tables,
    #[serde(flatten)]
    extra:          BTreeMap<String, serde_json::Value>,
}

/// JSON-file-backed cache store.
///
/// One file holds all three tables; writes go through a mutex so per-key
/// updates serialize. The schema is versioned and migrations are
/// additive: entries written by an older version are kept as-is.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCacheStore {
    /// Opens (or will create on first write) the cache file at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// The default cache file under the user cache directory.
    pub fn default_path() -> Git34Result<PathBuf> {
        Ok(crate::config::Config::default_cache_dir()?.join("cache.json"))
    }

    async fn load(&self) -> Git34Result<CacheFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes)
                    .map_err(|err| Git34Error::Cache(format!("Corrupt cache file: {err}")))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(CacheFile {
                    schema_version: SCHEMA_VERSION,
                    tables:         Tables::default(),
                    extra:          BTreeMap::new(),
                })
            }
            Err(err) => Err(Git34Error::Cache(format!("Cannot read cache file: {err}"))),
        }
    }

    async fn save(&self, mut file: CacheFile) -> Git34Result<()> {
        // Additive migration: never lower the recorded version.
        file.schema_version = file.schema_version.max(SCHEMA_VERSION);
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|err| Git34Error::Cache(format!("Cannot serialize cache: {err}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| Git34Error::Cache(format!("Cannot create cache dir: {err}")))?;
        }
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|err| Git34Error::Cache(format!("Cannot write cache file: {err}")))
    }

    /// Loads, mutates and saves under the write lock.
    async fn update<T>(
        &self,
        mutate: impl FnOnce(&mut Tables) -> T + Send,
    ) -> Git34Result<T> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let output = mutate(&mut file.tables);
        self.save(file).await?;
        Ok(output)
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get_repo(&self, repo_id: &str) -> Git34Result<Option<RepoSnapshot>> {
        Ok(self.load().await?.tables.repos.get(repo_id).cloned())
    }

    async fn put_repo(&self, snapshot: RepoSnapshot) -> Git34Result<()> {
        self.update(|tables| {
            tables.repos.insert(snapshot.repo_id.clone(), snapshot);
        })
        .await
    }

    async fn delete_repo(&self, repo_id: &str) -> Git34Result<()> {
        self.update(|tables| {
            tables.repos.remove(repo_id);
        })
        .await
    }

    async fn get_commits(
        &self,
        repo_id: &str,
        branch: &str,
    ) -> Git34Result<Option<CommitHistory>> {
        Ok(self
            .load()
            .await?
            .tables
            .commits
            .get(&commits_key(repo_id, branch))
            .cloned())
    }

    async fn put_commits(
        &self,
        repo_id: &str,
        branch: &str,
        history: CommitHistory,
    ) -> Git34Result<()> {
        let key = commits_key(repo_id, branch);
        self.update(move |tables| {
            tables.commits.insert(key, history);
        })
        .await
    }

    async fn delete_commits(&self, repo_id: &str, branch: &str) -> Git34Result<()> {
        let key = commits_key(repo_id, branch);
        self.update(move |tables| {
            tables.commits.remove(&key);
        })
        .await
    }

    async fn get_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
    ) -> Git34Result<Option<MergeAnalysisRecord>> {
        Ok(self
            .load()
            .await?
            .tables
            .merge_analysis
            .get(&merge_analysis_key(repo_id, patch_id, target_branch))
            .cloned())
    }

    async fn put_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
        record: MergeAnalysisRecord,
    ) -> Git34Result<()> {
        let key = merge_analysis_key(repo_id, patch_id, target_branch);
        self.update(move |tables| {
            tables.merge_analysis.insert(key, record);
        })
        .await
    }

    async fn delete_merge_analysis(
        &self,
        repo_id: &str,
        patch_id: &str,
        target_branch: &str,
    ) -> Git34Result<()> {
        let key = merge_analysis_key(repo_id, patch_id, target_branch);
        self.update(move |tables| {
            tables.merge_analysis.remove(&key);
        })
        .await
    }

    async fn clear_old_cache(&self, max_age: Duration) -> Git34Result<u64> {
        let cutoff = now_ms() - max_age.as_millis() as i64;
        self.update(move |tables| tables.evict_older_than(cutoff))
            .await
    }
}
