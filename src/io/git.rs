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

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nostr::hashes::sha1::Hash as Sha1Hash;

use crate::error::Git34Result;

/// Options for cloning a repository.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Target working directory.
    pub dir:   PathBuf,
    /// Clone URL.
    pub url:   String,
    /// Shallow depth, `None` for a full clone.
    pub depth: Option<u32>,
}

/// Options for fetching from a remote.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Working directory.
    pub dir:       PathBuf,
    /// Remote name, defaults to `origin` when unset.
    pub remote:    Option<String>,
    /// Explicit URL overriding the remote's configured one.
    pub url:       Option<String>,
    /// Single ref to fetch, all configured refs when unset.
    pub reference: Option<String>,
    /// Shallow depth for the fetch.
    pub depth:     Option<u32>,
}

/// Options for pushing refspecs to a remote.
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Working directory.
    pub dir:      PathBuf,
    /// Remote name.
    pub remote:   String,
    /// Explicit URL overriding the remote's configured one.
    pub url:      Option<String>,
    /// Refspecs to push.
    pub refspecs: Vec<String>,
    /// Whether to force-push.
    pub force:    bool,
}

/// Commit author identity and message.
#[derive(Debug, Clone)]
pub struct CommitOptions {
    /// Commit message.
    pub message:      String,
    /// Author and committer name.
    pub author_name:  String,
    /// Author and committer email.
    pub author_email: String,
}

/// Combined state of one path relative to `HEAD` and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unmodified,
    Modified,
    Added,
    Deleted,
}

/// One row of the working-tree status matrix.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    /// Path relative to the repository root.
    pub path:  String,
    /// State of the path.
    pub state: FileState,
}

/// A configured remote.
#[derive(Debug, Clone)]
pub struct Remote {
    /// Remote name, e.g. `origin`.
    pub name: String,
    /// Configured URL, when one is set.
    pub url:  Option<String>,
}

/// A ref advertised by a git server.
#[derive(Debug, Clone)]
pub struct ServerRef {
    /// Full ref name, e.g. `refs/heads/main`.
    pub name: String,
    /// Commit the ref points at.
    pub oid:  Sha1Hash,
}

/// Embedded git collaborator.
///
/// Implementations may wrap a pure-Rust library, libgit2, or a
/// Smart-HTTP adapter; the contract is only the capability names and
/// shapes. Every call is async and may suspend; errors should carry the
/// backend's error code when one exists (see [`crate::Git34Error::Git`]).
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Clones `url` into `dir`.
    async fn clone_repo(&self, opts: CloneOptions) -> Git34Result<()>;

    /// Fetches refs from a remote.
    async fn fetch(&self, opts: FetchOptions) -> Git34Result<()>;

    /// Pushes refspecs to a remote.
    async fn push(&self, opts: PushOptions) -> Git34Result<()>;

    /// Checks out a branch or ref into the working tree.
    async fn checkout(&self, dir: &Path, reference: &str) -> Git34Result<()>;

    /// Stages the given paths.
    async fn add(&self, dir: &Path, paths: &[String]) -> Git34Result<()>;

    /// Stages removal of the given paths.
    async fn remove(&self, dir: &Path, paths: &[String]) -> Git34Result<()>;

    /// Commits the staged changes, returning the new commit id.
    async fn commit(&self, dir: &Path, opts: CommitOptions) -> Git34Result<Sha1Hash>;

    /// Resolves a ref name (`HEAD`, branch, tag, full ref) to a commit id.
    async fn resolve_ref(&self, dir: &Path, reference: &str) -> Git34Result<Sha1Hash>;

    /// The working-tree status matrix.
    async fn status_matrix(&self, dir: &Path) -> Git34Result<Vec<StatusEntry>>;

    /// Local branch names.
    async fn list_branches(&self, dir: &Path) -> Git34Result<Vec<String>>;

    /// Configured remotes.
    async fn list_remotes(&self, dir: &Path) -> Git34Result<Vec<Remote>>;

    /// Refs advertised by the server at `url`, without cloning.
    async fn list_server_refs(&self, url: &str) -> Git34Result<Vec<ServerRef>>;

    /// Creates the branch at `oid`, or moves it there if it exists.
    async fn update_branch(&self, dir: &Path, name: &str, oid: &Sha1Hash) -> Git34Result<()>;

    /// Commit ids reachable from `tip`, newest first, capped at `limit`.
    async fn commit_history(
        &self,
        dir: &Path,
        tip: &Sha1Hash,
        limit: usize,
    ) -> Git34Result<Vec<Sha1Hash>>;

    /// Best common ancestor of two commits, when one exists.
    async fn merge_base(
        &self,
        dir: &Path,
        ours: &Sha1Hash,
        theirs: &Sha1Hash,
    ) -> Git34Result<Option<Sha1Hash>>;

    /// Whether `descendant` has `ancestor` in its history.
    async fn is_descendant(
        &self,
        dir: &Path,
        ancestor: &Sha1Hash,
        descendant: &Sha1Hash,
    ) -> Git34Result<bool>;

    /// Reads the blob at `path` in the tree of `commit`. `None` when the
    /// path does not exist in that tree.
    async fn read_blob(
        &self,
        dir: &Path,
        commit: &Sha1Hash,
        path: &str,
    ) -> Git34Result<Option<Vec<u8>>>;

    /// Paths whose blobs differ between the trees of two commits.
    async fn changed_paths(
        &self,
        dir: &Path,
        from: &Sha1Hash,
        to: &Sha1Hash,
    ) -> Git34Result<Vec<String>>;

    /// Unified diff between the trees of two commits.
    async fn diff_commits(
        &self,
        dir: &Path,
        from: &Sha1Hash,
        to: &Sha1Hash,
    ) -> Git34Result<String>;
}
