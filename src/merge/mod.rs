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

/// Apply a patch to the working tree and push it.
pub mod apply;
/// Unified diff parsing and hunk replay.
pub mod diff;
/// Merge/conflict metadata event builders.
pub mod events;

use std::path::Path;

use nostr::hashes::sha1::Hash as Sha1Hash;

use self::diff::{FileDiff, apply_hunks, is_unified_diff, parse_unified_diff};
use crate::{
    events::patch::Patch,
    io::{cancel::CancelHandle, git::GitBackend},
};

/// How far back the target history is searched for already-applied patch
/// commits.
const HISTORY_PROBE_LIMIT: usize = 1000;

/// Outcome classification of a merge analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeAnalysis {
    Clean,
    Conflicts,
    UpToDate,
    Diverged,
    Error,
}

/// The full result of analyzing a patch against a target branch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MergeAnalysisResult {
    pub analysis:       MergeAnalysis,
    pub can_merge:      bool,
    pub fast_forward:   bool,
    pub up_to_date:     bool,
    pub has_conflicts:  bool,
    pub conflict_files: Vec<String>,
    pub target_branch:  String,
    /// Tip of the target branch at analysis time.
    pub target_commit:  Option<String>,
    pub merge_base:     Option<String>,
    pub patch_commits:  Vec<String>,
    pub error:          Option<String>,
}

impl MergeAnalysisResult {
    fn base(target_branch: &str) -> Self {
        Self {
            analysis:       MergeAnalysis::Clean,
            can_merge:      false,
            fast_forward:   false,
            up_to_date:     false,
            has_conflicts:  false,
            conflict_files: Vec::new(),
            target_branch:  target_branch.to_owned(),
            target_commit:  None,
            merge_base:     None,
            patch_commits:  Vec::new(),
            error:          None,
        }
    }

    fn error(target_branch: &str, message: impl Into<String>) -> Self {
        Self {
            analysis: MergeAnalysis::Error,
            error: Some(message.into()),
            ..Self::base(target_branch)
        }
    }

    /// The tag value for the `result` tag of a metadata event.
    pub fn result_tag(&self) -> &'static str {
        if self.fast_forward {
            return "ff";
        }
        match self.analysis {
            MergeAnalysis::Clean => "clean",
            MergeAnalysis::Conflicts => "conflicts",
            MergeAnalysis::UpToDate => "up-to-date",
            MergeAnalysis::Diverged => "diverged",
            MergeAnalysis::Error => "error",
        }
    }
}

/// Analyzes whether (and how) a patch merges into a target branch.
///
/// The classification order is fixed: invalid content, already applied,
/// diverged target, fast-forward, per-file conflicts, clean. Requires the
/// relevant commits to be present locally; callers ensure a sufficient
/// clone first.
pub async fn analyze_merge(
    backend: &dyn GitBackend,
    dir: &Path,
    patch: &Patch,
    target_branch: Option<&str>,
    cancel: Option<&CancelHandle>,
) -> MergeAnalysisResult {
    // Target selection: explicit argument, then the patch's base branch,
    // then the usual branch candidates.
    let target = match target_branch.map(ToOwned::to_owned) {
        Some(target) => target,
        None => {
            match patch.base_branch() {
                Some(base) => base.to_owned(),
                None => {
                    match crate::sync::resolve_branch(backend, dir, None, false).await {
                        Ok(branch) => branch,
                        Err(err) => {
                            return MergeAnalysisResult::error("", err.to_string());
                        }
                    }
                }
            }
        }
    };

    let mut result = MergeAnalysisResult::base(&target);
    result.patch_commits = patch.commits.iter().map(Sha1Hash::to_string).collect();
    result.merge_base = patch.merge_base.map(|oid| oid.to_string());

    // 1. Invalid patch content.
    if patch.content.trim().is_empty() || !is_unified_diff(&patch.content) {
        return MergeAnalysisResult::error(&target, "Patch content is not a unified diff");
    }
    let files = match parse_unified_diff(&patch.content) {
        Ok(files) => files,
        Err(err) => return MergeAnalysisResult::error(&target, err.to_string()),
    };

    let target_commit = match backend.resolve_ref(dir, &target).await {
        Ok(oid) => oid,
        Err(err) => {
            return MergeAnalysisResult::error(
                &target,
                format!("Cannot resolve target branch `{target}`: {err}"),
            );
        }
    };
    result.target_commit = Some(target_commit.to_string());

    if let Some(cancel) = cancel
        && let Err(err) = cancel.checkpoint()
    {
        return MergeAnalysisResult::error(&target, err.to_string());
    }

    // 2. Already applied: any patch commit in the target history.
    match backend
        .commit_history(dir, &target_commit, HISTORY_PROBE_LIMIT)
        .await
    {
        Ok(history) => {
            if patch.commits.iter().any(|oid| history.contains(oid)) {
                result.analysis = MergeAnalysis::UpToDate;
                result.up_to_date = true;
                result.can_merge = true;
                return result;
            }
        }
        Err(err) => tracing::debug!(%err, "Target history probe failed"),
    }

    // 3. Diverged: the remote tracking ref moved and the local target is
    // not a descendant of it.
    let tracking = format!("refs/remotes/origin/{target}");
    if let Ok(remote_commit) = backend.resolve_ref(dir, &tracking).await
        && remote_commit != target_commit
        && !backend
            .is_descendant(dir, &remote_commit, &target_commit)
            .await
            .unwrap_or(false)
    {
        result.analysis = MergeAnalysis::Diverged;
        return result;
    }

    // 4. Fast-forward: the patch tip descends from the target.
    if let Some(tip) = patch.commits.last()
        && backend
            .is_descendant(dir, &target_commit, tip)
            .await
            .unwrap_or(false)
    {
        result.analysis = MergeAnalysis::Clean;
        result.fast_forward = true;
        result.can_merge = true;
        return result;
    }

    // 5. Per-file conflict scan.
    let base_commit = patch.merge_base.or_else(|| patch.parent_commits.first().copied());
    let mut conflict_files = Vec::new();
    for file in &files {
        if let Some(cancel) = cancel
            && cancel.is_cancelled()
        {
            return MergeAnalysisResult::error(&target, "Operation cancelled");
        }
        let Some(path) = file.path() else {
            continue;
        };
        if file_conflicts(backend, dir, file, path, base_commit.as_ref(), &target_commit).await {
            conflict_files.push(path.to_owned());
        }
    }

    if !conflict_files.is_empty() {
        conflict_files.sort_unstable();
        conflict_files.dedup();
        result.analysis = MergeAnalysis::Conflicts;
        result.has_conflicts = true;
        result.conflict_files = conflict_files;
        return result;
    }

    // 6. Clean three-way merge.
    result.analysis = MergeAnalysis::Clean;
    result.can_merge = true;
    result
}

/// Whether one file of the diff conflicts with the target tree.
async fn file_conflicts(
    backend: &dyn GitBackend,
    dir: &Path,
    file: &FileDiff,
    path: &str,
    base_commit: Option<&Sha1Hash>,
    target_commit: &Sha1Hash,
) -> bool {
    if file.hunks.is_empty() {
        // Filename-only chunk: compare base and target blobs directly.
        let Some(base_commit) = base_commit else {
            return false;
        };
        let base_blob = backend.read_blob(dir, base_commit, path).await;
        let target_blob = backend.read_blob(dir, target_commit, path).await;
        return match (base_blob, target_blob) {
            (Ok(base), Ok(target)) => base != target,
            // Blob read failed: conservatively conflict only when the
            // target actually touched the file.
            _ => {
                backend
                    .changed_paths(dir, base_commit, target_commit)
                    .await
                    .map(|paths| paths.iter().any(|changed| changed == path))
                    .unwrap_or(true)
            }
        };
    }

    let target_content = match backend.read_blob(dir, target_commit, path).await {
        Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        // Additions replay against an empty base.
        Ok(None) if file.is_addition() => String::new(),
        Ok(None) => return true,
        Err(err) => {
            tracing::debug!(path, %err, "Blob read failed during conflict scan");
            return true;
        }
    };

    apply_hunks(&target_content, &file.hunks).is_err()
}

/// A fixed short phrase describing an analysis result.
pub fn merge_status_message(result: &MergeAnalysisResult) -> String {
    match result.analysis {
        MergeAnalysis::Clean if result.fast_forward => {
            "Patch can be fast-forwarded onto the target branch".to_owned()
        }
        MergeAnalysis::Clean => "Patch can be merged cleanly".to_owned(),
        MergeAnalysis::Conflicts => {
            format!("{} file conflict(s)", result.conflict_files.len())
        }
        MergeAnalysis::UpToDate => "Patch has already been applied".to_owned(),
        MergeAnalysis::Diverged => "Target branch has diverged from its remote".to_owned(),
        MergeAnalysis::Error => {
            format!(
                "Unable to analyze merge: {}",
                result.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}
