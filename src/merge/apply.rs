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

use nostr::hashes::sha1::Hash as Sha1Hash;

use super::diff::{apply_hunks, contains_binary, contains_rename, parse_unified_diff};
use crate::{
    error::{Git34Error, Git34Result, PreflightReason},
    events::patch::Patch,
    fallback::is_grasp_remote,
    io::{
        Fs,
        cancel::CancelHandle,
        git::{CommitOptions, FileState, GitBackend, PushOptions},
    },
};

/// Warning used when a repository has no remotes to push to.
const NO_REMOTES_WARNING: &str = "No remotes configured - changes only applied locally";

/// A push failure on one remote.
#[derive(Debug, Clone)]
pub struct PushError {
    pub remote:  String,
    pub code:    Option<String>,
    pub message: String,
}

/// The result of applying a patch and pushing it out.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub success:         bool,
    pub error:           Option<String>,
    pub warning:         Option<String>,
    /// The commit created from the patch.
    pub commit:          Option<Sha1Hash>,
    /// Paths written or removed.
    pub applied_files:   Vec<String>,
    pub pushed_remotes:  Vec<String>,
    /// Remotes without a configured URL.
    pub skipped_remotes: Vec<String>,
    pub push_errors:     Vec<PushError>,
    /// Protected-branch fallback log: `FALLBACK_TOPIC_PUSH` or
    /// `FALLBACK_FAILED` entries, one per attempted fallback.
    pub fallback_log:    Vec<String>,
}

/// Options for [`apply_patch_and_push`].
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Working directory of a full clone.
    pub dir:          PathBuf,
    /// The checked-out branch the patch lands on.
    pub branch:       String,
    pub author_name:  String,
    pub author_email: String,
}

/// A planned filesystem mutation. The plan is computed in full before
/// anything is written, so failures leave the tree untouched.
enum FileAction {
    Write { path: String, content: String },
    Delete { path: String },
}

/// Applies a patch to the working tree, commits it, and pushes the
/// branch to every configured remote.
///
/// Rename and binary patches are rejected up front. Pushes to
/// relay-backed (grasp) remotes that refuse a protected branch are
/// retried onto an auto-named `grasp/patch-<shortId>` topic branch.
pub async fn apply_patch_and_push(
    backend: &dyn GitBackend,
    fs: &dyn Fs,
    patch: &Patch,
    options: &ApplyOptions,
    cancel: Option<&CancelHandle>,
) -> Git34Result<ApplyOutcome> {
    let dir = options.dir.as_path();

    // Unsupported features are rejected before any filesystem mutation.
    if contains_rename(&patch.content) || contains_binary(&patch.content) {
        return Err(Git34Error::Unsupported(
            "rename and binary patches cannot be applied".to_owned(),
        ));
    }

    let dirty = backend
        .status_matrix(dir)
        .await?
        .into_iter()
        .any(|entry| entry.state != FileState::Unmodified);
    if dirty {
        return Err(Git34Error::PreflightBlocked(
            PreflightReason::UncommittedChanges,
        ));
    }

    let files = parse_unified_diff(&patch.content)?;
    let mut outcome = ApplyOutcome::default();

    // Plan every mutation first.
    let mut plan: Vec<FileAction> = Vec::with_capacity(files.len());
    for file in &files {
        let Some(path) = file.path() else {
            continue;
        };

        if file.is_deletion() {
            plan.push(FileAction::Delete {
                path: path.to_owned(),
            });
            continue;
        }

        let base = if file.is_addition() {
            String::new()
        } else {
            fs.read_to_string(&dir.join(path)).await.unwrap_or_default()
        };

        match apply_hunks(&base, &file.hunks) {
            Ok(content) => {
                plan.push(FileAction::Write {
                    path: path.to_owned(),
                    content,
                });
            }
            Err(err) => {
                outcome.error = Some(format!("Failed to apply patch to `{path}`: {err}"));
                return Ok(outcome);
            }
        }
    }

    if let Some(cancel) = cancel {
        cancel.checkpoint()?;
    }

    // Execute the plan and stage the results.
    let mut added = Vec::new();
    let mut removed = Vec::new();
    for action in &plan {
        match action {
            FileAction::Write { path, content } => {
                let full_path = dir.join(path);
                if let Some(parent) = full_path.parent() {
                    fs.mkdir(parent).await?;
                }
                fs.write_file(&full_path, content.as_bytes()).await?;
                added.push(path.clone());
            }
            FileAction::Delete { path } => {
                fs.unlink(&dir.join(path)).await?;
                removed.push(path.clone());
            }
        }
    }
    if !added.is_empty() {
        backend.add(dir, &added).await?;
    }
    if !removed.is_empty() {
        backend.remove(dir, &removed).await?;
    }
    outcome.applied_files = added.iter().chain(removed.iter()).cloned().collect();

    let staged = backend
        .status_matrix(dir)
        .await?
        .into_iter()
        .any(|entry| entry.state != FileState::Unmodified);
    if !staged {
        outcome.error = Some("No changes to apply".to_owned());
        return Ok(outcome);
    }

    let message = patch
        .subject
        .clone()
        .unwrap_or_else(|| format!("Apply patch {}", patch.id));
    let commit = backend
        .commit(dir, CommitOptions {
            message,
            author_name: options.author_name.clone(),
            author_email: options.author_email.clone(),
        })
        .await?;
    outcome.commit = Some(commit);

    push_to_remotes(backend, patch, options, cancel, &mut outcome).await?;

    outcome.success = true;
    Ok(outcome)
}

/// Pushes the branch to every configured remote, collecting per-remote
/// results and falling back to a topic branch on protected grasp
/// remotes.
async fn push_to_remotes(
    backend: &dyn GitBackend,
    patch: &Patch,
    options: &ApplyOptions,
    cancel: Option<&CancelHandle>,
    outcome: &mut ApplyOutcome,
) -> Git34Result<()> {
    let dir = options.dir.as_path();
    let remotes = backend.list_remotes(dir).await?;
    if remotes.is_empty() {
        outcome.warning = Some(NO_REMOTES_WARNING.to_owned());
        return Ok(());
    }

    let refspec = format!("refs/heads/{}", options.branch);
    for remote in remotes {
        if let Some(cancel) = cancel {
            cancel.checkpoint()?;
        }

        let Some(url) = remote.url.clone() else {
            outcome.skipped_remotes.push(remote.name);
            continue;
        };

        let push = backend
            .push(push_options(dir, &remote.name, &refspec, &refspec))
            .await;
        match push {
            Ok(()) => outcome.pushed_remotes.push(remote.name),
            Err(err) if is_protected_branch_error(&err) && is_grasp_remote(&url) => {
                let topic = topic_ref(&patch.id);
                match backend
                    .push(push_options(dir, &remote.name, &refspec, &topic))
                    .await
                {
                    Ok(()) => {
                        tracing::info!(remote = %remote.name, topic, "FALLBACK_TOPIC_PUSH");
                        outcome.fallback_log.push("FALLBACK_TOPIC_PUSH".to_owned());
                        outcome.pushed_remotes.push(remote.name);
                    }
                    Err(fallback_err) => {
                        tracing::warn!(remote = %remote.name, %fallback_err, "FALLBACK_FAILED");
                        outcome.fallback_log.push("FALLBACK_FAILED".to_owned());
                        outcome.push_errors.push(PushError {
                            remote:  remote.name,
                            code:    fallback_err.code().map(ToOwned::to_owned),
                            message: fallback_err.to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                outcome.push_errors.push(PushError {
                    remote:  remote.name,
                    code:    err.code().map(ToOwned::to_owned),
                    message: err.to_string(),
                });
            }
        }
    }

    outcome.pushed_remotes.sort_unstable();
    outcome.skipped_remotes.sort_unstable();
    Ok(())
}

fn push_options(dir: &Path, remote: &str, source: &str, target: &str) -> PushOptions {
    PushOptions {
        dir:      dir.to_path_buf(),
        remote:   remote.to_owned(),
        url:      None,
        refspecs: vec![if source == target {
            source.to_owned()
        } else {
            format!("{source}:{target}")
        }],
        force:    false,
    }
}

/// The auto-named topic ref for a protected-branch fallback.
fn topic_ref(patch_id: &nostr::event::EventId) -> String {
    let short_id: String = patch_id.to_hex().chars().take(8).collect();
    format!("refs/heads/grasp/patch-{short_id}")
}

/// Whether the push error is a protected-branch rejection.
fn is_protected_branch_error(err: &Git34Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("protected branch") || message.contains("protected-branch")
}
