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

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Git34Error, Git34Result};

/// Marker git uses for binary patch payloads.
pub const BINARY_PATCH_MARKER: &str = "GIT binary patch";

/// Regular expression for a hunk header.
static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(?<old_start>\d+)(?:,(?<old_lines>\d+))? \+(?<new_start>\d+)(?:,(?<new_lines>\d+))? @@")
        .unwrap()
});

/// One line of a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Add(String),
    Remove(String),
}

/// One hunk of a file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based first line in the old file.
    pub old_start: usize,
    pub old_lines: usize,
    /// 1-based first line in the new file.
    pub new_start: usize,
    pub new_lines: usize,
    pub lines:     Vec<DiffLine>,
}

/// The diff of one file.
///
/// `old_path`/`new_path` are `None` for `/dev/null`, so additions have no
/// old path and deletions no new path. A chunk without hunks is a
/// "filename-only" diff (mode changes and similar); callers fall back to
/// blob comparison for those.
#[derive(Debug, Clone, Default)]
pub struct FileDiff {
    pub old_path:  Option<String>,
    pub new_path:  Option<String>,
    pub hunks:     Vec<Hunk>,
    pub is_rename: bool,
    pub is_binary: bool,
}

impl FileDiff {
    /// The path this diff applies to: the new path, or the old one for
    /// deletions.
    pub fn path(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }

    /// Whether this adds a new file.
    pub fn is_addition(&self) -> bool {
        self.old_path.is_none() && self.new_path.is_some()
    }

    /// Whether this deletes a file.
    pub fn is_deletion(&self) -> bool {
        self.old_path.is_some() && self.new_path.is_none()
    }
}

/// Whether the content looks like a unified diff at all.
pub fn is_unified_diff(content: &str) -> bool {
    content.lines().any(|line| line.starts_with("diff --git "))
        || (content.contains("\n--- ") || content.starts_with("--- "))
            && content.contains("\n+++ ")
}

/// Whether the diff contains rename markers.
pub fn contains_rename(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.starts_with("rename from ") || line.starts_with("rename to "))
}

/// Whether the diff contains binary hunks.
pub fn contains_binary(content: &str) -> bool {
    content.lines().any(|line| line.starts_with(BINARY_PATCH_MARKER))
}

/// Strips the `a/`-style prefix from a diff path, mapping `/dev/null` to
/// `None`.
fn diff_path(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw == "/dev/null" {
        return None;
    }
    let raw = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    (!raw.is_empty()).then(|| raw.to_owned())
}

/// Parses unified diff content into per-file chunks.
///
/// Accepts both `git diff` output (with `diff --git` headers) and bare
/// unified diffs. Content that does not look like a diff is an
/// [`Git34Error::InvalidInput`].
pub fn parse_unified_diff(content: &str) -> Git34Result<Vec<FileDiff>> {
    if content.trim().is_empty() || !is_unified_diff(content) {
        return Err(Git34Error::InvalidInput(
            "Content is not a unified diff".to_owned(),
        ));
    }

    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;

    let mut lines = content.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(paths) = line.strip_prefix("diff --git ") {
            if let Some(file) = current.take() {
                files.push(file);
            }
            // `diff --git a/<path> b/<path>`; the `---`/`+++` lines that
            // usually follow refine these.
            let mut file = FileDiff::default();
            if let Some((old, new)) = paths.split_once(' ') {
                file.old_path = diff_path(old);
                file.new_path = diff_path(new);
            }
            current = Some(file);
            continue;
        }

        if line.starts_with(BINARY_PATCH_MARKER) {
            if let Some(file) = current.as_mut() {
                file.is_binary = true;
            }
            continue;
        }

        if line.starts_with("rename from ") || line.starts_with("rename to ") {
            if let Some(file) = current.as_mut() {
                file.is_rename = true;
            }
            continue;
        }

        if let Some(old) = line.strip_prefix("--- ") {
            // Refines the header of the current chunk, or starts a new
            // one in a bare diff without `diff --git` lines.
            let refines_current = current.as_ref().is_some_and(|file| file.hunks.is_empty());
            if !refines_current {
                if let Some(file) = current.take() {
                    files.push(file);
                }
                current = Some(FileDiff::default());
            }
            if let Some(file) = current.as_mut() {
                file.old_path = diff_path(old);
            }
            continue;
        }

        if let Some(new) = line.strip_prefix("+++ ") {
            if let Some(file) = current.as_mut() {
                file.new_path = diff_path(new);
            }
            continue;
        }

        if let Some(captures) = HUNK_HEADER_RE.captures(line) {
            let Some(file) = current.as_mut() else {
                return Err(Git34Error::InvalidInput(
                    "Hunk header before any file header".to_owned(),
                ));
            };

            let number = |name: &str, default: usize| {
                captures
                    .name(name)
                    .map(|m| m.as_str().parse().unwrap_or(default))
                    .unwrap_or(default)
            };
            let mut hunk = Hunk {
                old_start: number("old_start", 1),
                old_lines: number("old_lines", 1),
                new_start: number("new_start", 1),
                new_lines: number("new_lines", 1),
                lines:     Vec::new(),
            };

            // Hunk body: exactly old_lines context/remove lines and
            // new_lines context/add lines.
            let (mut seen_old, mut seen_new) = (0usize, 0usize);
            while seen_old < hunk.old_lines || seen_new < hunk.new_lines {
                let Some(body_line) = lines.peek() else {
                    break;
                };
                let parsed = match body_line.chars().next() {
                    Some('+') => {
                        seen_new += 1;
                        DiffLine::Add(body_line[1..].to_owned())
                    }
                    Some('-') => {
                        seen_old += 1;
                        DiffLine::Remove(body_line[1..].to_owned())
                    }
                    Some(' ') => {
                        seen_old += 1;
                        seen_new += 1;
                        DiffLine::Context(body_line[1..].to_owned())
                    }
                    // `\ No newline at end of file`
                    Some('\\') => {
                        lines.next();
                        continue;
                    }
                    None => {
                        seen_old += 1;
                        seen_new += 1;
                        DiffLine::Context(String::new())
                    }
                    _ => break,
                };
                lines.next();
                hunk.lines.push(parsed);
            }

            file.hunks.push(hunk);
        }
    }

    if let Some(file) = current.take() {
        files.push(file);
    }

    if files.is_empty() {
        return Err(Git34Error::InvalidInput(
            "No file chunks found in diff".to_owned(),
        ));
    }
    Ok(files)
}

/// Why a hunk failed to apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HunkError {
    #[error("hunk context does not match at line {0}")]
    ContextMismatch(usize),
    #[error("hunk start {0} is beyond the end of the file")]
    OutOfBounds(usize),
}

/// Replays hunks against base content, producing the patched text.
///
/// Context and removal lines must match the base exactly; any
/// misalignment reports the offending base line.
pub fn apply_hunks(base: &str, hunks: &[Hunk]) -> Result<String, HunkError> {
    let base_lines: Vec<&str> = base.lines().collect();
    let mut output: Vec<String> = Vec::with_capacity(base_lines.len());
    // 0-based index of the next unconsumed base line.
    let mut cursor = 0usize;

    for hunk in hunks {
        let hunk_start = hunk.old_start.saturating_sub(1);
        if hunk_start > base_lines.len() {
            return Err(HunkError::OutOfBounds(hunk.old_start));
        }
        if hunk_start < cursor {
            return Err(HunkError::ContextMismatch(hunk.old_start));
        }

        // Copy the untouched span before the hunk.
        output.extend(base_lines[cursor..hunk_start].iter().map(|s| (*s).to_owned()));
        cursor = hunk_start;

        for line in &hunk.lines {
            match line {
                DiffLine::Context(expected) => {
                    let Some(actual) = base_lines.get(cursor) else {
                        return Err(HunkError::OutOfBounds(cursor + 1));
                    };
                    if actual != expected {
                        return Err(HunkError::ContextMismatch(cursor + 1));
                    }
                    output.push((*actual).to_owned());
                    cursor += 1;
                }
                DiffLine::Remove(expected) => {
                    let Some(actual) = base_lines.get(cursor) else {
                        return Err(HunkError::OutOfBounds(cursor + 1));
                    };
                    if actual != expected {
                        return Err(HunkError::ContextMismatch(cursor + 1));
                    }
                    cursor += 1;
                }
                DiffLine::Add(added) => output.push(added.clone()),
            }
        }
    }

    output.extend(base_lines[cursor..].iter().map(|s| (*s).to_owned()));

    let mut patched = output.join("\n");
    if base.ends_with('\n') || base.is_empty() {
        patched.push('\n');
    }
    Ok(patched)
}
