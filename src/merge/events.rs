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

use nostr::event::{EventBuilder, EventId, Tag, TagKind};

use super::MergeAnalysisResult;
use crate::{
    error::Git34Result,
    events::{CONFLICT_METADATA_KIND, MERGE_METADATA_KIND},
};

/// Options shared by the two metadata builders.
#[derive(Debug, Clone)]
pub struct MergeMetadataOptions {
    /// Repository address `30617:<pubkey>:<d>`.
    pub repo_addr:     String,
    /// The analyzed root patch or pull request.
    pub root_id:       EventId,
    pub target_branch: String,
    /// The branch the patch was built against, when known.
    pub base_branch:   Option<String>,
}

/// Creates an unsigned kind-30411 merge metadata template mirroring the
/// analysis result in its tags and JSON content.
pub fn build_merge_metadata_event(
    options: &MergeMetadataOptions,
    result: &MergeAnalysisResult,
) -> Git34Result<EventBuilder> {
    let content = serde_json::to_string(result)
        .map_err(|err| crate::error::Git34Error::Unknown(err.to_string()))?;

    let mut event_builder = EventBuilder::new(MERGE_METADATA_KIND, content)
        .tag(Tag::identifier(metadata_identifier(options)))
        .tag(Tag::custom(TagKind::a(), [options.repo_addr.clone()]))
        .tag(Tag::custom(TagKind::e(), [options.root_id.to_hex()]))
        .tag(Tag::custom(TagKind::custom("target-branch"), [
            options.target_branch.clone(),
        ]))
        .tag(Tag::custom(TagKind::custom("result"), [
            result.result_tag(),
        ]));

    if let Some(base_branch) = &options.base_branch {
        event_builder = event_builder.tag(Tag::custom(TagKind::custom("base-branch"), [
            base_branch.clone(),
        ]));
    }

    Ok(event_builder.dedup_tags())
}

/// Creates an unsigned kind-30412 conflict metadata template with one
/// `file` tag per conflicting path. `None` when the analysis found no
/// conflicts.
pub fn build_conflict_metadata_event(
    options: &MergeMetadataOptions,
    result: &MergeAnalysisResult,
) -> Git34Result<Option<EventBuilder>> {
    if !result.has_conflicts {
        return Ok(None);
    }

    let content = serde_json::to_string(result)
        .map_err(|err| crate::error::Git34Error::Unknown(err.to_string()))?;

    let event_builder = EventBuilder::new(CONFLICT_METADATA_KIND, content)
        .tag(Tag::identifier(metadata_identifier(options)))
        .tag(Tag::custom(TagKind::a(), [options.repo_addr.clone()]))
        .tag(Tag::custom(TagKind::e(), [options.root_id.to_hex()]))
        .tag(Tag::custom(TagKind::custom("target-branch"), [
            options.target_branch.clone(),
        ]))
        .tags(
            result
                .conflict_files
                .iter()
                .map(|file| Tag::custom(TagKind::custom("file"), [file.clone()])),
        )
        .dedup_tags();

    Ok(Some(event_builder))
}

/// The `d` identifier of the addressable metadata events: one record per
/// `(root, target branch)` pair, replaced on re-analysis.
fn metadata_identifier(options: &MergeMetadataOptions) -> String {
    format!("{}:{}", options.root_id.to_hex(), options.target_branch)
}
