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

use std::{path::PathBuf, sync::Arc};

use nostr::{
    event::{EventBuilder, Kind, Tag},
    filter::Filter,
    key::PublicKey,
    nips::nip01::Coordinate,
    types::RelayUrl,
};

use crate::{
    cache::{CacheStore, DataLevel, MergeAnalysisRecord, now_ms},
    config::{CacheMode, Config, DEFAULT_PUSH_TIMEOUT},
    error::{Git34Error, Git34Result, PreflightReason},
    events::{
        REPO_STATE_KIND,
        announcement::{is_announcement_event, parse_announcement_event},
        patch::{Patch, PullRequestOptions, build_pull_request_event},
        state::{RefEntry, RepoState, StateOptions, build_state_event, is_state_event,
                parse_state_event},
    },
    fallback::{AuthConfig, FallbackOutcome, UrlPreferenceStore, is_grasp_remote,
               with_url_fallback},
    identity::make_repo_addr,
    io::{
        EventIO, Fs, PublishOutcome,
        cancel::{CancelHandle, with_timeout},
        git::{FileState, GitBackend, PushOptions},
    },
    merge::{
        MergeAnalysisResult, analyze_merge,
        apply::{ApplyOptions, ApplyOutcome, apply_patch_and_push},
    },
    sync::{InitializeOptions, SyncEngine},
};

/// A repository discovered from relay-broadcast announcements.
#[derive(Debug, Clone, Default)]
pub struct DiscoverResult {
    pub repo_id:     String,
    /// Union of every announced clone URL, in announcement order.
    pub urls:        Vec<String>,
    /// Union of announced maintainers, announcement authors included.
    pub maintainers: Vec<PublicKey>,
    pub relays:      Vec<RelayUrl>,
    /// The newest repository state, when one was announced.
    pub state:       Option<RepoState>,
    /// The address of the newest announcement.
    pub address:     Option<Coordinate>,
}

/// Options for [`NostrGit::push`]. Preflight gates are overridable per
/// call; the unset defaults are block-on-uncommitted, block-on-shallow
/// and require-up-to-date.
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    pub repo_id:             String,
    /// Working directory to push from.
    pub dir:                 PathBuf,
    pub refspecs:            Vec<String>,
    pub force:               bool,
    /// Required for destructive force pushes.
    pub confirm_destructive: bool,
    /// Creating a fresh repository; disables the up-to-date check.
    pub new_repo:            bool,
    /// Compose a pull-request event even without a `refs/heads/pr/*`
    /// refspec.
    pub pr_mode:             bool,
    pub block_if_uncommitted: Option<bool>,
    pub require_up_to_date:  Option<bool>,
    pub block_if_shallow:    Option<bool>,
    /// Base branch for pull-request content generation.
    pub base_branch:         Option<String>,
}

/// The result of a push through the facade.
#[derive(Debug)]
pub struct PushReport {
    /// The git server side: which URL worked, which were tried.
    pub server:        FallbackOutcome<()>,
    /// Outcomes of the events published after the push.
    pub published:     Vec<PublishOutcome>,
    /// Generated pull-request content, when the push was a PR.
    pub patch_content: Option<String>,
}

/// The facade tying discovery, sync, preflight, multi-URL pushing and
/// event publication together.
pub struct NostrGit {
    event_io: Arc<dyn EventIO>,
    backend:  Arc<dyn GitBackend>,
    fs:       Arc<dyn Fs>,
    cache:    Arc<dyn CacheStore>,
    prefs:    Arc<UrlPreferenceStore>,
    auth:     AuthConfig,
    config:   Config,
    sync:     SyncEngine,
}

impl NostrGit {
    /// Creates a facade over the injected collaborators. `root` is the
    /// directory holding managed working directories.
    pub fn new(
        event_io: Arc<dyn EventIO>,
        backend: Arc<dyn GitBackend>,
        fs: Arc<dyn Fs>,
        cache: Arc<dyn CacheStore>,
        config: Config,
        root: PathBuf,
    ) -> Self {
        let prefs = Arc::new(UrlPreferenceStore::new());
        let sync = SyncEngine::new(
            backend.clone(),
            cache.clone(),
            prefs.clone(),
            root,
            config.state_ttl(),
        );
        Self {
            event_io,
            backend,
            fs,
            cache,
            prefs,
            auth: AuthConfig::default(),
            config,
            sync,
        }
    }

    /// Attaches per-host credentials.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// The sync engine managing this facade's working directories.
    pub fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }

    /// Per-host credentials configured on this facade.
    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// Discovers a repository from its announcements and state events.
    ///
    /// Malformed announcements missing optional tags still contribute
    /// whatever they carry; the result never fails on event shape, only
    /// on transport errors.
    pub async fn discover_repo(&self, repo_id: &str) -> Git34Result<DiscoverResult> {
        let filters = vec![
            Filter::new()
                .kind(Kind::GitRepoAnnouncement)
                .identifier(repo_id),
            Filter::new().kind(REPO_STATE_KIND).identifier(repo_id),
        ];
        let events = self.event_io.fetch_events(filters).await?;

        let mut result = DiscoverResult {
            repo_id: repo_id.to_owned(),
            ..DiscoverResult::default()
        };

        let mut newest_announcement = None;
        for event in events.iter().filter(|event| is_announcement_event(event)) {
            let Ok(announcement) = parse_announcement_event(event) else {
                tracing::debug!(id = %event.id, "Skipping unparsable announcement");
                continue;
            };
            for url in &announcement.clone {
                if !result.urls.contains(url) {
                    result.urls.push(url.clone());
                }
            }
            for relay in &announcement.relays {
                if !result.relays.contains(relay) {
                    result.relays.push(relay.clone());
                }
            }
            if !result.maintainers.contains(&announcement.author) {
                result.maintainers.push(announcement.author);
            }
            for maintainer in &announcement.maintainers {
                if !result.maintainers.contains(maintainer) {
                    result.maintainers.push(*maintainer);
                }
            }
            if newest_announcement
                .as_ref()
                .is_none_or(|newest: &crate::events::announcement::RepoAnnouncement| {
                    newest.created_at < announcement.created_at
                })
            {
                newest_announcement = Some(announcement);
            }
        }
        result.address = newest_announcement.map(|announcement| announcement.address());

        result.state = events
            .iter()
            .filter(|event| is_state_event(event))
            .filter_map(|event| parse_state_event(event).ok())
            .max_by_key(|state| state.created_at);

        Ok(result)
    }

    /// Pushes refspecs to the repository's announced servers and
    /// publishes the corresponding events.
    pub async fn push(
        &self,
        request: PushRequest,
        cancel: Option<&CancelHandle>,
    ) -> Git34Result<PushReport> {
        let discovered = self.discover_repo(&request.repo_id).await?;
        self.preflight(&request, &discovered).await?;

        let timeout = self.config.timeout_or(DEFAULT_PUSH_TIMEOUT);
        let backend = self.backend.clone();
        let dir = request.dir.clone();
        let refspecs = request.refspecs.clone();
        let force = request.force;

        let server = with_url_fallback(
            &request.repo_id,
            &discovered.urls,
            &self.prefs,
            cancel,
            |url| {
                let backend = backend.clone();
                let dir = dir.clone();
                let refspecs = refspecs.clone();
                async move {
                    with_timeout(
                        "push",
                        timeout,
                        backend.push(PushOptions {
                            dir,
                            remote: "origin".to_owned(),
                            url: Some(url),
                            refspecs,
                            force,
                        }),
                    )
                    .await
                }
            },
        )
        .await?;

        if !server.success {
            return Ok(PushReport {
                server,
                published: Vec::new(),
                patch_content: None,
            });
        }

        let pubkey = self.event_io.current_pubkey().await?;
        let address = discovered
            .address
            .clone()
            .unwrap_or_else(|| {
                Coordinate::new(Kind::GitRepoAnnouncement, pubkey).identifier(&request.repo_id)
            });
        let relay_hint = discovered.relays.first().cloned();

        let mut templates: Vec<EventBuilder> = Vec::new();
        let mut patch_content = None;

        // Pull-request refspecs publish a PR event with generated patch
        // content instead of a plain state update.
        let pr_refspec = request
            .refspecs
            .iter()
            .find(|refspec| refspec.starts_with("refs/heads/pr/"))
            .cloned()
            .or_else(|| request.pr_mode.then(|| request.refspecs.first().cloned()).flatten());
        if let Some(refspec) = pr_refspec {
            let base_branch = request
                .base_branch
                .clone()
                .unwrap_or_else(|| "refs/heads/main".to_owned());
            let content = self
                .generate_patch_content(&request.dir, &base_branch, &refspec)
                .await;
            if let Ok(tip) = self.backend.resolve_ref(&request.dir, &refspec).await {
                templates.push(build_pull_request_event(PullRequestOptions {
                    repos:       vec![address.clone()],
                    relay_hint:  relay_hint.clone(),
                    subject:     refspec
                        .strip_prefix("refs/heads/")
                        .unwrap_or(&refspec)
                        .to_owned(),
                    content:     content.clone(),
                    commit:      tip,
                    merge_base:  None,
                    clone:       discovered.urls.clone(),
                    branch_name: refspec
                        .strip_prefix("refs/heads/")
                        .map(ToOwned::to_owned),
                    maintainers: discovered.maintainers.clone(),
                    labels:      Vec::new(),
                    update_of:   None,
                }));
            }
            patch_content = Some(content);
        } else {
            // A branch landed on the server: announce it as applied.
            templates.push(
                EventBuilder::new(Kind::GitStatusApplied, "").tag(Tag::custom(
                    nostr::event::TagKind::a(),
                    [make_repo_addr(&address.public_key, &address.identifier)],
                )),
            );
        }

        if self.config.publish_repo_state
            && let Some(state) = self.state_template(&request).await
        {
            templates.push(state);
        }

        if self.config.publish_repo_announcements {
            if let Ok(announcement) =
                crate::events::announcement::build_announcement_event(
                    crate::events::announcement::AnnouncementOptions {
                        identifier: request.repo_id.clone(),
                        clone: discovered
                            .urls
                            .iter()
                            .filter_map(|url| nostr::types::Url::parse(url).ok())
                            .collect(),
                        relays: discovered.relays.clone(),
                        maintainers: discovered.maintainers.clone(),
                        force_id: true,
                        ..Default::default()
                    },
                )
            {
                templates.push(announcement);
            }
        }

        let published = self.event_io.publish_events(templates).await?;

        Ok(PushReport {
            server,
            published,
            patch_content,
        })
    }

    /// Builds a repository state template from the refs just pushed.
    async fn state_template(&self, request: &PushRequest) -> Option<EventBuilder> {
        let mut refs = Vec::new();
        for refspec in &request.refspecs {
            // Only plain branch/tag refspecs map into state entries.
            let Some(name) = refspec.split(':').next_back().map(ToOwned::to_owned) else {
                continue;
            };
            if !name.starts_with("refs/") {
                continue;
            }
            if let Ok(commit) = self.backend.resolve_ref(&request.dir, refspec).await {
                refs.push(RefEntry { name, commit });
            }
        }
        if refs.is_empty() {
            return None;
        }

        let head = refs
            .first()
            .map(|entry| entry.short_name().to_owned());
        Some(build_state_event(StateOptions {
            identifier: request.repo_id.clone(),
            head,
            refs,
        }))
    }

    /// Preflight safety gates; violations short-circuit with a typed
    /// reason and never touch the backend transport.
    async fn preflight(
        &self,
        request: &PushRequest,
        discovered: &DiscoverResult,
    ) -> Git34Result<()> {
        if request.force && !request.confirm_destructive {
            return Err(Git34Error::PreflightBlocked(
                PreflightReason::ForcePushRequiresConfirmation,
            ));
        }

        if request.block_if_uncommitted.unwrap_or(true) {
            let dirty = self
                .backend
                .status_matrix(&request.dir)
                .await?
                .into_iter()
                .any(|entry| entry.state != FileState::Unmodified);
            if dirty {
                return Err(Git34Error::PreflightBlocked(
                    PreflightReason::UncommittedChanges,
                ));
            }
        }

        if request.block_if_shallow.unwrap_or(true)
            && let Some(snapshot) = self.cache.get_repo(&request.repo_id).await?
            && snapshot.data_level == DataLevel::Shallow
        {
            return Err(Git34Error::PreflightBlocked(PreflightReason::ShallowClone));
        }

        // Relay-backed (grasp) servers manage their own ref state; the
        // up-to-date gate only applies to plain git servers, and never to
        // repository creation.
        let grasp_only = !discovered.urls.is_empty()
            && discovered.urls.iter().all(|url| is_grasp_remote(url));
        if request.require_up_to_date.unwrap_or(true) && !request.new_repo && !grasp_only {
            if let Some(url) = discovered.urls.iter().find(|url| !is_grasp_remote(url))
                && self.sync.needs_update(&request.repo_id, url).await
            {
                return Err(Git34Error::PreflightBlocked(PreflightReason::RemoteAhead));
            }
        }

        Ok(())
    }

    /// Analyzes how a patch merges into its repository.
    ///
    /// Ensures a sufficiently deep local clone first, then runs the merge
    /// analyzer against the selected target branch and caches the
    /// result.
    pub async fn analyze_patch(
        &self,
        repo_id: &str,
        patch: &Patch,
        target_branch: Option<&str>,
        cancel: Option<&CancelHandle>,
    ) -> Git34Result<MergeAnalysisResult> {
        let discovered = self.discover_repo(repo_id).await?;
        self.sync
            .smart_initialize(
                InitializeOptions {
                    repo_id:      repo_id.to_owned(),
                    clone_urls:   discovered.urls,
                    force_update: false,
                },
                cancel,
            )
            .await?;
        let branch_hint = target_branch.or_else(|| patch.base_branch());
        self.sync
            .ensure_full_clone(repo_id, branch_hint, None)
            .await?;

        let dir = self.sync.repo_dir(repo_id);
        let result = analyze_merge(self.backend.as_ref(), &dir, patch, target_branch, cancel).await;

        if self.config.cache_mode == CacheMode::On {
            let record = MergeAnalysisRecord {
                result:       result.clone(),
                last_updated: now_ms(),
            };
            if let Err(err) = self
                .cache
                .put_merge_analysis(repo_id, &patch.id.to_hex(), &result.target_branch, record)
                .await
            {
                tracing::warn!(repo = %repo_id, %err, "Failed to cache merge analysis");
            }
        }

        Ok(result)
    }

    /// Applies a patch to the repository's managed working directory and
    /// pushes the branch to every configured remote.
    ///
    /// Hunks must never be replayed against a depth-1 history, so the
    /// clone is deepened to the full tier before anything is written; a
    /// repository that was never initialized is rejected here.
    pub async fn apply_patch(
        &self,
        repo_id: &str,
        patch: &Patch,
        author_name: &str,
        author_email: &str,
        cancel: Option<&CancelHandle>,
    ) -> Git34Result<ApplyOutcome> {
        let dir = self.sync.repo_dir(repo_id);
        let branch =
            crate::sync::resolve_branch(self.backend.as_ref(), &dir, patch.base_branch(), false)
                .await?;
        self.sync
            .ensure_full_clone(repo_id, Some(branch.as_str()), None)
            .await?;

        apply_patch_and_push(
            self.backend.as_ref(),
            self.fs.as_ref(),
            patch,
            &ApplyOptions {
                dir,
                branch,
                author_name: author_name.to_owned(),
                author_email: author_email.to_owned(),
            },
            cancel,
        )
        .await
    }

    /// Generates pull-request patch content: a cover header plus, when
    /// both ends resolve, the unified diff between base and head.
    pub async fn generate_patch_content(
        &self,
        dir: &std::path::Path,
        base_branch: &str,
        refspec: &str,
    ) -> String {
        let name = refspec.strip_prefix("refs/heads/").unwrap_or(refspec);
        let mut content = format!("# Patch: {name}\nbase: {base_branch}\n");

        let base = self.backend.resolve_ref(dir, base_branch).await;
        let head = self.backend.resolve_ref(dir, refspec).await;
        if let (Ok(base), Ok(head)) = (base, head)
            && let Ok(diff) = self.backend.diff_commits(dir, &base, &head).await
            && !diff.trim().is_empty()
        {
            content.push_str("\n---\n");
            content.push_str(&diff);
        }

        content
    }
}
