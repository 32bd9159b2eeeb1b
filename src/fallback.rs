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

use std::collections::HashMap;

use futures::future;
use tokio::sync::RwLock;

use crate::{
    error::{Git34Error, Git34Result},
    io::cancel::CancelHandle,
};

/// Whether a URL points at a relay-backed (GRASP) git server.
///
/// Hostname-substring detection is deliberate and isolated here; a
/// NIP-11 capability probe could replace it without touching call sites.
pub fn is_grasp_remote(url: &str) -> bool {
    url_host(url).is_some_and(|host| host.contains("grasp"))
}

/// Extracts the host from a URL-ish string, handling `scheme://`,
/// scp-like `git@host:path` and bare `host/path` forms.
pub fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let rest = rest.rsplit_once('@').map(|(_, rest)| rest).unwrap_or(rest);
    let host = rest
        .split(['/', '?', '#'])
        .next()?
        .split(':')
        .next()?
        .trim();
    (!host.is_empty()).then_some(host)
}

/// Remembered per-repo URL ordering: the last URL that worked comes
/// first, known-bad ones last.
#[derive(Debug, Clone, Default)]
struct UrlPreference {
    preferred: Option<String>,
    failed:    Vec<String>,
}

/// Process-wide per-repository URL preference cache.
///
/// Confined behind this interface so the single-threaded cooperative
/// model can later move to a multi-threaded one.
#[derive(Debug, Default)]
pub struct UrlPreferenceStore {
    inner: RwLock<HashMap<String, UrlPreference>>,
}

impl UrlPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all remembered preferences.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Records a successful URL for the repository.
    pub async fn record_success(&self, repo_key: &str, url: &str) {
        let mut inner = self.inner.write().await;
        let preference = inner.entry(repo_key.to_owned()).or_default();
        preference.preferred = Some(url.to_owned());
        preference.failed.retain(|failed| failed != url);
    }

    /// Records a failed URL for the repository.
    pub async fn record_failure(&self, repo_key: &str, url: &str) {
        let mut inner = self.inner.write().await;
        let preference = inner.entry(repo_key.to_owned()).or_default();
        if preference.preferred.as_deref() == Some(url) {
            preference.preferred = None;
        }
        if !preference.failed.iter().any(|failed| failed == url) {
            preference.failed.push(url.to_owned());
        }
    }

    /// Reorders candidate URLs: preferred first, failed last, the rest in
    /// their original order.
    pub async fn order(&self, repo_key: &str, urls: &[String]) -> Vec<String> {
        let inner = self.inner.read().await;
        let Some(preference) = inner.get(repo_key) else {
            return urls.to_vec();
        };

        let mut ordered = Vec::with_capacity(urls.len());
        let mut failed = Vec::new();
        if let Some(preferred) = &preference.preferred
            && urls.contains(preferred)
        {
            ordered.push(preferred.clone());
        }
        for url in urls {
            if ordered.contains(url) {
                continue;
            }
            if preference.failed.contains(url) {
                failed.push(url.clone());
            } else {
                ordered.push(url.clone());
            }
        }
        ordered.extend(failed);
        ordered
    }
}

/// One attempt of a URL-fallback operation.
#[derive(Debug, Clone)]
pub struct UrlAttempt {
    pub url:     String,
    pub success: bool,
    pub error:   Option<String>,
}

/// The result of a URL-fallback operation.
#[derive(Debug)]
pub struct FallbackOutcome<T> {
    pub success:  bool,
    pub used_url: Option<String>,
    pub result:   Option<T>,
    pub attempts: Vec<UrlAttempt>,
}

/// Tries candidate URLs sequentially until one succeeds.
///
/// Pseudo-URLs (`nostr:*`) are skipped. The attempt order honors the
/// preference store; a success records the URL as preferred, failures
/// are persisted. Network/CORS-class errors continue to the next URL;
/// authentication-class errors stop the whole fallback.
pub async fn with_url_fallback<T, F, Fut>(
    repo_key: &str,
    urls: &[String],
    prefs: &UrlPreferenceStore,
    cancel: Option<&CancelHandle>,
    mut operation: F,
) -> Git34Result<FallbackOutcome<T>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Git34Result<T>>,
{
    let candidates: Vec<String> = prefs
        .order(repo_key, urls)
        .await
        .into_iter()
        .filter(|url| {
            let pseudo = url.starts_with("nostr:");
            if pseudo {
                tracing::debug!(url, "Skipping pseudo-URL");
            }
            !pseudo
        })
        .collect();

    let mut attempts = Vec::with_capacity(candidates.len());
    for url in candidates {
        if let Some(cancel) = cancel {
            cancel.checkpoint()?;
        }

        match operation(url.clone()).await {
            Ok(result) => {
                prefs.record_success(repo_key, &url).await;
                attempts.push(UrlAttempt {
                    url:     url.clone(),
                    success: true,
                    error:   None,
                });
                return Ok(FallbackOutcome {
                    success: true,
                    used_url: Some(url),
                    result: Some(result),
                    attempts,
                });
            }
            Err(err) => {
                tracing::warn!(url, %err, "URL attempt failed");
                prefs.record_failure(repo_key, &url).await;
                let stop = err.is_auth();
                attempts.push(UrlAttempt {
                    url,
                    success: false,
                    error: Some(err.to_string()),
                });
                if stop {
                    break;
                }
            }
        }
    }

    Ok(FallbackOutcome {
        success:  false,
        used_url: None,
        result:   None,
        attempts,
    })
}

/// The result of one mirror write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub remote:  String,
    pub success: bool,
    pub error:   Option<String>,
}

/// The aggregate of a multi-remote mirror write.
#[derive(Debug, Clone)]
pub struct MultiWriteOutcome {
    /// All writes succeeded.
    pub success:        bool,
    /// At least one but not all writes succeeded.
    pub partial_success: bool,
    pub success_count:  usize,
    pub failure_count:  usize,
    /// A one-line human summary.
    pub summary:        String,
    /// Per-remote results, sorted by remote name for stable output.
    pub results:        Vec<WriteResult>,
}

/// Runs the operation against every target in parallel. The operation
/// itself never fails the aggregate; callers apply policy to the
/// summary.
pub async fn with_multi_write<F, Fut>(
    targets: Vec<(String, String)>,
    operation: F,
) -> MultiWriteOutcome
where
    F: Fn(String, String) -> Fut,
    Fut: Future<Output = Git34Result<()>>,
{
    let writes = targets.into_iter().map(|(remote, url)| {
        let operation = &operation;
        async move {
            let result = operation(remote.clone(), url).await;
            WriteResult {
                remote,
                success: result.is_ok(),
                error: result.err().map(|err| err.to_string()),
            }
        }
    });

    let mut results: Vec<WriteResult> = future::join_all(writes).await;
    results.sort_unstable_by(|a, b| a.remote.cmp(&b.remote));

    let success_count = results.iter().filter(|result| result.success).count();
    let failure_count = results.len() - success_count;
    let summary = format!(
        "{success_count}/{} remote(s) updated",
        results.len()
    );

    MultiWriteOutcome {
        success: failure_count == 0 && !results.is_empty(),
        partial_success: success_count > 0 && failure_count > 0,
        success_count,
        failure_count,
        summary,
        results,
    }
}

/// A token scoped to one host (and its subdomains).
#[derive(Debug, Clone)]
pub struct HostToken {
    pub host:  String,
    pub token: String,
}

/// Per-host credential configuration.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub tokens: Vec<HostToken>,
}

impl AuthConfig {
    /// Tokens applicable to the URL: the host equals the configured one
    /// or is one of its subdomains.
    pub fn tokens_for_url(&self, url: &str) -> Vec<&HostToken> {
        let Some(host) = url_host(url) else {
            return Vec::new();
        };
        self.tokens
            .iter()
            .filter(|token| {
                host == token.host || host.ends_with(&format!(".{}", token.host))
            })
            .collect()
    }
}

/// Tries the operation with each candidate token for the URL, returning
/// the first success.
pub async fn try_push_with_tokens<T, F, Fut>(
    auth: &AuthConfig,
    url: &str,
    mut operation: F,
) -> Git34Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Git34Result<T>>,
{
    let tokens = auth.tokens_for_url(url);
    if tokens.is_empty() {
        return Err(Git34Error::AuthRequired(format!(
            "No token configured for `{url}`"
        )));
    }

    for token in tokens {
        match operation(token.token.clone()).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                tracing::debug!(host = %token.host, %err, "Token rejected");
            }
        }
    }
    Err(Git34Error::AllTokensFailed)
}

#[cfg(test)]
mod tests;
