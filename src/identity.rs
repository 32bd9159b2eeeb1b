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

use std::{path::Path, sync::Arc, sync::LazyLock};

use async_trait::async_trait;
use nostr::{
    event::{EventId, Kind},
    hashes::{Hash, sha256},
    key::PublicKey,
    nips::{
        nip01::Coordinate,
        nip19::{FromBech32, Nip19Coordinate, Nip19Event, ToBech32},
    },
    types::RelayUrl,
};
use regex::Regex;

use crate::{
    error::{Git34Error, Git34Result},
    io::git::GitBackend,
};

/// Regular expression for a bare 64-hex pubkey (a legacy key form).
static HEX_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$").unwrap());

/// Regular expression for a repository address.
static REPO_ADDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^30617:[0-9a-f]{64}:.+$").unwrap());

/// Regular expression for GitHub blob permalinks.
static GITHUB_BLOB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?<host>github\.com)/(?<owner>[^/]+)/(?<repo>[^/]+)/blob/(?<branch>[^/]+)/(?<path>[^#?]+?)/?(?:\?[^#]*)?(?:#L(?<start>\d+)(?:-L(?<end>\d+))?)?$",
    )
    .unwrap()
});

/// Regular expression for GitHub commit-diff permalinks. The anchor hash
/// is the SHA-256 of the file path.
static GITHUB_DIFF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?<host>github\.com)/(?<owner>[^/]+)/(?<repo>[^/]+)/commit/(?<branch>[0-9a-f]{7,40})(?:#diff-(?<hash>[0-9a-f]{64})(?:(?<side>[LR])(?<start>\d+))?)?$",
    )
    .unwrap()
});

/// Regular expression for GitLab blob permalinks.
static GITLAB_BLOB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?<host>[^/]+)/(?<owner>[^/]+(?:/[^/]+)*?)/(?<repo>[^/]+)/-/blob/(?<branch>[^/]+)/(?<path>[^#?]+?)/?(?:#L(?<start>\d+)(?:-(?<end>\d+))?)?$",
    )
    .unwrap()
});

/// Regular expression for Gitea blob permalinks.
static GITEA_BLOB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?<host>[^/]+)/(?<owner>[^/]+)/(?<repo>[^/]+)/src/(?:branch|commit|tag)/(?<branch>[^/]+)/(?<path>[^#?]+?)/?(?:#L(?<start>\d+)(?:-L(?<end>\d+))?)?$",
    )
    .unwrap()
});

/// Builds a repository address `30617:<pubkey>:<repo-id>`.
pub fn make_repo_addr(pubkey: &PublicKey, repo_id: &str) -> String {
    format!(
        "{}:{}:{repo_id}",
        Kind::GitRepoAnnouncement.as_u16(),
        pubkey.to_hex()
    )
}

/// Whether the string is a repository address.
pub fn is_repo_addr(address: &str) -> bool {
    REPO_ADDR_RE.is_match(address)
}

/// Parses a repository address into `(pubkey, repo_id)`. Exact round-trip
/// of [`make_repo_addr`].
pub fn parse_repo_addr(address: &str) -> Git34Result<(PublicKey, String)> {
    if !is_repo_addr(address) {
        return Err(Git34Error::InvalidInput(format!(
            "Not a repository address: `{address}`"
        )));
    }
    let coordinate = Coordinate::parse(address)
        .map_err(|err| Git34Error::InvalidInput(format!("Invalid repository address: {err}")))?;
    Ok((coordinate.public_key, coordinate.identifier))
}

/// Resolves NIP-05 identifiers to public keys. Implementations do the
/// HTTP themselves; the core only caches.
#[async_trait]
pub trait Nip05Resolver: Send + Sync {
    /// Resolves `user@domain` (or bare `domain`, meaning `_@domain`) to a
    /// public key. `None` when the identifier is unknown.
    async fn resolve(&self, nip05: &str) -> Git34Result<Option<PublicKey>>;
}

/// Sink for non-fatal identity warnings, e.g. legacy key forms.
pub type WarningSink = dyn Fn(&str) + Send + Sync;

/// Resolvers optionally consulted by [`canonical_repo_key`].
#[derive(Clone, Default)]
pub struct KeyResolvers {
    pub nip05: Option<Arc<dyn Nip05Resolver>>,
}

/// The output encoding of a canonical key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyForm {
    /// `npub[/name]`, the default.
    #[default]
    Npub,
    /// The NIP-05 identifier the caller passed in, normalized.
    Nip05,
    /// A bech32 `naddr`, available when a repo name is present.
    Naddr,
}

/// Options for [`canonical_repo_key`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyOptions {
    pub output: KeyForm,
    /// Surface `UnresolvedIdentity` instead of silently returning the
    /// input when resolution fails.
    pub strict: bool,
}

/// Derives the canonical key of a repository input.
///
/// Accepts a bare npub, `npub/name`, `nip05[/name]`, `naddr1…`, plus the
/// legacy bare-hex and `30617:` forms (reported to the warning sink).
/// The key is deterministic and independent of any transport URL. When
/// resolution is impossible the input is returned unchanged, unless
/// `strict` is set.
pub async fn canonical_repo_key(
    input: &str,
    resolvers: Option<&KeyResolvers>,
    options: KeyOptions,
    warn: Option<&WarningSink>,
) -> Git34Result<String> {
    let input = input.trim();
    let emit = |message: &str| {
        tracing::warn!(input, message);
        if let Some(warn) = warn {
            warn(message);
        }
    };

    // Legacy forms first.
    if HEX_KEY_RE.is_match(input) {
        emit("Legacy bare-hex repository key");
        let pubkey = PublicKey::parse(input)?;
        return render_key(&pubkey, None, input, options);
    }
    if let Ok((pubkey, repo_id)) = parse_repo_addr(input) {
        emit("Legacy `30617:` repository key");
        return render_key(&pubkey, Some(&repo_id), input, options);
    }

    if input.starts_with("naddr1") {
        let Ok(naddr) = Nip19Coordinate::from_bech32(input) else {
            return unresolved(input, options);
        };
        return render_key(
            &naddr.public_key,
            Some(&naddr.coordinate.identifier),
            input,
            options,
        );
    }

    let (head, name) = match input.split_once('/') {
        Some((head, name)) if !name.is_empty() => (head, Some(name)),
        _ => (input, None),
    };

    if head.starts_with("npub1") {
        let Ok(pubkey) = PublicKey::parse(head) else {
            return unresolved(input, options);
        };
        return render_key(&pubkey, name, input, options);
    }

    // A NIP-05 identifier: `user@domain` or a bare domain.
    if head.contains('.') {
        let nip05 = head.to_lowercase();
        if let Some(resolvers) = resolvers
            && let Some(resolver) = resolvers.nip05.as_ref()
        {
            match resolver.resolve(&nip05).await {
                Ok(Some(pubkey)) => {
                    if options.output == KeyForm::Nip05 {
                        return Ok(join_key(&nip05, name));
                    }
                    return render_key(&pubkey, name, input, options);
                }
                Ok(None) => return unresolved(input, options),
                Err(err) => {
                    tracing::debug!(input, %err, "NIP-05 resolution failed");
                    return unresolved(input, options);
                }
            }
        }
        // No resolver: keep the identifier as-is, lowercased.
        return Ok(join_key(&nip05, name));
    }

    unresolved(input, options)
}

/// Renders a resolved `(pubkey, name)` pair in the requested form.
fn render_key(
    pubkey: &PublicKey,
    name: Option<&str>,
    input: &str,
    options: KeyOptions,
) -> Git34Result<String> {
    match (options.output, name) {
        (KeyForm::Naddr, Some(name)) => {
            Ok(Nip19Coordinate::new(
                Coordinate::new(Kind::GitRepoAnnouncement, *pubkey).identifier(name),
                Vec::new(),
            )
            .to_bech32()?)
        }
        (KeyForm::Nip05, _) if !input.starts_with("npub1") && input.contains('.') => {
            Ok(input.to_lowercase())
        }
        _ => Ok(join_key(&pubkey.to_bech32()?, name)),
    }
}

/// Joins a key head with an optional repository name.
fn join_key(head: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{head}/{name}"),
        None => head.to_owned(),
    }
}

/// The silent-fallback vs strict failure policy.
fn unresolved(input: &str, options: KeyOptions) -> Git34Result<String> {
    if options.strict {
        return Err(Git34Error::UnresolvedIdentity(input.to_owned()));
    }
    Ok(input.to_owned())
}

/// Normalizes a relay URL: lowercase scheme and host, default `wss`
/// scheme (`ws` for `.onion` hosts), default ports and trailing slashes
/// dropped. Idempotent.
pub fn normalize_relay_url(url: &str) -> String {
    let url = url.trim();
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme.to_lowercase(), rest),
        None => ("wss".to_owned(), url),
    };

    let (host_port, path) = match rest.split_once('/') {
        Some((host_port, path)) => (host_port.to_lowercase(), Some(path)),
        None => (rest.to_lowercase(), None),
    };

    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) => (host.to_owned(), Some(port.to_owned())),
        None => (host_port, None),
    };

    let scheme = if host.ends_with(".onion") {
        "ws".to_owned()
    } else {
        scheme
    };

    let port = port.filter(|port| {
        !((scheme == "ws" && port == "80") || (scheme == "wss" && port == "443"))
    });

    let mut normalized = format!("{scheme}://{host}");
    if let Some(port) = port {
        normalized.push(':');
        normalized.push_str(&port);
    }
    if let Some(path) = path {
        normalized.push('/');
        normalized.push_str(path);
    }
    normalized.trim_end_matches('/').to_owned()
}

/// A parsed web permalink to a file, line range or diff anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permalink {
    pub host:           String,
    /// `github`, `gitlab` or `gitea`.
    pub platform:       String,
    pub owner:          String,
    pub repo:           String,
    /// Branch name or commit oid.
    pub branch:         String,
    pub file_path:      Option<String>,
    pub start_line:     Option<u32>,
    pub end_line:       Option<u32>,
    pub is_diff:        bool,
    /// SHA-256 of the file path, from GitHub diff anchors.
    pub diff_file_hash: Option<String>,
    /// `L` (old) or `R` (new) side of a diff anchor.
    pub diff_side:      Option<char>,
}

/// Recognizes GitHub/GitLab/Gitea blob and diff URLs.
pub fn parse_permalink(url: &str) -> Option<Permalink> {
    let line = |captures: &regex::Captures<'_>, group: &str| {
        captures
            .name(group)
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };

    if let Some(captures) = GITHUB_DIFF_RE.captures(url) {
        return Some(Permalink {
            host:           captures["host"].to_owned(),
            platform:       "github".to_owned(),
            owner:          captures["owner"].to_owned(),
            repo:           captures["repo"].to_owned(),
            branch:         captures["branch"].to_owned(),
            file_path:      None,
            start_line:     line(&captures, "start"),
            end_line:       None,
            is_diff:        true,
            diff_file_hash: captures.name("hash").map(|m| m.as_str().to_owned()),
            diff_side:      captures
                .name("side")
                .and_then(|m| m.as_str().chars().next()),
        });
    }

    for (regex, platform) in [
        (&*GITHUB_BLOB_RE, "github"),
        (&*GITLAB_BLOB_RE, "gitlab"),
        (&*GITEA_BLOB_RE, "gitea"),
    ] {
        if let Some(captures) = regex.captures(url) {
            return Some(Permalink {
                host:           captures["host"].to_owned(),
                platform:       platform.to_owned(),
                owner:          captures["owner"].to_owned(),
                repo:           captures["repo"].to_owned(),
                branch:         captures["branch"].to_owned(),
                file_path:      Some(captures["path"].to_owned()),
                start_line:     line(&captures, "start"),
                end_line:       line(&captures, "end"),
                is_diff:        false,
                diff_file_hash: None,
                diff_side:      None,
            });
        }
    }

    None
}

/// Finds the file whose SHA-256(path) matches a GitHub diff anchor, by
/// walking the tree diff between two commits. `None` when no changed
/// path (or more than one) matches.
pub async fn map_diff_hash_to_file(
    backend: &dyn GitBackend,
    dir: &Path,
    old_oid: &nostr::hashes::sha1::Hash,
    new_oid: &nostr::hashes::sha1::Hash,
    hash: &str,
) -> Git34Result<Option<String>> {
    let mut matching = None;
    for path in backend.changed_paths(dir, old_oid, new_oid).await? {
        if sha256::Hash::hash(path.as_bytes()).to_string() == hash {
            if matching.is_some() {
                return Ok(None);
            }
            matching = Some(path);
        }
    }
    Ok(matching)
}

/// Returns a vector with duplicate elements removed.
pub(crate) fn dedup<I, T>(iter: I) -> Vec<T>
where
    T: std::cmp::Ord,
    I: Iterator<Item = T>,
{
    let mut vector: Vec<T> = iter.collect();
    vector.sort_unstable();
    vector.dedup();
    vector
}

/// Creates a new NIP-19 nevent string from an event ID and up to 3 unique relay
/// URLs.
#[inline]
pub fn new_nevent(event_id: EventId, relays: &[RelayUrl]) -> Git34Result<String> {
    Nip19Event::new(event_id)
        .relays(
            dedup(relays.iter().cloned())
                .into_iter()
                .take(3)
                .collect::<Vec<_>>(),
        )
        .to_bech32()
        .map_err(Git34Error::from)
}

/// Creates a NIP-19 naddr string for a git repository announcement and up to 3
/// unique relay URLs.
#[inline]
pub fn repo_naddr(
    repo_id: impl Into<String>,
    pubkey: PublicKey,
    relays: &[RelayUrl],
) -> Git34Result<String> {
    Nip19Coordinate::new(
        Coordinate::new(Kind::GitRepoAnnouncement, pubkey).identifier(repo_id),
        dedup(relays.iter().cloned()).into_iter().take(3),
    )
    .to_bech32()
    .map_err(Git34Error::from)
}
