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

use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|url| (*url).to_owned()).collect()
}

#[test]
fn host_extraction() {
    assert_eq!(url_host("https://github.com/o/r.git"), Some("github.com"));
    assert_eq!(url_host("ssh://git@host.example:22/r"), Some("host.example"));
    assert_eq!(url_host("git@github.com:o/r.git"), Some("github.com"));
    assert_eq!(url_host("host.example/path"), Some("host.example"));
    assert_eq!(url_host(""), None);

    assert!(is_grasp_remote("https://relay.grasp.example/repo.git"));
    assert!(!is_grasp_remote("https://github.com/o/r.git"));
}

#[tokio::test]
async fn fallback_skips_pseudo_urls_and_records_preferences() {
    let prefs = UrlPreferenceStore::new();
    let attempts_log = std::sync::Mutex::new(Vec::new());

    let outcome = with_url_fallback(
        "demo",
        &urls(&[
            "nostr://npub1xyz/demo",
            "ssh://git@h/demo.git",
            "https://h/demo.git",
        ]),
        &prefs,
        None,
        |url| {
            attempts_log.lock().unwrap().push(url.clone());
            async move {
                if url.starts_with("ssh://") {
                    Err(Git34Error::network("connection reset"))
                } else {
                    Ok(url)
                }
            }
        },
    )
    .await
    .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.used_url.as_deref(), Some("https://h/demo.git"));
    assert_eq!(outcome.attempts.len(), 2);
    // The pseudo-URL never reached the operation.
    assert_eq!(
        *attempts_log.lock().unwrap(),
        vec!["ssh://git@h/demo.git".to_owned(), "https://h/demo.git".to_owned()]
    );

    // Next round starts with the recorded preference and ends with the
    // recorded failure.
    let ordered = prefs
        .order("demo", &urls(&["ssh://git@h/demo.git", "https://h/demo.git"]))
        .await;
    assert_eq!(
        ordered,
        urls(&["https://h/demo.git", "ssh://git@h/demo.git"])
    );
}

#[tokio::test]
async fn fallback_stops_on_auth_errors() {
    let prefs = UrlPreferenceStore::new();
    let calls = AtomicUsize::new(0);

    let outcome = with_url_fallback(
        "demo",
        &urls(&["https://a/demo.git", "https://b/demo.git"]),
        &prefs,
        None,
        |_url| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Git34Error::AuthRequired("401 Unauthorized".to_owned())) }
        },
    )
    .await
    .unwrap();

    assert!(!outcome.success);
    // The second URL was never tried.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.attempts.len(), 1);
}

#[tokio::test]
async fn multi_write_aggregates_and_sorts() {
    let outcome = with_multi_write(
        vec![
            ("mirror-b".to_owned(), "https://b/r.git".to_owned()),
            ("mirror-a".to_owned(), "https://a/r.git".to_owned()),
            ("mirror-c".to_owned(), "https://c/r.git".to_owned()),
        ],
        |remote, _url| {
            async move {
                if remote == "mirror-b" {
                    Err(Git34Error::network("unreachable"))
                } else {
                    Ok(())
                }
            }
        },
    )
    .await;

    assert!(!outcome.success);
    assert!(outcome.partial_success);
    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.failure_count, 1);
    assert_eq!(outcome.summary, "2/3 remote(s) updated");
    // Stable ordering by remote name.
    let names: Vec<&str> = outcome
        .results
        .iter()
        .map(|result| result.remote.as_str())
        .collect();
    assert_eq!(names, vec!["mirror-a", "mirror-b", "mirror-c"]);

    let all_good = with_multi_write(
        vec![("origin".to_owned(), "https://a/r.git".to_owned())],
        |_, _| async { Ok(()) },
    )
    .await;
    assert!(all_good.success);
    assert!(!all_good.partial_success);
}

#[test]
fn tokens_match_hosts_and_subdomains() {
    let auth = AuthConfig {
        tokens: vec![
            HostToken {
                host:  "example.com".to_owned(),
                token: "token-a".to_owned(),
            },
            HostToken {
                host:  "git.example.com".to_owned(),
                token: "token-b".to_owned(),
            },
        ],
    };

    let for_root: Vec<&str> = auth
        .tokens_for_url("https://example.com/o/r.git")
        .iter()
        .map(|token| token.token.as_str())
        .collect();
    assert_eq!(for_root, vec!["token-a"]);

    // A subdomain matches both its own entry and the parent domain.
    let for_sub: Vec<&str> = auth
        .tokens_for_url("https://git.example.com/o/r.git")
        .iter()
        .map(|token| token.token.as_str())
        .collect();
    assert_eq!(for_sub, vec!["token-a", "token-b"]);

    assert!(auth.tokens_for_url("https://other.org/o/r.git").is_empty());
}

#[tokio::test]
async fn token_iteration_returns_first_success() {
    let auth = AuthConfig {
        tokens: vec![
            HostToken {
                host:  "example.com".to_owned(),
                token: "bad".to_owned(),
            },
            HostToken {
                host:  "example.com".to_owned(),
                token: "good".to_owned(),
            },
        ],
    };

    let used = try_push_with_tokens(&auth, "https://example.com/o/r.git", |token| {
        async move {
            if token == "good" {
                Ok(token)
            } else {
                Err(Git34Error::AuthRequired("bad token".to_owned()))
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(used, "good");

    let all_bad = try_push_with_tokens(&auth, "https://example.com/o/r.git", |_| {
        async { Err::<(), _>(Git34Error::AuthRequired("nope".to_owned())) }
    })
    .await;
    assert!(matches!(all_bad, Err(Git34Error::AllTokensFailed)));

    let none = try_push_with_tokens(&auth, "https://other.org/o/r.git", |_| {
        async { Ok::<_, Git34Error>(()) }
    })
    .await;
    assert!(matches!(none, Err(Git34Error::AuthRequired(_))));
}
