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

use std::time::Duration;

use nostr::event::builder::Error as EventBuilderError;

use crate::config::ConfigError;

pub type Git34Result<T> = Result<T, Git34Error>;

/// Reasons a push preflight check refuses to touch the git backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PreflightReason {
    #[error("uncommitted_changes")]
    UncommittedChanges,
    #[error("shallow_clone")]
    ShallowClone,
    #[error("remote_ahead")]
    RemoteAhead,
    #[error("force_push_requires_confirmation")]
    ForcePushRequiresConfirmation,
}

/// git34 errors
#[derive(Debug, thiserror::Error)]
pub enum Git34Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Authentication required: {0}")]
    AuthRequired(String),
    #[error("Network error: {message}")]
    Network { message: String, cors: bool },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Preflight blocked: {0}")]
    PreflightBlocked(PreflightReason),
    #[error("Push to `{remote}` failed: {message}")]
    PushFailed {
        remote:  String,
        code:    Option<String>,
        message: String,
    },
    #[error("Unsupported patch features: {0}")]
    Unsupported(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Operation `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout:   Duration,
    },
    #[error("Git backend error: {message}")]
    Git {
        message: String,
        code:    Option<String>,
    },
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Failed building an event: {0}")]
    EventBuilder(#[from] EventBuilderError),
    #[error("Event error: {0}")]
    Event(#[from] nostr::event::Error),
    #[error("Bech32 error: {0}")]
    Bech32(#[from] nostr::nips::nip19::Error),
    #[error("Key error: {0}")]
    Key(#[from] nostr::key::Error),
    #[error("Invalid repository id, it can't be empty and must be kebab-case")]
    InvalidRepoId,
    #[error("Unable to locate the repository. The repository may not exists in the given relays")]
    NotFoundRepo,
    #[error("Unable to resolve `{0}` to a repository identity")]
    UnresolvedIdentity(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("All tokens failed")]
    AllTokensFailed,
    #[error("{0}")]
    Unknown(String),
}

/// Whether an error message looks like a browser CORS rejection. Git
/// transports running behind a CORS proxy surface these as plain text.
pub fn is_cors_message(message: &str) -> bool {
    message.contains("CORS") || message.contains("Access-Control")
}

/// Whether an error message looks like an authentication rejection.
pub fn is_auth_message(message: &str) -> bool {
    message.contains("401") || message.contains("403") || message.contains("Unauthorized")
}

impl From<std::convert::Infallible> for Git34Error {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}

impl Git34Error {
    /// Builds a [`Git34Error::Network`], classifying CORS from the message.
    pub fn network(message: impl Into<String>) -> Self {
        let message = message.into();
        let cors = is_cors_message(&message);
        Self::Network { message, cors }
    }

    /// Builds a [`Git34Error::Git`] without a backend error code.
    pub fn git(message: impl Into<String>) -> Self {
        Self::Git {
            message: message.into(),
            code:    None,
        }
    }

    /// Whether this error is authentication-class. URL fallback stops
    /// retrying on these.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::AuthRequired(_) => true,
            Self::Network { message, .. } | Self::Unknown(message) => is_auth_message(message),
            Self::Git { message, code } => {
                code.as_deref().is_some_and(|c| c == "401" || c == "403")
                    || is_auth_message(message)
            }
            Self::PushFailed { code, message, .. } => {
                code.as_deref().is_some_and(|c| c == "401" || c == "403")
                    || is_auth_message(message)
            }
            _ => false,
        }
    }

    /// Whether this error is CORS-class. Sync treats these as warnings
    /// rather than failures.
    pub fn is_cors(&self) -> bool {
        match self {
            Self::Network { cors, .. } => *cors,
            Self::Git { message, .. } | Self::Unknown(message) => is_cors_message(message),
            _ => false,
        }
    }

    /// The backend error code, when one was attached.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Git { code, .. } | Self::PushFailed { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
