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

/// Cancellation handles and timeout helpers.
pub mod cancel;
/// Git backend collaborator trait.
pub mod git;

use std::path::Path;

use async_trait::async_trait;
use nostr::{
    event::{Event, EventBuilder},
    filter::Filter,
    key::PublicKey,
    types::RelayUrl,
};

use crate::error::Git34Result;

/// Result of signing and publishing one event template.
#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    /// Whether at least one relay accepted the event.
    pub ok:     bool,
    /// Relays that accepted the event.
    pub relays: Vec<RelayUrl>,
    /// Failure detail when no relay accepted it.
    pub error:  Option<String>,
}

/// Signed-event transport collaborator.
///
/// The library only constructs unsigned templates; signing and relay
/// fan-out happen behind this trait.
#[async_trait]
pub trait EventIO: Send + Sync {
    /// Queries relays with the given filters and returns matching events.
    async fn fetch_events(&self, filters: Vec<Filter>) -> Git34Result<Vec<Event>>;

    /// Signs the template and broadcasts it.
    async fn publish_event(&self, template: EventBuilder) -> Git34Result<PublishOutcome>;

    /// Signs and broadcasts a batch of templates, preserving order.
    async fn publish_events(
        &self,
        templates: Vec<EventBuilder>,
    ) -> Git34Result<Vec<PublishOutcome>> {
        let mut outcomes = Vec::with_capacity(templates.len());
        for template in templates {
            outcomes.push(self.publish_event(template).await?);
        }
        Ok(outcomes)
    }

    /// Public key of the active signer.
    async fn current_pubkey(&self) -> Git34Result<PublicKey>;
}

/// Filesystem collaborator used when applying patches to a working tree.
#[async_trait]
pub trait Fs: Send + Sync {
    /// Creates a directory, including missing parents.
    async fn mkdir(&self, path: &Path) -> Git34Result<()>;

    /// Reads a file as raw bytes.
    async fn read_file(&self, path: &Path) -> Git34Result<Vec<u8>>;

    /// Reads a file as UTF-8 text.
    async fn read_to_string(&self, path: &Path) -> Git34Result<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes)
            .map_err(|err| crate::error::Git34Error::InvalidInput(err.to_string()))
    }

    /// Writes a file, replacing any previous content.
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Git34Result<()>;

    /// Removes a file.
    async fn unlink(&self, path: &Path) -> Git34Result<()>;
}

/// A progress report from a long-running git operation.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Short phase name, e.g. `clone` or `fetch`.
    pub phase:  String,
    /// Units completed so far.
    pub loaded: u64,
    /// Total units, when known.
    pub total:  Option<u64>,
}

/// Progress callback channel.
pub type ProgressSink = dyn Fn(Progress) + Send + Sync;
