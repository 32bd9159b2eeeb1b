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

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::error::{Git34Error, Git34Result};

/// Advisory cancellation handle for long-running operations.
///
/// Safe points call [`CancelHandle::checkpoint`]; in-flight backend calls
/// may still complete but their results are discarded by the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Creates a fresh, un-cancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Raises [`Git34Error::Cancelled`] if cancellation was requested.
    pub fn checkpoint(&self) -> Git34Result<()> {
        if self.is_cancelled() {
            return Err(Git34Error::Cancelled);
        }
        Ok(())
    }
}

/// Runs a future with a deadline, mapping expiry to
/// [`Git34Error::Timeout`] tagged with the operation name.
pub async fn with_timeout<T>(
    operation: &str,
    timeout: Duration,
    future: impl Future<Output = Git34Result<T>>,
) -> Git34Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?timeout, "Operation timed out");
            Err(Git34Error::Timeout {
                operation: operation.to_owned(),
                timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_raises_after_cancel() {
        let handle = CancelHandle::new();
        assert!(handle.checkpoint().is_ok());

        let shared = handle.clone();
        shared.cancel();
        assert!(handle.is_cancelled());
        assert!(matches!(handle.checkpoint(), Err(Git34Error::Cancelled)));
    }

    #[tokio::test]
    async fn timeouts_are_tagged_with_the_operation() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        let result = with_timeout("fetch", Duration::from_millis(5), slow).await;
        match result {
            Err(Git34Error::Timeout { operation, .. }) => assert_eq!(operation, "fetch"),
            other => panic!("expected a timeout, got {other:?}"),
        }

        let fast = with_timeout("fetch", Duration::from_secs(5), async { Ok(42) }).await;
        assert_eq!(fast.unwrap(), 42);
    }
}
