//! Latest-only execution: starting a new run cancels the previous one.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{AbortHandle, Abortable};
use thiserror::Error;
use tracing::debug;

/// A run was replaced by a newer one (or cancelled) before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("superseded by a newer run")]
pub struct Superseded;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    active: Option<AbortHandle>,
}

/// One in-progress slot for a logical query.
///
/// Each [`LatestOnly::run`] gets a fresh abort registration; starting another
/// run aborts it. A result that completes after being superseded is dropped,
/// never returned.
#[derive(Debug, Clone, Default)]
pub struct LatestOnly {
    slot: Arc<Mutex<Slot>>,
}

/// Clears the slot when the run it belongs to ends, however it ends.
struct RunGuard<'a> {
    slot: &'a Mutex<Slot>,
    generation: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation == self.generation {
            slot.active = None;
        }
    }
}

impl LatestOnly {
    /// Creates an idle slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `future` as the latest run, cancelling any earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`Superseded`] when another run started (or [`Self::cancel`]
    /// was called) before this one finished.
    pub async fn run<F, T>(&self, future: F) -> Result<T, Superseded>
    where
        F: Future<Output = T>,
    {
        let (handle, registration) = AbortHandle::new_pair();
        let generation = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.generation += 1;
            if let Some(previous) = slot.active.replace(handle) {
                debug!(generation = slot.generation, "superseding previous run");
                previous.abort();
            }
            slot.generation
        };
        let _guard = RunGuard {
            slot: &self.slot,
            generation,
        };

        let outcome = Abortable::new(future, registration).await;
        let current = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation;
        match outcome {
            Ok(value) if current == generation => Ok(value),
            _ => Err(Superseded),
        }
    }

    /// Cancels the current run, if any.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.generation += 1;
        if let Some(active) = slot.active.take() {
            active.abort();
        }
    }

    /// Returns true while a run is outstanding.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_single_run_returns_value() {
        let latest = LatestOnly::new();
        assert!(!latest.is_in_progress());
        let value = latest.run(async { 42 }).await;
        assert_eq!(value, Ok(42));
        assert!(!latest.is_in_progress());
    }

    #[tokio::test]
    async fn test_newer_run_supersedes_older() {
        let latest = LatestOnly::new();
        let (release_first, first_gate) = oneshot::channel::<()>();

        let first = {
            let latest = latest.clone();
            tokio::spawn(async move {
                latest
                    .run(async move {
                        first_gate.await.ok();
                        "stale"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(latest.is_in_progress());

        let second = latest.run(async { "fresh" }).await;
        release_first.send(()).ok();

        assert_eq!(second, Ok("fresh"));
        assert_eq!(first.await.unwrap(), Err(Superseded));
        assert!(!latest.is_in_progress());
    }

    #[tokio::test]
    async fn test_cancel_marks_run_superseded() {
        let latest = LatestOnly::new();
        let runner = {
            let latest = latest.clone();
            tokio::spawn(async move {
                latest
                    .run(tokio::time::sleep(Duration::from_secs(30)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        latest.cancel();
        assert_eq!(runner.await.unwrap(), Err(Superseded));
        assert!(!latest.is_in_progress());
    }

    #[tokio::test]
    async fn test_dropped_run_clears_in_progress() {
        let latest = LatestOnly::new();
        let pending = latest.run(std::future::pending::<()>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert!(!latest.is_in_progress());
    }
}
