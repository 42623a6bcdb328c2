use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// How long edits must pause before a transform runs.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Sent by a [`ChangeDebouncer`] when its quiet period has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed(Instant),
}

struct Pending {
    deadline: Instant,
    timer: JoinHandle<()>,
}

/// Coalesces bursts of edits into one [`Trigger`], sent a quiet period
/// after the last edit.
///
/// Must be used from within a Tokio runtime.
pub struct ChangeDebouncer {
    triggers: mpsc::UnboundedSender<Trigger>,
    pending: Mutex<Option<Pending>>,
}

impl ChangeDebouncer {
    pub fn new(triggers: mpsc::UnboundedSender<Trigger>) -> Self {
        Self {
            triggers,
            pending: Mutex::new(None),
        }
    }

    /// Record an edit: cancel any pending trigger and arm a new one.
    pub fn notify(&self) {
        let deadline = Instant::now() + QUIET_PERIOD;
        let triggers = self.triggers.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            trace!("quiet period over, triggering");
            // the receiver is gone when the session was dropped
            let _ = triggers.send(Trigger);
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Pending { deadline, timer });
        if let Some(previous) = previous {
            previous.timer.abort();
        }
        trace!(?deadline, "debouncer armed");
    }

    pub fn state(&self) -> DebounceState {
        match &*self.pending.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(pending) if !pending.timer.is_finished() => DebounceState::Armed(pending.deadline),
            _ => DebounceState::Idle,
        }
    }

    /// Forward every change seen by `changes` to [`notify`](Self::notify),
    /// until the sender side goes away.
    pub fn watch(self: &Arc<Self>, mut changes: watch::Receiver<u64>) -> JoinHandle<()> {
        let debouncer = Arc::clone(self);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                debouncer.notify();
            }
        })
    }
}

impl Drop for ChangeDebouncer {
    fn drop(&mut self) {
        if let Some(pending) = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pending.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_after_last_edit() {
        let (sender, mut triggers) = mpsc::unbounded_channel();
        let debouncer = ChangeDebouncer::new(sender);
        let start = Instant::now();
        debouncer.notify();
        tokio::time::advance(Duration::from_millis(50)).await;
        debouncer.notify();
        tokio::time::advance(Duration::from_millis(50)).await;
        debouncer.notify();
        assert_eq!(
            debouncer.state(),
            DebounceState::Armed(start + Duration::from_millis(300))
        );

        assert_eq!(triggers.recv().await, Some(Trigger));
        assert!(start.elapsed() >= Duration::from_millis(300));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(triggers.try_recv().is_err());
        assert_eq!(debouncer.state(), DebounceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_edits_fire_separately() {
        let (sender, mut triggers) = mpsc::unbounded_channel();
        let debouncer = ChangeDebouncer::new(sender);
        debouncer.notify();
        assert_eq!(triggers.recv().await, Some(Trigger));
        debouncer.notify();
        assert_eq!(triggers.recv().await, Some(Trigger));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_forwards_changes() {
        let (sender, mut triggers) = mpsc::unbounded_channel();
        let debouncer = Arc::new(ChangeDebouncer::new(sender));
        let (revision, changes) = watch::channel(0u64);
        let _watcher = debouncer.watch(changes);
        revision.send_modify(|revision| *revision += 1);
        assert_eq!(triggers.recv().await, Some(Trigger));
    }
}
