//! Bounded execution of detached action work.
//!
//! Each submitted unit runs in its own task behind a semaphore permit. The
//! supervisor awaits that task, so a panic inside the work is observed here
//! and turned into a `Failed` record instead of leaving the action stuck.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use super::tracker::ActionTracker;

pub const DEFAULT_MAX_CONCURRENT_ACTIONS: usize = 16;

pub struct TaskSupervisor {
    permits: Arc<Semaphore>,
    tracker: Arc<ActionTracker>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl TaskSupervisor {
    pub fn new(tracker: Arc<ActionTracker>, max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tracker,
        }
    }

    /// Number of units that could start right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` for `action_id` in the background.
    ///
    /// Must be called from within a Tokio runtime. Whatever happens to the
    /// work, the action ends in a terminal state.
    pub fn submit<F>(&self, action_id: Uuid, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submit_serialized(action_id, None, work)
    }

    /// Like [`submit`](Self::submit), but first waits for `lock` when one is
    /// given. The lock is taken before the permit, so units queued behind a
    /// busy lock never hold permits other work could use. It is released
    /// after the terminal status has been written.
    pub fn submit_serialized<F>(
        &self,
        action_id: Uuid,
        lock: Option<Arc<Mutex<()>>>,
        work: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let _serial = match lock {
                Some(lock) => Some(lock.lock_owned().await),
                None => None,
            };
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    settle(tracker, action_id, "action executor shut down").await;
                    return;
                }
            };

            match tokio::spawn(work).await {
                Ok(()) => {
                    let t = tracker.clone();
                    let terminal = tokio::task::spawn_blocking(move || t.get_status(action_id))
                        .await
                        .ok()
                        .and_then(|r| r.ok())
                        .is_some_and(|s| s.is_terminal());
                    if !terminal {
                        settle(tracker, action_id, "action finished without a terminal status")
                            .await;
                    }
                }
                Err(e) if e.is_panic() => {
                    let payload = e.into_panic();
                    let msg = panic_message(&*payload);
                    error!(action_id = %action_id, panic = %msg, "action task panicked");
                    settle(tracker, action_id, format!("action task panicked: {msg}")).await;
                }
                Err(_) => settle(tracker, action_id, "action task cancelled").await,
            }
        })
    }
}

async fn settle(tracker: Arc<ActionTracker>, action_id: Uuid, reason: impl Into<String>) {
    let reason = reason.into();
    let result = tokio::task::spawn_blocking(move || tracker.fail(action_id, reason)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(action_id = %action_id, error = %e, "could not record action failure"),
        Err(e) => warn!(action_id = %action_id, error = %e, "could not record action failure"),
    }
}
