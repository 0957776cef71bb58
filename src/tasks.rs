use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tokio::sync::watch;
use uuid::Uuid;

use crate::error::AppResult;

/// Finished tasks stay queryable for this long.
const RETENTION: Duration = Duration::from_secs(3_600);

/// `Err` carries the task's error message.
pub type TaskOutcome = Result<(), String>;

#[derive(Clone, Debug)]
struct Finished {
    outcome: TaskOutcome,
    at: Instant,
}

/// Runs work on the tokio runtime and lets callers find it again by id.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<HashMap<Uuid, watch::Receiver<Option<Finished>>>>>,
}

#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: Uuid,
    rx: watch::Receiver<Option<Finished>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit<F>(&self, work: F) -> TaskHandle
    where
        F: Future<Output = AppResult<()>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (tx, rx) = watch::channel(None);

        {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.retain(|_, rx| {
                (*rx.borrow()).as_ref().is_none_or(|done| done.at.elapsed() < RETENTION)
            });
            tasks.insert(id, rx.clone());
        }

        tokio::spawn(async move {
            // The inner task turns a panic into a recorded failure.
            let outcome = match tokio::spawn(work).await {
                Ok(result) => result.map_err(|err| err.to_string()),
                Err(join_err) => Err(format!("task panicked: {join_err}")),
            };
            if let Err(err) = &outcome {
                tracing::warn!(task_id = %id, error = %err, "task failed");
            }
            tracing::debug!(task_id = %id, ok = outcome.is_ok(), "task finished");
            if tx.send(Some(Finished { outcome, at: Instant::now() })).is_err() {
                tracing::debug!(task_id = %id, "no receivers left for task outcome");
            }
        });

        tracing::debug!(task_id = %id, "task submitted");
        TaskHandle { id, rx }
    }

    pub fn get(&self, id: Uuid) -> Option<TaskHandle> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.get(&id).map(|rx| TaskHandle { id, rx: rx.clone() })
    }
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits up to `timeout`. `None` means the task is still running.
    pub async fn wait(&mut self, timeout: Duration) -> Option<TaskOutcome> {
        let done = tokio::time::timeout(timeout, self.rx.wait_for(Option::is_some)).await;
        match done {
            Ok(Ok(finished)) => (*finished).as_ref().map(|f| f.outcome.clone()),
            Ok(Err(_)) => Some(dropped()),
            Err(_) => None,
        }
    }

    /// Non-blocking check. `None` means the task is still running.
    pub fn try_outcome(&self) -> Option<TaskOutcome> {
        if let Some(finished) = (*self.rx.borrow()).as_ref() {
            return Some(finished.outcome.clone());
        }
        // Sender gone without an outcome.
        self.rx.has_changed().is_err().then(dropped)
    }
}

fn dropped() -> TaskOutcome {
    Err("task was dropped before finishing".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finished_task_outcome_is_visible() {
        let queue = TaskQueue::new();
        let mut handle = queue.submit(async { Ok(()) });

        assert_eq!(handle.wait(Duration::from_secs(5)).await, Some(Ok(())));
        assert_eq!(queue.get(handle.id()).unwrap().try_outcome(), Some(Ok(())));
    }

    #[tokio::test]
    async fn failed_task_reports_its_error() {
        let queue = TaskQueue::new();
        let mut handle = queue.submit(async { Err(anyhow::anyhow!("boom").into()) });

        assert_eq!(handle.wait(Duration::from_secs(5)).await, Some(Err("boom".to_string())));
    }

    #[tokio::test]
    async fn slow_task_times_out_and_stays_pending() {
        let queue = TaskQueue::new();
        let mut handle = queue.submit(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        assert_eq!(handle.wait(Duration::from_millis(20)).await, None);
        assert_eq!(handle.try_outcome(), None);
    }

    async fn explode() -> AppResult<()> {
        panic!("db exploded")
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_failed() {
        let queue = TaskQueue::new();
        let mut handle = queue.submit(explode());

        let outcome = handle.wait(Duration::from_secs(5)).await;
        assert!(matches!(outcome, Some(Err(ref msg)) if msg.contains("panicked")));
        let polled = queue.get(handle.id()).unwrap().try_outcome();
        assert!(matches!(polled, Some(Err(_))));
    }

    #[test]
    fn abandoned_task_is_not_pending() {
        let (tx, rx) = watch::channel(None);
        let handle = TaskHandle { id: Uuid::new_v4(), rx };
        assert_eq!(handle.try_outcome(), None);

        drop(tx);

        assert_eq!(handle.try_outcome(), Some(dropped()));
    }

    #[test]
    fn unknown_task_is_not_found() {
        assert!(TaskQueue::new().get(Uuid::new_v4()).is_none());
    }
}
