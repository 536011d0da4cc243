//! Long-running tasks (registration, training, attendance sessions) on
//! dedicated OS threads, with cooperative cancellation and a typed result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("failed to spawn job thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("job {0} ended without a result")]
    Panicked(String),
}

/// Shared stop flag, polled by the task once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a spawned job.
pub struct JobHandle<T> {
    name: String,
    cancel: CancelToken,
    reply: oneshot::Receiver<T>,
}

impl<T: Send + 'static> JobHandle<T> {
    /// Run `task` on a named thread. The task receives the job's cancel token.
    pub fn spawn<F>(name: &str, task: F) -> Result<Self, JobError>
    where
        F: FnOnce(CancelToken) -> T + Send + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let (tx, rx) = oneshot::channel();
        let thread_name = name.to_string();

        std::thread::Builder::new()
            .name(format!("rollcall-{name}"))
            .spawn(move || {
                tracing::debug!(job = %thread_name, "job started");
                let result = task(token);
                if tx.send(result).is_err() {
                    tracing::debug!(job = %thread_name, "job result dropped; handle gone");
                }
                tracing::debug!(job = %thread_name, "job finished");
            })?;

        Ok(Self {
            name: name.to_string(),
            cancel,
            reply: rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the task to stop at its next poll.
    pub fn cancel(&self) {
        tracing::info!(job = %self.name, "cancel requested");
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Await the task's result.
    pub async fn wait(self) -> Result<T, JobError> {
        self.reply.await.map_err(|_| JobError::Panicked(self.name))
    }

    /// Block the current (non-async) thread until the task finishes.
    pub fn blocking_wait(self) -> Result<T, JobError> {
        self.reply
            .blocking_recv()
            .map_err(|_| JobError::Panicked(self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_job_returns_result() {
        let handle = JobHandle::spawn("sum", |_| (1..=4).sum::<u32>()).unwrap();
        assert_eq!(handle.name(), "sum");
        assert_eq!(handle.blocking_wait().unwrap(), 10);
    }

    #[test]
    fn test_cancel_stops_polling_task() {
        let handle = JobHandle::spawn("spin", |cancel| {
            let mut iterations = 0u64;
            while !cancel.is_cancelled() {
                iterations += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            iterations
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        handle.cancel();
        assert!(handle.blocking_wait().is_ok());
    }

    #[test]
    fn test_panicking_job_reports_error() {
        let handle = JobHandle::spawn("boom", |_| -> u32 { panic!("boom") }).unwrap();
        let err = handle.blocking_wait().unwrap_err();
        assert!(matches!(err, JobError::Panicked(name) if name == "boom"));
    }

    #[test]
    fn test_token_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }
}
