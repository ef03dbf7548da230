//! Fixed-size worker pool with a bounded admission queue.
//!
//! At most `workers` requests execute concurrently; up to `queue` more wait
//! in FIFO order. A request arriving with the queue full is rejected
//! immediately with [`ExecError::Busy`] instead of piling up latency.
//!
//! Implemented as two semaphores: admission slots (`workers + queue`) are
//! try-acquired, worker permits are awaited. Tokio semaphores hand out
//! permits in FIFO order, which gives the queue its ordering.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::ExecError;

/// Serializes engine invocations behind a bounded queue.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Arc<Semaphore>,
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool with `workers` concurrent executions and `queue`
    /// waiting slots. A zero worker count is bumped to one.
    #[must_use]
    pub fn new(workers: usize, queue: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers: Arc::new(Semaphore::new(workers)),
            slots: Arc::new(Semaphore::new(workers + queue)),
        }
    }

    /// Runs `task` on a pool worker, waiting in the queue if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Busy`] when the queue is full.
    pub async fn run<F, T>(&self, task: F) -> std::result::Result<T, ExecError>
    where
        F: Future<Output = T>,
    {
        let Ok(_slot) = self.slots.clone().try_acquire_owned() else {
            warn!("worker queue full, rejecting request");
            return Err(ExecError::Busy);
        };
        let _worker = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExecError::Internal("worker pool closed".to_string()))?;
        Ok(task.await)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::time::sleep;

    use super::*;

    #[tokio::test]
    async fn runs_tasks_and_returns_their_output() {
        let pool = WorkerPool::new(2, 2);
        let out = pool.run(async { 40 + 2 }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn rejects_when_queue_overflows() {
        let pool = Arc::new(WorkerPool::new(1, 1));

        // occupy the single worker
        let (release_worker, gate) = oneshot::channel::<()>();
        let busy_pool = pool.clone();
        let running = tokio::spawn(async move {
            busy_pool
                .run(async {
                    let _ = gate.await;
                    1
                })
                .await
        });
        sleep(Duration::from_millis(20)).await;

        // occupy the single queue slot
        let (release_queued, gate) = oneshot::channel::<()>();
        let queued_pool = pool.clone();
        let queued = tokio::spawn(async move {
            queued_pool
                .run(async {
                    let _ = gate.await;
                    2
                })
                .await
        });
        sleep(Duration::from_millis(20)).await;

        // both slots taken: the next submission is busy
        assert_eq!(pool.run(async { 3 }).await, Err(ExecError::Busy));

        // draining the pool lets both admitted tasks finish
        release_worker.send(()).unwrap();
        release_queued.send(()).unwrap();
        assert_eq!(running.await.unwrap().unwrap(), 1);
        assert_eq!(queued.await.unwrap().unwrap(), 2);

        // and capacity is available again
        assert_eq!(pool.run(async { 4 }).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn zero_workers_still_makes_progress() {
        let pool = WorkerPool::new(0, 0);
        assert_eq!(pool.run(async { 7 }).await.unwrap(), 7);
    }
}
