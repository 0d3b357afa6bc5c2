//! Fixed-size worker pool for file jobs.
//!
//! Jobs go through an unbounded queue shared by `size` workers. Closing the
//! queue lets the workers drain what is already queued and exit.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// A unit of work run by the pool.
pub type Job = BoxFuture<'static, ()>;

/// Error returned when submitting to a pool that no longer accepts jobs.
#[derive(Debug, thiserror::Error)]
#[error("Worker pool is shut down")]
pub struct PoolClosed;

/// How [`WorkerPool::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolShutdown {
    /// All workers finished within the shutdown timeout.
    Graceful,
    /// Workers were aborted after the timeout and exited within the grace period.
    Forced,
    /// Aborted workers did not exit within the grace period.
    Abandoned,
}

pub struct WorkerPool {
    sender: Mutex<Option<UnboundedSender<Job>>>,
    workers: tokio::sync::Mutex<JoinSet<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current runtime.
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let queue = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = JoinSet::new();
        for id in 0..size.max(1) {
            workers.spawn(run_worker(id, Arc::clone(&queue)));
        }

        Self {
            sender: Mutex::new(Some(tx)),
            workers: tokio::sync::Mutex::new(workers),
        }
    }

    /// Queue a job. Fails once shutdown has started.
    pub fn execute(&self, job: Job) -> Result<(), PoolClosed> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| PoolClosed),
            None => Err(PoolClosed),
        }
    }

    /// Close the queue and wait for the workers.
    ///
    /// Waits up to `timeout` for queued jobs to drain, then aborts the
    /// workers and waits up to `grace` for them to exit. Later calls find no
    /// workers and return `Graceful`.
    pub async fn shutdown(&self, timeout: Duration, grace: Duration) -> PoolShutdown {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let mut workers = std::mem::take(&mut *self.workers.lock().await);
        if workers.is_empty() {
            return PoolShutdown::Graceful;
        }

        if tokio::time::timeout(timeout, drain(&mut workers))
            .await
            .is_ok()
        {
            debug!("Worker pool drained");
            return PoolShutdown::Graceful;
        }

        warn!(
            timeout_ms = timeout.as_millis() as u64,
            remaining = workers.len(),
            "Worker pool did not drain in time, aborting workers"
        );
        workers.abort_all();

        match tokio::time::timeout(grace, drain(&mut workers)).await {
            Ok(_) => PoolShutdown::Forced,
            Err(_) => {
                error!(
                    grace_ms = grace.as_millis() as u64,
                    "Worker pool did not terminate after abort"
                );
                PoolShutdown::Abandoned
            }
        }
    }
}

/// Wait for every worker still in the set. Finished workers leave the set.
async fn drain(workers: &mut JoinSet<()>) {
    while workers.join_next().await.is_some() {}
}

async fn run_worker(id: usize, queue: Arc<tokio::sync::Mutex<UnboundedReceiver<Job>>>) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
            error!(worker = id, panic = %panic_message(&*panic), "Job panicked");
        }
    }
    debug!(worker = id, "Worker exiting");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LONG: Duration = Duration::from_secs(5);
    const SHORT: Duration = Duration::from_millis(100);

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_queued_jobs_drain_on_shutdown() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            pool.execute(counting_job(&counter)).unwrap();
        }

        assert_eq!(pool.shutdown(LONG, SHORT).await, PoolShutdown::Graceful);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_execute_after_shutdown_fails() {
        let pool = WorkerPool::new(1);
        pool.shutdown(LONG, SHORT).await;

        let counter = Arc::new(AtomicUsize::new(0));
        assert!(pool.execute(counting_job(&counter)).is_err());
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_worker() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.execute(async { panic!("boom"); }.boxed()).unwrap();
        pool.execute(counting_job(&counter)).unwrap();

        assert_eq!(pool.shutdown(LONG, SHORT).await, PoolShutdown::Graceful);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_job_is_aborted_after_timeout() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let finished = Arc::clone(&counter);

        pool.execute(
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        )
        .unwrap();

        let started = std::time::Instant::now();
        assert_eq!(pool.shutdown(SHORT, SHORT).await, PoolShutdown::Forced);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forced_shutdown_with_idle_workers() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let finished = Arc::clone(&counter);

        pool.execute(
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The idle worker exits as soon as the queue closes; only the stuck
        // one is aborted.
        assert_eq!(pool.shutdown(SHORT, SHORT).await, PoolShutdown::Forced);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pool.shutdown(SHORT, SHORT).await, PoolShutdown::Graceful);
    }

    #[tokio::test]
    async fn test_second_shutdown_returns_immediately() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.shutdown(LONG, SHORT).await, PoolShutdown::Graceful);
        assert_eq!(pool.shutdown(LONG, SHORT).await, PoolShutdown::Graceful);
    }
}
