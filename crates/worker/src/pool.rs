//! A fixed set of worker tasks sharing one executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::executor::JobExecutor;
use crate::signal::WorkSignal;

pub struct WorkerPool {
    executor: Arc<JobExecutor>,
    signal: WorkSignal,
}

impl WorkerPool {
    pub fn new(executor: JobExecutor, signal: WorkSignal) -> Self {
        Self {
            executor: Arc::new(executor),
            signal,
        }
    }

    /// Start `concurrency` workers. They stop claiming once `cancel` fires;
    /// jobs already claimed run to completion.
    pub fn spawn(self, cancel: CancellationToken) -> PoolHandle {
        let concurrency = self.executor.config().concurrency;
        let poll_interval = self.executor.config().poll_interval;

        let mut tasks = JoinSet::new();
        for worker_id in 0..concurrency {
            tasks.spawn(worker_loop(
                worker_id,
                Arc::clone(&self.executor),
                self.signal.clone(),
                poll_interval,
                cancel.clone(),
            ));
        }

        tracing::info!(
            concurrency,
            poll_interval_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Worker pool started",
        );

        PoolHandle { tasks, cancel }
    }
}

pub struct PoolHandle {
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl PoolHandle {
    /// Stop claiming new jobs and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    executor: Arc<JobExecutor>,
    signal: WorkSignal,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    tracing::debug!(worker_id, "Worker started");

    while !cancel.is_cancelled() {
        match executor.run_next().await {
            // Keep draining while there is work.
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => tracing::error!(worker_id, error = %e, "Job execution failed"),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = signal.notified() => {}
            () = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}
