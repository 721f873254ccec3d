use std::sync::Arc;

use tokio::sync::Notify;

/// Wake-up channel from job submission to idle workers.
///
/// A wake-up sent while every worker is busy is kept until the next worker
/// goes idle, so a submission is never missed. Workers still re-check the
/// queue on their poll interval, which covers jobs enqueued by another
/// process.
#[derive(Clone, Default)]
pub struct WorkSignal {
    notify: Arc<Notify>,
}

impl WorkSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tell one idle worker that a job was enqueued.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
