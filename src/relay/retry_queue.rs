// FIFO of quarantined uploads and the loop that drains it

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::models::UploadRequest;
use super::orchestrator::Dispatcher;

/// Not persisted; entries are lost on exit
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: Mutex<VecDeque<UploadRequest>>,
    notify: Notify,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, VecDeque<UploadRequest>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, request: UploadRequest) {
        self.entries().push_back(request);
        self.notify.notify_one();
    }

    /// Put an entry back at the head
    pub fn push_front(&self, request: UploadRequest) {
        self.entries().push_front(request);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<UploadRequest> {
        self.entries().pop_front()
    }

    /// Head of the queue, waiting up to `wait` for one to arrive
    pub async fn pop_timeout(&self, wait: Duration) -> Option<UploadRequest> {
        if let Some(request) = self.pop() {
            return Some(request);
        }
        let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        self.pop()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<UploadRequest> {
        self.entries().iter().cloned().collect()
    }
}

/// Single background drain: pop, cool down, re-dispatch. Never overlaps itself.
pub fn spawn_retry_loop(
    queue: Arc<RetryQueue>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = queue.pop_timeout(interval) => next,
            };
            let Some(request) = next else {
                continue;
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    queue.push_front(request);
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            info!(
                seed = %request.seed_basename,
                artifacts = request.artifacts.len(),
                pending = queue.len(),
                "retrying quarantined upload"
            );
            dispatcher.upload(request).await;
        }
        info!("retry loop stopped");
    })
}
