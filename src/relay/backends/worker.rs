// In-process worker pool behind the TaskQueue seam
//
// Jobs are upload argv serialized as JSON arrays. Each worker runs a job with
// a fixed attempt budget, removes the job's holding directory on success and
// then pauses before taking the next one.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::relay::config::RetryConfig;
use crate::relay::errors::RelayError;
use crate::relay::traits::{TaskQueue, UploadExecutor};

#[derive(Debug, Clone)]
pub struct WorkerPolicy {
    pub attempts: u32,
    /// Pause between attempts of one job
    pub retry_delay: Duration,
    /// Pause after each job
    pub interval: Duration,
    pub concurrency: usize,
}

impl From<&RetryConfig> for WorkerPolicy {
    fn from(retry: &RetryConfig) -> Self {
        Self {
            attempts: retry.worker_attempts.max(1),
            retry_delay: retry.worker_retry_delay(),
            interval: retry.worker_interval(),
            concurrency: retry.worker_concurrency.max(1),
        }
    }
}

pub struct LocalTaskQueue {
    sender: mpsc::UnboundedSender<String>,
}

impl LocalTaskQueue {
    /// Start `policy.concurrency` workers sharing one channel
    pub fn spawn(
        executor: Arc<dyn UploadExecutor>,
        policy: WorkerPolicy,
        cancel: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..policy.concurrency)
            .map(|id| {
                let executor = Arc::clone(&executor);
                let receiver = Arc::clone(&receiver);
                let policy = policy.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    worker_loop(id, executor, receiver, policy, cancel).await;
                })
            })
            .collect();

        (Self { sender }, handles)
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn submit(&self, payload: String) -> Result<(), RelayError> {
        self.sender
            .send(payload)
            .map_err(|_| RelayError::TaskQueue("worker pool has shut down".to_string()))
    }
}

async fn worker_loop(
    id: usize,
    executor: Arc<dyn UploadExecutor>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    policy: WorkerPolicy,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(payload) = job else {
            break;
        };

        if let Err(e) = run_job(executor.as_ref(), &policy, &payload, &cancel).await {
            error!(worker = id, error = %e, "upload job abandoned");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
    info!(worker = id, "worker stopped");
}

/// Run one serialized argv to completion or exhaustion
pub async fn run_job(
    executor: &dyn UploadExecutor,
    policy: &WorkerPolicy,
    payload: &str,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    let argv: Vec<String> = serde_json::from_str(payload)?;

    for attempt in 1..=policy.attempts {
        match executor.execute(&argv).await {
            Ok(()) => {
                info!(attempt, title = job_title(&argv), "upload completed");
                remove_holding_dir(&argv).await;
                return Ok(());
            }
            // Another attempt cannot help; the caller logs the abandoned job
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => {
                warn!(attempt, max = policy.attempts, error = %e, "upload failed, retrying");
            }
        }
        if attempt < policy.attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RelayError::TaskQueue("cancelled during retry".to_string()));
                }
                _ = tokio::time::sleep(policy.retry_delay) => {}
            }
        }
    }

    Err(RelayError::RouteExhausted {
        title: job_title(&argv).to_string(),
        attempts: policy.attempts,
    })
}

fn job_title(argv: &[String]) -> &str {
    argv.iter()
        .find_map(|arg| arg.strip_prefix("--title="))
        .unwrap_or_default()
}

/// argv is `[program, "upload", first_artifact, ...]`
async fn remove_holding_dir(argv: &[String]) {
    let Some(dir) = argv.get(2).and_then(|first| Path::new(first).parent()) else {
        return;
    };
    if dir.as_os_str().is_empty() {
        return;
    }
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => info!(dir = %dir.display(), "removed holding directory"),
        Err(e) => warn!(dir = %dir.display(), error = %e, "could not remove holding directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::ScriptedExecutor;

    fn policy() -> WorkerPolicy {
        WorkerPolicy::from(&RetryConfig::default())
    }

    fn payload_for(dir: &Path) -> String {
        let first = dir.join("01.mp4");
        std::fs::write(&first, b"x").unwrap();
        serde_json::to_string(&vec![
            "biliup".to_string(),
            "upload".to_string(),
            first.to_string_lossy().to_string(),
            "--title=t".to_string(),
        ])
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retries_removes_holding_dir() {
        let root = tempfile::tempdir().unwrap();
        let holding = root.path().join("inaupload").join("t");
        std::fs::create_dir_all(&holding).unwrap();
        let payload = payload_for(&holding);
        let executor = ScriptedExecutor::failing(2);

        run_job(&executor, &policy(), &payload, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(executor.calls().len(), 3);
        assert!(!holding.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempt_budget() {
        let root = tempfile::tempdir().unwrap();
        let payload = payload_for(root.path());
        let executor = ScriptedExecutor::always_failing();

        let err = run_job(&executor, &policy(), &payload, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::RouteExhausted { attempts: 15, .. }));
        assert_eq!(executor.calls().len(), 15);
        assert!(root.path().join("01.mp4").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_uploader_ends_job_at_once() {
        let root = tempfile::tempdir().unwrap();
        let payload = payload_for(root.path());
        let executor = ScriptedExecutor::missing_tool();

        let err = run_job(&executor, &policy(), &payload, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::ToolNotFound(_)));
        assert_eq!(executor.calls().len(), 1);
        assert!(root.path().join("01.mp4").exists());
    }

    #[tokio::test]
    async fn test_bad_payload_is_json_error() {
        let executor = ScriptedExecutor::succeeding();
        let result = run_job(&executor, &policy(), "not json", &CancellationToken::new()).await;
        assert!(matches!(result, Err(RelayError::Json(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_runs_submitted_jobs_and_stops() {
        let root = tempfile::tempdir().unwrap();
        let holding = root.path().join("hold");
        std::fs::create_dir_all(&holding).unwrap();
        let payload = payload_for(&holding);

        let executor = Arc::new(ScriptedExecutor::succeeding());
        let cancel = CancellationToken::new();
        let (queue, handles) = LocalTaskQueue::spawn(executor.clone(), policy(), cancel.clone());

        queue.submit(payload).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(executor.calls().len(), 1);
        assert!(!holding.exists());

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(queue.submit("[]".to_string()).await.is_err());
    }
}
