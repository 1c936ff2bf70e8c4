// Dispatcher - executes or delegates planned upload batches
//
// Strategy:
// 1. Plan the request into batches (side table re-read per call)
// 2. Delegated: relocate into a holding dir, snapshot the command, submit
//    to the task queue; fall back to inline if any of that fails
// 3. Inline: run the command, rotating routes on failure, until success
//    or the retry ceiling; then quarantine and requeue
// 4. Pause after every batch; stop between batches once cancelled

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::command::UploadCommand;
use super::config::{RetryConfig, UploadConfig};
use super::errors::RelayError;
use super::models::{AttemptState, DispatchAttempt, DispatchMode, DispatchOutcome, UploadBatch, UploadRequest};
use super::planner::{BatchPlanner, SideTable};
use super::retry_queue::RetryQueue;
use super::traits::{TaskQueue, UploadExecutor};
use super::utils;

pub struct Dispatcher {
    executor: Arc<dyn UploadExecutor>,
    task_queue: Option<Arc<dyn TaskQueue>>,
    retry_queue: Arc<RetryQueue>,
    upload: UploadConfig,
    retry: RetryConfig,
    side_table_path: Option<PathBuf>,
    /// Identities of running inline attempts (single-flight mode)
    in_flight: Mutex<HashSet<String>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        executor: Arc<dyn UploadExecutor>,
        retry_queue: Arc<RetryQueue>,
        upload: UploadConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            executor,
            task_queue: None,
            retry_queue,
            upload,
            retry,
            side_table_path: None,
            in_flight: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_task_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.task_queue = Some(queue);
        self
    }

    pub fn with_side_table(mut self, path: Option<PathBuf>) -> Self {
        self.side_table_path = path;
        self
    }

    /// Once `cancel` fires no further batch starts and retry pauses end early
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry_queue
    }

    /// Request with this dispatcher's defaults
    pub fn request(&self, artifacts: Vec<PathBuf>, seed_basename: impl Into<String>) -> UploadRequest {
        UploadRequest::new(artifacts, seed_basename)
            .with_episode_limit(self.upload.episode_limit)
            .with_route(self.upload.default_route.clone())
            .with_mode(self.upload.mode)
    }

    /// Plan and dispatch every batch of `request`
    pub async fn upload(&self, request: UploadRequest) -> Vec<DispatchOutcome> {
        let side_table = match SideTable::load_optional(self.side_table_path.as_deref()) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "side table unreadable, using placeholders");
                SideTable::empty()
            }
        };
        let batches = BatchPlanner::new(&self.upload, side_table).plan(&request);

        let planned = batches.len();
        let mut outcomes = Vec::with_capacity(planned);
        for batch in batches {
            if self.cancel.is_cancelled() {
                warn!(
                    seed = %request.seed_basename,
                    skipped = planned - outcomes.len(),
                    "shutdown requested, remaining batches left in place"
                );
                break;
            }
            outcomes.push(self.dispatch(batch, &request).await);
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.retry.upload_interval()) => {}
            }
        }
        outcomes
    }

    /// One batch to a terminal outcome; never fails
    pub async fn dispatch(&self, mut batch: UploadBatch, request: &UploadRequest) -> DispatchOutcome {
        if request.mode == DispatchMode::Delegated {
            match self.delegate(&mut batch).await {
                Ok(outcome) => return outcome,
                Err(e) => warn!(title = %batch.title, error = %e, "delegation failed, uploading inline"),
            }
        }
        self.run_inline(batch, request).await
    }

    /// Relocates `batch` in place so a failed hand-off continues from wherever
    /// each artifact actually ended up
    async fn delegate(&self, batch: &mut UploadBatch) -> Result<DispatchOutcome, RelayError> {
        let queue = self
            .task_queue
            .as_ref()
            .ok_or_else(|| RelayError::TaskQueue("no task queue configured".to_string()))?;

        let first = batch
            .artifacts
            .first()
            .ok_or_else(|| RelayError::Config("batch without artifacts".to_string()))?;
        let holding_dir = first
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join(&self.upload.holding_subdir)
            .join(batch.dir_name());

        utils::relocate(&mut batch.artifacts, &holding_dir).await?;
        if batch.artifacts.is_empty() {
            info!(title = %batch.title, "nothing left to delegate");
            return Ok(DispatchOutcome::Succeeded);
        }

        let command = UploadCommand::for_batch(batch, &self.upload);
        utils::write_cmd_snapshot(&holding_dir, &command.args()).await?;
        queue.submit(command.to_json()?).await?;

        info!(
            title = %batch.title,
            queue = queue.name(),
            dir = %holding_dir.display(),
            "upload delegated"
        );
        Ok(DispatchOutcome::Delegated { holding_dir })
    }

    async fn run_inline(&self, batch: UploadBatch, request: &UploadRequest) -> DispatchOutcome {
        let identity = batch.identity().to_string();
        if self.upload.single_flight && !self.claim(&identity) {
            warn!(title = %identity, "identical batch already running, requeueing");
            self.retry_queue.push(requeued(request, &batch, &batch.route));
            return DispatchOutcome::Busy;
        }

        let outcome = self.retry_inline(DispatchAttempt::new(batch), request).await;

        if self.upload.single_flight {
            self.release(&identity);
        }
        outcome
    }

    async fn retry_inline(&self, mut attempt: DispatchAttempt, request: &UploadRequest) -> DispatchOutcome {
        loop {
            attempt.state = AttemptState::Running;
            let argv = UploadCommand::for_batch(&attempt.batch, &self.upload)
                .with_route(attempt.route.clone())
                .args();

            let Err(e) = self.executor.execute(&argv).await else {
                attempt.state = AttemptState::Succeeded;
                info!(title = %attempt.batch.title, route = %attempt.route, retries = attempt.retry_count, "upload succeeded");
                return DispatchOutcome::Succeeded;
            };

            attempt.batch.artifacts = utils::still_present(&attempt.batch.artifacts);
            if attempt.batch.artifacts.is_empty() {
                attempt.state = AttemptState::Succeeded;
                info!(title = %attempt.batch.title, "no artifacts left after failed attempt");
                return DispatchOutcome::Succeeded;
            }

            if !e.is_recoverable() {
                error!(title = %attempt.batch.title, error = %e, "upload cannot succeed on any route");
                return self.quarantine(attempt, request).await;
            }

            attempt.retry_count += 1;
            attempt.route = self.upload.route_for(attempt.retry_count).to_string();
            warn!(
                title = %attempt.batch.title,
                retry = attempt.retry_count,
                route = %attempt.route,
                remaining = attempt.batch.artifacts.len(),
                error = %e,
                "upload failed"
            );

            if attempt.retry_count >= self.retry.max_retries {
                return self.quarantine(attempt, request).await;
            }
            attempt.state = AttemptState::Retrying;
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(title = %attempt.batch.title, "shutdown requested, quarantining early");
                    return self.quarantine(attempt, request).await;
                }
                _ = tokio::time::sleep(self.retry.retry_interval()) => {}
            }
        }
    }

    async fn quarantine(&self, mut attempt: DispatchAttempt, request: &UploadRequest) -> DispatchOutcome {
        let exhausted = RelayError::RouteExhausted {
            title: attempt.batch.title.clone(),
            attempts: attempt.retry_count,
        };
        let quarantine_dir = self.upload.quarantine_root.join(attempt.batch.dir_name());

        if let Err(e) = utils::relocate(&mut attempt.batch.artifacts, &quarantine_dir).await {
            error!(dir = %quarantine_dir.display(), error = %e, "could not quarantine every artifact, requeueing where they are");
        }
        let argv = UploadCommand::for_batch(&attempt.batch, &self.upload)
            .with_route(attempt.route.clone())
            .args();
        if let Err(e) = utils::write_cmd_snapshot(&quarantine_dir, &argv).await {
            warn!(error = %e, "could not write command snapshot");
        }

        let remaining = attempt.batch.artifacts.len();
        self.retry_queue
            .push(requeued(request, &attempt.batch, &attempt.route));
        attempt.state = AttemptState::Quarantined;
        warn!(
            error = %exhausted,
            dir = %quarantine_dir.display(),
            remaining,
            "batch quarantined and requeued"
        );
        DispatchOutcome::Quarantined {
            quarantine_dir,
            remaining,
        }
    }

    fn claim(&self, identity: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity.to_string())
    }

    fn release(&self, identity: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identity);
    }
}

/// Retry-queue entry for what is left of a batch; re-plans under the same title
fn requeued(request: &UploadRequest, batch: &UploadBatch, route: &str) -> UploadRequest {
    UploadRequest {
        artifacts: batch.artifacts.clone(),
        route: route.to_string(),
        batch_offset: batch.index,
        ..request.clone()
    }
}
