pub mod relay;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay::backends::{LocalTaskQueue, ProcessExecutor, WorkerPolicy};
use relay::extractors::expand;
use relay::http::HttpPageFetcher;
use relay::{
    spawn_retry_loop, Crawler, Dispatcher, FilterRegistry, JsonLinesSink, RelayConfig, RelayError, RetryQueue,
    UploadExecutor, WatchList, Watcher,
};

/// Poll the watch list and ingest jobs until Ctrl-C.
///
/// Ctrl-C cancels one token shared by the dispatcher, retry loop and workers;
/// an upload cycle already running finishes its current batch first.
pub async fn run(config: RelayConfig) -> Result<(), RelayError> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "no Ctrl-C handler, running until killed"),
        }
    });

    let executor: Arc<dyn UploadExecutor> =
        Arc::new(ProcessExecutor::new(&config.upload.program).with_timeout(config.upload.timeout()));
    let (task_queue, workers) =
        LocalTaskQueue::spawn(Arc::clone(&executor), WorkerPolicy::from(&config.retry), cancel.clone());

    let retry_queue = Arc::new(RetryQueue::new());
    let dispatcher = Arc::new(
        Dispatcher::new(executor, Arc::clone(&retry_queue), config.upload.clone(), config.retry.clone())
            .with_task_queue(Arc::new(task_queue))
            .with_side_table(config.side_table_path.clone())
            .with_cancel(cancel.clone()),
    );
    let retry_loop = spawn_retry_loop(
        retry_queue,
        Arc::clone(&dispatcher),
        config.retry.retry_interval(),
        cancel.clone(),
    );

    let fetcher = Arc::new(HttpPageFetcher::new(&config.network)?);
    let crawler = Crawler::new(fetcher, config.crawl.clone(), config.network.clone());
    let filters = config
        .filters
        .iter()
        .fold(FilterRegistry::builtin(), |registry, (name, filter)| {
            registry.with_filter(name.clone(), filter.clone())
        });
    let sink = JsonLinesSink::new(config.discovery_queue());
    info!(
        watch_list = ?config.watch_list_path,
        discovery_queue = %sink.path().display(),
        ingest_jobs = config.ingest.len(),
        poll_secs = config.poll_interval_secs,
        "bili-relay started"
    );
    let watcher = Watcher::new(crawler, filters, Arc::new(sink));

    let mut ingested = HashSet::new();
    let mut ticker = tokio::time::interval(config.poll_interval());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        poll_watch_list(&watcher, &config).await;
        ingest(&dispatcher, &config, &mut ingested, &cancel).await;
    }

    let _ = retry_loop.await;
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn poll_watch_list(watcher: &Watcher, config: &RelayConfig) {
    let Some(path) = config.watch_list_path.as_deref() else {
        return;
    };
    let mut list = match WatchList::load(path) {
        Ok(list) => list,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "watch list unreadable");
            return;
        }
    };
    if let Err(e) = list.backup_if_stale(path, config.backup_after_days) {
        warn!(error = %e, "watch list backup failed");
    }

    let reports = watcher.poll(&mut list).await;
    if !reports.is_empty() {
        if let Err(e) = list.save(path) {
            warn!(path = %path.display(), error = %e, "could not persist cursors");
        }
    }
}

/// Upload glob matches not handed over before
async fn ingest(
    dispatcher: &Dispatcher,
    config: &RelayConfig,
    ingested: &mut HashSet<PathBuf>,
    cancel: &CancellationToken,
) {
    for job in &config.ingest {
        if cancel.is_cancelled() {
            return;
        }
        let fresh: Vec<PathBuf> = match expand(&job.pattern) {
            Ok(paths) => paths.into_iter().filter(|p| !ingested.contains(p)).collect(),
            Err(e) => {
                warn!(pattern = %job.pattern, error = %e, "ingest job skipped");
                continue;
            }
        };
        if fresh.is_empty() {
            continue;
        }
        ingested.extend(fresh.iter().cloned());

        let mut request = dispatcher
            .request(fresh, job.seed_basename.clone())
            .with_source(job.source.clone())
            .with_description(job.description.clone());
        if let Some(limit) = job.episode_limit {
            request = request.with_episode_limit(limit);
        }
        if let Some(mode) = job.mode {
            request = request.with_mode(mode);
        }

        let outcomes = dispatcher.upload(request).await;
        info!(pattern = %job.pattern, batches = outcomes.len(), "ingest job dispatched");
    }
}
