//! Crawl state machine
//!
//! A run is a queue of [`CrawlRequest`]s and a set of in-flight steps. Each
//! completed fetch is dispatched on the request it answers: the root response
//! queues one listing per folder, a folder listing queues one content request
//! per date window, and a content listing becomes a batch for the sink.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::rng;
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::config::CrawlConfig;
use crate::catalog::error::{CrawlError, FetchError};
use crate::catalog::fetcher::{FetchResponse, PageFetcher, PageRequest};
use crate::catalog::report::{CrawlEvent, CrawlStage, RunReport, WindowStatus};
use crate::catalog::window::{DateBucket, DateWindow};
use crate::catalog::{FolderDescriptor, parse_root, wire};
use crate::error::{Error, Result};
use crate::index::{DocumentStore, IngestionOutcome, IngestionSink, SinkError, StoredDocument};
use crate::record::{FieldRules, normalize};

/// A fetch waiting to be issued, tagged with the context its response needs
enum CrawlRequest {
    Root,
    Folder(Arc<FolderDescriptor>),
    Content {
        folder: Arc<FolderDescriptor>,
        window: DateWindow,
    },
}

impl CrawlRequest {
    /// Account for a request that will never be processed
    fn skip(self, report: &mut RunReport) {
        report.skipped += 1;
        if let CrawlRequest::Content { folder, .. } = self {
            report.folder_mut(&folder).finish_window(&WindowStatus::Skipped);
        }
    }
}

/// Validated documents of one content window
struct Batch {
    folder: Arc<FolderDescriptor>,
    window: DateWindow,
    documents: Vec<StoredDocument>,
}

/// A completed unit of in-flight work
enum Step {
    Fetched {
        request: CrawlRequest,
        url: String,
        result: std::result::Result<FetchResponse, FetchError>,
    },
    Ingested {
        folder: Arc<FolderDescriptor>,
        window: DateWindow,
        result: std::result::Result<IngestionOutcome, SinkError>,
    },
}

/// Why a run stopped issuing requests
enum StopReason {
    Cancelled,
    StoreUnavailable {
        consecutive_failures: usize,
        last_error: String,
    },
}

#[derive(Default)]
struct WriteHealth {
    consecutive_failures: usize,
    last_error: String,
}

/// Crawls the catalog and ingests every content window
pub struct Orchestrator<F, S> {
    config: CrawlConfig,
    rules: FieldRules,
    fetcher: F,
    sink: IngestionSink<S>,
    events: Option<mpsc::Sender<CrawlEvent>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<F: PageFetcher, S: DocumentStore> Orchestrator<F, S> {
    /// Create an orchestrator validating records with the gazette rules
    pub fn new(config: CrawlConfig, fetcher: F, store: S) -> Self {
        Self {
            config,
            rules: FieldRules::gazette(),
            fetcher,
            sink: IngestionSink::new(store),
            events: None,
            shutdown: None,
        }
    }

    /// Validate records with `rules` instead
    pub fn with_rules(mut self, rules: FieldRules) -> Self {
        self.rules = rules;
        self
    }

    /// Send progress events to `events`
    pub fn with_events(mut self, events: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop issuing requests once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn sink(&self) -> &IngestionSink<S> {
        &self.sink
    }

    /// Crawl the whole catalog
    ///
    /// Failures of a folder or window are recorded in the report and never
    /// stop their siblings. The run itself fails when the catalog root cannot
    /// be read, or with [`Error::StoreUnavailable`] once
    /// `max_consecutive_write_failures` batches in a row could not be
    /// written.
    #[instrument(skip(self), fields(origin = %self.config.origin))]
    pub async fn run(&self) -> Result<RunReport> {
        let catalog_url = self.config.catalog_url()?.to_string();
        let request_url = self.config.request_url()?.to_string();

        let mut shutdown = self.shutdown.clone();
        let mut queue = VecDeque::from([CrawlRequest::Root]);
        let mut in_flight: FuturesUnordered<LocalBoxFuture<'_, Step>> = FuturesUnordered::new();
        let mut report = RunReport::default();
        let mut health = WriteHealth::default();
        let mut stop: Option<StopReason> = None;

        loop {
            if stop.is_none() {
                while in_flight.len() < self.config.max_in_flight {
                    let Some(request) = queue.pop_front() else {
                        break;
                    };
                    in_flight.push(self.dispatch(request, &catalog_url, &request_url));
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let step = tokio::select! {
                step = in_flight.next() => step,
                _ = shutdown_requested(&mut shutdown), if stop.is_none() => {
                    info!(
                        in_flight = in_flight.len(),
                        queued = queue.len(),
                        "Shutdown requested, draining in-flight work"
                    );
                    report.cancelled = true;
                    stop = Some(StopReason::Cancelled);
                    self.emit(CrawlEvent::Stopping { cancelled: true }).await;
                    continue;
                }
            };
            let Some(step) = step else {
                break;
            };

            match step {
                Step::Fetched { request, .. } if stop.is_some() => {
                    debug!("Discarding response that arrived after the run stopped");
                    request.skip(&mut report);
                }
                Step::Fetched {
                    request,
                    url,
                    result,
                } => {
                    if let Some(batch) = self
                        .on_fetched(request, &url, result, &mut queue, &mut report)
                        .await?
                    {
                        in_flight.push(self.ingest(batch));
                    }
                }
                Step::Ingested {
                    folder,
                    window,
                    result,
                } => {
                    self.on_ingested(folder, window, result, &mut report, &mut health)
                        .await;

                    if stop.is_none()
                        && health.consecutive_failures >= self.config.max_consecutive_write_failures
                    {
                        error!(
                            consecutive_failures = health.consecutive_failures,
                            last_error = %health.last_error,
                            "Store keeps failing, stopping the run"
                        );
                        stop = Some(StopReason::StoreUnavailable {
                            consecutive_failures: health.consecutive_failures,
                            last_error: health.last_error.clone(),
                        });
                        self.emit(CrawlEvent::Stopping { cancelled: false }).await;
                    }
                }
            }
        }

        for request in queue.drain(..) {
            request.skip(&mut report);
        }

        let totals = report.totals();
        info!(
            folders = totals.folders,
            windows_completed = totals.windows_completed,
            windows_failed = totals.windows_failed,
            inserted = totals.ingestion.inserted,
            rejected_duplicate = totals.ingestion.rejected_duplicate,
            validation_rejections = totals.validation_rejections,
            skipped = report.skipped,
            "Crawl finished"
        );

        match stop {
            Some(StopReason::StoreUnavailable {
                consecutive_failures,
                last_error,
            }) => Err(Error::StoreUnavailable {
                consecutive_failures,
                last_error,
                report: Box::new(report),
            }),
            Some(StopReason::Cancelled) | None => Ok(report),
        }
    }

    fn dispatch<'a>(
        &'a self,
        request: CrawlRequest,
        catalog_url: &str,
        request_url: &str,
    ) -> LocalBoxFuture<'a, Step> {
        let page = match &request {
            CrawlRequest::Root => PageRequest::get(catalog_url),
            CrawlRequest::Folder(folder) => wire::folder_request(request_url, &folder.folder_id),
            CrawlRequest::Content { folder, window } => {
                wire::content_request(request_url, &folder.folder_id, window)
            }
        };

        async move {
            let result = self.fetcher.fetch(&page).await;
            Step::Fetched {
                request,
                url: page.url,
                result,
            }
        }
        .boxed_local()
    }

    fn ingest(&self, batch: Batch) -> LocalBoxFuture<'_, Step> {
        async move {
            let result = self
                .sink
                .insert_batch(&batch.folder.collection, batch.documents)
                .await;
            Step::Ingested {
                folder: batch.folder,
                window: batch.window,
                result,
            }
        }
        .boxed_local()
    }

    async fn on_fetched(
        &self,
        request: CrawlRequest,
        url: &str,
        result: std::result::Result<FetchResponse, FetchError>,
        queue: &mut VecDeque<CrawlRequest>,
        report: &mut RunReport,
    ) -> Result<Option<Batch>> {
        let response = result.map_err(|source| CrawlError::Fetch {
            url: url.to_string(),
            source,
        });

        match request {
            CrawlRequest::Root => {
                let folders = match response.and_then(|response| parse_root(&self.config, url, &response)) {
                    Ok(folders) => folders,
                    Err(e) => {
                        error!(error = %e, "Catalog root unavailable");
                        return Err(e.into());
                    }
                };

                info!(folders = folders.len(), "Catalog root listed");
                let count = folders.len();
                for folder in folders {
                    report.register_folder(&folder);
                    queue.push_back(CrawlRequest::Folder(Arc::new(folder)));
                }
                self.emit(CrawlEvent::FoldersDiscovered { count }).await;
                Ok(None)
            }
            CrawlRequest::Folder(folder) => {
                self.on_folder_listing(folder, url, response, queue, report)
                    .await;
                Ok(None)
            }
            CrawlRequest::Content { folder, window } => Ok(self
                .on_content_listing(folder, window, url, response, report)
                .await),
        }
    }

    #[instrument(skip_all, fields(folder = %folder.folder_id))]
    async fn on_folder_listing(
        &self,
        folder: Arc<FolderDescriptor>,
        url: &str,
        response: std::result::Result<FetchResponse, CrawlError>,
        queue: &mut VecDeque<CrawlRequest>,
        report: &mut RunReport,
    ) {
        let entries = match response.and_then(|response| wire::decode_listing(url, &response)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Folder listing failed");
                report.folder_mut(&folder).listing_failed = true;
                report.record_failure(CrawlStage::Folder, Some(&folder.folder_id), None, e.to_string());
                return;
            }
        };

        let tally = report.folder_mut(&folder);
        let mut buckets = Vec::with_capacity(entries.len());
        for entry in &entries {
            match DateBucket::from_listing(entry) {
                Ok(bucket) => buckets.push(bucket),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed date bucket");
                    tally.malformed_buckets += 1;
                }
            }
        }
        buckets.sort();
        buckets.dedup();

        if let Some(sampling) = &self.config.bucket_sampling {
            let keep = sampling.sample_size(buckets.len());
            buckets.shuffle(&mut rng());
            buckets.truncate(keep);
            buckets.sort();
            debug!(keep, "Sampled date buckets");
        }

        tally.windows_queued += buckets.len();
        info!(windows = buckets.len(), "Queued content windows");
        for bucket in &buckets {
            queue.push_back(CrawlRequest::Content {
                folder: Arc::clone(&folder),
                window: bucket.window(),
            });
        }

        self.emit(CrawlEvent::WindowsQueued {
            folder_id: folder.folder_id.clone(),
            count: buckets.len(),
        })
        .await;
    }

    #[instrument(skip_all, fields(folder = %folder.folder_id, window = %window))]
    async fn on_content_listing(
        &self,
        folder: Arc<FolderDescriptor>,
        window: DateWindow,
        url: &str,
        response: std::result::Result<FetchResponse, CrawlError>,
        report: &mut RunReport,
    ) -> Option<Batch> {
        let entries = match response.and_then(|response| wire::decode_listing(url, &response)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Content listing failed");
                report.record_failure(
                    CrawlStage::Content,
                    Some(&folder.folder_id),
                    Some(window),
                    e.to_string(),
                );
                self.finish_window(report, &folder, window, WindowStatus::Failed)
                    .await;
                return None;
            }
        };

        let tally = report.folder_mut(&folder);
        tally.records_seen += entries.len();

        let mut documents = Vec::with_capacity(entries.len());
        for entry in entries {
            let raw = match entry {
                Value::Object(raw) => raw,
                other => {
                    debug!(entry = %other, "Skipping content entry that is not an object");
                    tally.validation_rejections += 1;
                    continue;
                }
            };
            match normalize(&raw, &self.rules) {
                Ok(record) => documents.push(StoredDocument::new(folder.collection.as_str(), record)),
                Err(e) => {
                    debug!(field = e.field(), error = %e, "Record rejected");
                    tally.validation_rejections += 1;
                }
            }
        }

        if documents.is_empty() {
            self.finish_window(report, &folder, window, WindowStatus::NoRecords)
                .await;
            return None;
        }

        debug!(documents = documents.len(), "Submitting batch");
        Some(Batch {
            folder,
            window,
            documents,
        })
    }

    async fn on_ingested(
        &self,
        folder: Arc<FolderDescriptor>,
        window: DateWindow,
        result: std::result::Result<IngestionOutcome, SinkError>,
        report: &mut RunReport,
        health: &mut WriteHealth,
    ) {
        let status = match result {
            Ok(outcome) => {
                health.consecutive_failures = 0;
                WindowStatus::Stored(outcome)
            }
            Err(SinkError::DuplicateBatch { outcome, .. }) => {
                health.consecutive_failures = 0;
                debug!(
                    folder = %folder.folder_id,
                    %window,
                    inserted = outcome.inserted,
                    rejected_duplicate = outcome.rejected_duplicate,
                    "Batch contained stored documents"
                );
                WindowStatus::Stored(outcome)
            }
            Err(SinkError::WriteFailed {
                source,
                attempted_documents,
            }) => {
                health.consecutive_failures += 1;
                health.last_error = source.to_string();
                warn!(
                    folder = %folder.folder_id,
                    %window,
                    documents = attempted_documents.len(),
                    error = %source,
                    "Batch write failed"
                );

                let attempted = attempted_documents.len();
                report.folder_mut(&folder).ingestion.absorb(&IngestionOutcome {
                    attempted,
                    rejected_error: attempted,
                    ..IngestionOutcome::default()
                });
                report.record_failure(
                    CrawlStage::Write,
                    Some(&folder.folder_id),
                    Some(window),
                    source.to_string(),
                );
                WindowStatus::Failed
            }
            Err(e @ SinkError::EmptyBatch { .. }) => {
                report.record_failure(
                    CrawlStage::Write,
                    Some(&folder.folder_id),
                    Some(window),
                    e.to_string(),
                );
                WindowStatus::Failed
            }
        };

        self.finish_window(report, &folder, window, status).await;
    }

    async fn finish_window(
        &self,
        report: &mut RunReport,
        folder: &FolderDescriptor,
        window: DateWindow,
        status: WindowStatus,
    ) {
        report.folder_mut(folder).finish_window(&status);
        self.emit(CrawlEvent::WindowFinished {
            folder_id: folder.folder_id.clone(),
            window,
            status,
        })
        .await;
    }

    async fn emit(&self, event: CrawlEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                debug!("Progress receiver dropped");
            }
        }
    }
}

/// Resolve once `shutdown` holds `true`; never when there is no signal
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(receiver) = shutdown {
        if receiver.wait_for(|stop| *stop).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}
