//! Run accounting and progress events of a catalog crawl

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::catalog::FolderDescriptor;
use crate::catalog::window::DateWindow;
use crate::index::IngestionOutcome;

/// Crawl step a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStage {
    Root,
    Folder,
    Content,
    Write,
}

impl fmt::Display for CrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlStage::Root => "root",
            CrawlStage::Folder => "folder",
            CrawlStage::Content => "content",
            CrawlStage::Write => "write",
        };
        f.write_str(name)
    }
}

/// A non-validation failure kept in the run report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlFailure {
    pub stage: CrawlStage,
    pub folder_id: Option<String>,
    pub window: Option<DateWindow>,
    pub message: String,
}

/// How a content window ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowStatus {
    /// A batch was submitted and reconciled
    Stored(IngestionOutcome),
    /// The listing held no valid records
    NoRecords,
    /// The fetch, decode or write failed
    Failed,
    /// The window was never processed because the run stopped
    Skipped,
}

/// Counters for a single folder
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FolderTally {
    pub folder_id: String,
    pub display_name: String,
    pub collection: String,

    /// Whether the bucket listing of the folder failed
    pub listing_failed: bool,

    pub malformed_buckets: usize,
    pub windows_queued: usize,
    pub windows_completed: usize,
    pub windows_failed: usize,
    pub windows_skipped: usize,

    /// Entries returned by content listings
    pub records_seen: usize,
    pub validation_rejections: usize,

    /// Aggregated batch outcomes; failed batches count as `rejected_error`
    pub ingestion: IngestionOutcome,
}

impl FolderTally {
    fn new(folder: &FolderDescriptor) -> Self {
        Self {
            folder_id: folder.folder_id.clone(),
            display_name: folder.display_name.clone(),
            collection: folder.collection.clone(),
            ..Self::default()
        }
    }

    /// Record how a window ended
    pub fn finish_window(&mut self, status: &WindowStatus) {
        match status {
            WindowStatus::Stored(outcome) => {
                self.windows_completed += 1;
                self.ingestion.absorb(outcome);
            }
            WindowStatus::NoRecords => self.windows_completed += 1,
            WindowStatus::Failed => self.windows_failed += 1,
            WindowStatus::Skipped => self.windows_skipped += 1,
        }
    }
}

/// Sums over every folder of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub folders: usize,
    pub malformed_buckets: usize,
    pub windows_completed: usize,
    pub windows_failed: usize,
    pub windows_skipped: usize,
    pub records_seen: usize,
    pub validation_rejections: usize,
    pub ingestion: IngestionOutcome,
}

/// Outcome of a whole crawl
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Per-folder counters keyed by folder id
    pub folders: BTreeMap<String, FolderTally>,

    /// Every transport, decoding and write failure, in arrival order
    pub failures: Vec<CrawlFailure>,

    /// Whether a shutdown signal stopped the run
    pub cancelled: bool,

    /// Requests never issued and responses discarded after the run stopped
    pub skipped: usize,
}

impl RunReport {
    /// Start the counters of a folder
    pub fn register_folder(&mut self, folder: &FolderDescriptor) {
        self.folders
            .entry(folder.folder_id.clone())
            .or_insert_with(|| FolderTally::new(folder));
    }

    pub fn folder(&self, folder_id: &str) -> Option<&FolderTally> {
        self.folders.get(folder_id)
    }

    /// Counters of a folder, created on first use
    pub fn folder_mut(&mut self, folder: &FolderDescriptor) -> &mut FolderTally {
        self.folders
            .entry(folder.folder_id.clone())
            .or_insert_with(|| FolderTally::new(folder))
    }

    pub fn record_failure(
        &mut self,
        stage: CrawlStage,
        folder_id: Option<&str>,
        window: Option<DateWindow>,
        message: impl Into<String>,
    ) {
        self.failures.push(CrawlFailure {
            stage,
            folder_id: folder_id.map(str::to_string),
            window,
            message: message.into(),
        });
    }

    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals {
            folders: self.folders.len(),
            ..RunTotals::default()
        };
        for tally in self.folders.values() {
            totals.malformed_buckets += tally.malformed_buckets;
            totals.windows_completed += tally.windows_completed;
            totals.windows_failed += tally.windows_failed;
            totals.windows_skipped += tally.windows_skipped;
            totals.records_seen += tally.records_seen;
            totals.validation_rejections += tally.validation_rejections;
            totals.ingestion.absorb(&tally.ingestion);
        }
        totals
    }

    /// Whether the run finished without failures or skipped work
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled && self.skipped == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tally in self.folders.values() {
            writeln!(
                f,
                "{:<6} {:<40} windows {}/{} ({} failed, {} skipped)  records {}  inserted {}  duplicates {}  invalid {}",
                tally.folder_id,
                tally.collection,
                tally.windows_completed,
                tally.windows_queued,
                tally.windows_failed,
                tally.windows_skipped,
                tally.records_seen,
                tally.ingestion.inserted,
                tally.ingestion.rejected_duplicate,
                tally.validation_rejections,
            )?;
        }

        let totals = self.totals();
        writeln!(
            f,
            "Total: {} folders, {} windows completed, {} failed, {} inserted, {} duplicates, {} invalid records",
            totals.folders,
            totals.windows_completed,
            totals.windows_failed,
            totals.ingestion.inserted,
            totals.ingestion.rejected_duplicate,
            totals.validation_rejections,
        )?;

        if self.cancelled {
            writeln!(f, "Run cancelled, {} requests skipped", self.skipped)?;
        }
        for failure in &self.failures {
            write!(f, "[{}]", failure.stage)?;
            if let Some(folder_id) = &failure.folder_id {
                write!(f, " folder {}", folder_id)?;
            }
            if let Some(window) = &failure.window {
                write!(f, " window {}", window)?;
            }
            writeln!(f, ": {}", failure.message)?;
        }
        Ok(())
    }
}

/// Progress notifications sent while a crawl runs
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// The catalog root listed this many folders
    FoldersDiscovered { count: usize },

    /// Content requests were queued for a folder
    WindowsQueued { folder_id: String, count: usize },

    /// A content window reached its final status
    WindowFinished {
        folder_id: String,
        window: DateWindow,
        status: WindowStatus,
    },

    /// The run stopped issuing requests
    Stopping { cancelled: bool },
}
