//! In-memory doubles for the fetcher and the document store

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::catalog::{FetchError, FetchResponse, PageFetcher, PageRequest};
use crate::index::{DocumentStore, StoreError, StoredDocument};
use crate::record::GazetteId;

#[derive(Clone)]
enum Reply {
    Respond(FetchResponse),
    Fail(String),
}

#[derive(Clone)]
struct Route {
    reply: Reply,
    delay: Option<Duration>,
}

/// Fetcher answering from a table of scripted replies
///
/// Requests are keyed as `"<METHOD> <url>"`, or for catalog listings as
/// `"<hddQueryType>:<cole>"` with `":<txtDatePublishFrom>"` appended when the
/// request carries a date window. Unknown keys answer `404` with no body.
/// Clones share routes and the request log.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<PageRequest>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, key: impl Into<String>, response: FetchResponse) -> Self {
        self.set(key.into(), Reply::Respond(response));
        self
    }

    /// Fail requests for `key` with a transport error
    pub fn fail(self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.set(key.into(), Reply::Fail(message.into()));
        self
    }

    /// Hold the reply for `key` for `delay`
    pub fn delay(self, key: impl Into<String>, delay: Duration) -> Self {
        let key: String = key.into();
        if let Some(route) = self.routes.lock().unwrap().get_mut(&key) {
            route.delay = Some(delay);
        }
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn set(&self, key: String, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .insert(key, Route { reply, delay: None });
    }

    fn key(request: &PageRequest) -> String {
        match request.form_value("hddQueryType") {
            Some(query) => {
                let folder = request.form_value("cole").unwrap_or_default();
                match request.form_value("txtDatePublishFrom") {
                    Some(from) => format!("{}:{}:{}", query, folder, from),
                    None => format!("{}:{}", query, folder),
                }
            }
            None => format!("{} {}", request.method, request.url),
        }
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchResponse, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let route = self.routes.lock().unwrap().get(&Self::key(request)).cloned();

        let Some(route) = route else {
            return Ok(FetchResponse::new(404, ""));
        };
        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }
        match route.reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(message) => Err(FetchError::Other(message)),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    collections: Mutex<HashMap<String, BTreeMap<GazetteId, StoredDocument>>>,
    fail_next_count: AtomicBool,
    fail_writes: AtomicBool,
}

/// Document store kept in memory; clones share their contents
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
    write_delay: Option<Duration>,
}

impl MemoryStore {
    /// Sleep before every write
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Make the next `count` call fail
    pub fn fail_next_count(&self) {
        self.state.fail_next_count.store(true, Ordering::SeqCst);
    }

    /// Make every write fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Documents of `collection` in identifier order
    pub fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.state
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl DocumentStore for MemoryStore {
    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        if self.state.fail_next_count.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Connection("count unavailable".to_string()));
        }
        let collections = self.state.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .map_or(0, |documents| documents.len() as u64))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: &[StoredDocument],
        continue_on_conflict: bool,
    ) -> Result<u64, StoreError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store offline".to_string()));
        }

        let mut collections = self.state.collections.lock().unwrap();
        let stored = collections.entry(collection.to_string()).or_default();
        let mut inserted = 0;
        let mut conflicts = 0;
        for document in documents {
            if stored.contains_key(&document.id) {
                conflicts += 1;
                if !continue_on_conflict {
                    break;
                }
                continue;
            }
            stored.insert(document.id.clone(), document.clone());
            inserted += 1;
        }

        if conflicts > 0 {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                conflicts,
            });
        }
        Ok(inserted)
    }
}

/// Layer summing the unsigned integer fields of every event by name
#[derive(Clone, Default)]
pub struct FieldRecorder {
    totals: Arc<Mutex<HashMap<String, u64>>>,
}

impl FieldRecorder {
    pub fn total(&self, field: &str) -> u64 {
        self.totals.lock().unwrap().get(field).copied().unwrap_or(0)
    }
}

impl<S: Subscriber> Layer<S> for FieldRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        event.record(&mut TotalsVisitor(&self.totals));
    }
}

struct TotalsVisitor<'a>(&'a Mutex<HashMap<String, u64>>);

impl Visit for TotalsVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        *self
            .0
            .lock()
            .unwrap()
            .entry(field.name().to_string())
            .or_default() += value;
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}
