//! In-process doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::TimeRange;
use crate::remote::{
    CreatedRecord, RemoteClient, RemoteError, RemoteRecord, RemoteResult, UploadItem,
};

/// How the fake answers uploads.
#[derive(Debug, Clone)]
pub enum UploadMode {
    /// Create one record per item, echoing the idempotency key
    EchoWithKeys,
    /// Create one record per item without echoing keys
    EchoWithoutKeys,
    /// Reply with a fixed body
    Respond(Vec<CreatedRecord>),
    /// Fail with a 503
    Unavailable,
    /// Fail the way a client with unusable settings does
    Misconfigured,
}

/// Scriptable remote that counts every call.
pub struct FakeRemote {
    upload_mode: Mutex<UploadMode>,
    fetch_responses: Mutex<VecDeque<RemoteResult<Vec<RemoteRecord>>>>,
    default_fetch: Mutex<Vec<RemoteRecord>>,
    uploads: Mutex<Vec<Vec<UploadItem>>>,
    fetched_ranges: Mutex<Vec<TimeRange>>,
    upload_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    next_server_id: AtomicUsize,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            upload_mode: Mutex::new(UploadMode::EchoWithKeys),
            fetch_responses: Mutex::new(VecDeque::new()),
            default_fetch: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            fetched_ranges: Mutex::new(Vec::new()),
            upload_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            next_server_id: AtomicUsize::new(1),
        }
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake whose range fetches always return `records`.
    pub fn serving(records: Vec<RemoteRecord>) -> Self {
        let fake = Self::default();
        *fake.default_fetch.lock().unwrap() = records;
        fake
    }

    pub fn set_upload_mode(&self, mode: UploadMode) {
        *self.upload_mode.lock().unwrap() = mode;
    }

    /// Queue a one-shot fetch result ahead of the default response.
    pub fn push_fetch(&self, result: RemoteResult<Vec<RemoteRecord>>) {
        self.fetch_responses.lock().unwrap().push_back(result);
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.upload_calls() + self.fetch_calls()
    }

    pub fn uploads(&self) -> Vec<Vec<UploadItem>> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn fetched_ranges(&self) -> Vec<TimeRange> {
        self.fetched_ranges.lock().unwrap().clone()
    }

    fn created_from(&self, item: &UploadItem, echo_key: bool) -> CreatedRecord {
        let id = self.next_server_id.fetch_add(1, Ordering::SeqCst);
        CreatedRecord {
            server_id: format!("srv-{id}"),
            captured_at_ms: item.captured_at_ms,
            score: item.score,
            client_key: if echo_key {
                item.client_key.clone()
            } else {
                None
            },
        }
    }
}

pub fn unavailable() -> RemoteError {
    RemoteError::Server {
        status: 503,
        message: "unavailable".to_string(),
    }
}

pub fn remote_record(server_id: &str, captured_at_ms: i64, score: f32) -> RemoteRecord {
    RemoteRecord {
        server_id: Some(server_id.to_string()),
        captured_at_ms,
        score,
    }
}

impl RemoteClient for FakeRemote {
    async fn upload_batch(&self, items: &[UploadItem]) -> RemoteResult<Vec<CreatedRecord>> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().push(items.to_vec());

        let mode = self.upload_mode.lock().unwrap().clone();
        match mode {
            UploadMode::EchoWithKeys => Ok(items
                .iter()
                .map(|item| self.created_from(item, true))
                .collect()),
            UploadMode::EchoWithoutKeys => Ok(items
                .iter()
                .map(|item| self.created_from(item, false))
                .collect()),
            UploadMode::Respond(records) => Ok(records),
            UploadMode::Unavailable => Err(unavailable()),
            UploadMode::Misconfigured => Err(RemoteError::InvalidConfiguration(
                "subject id must not be empty".to_string(),
            )),
        }
    }

    async fn fetch_range(&self, range: TimeRange) -> RemoteResult<Vec<RemoteRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched_ranges.lock().unwrap().push(range);

        let queued = self.fetch_responses.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => Ok(self
                .default_fetch
                .lock()
                .unwrap()
                .iter()
                .filter(|record| range.contains(record.captured_at_ms))
                .cloned()
                .collect()),
        }
    }
}
