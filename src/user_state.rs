//! # User State Module
//!
//! Per-user records: usage counters, the gallery, and the pending expectation
//! that routes the next free-text message. Records live in memory for the
//! lifetime of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Telegram chat identifier of a user
pub type UserId = i64;

/// Which handler receives the user's next free-text message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    ImagePrompt,
    WikiQuery,
}

/// Usage counter kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterKind {
    ImageRequests,
    WikiRequests,
}

/// Everything the bot remembers about one user
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserRecord {
    pub image_requests: u64,
    pub wiki_requests: u64,
    /// Image files in insertion order; duplicates allowed
    pub gallery: Vec<PathBuf>,
    pub pending: Option<Expectation>,
    /// Generation batches started so far
    pub batches_started: u64,
}

/// Storage contract for user records
///
/// Every method is atomic with respect to a single user.
pub trait UserRepository: Send + Sync {
    /// Snapshot of the user's record, creating an empty one if needed
    fn get_or_create(&self, user: UserId) -> UserRecord;

    /// Increment a counter and return its new value
    fn increment_counter(&self, user: UserId, kind: CounterKind) -> u64;

    /// Append an image and return its gallery index
    fn append_gallery_image(&self, user: UserId, image: PathBuf) -> usize;

    fn set_pending_expectation(&self, user: UserId, expectation: Option<Expectation>);

    /// Read and clear the pending expectation in one step
    fn take_pending_expectation(&self, user: UserId) -> Option<Expectation>;

    /// Image at `index`, if the gallery is that long
    fn gallery_image(&self, user: UserId, index: usize) -> Option<PathBuf>;

    fn gallery_len(&self, user: UserId) -> usize;

    /// Reserve the next batch sequence number for the user
    fn next_batch(&self, user: UserId) -> u64;
}

/// In-memory repository with one lock per user
///
/// The outer map lock is held only to find or insert a record; all reads and
/// writes of a record happen under that record's own lock.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    records: Mutex<HashMap<UserId, Arc<Mutex<UserRecord>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, user: UserId) -> Arc<Mutex<UserRecord>> {
        let mut records = lock(&self.records);
        Arc::clone(records.entry(user).or_default())
    }

    fn with_record<R>(&self, user: UserId, f: impl FnOnce(&mut UserRecord) -> R) -> R {
        let record = self.record(user);
        let mut guard = lock(&record);
        f(&mut guard)
    }

    /// Number of users seen so far
    pub fn user_count(&self) -> usize {
        lock(&self.records).len()
    }
}

impl UserRepository for InMemoryUserStore {
    fn get_or_create(&self, user: UserId) -> UserRecord {
        self.with_record(user, |record| record.clone())
    }

    fn increment_counter(&self, user: UserId, kind: CounterKind) -> u64 {
        self.with_record(user, |record| {
            let counter = match kind {
                CounterKind::ImageRequests => &mut record.image_requests,
                CounterKind::WikiRequests => &mut record.wiki_requests,
            };
            *counter += 1;
            *counter
        })
    }

    fn append_gallery_image(&self, user: UserId, image: PathBuf) -> usize {
        self.with_record(user, |record| {
            record.gallery.push(image);
            record.gallery.len() - 1
        })
    }

    fn set_pending_expectation(&self, user: UserId, expectation: Option<Expectation>) {
        self.with_record(user, |record| record.pending = expectation);
    }

    fn take_pending_expectation(&self, user: UserId) -> Option<Expectation> {
        self.with_record(user, |record| record.pending.take())
    }

    fn gallery_image(&self, user: UserId, index: usize) -> Option<PathBuf> {
        self.with_record(user, |record| record.gallery.get(index).cloned())
    }

    fn gallery_len(&self, user: UserId) -> usize {
        self.with_record(user, |record| record.gallery.len())
    }

    fn next_batch(&self, user: UserId) -> u64 {
        self.with_record(user, |record| {
            let batch = record.batches_started;
            record.batches_started += 1;
            batch
        })
    }
}
