//! Store wrapper that counts calls and can inject failures.
#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relayq_store::{
    MemoryStore, Message, MessageId, MessageStore, NewMail, StoreError, Transaction,
};

#[derive(Debug, Default)]
struct Counters {
    begins: AtomicUsize,
    expires: AtomicUsize,
    claims: AtomicUsize,
    saves: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_expire: AtomicBool,
    conflict_on_begin: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    counters: Arc<Counters>,
}

impl CountingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_expire(&self) {
        self.counters.fail_expire.store(true, Ordering::SeqCst);
    }

    pub fn conflict_on_begin(&self) {
        self.counters.conflict_on_begin.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn begins(&self) -> usize {
        self.counters.begins.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn expires(&self) -> usize {
        self.counters.expires.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn claims(&self) -> usize {
        self.counters.claims.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn saves(&self) -> usize {
        self.counters.saves.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn shared(&self) -> Arc<dyn MessageStore> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl MessageStore for CountingStore {
    async fn enqueue(&self, mail: NewMail) -> Result<Vec<MessageId>, StoreError> {
        self.inner.enqueue(mail).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        if self.counters.conflict_on_begin.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict("database is locked".to_string()));
        }

        Ok(Box::new(CountingTransaction {
            inner: self.inner.begin().await?,
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn expire_stale(
        &self,
        older_than: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.counters.expires.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_expire.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("disk on fire".to_string()));
        }
        self.inner.expire_stale(older_than, now).await
    }

    async fn pending(&self) -> Result<Vec<Message>, StoreError> {
        self.inner.pending().await
    }

    async fn get(&self, id: MessageId) -> Result<Message, StoreError> {
        self.inner.get(id).await
    }
}

struct CountingTransaction {
    inner: Box<dyn Transaction>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Transaction for CountingTransaction {
    async fn claim_batch(
        &mut self,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, StoreError> {
        self.counters.claims.fetch_add(1, Ordering::SeqCst);
        self.inner.claim_batch(limit, now).await
    }

    async fn save(&mut self, message: &Message) -> Result<(), StoreError> {
        self.counters.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(message).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}
