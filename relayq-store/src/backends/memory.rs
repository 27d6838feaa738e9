use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Result, StoreError,
    message::{Message, MessageId, NewMail},
    r#trait::{MessageStore, Transaction},
};

type TransactionId = u64;

#[derive(Debug, Default)]
struct Shared {
    rows: BTreeMap<MessageId, Message>,
    /// Row locks held by open transactions.
    locks: HashMap<MessageId, TransactionId>,
    last_id: MessageId,
    last_transaction: TransactionId,
}

impl Shared {
    fn release(&mut self, owner: TransactionId) {
        self.locks.retain(|_, holder| *holder != owner);
    }
}

/// In-memory message store
///
/// Rows live in a `BTreeMap` behind an `RwLock`, so iteration is in id
/// order. Claims lock rows for the claiming transaction and skip rows held
/// by other open transactions, the way `SELECT ... FOR UPDATE SKIP LOCKED`
/// behaves. Saves are applied straight away; commit, rollback and drop all
/// release the claimed rows.
///
/// Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<RwLock<Shared>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, whatever their status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a row as is, assigning it the next id.
    ///
    /// Useful for seeding rows in a particular state.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert(&self, mut message: Message) -> Result<MessageId> {
        let mut shared = self.shared.write()?;
        shared.last_id += 1;
        message.id = shared.last_id;
        let id = message.id;
        shared.rows.insert(id, message);
        Ok(id)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn enqueue(&self, mail: NewMail) -> Result<Vec<MessageId>> {
        let rows = mail.into_rows(Utc::now())?;
        rows.into_iter().map(|row| self.insert(row)).collect()
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let id = {
            let mut shared = self.shared.write()?;
            shared.last_transaction += 1;
            shared.last_transaction
        };

        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            id,
            finished: false,
        }))
    }

    async fn expire_stale(&self, older_than: DateTime<Utc>, now: DateTime<Utc>) -> Result<usize> {
        let mut guard = self.shared.write()?;
        let Shared { rows, locks, .. } = &mut *guard;
        let mut expired = 0;
        for message in rows.values_mut() {
            if message.is_pending()
                && !locks.contains_key(&message.id)
                && message.last_send_attempt > 0
                && message.created_at < older_than
            {
                message.failed = true;
                message.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn pending(&self) -> Result<Vec<Message>> {
        let shared = self.shared.read()?;
        let mut pending: Vec<Message> = shared
            .rows
            .values()
            .filter(|m| m.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|m| (m.created_at, m.id));
        Ok(pending)
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        self.shared
            .read()?
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

struct MemoryTransaction {
    shared: Arc<RwLock<Shared>>,
    id: TransactionId,
    finished: bool,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn claim_batch(
        &mut self,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        let mut guard = self.shared.write()?;
        let shared = &mut *guard;

        let claimed: Vec<Message> = shared
            .rows
            .values()
            .filter(|m| m.is_eligible(now))
            .filter(|m| shared.locks.get(&m.id).is_none_or(|owner| *owner == self.id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        for message in &claimed {
            shared.locks.insert(message.id, self.id);
        }

        Ok(claimed)
    }

    async fn save(&mut self, message: &Message) -> Result<()> {
        let mut shared = self.shared.write()?;
        let row = shared
            .rows
            .get_mut(&message.id)
            .ok_or(StoreError::NotFound(message.id))?;
        *row = message.clone();
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.shared.write()?.release(self.id);
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.shared.write()?.release(self.id);
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.shared
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .release(self.id);
        }
    }
}
