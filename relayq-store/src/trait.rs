use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Result,
    message::{Message, MessageId, NewMail},
};

/// Durable queue of outbound mail.
///
/// Implementations must be safe to share between concurrently running
/// relay processes: two open transactions never claim the same row.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Queues `mail`, one row per recipient, returning the new row ids.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Invalid`] if the mail has no sender or
    /// no recipients, or a database error if the insert fails.
    async fn enqueue(&self, mail: NewMail) -> Result<Vec<MessageId>>;

    /// Opens the scope that encloses a claim and its deliveries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Marks every pending, previously attempted message created before
    /// `older_than` as failed, skipping rows currently claimed. Returns the
    /// number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    async fn expire_stale(&self, older_than: DateTime<Utc>, now: DateTime<Utc>) -> Result<usize>;

    /// Every pending message in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn pending(&self) -> Result<Vec<Message>>;

    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if no row has this id.
    async fn get(&self, id: MessageId) -> Result<Message>;
}

/// One delivery run's claim on the queue.
///
/// Rows returned by [`Transaction::claim_batch`] stay claimed until the
/// transaction is committed or rolled back; no other transaction can claim
/// them meanwhile. Each [`Transaction::save`] is durable as soon as it
/// returns, so neither ending undoes a save. A transaction dropped without
/// either gives its rows up no later than the eligibility window.
#[async_trait]
pub trait Transaction: Send {
    /// Claims up to `limit` eligible messages (all when `None`), ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Conflict`] if another process kept the
    /// queue busy past the busy timeout, or an error if the query fails.
    async fn claim_batch(&mut self, limit: Option<usize>, now: DateTime<Utc>)
    -> Result<Vec<Message>>;

    /// Persists the mutable fields of `message` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the row does not exist.
    async fn save(&mut self, message: &Message) -> Result<()>;

    /// Ends a finished run, releasing the claimed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the release fails.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Ends an aborted run, releasing the claimed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the release fails.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
