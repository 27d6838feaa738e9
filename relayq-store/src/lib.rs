//! The relayq message queue.
//!
//! A queued [`Message`] is one row per recipient. Delivery runs take rows
//! out of the queue through a [`Transaction`] opened with
//! [`MessageStore::begin`], which holds the claimed rows until it is
//! committed or rolled back so concurrent relay processes never deliver
//! the same row twice. Claims never lock the whole queue, so mail can be
//! enqueued while a batch is being delivered.

pub mod backends;
pub mod config;
pub mod error;
pub mod message;
pub mod r#trait;

pub use backends::{MemoryStore, SqliteStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use message::{ELIGIBILITY_WINDOW_SECS, Message, MessageId, MessageStatus, NewMail};
pub use r#trait::{MessageStore, Transaction};
