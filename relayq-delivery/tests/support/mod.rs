#![allow(dead_code)]

pub mod counting_store;
pub mod mock_server;
pub mod scripted;

use chrono::{DateTime, Utc};
use relayq_store::{MessageStore, NewMail, Transaction};

pub fn mail(to: &[&str]) -> NewMail {
    NewMail::new(
        "app@example.com",
        to.iter().copied(),
        "Subject: hello\r\n\r\nHi there\r\n",
    )
}

/// Opens a transaction and claims everything eligible.
pub async fn claim(
    store: &dyn MessageStore,
) -> (Box<dyn Transaction>, Vec<relayq_store::Message>) {
    let mut tx = store.begin().await.unwrap();
    let batch = tx.claim_batch(None, now()).await.unwrap();
    (tx, batch)
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
