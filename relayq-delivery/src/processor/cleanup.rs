//! Expiry of messages that never made it out.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use relayq_store::{MessageStore, StoreError};

/// Marks pending messages created more than `max_age` before `now` as
/// failed, provided they were attempted at least once.
///
/// A zero `max_age` disables expiry and touches nothing.
///
/// # Errors
///
/// Propagates store errors unchanged; there is no retry.
#[tracing::instrument(skip(store))]
pub async fn run_cleanup(
    store: &dyn MessageStore,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    if max_age.is_zero() {
        return Ok(0);
    }

    // An age past what chrono can represent means nothing is that old.
    let Some(older_than) = TimeDelta::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
    else {
        return Ok(0);
    };

    let expired = store.expire_stale(older_than, now).await?;
    tracing::info!(expired, "Expired stale messages");

    Ok(expired)
}
