use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Row identifier of a queued message.
pub type MessageId = i64;

/// Minimum number of seconds between two attempts on the same message.
///
/// A message attempted less than this long ago is assumed to still be in
/// flight in another relay process and is not claimed.
pub const ELIGIBILITY_WINDOW_SECS: i64 = 300;

/// Mail handed over by the application for queueing.
///
/// The body must already be fully encoded; it is stored and sent as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMail {
    pub from: Vec<String>,
    pub recipients: Vec<String>,
    pub body: Vec<u8>,
}

impl NewMail {
    pub fn new<S: Into<String>>(
        from: impl Into<String>,
        recipients: impl IntoIterator<Item = S>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            from: vec![from.into()],
            recipients: recipients.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }

    /// Builds one queued row per recipient. Only the first sender is kept.
    pub(crate) fn into_rows(self, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let Some(sender) = self.from.into_iter().find(|s| !s.trim().is_empty()) else {
            return Err(StoreError::Invalid("mail has no sender".to_string()));
        };

        let recipients: Vec<String> = self
            .recipients
            .into_iter()
            .filter(|r| !r.trim().is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(StoreError::Invalid("mail has no recipients".to_string()));
        }

        Ok(recipients
            .into_iter()
            .map(|to| Message::new(0, sender.clone(), to, self.body.clone(), now))
            .collect())
    }
}

/// Reporting status derived from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

/// A queued message addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: String,
    pub to: String,
    /// Fully encoded message, headers included.
    pub mail: Vec<u8>,
    pub attempts: u32,
    /// Unix seconds of the last attempt, `0` if never attempted.
    pub last_send_attempt: i64,
    pub last_error: Option<String>,
    /// Final reply text from the relay host on acceptance.
    pub success_status: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    #[must_use]
    pub fn new(
        id: MessageId,
        from: impl Into<String>,
        to: impl Into<String>,
        mail: impl Into<Vec<u8>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            from: from.into(),
            to: to.into(),
            mail: mail.into(),
            attempts: 0,
            last_send_attempt: 0,
            last_error: None,
            success_status: None,
            sent_at: None,
            failed: false,
            created_at,
            updated_at: created_at,
        }
    }

    /// Neither sent nor failed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.sent_at.is_none() && !self.failed
    }

    /// Pending and outside the in-flight window at `now`.
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now.timestamp() - self.last_send_attempt > ELIGIBILITY_WINDOW_SECS
    }

    /// Sent wins over failed if both were ever recorded.
    #[must_use]
    pub const fn status(&self) -> MessageStatus {
        if self.sent_at.is_some() {
            MessageStatus::Sent
        } else if self.failed {
            MessageStatus::Failed
        } else {
            MessageStatus::Pending
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.mail.len()
    }

    /// Time of the last attempt, `None` if never attempted.
    #[must_use]
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        if self.last_send_attempt == 0 {
            None
        } else {
            DateTime::from_timestamp(self.last_send_attempt, 0)
        }
    }

    /// Stamps a new delivery attempt.
    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_send_attempt = now.timestamp();
        self.updated_at = now;
    }

    /// Records acceptance by the relay host. `sent_at` is only set once.
    pub fn mark_sent(&mut self, response: impl Into<String>, now: DateTime<Utc>) {
        self.success_status = Some(response.into());
        self.sent_at.get_or_insert(now);
        self.updated_at = now;
    }

    /// Records a permanent failure. The message will never be retried.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(error.into());
        self.failed = true;
        self.updated_at = now;
    }

    /// Records a transient failure, leaving the message pending.
    pub fn record_error(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(error.into());
        self.updated_at = now;
    }
}
