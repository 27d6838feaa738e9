//! The per-batch delivery engine
//!
//! One session is opened for the whole batch and every message is tried in
//! claim order. Each message is saved before the engine moves on, whatever
//! the outcome, so the attempt count survives a crash straight after.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use relayq_common::Shutdown;
use relayq_store::{Message, StoreError, Transaction};

use crate::{
    DeliveryError, FailureKind, TransportError,
    transport::{Session, Transport},
};

/// Consecutive authentication failures tolerated before giving up.
pub const MAX_AUTH_FAILURES: u32 = 2;

/// Why a batch stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BatchEnd {
    /// Every message was tried.
    #[default]
    Completed,
    /// The server signalled backpressure.
    ServerBusy,
    /// The connection dropped mid-batch.
    ConnectionLost,
    /// The session could not be recovered with `RSET`.
    ResetFailed,
    /// The relay refused our credentials.
    AuthenticationFailed,
    /// No session could be opened for a reason other than authentication.
    SessionUnavailable,
    /// A stop was requested between messages.
    ShutdownRequested,
}

/// Tally of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Left pending by a transient error, busy server or dropped connection.
    pub deferred: usize,
    pub ended: BatchEnd,
    /// How long the caller should wait before the next run, once the
    /// batch's saves are committed.
    pub backoff: Option<Duration>,
}

impl BatchReport {
    const fn ended(ended: BatchEnd) -> Self {
        Self {
            attempted: 0,
            sent: 0,
            failed: 0,
            deferred: 0,
            ended,
            backoff: None,
        }
    }
}

/// What happened to one message.
enum Step {
    Continue,
    Stop(BatchEnd),
    Authentication(TransportError),
}

pub struct DeliveryEngine {
    transport: Arc<dyn Transport>,
    poll_delay: Duration,
    failed_auth_count: u32,
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("poll_delay", &self.poll_delay)
            .field("failed_auth_count", &self.failed_auth_count)
            .finish_non_exhaustive()
    }
}

impl DeliveryEngine {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, poll_delay: Duration) -> Self {
        Self {
            transport,
            poll_delay,
            failed_auth_count: 0,
        }
    }

    /// Start from a given number of consecutive authentication failures.
    #[must_use]
    pub const fn with_failed_auth_count(mut self, count: u32) -> Self {
        self.failed_auth_count = count;
        self
    }

    #[must_use]
    pub const fn failed_auth_count(&self) -> u32 {
        self.failed_auth_count
    }

    /// Delivers `batch` in order over a single session, saving each message
    /// through `tx` as it goes.
    ///
    /// Per-message failures never escape; they are recorded on the message.
    /// A busy server or a refused login sets [`BatchReport::backoff`] to one
    /// poll delay. The engine never sleeps itself.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::AuthenticationExhausted`] once
    /// [`MAX_AUTH_FAILURES`] consecutive logins have been refused, and
    /// [`DeliveryError::Store`] if a save fails.
    #[tracing::instrument(skip_all, fields(batch = batch.len()))]
    pub async fn deliver(
        &mut self,
        tx: &mut dyn Transaction,
        batch: Vec<Message>,
        shutdown: &mut Shutdown,
    ) -> Result<BatchReport, DeliveryError> {
        let mut session = match self.transport.connect().await {
            Ok(session) => session,
            Err(error) if error.kind() == FailureKind::Authentication => {
                let mut report = BatchReport::ended(BatchEnd::AuthenticationFailed);
                report.backoff = Some(self.authentication_failed(error)?);
                return Ok(report);
            }
            Err(error) => {
                tracing::warn!(kind = %error.kind(), "Could not open relay session: {error}");
                return Ok(BatchReport::ended(BatchEnd::SessionUnavailable));
            }
        };

        let mut report = BatchReport::default();
        let outcome = self
            .deliver_all(session.as_mut(), tx, batch, shutdown, &mut report)
            .await;
        session.close().await;

        match outcome? {
            Step::Continue => {}
            Step::Stop(ended) => report.ended = ended,
            Step::Authentication(error) => {
                report.ended = BatchEnd::AuthenticationFailed;
                report.backoff = Some(self.authentication_failed(error)?);
                return Ok(report);
            }
        }

        if report.sent > 0 {
            self.failed_auth_count = 0;
        }

        if report.ended == BatchEnd::ServerBusy {
            tracing::info!(
                delay = ?self.poll_delay,
                "Relay is busy, backing off"
            );
            report.backoff = Some(self.poll_delay);
        }

        Ok(report)
    }

    async fn deliver_all(
        &self,
        session: &mut dyn Session,
        tx: &mut dyn Transaction,
        batch: Vec<Message>,
        shutdown: &mut Shutdown,
        report: &mut BatchReport,
    ) -> Result<Step, StoreError> {
        for mut message in batch {
            if shutdown.is_requested() {
                return Ok(Step::Stop(BatchEnd::ShutdownRequested));
            }

            report.attempted += 1;
            match self.deliver_one(session, tx, &mut message, report).await? {
                Step::Continue => {}
                stop => return Ok(stop),
            }
        }

        Ok(Step::Continue)
    }

    async fn deliver_one(
        &self,
        session: &mut dyn Session,
        tx: &mut dyn Transaction,
        message: &mut Message,
        report: &mut BatchReport,
    ) -> Result<Step, StoreError> {
        message.record_attempt(Utc::now());

        let error = match session
            .send(&message.mail, &message.from, &message.to)
            .await
        {
            Ok(response) => {
                message.mark_sent(response, Utc::now());
                tx.save(message).await?;
                report.sent += 1;
                tracing::info!(
                    message_id = message.id,
                    from = %message.from,
                    to = %message.to,
                    attempts = message.attempts,
                    status = %message.status(),
                    outcome = "sent",
                    response = message.success_status.as_deref().unwrap_or_default(),
                    "Delivered message"
                );
                return Ok(Step::Continue);
            }
            Err(error) => error,
        };

        let kind = error.kind();
        match kind {
            FailureKind::Permanent => {
                message.mark_failed(error.describe(), Utc::now());
                report.failed += 1;
            }
            FailureKind::Protocol | FailureKind::Timeout | FailureKind::ServerBusy => {
                message.record_error(error.describe(), Utc::now());
                report.deferred += 1;
            }
            FailureKind::Connection | FailureKind::Authentication => {
                report.deferred += 1;
            }
        }
        tx.save(message).await?;

        // A dropped connection is teardown noise, not a delivery failure.
        if kind == FailureKind::Connection {
            tracing::debug!(
                message_id = message.id,
                from = %message.from,
                to = %message.to,
                attempts = message.attempts,
                status = %message.status(),
                outcome = %kind,
                "Session ended mid-batch: {error}"
            );
        } else {
            tracing::warn!(
                message_id = message.id,
                from = %message.from,
                to = %message.to,
                attempts = message.attempts,
                status = %message.status(),
                outcome = %kind,
                "Delivery failed: {error}"
            );
        }

        match kind {
            FailureKind::Permanent | FailureKind::Protocol | FailureKind::Timeout => {
                Ok(reset(session).await)
            }
            FailureKind::ServerBusy => Ok(Step::Stop(BatchEnd::ServerBusy)),
            FailureKind::Connection => Ok(Step::Stop(BatchEnd::ConnectionLost)),
            FailureKind::Authentication => Ok(Step::Authentication(error)),
        }
    }

    /// Counts a refused login and returns the back-off before the next try.
    fn authentication_failed(&mut self, error: TransportError) -> Result<Duration, DeliveryError> {
        self.failed_auth_count += 1;

        if self.failed_auth_count >= MAX_AUTH_FAILURES {
            tracing::error!(
                failures = self.failed_auth_count,
                "Relay keeps refusing our credentials: {error}"
            );
            return Err(DeliveryError::AuthenticationExhausted {
                failures: self.failed_auth_count,
                source: error,
            });
        }

        tracing::warn!(
            failures = self.failed_auth_count,
            delay = ?self.poll_delay,
            "Relay refused our credentials, retrying later: {error}"
        );
        Ok(self.poll_delay)
    }
}

async fn reset(session: &mut dyn Session) -> Step {
    match session.reset().await {
        Ok(()) => Step::Continue,
        Err(error) => {
            tracing::warn!(kind = %error.kind(), "Could not reset relay session: {error}");
            Step::Stop(BatchEnd::ResetFailed)
        }
    }
}
