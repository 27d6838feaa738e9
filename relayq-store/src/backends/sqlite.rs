use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relayq_common::internal;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params, types::Type};
use tokio_rusqlite::Connection;

use crate::{
    Result, StoreError,
    message::{ELIGIBILITY_WINDOW_SECS, Message, MessageId, NewMail},
    r#trait::{MessageStore, Transaction},
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        from_address      TEXT    NOT NULL,
        to_address        TEXT    NOT NULL,
        mail              BLOB    NOT NULL,
        attempts          INTEGER NOT NULL DEFAULT 0,
        last_send_attempt INTEGER NOT NULL DEFAULT 0,
        last_error        TEXT,
        success_status    TEXT,
        sent_at           INTEGER,
        failed            INTEGER NOT NULL DEFAULT 0,
        claimed_at        INTEGER,
        created_at        INTEGER NOT NULL,
        updated_at        INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS messages_sent_at ON messages (sent_at);
    CREATE INDEX IF NOT EXISTS messages_failed ON messages (failed);
";

const COLUMNS: &str = "id, from_address, to_address, mail, attempts, last_send_attempt, \
                       last_error, success_status, sent_at, failed, created_at, updated_at";

/// SQLite-backed message store
///
/// Timestamps are stored as integer microseconds since the Unix epoch,
/// except `last_send_attempt` and `claimed_at` which are whole seconds.
///
/// A claim is a lease: one short `BEGIN IMMEDIATE` transaction selects the
/// eligible rows and stamps `claimed_at`. Other claimers and cleanup skip a
/// leased row until the transaction releases it on commit or rollback, or
/// until [`ELIGIBILITY_WINDOW_SECS`] have passed. Saves are written one at
/// a time, so the write lock is never held across SMTP traffic and the
/// application can keep queueing mail during a batch.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Opens (creating if needed) the queue database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub async fn open(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let busy_timeout = Duration::from_millis(busy_timeout_ms);

        let conn = connect(&path, busy_timeout).await?;
        conn.call(|conn| conn.execute_batch(SCHEMA)).await?;

        internal!(level = INFO, "Opened message store at {}", path.display());

        Ok(Self {
            conn,
            path,
            busy_timeout,
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("busy_timeout", &self.busy_timeout)
            .finish_non_exhaustive()
    }
}

async fn connect(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).await?;
    conn.call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
    })
    .await?;
    Ok(conn)
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(index: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let sent_at: Option<i64> = row.get(8)?;
    Ok(Message {
        id: row.get(0)?,
        from: row.get(1)?,
        to: row.get(2)?,
        mail: row.get(3)?,
        attempts: row.get(4)?,
        last_send_attempt: row.get(5)?,
        last_error: row.get(6)?,
        success_status: row.get(7)?,
        sent_at: sent_at.map(|micros| from_micros(8, micros)).transpose()?,
        failed: row.get(9)?,
        created_at: from_micros(10, row.get(10)?)?,
        updated_at: from_micros(11, row.get(11)?)?,
    })
}

fn insert_rows(
    conn: &mut rusqlite::Connection,
    rows: &[Message],
) -> rusqlite::Result<Vec<MessageId>> {
    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(rows.len());
    {
        let mut insert = tx.prepare(
            "INSERT INTO messages (from_address, to_address, mail, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )?;
        for row in rows {
            insert.execute(params![row.from, row.to, row.mail, to_micros(row.created_at)])?;
            ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;
    Ok(ids)
}

fn select_pending(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM messages \
         WHERE sent_at IS NULL AND failed = 0 \
         ORDER BY created_at, id"
    ))?;
    stmt.query_map([], message_from_row)?.collect()
}

/// Selects the eligible, unleased rows and leases them to the caller in
/// one short write transaction.
fn lease_eligible(
    conn: &mut rusqlite::Connection,
    now: i64,
    limit: i64,
) -> rusqlite::Result<Vec<Message>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let claimed = {
        let mut select = tx.prepare(&format!(
            "SELECT {COLUMNS} FROM messages \
             WHERE sent_at IS NULL AND failed = 0 \
               AND (?1 - last_send_attempt) > ?2 \
               AND (claimed_at IS NULL OR (?1 - claimed_at) > ?2) \
             ORDER BY id LIMIT ?3"
        ))?;
        let rows = select
            .query_map(params![now, ELIGIBILITY_WINDOW_SECS, limit], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut lease = tx.prepare("UPDATE messages SET claimed_at = ?2 WHERE id = ?1")?;
        for row in &rows {
            lease.execute(params![row.id, now])?;
        }
        rows
    };
    tx.commit()?;
    Ok(claimed)
}

/// Clears the leases in `claims`, skipping any row that has since been
/// leased again by someone else.
fn release_leases(
    conn: &mut rusqlite::Connection,
    claims: &[(MessageId, i64)],
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut release =
            tx.prepare("UPDATE messages SET claimed_at = NULL WHERE id = ?1 AND claimed_at = ?2")?;
        for (id, leased_at) in claims {
            release.execute(params![id, leased_at])?;
        }
    }
    tx.commit()
}

fn select_one(conn: &rusqlite::Connection, id: MessageId) -> rusqlite::Result<Option<Message>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
        params![id],
        message_from_row,
    )
    .optional()
}

fn update_row(conn: &rusqlite::Connection, message: &Message) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE messages SET attempts = ?2, last_send_attempt = ?3, last_error = ?4, \
           success_status = ?5, sent_at = ?6, failed = ?7, updated_at = ?8 \
         WHERE id = ?1",
        params![
            message.id,
            message.attempts,
            message.last_send_attempt,
            message.last_error,
            message.success_status,
            message.sent_at.map(to_micros),
            message.failed,
            to_micros(message.updated_at),
        ],
    )
}

fn expire_rows(
    conn: &rusqlite::Connection,
    older_than: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE messages SET failed = 1, updated_at = ?2 \
         WHERE sent_at IS NULL AND failed = 0 \
           AND last_send_attempt > 0 AND created_at < ?1 \
           AND (claimed_at IS NULL OR (?3 - claimed_at) > ?4)",
        params![
            older_than,
            to_micros(now),
            now.timestamp(),
            ELIGIBILITY_WINDOW_SECS
        ],
    )
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn enqueue(&self, mail: NewMail) -> Result<Vec<MessageId>> {
        let rows = mail.into_rows(Utc::now())?;
        let ids = self.conn.call(move |conn| insert_rows(conn, &rows)).await?;

        internal!(level = DEBUG, "Queued {} row(s): {ids:?}", ids.len());
        Ok(ids)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let conn = connect(&self.path, self.busy_timeout).await?;

        Ok(Box::new(SqliteTransaction {
            conn,
            claims: Vec::new(),
        }))
    }

    async fn expire_stale(&self, older_than: DateTime<Utc>, now: DateTime<Utc>) -> Result<usize> {
        let older_than = to_micros(older_than);

        Ok(self
            .conn
            .call(move |conn| expire_rows(conn, older_than, now))
            .await?)
    }

    async fn pending(&self) -> Result<Vec<Message>> {
        Ok(self.conn.call(|conn| select_pending(conn)).await?)
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        self.conn
            .call(move |conn| select_one(conn, id))
            .await?
            .ok_or(StoreError::NotFound(id))
    }
}

/// The rows leased by one delivery run, on a dedicated connection.
///
/// Dropping it without commit or rollback leaves the leases to lapse after
/// the eligibility window.
struct SqliteTransaction {
    conn: Connection,
    claims: Vec<(MessageId, i64)>,
}

impl SqliteTransaction {
    async fn release(self: Box<Self>) -> Result<()> {
        let Self { conn, claims } = *self;
        if claims.is_empty() {
            return Ok(());
        }

        conn.call(move |conn| release_leases(conn, &claims)).await?;
        Ok(())
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn claim_batch(
        &mut self,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        // A negative LIMIT means no limit to SQLite.
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let now = now.timestamp();

        let claimed = self
            .conn
            .call(move |conn| lease_eligible(conn, now, limit))
            .await?;

        self.claims.extend(claimed.iter().map(|m| (m.id, now)));
        Ok(claimed)
    }

    async fn save(&mut self, message: &Message) -> Result<()> {
        let id = message.id;
        let message = message.clone();

        let changed = self
            .conn
            .call(move |conn| update_row(conn, &message))
            .await?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.release().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.release().await
    }
}
