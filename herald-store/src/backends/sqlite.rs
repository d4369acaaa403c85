//! SQLite-backed record source and status sink.
//!
//! Every call opens its own connection inside `spawn_blocking` and drops it
//! before returning, on success and failure alike. Workers therefore never
//! share a connection; concurrent writers are serialised by SQLite itself,
//! with a busy timeout so they wait instead of failing.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use herald_common::{DatabaseConfig, Record, RecordKey, internal, outgoing};
use rusqlite::{Connection, Row};

use crate::{
    StoreError,
    r#trait::{RecordSource, STATUS_SENT, StatusSink},
};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Pending recipients in the default schema.
pub const DEFAULT_FETCH_QUERY: &str = "SELECT ApplicationNo, RollNo, CandidateName, Email, AttachmentPath, StatusTag
    FROM recipients
    WHERE EmailStatus IS NULL OR EmailStatus <> 'Sent'
    ORDER BY rowid";

/// Marks one recipient of the default schema as sent. The status tag must
/// still match what was fetched.
pub const DEFAULT_UPDATE_QUERY: &str = "UPDATE recipients
    SET EmailStatus = :status, SentAt = CURRENT_TIMESTAMP
    WHERE ApplicationNo = :application_no
      AND RollNo = :roll_no
      AND COALESCE(StatusTag, '') = :status_tag";

/// Default schema, created by [`SqliteStore::initialise`].
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS recipients (
        ApplicationNo TEXT NOT NULL,
        RollNo TEXT NOT NULL,
        CandidateName TEXT NOT NULL,
        Email TEXT NOT NULL,
        AttachmentPath TEXT,
        StatusTag TEXT,
        EmailStatus TEXT,
        SentAt TEXT,
        PRIMARY KEY (ApplicationNo, RollNo)
    );
";

#[derive(Debug)]
struct Statements {
    fetch: String,
    update: String,
}

/// SQLite record store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    statements: Arc<Statements>,
}

impl SqliteStore {
    /// A store over the database at `path` using the default schema.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            statements: Arc::new(Statements {
                fetch: DEFAULT_FETCH_QUERY.to_string(),
                update: DEFAULT_UPDATE_QUERY.to_string(),
            }),
        }
    }

    /// Build a store from configuration, falling back to the default
    /// statements where none are given.
    #[must_use]
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            path: config.path.clone(),
            statements: Arc::new(Statements {
                fetch: config
                    .fetch_query
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FETCH_QUERY.to_string()),
                update: config
                    .update_query
                    .clone()
                    .unwrap_or_else(|| DEFAULT_UPDATE_QUERY.to_string()),
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the default `recipients` table if it does not exist.
    pub async fn initialise(&self) -> crate::Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> crate::Result<()> {
            let connection = open(&path)?;
            connection.execute_batch("PRAGMA journal_mode=WAL;")?;
            connection.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?
    }

    /// Insert `records` into the default schema as pending.
    pub async fn insert(&self, records: Vec<Record>) -> crate::Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> crate::Result<()> {
            let mut connection = open(&path)?;
            let tx = connection.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO recipients
                        (ApplicationNo, RollNo, CandidateName, Email, AttachmentPath, StatusTag)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for record in &records {
                    stmt.execute(rusqlite::params![
                        record.key.application_no,
                        record.key.roll_no,
                        record.candidate_name,
                        record.email,
                        record
                            .attachment_path
                            .as_ref()
                            .map(|p| p.to_string_lossy().into_owned()),
                        record.status_tag,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }
}

/// Open a connection. The caller owns it; dropping it closes the database.
fn open(path: &Path) -> crate::Result<Connection> {
    let connection = Connection::open(path).map_err(|source| StoreError::Connection {
        path: path.to_path_buf(),
        source,
    })?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}

/// Read a text column by name. Integer identifiers are accepted and
/// rendered as text.
fn text_column(row: &Row<'_>, name: &str) -> crate::Result<Option<String>> {
    use rusqlite::types::ValueRef;

    let value = row
        .get_ref(name)
        .map_err(|e| StoreError::Row(format!("column {name}: {e}")))?;

    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| StoreError::Row(format!("column {name} is not UTF-8: {e}"))),
        ValueRef::Real(_) | ValueRef::Blob(_) => {
            Err(StoreError::Row(format!("column {name} has an unsupported type")))
        }
    }
}

fn required_column(row: &Row<'_>, name: &str) -> crate::Result<String> {
    text_column(row, name)?.ok_or_else(|| StoreError::Row(format!("column {name} is NULL")))
}

fn record_from_row(row: &Row<'_>) -> crate::Result<Record> {
    Ok(Record {
        key: RecordKey::new(
            required_column(row, "ApplicationNo")?,
            required_column(row, "RollNo")?,
        ),
        candidate_name: required_column(row, "CandidateName")?,
        email: required_column(row, "Email")?,
        attachment_path: text_column(row, "AttachmentPath")?
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from),
        status_tag: text_column(row, "StatusTag")?.unwrap_or_default(),
    })
}

fn fetch_blocking(path: &Path, query: &str) -> crate::Result<Vec<Record>> {
    let connection = open(path)?;
    outgoing!(level = DEBUG, "{query}");

    let mut stmt = connection.prepare(query)?;
    let mut rows = stmt.query([])?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let record = record_from_row(row)?;
        if !seen.insert(record.key.clone()) {
            return Err(StoreError::DuplicateKey(record.key));
        }
        records.push(record);
    }

    Ok(records)
}

fn mark_sent_blocking(
    path: &Path,
    query: &str,
    key: &RecordKey,
    status_tag: &str,
) -> crate::Result<()> {
    let connection = open(path)?;
    let mut stmt = connection.prepare(query)?;

    // Custom statements may use any subset of the parameters
    for (name, value) in [
        (":status", STATUS_SENT),
        (":status_tag", status_tag),
        (":application_no", key.application_no.as_str()),
        (":roll_no", key.roll_no.as_str()),
    ] {
        if let Some(index) = stmt.parameter_index(name)? {
            stmt.raw_bind_parameter(index, value)?;
        }
    }

    outgoing!(level = DEBUG, "{query} [{key}]");
    match stmt.raw_execute()? {
        0 => Err(StoreError::NoMatchingRow(key.clone())),
        _ => Ok(()),
    }
}

#[async_trait]
impl RecordSource for SqliteStore {
    async fn fetch(&self) -> crate::Result<Vec<Record>> {
        let path = self.path.clone();
        let statements = Arc::clone(&self.statements);

        let records =
            tokio::task::spawn_blocking(move || fetch_blocking(&path, &statements.fetch)).await??;

        internal!(
            level = DEBUG,
            "Fetched {} pending records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}

#[async_trait]
impl StatusSink for SqliteStore {
    async fn mark_sent(&self, key: &RecordKey, status_tag: &str) -> crate::Result<()> {
        let path = self.path.clone();
        let statements = Arc::clone(&self.statements);
        let key = key.clone();
        let status_tag = status_tag.to_string();

        tokio::task::spawn_blocking(move || -> crate::Result<()> {
            mark_sent_blocking(&path, &statements.update, &key, &status_tag)
        })
        .await?
    }
}
