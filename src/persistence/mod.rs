//! Persistence Gateway
//!
//! Durable call records, consumed through an insert-on-dial / update-on-
//! transition contract. The real-time path never awaits a write: the control
//! handler pushes [`PersistCommand`]s into a one-way channel and a writer
//! task drains them against the [`CallRecordStore`]. A failed write is
//! logged and never fails, rolls back, or suppresses the in-memory
//! transition, so durable state may transiently diverge from registry state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::session::{AgentId, CallDirection, CallId, CallSession, CampaignId, LeadId, TenantId};

/// Fields persisted when a call record is first inserted
#[derive(Debug, Clone)]
pub struct NewCallRecord {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub lead_id: Option<LeadId>,
    pub campaign_id: Option<CampaignId>,
    pub direction: CallDirection,
    pub phone_number: String,
    pub start_time: DateTime<Utc>,
}

impl From<&CallSession> for NewCallRecord {
    fn from(session: &CallSession) -> Self {
        Self {
            call_id: session.call_id.clone(),
            tenant_id: session.tenant_id.clone(),
            agent_id: session.agent_id.clone(),
            lead_id: session.lead_id.clone(),
            campaign_id: session.campaign_id.clone(),
            direction: session.direction,
            phone_number: session.phone_number.clone(),
            start_time: session.start_time,
        }
    }
}

/// Durable call-record store contract
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    /// Insert a record with status "dialing"
    async fn insert_call(&self, record: NewCallRecord) -> Result<()>;

    /// Mark a record answered
    async fn mark_answered(&self, call_id: &CallId, answer_time: DateTime<Utc>) -> Result<()>;

    /// Mark a record completed with its final duration
    async fn mark_completed(
        &self,
        call_id: &CallId,
        end_time: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()>;
}

/// A persisted call record row
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CallRecord {
    pub id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub lead_id: Option<String>,
    pub campaign_id: Option<String>,
    pub direction: String,
    pub status: String,
    pub phone_number: String,
    pub start_time: DateTime<Utc>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

/// SQLite-backed store using sqlx
#[derive(Clone)]
pub struct SqliteCallStore {
    pool: SqlitePool,
}

impl SqliteCallStore {
    /// Connect and create the schema if needed
    ///
    /// Accepts any sqlite URL, including `sqlite::memory:` for tests.
    pub async fn new(database_url: &str) -> Result<Self> {
        // A single connection keeps `sqlite::memory:` coherent; SQLite
        // serializes writers anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS call_records (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                lead_id TEXT,
                campaign_id TEXT,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                start_time TEXT NOT NULL,
                answer_time TEXT,
                end_time TEXT,
                duration_seconds INTEGER
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Fetch one record by call id
    pub async fn get_call(&self, call_id: &CallId) -> Result<Option<CallRecord>> {
        let record = sqlx::query_as::<_, CallRecord>(
            "SELECT id, tenant_id, agent_id, lead_id, campaign_id, direction, status,
                    phone_number, start_time, answer_time, end_time, duration_seconds
             FROM call_records WHERE id = ?1",
        )
        .bind(call_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl CallRecordStore for SqliteCallStore {
    async fn insert_call(&self, record: NewCallRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO call_records
                (id, tenant_id, agent_id, lead_id, campaign_id, direction, status, phone_number, start_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'dialing', ?7, ?8)",
        )
        .bind(record.call_id.as_str().to_string())
        .bind(record.tenant_id.0)
        .bind(record.agent_id.0)
        .bind(record.lead_id.map(|l| l.0))
        .bind(record.campaign_id.map(|c| c.0))
        .bind(record.direction.as_str())
        .bind(record.phone_number)
        .bind(record.start_time)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Inserted call record {}", record.call_id);
        Ok(())
    }

    async fn mark_answered(&self, call_id: &CallId, answer_time: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE call_records SET status = 'answered', answer_time = ?1 WHERE id = ?2")
            .bind(answer_time)
            .bind(call_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_completed(
        &self,
        call_id: &CallId,
        end_time: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE call_records
             SET status = 'completed', end_time = ?1, duration_seconds = ?2
             WHERE id = ?3",
        )
        .bind(end_time)
        .bind(duration_seconds)
        .bind(call_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Commands flowing into the persistence writer
#[derive(Debug)]
pub enum PersistCommand {
    Insert(NewCallRecord),
    Answered {
        call_id: CallId,
        answer_time: DateTime<Utc>,
    },
    Completed {
        call_id: CallId,
        end_time: DateTime<Utc>,
        duration_seconds: i64,
    },
}

/// Handle for dispatching fire-and-forget persistence work
#[derive(Clone)]
pub struct PersistenceGateway {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceGateway {
    /// Spawn the writer task over a store
    ///
    /// Dropping every gateway clone closes the channel; the writer drains
    /// what was queued and exits. The returned handle lets the server await
    /// that drain on shutdown.
    pub fn spawn(store: Arc<dyn CallRecordStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistCommand>();

        let writer = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                let outcome = match cmd {
                    PersistCommand::Insert(record) => store.insert_call(record).await,
                    PersistCommand::Answered {
                        call_id,
                        answer_time,
                    } => store.mark_answered(&call_id, answer_time).await,
                    PersistCommand::Completed {
                        call_id,
                        end_time,
                        duration_seconds,
                    } => store.mark_completed(&call_id, end_time, duration_seconds).await,
                };

                if let Err(e) = outcome {
                    tracing::warn!("Call record write failed (continuing): {}", e);
                }
            }
            tracing::debug!("Persistence writer drained");
        });

        (Self { tx }, writer)
    }

    /// Queue a command without waiting for the write
    pub fn dispatch(&self, cmd: PersistCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::warn!("Persistence writer is gone; dropping call record update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UserId;

    fn record(call_id: &str) -> NewCallRecord {
        let mut session = CallSession::new(
            TenantId("t-1".to_string()),
            AgentId("agt-1".to_string()),
            UserId("u-1".to_string()),
            "+15551234567".to_string(),
            CallDirection::Outbound,
        );
        session.call_id = CallId(call_id.to_string());
        NewCallRecord::from(&session)
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let store = SqliteCallStore::new("sqlite::memory:").await.unwrap();
        let call_id = CallId("c-1".to_string());

        store.insert_call(record("c-1")).await.unwrap();
        let row = store.get_call(&call_id).await.unwrap().unwrap();
        assert_eq!(row.status, "dialing");
        assert_eq!(row.direction, "outbound");

        store.mark_answered(&call_id, Utc::now()).await.unwrap();
        let row = store.get_call(&call_id).await.unwrap().unwrap();
        assert_eq!(row.status, "answered");
        assert!(row.answer_time.is_some());

        store.mark_completed(&call_id, Utc::now(), 42).await.unwrap();
        let row = store.get_call(&call_id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.duration_seconds, Some(42));
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let store = SqliteCallStore::new("sqlite::memory:").await.unwrap();
        assert!(store.get_call(&CallId("nope".to_string())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_drains_on_drop() {
        let store = Arc::new(SqliteCallStore::new("sqlite::memory:").await.unwrap());
        let (gateway, writer) = PersistenceGateway::spawn(store.clone());

        gateway.dispatch(PersistCommand::Insert(record("c-9")));
        drop(gateway);
        writer.await.unwrap();

        let row = store.get_call(&CallId("c-9".to_string())).await.unwrap();
        assert!(row.is_some());
    }
}
