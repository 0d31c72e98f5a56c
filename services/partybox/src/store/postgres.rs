//! Postgres-backed implementation of the party store.
//!
//! # Data model
//! - `parties` holds one row per event.
//! - `participants` keeps counters in columns and the quota history as a JSONB
//!   array of camelCase entries. `base_quota` and `quota_history` are nullable
//!   because rows imported from older deployments may lack them; they are
//!   decoded through the same path as the in-memory documents.
//!
//! # Consistency
//! A quota change runs in one transaction: the row is read with
//! `SELECT ... FOR UPDATE` and the change is planned in Rust. The update then
//! sets only the counters that moved and prepends the new entry to the stored
//! JSONB array, trimming it to the history limit. Older entries are never
//! re-encoded. Concurrent changes to the same participant serialize on the row
//! lock.
//!
//! History entries that cannot be decoded are skipped on read (and logged)
//! rather than failing the whole participant.
//!
//! # Operational notes
//! - Migrations run at startup via `sqlx::migrate!("./migrations")`.
//! - Database URLs may contain credentials; they are never logged.
use super::{PartyStore, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::ledger::{QuotaChangeResult, plan_change};
use crate::model::{
    NewParticipant, Participant, Party, PartyDraft, StoredFeedback, StoredParticipant,
    decode_stored_entries,
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partybox_common::ids::{ParticipantId, PartyId};
use partybox_common::{QuotaOutcome, QuotaValues};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbParty {
    id: Uuid,
    name: String,
    location: String,
    starts_at: DateTime<Utc>,
    description: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row shape for `participants`; mirrors the document fields one to one.
#[derive(Debug, Clone, FromRow)]
struct DbParticipant {
    id: Uuid,
    name: String,
    surname: String,
    quota: Option<i64>,
    base_quota: Option<i64>,
    quota_history: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PARTY_COLUMNS: &str =
    "id, name, location, starts_at, description, image_url, created_at, updated_at";
const PARTICIPANT_COLUMNS: &str =
    "id, name, surname, quota, base_quota, quota_history, created_at, updated_at";

impl PostgresStore {
    /// Connect, size the pool from `pg`, and apply pending migrations.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| anyhow!("timed out connecting to postgres"))??;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        Ok(Self { pool })
    }

    async fn refresh_participant_gauge(&self) {
        if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM participants")
            .fetch_one(&self.pool)
            .await
        {
            metrics::gauge!("partybox_participants_total").set(count as f64);
        }
    }
}

fn party_from_db(row: DbParty) -> Party {
    Party {
        id: PartyId::from_uuid(row.id),
        name: row.name,
        location: row.location,
        starts_at: row.starts_at,
        description: row.description,
        image_url: row.image_url,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn stored_from_db(row: DbParticipant) -> StoreResult<StoredParticipant> {
    let id = ParticipantId::from_uuid(row.id);
    let quota_history = match row.quota_history {
        None | Some(Value::Null) => None,
        Some(Value::Array(entries)) => Some(decode_stored_entries(id, entries)),
        Some(_) => {
            return Err(anyhow!("quota history for participant {id} is not a list").into());
        }
    };
    Ok(StoredParticipant {
        id,
        name: row.name,
        surname: row.surname,
        quota: row.quota,
        base_quota: row.base_quota,
        quota_history,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn participant_from_db(row: DbParticipant) -> StoreResult<Participant> {
    stored_from_db(row).map(Participant::from_stored)
}

fn history_to_json(entries: &[StoredFeedback]) -> StoreResult<Value> {
    serde_json::to_value(entries)
        .context("encode quota history")
        .map_err(StoreError::from)
}

#[async_trait]
impl PartyStore for PostgresStore {
    async fn list_parties(&self) -> StoreResult<Vec<Party>> {
        let rows = sqlx::query_as::<_, DbParty>(&format!(
            "SELECT {PARTY_COLUMNS} FROM parties ORDER BY starts_at, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(party_from_db).collect())
    }

    async fn get_party(&self, id: PartyId) -> StoreResult<Party> {
        sqlx::query_as::<_, DbParty>(&format!(
            "SELECT {PARTY_COLUMNS} FROM parties WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(party_from_db)
        .ok_or_else(|| StoreError::NotFound("party".into()))
    }

    async fn create_party(&self, draft: PartyDraft) -> StoreResult<Party> {
        let party = draft.into_party(PartyId::new(), Utc::now());
        let result = sqlx::query(
            r#"INSERT INTO parties (id, name, location, starts_at, description, image_url, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(party.id.as_uuid())
        .bind(&party.name)
        .bind(&party.location)
        .bind(party.starts_at)
        .bind(&party.description)
        .bind(&party.image_url)
        .bind(party.created_at)
        .bind(party.updated_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(party),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict("party".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_party(&self, id: PartyId, draft: PartyDraft) -> StoreResult<Party> {
        let row = sqlx::query_as::<_, DbParty>(&format!(
            r#"UPDATE parties
               SET name = $2, location = $3, starts_at = $4, description = $5, image_url = $6, updated_at = now()
               WHERE id = $1
               RETURNING {PARTY_COLUMNS}"#
        ))
        .bind(id.as_uuid())
        .bind(&draft.name)
        .bind(&draft.location)
        .bind(draft.starts_at)
        .bind(&draft.description)
        .bind(&draft.image_url)
        .fetch_optional(&self.pool)
        .await?;
        row.map(party_from_db)
            .ok_or_else(|| StoreError::NotFound("party".into()))
    }

    async fn delete_party(&self, id: PartyId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM parties WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("party".into()));
        }
        Ok(())
    }

    async fn list_participants(&self) -> StoreResult<Vec<Participant>> {
        let rows = sqlx::query_as::<_, DbParticipant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants ORDER BY name, surname"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(participant_from_db).collect()
    }

    async fn get_participant(&self, id: ParticipantId) -> StoreResult<Participant> {
        let row = sqlx::query_as::<_, DbParticipant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("participant".into()))?;
        participant_from_db(row)
    }

    async fn create_participant(&self, participant: NewParticipant) -> StoreResult<Participant> {
        let doc = participant.into_stored(ParticipantId::new(), Utc::now());
        let history = history_to_json(doc.quota_history.as_deref().unwrap_or_default())?;
        let participant = Participant::from_stored(doc);
        sqlx::query(
            r#"INSERT INTO participants (id, name, surname, quota, base_quota, quota_history, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(participant.id.as_uuid())
        .bind(&participant.name)
        .bind(&participant.surname)
        .bind(i64::from(participant.quota))
        .bind(i64::from(participant.base_quota))
        .bind(history)
        .bind(participant.created_at)
        .bind(participant.updated_at)
        .execute(&self.pool)
        .await?;
        self.refresh_participant_gauge().await;
        Ok(participant)
    }

    async fn delete_participant(&self, id: ParticipantId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM participants WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("participant".into()));
        }
        self.refresh_participant_gauge().await;
        Ok(())
    }

    async fn apply_quota_change(
        &self,
        id: ParticipantId,
        target: QuotaValues,
        at: DateTime<Utc>,
        history_limit: usize,
    ) -> StoreResult<QuotaChangeResult> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, DbParticipant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("participant".into()))?;

        let participant = participant_from_db(current)?;
        let Some(update) = plan_change(&participant, target, at) else {
            tx.rollback().await?;
            return Ok(QuotaChangeResult {
                outcome: QuotaOutcome::Unchanged,
                participant,
            });
        };

        // Existing entries stay byte-for-byte as stored, undecodable ones
        // included; the new entry is prepended and the tail trimmed in SQL.
        let entry = history_to_json(&[StoredFeedback::from_feedback(&update.feedback)])?;
        let limit = i64::try_from(history_limit).unwrap_or(i64::MAX);
        let row = sqlx::query_as::<_, DbParticipant>(&format!(
            r#"UPDATE participants
               SET quota = COALESCE($2, quota),
                   base_quota = COALESCE($3, base_quota),
                   quota_history = (
                       SELECT COALESCE(jsonb_agg(h.entry ORDER BY h.position), '[]'::jsonb)
                       FROM jsonb_array_elements($4::jsonb || COALESCE(quota_history, '[]'::jsonb))
                            WITH ORDINALITY AS h(entry, position)
                       WHERE h.position <= $5
                   ),
                   updated_at = $6
               WHERE id = $1
               RETURNING {PARTICIPANT_COLUMNS}"#
        ))
        .bind(id.as_uuid())
        .bind(update.base_quota.map(i64::from))
        .bind(update.quota.map(i64::from))
        .bind(entry)
        .bind(limit)
        .bind(update.feedback.timestamp)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(QuotaChangeResult {
            outcome: QuotaOutcome::Applied,
            participant: participant_from_db(row)?,
        })
    }

    async fn normalize_legacy_history(&self) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"UPDATE participants
               SET quota = COALESCE(quota, 0),
                   base_quota = COALESCE(base_quota, quota, 0),
                   quota_history = COALESCE(quota_history, '[]'::jsonb)
               WHERE quota IS NULL OR base_quota IS NULL OR quota_history IS NULL"#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(quota_history: Option<Value>) -> DbParticipant {
        let now = Utc::now();
        DbParticipant {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            quota: Some(6),
            base_quota: None,
            quota_history,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn participant_from_db_decodes_legacy_history() {
        let participant = participant_from_db(row(Some(json!([
            { "timestamp": { "$date": "2024-01-01T00:00:00Z" }, "newQuota": 4, "field": "quota" },
            { "timestamp": "2024-03-01T00:00:00Z", "baseQuota": 4, "quota": 6, "difference": 2 }
        ]))))
        .expect("participant");
        assert_eq!(participant.base_quota, 6);
        assert_eq!(participant.quota_history.len(), 2);
        assert_eq!(participant.quota_history[0].quota, Some(6));
        assert_eq!(participant.quota_history[1].base_quota, Some(4));
    }

    #[test]
    fn null_history_reads_as_empty() {
        let participant = participant_from_db(row(Some(Value::Null))).expect("participant");
        assert!(participant.quota_history.is_empty());
        let participant = participant_from_db(row(None)).expect("participant");
        assert!(participant.quota_history.is_empty());
    }

    #[test]
    fn undecodable_entry_is_skipped_not_fatal() {
        let participant = participant_from_db(row(Some(json!([
            { "timestamp": "2024-03-01T00:00:00Z", "baseQuota": 6, "quota": 6, "difference": 2 },
            { "timestamp": "sometime last spring", "quota": 4 },
            { "timestamp": "2024-01-01 09:30:00", "newQuota": 4 }
        ]))))
        .expect("participant");
        assert_eq!(participant.quota_history.len(), 2);
        assert_eq!(participant.quota_history[0].quota, Some(6));
        assert_eq!(participant.quota_history[1].quota, Some(4));
    }

    #[test]
    fn malformed_history_is_an_unexpected_error() {
        let err = participant_from_db(row(Some(json!({ "not": "a list" })))).expect_err("bad");
        assert!(matches!(err, StoreError::Unexpected(_)));
    }

    #[test]
    fn party_from_db_maps_fields() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let party = party_from_db(DbParty {
            id,
            name: "Launch".to_string(),
            location: "Roof".to_string(),
            starts_at: now,
            description: None,
            image_url: Some("https://img".to_string()),
            created_at: now,
            updated_at: now,
        });
        assert_eq!(party.id.as_uuid(), id);
        assert_eq!(party.image_url.as_deref(), Some("https://img"));
    }
}
