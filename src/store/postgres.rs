use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{QuotaLedger, RecipientStore, StoreError};
use crate::domain::{NewRecipient, Recipient, RecipientEmail, RecipientId, RecipientState};

#[derive(Clone)]
pub struct PostgresRecipientStore {
    pool: PgPool,
}

impl PostgresRecipientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RecipientRow {
    id: Uuid,
    email: String,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecipientRow> for Recipient {
    type Error = anyhow::Error;

    fn try_from(row: RecipientRow) -> Result<Self, Self::Error> {
        let email = RecipientEmail::parse(row.email).map_err(anyhow::Error::msg)?;
        Ok(Recipient::restore(row.id, email, row.sent_at))
    }
}

fn into_recipients(rows: Vec<RecipientRow>) -> Result<Vec<Recipient>, StoreError> {
    rows.into_iter()
        .map(|row| {
            let id = row.id;
            Recipient::try_from(row)
                .with_context(|| format!("Stored recipient {id} has an invalid email."))
                .map_err(StoreError::from)
        })
        .collect()
}

#[async_trait]
impl RecipientStore for PostgresRecipientStore {
    #[tracing::instrument(name = "Saving recipients in the database", skip_all)]
    async fn insert_many(&self, recipients: Vec<NewRecipient>) -> Result<u64, StoreError> {
        let (ids, emails): (Vec<Uuid>, Vec<String>) = recipients
            .into_iter()
            .map(|r| (Uuid::new_v4(), r.email.as_ref().to_owned()))
            .unzip();

        let result = sqlx::query(
            r#"
            INSERT INTO recipients (id, email)
            SELECT * FROM UNNEST($1::uuid[], $2::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&emails)
        .execute(&self.pool)
        .await
        .context("Failed to insert recipients.")?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(name = "Counting recipients by state", skip(self))]
    async fn count_by_state(&self, state: RecipientState) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipients WHERE status = $1")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count recipients.")?;

        Ok(u64::try_from(count).context("Recipient count was negative.")?)
    }

    #[tracing::instrument(name = "Selecting pending recipients", skip(self))]
    async fn select_pending(&self, max_count: u32) -> Result<Vec<Recipient>, StoreError> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT id, email, sent_at
            FROM recipients
            WHERE status = 'pending'
            ORDER BY position
            LIMIT $1
            "#,
        )
        .bind(i64::from(max_count))
        .fetch_all(&self.pool)
        .await
        .context("Failed to select pending recipients.")?;

        into_recipients(rows)
    }

    #[tracing::instrument(name = "Marking recipient as sent", skip(self))]
    async fn mark_sent(&self, id: RecipientId, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE recipients
            SET status = 'sent', sent_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .context("Failed to mark recipient as sent.")?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM recipients WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
                    .context("Failed to look up recipient.")?;
            if !exists {
                return Err(StoreError::NotFound(id));
            }
        }

        Ok(())
    }

    #[tracing::instrument(name = "Listing recipients", skip(self))]
    async fn list_all(&self) -> Result<Vec<Recipient>, StoreError> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            "SELECT id, email, sent_at FROM recipients ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recipients.")?;

        into_recipients(rows)
    }
}

#[derive(Clone)]
pub struct PostgresQuotaLedger {
    pool: PgPool,
}

impl PostgresQuotaLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaLedger for PostgresQuotaLedger {
    #[tracing::instrument(name = "Reading daily send count", skip(self))]
    async fn current_count(&self, day: NaiveDate) -> Result<u32, StoreError> {
        let count: Option<i32> =
            sqlx::query_scalar("SELECT sent_count FROM daily_sends WHERE day = $1")
                .bind(day)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read the daily send count.")?;

        Ok(u32::try_from(count.unwrap_or(0)).context("Daily send count was negative.")?)
    }

    #[tracing::instrument(name = "Incrementing daily send count", skip(self))]
    async fn increment(&self, day: NaiveDate, by: u32) -> Result<(), StoreError> {
        let by = i32::try_from(by).context("Increment does not fit the daily counter.")?;
        sqlx::query(
            r#"
            INSERT INTO daily_sends (day, sent_count)
            VALUES ($1, $2)
            ON CONFLICT (day) DO UPDATE
            SET sent_count = daily_sends.sent_count + EXCLUDED.sent_count
            "#,
        )
        .bind(day)
        .bind(by)
        .execute(&self.pool)
        .await
        .context("Failed to increment the daily send count.")?;

        Ok(())
    }
}
