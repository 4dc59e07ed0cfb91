// SQLite LeadRepository Implementation
//
// Every mutation is a single UPDATE statement. SQLite takes the write lock for
// the whole statement, which makes claim selection + marking atomic across
// connections and processes.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use leadflow_core::domain::{
    ClaimLease, ErrorStage, ErrorUpdate, Lead, LeadPage, LeadPhase, LeadState, LeadStatus, LeadUpdate,
};
use leadflow_core::error::{AppError, Result};
use leadflow_core::port::LeadRepository;
use sqlx::SqlitePool;

/// A claim is live while `claimed_by` is set and the lease has not expired
const UNCLAIMED_AT: &str =
    "(claimed_by IS NULL OR claim_expires_at IS NULL OR claim_expires_at <= ?)";

pub struct SqliteLeadRepository {
    pool: SqlitePool,
}

impl SqliteLeadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT status FROM leads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error("load lead status"))
    }
}

fn into_leads(rows: Vec<LeadRow>) -> Result<Vec<Lead>> {
    let mut leads = rows
        .into_iter()
        .map(LeadRow::into_lead)
        .collect::<Result<Vec<_>>>()?;
    // RETURNING does not preserve the subquery order
    leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(leads)
}

#[async_trait]
impl LeadRepository for SqliteLeadRepository {
    async fn insert_batch(&self, leads: &[Lead]) -> Result<()> {
        if leads.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_sqlx_error("create leads"))?;

        for lead in leads {
            sqlx::query(
                r#"
                INSERT INTO leads (
                    id, client, job_id, status, current_phase, retry_count,
                    error_stage, error_message,
                    findymail_enriched_at, ai_enriched_at, uploaded_at,
                    created_at, data, claimed_by, claim_expires_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&lead.id)
            .bind(&lead.client)
            .bind(&lead.job_id)
            .bind(lead.status.as_str())
            .bind(lead.current_phase.as_str())
            .bind(i64::from(lead.retry_count))
            .bind(lead.error_stage.map(|s| s.as_str()))
            .bind(&lead.error_message)
            .bind(lead.findymail_enriched_at)
            .bind(lead.ai_enriched_at)
            .bind(lead.uploaded_at)
            .bind(lead.created_at)
            .bind(lead.data.to_string())
            .bind(&lead.claimed_by)
            .bind(lead.claim_expires_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error("create leads"))?;
        }

        tx.commit().await.map_err(map_sqlx_error("create leads"))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error("load lead"))?;

        row.map(LeadRow::into_lead).transpose()
    }

    async fn apply_update(&self, update: &LeadUpdate) -> Result<Lead> {
        let mut sql = String::from("UPDATE leads SET status = ?, current_phase = ?");
        if let Some(stamp) = update.stamp {
            // Stamps are written once
            let column = stamp.column();
            sql.push_str(&format!(", {column} = COALESCE({column}, ?)"));
        }
        match &update.error {
            ErrorUpdate::Keep => {}
            ErrorUpdate::Clear => sql.push_str(", error_stage = NULL, error_message = NULL"),
            ErrorUpdate::Set(_) => sql.push_str(", error_stage = ?, error_message = ?"),
        }
        if update.data.is_some() {
            sql.push_str(", data = json_patch(data, ?)");
        }
        sql.push_str(", claimed_by = NULL, claim_expires_at = NULL WHERE id = ? AND status = ?");
        if update.holder.is_some() {
            sql.push_str(" AND (claimed_by IS NULL OR claimed_by = ?)");
        }
        sql.push_str(" RETURNING *");

        let mut query = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(update.status.as_str())
            .bind(update.phase.as_str());
        if update.stamp.is_some() {
            query = query.bind(update.now_millis);
        }
        if let ErrorUpdate::Set(err) = &update.error {
            query = query.bind(err.stage.as_str()).bind(err.message.clone());
        }
        if let Some(data) = &update.data {
            query = query.bind(serde_json::Value::Object(data.clone()).to_string());
        }

        query = query
            .bind(&update.lead_id)
            .bind(update.expected_status.as_str());
        if let Some(holder) = &update.holder {
            query = query.bind(holder);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error("update lead status"))?;

        match row {
            Some(row) => row.into_lead(),
            None => match self.current_status(&update.lead_id).await? {
                None => Err(AppError::NotFound(format!(
                    "Lead {} not found",
                    update.lead_id
                ))),
                Some(current) if current != update.expected_status.as_str() => {
                    Err(AppError::Conflict(format!(
                        "Lead {} is {}, expected {}",
                        update.lead_id, current, update.expected_status
                    )))
                }
                Some(_) => Err(AppError::Conflict(format!(
                    "Lead {} is claimed by another worker",
                    update.lead_id
                ))),
            },
        }
    }

    async fn set_phase(&self, id: &str, expected: LeadState, phase: LeadPhase) -> Result<Lead> {
        let row = sqlx::query_as::<_, LeadRow>(
            r#"
            UPDATE leads
            SET current_phase = ?
            WHERE id = ? AND status = ? AND current_phase = ?
            RETURNING *
            "#,
        )
        .bind(phase.as_str())
        .bind(id)
        .bind(expected.status().as_str())
        .bind(expected.phase().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error("update lead phase"))?;

        match row {
            Some(row) => row.into_lead(),
            None => match self.current_status(id).await? {
                None => Err(AppError::NotFound(format!("Lead {} not found", id))),
                Some(_) => Err(AppError::Conflict(format!(
                    "Lead {} is no longer {}/{}",
                    id,
                    expected.status(),
                    expected.phase()
                ))),
            },
        }
    }

    async fn increment_retry_count(&self, id: &str) -> Result<u32> {
        // Atomic increment without reading
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE leads SET retry_count = retry_count + 1 WHERE id = ? RETURNING retry_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error("increment retry count"))?;

        match count {
            Some(count) => Ok(count.max(0) as u32),
            None => Err(AppError::NotFound(format!("Lead {} not found", id))),
        }
    }

    async fn claim_next_batch(
        &self,
        client: &str,
        status: LeadStatus,
        limit: u32,
        lease: &ClaimLease,
    ) -> Result<Vec<Lead>> {
        let sql = format!(
            r#"
            UPDATE leads
            SET claimed_by = ?, claim_expires_at = ?
            WHERE id IN (
                SELECT id FROM leads
                WHERE client = ? AND status = ? AND {UNCLAIMED_AT}
                ORDER BY created_at ASC, id ASC
                LIMIT ?
            )
            RETURNING *
            "#
        );

        let rows = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(&lease.worker_id)
            .bind(lease.expires_at)
            .bind(client)
            .bind(status.as_str())
            .bind(lease.claimed_at)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error("claim leads"))?;

        into_leads(rows)
    }

    async fn release_claim(&self, id: &str, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET claimed_by = NULL, claim_expires_at = NULL
            WHERE id = ? AND claimed_by = ?
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error("release claim"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_expired_claims(&self, now_millis: i64) -> Result<Vec<Lead>> {
        let rows = sqlx::query_as::<_, LeadRow>(
            r#"
            UPDATE leads
            SET claimed_by = NULL, claim_expires_at = NULL
            WHERE claimed_by IS NOT NULL
              AND (claim_expires_at IS NULL OR claim_expires_at <= ?)
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error("release expired claims"))?;

        into_leads(rows)
    }

    async fn find_retryable(
        &self,
        client: &str,
        max_retries: u32,
        limit: u32,
        now_millis: i64,
    ) -> Result<Vec<Lead>> {
        let sql = format!(
            r#"
            SELECT * FROM leads
            WHERE client = ?
              AND status IN (?, ?, ?, ?)
              AND retry_count < ?
              AND {UNCLAIMED_AT}
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#
        );

        let mut query = sqlx::query_as::<_, LeadRow>(&sql).bind(client);
        for status in LeadStatus::FAILED {
            query = query.bind(status.as_str());
        }
        let rows = query
            .bind(i64::from(max_retries))
            .bind(now_millis)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error("find retryable leads"))?;

        into_leads(rows)
    }

    async fn find_by_phase(
        &self,
        client: &str,
        phase: LeadPhase,
        limit: u32,
    ) -> Result<Vec<Lead>> {
        let rows = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT * FROM leads
            WHERE client = ? AND current_phase = ?
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(client)
        .bind(phase.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error("find leads by phase"))?;

        into_leads(rows)
    }

    async fn find_by_job_id(&self, job_id: &str, limit: u32, offset: u32) -> Result<LeadPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error("count leads"))?;

        let rows = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT * FROM leads
            WHERE job_id = ?
            ORDER BY created_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(job_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error("find leads by job"))?;

        Ok(LeadPage {
            leads: into_leads(rows)?,
            total,
            has_more: i64::from(offset) + i64::from(limit) < total,
        })
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct LeadRow {
    id: String,
    client: String,
    job_id: String,
    status: String,
    current_phase: String,
    retry_count: i64,
    error_stage: Option<String>,
    error_message: Option<String>,
    findymail_enriched_at: Option<i64>,
    ai_enriched_at: Option<i64>,
    uploaded_at: Option<i64>,
    created_at: i64,
    data: String, // JSON object
    claimed_by: Option<String>,
    claim_expires_at: Option<i64>,
}

impl LeadRow {
    fn into_lead(self) -> Result<Lead> {
        Ok(Lead {
            status: self.status.parse::<LeadStatus>()?,
            current_phase: self.current_phase.parse::<LeadPhase>()?,
            error_stage: self
                .error_stage
                .as_deref()
                .map(str::parse::<ErrorStage>)
                .transpose()?,
            data: serde_json::from_str(&self.data)?,
            id: self.id,
            client: self.client,
            job_id: self.job_id,
            retry_count: self.retry_count.max(0) as u32,
            error_message: self.error_message,
            findymail_enriched_at: self.findymail_enriched_at,
            ai_enriched_at: self.ai_enriched_at,
            uploaded_at: self.uploaded_at,
            created_at: self.created_at,
            claimed_by: self.claimed_by,
            claim_expires_at: self.claim_expires_at,
        })
    }
}
