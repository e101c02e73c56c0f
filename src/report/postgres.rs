//! Postgres report repository (`device_reports`, `report_attachments`).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{
    repo::{RepoError, ReportRepository, DEVICE_IDENTIFIER_KEY, PAYMENT_REFERENCE_KEY},
    AttachmentInfo, DeviceReport, ReportStatus, StationSummary,
};
use crate::{wizard::fields::UploadedFile, BoxFuture};

/// Partial unique index over `Payment Pending` references (sql/schema.sql).
const PAYMENT_REFERENCE_CONSTRAINT: &str = "device_reports_payment_ref_key";

const REPORT_COLUMNS: &str = r"
    id, owner_full_name, owner_phone_number, owner_email, owner_address,
    imei, brand, model, color, device_phone_number,
    incident_date, incident_time, incident_type, incident_location,
    ocr_verification_status, transaction_ref, status,
    reported_by, station_id, created_at, updated_at
";

#[derive(Clone, Debug)]
pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_attachments(&self, report_id: Uuid) -> Result<Vec<AttachmentInfo>> {
        let query = r"
            SELECT kind, file_name, content_type, size_bytes
            FROM report_attachments
            WHERE report_id = $1
            ORDER BY created_at, kind
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(report_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load report attachments")?;

        Ok(rows
            .iter()
            .map(|row| AttachmentInfo {
                kind: row.get("kind"),
                file_name: row.get("file_name"),
                content_type: row.get("content_type"),
                size_bytes: row.get("size_bytes"),
            })
            .collect())
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        bind: impl for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send,
    ) -> Result<Option<DeviceReport>> {
        let query = format!("SELECT {REPORT_COLUMNS} FROM device_reports WHERE {clause} LIMIT 1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load device report")?;
        row.as_ref().map(report_from_row).transpose()
    }
}

/// `true` for Postgres unique-constraint violations (SQLSTATE 23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

/// Field named by a unique violation, from the constraint that fired.
fn duplicate_key(err: &sqlx::Error) -> &'static str {
    let constraint = match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    };
    if constraint == Some(PAYMENT_REFERENCE_CONSTRAINT) {
        PAYMENT_REFERENCE_KEY
    } else {
        DEVICE_IDENTIFIER_KEY
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23503")
}

fn has_sqlstate(err: &sqlx::Error, sqlstate: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == sqlstate),
        _ => false,
    }
}

fn report_from_row(row: &PgRow) -> Result<DeviceReport> {
    let status: String = row.get("status");
    let status =
        ReportStatus::parse(&status).ok_or_else(|| anyhow!("unknown report status: {status}"))?;
    Ok(DeviceReport {
        id: row.get("id"),
        owner_full_name: row.get("owner_full_name"),
        owner_phone_number: row.get("owner_phone_number"),
        owner_email: row.get("owner_email"),
        owner_address: row.get("owner_address"),
        imei: row.get("imei"),
        brand: row.get("brand"),
        model: row.get("model"),
        color: row.get("color"),
        device_phone_number: row.get("device_phone_number"),
        incident_date: row.get("incident_date"),
        incident_time: row.get("incident_time"),
        incident_type: row.get("incident_type"),
        incident_location: row.get("incident_location"),
        ocr_verification_status: row.get("ocr_verification_status"),
        transaction_ref: row.get("transaction_ref"),
        status,
        reported_by: row.get("reported_by"),
        station_id: row.get("station_id"),
        attachments: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl ReportRepository for PgReportRepository {
    fn insert_unique<'a>(
        &'a self,
        report: &'a DeviceReport,
        attachments: &'a [UploadedFile],
    ) -> BoxFuture<'a, Result<(), RepoError>> {
        Box::pin(async move {
            // Report and attachments commit together or not at all.
            let mut tx = self
                .pool
                .begin()
                .await
                .context("begin report transaction")?;

            let query = r"
                INSERT INTO device_reports (
                    id, owner_full_name, owner_phone_number, owner_email, owner_address,
                    imei, brand, model, color, device_phone_number,
                    incident_date, incident_time, incident_type, incident_location,
                    ocr_verification_status, transaction_ref, status,
                    reported_by, station_id, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                        $15, $16, $17, $18, $19, $20, $21)
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let inserted = sqlx::query(query)
                .bind(report.id)
                .bind(&report.owner_full_name)
                .bind(&report.owner_phone_number)
                .bind(&report.owner_email)
                .bind(&report.owner_address)
                .bind(&report.imei)
                .bind(&report.brand)
                .bind(&report.model)
                .bind(&report.color)
                .bind(&report.device_phone_number)
                .bind(report.incident_date)
                .bind(report.incident_time)
                .bind(&report.incident_type)
                .bind(&report.incident_location)
                .bind(report.ocr_verification_status)
                .bind(&report.transaction_ref)
                .bind(report.status.as_str())
                .bind(report.reported_by)
                .bind(report.station_id)
                .bind(report.created_at)
                .bind(report.updated_at)
                .execute(&mut *tx)
                .instrument(span)
                .await;

            if let Err(err) = inserted {
                if is_unique_violation(&err) {
                    let _ = tx.rollback().await;
                    return Err(RepoError::DuplicateKey(duplicate_key(&err)));
                }
                if is_foreign_key_violation(&err) {
                    let _ = tx.rollback().await;
                    return Err(RepoError::MissingReference("station_id"));
                }
                return Err(RepoError::Other(
                    anyhow::Error::new(err).context("failed to insert device report"),
                ));
            }

            let query = r"
                INSERT INTO report_attachments
                    (report_id, kind, file_name, content_type, size_bytes, content)
                VALUES ($1, $2, $3, $4, $5, $6)
            ";
            for file in attachments {
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "INSERT",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(report.id)
                    .bind(&file.field)
                    .bind(&file.file_name)
                    .bind(&file.content_type)
                    .bind(i64::try_from(file.bytes.len()).unwrap_or(i64::MAX))
                    .bind(&file.bytes)
                    .execute(&mut *tx)
                    .instrument(span)
                    .await
                    .context("failed to insert report attachment")?;
            }

            tx.commit().await.context("commit report transaction")?;
            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<DeviceReport>>> {
        Box::pin(async move {
            let Some(mut report) = self.fetch_one_where("id = $1", id).await? else {
                return Ok(None);
            };
            report.attachments = self.fetch_attachments(report.id).await?;
            Ok(Some(report))
        })
    }

    fn find_stolen_by_imei<'a>(
        &'a self,
        imei: &'a str,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async move { self.fetch_one_where("imei = $1 AND status = 'Stolen'", imei).await })
    }

    fn find_by_transaction_ref<'a>(
        &'a self,
        reference: &'a str,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async move { self.fetch_one_where("transaction_ref = $1", reference).await })
    }

    fn list_for_station<'a>(
        &'a self,
        station_id: Uuid,
        search: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<DeviceReport>>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {REPORT_COLUMNS} FROM device_reports \
                 WHERE station_id = $1 \
                   AND ($2::text IS NULL OR imei ILIKE '%' || $2 || '%') \
                 ORDER BY created_at DESC"
            );
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            let rows = sqlx::query(&query)
                .bind(station_id)
                .bind(search)
                .fetch_all(&self.pool)
                .instrument(span)
                .await
                .context("failed to list station reports")?;
            rows.iter().map(report_from_row).collect()
        })
    }

    fn station_summary(
        &self,
        station_id: Uuid,
        month_start: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<StationSummary>> {
        Box::pin(async move {
            let query = r"
                SELECT
                    COUNT(*) FILTER (WHERE created_at >= $2) AS reports_this_month,
                    COUNT(*) FILTER (WHERE status = 'Pending') AS pending_review,
                    COUNT(*) FILTER (WHERE status = 'Recovered') AS recovered
                FROM device_reports
                WHERE station_id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(station_id)
                .bind(month_start)
                .fetch_one(&self.pool)
                .instrument(span)
                .await
                .context("failed to summarise station reports")?;
            Ok(StationSummary {
                reports_this_month_count: row.get("reports_this_month"),
                pending_review_count: row.get("pending_review"),
                recently_recovered_count: row.get("recovered"),
            })
        })
    }

    fn update_status(
        &self,
        id: Uuid,
        status: ReportStatus,
    ) -> BoxFuture<'_, Result<Option<DeviceReport>>> {
        Box::pin(async move {
            let query = format!(
                "UPDATE device_reports SET status = $2, updated_at = NOW() \
                 WHERE id = $1 RETURNING {REPORT_COLUMNS}"
            );
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query.as_str()
            );
            let row = sqlx::query(&query)
                .bind(id)
                .bind(status.as_str())
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to update report status")?;
            row.as_ref().map(report_from_row).transpose()
        })
    }

    fn transition_status_by_reference<'a>(
        &'a self,
        reference: &'a str,
        from: ReportStatus,
        to: ReportStatus,
    ) -> BoxFuture<'a, Result<Option<DeviceReport>>> {
        Box::pin(async move {
            // Conditional update: a concurrent or repeated callback matches no row.
            let query = format!(
                "UPDATE device_reports SET status = $3, updated_at = NOW() \
                 WHERE transaction_ref = $1 AND status = $2 RETURNING {REPORT_COLUMNS}"
            );
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query.as_str()
            );
            let row = sqlx::query(&query)
                .bind(reference)
                .bind(from.as_str())
                .bind(to.as_str())
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to transition report status")?;
            row.as_ref().map(report_from_row).transpose()
        })
    }
}
