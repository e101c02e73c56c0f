//! Postgres-backed session store (`portal_sessions`).

use anyhow::{Context, Result};
use sqlx::{types::Json, PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument};

use super::{SessionData, SessionKey, SessionStore};
use crate::BoxFuture;

#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SessionStore for PgSessionStore {
    fn load<'a>(&'a self, key: &'a SessionKey) -> BoxFuture<'a, Result<Option<SessionData>>> {
        Box::pin(async move {
            let query = r"
                SELECT data
                FROM portal_sessions
                WHERE token_hash = $1
                  AND expires_at > NOW()
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(key.as_bytes())
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to load session")?;

            row.map(|row| {
                row.try_get::<Json<SessionData>, _>("data")
                    .map(|Json(data)| data)
                    .context("failed to decode session data")
            })
            .transpose()
        })
    }

    fn save<'a>(
        &'a self,
        key: &'a SessionKey,
        data: &'a SessionData,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
            let query = r"
                INSERT INTO portal_sessions (token_hash, data, expires_at, updated_at)
                VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'), NOW())
                ON CONFLICT (token_hash) DO UPDATE
                SET data = EXCLUDED.data,
                    expires_at = EXCLUDED.expires_at,
                    updated_at = NOW()
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(key.as_bytes())
                .bind(Json(data))
                .bind(ttl_seconds)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to save session")?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a SessionKey) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let query = "DELETE FROM portal_sessions WHERE token_hash = $1";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(key.as_bytes())
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to delete session")?;
            Ok(())
        })
    }
}
