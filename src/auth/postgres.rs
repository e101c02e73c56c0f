//! Officer directory backed by the `officers` and `stations` tables.

use anyhow::{anyhow, Context, Result};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use super::{OfficerDirectory, Principal, Station};
use crate::BoxFuture;

const PRINCIPAL_COLUMNS: &str = r"
    o.id, o.username, o.email, o.phone, o.password_hash, o.is_superuser,
    s.id AS station_id, s.name AS station_name, s.location AS station_location
";

#[derive(Clone, Debug)]
pub struct PgOfficerDirectory {
    pool: PgPool,
}

impl PgOfficerDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Hash a password into an Argon2id PHC string.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn principal_from_row(row: &PgRow) -> Principal {
    let station_id: Option<Uuid> = row.get("station_id");
    let station = station_id.map(|id| Station {
        id,
        name: row.get("station_name"),
        location: row.get("station_location"),
    });
    Principal {
        officer_id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        phone: row.get("phone"),
        station,
        is_superuser: row.get("is_superuser"),
    }
}

fn station_from_row(row: &PgRow) -> Station {
    Station {
        id: row.get("id"),
        name: row.get("name"),
        location: row.get("location"),
    }
}

impl OfficerDirectory for PgOfficerDirectory {
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Option<Principal>>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {PRINCIPAL_COLUMNS} FROM officers o \
                 LEFT JOIN stations s ON s.id = o.station_id \
                 WHERE o.username = $1 AND o.is_active"
            );
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            let row = sqlx::query(&query)
                .bind(username)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup officer")?;

            let Some(row) = row else {
                return Ok(None);
            };
            let stored_hash: String = row.get("password_hash");
            let password = password.to_string();

            // Argon2 is CPU bound; keep it off the async workers.
            let matches =
                tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
                    .await
                    .context("password verification task failed")?;

            if matches {
                Ok(Some(principal_from_row(&row)))
            } else {
                warn!(username, "password mismatch");
                Ok(None)
            }
        })
    }

    fn lookup(&self, officer_id: Uuid) -> BoxFuture<'_, Result<Option<Principal>>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {PRINCIPAL_COLUMNS} FROM officers o \
                 LEFT JOIN stations s ON s.id = o.station_id \
                 WHERE o.id = $1 AND o.is_active"
            );
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query.as_str()
            );
            let row = sqlx::query(&query)
                .bind(officer_id)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup officer by id")?;

            Ok(row.as_ref().map(principal_from_row))
        })
    }

    fn station_contacts(&self, station_id: Uuid) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let query = r"
                SELECT email
                FROM officers
                WHERE station_id = $1
                  AND is_active
                  AND email IS NOT NULL
                  AND email <> ''
                ORDER BY username
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let rows = sqlx::query(query)
                .bind(station_id)
                .fetch_all(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup station contacts")?;

            Ok(rows.iter().map(|row| row.get("email")).collect())
        })
    }

    fn stations(&self) -> BoxFuture<'_, Result<Vec<Station>>> {
        Box::pin(async move {
            let query = "SELECT id, name, location FROM stations ORDER BY name";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let rows = sqlx::query(query)
                .fetch_all(&self.pool)
                .instrument(span)
                .await
                .context("failed to list stations")?;

            Ok(rows.iter().map(station_from_row).collect())
        })
    }

    fn station(&self, station_id: Uuid) -> BoxFuture<'_, Result<Option<Station>>> {
        Box::pin(async move {
            let query = "SELECT id, name, location FROM stations WHERE id = $1";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(station_id)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup station")?;

            Ok(row.as_ref().map(station_from_row))
        })
    }
}
