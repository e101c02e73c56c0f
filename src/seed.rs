//! Destructive demo reseed.
//!
//! Deletes every report, every non-superuser officer and every station, then
//! creates one command per state (36 states + FCT), two officers per command
//! and 100 random reports. Runs in a single transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{info, info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{hash_password, Station},
    report::{DeviceReport, ReportStatus},
};

pub const DEMO_PASSWORD: &str = "password123";
pub const OFFICERS_PER_STATION: usize = 2;
pub const DEMO_REPORTS: usize = 100;

pub const STATES: &[&str] = &[
    "Abia", "Adamawa", "Akwa Ibom", "Anambra", "Bauchi", "Bayelsa", "Benue", "Borno",
    "Cross River", "Delta", "Ebonyi", "Edo", "Ekiti", "Enugu", "Gombe", "Imo", "Jigawa",
    "Kaduna", "Kano", "Katsina", "Kebbi", "Kogi", "Kwara", "Lagos", "Nasarawa", "Niger",
    "Ogun", "Ondo", "Osun", "Oyo", "Plateau", "Rivers", "Sokoto", "Taraba", "Yobe",
    "Zamfara", "FCT",
];

const BRANDS: &[(&str, &[&str])] = &[
    ("Samsung", &["Galaxy S23", "Galaxy A54", "Z Fold 5", "Galaxy M34"]),
    ("Apple", &["iPhone 15 Pro", "iPhone 14", "iPhone SE", "iPhone 13"]),
    ("Tecno", &["Camon 20", "Spark 10", "Phantom X2", "Pop 7"]),
    ("Infinix", &["Note 30", "Hot 30", "Zero Ultra", "Smart 7"]),
    ("Google", &["Pixel 8", "Pixel 7a", "Pixel 6"]),
    ("Xiaomi", &["Redmi Note 12", "Poco X5", "Redmi 12C"]),
];
const COLORS: &[&str] = &["Black", "Silver", "Blue", "Gold", "White", "Graphite"];
const INCIDENT_TYPES: &[&str] = &["Robbery", "Snatching", "Lost", "Burglary", "Pickpocketing"];
const LOCATIONS: &[&str] = &["Market", "Bus Stop", "Home", "Office", "Public Transit"];
const STATUSES: &[ReportStatus] = &[
    ReportStatus::Stolen,
    ReportStatus::Recovered,
    ReportStatus::PendingReview,
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoOfficer {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub station_id: Uuid,
}

#[derive(Clone, Debug)]
pub struct DemoDataset {
    pub stations: Vec<Station>,
    pub officers: Vec<DemoOfficer>,
    pub reports: Vec<DeviceReport>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct SeedSummary {
    pub stations: usize,
    pub officers: usize,
    pub reports: usize,
}

fn station_name(state: &str) -> String {
    if state == "FCT" {
        "Abuja FCT Command".to_string()
    } else {
        format!("{state} State Command")
    }
}

fn random_imei<R: Rng>(rng: &mut R) -> String {
    (0..15)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Build the demo dataset without touching storage.
pub fn generate<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> DemoDataset {
    let stations: Vec<Station> = STATES
        .iter()
        .map(|state| Station {
            id: Uuid::new_v4(),
            name: station_name(state),
            location: (*state).to_string(),
        })
        .collect();

    let mut usernames = HashSet::new();
    let mut officers = Vec::new();
    for station in &stations {
        let code: String = station
            .location
            .to_uppercase()
            .chars()
            .take(3)
            .collect();
        for n in 1..=OFFICERS_PER_STATION {
            let username = format!("{code}0{n}");
            if !usernames.insert(username.clone()) {
                continue;
            }
            officers.push(DemoOfficer {
                id: Uuid::new_v4(),
                email: format!("officer.{}@safeimei.com", username.to_lowercase()),
                username,
                station_id: station.id,
            });
        }
    }

    let mut imeis = HashSet::new();
    let mut reports = Vec::with_capacity(DEMO_REPORTS);
    for index in 0..DEMO_REPORTS {
        let Some(officer) = officers.choose(rng) else {
            break;
        };
        let Some((brand, models)) = BRANDS.choose(rng) else {
            break;
        };
        let mut imei = random_imei(rng);
        while !imeis.insert(imei.clone()) {
            imei = random_imei(rng);
        }
        let created_at = now - Duration::days(rng.gen_range(0..30));

        reports.push(DeviceReport {
            id: Uuid::now_v7(),
            owner_full_name: format!("Victim Name {}", index + 1),
            owner_phone_number: format!("080{}", rng.gen_range(10_000_000..100_000_000)),
            owner_email: None,
            owner_address: None,
            imei,
            brand: (*brand).to_string(),
            model: models.choose(rng).copied().unwrap_or_default().to_string(),
            color: COLORS.choose(rng).map(|c| (*c).to_string()),
            device_phone_number: None,
            incident_date: (now - Duration::days(rng.gen_range(1..=365))).date_naive(),
            incident_time: now.time(),
            incident_type: INCIDENT_TYPES
                .choose(rng)
                .copied()
                .unwrap_or("Other")
                .to_string(),
            incident_location: LOCATIONS.choose(rng).map(|l| (*l).to_string()),
            ocr_verification_status: false,
            transaction_ref: format!("PAYSTACK_{}", rng.gen_range(100_000_000..1_000_000_000)),
            status: STATUSES
                .choose(rng)
                .copied()
                .unwrap_or(ReportStatus::INITIAL),
            reported_by: Some(officer.id),
            station_id: officer.station_id,
            attachments: Vec::new(),
            created_at,
            updated_at: created_at,
        });
    }

    DemoDataset {
        stations,
        officers,
        reports,
    }
}

async fn execute(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, query: &str) -> Result<u64> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = query.split_whitespace().next().unwrap_or("QUERY"),
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .with_context(|| format!("seed statement failed: {query}"))?;
    Ok(result.rows_affected())
}

/// Wipe and repopulate the demo data.
///
/// # Errors
/// Returns an error if hashing or any statement fails; nothing is committed then.
pub async fn reseed(pool: &PgPool) -> Result<SeedSummary> {
    let dataset = generate(&mut StdRng::from_entropy(), Utc::now());
    let password_hash = tokio::task::spawn_blocking(|| hash_password(DEMO_PASSWORD))
        .await
        .context("password hashing task failed")??;

    let mut tx = pool.begin().await.context("begin seed transaction")?;

    let deleted = execute(&mut tx, "DELETE FROM device_reports").await?;
    execute(&mut tx, "UPDATE officers SET station_id = NULL WHERE is_superuser").await?;
    execute(&mut tx, "DELETE FROM officers WHERE NOT is_superuser").await?;
    execute(&mut tx, "DELETE FROM stations").await?;
    info!(deleted, "old demo data removed");

    let query = "INSERT INTO stations (id, name, location) VALUES ($1, $2, $3)";
    for station in &dataset.stations {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(station.id)
            .bind(&station.name)
            .bind(&station.location)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert station")?;
    }

    let query = r"
        INSERT INTO officers (id, username, email, password_hash, station_id)
        VALUES ($1, $2, $3, $4, $5)
    ";
    for officer in &dataset.officers {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(officer.id)
            .bind(&officer.username)
            .bind(&officer.email)
            .bind(&password_hash)
            .bind(officer.station_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert officer")?;
    }

    let query = r"
        INSERT INTO device_reports (
            id, owner_full_name, owner_phone_number, imei, brand, model, color,
            incident_date, incident_time, incident_type, incident_location,
            transaction_ref, status, reported_by, station_id, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    ";
    for report in &dataset.reports {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(report.id)
            .bind(&report.owner_full_name)
            .bind(&report.owner_phone_number)
            .bind(&report.imei)
            .bind(&report.brand)
            .bind(&report.model)
            .bind(&report.color)
            .bind(report.incident_date)
            .bind(report.incident_time)
            .bind(&report.incident_type)
            .bind(&report.incident_location)
            .bind(&report.transaction_ref)
            .bind(report.status.as_str())
            .bind(report.reported_by)
            .bind(report.station_id)
            .bind(report.created_at)
            .bind(report.updated_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert demo report")?;
    }

    tx.commit().await.context("commit seed transaction")?;

    let summary = SeedSummary {
        stations: dataset.stations.len(),
        officers: dataset.officers.len(),
        reports: dataset.reports.len(),
    };
    info!(
        stations = summary.stations,
        officers = summary.officers,
        reports = summary.reports,
        "database seeding complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::fields::is_device_identifier;

    fn dataset() -> DemoDataset {
        generate(&mut StdRng::seed_from_u64(7), Utc::now())
    }

    #[test]
    fn one_command_per_state() {
        let data = dataset();
        assert_eq!(data.stations.len(), 37);
        let names: HashSet<&str> = data.stations.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains("Lagos State Command"));
        assert!(names.contains("Abuja FCT Command"));
        assert!(!names.contains("FCT State Command"));
    }

    #[test]
    fn officers_have_state_codes() {
        let data = dataset();
        let lagos = data
            .officers
            .iter()
            .find(|o| o.username == "LAG01")
            .map(|o| o.email.as_str());
        assert_eq!(lagos, Some("officer.lag01@safeimei.com"));
        assert!(data.officers.iter().any(|o| o.username == "FCT02"));
        let unique: HashSet<&str> = data.officers.iter().map(|o| o.username.as_str()).collect();
        assert_eq!(unique.len(), data.officers.len());
        assert_eq!(data.officers.len(), STATES.len() * OFFICERS_PER_STATION);
    }

    #[test]
    fn reports_are_valid_and_unique() {
        let data = dataset();
        assert_eq!(data.reports.len(), DEMO_REPORTS);
        let imeis: HashSet<&str> = data.reports.iter().map(|r| r.imei.as_str()).collect();
        assert_eq!(imeis.len(), DEMO_REPORTS);
        for report in &data.reports {
            assert!(is_device_identifier(&report.imei));
            assert!(STATUSES.contains(&report.status));
            let officer = data
                .officers
                .iter()
                .find(|o| Some(o.id) == report.reported_by);
            assert_eq!(officer.map(|o| o.station_id), Some(report.station_id));
        }
    }
}
