//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::administrative::model::{Administrative, AdministrativeLevel, NewAdministrative};
use crate::customers::model::{Customer, FieldAttempts, FieldCandidates, ProfileData};
use crate::error::DatabaseError;
use crate::onboarding::state::OnboardingStatus;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

fn to_json<T: serde::Serialize>(value: &T, column: &str) -> Result<String, DatabaseError> {
    serde_json::to_string(value)
        .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

/// Parse a JSON column into its typed map. NULL / empty reads as empty.
fn from_json<T>(raw: Option<String>, column: &str) -> Result<T, DatabaseError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match raw {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(&s)
            .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}"))),
        _ => Ok(T::default()),
    }
}

const CUSTOMER_COLUMNS: &str = "id, phone_number, full_name, onboarding_status, current_onboarding_field, onboarding_attempts, onboarding_candidates, profile_data, created_at, updated_at";

const ADMINISTRATIVE_COLUMNS: &str = "id, code, name, level, parent_id, path";

/// Map a libsql Row to a Customer.
///
/// Column order matches CUSTOMER_COLUMNS. The JSON columns are validated
/// into their typed maps here.
fn row_to_customer(row: &libsql::Row) -> Result<Customer, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("customer row parse: {e}"));

    let id: i64 = row.get(0).map_err(parse)?;
    let phone_number: String = row.get(1).map_err(parse)?;
    let full_name: Option<String> = row.get::<String>(2).ok();
    let status_str: String = row.get(3).map_err(parse)?;
    let current_onboarding_field: Option<String> = row.get::<String>(4).ok();
    let attempts_raw: Option<String> = row.get::<String>(5).ok();
    let candidates_raw: Option<String> = row.get::<String>(6).ok();
    let profile_raw: Option<String> = row.get::<String>(7).ok();
    let created_str: String = row.get(8).map_err(parse)?;
    let updated_str: String = row.get(9).map_err(parse)?;

    let onboarding_status: OnboardingStatus = status_str
        .parse()
        .map_err(DatabaseError::Serialization)?;

    Ok(Customer {
        id,
        phone_number,
        full_name,
        onboarding_status,
        current_onboarding_field,
        onboarding_attempts: from_json::<FieldAttempts>(attempts_raw, "onboarding_attempts")?,
        onboarding_candidates: from_json::<FieldCandidates>(
            candidates_raw,
            "onboarding_candidates",
        )?,
        profile_data: from_json::<ProfileData>(profile_raw, "profile_data")?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_administrative(row: &libsql::Row) -> Result<Administrative, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("administrative row parse: {e}"));

    let level_str: String = row.get(3).map_err(parse)?;
    let level: AdministrativeLevel = level_str.parse().map_err(DatabaseError::Serialization)?;

    Ok(Administrative {
        id: row.get(0).map_err(parse)?,
        code: row.get(1).map_err(parse)?,
        name: row.get(2).map_err(parse)?,
        level,
        parent_id: row.get::<i64>(4).ok(),
        path: row.get(5).map_err(parse)?,
    })
}

/// Write the onboarding columns of `customer` on `conn` (a plain connection
/// or an open transaction).
async fn write_onboarding_state(conn: &Connection, customer: &Customer) -> Result<(), DatabaseError> {
    let attempts = to_json(&customer.onboarding_attempts, "onboarding_attempts")?;
    let candidates = to_json(&customer.onboarding_candidates, "onboarding_candidates")?;
    let profile = to_json(&customer.profile_data, "profile_data")?;
    let now = Utc::now().to_rfc3339();

    let updated = conn
        .execute(
            "UPDATE customers SET onboarding_status = ?1, current_onboarding_field = ?2, onboarding_attempts = ?3, onboarding_candidates = ?4, profile_data = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                customer.onboarding_status.as_str(),
                opt_text(customer.current_onboarding_field.as_deref()),
                attempts,
                candidates,
                profile,
                now,
                customer.id,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_onboarding_state: {e}")))?;

    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity: "customer".to_string(),
            id: customer.id.to_string(),
        });
    }
    Ok(())
}

async fn write_administrative_link(
    conn: &Connection,
    customer_id: i64,
    administrative_id: i64,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO customer_administrative (customer_id, administrative_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT (customer_id) DO UPDATE SET administrative_id = ?2, updated_at = ?3",
        params![customer_id, administrative_id, now],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("upsert_customer_administrative: {e}")))?;
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;
        migrations::run_migrations(self.conn()).await
    }

    // ── Customers ───────────────────────────────────────────────────

    async fn create_customer(
        &self,
        phone_number: &str,
        full_name: Option<&str>,
    ) -> Result<Customer, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO customers (phone_number, full_name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![phone_number, opt_text(full_name), now],
        )
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                DatabaseError::Constraint(format!("customer {phone_number} already exists"))
            } else {
                DatabaseError::Query(format!("create_customer: {msg}"))
            }
        })?;

        let id = conn.last_insert_rowid();
        debug!(customer_id = id, "Customer created");

        self.get_customer(id).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "customer".to_string(),
            id: id.to_string(),
        })
    }

    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_customer: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_customer(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_customer: {e}"))),
        }
    }

    async fn get_customer_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Customer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE phone_number = ?1"),
                params![phone_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_customer_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_customer(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_customer_by_phone: {e}"))),
        }
    }

    async fn save_onboarding_state(&self, customer: &Customer) -> Result<(), DatabaseError> {
        write_onboarding_state(self.conn(), customer).await
    }

    async fn save_resolution(
        &self,
        customer: &Customer,
        administrative_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("save_resolution begin: {e}")))?;

        // Dropping `tx` on an early return rolls the transaction back.
        if let Some(area_id) = administrative_id {
            write_administrative_link(&tx, customer.id, area_id).await?;
        }
        write_onboarding_state(&tx, customer).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("save_resolution commit: {e}")))?;
        Ok(())
    }

    async fn delete_customer(&self, id: i64) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM customer_administrative WHERE customer_id = ?1",
            params![id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("delete_customer link: {e}")))?;
        let count = conn
            .execute("DELETE FROM customers WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_customer: {e}")))?;
        Ok(count > 0)
    }

    // ── Administrative areas ────────────────────────────────────────

    async fn insert_administrative(&self, area: &NewAdministrative) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO administrative (code, name, level, parent_id, path) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                area.code.as_str(),
                area.name.as_str(),
                area.level.as_str(),
                opt_int(area.parent_id),
                area.path.as_str(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_administrative: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    async fn get_administrative(&self, id: i64) -> Result<Option<Administrative>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ADMINISTRATIVE_COLUMNS} FROM administrative WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_administrative: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_administrative(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_administrative: {e}"))),
        }
    }

    async fn list_administrative_by_level(
        &self,
        level: AdministrativeLevel,
    ) -> Result<Vec<Administrative>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ADMINISTRATIVE_COLUMNS} FROM administrative WHERE level = ?1 ORDER BY id"
                ),
                params![level.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_administrative_by_level: {e}")))?;

        let mut areas = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_administrative_by_level: {e}")))?
        {
            areas.push(row_to_administrative(&row)?);
        }
        Ok(areas)
    }

    // ── Customer → ward link ────────────────────────────────────────

    async fn count_customer_administrative(&self, customer_id: i64) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM customer_administrative WHERE customer_id = ?1",
                params![customer_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_customer_administrative: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_customer_administrative: {e}"))),
        }
    }

    async fn get_customer_administrative(
        &self,
        customer_id: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT administrative_id FROM customer_administrative WHERE customer_id = ?1",
                params![customer_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_customer_administrative: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_customer_administrative: {e}"))),
        }
    }

    async fn upsert_customer_administrative(
        &self,
        customer_id: i64,
        administrative_id: i64,
    ) -> Result<(), DatabaseError> {
        write_administrative_link(self.conn(), customer_id, administrative_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::administrative::model::join_path;
    use crate::customers::model::{Candidate, ProfileValue};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    async fn insert_ward(db: &LibSqlBackend, segments: &[&str]) -> i64 {
        db.insert_administrative(&NewAdministrative {
            code: segments.join("-").to_lowercase(),
            name: segments.last().unwrap().to_string(),
            level: AdministrativeLevel::Ward,
            parent_id: None,
            path: join_path(segments),
        })
        .await
        .unwrap()
    }

    // ── Customer tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_get_customer() {
        let db = test_db().await;
        let created = db.create_customer("+254700000001", Some("Wanjiru")).await.unwrap();

        assert_eq!(created.phone_number, "+254700000001");
        assert_eq!(created.full_name.as_deref(), Some("Wanjiru"));
        assert_eq!(created.onboarding_status, OnboardingStatus::NotStarted);
        assert!(created.profile_data.is_empty());

        let fetched = db.get_customer(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);

        let by_phone = db.get_customer_by_phone("+254700000001").await.unwrap().unwrap();
        assert_eq!(by_phone.id, created.id);
    }

    #[tokio::test]
    async fn get_customer_not_found() {
        let db = test_db().await;
        assert!(db.get_customer(42).await.unwrap().is_none());
        assert!(db.get_customer_by_phone("+0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_phone_is_constraint_error() {
        let db = test_db().await;
        db.create_customer("+1", None).await.unwrap();
        let err = db.create_customer("+1", None).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn onboarding_state_roundtrip() {
        let db = test_db().await;
        let mut customer = db.create_customer("+1", None).await.unwrap();

        customer.onboarding_status = OnboardingStatus::InProgress;
        customer.current_onboarding_field = Some("administration".to_string());
        customer.record_attempt("administration");
        customer.set_candidates("administration", vec![Candidate::Area(3), Candidate::Area(5)]);
        customer.set_profile_value("crop_type", Some(ProfileValue::from("Maize")));
        customer.set_profile_value("gender", None);
        customer.set_profile_value("birth_year", Some(ProfileValue::Integer(1985)));

        db.save_onboarding_state(&customer).await.unwrap();

        let fetched = db.get_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(fetched.onboarding_status, OnboardingStatus::InProgress);
        assert_eq!(fetched.current_onboarding_field.as_deref(), Some("administration"));
        assert_eq!(fetched.attempts("administration"), 1);
        assert_eq!(
            fetched.candidates("administration"),
            &[Candidate::Area(3), Candidate::Area(5)]
        );
        assert_eq!(fetched.profile_data, customer.profile_data);
    }

    #[tokio::test]
    async fn save_state_for_missing_customer_fails() {
        let db = test_db().await;
        let ghost = Customer::new(999, "+999");
        let err = db.save_onboarding_state(&ghost).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_json_column_is_serialization_error() {
        let db = test_db().await;
        let customer = db.create_customer("+1", None).await.unwrap();
        db.conn()
            .execute(
                "UPDATE customers SET onboarding_attempts = '{\"crop_type\": \"three\"}' WHERE id = ?1",
                params![customer.id],
            )
            .await
            .unwrap();

        let err = db.get_customer(customer.id).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    // ── Administrative tests ────────────────────────────────────────

    #[tokio::test]
    async fn administrative_insert_get_and_list() {
        let db = test_db().await;
        let region = db
            .insert_administrative(&NewAdministrative {
                code: "nbo".into(),
                name: "Nairobi Region".into(),
                level: AdministrativeLevel::Region,
                parent_id: None,
                path: "Kenya > Nairobi Region".into(),
            })
            .await
            .unwrap();
        let ward = insert_ward(&db, &["Kenya", "Nairobi Region", "Central District", "Westlands Ward"]).await;

        let fetched = db.get_administrative(ward).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Westlands Ward");
        assert_eq!(fetched.level, AdministrativeLevel::Ward);

        let wards = db.list_administrative_by_level(AdministrativeLevel::Ward).await.unwrap();
        assert_eq!(wards.len(), 1);
        assert_ne!(wards[0].id, region);

        assert!(db.get_administrative(12345).await.unwrap().is_none());
    }

    // ── Link tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn link_upsert_updates_in_place() {
        let db = test_db().await;
        let customer = db.create_customer("+1", None).await.unwrap();
        let a = insert_ward(&db, &["Kenya", "R", "D", "Ward A"]).await;
        let b = insert_ward(&db, &["Kenya", "R", "D", "Ward B"]).await;

        assert_eq!(db.count_customer_administrative(customer.id).await.unwrap(), 0);

        db.upsert_customer_administrative(customer.id, a).await.unwrap();
        db.upsert_customer_administrative(customer.id, b).await.unwrap();

        assert_eq!(db.count_customer_administrative(customer.id).await.unwrap(), 1);
        assert_eq!(db.get_customer_administrative(customer.id).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn save_resolution_writes_link_and_state() {
        let db = test_db().await;
        let mut customer = db.create_customer("+1", None).await.unwrap();
        let ward = insert_ward(&db, &["Kenya", "R", "D", "Ward A"]).await;

        customer.onboarding_status = OnboardingStatus::InProgress;
        customer.current_onboarding_field = Some("crop_type".into());
        db.save_resolution(&customer, Some(ward)).await.unwrap();

        assert_eq!(db.get_customer_administrative(customer.id).await.unwrap(), Some(ward));
        let fetched = db.get_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(fetched.current_onboarding_field.as_deref(), Some("crop_type"));
    }

    #[tokio::test]
    async fn save_resolution_rolls_back_link_on_failure() {
        let db = test_db().await;
        let ward = insert_ward(&db, &["Kenya", "R", "D", "Ward A"]).await;
        let real = db.create_customer("+1", None).await.unwrap();

        // Link insert succeeds for the real id but the state update targets
        // a customer row that does not exist.
        let mut ghost = real.clone();
        ghost.id = real.id + 100;
        let err = db.save_resolution(&ghost, Some(ward)).await;
        assert!(err.is_err());

        assert_eq!(db.count_customer_administrative(ghost.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_customer_removes_link() {
        let db = test_db().await;
        let customer = db.create_customer("+1", None).await.unwrap();
        let ward = insert_ward(&db, &["Kenya", "R", "D", "Ward A"]).await;
        db.upsert_customer_administrative(customer.id, ward).await.unwrap();

        assert!(db.delete_customer(customer.id).await.unwrap());
        assert!(db.get_customer(customer.id).await.unwrap().is_none());
        assert_eq!(db.count_customer_administrative(customer.id).await.unwrap(), 0);
        assert!(!db.delete_customer(customer.id).await.unwrap());
    }

    #[tokio::test]
    async fn on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agri.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create_customer("+1", None).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_customer_by_phone("+1").await.unwrap().is_some());
    }
}
