//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;

use crate::administrative::model::{Administrative, AdministrativeLevel, NewAdministrative};
use crate::customers::model::Customer;
use crate::error::DatabaseError;

/// Backend-agnostic database trait covering customers, administrative areas,
/// and the customer → ward link.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Customers ───────────────────────────────────────────────────

    /// Insert a new customer with default onboarding state.
    async fn create_customer(
        &self,
        phone_number: &str,
        full_name: Option<&str>,
    ) -> Result<Customer, DatabaseError>;

    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, DatabaseError>;

    async fn get_customer_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Customer>, DatabaseError>;

    /// Look a customer up by phone, creating one on first contact.
    async fn get_or_create_customer(&self, phone_number: &str) -> Result<Customer, DatabaseError> {
        if let Some(customer) = self.get_customer_by_phone(phone_number).await? {
            return Ok(customer);
        }
        match self.create_customer(phone_number, None).await {
            // Lost a first-contact race; the other insert won.
            Err(DatabaseError::Constraint(_)) => self
                .get_customer_by_phone(phone_number)
                .await?
                .ok_or_else(|| DatabaseError::NotFound {
                    entity: "customer".to_string(),
                    id: phone_number.to_string(),
                }),
            other => other,
        }
    }

    /// Persist the onboarding columns and profile data of `customer`.
    async fn save_onboarding_state(&self, customer: &Customer) -> Result<(), DatabaseError>;

    /// Persist onboarding state and, if given, point the customer's
    /// administrative link at `administrative_id`, in one transaction.
    async fn save_resolution(
        &self,
        customer: &Customer,
        administrative_id: Option<i64>,
    ) -> Result<(), DatabaseError>;

    /// Delete a customer and its administrative link.
    async fn delete_customer(&self, id: i64) -> Result<bool, DatabaseError>;

    // ── Administrative areas ────────────────────────────────────────

    async fn insert_administrative(&self, area: &NewAdministrative) -> Result<i64, DatabaseError>;

    async fn get_administrative(&self, id: i64) -> Result<Option<Administrative>, DatabaseError>;

    async fn list_administrative_by_level(
        &self,
        level: AdministrativeLevel,
    ) -> Result<Vec<Administrative>, DatabaseError>;

    // ── Customer → ward link ────────────────────────────────────────

    async fn count_customer_administrative(&self, customer_id: i64) -> Result<i64, DatabaseError>;

    /// The linked administrative id, if any.
    async fn get_customer_administrative(
        &self,
        customer_id: i64,
    ) -> Result<Option<i64>, DatabaseError>;

    /// Update the link in place if one exists, else insert it.
    async fn upsert_customer_administrative(
        &self,
        customer_id: i64,
        administrative_id: i64,
    ) -> Result<(), DatabaseError>;
}
