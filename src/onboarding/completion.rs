//! Deciding which fields a customer has already answered.

use std::sync::Arc;

use crate::customers::model::Customer;
use crate::error::DatabaseError;
use crate::store::Database;

use super::fields::{ADMINISTRATION, FieldDescriptor, FieldRegistry};

pub struct FieldCompletionChecker {
    db: Arc<dyn Database>,
    registry: Arc<FieldRegistry>,
}

impl FieldCompletionChecker {
    pub fn new(db: Arc<dyn Database>, registry: Arc<FieldRegistry>) -> Self {
        Self { db, registry }
    }

    /// Whether `field` already holds a value for `customer`.
    ///
    /// A stored null or empty string is a recorded skip: complete for
    /// optional fields, incomplete for required ones.
    pub async fn is_complete(
        &self,
        customer: &Customer,
        field: &FieldDescriptor,
    ) -> Result<bool, DatabaseError> {
        if field.name == ADMINISTRATION {
            return Ok(self.db.count_customer_administrative(customer.id).await? > 0);
        }

        match customer.profile_data.get(field.name) {
            None => Ok(false),
            Some(None) => Ok(!field.required),
            Some(Some(value)) if value.is_blank() => Ok(!field.required),
            Some(Some(_)) => Ok(true),
        }
    }

    /// First incomplete required field by priority, else first incomplete
    /// optional field, else `None`.
    pub async fn next_incomplete_field(
        &self,
        customer: &Customer,
    ) -> Result<Option<FieldDescriptor>, DatabaseError> {
        self.next_incomplete_field_except(customer, None).await
    }

    /// Like [`next_incomplete_field`](Self::next_incomplete_field), treating
    /// `resolved` as complete. Used while a save for that field is still
    /// uncommitted.
    pub async fn next_incomplete_field_except(
        &self,
        customer: &Customer,
        resolved: Option<&str>,
    ) -> Result<Option<FieldDescriptor>, DatabaseError> {
        for field in self.registry.required().chain(self.registry.optional()) {
            if Some(field.name) == resolved {
                continue;
            }
            if !self.is_complete(customer, field).await? {
                return Ok(Some(*field));
            }
        }
        Ok(None)
    }
}
