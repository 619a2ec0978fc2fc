//! Customer record and its typed onboarding state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::onboarding::state::OnboardingStatus;

/// A scalar profile value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Integer(i64),
    Text(String),
}

impl ProfileValue {
    /// Whether this value counts as "nothing recorded" (an empty string).
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl std::fmt::Display for ProfileValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ProfileValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ProfileValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ProfileValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// A value offered to the customer for selection.
///
/// Location candidates are administrative-area ids; other fields store the
/// raw option text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Candidate {
    Area(i64),
    Value(String),
}

/// Field name → attempts used in the current collection episode.
pub type FieldAttempts = BTreeMap<String, u32>;
/// Field name → candidates currently presented for selection.
pub type FieldCandidates = BTreeMap<String, Vec<Candidate>>;
/// Field name → stored value; `None` records an explicit skip.
pub type ProfileData = BTreeMap<String, Option<ProfileValue>>;

/// A farmer known to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub phone_number: String,
    pub full_name: Option<String>,
    pub onboarding_status: OnboardingStatus,
    pub current_onboarding_field: Option<String>,
    pub onboarding_attempts: FieldAttempts,
    pub onboarding_candidates: FieldCandidates,
    pub profile_data: ProfileData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// A fresh customer with default onboarding state (not yet persisted).
    pub fn new(id: i64, phone_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            phone_number: phone_number.into(),
            full_name: None,
            onboarding_status: OnboardingStatus::NotStarted,
            current_onboarding_field: None,
            onboarding_attempts: FieldAttempts::new(),
            onboarding_candidates: FieldCandidates::new(),
            profile_data: ProfileData::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempts(&self, field: &str) -> u32 {
        self.onboarding_attempts.get(field).copied().unwrap_or(0)
    }

    /// Increment and return the attempt count for `field`.
    pub fn record_attempt(&mut self, field: &str) -> u32 {
        let count = self.onboarding_attempts.entry(field.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Pending candidates for `field`; empty when nothing awaits selection.
    pub fn candidates(&self, field: &str) -> &[Candidate] {
        self.onboarding_candidates
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_candidates(&mut self, field: &str, candidates: Vec<Candidate>) {
        self.onboarding_candidates.insert(field.to_string(), candidates);
    }

    /// Drop attempts and candidates for `field`, and release it as the
    /// current field if it is.
    pub fn clear_field_state(&mut self, field: &str) {
        self.onboarding_attempts.remove(field);
        self.onboarding_candidates.remove(field);
        if self.current_onboarding_field.as_deref() == Some(field) {
            self.current_onboarding_field = None;
        }
    }

    /// Whether `profile_data` has an entry for `field` (including a skip).
    pub fn has_profile_entry(&self, field: &str) -> bool {
        self.profile_data.contains_key(field)
    }

    pub fn profile_value(&self, field: &str) -> Option<&ProfileValue> {
        self.profile_data.get(field).and_then(Option::as_ref)
    }

    pub fn set_profile_value(&mut self, field: &str, value: Option<ProfileValue>) {
        self.profile_data.insert(field.to_string(), value);
    }
}
