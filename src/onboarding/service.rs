//! The onboarding state machine.
//!
//! One inbound message advances a customer by at most one step: ask the
//! next question, interpret an answer, handle a pick from a numbered list,
//! or finish. Every outcome is a reply for the farmer; store and model
//! failures become apologies or re-prompts instead of errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::administrative::model::Administrative;
use crate::config::{MatcherConfig, OnboardingConfig};
use crate::customers::model::{Candidate, Customer, FieldAttempts, ProfileData, ProfileValue};
use crate::error::{DatabaseError, OnboardingError, Result};
use crate::llm::LlmProvider;
use crate::store::Database;

use super::completion::FieldCompletionChecker;
use super::extract::{Extraction, FieldExtractor};
use super::fields::{ExtractionMethod, FieldDescriptor, FieldRegistry, FieldType};
use super::matcher::LocationMatcher;
use super::prompts;
use super::selection::{is_skip, parse_selection};
use super::state::OnboardingStatus;

/// Status reported with each reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    AwaitingSelection,
    Completed,
    Failed,
}

/// Reply to one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnboardingResponse {
    /// Text to relay to the farmer verbatim.
    pub message: String,
    pub status: ResponseStatus,
    /// Attempts used on the active field.
    pub attempts: u32,
    /// Options shown while awaiting a selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
}

impl OnboardingResponse {
    fn in_progress(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            message: message.into(),
            status: ResponseStatus::InProgress,
            attempts,
            candidates: None,
        }
    }

    fn awaiting_selection(message: impl Into<String>, attempts: u32, options: Vec<String>) -> Self {
        Self {
            message: message.into(),
            status: ResponseStatus::AwaitingSelection,
            attempts,
            candidates: Some(options),
        }
    }

    fn completed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: ResponseStatus::Completed,
            attempts: 0,
            candidates: None,
        }
    }

    fn failed(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            message: message.into(),
            status: ResponseStatus::Failed,
            attempts,
            candidates: None,
        }
    }
}

/// Read-only view of a customer's onboarding progress.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingSnapshot {
    pub customer_id: i64,
    pub phone_number: String,
    pub status: OnboardingStatus,
    pub needs_onboarding: bool,
    pub current_field: Option<String>,
    pub attempts: FieldAttempts,
    pub profile_data: ProfileData,
    /// Path of the linked ward, once the location is resolved.
    pub ward_path: Option<String>,
}

/// Whether inbound messages from `customer` should go through onboarding.
pub fn needs_onboarding(customer: &Customer) -> bool {
    !customer.onboarding_status.is_terminal()
}

/// What a field resolves to.
enum Resolution {
    Area(Administrative),
    /// `None` records a skip.
    Value(Option<ProfileValue>),
}

/// One async mutex per customer, so a customer's messages are handled one
/// at a time.
#[derive(Default)]
struct CustomerLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl CustomerLocks {
    async fn acquire(&self, customer_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            // Drop locks nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(customer_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

fn transition(customer: &mut Customer, to: OnboardingStatus) {
    if customer.onboarding_status.can_transition_to(to) {
        customer.onboarding_status = to;
    } else {
        warn!(
            customer_id = customer.id,
            from = %customer.onboarding_status,
            to = %to,
            "Ignoring invalid onboarding transition"
        );
    }
}

fn active_attempts(customer: &Customer) -> u32 {
    customer
        .current_onboarding_field
        .as_deref()
        .map(|field| customer.attempts(field))
        .unwrap_or(0)
}

/// Stored option text back to a profile value of the field's type.
fn candidate_value(field: &FieldDescriptor, raw: &str) -> ProfileValue {
    if field.field_type == FieldType::Integer
        && let Ok(n) = raw.trim().parse::<i64>()
    {
        return ProfileValue::Integer(n);
    }
    ProfileValue::from(raw)
}

pub struct OnboardingService {
    db: Arc<dyn Database>,
    checker: FieldCompletionChecker,
    matcher: LocationMatcher,
    extractor: FieldExtractor,
    locks: CustomerLocks,
}

impl OnboardingService {
    /// Service over the default field registry.
    pub fn new(
        db: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        matcher_config: MatcherConfig,
        onboarding_config: &OnboardingConfig,
    ) -> Self {
        Self::with_registry(
            db,
            llm,
            FieldRegistry::default(),
            matcher_config,
            onboarding_config,
        )
    }

    pub fn with_registry(
        db: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        registry: FieldRegistry,
        matcher_config: MatcherConfig,
        onboarding_config: &OnboardingConfig,
    ) -> Self {
        Self {
            checker: FieldCompletionChecker::new(db.clone(), Arc::new(registry)),
            matcher: LocationMatcher::new(db.clone(), matcher_config),
            extractor: FieldExtractor::new(llm, onboarding_config.supported_crops.clone()),
            db,
            locks: CustomerLocks::default(),
        }
    }

    pub fn needs_onboarding(&self, customer: &Customer) -> bool {
        needs_onboarding(customer)
    }

    // ── Front door ──────────────────────────────────────────────────

    /// The customer behind `phone_number`, created on first contact.
    pub async fn customer_for_phone(&self, phone_number: &str) -> Result<Customer> {
        Ok(self.db.get_or_create_customer(phone_number).await?)
    }

    /// Route one inbound message from `phone_number` through onboarding.
    ///
    /// Creates the customer on first contact. Messages for the same customer
    /// are processed one at a time. Fails with
    /// [`OnboardingError::NotRequired`] once onboarding has ended.
    pub async fn handle_inbound(
        &self,
        phone_number: &str,
        message: &str,
    ) -> Result<OnboardingResponse> {
        let customer_id = self.customer_for_phone(phone_number).await?.id;
        let _guard = self.locks.acquire(customer_id).await;

        // Reload under the lock; a previous message may have changed state.
        let mut customer = self
            .db
            .get_customer(customer_id)
            .await?
            .ok_or(OnboardingError::CustomerNotFound(customer_id))?;

        if !needs_onboarding(&customer) {
            return Err(OnboardingError::NotRequired {
                customer_id,
                status: customer.onboarding_status.to_string(),
            }
            .into());
        }

        Ok(self.process_onboarding_message(&mut customer, message).await)
    }

    /// Restart onboarding for a customer. Profile answers and the ward link
    /// are kept; attempts and pending candidates are dropped.
    pub async fn reset_onboarding(&self, customer_id: i64) -> Result<Customer> {
        let _guard = self.locks.acquire(customer_id).await;
        let mut customer = self
            .db
            .get_customer(customer_id)
            .await?
            .ok_or(OnboardingError::CustomerNotFound(customer_id))?;

        transition(&mut customer, OnboardingStatus::NotStarted);
        customer.current_onboarding_field = None;
        customer.onboarding_attempts.clear();
        customer.onboarding_candidates.clear();
        self.db.save_onboarding_state(&customer).await?;

        info!(customer_id, "Onboarding reset");
        Ok(customer)
    }

    pub async fn snapshot(&self, customer_id: i64) -> Result<OnboardingSnapshot> {
        let customer = self
            .db
            .get_customer(customer_id)
            .await?
            .ok_or(OnboardingError::CustomerNotFound(customer_id))?;

        let ward_path = match self.db.get_customer_administrative(customer_id).await? {
            Some(area_id) => self.db.get_administrative(area_id).await?.map(|a| a.path),
            None => None,
        };

        Ok(OnboardingSnapshot {
            customer_id,
            needs_onboarding: needs_onboarding(&customer),
            phone_number: customer.phone_number,
            status: customer.onboarding_status,
            current_field: customer.current_onboarding_field,
            attempts: customer.onboarding_attempts,
            profile_data: customer.profile_data,
            ward_path,
        })
    }

    // ── State machine ───────────────────────────────────────────────

    /// Advance `customer` by one inbound message.
    ///
    /// `customer` is updated to match what was persisted. Never fails: store
    /// errors produce a "try again" reply with the state left as it was.
    pub async fn process_onboarding_message(
        &self,
        customer: &mut Customer,
        message: &str,
    ) -> OnboardingResponse {
        if customer.onboarding_status == OnboardingStatus::Failed {
            return OnboardingResponse::failed(prompts::FAILURE_MESSAGE, 0);
        }

        match self.advance(customer, message).await {
            Ok(response) => response,
            Err(e) => {
                warn!(customer_id = customer.id, error = %e, "Onboarding step failed");
                OnboardingResponse::in_progress(
                    prompts::SAVE_FAILED_MESSAGE,
                    active_attempts(customer),
                )
            }
        }
    }

    async fn advance(
        &self,
        customer: &mut Customer,
        message: &str,
    ) -> std::result::Result<OnboardingResponse, DatabaseError> {
        if customer.onboarding_status == OnboardingStatus::Completed {
            return self.finalize(customer).await;
        }

        let Some(field) = self.checker.next_incomplete_field(customer).await? else {
            return self.finalize(customer).await;
        };

        if !customer.candidates(field.name).is_empty() {
            return self.handle_selection(customer, &field, message).await;
        }

        if customer.current_onboarding_field.as_deref() != Some(field.name) {
            return self.ask_first(customer, &field).await;
        }

        self.process_value(customer, &field, message).await
    }

    fn question(&self, field: &FieldDescriptor) -> String {
        field.question(self.extractor.supported_crops())
    }

    async fn finalize(
        &self,
        customer: &mut Customer,
    ) -> std::result::Result<OnboardingResponse, DatabaseError> {
        if customer.onboarding_status != OnboardingStatus::Completed
            || customer.current_onboarding_field.is_some()
        {
            let mut updated = customer.clone();
            updated.current_onboarding_field = None;
            transition(&mut updated, OnboardingStatus::Completed);
            self.db.save_onboarding_state(&updated).await?;
            *customer = updated;
            info!(customer_id = customer.id, "Onboarding completed");
        }
        Ok(OnboardingResponse::completed(prompts::COMPLETION_MESSAGE))
    }

    /// First turn for a field: the inbound message only triggers the question.
    async fn ask_first(
        &self,
        customer: &mut Customer,
        field: &FieldDescriptor,
    ) -> std::result::Result<OnboardingResponse, DatabaseError> {
        let mut updated = customer.clone();
        updated.current_onboarding_field = Some(field.name.to_string());
        transition(&mut updated, OnboardingStatus::InProgress);
        self.db.save_onboarding_state(&updated).await?;
        *customer = updated;

        info!(customer_id = customer.id, field = field.name, "Asking onboarding question");
        Ok(OnboardingResponse::in_progress(
            self.question(field),
            customer.attempts(field.name),
        ))
    }

    /// Pick from a numbered list presented earlier.
    async fn handle_selection(
        &self,
        customer: &mut Customer,
        field: &FieldDescriptor,
        message: &str,
    ) -> std::result::Result<OnboardingResponse, DatabaseError> {
        let stored = customer.candidates(field.name).to_vec();
        let attempts = customer.attempts(field.name);
        let options = self.render_candidates(&stored).await?;

        let Some(index) = parse_selection(message) else {
            if field.extraction_method == ExtractionMethod::CropType
                && let Some(crop) = self.extractor.resolve_crop_ambiguity(message, &options).await
            {
                let headline = field.success_message(&crop);
                return self
                    .resolve(customer, field, Resolution::Value(Some(crop.into())), headline)
                    .await;
            }
            debug!(customer_id = customer.id, field = field.name, "Unparseable selection");
            return Ok(OnboardingResponse::awaiting_selection(
                prompts::invalid_selection_message(&options),
                attempts,
                options,
            ));
        };

        if index == 0 || index > stored.len() {
            return Ok(OnboardingResponse::awaiting_selection(
                prompts::out_of_range_message(stored.len()),
                attempts,
                options,
            ));
        }

        match &stored[index - 1] {
            Candidate::Area(area_id) => match self.db.get_administrative(*area_id).await? {
                Some(area) => {
                    let headline = field.success_message(&area.path);
                    self.resolve(customer, field, Resolution::Area(area), headline)
                        .await
                }
                None => {
                    warn!(customer_id = customer.id, area_id, "Selected area no longer exists");
                    let mut updated = customer.clone();
                    updated.onboarding_candidates.remove(field.name);
                    self.db.save_onboarding_state(&updated).await?;
                    *customer = updated;
                    Ok(OnboardingResponse::in_progress(
                        prompts::retry_message(&self.question(field)),
                        attempts,
                    ))
                }
            },
            Candidate::Value(raw) => {
                let value = candidate_value(field, raw);
                let headline = field.success_message(&value.to_string());
                self.resolve(customer, field, Resolution::Value(Some(value)), headline)
                    .await
            }
        }
    }

    async fn render_candidates(
        &self,
        stored: &[Candidate],
    ) -> std::result::Result<Vec<String>, DatabaseError> {
        let mut options = Vec::with_capacity(stored.len());
        for candidate in stored {
            options.push(match candidate {
                Candidate::Area(id) => match self.db.get_administrative(*id).await? {
                    Some(area) => area.path,
                    None => format!("Area {id}"),
                },
                Candidate::Value(value) => value.clone(),
            });
        }
        Ok(options)
    }

    /// Interpret an answer to the current field's question.
    ///
    /// Extractor backend failures arrive as "nothing recognised" and take
    /// the retry/max-attempts path. Only a failed ward lookup answers with
    /// the "didn't understand" prompt; other store errors propagate.
    async fn process_value(
        &self,
        customer: &mut Customer,
        field: &FieldDescriptor,
        message: &str,
    ) -> std::result::Result<OnboardingResponse, DatabaseError> {
        if !field.required && is_skip(message) {
            info!(customer_id = customer.id, field = field.name, "Field skipped");
            return self
                .resolve(
                    customer,
                    field,
                    Resolution::Value(None),
                    prompts::SKIPPED_ACK.to_string(),
                )
                .await;
        }

        let previous = customer.attempts(field.name);
        let mut updated = customer.clone();
        let attempts = updated.record_attempt(field.name);
        self.db.save_onboarding_state(&updated).await?;
        *customer = updated;
        debug!(customer_id = customer.id, field = field.name, attempts, "Processing answer");

        if attempts > field.max_attempts {
            return self.handle_max_attempts(customer, field, message, attempts).await;
        }
        let last_attempt = attempts >= field.max_attempts;

        let Some(extraction) = self.extractor.extract(field.extraction_method, message).await
        else {
            if last_attempt {
                return self.handle_max_attempts(customer, field, message, attempts).await;
            }
            return Ok(OnboardingResponse::in_progress(
                self.retry_message(field, previous),
                attempts,
            ));
        };

        match extraction {
            Extraction::Location(location) => {
                let candidates = match self.matcher.find_matching_wards(&location).await {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!(customer_id = customer.id, error = %e, "Location matching failed");
                        return Ok(OnboardingResponse::in_progress(
                            prompts::didnt_understand(&self.question(field)),
                            attempts,
                        ));
                    }
                };

                if candidates.is_empty() {
                    if last_attempt {
                        return self.handle_max_attempts(customer, field, message, attempts).await;
                    }
                    return Ok(OnboardingResponse::in_progress(
                        prompts::LOCATION_NOT_FOUND_MESSAGE,
                        attempts,
                    ));
                }

                if self.matcher.is_ambiguous(&candidates) {
                    let paths: Vec<String> = candidates.iter().map(|c| c.path.clone()).collect();
                    let mut updated = customer.clone();
                    updated.set_candidates(
                        field.name,
                        candidates.iter().map(|c| Candidate::Area(c.id)).collect(),
                    );
                    self.db.save_onboarding_state(&updated).await?;
                    *customer = updated;

                    info!(
                        customer_id = customer.id,
                        candidates = paths.len(),
                        top_score = candidates[0].score,
                        "Location ambiguous, awaiting selection"
                    );
                    return Ok(OnboardingResponse::awaiting_selection(
                        prompts::ambiguous_location_message(&paths),
                        attempts,
                        paths,
                    ));
                }

                match self.db.get_administrative(candidates[0].id).await? {
                    Some(area) => {
                        debug!(area_id = area.id, score = candidates[0].score, "Location matched");
                        let headline = field.success_message(&area.path);
                        self.resolve(customer, field, Resolution::Area(area), headline)
                            .await
                    }
                    None => Ok(OnboardingResponse::in_progress(
                        prompts::LOCATION_NOT_FOUND_MESSAGE,
                        attempts,
                    )),
                }
            }
            Extraction::Value(value) => {
                let headline = field.success_message(&value.to_string());
                self.resolve(customer, field, Resolution::Value(Some(value)), headline)
                    .await
            }
            Extraction::Choices(options) => {
                let mut updated = customer.clone();
                updated.set_candidates(
                    field.name,
                    options.iter().cloned().map(Candidate::Value).collect(),
                );
                self.db.save_onboarding_state(&updated).await?;
                *customer = updated;

                info!(customer_id = customer.id, field = field.name, "Answer ambiguous, awaiting selection");
                Ok(OnboardingResponse::awaiting_selection(
                    prompts::crop_choice_message(&options),
                    attempts,
                    options,
                ))
            }
        }
    }

    fn retry_message(&self, field: &FieldDescriptor, previous_attempts: u32) -> String {
        let question = self.question(field);
        match field.extraction_method {
            ExtractionMethod::CropType => prompts::crop_retry_message(
                previous_attempts,
                &question,
                self.extractor.supported_crops(),
            ),
            _ => prompts::retry_message(&question),
        }
    }

    /// Attempts are used up: fail, or force a resolution and move on.
    async fn handle_max_attempts(
        &self,
        customer: &mut Customer,
        field: &FieldDescriptor,
        message: &str,
        attempts: u32,
    ) -> std::result::Result<OnboardingResponse, DatabaseError> {
        // A raw string can never stand in for a ward link.
        let salvageable =
            field.save_invalid_on_max_attempts && field.field_type != FieldType::Location;

        if field.required && !salvageable {
            let mut updated = customer.clone();
            updated.clear_field_state(field.name);
            updated.current_onboarding_field = None;
            transition(&mut updated, OnboardingStatus::Failed);
            self.db.save_onboarding_state(&updated).await?;
            *customer = updated;

            warn!(
                customer_id = customer.id,
                field = field.name,
                attempts,
                "Onboarding failed after max attempts"
            );
            return Ok(OnboardingResponse::failed(prompts::FAILURE_MESSAGE, attempts));
        }

        let salvaged = if salvageable {
            self.salvage(field, message).await
        } else {
            None
        };
        let headline = match &salvaged {
            Some(value) => prompts::salvaged_ack(value),
            None => prompts::MOVING_ON_ACK.to_string(),
        };

        info!(
            customer_id = customer.id,
            field = field.name,
            salvaged = salvaged.is_some(),
            "Max attempts reached, moving on"
        );
        self.resolve(customer, field, Resolution::Value(salvaged), headline)
            .await
    }

    async fn salvage(&self, field: &FieldDescriptor, message: &str) -> Option<ProfileValue> {
        if field.extraction_method == ExtractionMethod::CropType
            && let Some(crop) = self.extractor.extract_crop_unconstrained(message).await
        {
            return Some(ProfileValue::from(crop));
        }
        let raw = message.trim();
        (!raw.is_empty()).then(|| ProfileValue::from(raw))
    }

    /// Save a field, clear its state and move to the next field or finish.
    ///
    /// The link, the profile value and the new current field are written in
    /// one transaction. On failure nothing changes and the farmer is asked to
    /// try again.
    async fn resolve(
        &self,
        customer: &mut Customer,
        field: &FieldDescriptor,
        resolution: Resolution,
        headline: String,
    ) -> std::result::Result<OnboardingResponse, DatabaseError> {
        let mut updated = customer.clone();
        let link = match resolution {
            Resolution::Area(area) => Some(area.id),
            Resolution::Value(value) => {
                updated.set_profile_value(field.name, value);
                None
            }
        };
        updated.clear_field_state(field.name);

        let next = self
            .checker
            .next_incomplete_field_except(&updated, Some(field.name))
            .await?;

        let message = match &next {
            Some(next_field) => {
                updated.current_onboarding_field = Some(next_field.name.to_string());
                transition(&mut updated, OnboardingStatus::InProgress);
                format!("{headline}\n\n{}", self.question(next_field))
            }
            None => {
                updated.current_onboarding_field = None;
                transition(&mut updated, OnboardingStatus::Completed);
                format!("{headline}\n\n{}", prompts::COMPLETION_MESSAGE)
            }
        };

        if let Err(e) = self.db.save_resolution(&updated, link).await {
            warn!(
                customer_id = customer.id,
                field = field.name,
                error = %e,
                "Failed to save onboarding answer"
            );
            return Ok(OnboardingResponse::in_progress(
                prompts::SAVE_FAILED_MESSAGE,
                customer.attempts(field.name),
            ));
        }
        *customer = updated;

        match next {
            Some(next_field) => {
                info!(
                    customer_id = customer.id,
                    field = field.name,
                    next_field = next_field.name,
                    "Onboarding field resolved"
                );
                Ok(OnboardingResponse::in_progress(
                    message,
                    customer.attempts(next_field.name),
                ))
            }
            None => {
                info!(customer_id = customer.id, field = field.name, "Onboarding completed");
                Ok(OnboardingResponse::completed(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::fields::{BIRTH_YEAR, CROP_TYPE};

    #[test]
    fn needs_onboarding_until_terminal() {
        let mut customer = Customer::new(1, "+1");
        assert!(needs_onboarding(&customer));
        customer.onboarding_status = OnboardingStatus::InProgress;
        assert!(needs_onboarding(&customer));
        customer.onboarding_status = OnboardingStatus::Completed;
        assert!(!needs_onboarding(&customer));
        customer.onboarding_status = OnboardingStatus::Failed;
        assert!(!needs_onboarding(&customer));
    }

    #[test]
    fn candidate_values_follow_field_type() {
        let registry = FieldRegistry::default();
        let year = registry.get(BIRTH_YEAR).unwrap();
        let crop = registry.get(CROP_TYPE).unwrap();
        assert_eq!(candidate_value(year, "1984"), ProfileValue::Integer(1984));
        assert_eq!(candidate_value(year, "eighty"), ProfileValue::from("eighty"));
        assert_eq!(candidate_value(crop, "Maize"), ProfileValue::from("Maize"));
    }

    #[test]
    fn invalid_transition_is_ignored() {
        let mut customer = Customer::new(1, "+1");
        transition(&mut customer, OnboardingStatus::Failed);
        assert_eq!(customer.onboarding_status, OnboardingStatus::NotStarted);
        transition(&mut customer, OnboardingStatus::InProgress);
        assert_eq!(customer.onboarding_status, OnboardingStatus::InProgress);
    }

    #[test]
    fn response_json_omits_empty_candidates() {
        let json = serde_json::to_value(OnboardingResponse::in_progress("Hi", 1)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message": "Hi", "status": "in_progress", "attempts": 1})
        );

        let json = serde_json::to_value(OnboardingResponse::awaiting_selection(
            "Pick",
            0,
            vec!["A".into()],
        ))
        .unwrap();
        assert_eq!(json["status"], "awaiting_selection");
        assert_eq!(json["candidates"], serde_json::json!(["A"]));
    }

    #[tokio::test]
    async fn customer_locks_serialise_and_prune() {
        let locks = Arc::new(CustomerLocks::default());

        let guard = locks.acquire(7).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(7).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();

        // Idle entries are pruned on the next acquire
        let _other = locks.acquire(8).await;
        assert_eq!(locks.len(), 1);
    }
}
