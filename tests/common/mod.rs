//! Shared fixtures for integration tests: a scripted LLM and a seeded
//! in-memory database.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use agri_assist::administrative::{parse_seed, seed_administrative};
use agri_assist::config::{MatcherConfig, OnboardingConfig};
use agri_assist::error::LlmError;
use agri_assist::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use agri_assist::onboarding::{FieldRegistry, OnboardingService};
use agri_assist::store::LibSqlBackend;

pub const SEED: &str = r#"{
  "name": "Kenya",
  "code": "KE",
  "children": [
    {"name": "Nairobi", "children": [
      {"name": "Westlands", "children": [
        {"name": "Parklands"},
        {"name": "Kangemi"}
      ]},
      {"name": "Langata", "children": [
        {"name": "Karen"},
        {"name": "Kibera"}
      ]},
      {"name": "Dagoretti", "children": [
        {"name": "Kibera"},
        {"name": "Waithaka"}
      ]}
    ]}
  ]
}"#;

pub const PARKLANDS: &str = "Kenya > Nairobi > Westlands > Parklands";

pub const PARKLANDS_REPLY: &str =
    r#"{"province": "Nairobi", "district": "Westlands", "ward": "Parklands", "full_text": "Parklands, Westlands, Nairobi"}"#;

pub const KIBERA_REPLY: &str =
    r#"{"province": null, "district": null, "ward": "Kibera", "full_text": "Kibera"}"#;

pub const NO_CROP_REPLY: &str = r#"{"crop_name": null, "confidence": "low", "possible_crops": []}"#;

/// Replies with queued responses in order. Once the queue is empty every
/// call fails, which extraction reads as "nothing recognised".
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(0),
        })
    }

    pub fn push(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(reply.to_string());
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        *self.calls.lock().unwrap() += 1;
        let content = self.replies.lock().unwrap().pop_front().ok_or_else(|| {
            LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "no reply queued".into(),
            }
        })?;
        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// In-memory database with the test hierarchy loaded.
pub async fn seeded_db() -> Arc<LibSqlBackend> {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let roots = parse_seed(SEED).unwrap();
    seed_administrative(db.as_ref(), &roots).await.unwrap();
    db
}

pub fn service(db: Arc<LibSqlBackend>, llm: Arc<ScriptedLlm>) -> OnboardingService {
    OnboardingService::new(
        db,
        llm,
        MatcherConfig::default(),
        &OnboardingConfig::default(),
    )
}

pub fn service_with_registry(
    db: Arc<LibSqlBackend>,
    llm: Arc<ScriptedLlm>,
    registry: FieldRegistry,
) -> OnboardingService {
    OnboardingService::with_registry(
        db,
        llm,
        registry,
        MatcherConfig::default(),
        &OnboardingConfig::default(),
    )
}
