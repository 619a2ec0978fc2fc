//! Onboarding: collecting a farmer's profile over a few WhatsApp messages.
//!
//! Fields are asked one at a time in priority order (required first). Free
//! text answers go through AI extraction; locations are fuzzy-matched against
//! the ward hierarchy, and close calls are settled with a numbered list.
//! Each field has an attempt budget; running out fails onboarding for
//! required fields and moves on for optional ones.

pub mod completion;
pub mod extract;
pub mod fields;
pub mod matcher;
pub mod prompts;
pub mod routes;
pub mod selection;
pub mod service;
pub mod state;

pub use completion::FieldCompletionChecker;
pub use extract::{Extraction, FieldExtractor};
pub use fields::{ExtractionMethod, FieldDescriptor, FieldRegistry, FieldType};
pub use matcher::{LocationExtraction, LocationMatcher, MatchCandidate};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use service::{
    OnboardingResponse, OnboardingService, OnboardingSnapshot, ResponseStatus, needs_onboarding,
};
pub use state::OnboardingStatus;
