//! Agri Assist: conversational onboarding for farmers over WhatsApp.
//!
//! Farmers are walked through a short profile (location, main crop, and
//! optional demographics) one message at a time. Free text is turned into
//! structured values by an LLM, locations are fuzzy-matched against the
//! administrative hierarchy, and every step is persisted so a conversation
//! can resume after a restart.

pub mod administrative;
pub mod channels;
pub mod config;
pub mod customers;
pub mod error;
pub mod llm;
pub mod onboarding;
pub mod store;

pub use error::{Error, Result};
