//! Customers: farmers messaging the platform.

pub mod model;

pub use model::{
    Candidate, Customer, FieldAttempts, FieldCandidates, ProfileData, ProfileValue,
};
