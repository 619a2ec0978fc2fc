//! Local channels for talking to the onboarding service.

pub mod cli;

pub use cli::CliChannel;
