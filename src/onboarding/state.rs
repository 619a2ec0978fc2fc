//! Customer-level onboarding status and its allowed transitions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a customer is in the onboarding flow.
///
/// NotStarted → InProgress → Completed | Failed. A reset moves any status
/// back to NotStarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl OnboardingStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingStatus) -> bool {
        use OnboardingStatus::*;
        matches!(
            (self, target),
            (NotStarted, InProgress)
                | (NotStarted, Completed)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Completed, Completed)
                | (_, NotStarted)
        )
    }

    /// Whether the flow has ended (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown onboarding status: {other}")),
        }
    }
}
