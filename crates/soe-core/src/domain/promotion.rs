//! Outcome of a promotion attempt.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PromotionStatus {
    /// A commit pointing the serving config at the new artifact was created.
    Updated,
    /// The serving config already pointed at the artifact; nothing committed.
    Noop,
    Error,
}

/// Structured result rendered to whoever asked for the promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionResult {
    pub status: PromotionStatus,
    pub message: String,
}

impl PromotionResult {
    pub fn updated(message: impl Into<String>) -> Self {
        Self {
            status: PromotionStatus::Updated,
            message: message.into(),
        }
    }

    pub fn noop(message: impl Into<String>) -> Self {
        Self {
            status: PromotionStatus::Noop,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: PromotionStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == PromotionStatus::Error
    }
}
