use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::ReblockId;

/// Result of a grace activation request. A denied request is a normal outcome,
/// not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationOutcome {
    pub granted: bool,
    pub message: String,
    pub reblock_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReblockTicket {
    pub id: ReblockId,
    pub selectors: Vec<String>,
    pub fire_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessStatus {
    pub used: u32,
    pub max: u32,
    pub window_start: Option<OffsetDateTime>,
    pub guarded_blocked: bool,
    pub pending_reblocks: Vec<ReblockTicket>,
}

impl ActivationOutcome {
    pub fn granted(message: impl Into<String>, reblock_at: OffsetDateTime) -> Self {
        Self {
            granted: true,
            message: message.into(),
            reblock_at: Some(reblock_at),
        }
    }

    pub fn limit_reached(message: impl Into<String>) -> Self {
        Self {
            granted: false,
            message: message.into(),
            reblock_at: None,
        }
    }
}

impl AccessStatus {
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }
}
