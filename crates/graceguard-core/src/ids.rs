use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pending re-block timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReblockId(pub Uuid);

impl ReblockId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReblockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReblockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
