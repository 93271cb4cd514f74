use std::fmt;

use serde::{Deserialize, Serialize};

/// Which half of a primary/replica pair a service instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Replica,
}

impl Role {
    pub fn is_replica(self) -> bool {
        matches!(self, Role::Replica)
    }

    /// The other half of the pair.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Primary => Role::Replica,
            Role::Replica => Role::Primary,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Replica => write!(f, "replica"),
        }
    }
}
