use serde::{Deserialize, Serialize};

/// Driver-visible state of one board position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Unknown,
    Flagged,
    Revealed(u8),
}

impl Cell {
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub const fn is_flagged(self) -> bool {
        matches!(self, Self::Flagged)
    }

    pub const fn revealed_value(self) -> Option<u8> {
        match self {
            Self::Revealed(value) => Some(value),
            _ => None,
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::Unknown
    }
}
