use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Chat platform user id. One signing identity, one trading account, and at
/// most one standing alert hang off each of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatUserId(pub i64);

impl std::fmt::Display for ChatUserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Parses the wire code used by the chat command (`1` = long, `2` = short).
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Long),
            2 => Some(Self::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// A user-supplied trade intent, before sizing and price bounds are applied.
/// Transient: constructed per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub direction: Direction,
    pub market_code: u32,
    /// Notional size in quote-currency terms (fxUSD).
    pub notional_size: Decimal,
}
