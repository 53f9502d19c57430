//! Currency - Type-safe 3-letter currency codes
//!
//! Instead of raw strings, common trade currencies are pre-defined as
//! enum variants, with a validated fallback for everything else. A code
//! is only accepted if it is exactly three ASCII letters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing currency codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("Empty currency code")]
    EmptyCode,

    #[error("Currency code must be exactly 3 letters: {0}")]
    InvalidFormat(String),
}

/// Currency codes used on trades.
///
/// Common currencies are pre-defined for type safety; anything else that
/// passes the 3-letter rule lands in `Other`.
///
/// # Examples
/// ```
/// use chaindocs_core::Currency;
///
/// let usd: Currency = "USD".parse().unwrap();
/// assert_eq!(usd, Currency::Usd);
/// assert_eq!(usd.to_string(), "USD");
///
/// // Unknown but well-formed codes are preserved
/// let chf: Currency = "chf".parse().unwrap();
/// assert_eq!(chf.to_string(), "CHF");
///
/// // Malformed codes are rejected
/// assert!("US".parse::<Currency>().is_err());
/// assert!("USDT".parse::<Currency>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    /// US Dollar
    Usd,
    /// Euro
    Eur,
    /// British Pound
    Gbp,
    /// Japanese Yen
    Jpy,
    /// Chinese Yuan
    Cny,
    /// Indian Rupee
    Inr,
    /// UAE Dirham
    Aed,
    /// Singapore Dollar
    Sgd,
    /// Any other 3-letter code
    Other(String),
}

impl Currency {
    /// Get the canonical uppercase code
    pub fn code(&self) -> &str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Cny => "CNY",
            Currency::Inr => "INR",
            Currency::Aed => "AED",
            Currency::Sgd => "SGD",
            Currency::Other(code) => code,
        }
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CurrencyError::EmptyCode);
        }

        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyError::InvalidFormat(s.to_string()));
        }

        let code = trimmed.to_ascii_uppercase();
        Ok(match code.as_str() {
            "USD" => Currency::Usd,
            "EUR" => Currency::Eur,
            "GBP" => Currency::Gbp,
            "JPY" => Currency::Jpy,
            "CNY" => Currency::Cny,
            "INR" => Currency::Inr,
            "AED" => Currency::Aed,
            "SGD" => Currency::Sgd,
            _ => Currency::Other(code),
        })
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}
