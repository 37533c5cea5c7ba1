//! Core types: Ticker, Weights, Holdings, Deltas

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::TickerError;

/// Longest ticker accepted. Covers equity symbols with class suffixes
/// (e.g. `BRK.B`) and ETF share classes.
pub const MAX_TICKER_LEN: usize = 12;

/// Instrument identifier, normalized to upper case.
///
/// ```
/// use tranche::Ticker;
///
/// let spy = Ticker::new("spy").unwrap();
/// assert_eq!(spy.as_str(), "SPY");
/// assert!(Ticker::new("").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Ticker(String);

impl Ticker {
    /// Validate and normalize a ticker.
    pub fn new(s: &str) -> Result<Self, TickerError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TickerError::Empty);
        }
        if s.len() > MAX_TICKER_LEN {
            return Err(TickerError::TooLong(s.to_string()));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '/' || *c == '-'))
        {
            return Err(TickerError::InvalidChar(s.to_string(), c));
        }
        Ok(Ticker(s.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = TickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticker::new(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ticker::new(&s)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> String {
        t.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Target allocation: ticker → relative weight. Only ratios matter.
pub type Weights = BTreeMap<Ticker, Decimal>;

/// Current market value held per ticker, in dollars.
pub type Holdings = BTreeMap<Ticker, Decimal>;

/// Signed dollar amount per ticker (positive = buy, negative = sell).
pub type Deltas = BTreeMap<Ticker, Decimal>;

/// Sum a decimal map, `None` on overflow.
pub fn checked_sum<'a, I>(values: I) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
}
