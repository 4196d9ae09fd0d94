//! Core domain types for the trading platform

use crate::constants::fixed_point::SCALE_4;
use crate::constants::trading::MAX_SYMBOL_LEN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price in i64 ticks for determinism, 4 decimal places (1 tick = 0.0001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Px(i64);

impl Px {
    /// Zero price
    pub const ZERO: Self = Self(0);

    /// Create from i64 ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create from whole rupees
    #[must_use]
    pub const fn from_rupees(rupees: i64) -> Self {
        Self(rupees * SCALE_4)
    }

    /// Create from paise (2 decimal places in, 4 decimal internal)
    #[must_use]
    pub const fn from_paise(paise: i64) -> Self {
        Self(paise * (SCALE_4 / 100))
    }

    /// Price as i64 ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Price as f64, for logs and external boundaries only
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / SCALE_4 as f64
    }

    /// Notional value of `qty` shares at this price, in currency ticks.
    ///
    /// Widens through i128: the raw product of two SCALE_4 values can
    /// exceed i64 at the validated bounds. Saturates at `i64::MAX`.
    #[must_use]
    pub fn notional(&self, qty: Qty) -> i64 {
        let wide = i128::from(self.0) * i128::from(qty.as_i64()) / i128::from(SCALE_4);
        i64::try_from(wide).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE_4;
        let frac = (self.0 % SCALE_4).abs();
        write!(f, "{whole}.{frac:04}")
    }
}

/// Quantity in i64 units for determinism, 4 decimal places (1 = 0.0001 share)
///
/// Equity order quantities are whole shares; the fractional headroom exists
/// so fill arithmetic shares one representation with prices.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Qty(i64);

impl Qty {
    /// Zero quantity
    pub const ZERO: Self = Self(0);

    /// Create from whole shares
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * SCALE_4)
    }

    /// Create from i64 internal units
    #[must_use]
    pub const fn from_i64(raw: i64) -> Self {
        Self(raw)
    }

    /// Quantity as i64 internal units
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Whole-share count, truncating any fractional part
    #[must_use]
    pub const fn units(&self) -> i64 {
        self.0 / SCALE_4
    }

    /// True when the quantity is an exact whole-share count
    #[must_use]
    pub const fn is_whole_units(&self) -> bool {
        self.0 % SCALE_4 == 0
    }

    /// True when zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Sum of two quantities
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Difference of two quantities
    #[must_use]
    pub const fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole_units() {
            write!(f, "{}", self.units())
        } else {
            let whole = self.0 / SCALE_4;
            let frac = (self.0 % SCALE_4).abs();
            write!(f, "{whole}.{frac:04}")
        }
    }
}

/// Validated instrument ticker: 1-20 chars, uppercase alphanumeric or `_`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and validate a ticker
    pub fn parse(s: &str) -> Result<Self, &'static str> {
        if s.is_empty() {
            return Err("symbol must not be empty");
        }
        if s.len() > MAX_SYMBOL_LEN {
            return Err("symbol exceeds 20 characters");
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err("symbol must be uppercase alphanumeric or underscore");
        }
        Ok(Self(s.to_string()))
    }

    /// Ticker as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// Exchanges served by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// National Stock Exchange
    Nse,
    /// Bombay Stock Exchange
    Bse,
    /// Multi Commodity Exchange
    Mcx,
}

impl Exchange {
    /// Canonical exchange code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
            Self::Mcx => "MCX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NSE" => Ok(Self::Nse),
            "BSE" => Ok(Self::Bse),
            "MCX" => Ok(Self::Mcx),
            _ => Err("unknown exchange"),
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy
    Buy,
    /// Sell
    Sell,
}

impl Side {
    /// Canonical side code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err("unknown side"),
        }
    }
}

/// Order types accepted by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute immediately at best available price
    Market,
    /// Execute at the limit price or better
    Limit,
    /// Trigger a market order when the stop price trades
    StopLoss,
    /// Trigger a limit order when the stop price trades
    StopLimit,
}

impl OrderType {
    /// Canonical order-type code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLoss => "STOP_LOSS",
            Self::StopLimit => "STOP_LIMIT",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(Self::Market),
            "LIMIT" => Ok(Self::Limit),
            "STOP_LOSS" => Ok(Self::StopLoss),
            "STOP_LIMIT" => Ok(Self::StopLimit),
            _ => Err("unknown order type"),
        }
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Valid until end of the trading day
    Day,
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
    /// Good till a caller-supplied date
    Gtd,
}

impl TimeInForce {
    /// Canonical time-in-force code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Gtd => "GTD",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeInForce {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAY" => Ok(Self::Day),
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            "FOK" => Ok(Self::Fok),
            "GTD" => Ok(Self::Gtd),
            _ => Err("unknown time in force"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn px_display_pads_fraction() {
        assert_eq!(Px::from_i64(24_507_500).to_string(), "2450.7500");
        assert_eq!(Px::from_paise(245_075).to_string(), "2450.7500");
        assert_eq!(Px::from_rupees(100).to_string(), "100.0000");
    }

    #[test]
    fn notional_widens_through_i128() {
        // 100000.00 x 1,000,000 shares: raw i64 product would overflow
        let px = Px::from_rupees(100_000);
        let qty = Qty::from_units(1_000_000);
        assert_eq!(px.notional(qty), 100_000_000_000 * SCALE_4);
    }

    #[test]
    fn qty_whole_units() {
        assert!(Qty::from_units(100).is_whole_units());
        assert!(!Qty::from_i64(100_5000).is_whole_units());
        assert_eq!(Qty::from_units(100).units(), 100);
    }

    #[test]
    fn symbol_validation() {
        assert!(Symbol::parse("RELIANCE").is_ok());
        assert!(Symbol::parse("NIFTY_50").is_ok());
        assert!(Symbol::parse("").is_err());
        assert!(Symbol::parse("reliance").is_err());
        assert!(Symbol::parse("TOO-LONG").is_err());
        assert!(Symbol::parse(&"A".repeat(21)).is_err());
    }

    #[test]
    fn enum_round_trips() {
        for ex in [Exchange::Nse, Exchange::Bse, Exchange::Mcx] {
            assert_eq!(ex.as_str().parse::<Exchange>().unwrap(), ex);
        }
        for ot in [
            OrderType::Market,
            OrderType::Limit,
            OrderType::StopLoss,
            OrderType::StopLimit,
        ] {
            assert_eq!(ot.as_str().parse::<OrderType>().unwrap(), ot);
        }
        for tif in [
            TimeInForce::Day,
            TimeInForce::Gtc,
            TimeInForce::Ioc,
            TimeInForce::Fok,
            TimeInForce::Gtd,
        ] {
            assert_eq!(tif.as_str().parse::<TimeInForce>().unwrap(), tif);
        }
    }

    #[test]
    fn symbol_serde_rejects_invalid() {
        let ok: Result<Symbol, _> = serde_json::from_str("\"INFY\"");
        assert!(ok.is_ok());
        let bad: Result<Symbol, _> = serde_json::from_str("\"bad symbol\"");
        assert!(bad.is_err());
    }
}
