//! Money and currency types
//!
//! The PSP takes every amount as an integer in the currency's minor unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency codes (ISO 4217) the gateway knows the minor unit of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    EUR,
    SEK,
    NOK,
    DKK,
    USD,
    GBP,
    ISK,
    JPY,
}

impl Currency {
    /// Get currency code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::EUR => "EUR",
            Self::SEK => "SEK",
            Self::NOK => "NOK",
            Self::DKK => "DKK",
            Self::USD => "USD",
            Self::GBP => "GBP",
            Self::ISK => "ISK",
            Self::JPY => "JPY",
        }
    }

    /// Decimal places of the minor unit
    pub fn decimals(&self) -> u32 {
        match self {
            Self::ISK | Self::JPY => 0,
            _ => 2,
        }
    }

    /// Parse from string
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "EUR" => Some(Self::EUR),
            "SEK" => Some(Self::SEK),
            "NOK" => Some(Self::NOK),
            "DKK" => Some(Self::DKK),
            "USD" => Some(Self::USD),
            "GBP" => Some(Self::GBP),
            "ISK" => Some(Self::ISK),
            "JPY" => Some(Self::JPY),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::EUR
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Decimal places for a currency code; unknown codes use two.
pub fn decimals_for(currency: &str) -> u32 {
    Currency::from_code(currency)
        .map(|c| c.decimals())
        .unwrap_or(2)
}

/// Convert a decimal amount into the PSP's minor-unit integer.
///
/// Rounds half away from zero, the way shop totals are rounded for display,
/// so `12.345 EUR` becomes `1235`. Never fails: amounts beyond `i64`
/// saturate.
pub fn to_minor_units(amount: Decimal, currency: &str) -> i64 {
    let scale = Decimal::from(10i64.pow(decimals_for(currency)));
    let scaled = (amount * scale).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    scaled.to_i64().unwrap_or(if scaled.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Convert a minor-unit integer back into a decimal amount.
pub fn from_minor_units(amount: i64, currency: &str) -> Decimal {
    Decimal::new(amount, decimals_for(currency))
}

/// Money amount in minor units with its currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (cents, öre)
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Money {
    /// Create from a minor-unit amount
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Create from a decimal amount (e.g. 29.99)
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: to_minor_units(amount, currency.code()),
            currency,
        }
    }

    /// Create EUR amount from cents
    pub fn eur(cents: i64) -> Self {
        Self::new(cents, Currency::EUR)
    }

    /// Get amount as decimal
    pub fn to_decimal(&self) -> Decimal {
        from_minor_units(self.amount, self.currency.code())
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.prec$} {}",
            self.to_decimal(),
            self.currency,
            prec = self.currency.decimals() as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(dec!(15.25), "EUR"), 1525);
        assert_eq!(to_minor_units(dec!(0), "EUR"), 0);
        assert_eq!(to_minor_units(dec!(12.345), "EUR"), 1235);
        assert_eq!(to_minor_units(dec!(-0.005), "EUR"), -1);
    }

    #[test]
    fn test_float_noise_rounds_to_nearest_cent() {
        // 14.879999... from tax arithmetic must land on 1488
        assert_eq!(to_minor_units(dec!(14.8799999999), "EUR"), 1488);
    }

    #[test]
    fn test_unknown_currency_assumes_two_decimals() {
        assert_eq!(to_minor_units(dec!(1.5), "XYZ"), 150);
        assert_eq!(to_minor_units(dec!(100), "ISK"), 100);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::eur(1525).to_string(), "15.25 EUR");
        assert_eq!(Money::from_decimal(dec!(3.25), Currency::EUR).amount, 325);
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!(Currency::from_code("eur"), Some(Currency::EUR));
        assert_eq!(Currency::from_code("SEK"), Some(Currency::SEK));
        assert_eq!(Currency::from_code("???"), None);
    }
}
