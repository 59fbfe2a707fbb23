use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::line::OrderLine;
use crate::errors::ServiceError;

/// Sales tax as a fraction of the subtotal, e.g. `0.075`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(Decimal);

impl TaxRate {
    pub const DEFAULT: TaxRate = TaxRate(dec!(0.075));

    pub fn new(rate: Decimal) -> Result<Self, ServiceError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(ServiceError::Configuration(format!(
                "tax rate {rate} must be between 0 and 1"
            )));
        }
        Ok(Self(rate))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whole-number tip percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipPercent(u8);

impl TipPercent {
    pub const NONE: TipPercent = TipPercent(0);

    /// Tip choices offered at checkout.
    pub const CHECKOUT_CHOICES: [u8; 4] = [0, 10, 15, 20];

    pub fn new(percent: u32) -> Result<Self, ServiceError> {
        u8::try_from(percent)
            .ok()
            .filter(|p| *p <= 100)
            .map(Self)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("tip percent {percent} must be 0-100"))
            })
    }

    /// Accepts only the percentages presented on the checkout form.
    pub fn checkout_choice(percent: u32) -> Result<Self, ServiceError> {
        let tip = Self::new(percent)?;
        if !Self::CHECKOUT_CHOICES.contains(&tip.0) {
            return Err(ServiceError::ValidationError(format!(
                "tip percent must be one of 0, 10, 15 or 20 (got {percent})"
            )));
        }
        Ok(tip)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Derived money figures for a set of lines, in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Totals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub tip_cents: i64,
    pub grand_total_cents: i64,
}

impl Totals {
    pub fn for_lines(lines: &[OrderLine], tax_rate: TaxRate, tip: TipPercent) -> Self {
        let subtotal = lines
            .iter()
            .fold(0i64, |acc, line| acc.saturating_add(line.line_total_cents()));
        Self::from_subtotal(subtotal, tax_rate, tip)
    }

    pub fn from_subtotal(subtotal_cents: i64, tax_rate: TaxRate, tip: TipPercent) -> Self {
        let subtotal = Decimal::from(subtotal_cents);
        let tax_cents = round_cents(subtotal * tax_rate.as_decimal());
        let tip_cents = round_cents(subtotal * Decimal::from(tip.value()) / dec!(100));
        Self {
            subtotal_cents,
            tax_cents,
            tip_cents,
            grand_total_cents: subtotal_cents
                .saturating_add(tax_cents)
                .saturating_add(tip_cents),
        }
    }
}

/// Rounds to whole cents, halves away from zero.
pub fn round_cents(amount: Decimal) -> i64 {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn line(price: i64, qty: u32) -> OrderLine {
        OrderLine {
            item_id: format!("item-{price}"),
            display_name: "Item".into(),
            unit_price_cents: price,
            quantity: qty,
            spice_level: None,
            special_instructions: None,
        }
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        let totals = Totals::for_lines(&[line(1299, 2), line(399, 1)], TaxRate::DEFAULT, TipPercent::NONE);
        assert_eq!(totals.subtotal_cents, 2997);
        assert_eq!(totals.tax_cents, 225);
        assert_eq!(totals.tip_cents, 0);
        assert_eq!(totals.grand_total_cents, 3222);
    }

    #[test_case(dec!(0.5), 1)]
    #[test_case(dec!(1.5), 2)]
    #[test_case(dec!(2.5), 3)]
    #[test_case(dec!(2.4999), 2)]
    #[test_case(dec!(-0.5), -1)]
    fn midpoints(amount: Decimal, expected: i64) {
        assert_eq!(round_cents(amount), expected);
    }

    #[test]
    fn tip_is_a_rounded_share_of_subtotal() {
        let totals = Totals::from_subtotal(2997, TaxRate::DEFAULT, TipPercent::new(15).unwrap());
        // 449.55
        assert_eq!(totals.tip_cents, 450);
        assert_eq!(totals.grand_total_cents, 2997 + 225 + 450);
    }

    #[test]
    fn empty_cart_totals_are_zero() {
        assert_eq!(
            Totals::for_lines(&[], TaxRate::DEFAULT, TipPercent::new(20).unwrap()),
            Totals::default()
        );
    }

    #[test]
    fn tip_and_tax_bounds() {
        assert!(TipPercent::new(101).is_err());
        assert!(TipPercent::checkout_choice(15).is_ok());
        assert!(TipPercent::checkout_choice(12).is_err());
        assert!(TaxRate::new(dec!(1.5)).is_err());
        assert!(TaxRate::new(dec!(-0.01)).is_err());
    }
}
