//! Monetary types for price, size, and notional representation.
//!
//! All monetary quantities are exact decimals in the numeraire (USDC);
//! no floating point arithmetic anywhere in the pipeline.

use rust_decimal::Decimal;

/// Price per token, represented as a Decimal for precision.
pub type Price = Decimal;

/// Size in tokens, represented as a Decimal for precision.
pub type Volume = Decimal;

/// Notional value in the numeraire, represented as a Decimal for precision.
pub type Notional = Decimal;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn monetary_types_are_decimal() {
        let price: Price = dec!(0.48);
        let size: Volume = dec!(100.0);
        let notional: Notional = price * size;

        assert_eq!(notional, dec!(48.000));
    }

    #[test]
    fn decimal_arithmetic_is_exact() {
        // 0.1 + 0.2 must be exactly 0.3, unlike binary floats.
        assert_eq!(dec!(0.1) + dec!(0.2), dec!(0.3));
    }
}
