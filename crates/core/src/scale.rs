//! Fixed-point conversion between user-facing decimal amounts and the
//! venue's on-chain integer representation.
//!
//! The venue quotes prices at 8 decimal places and sizes/collateral at 18.
//! Every conversion in the codebase goes through here with an explicit scale
//! so the two conventions never mix silently.

use ethers::types::{Sign, I256, U256};
use rust_decimal::Decimal;
use thiserror::Error;

/// Decimal places for prices (oracle samples, alert targets, acceptable price).
pub const PRICE_DECIMALS: u32 = 8;

/// Decimal places for notional size and collateral amounts.
pub const SIZE_DECIMALS: u32 = 18;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScaleError {
    /// The amount has more fractional digits than the target scale can hold.
    #[error("{amount} has more than {decimals} fractional digits")]
    PrecisionLoss { amount: Decimal, decimals: u32 },

    /// The scaled value does not fit the target integer type.
    #[error("value does not fit the fixed-point representation")]
    Overflow,

    /// A negative amount where only non-negative values are meaningful.
    #[error("negative amount {0} not allowed here")]
    Negative(Decimal),
}

/// Converts a decimal amount to a signed fixed-point integer at `decimals`.
///
/// Exact: amounts with fractional digits beyond the scale are rejected
/// rather than rounded.
pub fn to_fixed(amount: Decimal, decimals: u32) -> Result<I256, ScaleError> {
    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > decimals {
        return Err(ScaleError::PrecisionLoss { amount, decimals });
    }

    let mantissa = amount.mantissa();
    let factor = U256::from(10u64).pow(U256::from(decimals - scale));
    let abs = U256::from(mantissa.unsigned_abs())
        .checked_mul(factor)
        .ok_or(ScaleError::Overflow)?;
    let sign = if mantissa < 0 {
        Sign::Negative
    } else {
        Sign::Positive
    };

    I256::checked_from_sign_and_abs(sign, abs).ok_or(ScaleError::Overflow)
}

/// Converts a non-negative decimal amount to an unsigned fixed-point integer.
pub fn to_fixed_unsigned(amount: Decimal, decimals: u32) -> Result<U256, ScaleError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ScaleError::Negative(amount));
    }
    let fixed = to_fixed(amount, decimals)?;
    Ok(fixed.into_raw())
}

/// Converts a signed fixed-point integer back to a decimal for display.
///
/// Fails only when the value exceeds `Decimal`'s 96-bit mantissa, which no
/// realistic price or account balance does.
pub fn from_fixed(value: I256, decimals: u32) -> Result<Decimal, ScaleError> {
    let mut dec =
        Decimal::from_str_exact(&value.to_string()).map_err(|_| ScaleError::Overflow)?;
    dec.set_scale(decimals).map_err(|_| ScaleError::Overflow)?;
    Ok(dec.normalize())
}

/// Converts an unsigned fixed-point integer back to a decimal for display.
pub fn from_fixed_unsigned(value: U256, decimals: u32) -> Result<Decimal, ScaleError> {
    let mut dec =
        Decimal::from_str_exact(&value.to_string()).map_err(|_| ScaleError::Overflow)?;
    dec.set_scale(decimals).map_err(|_| ScaleError::Overflow)?;
    Ok(dec.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scales_whole_amounts() {
        assert_eq!(
            to_fixed(dec!(10), SIZE_DECIMALS).unwrap(),
            I256::from(10i64) * I256::exp10(18)
        );
        assert_eq!(
            to_fixed(dec!(3000), PRICE_DECIMALS).unwrap(),
            I256::from(3000i64) * I256::exp10(8)
        );
    }

    #[test]
    fn scales_fractional_amounts_exactly() {
        assert_eq!(
            to_fixed(dec!(0.5), PRICE_DECIMALS).unwrap(),
            I256::from(50_000_000i64)
        );
        assert_eq!(
            to_fixed(dec!(-2.25), SIZE_DECIMALS).unwrap(),
            I256::from(-225i64) * I256::exp10(16)
        );
    }

    #[test]
    fn rejects_precision_beyond_scale() {
        let err = to_fixed(dec!(1.000000001), PRICE_DECIMALS).unwrap_err();
        assert!(matches!(err, ScaleError::PrecisionLoss { .. }));

        // Trailing zeros are not precision.
        assert!(to_fixed(dec!(1.000000000), PRICE_DECIMALS).is_ok());
    }

    #[test]
    fn unsigned_rejects_negative() {
        assert_eq!(
            to_fixed_unsigned(dec!(-1), SIZE_DECIMALS),
            Err(ScaleError::Negative(dec!(-1)))
        );
        assert_eq!(
            to_fixed_unsigned(dec!(2950), PRICE_DECIMALS).unwrap(),
            U256::from(295_000_000_000u64)
        );
    }

    #[test]
    fn from_fixed_round_trips_display_values() {
        let price = to_fixed_unsigned(dec!(2951.37), PRICE_DECIMALS).unwrap();
        assert_eq!(
            from_fixed_unsigned(price, PRICE_DECIMALS).unwrap(),
            dec!(2951.37)
        );

        let margin = to_fixed(dec!(-12.5), SIZE_DECIMALS).unwrap();
        assert_eq!(from_fixed(margin, SIZE_DECIMALS).unwrap(), dec!(-12.5));
    }
}
