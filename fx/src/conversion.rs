//! Fee and target amount arithmetic.

use fxledger_common::{round_amount, BPS_DIVISOR};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RateError, RateResult};
use crate::quote::RateQuote;

/// Amounts produced by applying a quote to a source amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    /// Amount debited, in the source currency.
    pub source_amount: Decimal,
    /// `source_amount * rate`, before fees.
    pub gross_amount: Decimal,
    /// `gross_amount * fee_bps / 10000`.
    pub fee: Decimal,
    /// Amount credited, in the target currency.
    pub target_amount: Decimal,
    pub rate: Decimal,
}

impl Conversion {
    /// Apply `quote` to `source_amount`.
    ///
    /// Gross and fee are rounded to the stored scale separately, so
    /// `target_amount + fee == gross_amount` holds exactly.
    pub fn compute(source_amount: Decimal, quote: &RateQuote) -> RateResult<Self> {
        if quote.fee_bps > BPS_DIVISOR {
            return Err(RateError::FeeOutOfRange {
                pair: quote.pair(),
                fee_bps: quote.fee_bps,
            });
        }

        let overflow = || {
            RateError::Overflow(format!(
                "{} {} at rate {}",
                source_amount, quote.source, quote.rate
            ))
        };

        let gross = source_amount.checked_mul(quote.rate).ok_or_else(overflow)?;
        let fee_fraction = Decimal::from(quote.fee_bps)
            .checked_div(Decimal::from(BPS_DIVISOR))
            .ok_or_else(overflow)?;
        let fee = round_amount(gross.checked_mul(fee_fraction).ok_or_else(overflow)?);
        let gross_amount = round_amount(gross);
        let target_amount = gross_amount.checked_sub(fee).ok_or_else(overflow)?;

        if target_amount <= Decimal::ZERO {
            return Err(RateError::NonPositiveAmount(format!(
                "{} {} at rate {} with {} bps gives {}",
                source_amount, quote.source, quote.rate, quote.fee_bps, target_amount
            )));
        }

        Ok(Self {
            source_amount,
            gross_amount,
            fee,
            target_amount,
            rate: quote.rate,
        })
    }

    /// Effective rate after fees.
    pub fn effective_rate(&self) -> Decimal {
        if self.source_amount.is_zero() {
            return Decimal::ZERO;
        }
        self.target_amount / self.source_amount
    }
}
