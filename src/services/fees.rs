//! Fee and tax computation for refund disbursements
//!
//! All amounts are minor units. Percentage components round up so the
//! platform never under-collects by a fraction of a unit.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::RefundPolicyConfig;
use crate::database::refund_repository::AmountBreakdown;
use crate::error::{AppError, AppResult, DomainError};

/// Deployment-fixed fee policy, parsed once at startup
#[derive(Debug, Clone)]
pub struct FeePolicy {
    fixed_fee: i64,
    fee_rate: Decimal,
    tax_rate: Decimal,
}

impl FeePolicy {
    pub fn from_config(config: &RefundPolicyConfig) -> AppResult<Self> {
        let fee_rate: Decimal = config
            .fee_rate
            .parse()
            .map_err(|_| AppError::internal(format!("invalid fee rate '{}'", config.fee_rate)))?;
        let tax_rate: Decimal = config
            .tax_rate
            .parse()
            .map_err(|_| AppError::internal(format!("invalid tax rate '{}'", config.tax_rate)))?;

        Ok(Self {
            fixed_fee: config.fixed_fee,
            fee_rate,
            tax_rate,
        })
    }

    #[cfg(test)]
    pub fn fixed(fixed_fee: i64, fee_rate: &str, tax_rate: &str) -> Self {
        Self {
            fixed_fee,
            fee_rate: fee_rate.parse().unwrap(),
            tax_rate: tax_rate.parse().unwrap(),
        }
    }

    /// Compute the full amount breakdown for a base refund amount.
    ///
    /// percentage_fee = ceil(base * fee_rate)
    /// tax            = ceil((fixed_fee + percentage_fee) * tax_rate)
    pub fn breakdown(&self, amount: i64) -> AppResult<AmountBreakdown> {
        if amount <= 0 {
            return Err(AppError::domain(DomainError::InvalidAmount {
                amount: amount.to_string(),
                reason: "amount must be greater than zero".to_string(),
            }));
        }

        let base = Decimal::from(amount);
        let percentage_fee = to_minor_units(amount, (base * self.fee_rate).ceil())?;
        let fee_total = Decimal::from(self.fixed_fee) + Decimal::from(percentage_fee);
        let tax = to_minor_units(amount, (fee_total * self.tax_rate).ceil())?;

        let total = amount
            .checked_add(self.fixed_fee)
            .and_then(|sum| sum.checked_add(percentage_fee))
            .and_then(|sum| sum.checked_add(tax))
            .ok_or_else(|| {
                AppError::domain(DomainError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: "total overflows".to_string(),
                })
            })?;

        Ok(AmountBreakdown {
            base: amount,
            fixed_fee: self.fixed_fee,
            percentage_fee,
            tax,
            total,
        })
    }
}

fn to_minor_units(amount: i64, value: Decimal) -> AppResult<i64> {
    value.to_i64().ok_or_else(|| {
        AppError::domain(DomainError::InvalidAmount {
            amount: amount.to_string(),
            reason: "fee computation overflows".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_rounds_percentage_components_up() {
        // 1.5% of 150_000 = 2_250; tax 11% of (5_000 + 2_250) = 797.5 -> 798
        let policy = FeePolicy::fixed(5_000, "0.015", "0.11");
        let breakdown = policy.breakdown(150_000).expect("breakdown should succeed");

        assert_eq!(breakdown.base, 150_000);
        assert_eq!(breakdown.fixed_fee, 5_000);
        assert_eq!(breakdown.percentage_fee, 2_250);
        assert_eq!(breakdown.tax, 798);
        assert_eq!(breakdown.total, 158_048);
    }

    #[test]
    fn fractional_percentage_fee_rounds_up() {
        // 1.5% of 100_001 = 1_500.015 -> 1_501
        let policy = FeePolicy::fixed(0, "0.015", "0");
        let breakdown = policy.breakdown(100_001).expect("breakdown should succeed");
        assert_eq!(breakdown.percentage_fee, 1_501);
        assert_eq!(breakdown.total, 101_502);
    }

    #[test]
    fn zero_rates_leave_the_amount_untouched() {
        let policy = FeePolicy::fixed(0, "0", "0");
        let breakdown = policy.breakdown(42_000).expect("breakdown should succeed");
        assert_eq!(breakdown.total, 42_000);
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let policy = FeePolicy::fixed(0, "0", "0");
        assert!(policy.breakdown(0).is_err());
        assert!(policy.breakdown(-5).is_err());
    }

    #[test]
    fn malformed_rate_is_a_configuration_failure() {
        let config = RefundPolicyConfig {
            callback_token: "tok".to_string(),
            signing_secret: "sec".to_string(),
            fixed_fee: 0,
            fee_rate: "one point five".to_string(),
            tax_rate: "0".to_string(),
            sweep_interval_secs: 600,
            sweep_lookback_hours: 2,
        };
        assert!(FeePolicy::from_config(&config).is_err());
    }
}
