//! Financial sanity checks on a snapshot's raw inputs.
//!
//! Run once per creation and per update. Requiredness is not checked
//! here: an absent field is always valid.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::snapshot::{FinancialInputs, Snapshot};
use crate::types::DomainError;

/// One trillion SAR.
pub const DEFAULT_CEILING: Decimal = dec!(1000000000000);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-field upper bounds on raw inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_cash_balance: Decimal,
    pub max_monthly_revenue: Decimal,
    pub max_operating_costs: Decimal,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_cash_balance: DEFAULT_CEILING,
            max_monthly_revenue: DEFAULT_CEILING,
            max_operating_costs: DEFAULT_CEILING,
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FinancialValidator {
    config: ValidatorConfig,
}

impl FinancialValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn validate_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        self.validate_inputs(&snapshot.inputs())
    }

    /// Check each present field, reporting the first violation.
    pub fn validate_inputs(&self, inputs: &FinancialInputs) -> Result<(), DomainError> {
        let checks = [
            ("cash_balance", "Cash balance", inputs.cash_balance, self.config.max_cash_balance),
            ("monthly_revenue", "Monthly revenue", inputs.monthly_revenue, self.config.max_monthly_revenue),
            ("operating_costs", "Operating costs", inputs.operating_costs, self.config.max_operating_costs),
        ];

        for (field, label, value, ceiling) in checks {
            if let Some(value) = value {
                check_field(field, label, value, ceiling)?;
            }
        }

        debug!(?inputs, "Financial inputs passed sanity checks");
        Ok(())
    }
}

fn check_field(
    field: &'static str,
    label: &str,
    value: Decimal,
    ceiling: Decimal,
) -> Result<(), DomainError> {
    if value < Decimal::ZERO {
        return Err(DomainError::FinancialSanity {
            field,
            value,
            reason: format!("{label} cannot be negative."),
        });
    }
    if value > ceiling {
        return Err(DomainError::FinancialSanity {
            field,
            value,
            reason: format!("{label} exceeds realistic threshold ({ceiling} SAR)."),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn inputs(cash: Option<Decimal>) -> FinancialInputs {
        FinancialInputs::new(cash, None, None)
    }

    #[test]
    fn test_default_ceiling_is_one_trillion() {
        assert_eq!(DEFAULT_CEILING, dec!(1000000000000));
    }

    #[test]
    fn test_accepts_zero_and_absent() {
        let v = FinancialValidator::default();
        assert!(v.validate_inputs(&inputs(Some(dec!(0)))).is_ok());
        assert!(v.validate_inputs(&FinancialInputs::default()).is_ok());
    }

    #[test]
    fn test_rejects_negative_cash() {
        let v = FinancialValidator::default();
        match v.validate_inputs(&inputs(Some(dec!(-1)))).unwrap_err() {
            DomainError::FinancialSanity { field, value, reason } => {
                assert_eq!(field, "cash_balance");
                assert_eq!(value, dec!(-1));
                assert!(reason.contains("cannot be negative"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_cash_above_ceiling() {
        let v = FinancialValidator::default();
        match v.validate_inputs(&inputs(Some(dec!(10000000000000)))).unwrap_err() {
            DomainError::FinancialSanity { field, reason, .. } => {
                assert_eq!(field, "cash_balance");
                assert!(reason.contains("1000000000000"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_accepts_value_at_ceiling() {
        let v = FinancialValidator::default();
        assert!(v.validate_inputs(&inputs(Some(DEFAULT_CEILING))).is_ok());
    }

    #[test]
    fn test_checks_revenue_and_costs() {
        let v = FinancialValidator::default();
        let err = v
            .validate_inputs(&FinancialInputs::new(None, Some(dec!(-5)), None))
            .unwrap_err();
        assert!(matches!(err, DomainError::FinancialSanity { field: "monthly_revenue", .. }));

        let err = v
            .validate_inputs(&FinancialInputs::new(None, None, Some(dec!(-0.01))))
            .unwrap_err();
        assert!(matches!(err, DomainError::FinancialSanity { field: "operating_costs", .. }));
    }

    #[test]
    fn test_reports_first_violation_in_field_order() {
        let v = FinancialValidator::default();
        let err = v
            .validate_inputs(&FinancialInputs::new(Some(dec!(-1)), Some(dec!(-1)), Some(dec!(-1))))
            .unwrap_err();
        assert!(matches!(err, DomainError::FinancialSanity { field: "cash_balance", .. }));
    }

    #[test]
    fn test_custom_ceiling() {
        let v = FinancialValidator::new(ValidatorConfig {
            max_operating_costs: dec!(500),
            ..ValidatorConfig::default()
        });
        assert!(v.validate_inputs(&FinancialInputs::new(None, None, Some(dec!(500)))).is_ok());
        assert!(v.validate_inputs(&FinancialInputs::new(None, None, Some(dec!(501)))).is_err());
    }

    #[test]
    fn test_validate_snapshot_uses_raw_inputs() {
        let snapshot = Snapshot::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            FinancialInputs::new(Some(dec!(1)), Some(dec!(-2)), None),
        );
        let err = FinancialValidator::default().validate_snapshot(&snapshot).unwrap_err();
        assert!(matches!(err, DomainError::FinancialSanity { field: "monthly_revenue", .. }));
    }
}
