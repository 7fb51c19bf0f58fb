//! Engine configuration: root-solver constants and the fixed tax rule set.
//!
//! Loaded once by the caller and shared read-only by every evaluation run.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::AppraisalError;
use crate::types::Rate;
use crate::AppraisalResult;

/// Rate-of-return search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Absolute tolerance on the rate
    pub tolerance: Decimal,
    pub max_iterations: u32,
    pub lower_bound: Rate,
    pub upper_bound: Rate,
    /// Starting point for the Newton step
    pub initial_guess: Rate,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: dec!(0.000001),
            max_iterations: 100,
            lower_bound: dec!(-0.9),
            upper_bound: dec!(1.0),
            initial_guess: dec!(0.10),
        }
    }
}

/// Indirect tax, surcharge and profit-distribution rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxRules {
    /// VAT rate embedded in revenue
    pub vat_output_rate: Rate,
    /// VAT rate embedded in purchased operating inputs
    pub vat_input_rate: Rate,
    /// Levied on VAT payable
    pub city_maintenance_rate: Rate,
    /// Levied on VAT payable
    pub education_surtax_rate: Rate,
    /// Years a tax loss may be carried forward
    pub loss_carry_forward_years: u32,
    /// Share of positive net profit set aside as statutory surplus reserve
    pub surplus_reserve_rate: Rate,
}

impl Default for TaxRules {
    fn default() -> Self {
        Self {
            vat_output_rate: dec!(0.09),
            vat_input_rate: dec!(0.13),
            city_maintenance_rate: dec!(0.07),
            education_surtax_rate: dec!(0.05),
            loss_carry_forward_years: 5,
            surplus_reserve_rate: dec!(0.10),
        }
    }
}

impl TaxRules {
    /// No VAT, no surcharges, no reserve. Income tax alone remains.
    pub fn income_tax_only() -> Self {
        Self {
            vat_output_rate: Decimal::ZERO,
            vat_input_rate: Decimal::ZERO,
            city_maintenance_rate: Decimal::ZERO,
            education_surtax_rate: Decimal::ZERO,
            loss_carry_forward_years: 5,
            surplus_reserve_rate: Decimal::ZERO,
        }
    }

    pub fn surcharge_rate(&self) -> Rate {
        self.city_maintenance_rate + self.education_surtax_rate
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub solver: SolverConfig,
    pub tax_rules: TaxRules,
}

impl EngineConfig {
    /// Parse a TOML document. Missing tables and keys fall back to defaults.
    pub fn from_toml_str(content: &str) -> AppraisalResult<Self> {
        let cfg: EngineConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> AppraisalResult<String> {
        toml::to_string_pretty(self).map_err(|e| AppraisalError::Config(e.to_string()))
    }

    pub fn validate(&self) -> AppraisalResult<()> {
        let s = &self.solver;
        if s.tolerance <= Decimal::ZERO {
            return Err(AppraisalError::Config(
                "solver.tolerance must be positive".into(),
            ));
        }
        if s.max_iterations == 0 {
            return Err(AppraisalError::Config(
                "solver.max_iterations must be at least 1".into(),
            ));
        }
        if s.lower_bound <= dec!(-1) || s.lower_bound >= s.upper_bound {
            return Err(AppraisalError::Config(format!(
                "solver bracket [{}, {}] must satisfy -1 < lower < upper",
                s.lower_bound, s.upper_bound
            )));
        }

        let t = &self.tax_rules;
        for (name, rate) in [
            ("vat_output_rate", t.vat_output_rate),
            ("vat_input_rate", t.vat_input_rate),
            ("city_maintenance_rate", t.city_maintenance_rate),
            ("education_surtax_rate", t.education_surtax_rate),
            ("surplus_reserve_rate", t.surplus_reserve_rate),
        ] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(AppraisalError::Config(format!(
                    "tax_rules.{name} must be within [0, 1], got {rate}"
                )));
            }
        }
        Ok(())
    }
}
