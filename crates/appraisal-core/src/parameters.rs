//! Project parameter set: the immutable input bundle and save/load unit.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::AppraisalError;
use crate::types::{Money, Rate};
use crate::AppraisalResult;

pub const MAX_CONSTRUCTION_YEARS: u32 = 10;
pub const MAX_OPERATION_YEARS: u32 = 50;

/// Largest monetary amount accepted as input or produced by a projection.
pub const MAX_AMOUNT: Money = dec!(1000000000000000);

/// Tolerance on allocation weights summing to one.
const WEIGHT_SUM_TOLERANCE: Decimal = dec!(0.000000001);

// ---------------------------------------------------------------------------
// Investment
// ---------------------------------------------------------------------------

/// How an investment line item is capitalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Depreciated straight-line net of salvage; residual book value recovered
    Fixed,
    /// Land-use rights, patents. Amortized, no salvage
    Intangible,
    /// Pre-operating and other deferred assets. Amortized, no salvage
    Other,
    /// Invested at the start of operation, recovered in the final year
    WorkingCapital,
}

/// How an item's amount is spread across the construction years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationCurve {
    /// 1/c per construction year
    Even,
    /// Front-loaded 40% / 30% / 30%, tail years share the last 30%
    Standard,
    /// Explicit per-year weights summing to one
    Weights(Vec<Rate>),
}

impl Default for AllocationCurve {
    fn default() -> Self {
        AllocationCurve::Standard
    }
}

impl AllocationCurve {
    /// Resolve to one weight per construction year.
    pub fn weights(&self, construction_years: u32) -> AppraisalResult<Vec<Rate>> {
        let c = construction_years as usize;
        let weights = match self {
            AllocationCurve::Even => {
                let w = Decimal::ONE / Decimal::from(construction_years);
                vec![w; c]
            }
            AllocationCurve::Standard => match c {
                1 => vec![Decimal::ONE],
                2 => vec![dec!(0.5), dec!(0.5)],
                _ => {
                    let tail = dec!(0.3) / Decimal::from(construction_years - 2);
                    let mut w = vec![dec!(0.4), dec!(0.3)];
                    w.extend(std::iter::repeat(tail).take(c - 2));
                    w
                }
            },
            AllocationCurve::Weights(w) => w.clone(),
        };
        validate_weights(&weights, construction_years)?;
        Ok(weights)
    }
}

fn validate_weights(weights: &[Rate], construction_years: u32) -> AppraisalResult<()> {
    if weights.len() != construction_years as usize {
        return Err(AppraisalError::invalid(
            "allocation",
            format!(
                "{} weights given for {} construction years",
                weights.len(),
                construction_years
            ),
        ));
    }
    if weights.iter().any(|w| *w < Decimal::ZERO) {
        return Err(AppraisalError::invalid(
            "allocation",
            "Weights cannot be negative",
        ));
    }
    let sum: Decimal = weights.iter().sum();
    if (sum - Decimal::ONE).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(AppraisalError::invalid(
            "allocation",
            format!("Weights must sum to 1, got {sum}"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentItem {
    pub name: String,
    pub amount: Money,
    pub asset_class: AssetClass,
    /// Per-year weights overriding the parameter set's default curve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Vec<Rate>>,
    /// Overrides the policy's life for this item's class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub useful_life_years: Option<u32>,
}

/// Default useful lives and salvage for each asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepreciationPolicy {
    pub fixed_asset_life: u32,
    /// Share of fixed-asset cost excluded from the depreciable base
    pub salvage_rate: Rate,
    pub intangible_life: u32,
    pub other_asset_life: u32,
}

impl Default for DepreciationPolicy {
    fn default() -> Self {
        Self {
            fixed_asset_life: 20,
            salvage_rate: dec!(0.05),
            intangible_life: 50,
            other_asset_life: 5,
        }
    }
}

impl DepreciationPolicy {
    pub fn life_for(&self, class: AssetClass) -> u32 {
        match class {
            AssetClass::Fixed => self.fixed_asset_life,
            AssetClass::Intangible => self.intangible_life,
            AssetClass::Other => self.other_asset_life,
            AssetClass::WorkingCapital => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Financing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentMethod {
    /// Fixed total payment per period (annuity)
    EqualInstallment,
    /// Fixed principal per period, interest on the declining balance
    EqualPrincipal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal: Money,
    pub rate: Rate,
    /// Number of annual repayment installments
    pub term_years: u32,
    pub method: RepaymentMethod,
    /// Interest-only operation years before the first installment
    #[serde(default)]
    pub grace_years: u32,
    /// Add construction-period interest to the depreciable fixed-asset base
    #[serde(default = "default_true")]
    pub capitalize_construction_interest: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Operating assumptions
// ---------------------------------------------------------------------------

/// Growth rate in force from an operation year onwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthStep {
    /// 1-based operation year the rate first applies to
    pub from_operation_year: u32,
    pub rate: Rate,
}

/// A base-year value escalated by a stepped growth schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSeries {
    pub base: Money,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub growth: Vec<GrowthStep>,
}

impl ProjectionSeries {
    pub fn flat(base: Money) -> Self {
        Self {
            base,
            growth: Vec::new(),
        }
    }

    pub fn growing(base: Money, rate: Rate) -> Self {
        Self {
            base,
            growth: vec![GrowthStep {
                from_operation_year: 2,
                rate,
            }],
        }
    }

    /// Growth rate applied when stepping into `operation_year`.
    pub fn rate_for(&self, operation_year: u32) -> Rate {
        self.growth
            .iter()
            .filter(|s| s.from_operation_year <= operation_year)
            .max_by_key(|s| s.from_operation_year)
            .map(|s| s.rate)
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxHoliday {
    /// Number of initial operation years at the holiday rate
    pub years: u32,
    pub rate: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingAssumptions {
    pub revenue: ProjectionSeries,
    pub operating_cost: ProjectionSeries,
    /// Annual repair and maintenance as a share of fixed-asset cost
    #[serde(default)]
    pub maintenance_rate: Rate,
    pub income_tax_rate: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_holiday: Option<TaxHoliday>,
}

// ---------------------------------------------------------------------------
// Top-level parameter set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectParameters {
    pub project_name: String,
    pub construction_years: u32,
    pub operation_years: u32,
    /// Calendar year of the first construction year, for labelling only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    pub investment_items: Vec<InvestmentItem>,
    #[serde(default)]
    pub default_allocation: AllocationCurve,
    #[serde(default)]
    pub depreciation: DepreciationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financing: Option<LoanTerms>,
    pub operating: OperatingAssumptions,
    pub discount_rate: Rate,
}

impl ProjectParameters {
    pub fn from_json(json: &str) -> AppraisalResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> AppraisalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Construction-period capital expenditure (excludes working capital).
    pub fn construction_capex(&self) -> Money {
        self.investment_items
            .iter()
            .filter(|i| i.asset_class != AssetClass::WorkingCapital)
            .map(|i| i.amount)
            .sum()
    }

    /// Check every input constraint. Called before any computation.
    pub fn validate(&self) -> AppraisalResult<()> {
        if !(1..=MAX_CONSTRUCTION_YEARS).contains(&self.construction_years) {
            return Err(AppraisalError::invalid(
                "construction_years",
                format!(
                    "Construction period must be between 1 and {MAX_CONSTRUCTION_YEARS} years, got {}",
                    self.construction_years
                ),
            ));
        }
        if !(1..=MAX_OPERATION_YEARS).contains(&self.operation_years) {
            return Err(AppraisalError::invalid(
                "operation_years",
                format!(
                    "Operation period must be between 1 and {MAX_OPERATION_YEARS} years, got {}",
                    self.operation_years
                ),
            ));
        }
        non_negative_rate("discount_rate", self.discount_rate)?;

        self.validate_investment()?;
        self.validate_financing()?;
        self.validate_operating()?;
        Ok(())
    }

    fn validate_investment(&self) -> AppraisalResult<()> {
        if self.investment_items.is_empty() {
            return Err(AppraisalError::invalid(
                "investment_items",
                "At least one investment item is required",
            ));
        }
        for item in &self.investment_items {
            let field = format!("investment_items[{}]", item.name);
            non_negative_money(&field, item.amount)?;
            if item.useful_life_years == Some(0) {
                return Err(AppraisalError::invalid(
                    field,
                    "Useful life must be at least 1 year",
                ));
            }
            if let Some(weights) = &item.allocation {
                validate_weights(weights, self.construction_years).map_err(|e| match e {
                    AppraisalError::InvalidInput { reason, .. } => {
                        AppraisalError::invalid(format!("{field}.allocation"), reason)
                    }
                    other => other,
                })?;
            }
        }
        self.default_allocation.weights(self.construction_years)?;

        let policy = &self.depreciation;
        if policy.salvage_rate < Decimal::ZERO || policy.salvage_rate >= Decimal::ONE {
            return Err(AppraisalError::invalid(
                "depreciation.salvage_rate",
                "Salvage rate must be within [0, 1)",
            ));
        }
        for (name, life) in [
            ("depreciation.fixed_asset_life", policy.fixed_asset_life),
            ("depreciation.intangible_life", policy.intangible_life),
            ("depreciation.other_asset_life", policy.other_asset_life),
        ] {
            if life == 0 {
                return Err(AppraisalError::invalid(
                    name,
                    "Useful life must be at least 1 year",
                ));
            }
        }
        Ok(())
    }

    fn validate_financing(&self) -> AppraisalResult<()> {
        let Some(loan) = &self.financing else {
            return Ok(());
        };
        non_negative_money("financing.principal", loan.principal)?;
        unit_rate("financing.rate", loan.rate)?;
        if loan.term_years == 0 {
            return Err(AppraisalError::invalid(
                "financing.term_years",
                "Repayment term must be at least 1 year",
            ));
        }
        let window = self.operation_years.saturating_sub(loan.grace_years);
        if loan.grace_years >= self.operation_years || loan.term_years > window {
            return Err(AppraisalError::invalid(
                "financing.term_years",
                format!(
                    "Term of {} years after {} grace years exceeds the {} year operation period",
                    loan.term_years, loan.grace_years, self.operation_years
                ),
            ));
        }
        let capex = self.construction_capex();
        if loan.principal > capex {
            return Err(AppraisalError::invalid(
                "financing.principal",
                format!(
                    "Loan principal ({}) exceeds the construction capital expenditure it funds ({capex})",
                    loan.principal
                ),
            ));
        }
        Ok(())
    }

    fn validate_operating(&self) -> AppraisalResult<()> {
        let op = &self.operating;
        for (name, series) in [
            ("operating.revenue", &op.revenue),
            ("operating.operating_cost", &op.operating_cost),
        ] {
            non_negative_money(&format!("{name}.base"), series.base)?;
            for step in &series.growth {
                if step.from_operation_year == 0 {
                    return Err(AppraisalError::invalid(
                        format!("{name}.growth"),
                        "Growth steps are numbered from operation year 1",
                    ));
                }
                if step.rate <= dec!(-1) {
                    return Err(AppraisalError::invalid(
                        format!("{name}.growth"),
                        format!("Growth rate must be greater than -100%, got {}", step.rate),
                    ));
                }
            }
        }
        unit_rate("operating.maintenance_rate", op.maintenance_rate)?;
        unit_rate("operating.income_tax_rate", op.income_tax_rate)?;
        if let Some(holiday) = &op.tax_holiday {
            unit_rate("operating.tax_holiday.rate", holiday.rate)?;
        }
        Ok(())
    }
}

/// A complete, valid parameter set for an industrial park with a three-year
/// build and seventeen years of operation. Used as a starting template.
pub fn reference_parameters() -> ProjectParameters {
    let item = |name: &str, amount: Money, asset_class: AssetClass| InvestmentItem {
        name: name.into(),
        amount,
        asset_class,
        allocation: None,
        useful_life_years: None,
    };
    ProjectParameters {
        project_name: "Industrial Park".into(),
        construction_years: 3,
        operation_years: 17,
        start_year: Some(2026),
        investment_items: vec![
            item("Factory buildings", dec!(60000), AssetClass::Fixed),
            item("Supporting facilities", dec!(7062.86), AssetClass::Fixed),
            item("Land use rights", dec!(5000), AssetClass::Intangible),
            item("Pre-operating expenses", dec!(300), AssetClass::Other),
            item("Working capital", dec!(900), AssetClass::WorkingCapital),
        ],
        default_allocation: AllocationCurve::Standard,
        depreciation: DepreciationPolicy::default(),
        financing: Some(LoanTerms {
            principal: dec!(40000),
            rate: dec!(0.049),
            term_years: 12,
            method: RepaymentMethod::EqualInstallment,
            grace_years: 2,
            capitalize_construction_interest: true,
        }),
        operating: OperatingAssumptions {
            revenue: ProjectionSeries::growing(dec!(12000), dec!(0.02)),
            operating_cost: ProjectionSeries::growing(dec!(3000), dec!(0.015)),
            maintenance_rate: dec!(0.005),
            income_tax_rate: dec!(0.25),
            tax_holiday: None,
        },
        discount_rate: dec!(0.06),
    }
}

fn non_negative_money(field: &str, value: Money) -> AppraisalResult<()> {
    if value < Decimal::ZERO {
        return Err(AppraisalError::invalid(
            field,
            format!("Monetary amount cannot be negative, got {value}"),
        ));
    }
    if value > MAX_AMOUNT {
        return Err(AppraisalError::invalid(
            field,
            format!("Monetary amount cannot exceed {MAX_AMOUNT}, got {value}"),
        ));
    }
    Ok(())
}

fn non_negative_rate(field: &str, value: Rate) -> AppraisalResult<()> {
    if value < Decimal::ZERO {
        return Err(AppraisalError::invalid(
            field,
            format!("Rate cannot be negative, got {value}"),
        ));
    }
    Ok(())
}

fn unit_rate(field: &str, value: Rate) -> AppraisalResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(AppraisalError::invalid(
            field,
            format!("Rate must be within [0, 1], got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProjectParameters {
        ProjectParameters {
            project_name: "Industrial Park Phase III".into(),
            construction_years: 3,
            operation_years: 17,
            start_year: None,
            investment_items: vec![
                InvestmentItem {
                    name: "Buildings".into(),
                    amount: dec!(67062.86),
                    asset_class: AssetClass::Fixed,
                    allocation: None,
                    useful_life_years: Some(17),
                },
                InvestmentItem {
                    name: "Working capital".into(),
                    amount: dec!(90),
                    asset_class: AssetClass::WorkingCapital,
                    allocation: None,
                    useful_life_years: None,
                },
            ],
            default_allocation: AllocationCurve::Standard,
            depreciation: DepreciationPolicy::default(),
            financing: Some(LoanTerms {
                principal: dec!(40000),
                rate: dec!(0.049),
                term_years: 10,
                method: RepaymentMethod::EqualInstallment,
                grace_years: 2,
                capitalize_construction_interest: true,
            }),
            operating: OperatingAssumptions {
                revenue: ProjectionSeries::growing(dec!(12000), dec!(0.02)),
                operating_cost: ProjectionSeries::growing(dec!(2500), dec!(0.015)),
                maintenance_rate: Decimal::ZERO,
                income_tax_rate: dec!(0.25),
                tax_holiday: None,
            },
            discount_rate: dec!(0.06),
        }
    }

    #[test]
    fn test_sample_is_valid() {
        sample().validate().unwrap();
        reference_parameters().validate().unwrap();
    }

    #[test]
    fn test_period_bounds() {
        let mut p = sample();
        p.construction_years = 0;
        assert!(p.validate().is_err());
        p.construction_years = 11;
        assert!(p.validate().is_err());
        p.construction_years = 10;
        p.investment_items[0].allocation = None;
        p.validate().unwrap();

        let mut p = sample();
        p.operation_years = 51;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut p = sample();
        p.investment_items[0].amount = dec!(-1);
        match p.validate() {
            Err(AppraisalError::InvalidInput { field, .. }) => {
                assert!(field.contains("Buildings"))
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_loan_term_exceeding_window_rejected() {
        let mut p = sample();
        // 17 operation years, 2 grace => at most 15 installments
        p.financing.as_mut().unwrap().term_years = 16;
        assert!(p.validate().is_err());
        p.financing.as_mut().unwrap().term_years = 15;
        p.validate().unwrap();
    }

    #[test]
    fn test_loan_larger_than_capex_rejected() {
        let mut p = sample();
        p.financing.as_mut().unwrap().principal = dec!(67062.87);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_standard_curve_shapes() {
        let c = AllocationCurve::Standard;
        assert_eq!(c.weights(1).unwrap(), vec![dec!(1)]);
        assert_eq!(c.weights(3).unwrap(), vec![dec!(0.4), dec!(0.3), dec!(0.3)]);
        let five = c.weights(5).unwrap();
        assert_eq!(five.len(), 5);
        assert_eq!(five[0], dec!(0.4));
        assert_eq!(five[2], dec!(0.1));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let c = AllocationCurve::Weights(vec![dec!(0.5), dec!(0.4), dec!(0.2)]);
        assert!(c.weights(3).is_err());
        let c = AllocationCurve::Weights(vec![dec!(0.5), dec!(0.5)]);
        assert!(c.weights(3).is_err());
    }

    #[test]
    fn test_even_curve_thirds_within_tolerance() {
        let w = AllocationCurve::Even.weights(3).unwrap();
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn test_growth_schedule_steps() {
        let s = ProjectionSeries {
            base: dec!(100),
            growth: vec![
                GrowthStep { from_operation_year: 2, rate: dec!(0.05) },
                GrowthStep { from_operation_year: 6, rate: dec!(0.01) },
            ],
        };
        assert_eq!(s.rate_for(1), Decimal::ZERO);
        assert_eq!(s.rate_for(2), dec!(0.05));
        assert_eq!(s.rate_for(5), dec!(0.05));
        assert_eq!(s.rate_for(9), dec!(0.01));
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let p = sample();
        let back = ProjectParameters::from_json(&p.to_json().unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_non_integer_period_rejected_by_deserializer() {
        let mut json: serde_json::Value = serde_json::to_value(sample()).unwrap();
        json["construction_years"] = serde_json::json!(2.5);
        assert!(serde_json::from_value::<ProjectParameters>(json).is_err());
    }
}
