//! One-factor-at-a-time sensitivity analysis.
//!
//! Each factor is perturbed across a range of fractional changes while every
//! other input stays at its base value. Every scenario is a complete,
//! independent evaluation; scenarios run on the rayon pool when the
//! `parallel` feature is enabled and are reported in sweep order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::AppraisalError;
use crate::evaluation::run_pipeline;
use crate::indicators::FinancialIndicatorSet;
use crate::parameters::ProjectParameters;
use crate::types::{round_money, with_metadata, ComputationOutput, Indicator, Money, Rate};
use crate::AppraisalResult;

/// An input the sweep perturbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Revenue base value
    Revenue,
    /// Operating cost base value
    OperatingCost,
    /// Every investment item, and the loan principal funding them
    Investment,
    DiscountRate,
}

impl Factor {
    pub const ALL: [Factor; 4] = [
        Factor::Revenue,
        Factor::OperatingCost,
        Factor::Investment,
        Factor::DiscountRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::Revenue => "revenue",
            Factor::OperatingCost => "operating_cost",
            Factor::Investment => "investment",
            Factor::DiscountRate => "discount_rate",
        }
    }

    /// A copy of `params` with this factor scaled by `1 + perturbation`.
    pub fn apply(&self, params: &ProjectParameters, perturbation: Rate) -> ProjectParameters {
        let scale = Decimal::ONE + perturbation;
        let mut scenario = params.clone();
        match self {
            Factor::Revenue => {
                scenario.operating.revenue.base = round_money(params.operating.revenue.base * scale);
            }
            Factor::OperatingCost => {
                scenario.operating.operating_cost.base =
                    round_money(params.operating.operating_cost.base * scale);
            }
            Factor::Investment => {
                for item in &mut scenario.investment_items {
                    item.amount = round_money(item.amount * scale);
                }
                let capex = scenario.construction_capex();
                if let Some(loan) = &mut scenario.financing {
                    loan.principal = round_money(loan.principal * scale).min(capex);
                }
            }
            Factor::DiscountRate => {
                scenario.discount_rate = params.discount_rate * scale;
            }
        }
        scenario
    }
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Factor {
    type Err = AppraisalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "revenue" => Ok(Factor::Revenue),
            "operating_cost" | "cost" => Ok(Factor::OperatingCost),
            "investment" => Ok(Factor::Investment),
            "discount_rate" | "rate" => Ok(Factor::DiscountRate),
            other => Err(AppraisalError::invalid(
                "factor",
                format!(
                    "Unknown factor '{other}'. Valid: revenue, operating_cost, investment, discount_rate"
                ),
            )),
        }
    }
}

/// Perturbation range as fractions of the base value (-0.2 = -20%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub min: Rate,
    pub max: Rate,
    pub step: Rate,
}

impl Default for RangeSpec {
    fn default() -> Self {
        Self {
            min: dec!(-0.20),
            max: dec!(0.20),
            step: dec!(0.05),
        }
    }
}

impl RangeSpec {
    pub fn validate(&self) -> AppraisalResult<()> {
        if self.step <= Decimal::ZERO {
            return Err(AppraisalError::invalid("range.step", "Step must be positive"));
        }
        if self.min > self.max {
            return Err(AppraisalError::invalid("range.min", "Min must be <= max"));
        }
        if self.min <= dec!(-1) {
            return Err(AppraisalError::invalid(
                "range.min",
                "A perturbation of -100% or below removes the factor entirely",
            ));
        }
        Ok(())
    }

    /// Perturbations from `min` stepping by `step`, with `max` appended if
    /// the last step does not land on it.
    pub fn values(&self) -> AppraisalResult<Vec<Rate>> {
        self.validate()?;

        let mut values = Vec::new();
        let mut current = self.min;
        while current <= self.max {
            values.push(current);
            current += self.step;
        }
        if let Some(&last) = values.last() {
            if last < self.max {
                values.push(self.max);
            }
        }
        Ok(values)
    }
}

/// The `(factor, perturbation)` pairs of a sweep, in factor declaration
/// order then ascending perturbation. Iterating does no work; each call to
/// [`ScenarioSweep::iter`] starts again from the beginning.
#[derive(Debug, Clone)]
pub struct ScenarioSweep {
    factors: Vec<Factor>,
    perturbations: Vec<Rate>,
}

impl ScenarioSweep {
    pub fn new(factors: &[Factor], range: &RangeSpec) -> AppraisalResult<Self> {
        if factors.is_empty() {
            return Err(AppraisalError::invalid(
                "factors",
                "At least one factor is required",
            ));
        }
        let mut unique: Vec<Factor> = Vec::with_capacity(factors.len());
        for f in factors {
            if !unique.contains(f) {
                unique.push(*f);
            }
        }
        Ok(Self {
            factors: unique,
            perturbations: range.values()?,
        })
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn perturbations(&self) -> &[Rate] {
        &self.perturbations
    }

    pub fn len(&self) -> usize {
        self.factors.len() * self.perturbations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, Rate)> + '_ {
        self.factors
            .iter()
            .flat_map(move |f| self.perturbations.iter().map(move |p| (*f, *p)))
    }
}

/// Per-indicator sensitivity coefficients: relative change per unit of
/// perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub npv: Indicator,
    pub irr: Indicator,
    pub static_payback: Indicator,
    pub dynamic_payback: Indicator,
    pub benefit_cost_ratio: Indicator,
}

impl Coefficients {
    fn undefined() -> Self {
        Self {
            npv: Indicator::Undefined,
            irr: Indicator::Undefined,
            static_payback: Indicator::Undefined,
            dynamic_payback: Indicator::Undefined,
            benefit_cost_ratio: Indicator::Undefined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPoint {
    pub perturbation: Rate,
    /// Absent when the scenario could not be evaluated
    pub indicators: Option<FinancialIndicatorSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub npv_change: Option<Money>,
    /// NPV change as a percentage of the absolute baseline NPV
    pub npv_change_pct: Indicator,
    pub irr_change: Option<Rate>,
    pub coefficients: Coefficients,
}

/// Perturbations at which an indicator reaches its break-even target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    /// NPV crosses zero
    pub npv: Option<Rate>,
    /// IRR crosses the discount rate
    pub irr: Option<Rate>,
    /// Benefit-cost ratio crosses one
    pub benefit_cost_ratio: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorAnalysis {
    pub factor: Factor,
    pub points: Vec<ScenarioPoint>,
    pub critical_values: CriticalValues,
    /// Mean |NPV coefficient| over the points where it is defined
    pub mean_abs_npv_coefficient: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    pub baseline: FinancialIndicatorSet,
    pub range: RangeSpec,
    pub factors: Vec<FactorAnalysis>,
    /// Factors from most to least sensitive by mean |NPV coefficient|
    pub ranking: Vec<Factor>,
}

/// Run the sensitivity sweep over `factors` and `range`.
///
/// Base parameters are validated first; a validation failure aborts before
/// any scenario runs. A scenario that fails on its own is recorded against
/// its point. A consistency violation in any scenario aborts the sweep.
pub fn sensitivity(
    params: &ProjectParameters,
    factors: &[Factor],
    range: &RangeSpec,
    config: &EngineConfig,
) -> AppraisalResult<ComputationOutput<SensitivityResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // ── Validation ───────────────────────────────────────────────────
    config.validate()?;
    params.validate()?;
    let sweep = ScenarioSweep::new(factors, range)?;

    // ── Baseline ─────────────────────────────────────────────────────
    let mut baseline_warnings = Vec::new();
    let baseline = run_pipeline(params, config, &mut baseline_warnings)?.indicators;

    // ── Scenarios ────────────────────────────────────────────────────
    let scenarios: Vec<(Factor, Rate)> = sweep.iter().collect();
    let run = |&(factor, p): &(Factor, Rate)| run_scenario(params, config, factor, p);

    #[cfg(feature = "parallel")]
    let outcomes: Vec<AppraisalResult<FinancialIndicatorSet>> =
        scenarios.par_iter().map(run).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<AppraisalResult<FinancialIndicatorSet>> =
        scenarios.iter().map(run).collect();

    debug!(scenarios = outcomes.len(), "sensitivity scenarios evaluated");

    // ── Assemble per factor ──────────────────────────────────────────
    let mut outcomes = outcomes.into_iter();
    let mut analyses = Vec::with_capacity(sweep.factors().len());
    for &factor in sweep.factors() {
        let mut points = Vec::with_capacity(sweep.perturbations().len());
        let mut rates = Vec::with_capacity(sweep.perturbations().len());
        for &p in sweep.perturbations() {
            let outcome = outcomes.next().ok_or_else(|| {
                AppraisalError::inconsistent("sensitivity sweep", 0, "missing scenario outcome")
            })?;
            let point = match outcome {
                Ok(set) => scenario_point(p, set, &baseline),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(%factor, perturbation = %p, error = %e, "scenario failed");
                    warnings.push(format!("{factor} {p}: {e}"));
                    failed_point(p, e.to_string())
                }
            };
            rates.push(match factor {
                Factor::DiscountRate => params.discount_rate * (Decimal::ONE + p),
                _ => params.discount_rate,
            });
            points.push(point);
        }

        let critical_values = CriticalValues {
            npv: critical_value(&points, &rates, |s, _| s.npv.value()),
            irr: critical_value(&points, &rates, |s, rate| s.irr.value().map(|v| v - rate)),
            benefit_cost_ratio: critical_value(&points, &rates, |s, _| {
                s.benefit_cost_ratio.value().map(|v| v - Decimal::ONE)
            }),
        };
        let mean_abs_npv_coefficient = mean_abs(points.iter().filter_map(|pt| pt.coefficients.npv.value()));

        analyses.push(FactorAnalysis {
            factor,
            points,
            critical_values,
            mean_abs_npv_coefficient,
        });
    }

    let ranking = rank_factors(&analyses);

    if !sweep.perturbations().iter().any(|p| p.is_zero()) {
        warnings.push("The range does not include 0; no point reproduces the baseline".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-factor-at-a-time sensitivity analysis",
        &serde_json::json!({
            "factors": sweep.factors().iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            "range": {
                "min": range.min.to_string(),
                "max": range.max.to_string(),
                "step": range.step.to_string(),
            },
            "scenarios": sweep.len(),
            "coefficient": "((I - I0) / |I0|) / p",
        }),
        warnings,
        elapsed,
        SensitivityResult {
            baseline,
            range: range.clone(),
            factors: analyses,
            ranking,
        },
    ))
}

fn run_scenario(
    params: &ProjectParameters,
    config: &EngineConfig,
    factor: Factor,
    perturbation: Rate,
) -> AppraisalResult<FinancialIndicatorSet> {
    let scenario = if perturbation.is_zero() {
        params.clone()
    } else {
        factor.apply(params, perturbation)
    };
    scenario.validate()?;
    let mut scenario_warnings = Vec::new();
    Ok(run_pipeline(&scenario, config, &mut scenario_warnings)?.indicators)
}

fn scenario_point(
    perturbation: Rate,
    set: FinancialIndicatorSet,
    baseline: &FinancialIndicatorSet,
) -> ScenarioPoint {
    let npv_change = difference(set.npv, baseline.npv);
    let npv_change_pct = match (npv_change, baseline.npv.value()) {
        (Some(change), Some(base)) => match Indicator::ratio(change, base.abs()) {
            Indicator::Value(v) => Indicator::Value(v * dec!(100)),
            other => other,
        },
        _ => Indicator::Undefined,
    };
    let coefficients = Coefficients {
        npv: coefficient(set.npv, baseline.npv, perturbation),
        irr: coefficient(set.irr, baseline.irr, perturbation),
        static_payback: coefficient(set.static_payback, baseline.static_payback, perturbation),
        dynamic_payback: coefficient(set.dynamic_payback, baseline.dynamic_payback, perturbation),
        benefit_cost_ratio: coefficient(
            set.benefit_cost_ratio,
            baseline.benefit_cost_ratio,
            perturbation,
        ),
    };

    ScenarioPoint {
        perturbation,
        indicators: Some(set),
        error: None,
        npv_change,
        npv_change_pct,
        irr_change: difference(set.irr, baseline.irr),
        coefficients,
    }
}

fn failed_point(perturbation: Rate, error: String) -> ScenarioPoint {
    ScenarioPoint {
        perturbation,
        indicators: None,
        error: Some(error),
        npv_change: None,
        npv_change_pct: Indicator::Undefined,
        irr_change: None,
        coefficients: Coefficients::undefined(),
    }
}

fn difference(scenario: Indicator, baseline: Indicator) -> Option<Decimal> {
    Some(scenario.value()? - baseline.value()?)
}

/// `((I - I0) / |I0|) / p`, undefined for a zero perturbation, a zero
/// baseline, or a sentinel on either side.
pub fn coefficient(scenario: Indicator, baseline: Indicator, perturbation: Rate) -> Indicator {
    match (scenario.value(), baseline.value()) {
        (Some(i), Some(i0)) if !perturbation.is_zero() && !i0.is_zero() => {
            Indicator::Value((i - i0) / i0.abs() / perturbation)
        }
        _ => Indicator::Undefined,
    }
}

/// First perturbation at which `distance` reaches zero, linearly
/// interpolated between the first bracketing pair of evaluated points.
fn critical_value<F>(points: &[ScenarioPoint], rates: &[Rate], distance: F) -> Option<Rate>
where
    F: Fn(&FinancialIndicatorSet, Rate) -> Option<Decimal>,
{
    let samples: Vec<(Rate, Decimal)> = points
        .iter()
        .zip(rates)
        .filter_map(|(pt, rate)| {
            let set = pt.indicators.as_ref()?;
            Some((pt.perturbation, distance(set, *rate)?))
        })
        .collect();

    for pair in samples.windows(2) {
        let (p0, d0) = pair[0];
        let (p1, d1) = pair[1];
        if d0.is_zero() {
            return Some(p0);
        }
        if d0.is_sign_negative() != d1.is_sign_negative() || d1.is_zero() {
            return Some(p0 + (p1 - p0) * (-d0) / (d1 - d0));
        }
    }
    match samples.as_slice() {
        [(p, d)] if d.is_zero() => Some(*p),
        _ => None,
    }
}

fn mean_abs(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    let (sum, count) = values.fold((Decimal::ZERO, 0u64), |(s, n), v| (s + v.abs(), n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / Decimal::from(count))
    }
}

/// Most sensitive first; factors without a defined NPV coefficient last.
fn rank_factors(analyses: &[FactorAnalysis]) -> Vec<Factor> {
    let mut ranked: Vec<&FactorAnalysis> = analyses.iter().collect();
    ranked.sort_by(|a, b| match (a.mean_abs_npv_coefficient, b.mean_abs_npv_coefficient) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked.into_iter().map(|a| a.factor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{reference_parameters, ProjectionSeries, MAX_AMOUNT};

    #[test]
    fn test_failed_scenario_is_recorded_on_its_point() {
        // Revenue already at the input ceiling: scaling it up fails validation
        let mut params = reference_parameters();
        params.operating.revenue = ProjectionSeries::flat(MAX_AMOUNT);
        let range = RangeSpec {
            min: Decimal::ZERO,
            max: dec!(0.3),
            step: dec!(0.3),
        };
        let out =
            sensitivity(&params, &[Factor::Revenue], &range, &EngineConfig::default()).unwrap();

        let points = &out.result.factors[0].points;
        assert_eq!(points.len(), 2);
        assert!(points[0].indicators.is_some());
        assert!(points[0].error.is_none());

        let failed = &points[1];
        assert_eq!(failed.perturbation, dec!(0.3));
        assert!(failed.indicators.is_none());
        assert!(failed
            .error
            .as_deref()
            .is_some_and(|e| e.contains("operating.revenue.base")));
        assert_eq!(failed.npv_change, None);
        assert_eq!(failed.irr_change, None);
        assert_eq!(failed.coefficients, Coefficients::undefined());
        assert!(
            out.warnings.iter().any(|w| w.starts_with("revenue 0.3")),
            "{:?}",
            out.warnings
        );
    }

    #[test]
    fn test_default_range_values() {
        let values = RangeSpec::default().values().unwrap();
        assert_eq!(values.len(), 9);
        assert_eq!(values[0], dec!(-0.20));
        assert_eq!(values[4], Decimal::ZERO);
        assert_eq!(values[8], dec!(0.20));
    }

    #[test]
    fn test_range_appends_max() {
        let r = RangeSpec {
            min: dec!(-0.1),
            max: dec!(0.25),
            step: dec!(0.1),
        };
        assert_eq!(
            r.values().unwrap(),
            vec![dec!(-0.1), dec!(0.0), dec!(0.1), dec!(0.2), dec!(0.25)]
        );
    }

    #[test]
    fn test_range_validation() {
        let bad_step = RangeSpec { step: Decimal::ZERO, ..RangeSpec::default() };
        assert!(bad_step.values().is_err());
        let inverted = RangeSpec { min: dec!(0.3), ..RangeSpec::default() };
        assert!(inverted.values().is_err());
        let total_loss = RangeSpec { min: dec!(-1), ..RangeSpec::default() };
        assert!(total_loss.values().is_err());
    }

    #[test]
    fn test_sweep_is_restartable_and_ordered() {
        let sweep = ScenarioSweep::new(
            &[Factor::Investment, Factor::Revenue, Factor::Investment],
            &RangeSpec::default(),
        )
        .unwrap();
        assert_eq!(sweep.factors(), &[Factor::Investment, Factor::Revenue]);
        let first: Vec<_> = sweep.iter().collect();
        let second: Vec<_> = sweep.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 18);
        assert_eq!(first[0], (Factor::Investment, dec!(-0.20)));
        assert_eq!(first[9], (Factor::Revenue, dec!(-0.20)));
    }

    #[test]
    fn test_factor_parsing() {
        assert_eq!("operating-cost".parse::<Factor>().unwrap(), Factor::OperatingCost);
        assert_eq!("Discount_Rate".parse::<Factor>().unwrap(), Factor::DiscountRate);
        assert!("tariff".parse::<Factor>().is_err());
    }

    #[test]
    fn test_investment_scales_loan() {
        let base = reference_parameters();
        let scaled = Factor::Investment.apply(&base, dec!(0.10));
        assert_eq!(scaled.investment_items[0].amount, dec!(66000));
        assert_eq!(
            scaled.financing.unwrap().principal,
            dec!(44000)
        );
        assert_eq!(scaled.operating, base.operating);
    }

    #[test]
    fn test_coefficient_rules() {
        let c = coefficient(Indicator::Value(dec!(90)), Indicator::Value(dec!(100)), dec!(-0.1));
        assert_eq!(c, Indicator::Value(dec!(1)));
        // negative baseline uses its magnitude
        let c = coefficient(Indicator::Value(dec!(-90)), Indicator::Value(dec!(-100)), dec!(0.1));
        assert_eq!(c, Indicator::Value(dec!(1)));
        assert_eq!(
            coefficient(Indicator::Value(dec!(1)), Indicator::Value(dec!(1)), Decimal::ZERO),
            Indicator::Undefined
        );
        assert_eq!(
            coefficient(Indicator::NotFound, Indicator::Value(dec!(1)), dec!(0.1)),
            Indicator::Undefined
        );
    }

    #[test]
    fn test_critical_value_interpolates_first_crossing() {
        let point = |p: Decimal, npv: Decimal| ScenarioPoint {
            perturbation: p,
            indicators: Some(FinancialIndicatorSet {
                npv: Indicator::Value(npv),
                irr: Indicator::NotFound,
                static_payback: Indicator::Never,
                dynamic_payback: Indicator::Never,
                benefit_cost_ratio: Indicator::Undefined,
            }),
            error: None,
            npv_change: None,
            npv_change_pct: Indicator::Undefined,
            irr_change: None,
            coefficients: Coefficients::undefined(),
        };
        let points = vec![
            point(dec!(-0.2), dec!(-30)),
            point(dec!(-0.1), dec!(10)),
            point(dec!(0.0), dec!(50)),
        ];
        let rates = vec![dec!(0.06); 3];
        let cv = critical_value(&points, &rates, |s, _| s.npv.value());
        assert_eq!(cv, Some(dec!(-0.125)));
        assert_eq!(critical_value(&points, &rates, |s, _| s.irr.value()), None);
    }

    #[test]
    fn test_ranking_puts_undefined_last() {
        let analysis = |factor, mean| FactorAnalysis {
            factor,
            points: Vec::new(),
            critical_values: CriticalValues::default(),
            mean_abs_npv_coefficient: mean,
        };
        let ranked = rank_factors(&[
            analysis(Factor::DiscountRate, None),
            analysis(Factor::Revenue, Some(dec!(2.5))),
            analysis(Factor::OperatingCost, Some(dec!(0.4))),
        ]);
        assert_eq!(
            ranked,
            vec![Factor::Revenue, Factor::OperatingCost, Factor::DiscountRate]
        );
    }
}
