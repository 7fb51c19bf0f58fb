use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use appraisal_core::indicators::FinancialIndicatorSet;
use appraisal_core::{sensitivity, EngineConfig, Factor, Indicator, RangeSpec, SensitivityResult};

use super::load_params;

/// Arguments for a one-factor-at-a-time sensitivity sweep
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to a JSON or YAML parameter file (reads JSON from stdin if omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated factors: revenue, operating_cost, investment, discount_rate
    #[arg(long, value_delimiter = ',', default_value = "revenue,operating_cost,investment,discount_rate")]
    pub factors: Vec<String>,

    /// Perturbation range as min:max:step fractions (e.g. "-0.2:0.2:0.05")
    #[arg(long, default_value = "-0.2:0.2:0.05", allow_hyphen_values = true)]
    pub range: String,

    /// One row per scenario instead of the nested analysis
    #[arg(long)]
    pub flat: bool,
}

#[derive(Debug, Serialize)]
struct SensitivityRow {
    factor: String,
    perturbation: Decimal,
    npv: String,
    irr: String,
    static_payback: String,
    dynamic_payback: String,
    benefit_cost_ratio: String,
    npv_change: Option<Decimal>,
    npv_change_pct: String,
    npv_coefficient: String,
    error: Option<String>,
}

pub fn run_sensitivity(
    args: SensitivityArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let params = load_params(args.input.as_deref())?;
    let factors = args
        .factors
        .iter()
        .map(|f| f.parse::<Factor>())
        .collect::<Result<Vec<_>, _>>()?;
    let range = parse_range(&args.range)?;

    let output = sensitivity(&params, &factors, &range, config)?;

    if args.flat {
        return Ok(json!({
            "results": flatten(&output.result),
            "ranking": output.result.ranking,
            "warnings": output.warnings,
        }));
    }
    Ok(serde_json::to_value(output)?)
}

fn parse_range(spec: &str) -> Result<RangeSpec, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("Range must be min:max:step, got '{}'", spec).into());
    }
    Ok(RangeSpec {
        min: parts[0].trim().parse()?,
        max: parts[1].trim().parse()?,
        step: parts[2].trim().parse()?,
    })
}

fn flatten(result: &SensitivityResult) -> Vec<SensitivityRow> {
    let mut rows = Vec::new();
    for analysis in &result.factors {
        for point in &analysis.points {
            let show = |pick: fn(&FinancialIndicatorSet) -> Indicator| {
                point
                    .indicators
                    .as_ref()
                    .map(|set| pick(set).to_string())
                    .unwrap_or_default()
            };
            rows.push(SensitivityRow {
                factor: analysis.factor.to_string(),
                perturbation: point.perturbation,
                npv: show(|s| s.npv),
                irr: show(|s| s.irr),
                static_payback: show(|s| s.static_payback),
                dynamic_payback: show(|s| s.dynamic_payback),
                benefit_cost_ratio: show(|s| s.benefit_cost_ratio),
                npv_change: point.npv_change,
                npv_change_pct: point.npv_change_pct.to_string(),
                npv_coefficient: point.coefficients.npv.to_string(),
                error: point.error.clone(),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_range() {
        let range = parse_range("-0.1:0.1:0.05").unwrap();
        assert_eq!(range.min, dec!(-0.1));
        assert_eq!(range.max, dec!(0.1));
        assert_eq!(range.step, dec!(0.05));
    }

    #[test]
    fn test_parse_range_rejects_wrong_arity() {
        assert!(parse_range("-0.1:0.1").is_err());
        assert!(parse_range("a:b:c").is_err());
    }
}
