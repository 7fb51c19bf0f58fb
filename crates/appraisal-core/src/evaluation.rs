//! One full appraisal run: schedule, investment and financing, operating
//! projection, statements, indicators.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, debug_span};

use crate::config::EngineConfig;
use crate::financing::{build_loan_schedule, LoanSchedule};
use crate::indicators::{
    compute_indicators, summarize_profitability, FinancialIndicatorSet, ProfitabilitySummary,
};
use crate::investment::{allocate_outlays, construction_outlay, plan_investment, InvestmentPlan};
use crate::operating::{build_operating_projection, OperatingProjection};
use crate::parameters::ProjectParameters;
use crate::schedule::{build_period_schedule, PeriodSchedule};
use crate::statements::{
    compile_cash_flow, compile_profit_statement, CashFlowLevel, CashFlowStatement,
    ProfitStatement,
};
use crate::types::{with_metadata, ComputationOutput};
use crate::AppraisalResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutput {
    pub project_name: String,
    pub schedule: PeriodSchedule,
    pub investment: InvestmentPlan,
    pub loan: LoanSchedule,
    pub operating: OperatingProjection,
    pub project_cash_flow: CashFlowStatement,
    pub equity_cash_flow: CashFlowStatement,
    pub profit: ProfitStatement,
    /// Indicators on the project-level cash flow
    pub indicators: FinancialIndicatorSet,
    /// Indicators on the equity-level cash flow
    pub equity_indicators: FinancialIndicatorSet,
    pub profitability: ProfitabilitySummary,
}

/// Evaluate a project parameter set.
///
/// Validates the inputs, runs every stage in order and wraps the result in
/// the standard output envelope. Sentinel indicator outcomes are reported as
/// warnings; broken statement identities abort the run.
pub fn evaluate(
    params: &ProjectParameters,
    config: &EngineConfig,
) -> AppraisalResult<ComputationOutput<EvaluationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    // ── Validation ───────────────────────────────────────────────────
    config.validate()?;
    params.validate()?;

    let result = run_pipeline(params, config, &mut warnings)?;

    // ── Warnings ─────────────────────────────────────────────────────
    if !result.operating.unused_losses.is_zero() {
        warnings.push(format!(
            "{} of tax losses remain unused at the end of the timeline",
            result.operating.unused_losses
        ));
    }
    if result.investment.residual_value > result.investment.fixed_asset_cost / Decimal::TWO {
        warnings.push(
            "More than half of the fixed-asset cost is recovered as residual value; \
             the operation period is short relative to asset lives"
                .into(),
        );
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Capital project financial appraisal (discounted cash flow, static and dynamic payback)",
        &serde_json::json!({
            "project_name": params.project_name,
            "construction_years": params.construction_years,
            "operation_years": params.operation_years,
            "discount_rate": params.discount_rate.to_string(),
            "financed": params.financing.is_some(),
            "npv_base_period": "first construction year (t = 0)",
            "irr_bracket": [
                config.solver.lower_bound.to_string(),
                config.solver.upper_bound.to_string(),
            ],
            "loss_carry_forward_years": config.tax_rules.loss_carry_forward_years,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Stages 1 to 5 on already validated parameters.
pub(crate) fn run_pipeline(
    params: &ProjectParameters,
    config: &EngineConfig,
    warnings: &mut Vec<String>,
) -> AppraisalResult<EvaluationOutput> {
    let span = debug_span!("appraisal", project = %params.project_name);
    let _guard = span.enter();

    // ── Stage 1: Period schedule ─────────────────────────────────────
    let schedule = build_period_schedule(
        params.construction_years,
        params.operation_years,
        params.start_year,
    )?;

    // ── Stage 2: Investment and financing ────────────────────────────
    let items = allocate_outlays(params, &schedule)?;
    let capex = construction_outlay(&items, schedule.len());
    let loan = match &params.financing {
        Some(terms) => build_loan_schedule(terms, &schedule, &capex)?,
        None => LoanSchedule::empty(&schedule),
    };
    let investment = plan_investment(params, &schedule, items, loan.capitalised_interest)?;

    // ── Stage 3: Operating projection ────────────────────────────────
    let operating =
        build_operating_projection(params, &schedule, &investment, &loan, &config.tax_rules)?;

    // ── Stage 4: Statements ──────────────────────────────────────────
    let project_cash_flow = compile_cash_flow(
        CashFlowLevel::Project,
        &schedule,
        &investment,
        &loan,
        &operating,
    )?;
    let equity_cash_flow = compile_cash_flow(
        CashFlowLevel::Equity,
        &schedule,
        &investment,
        &loan,
        &operating,
    )?;
    let profit = compile_profit_statement(&schedule, &loan, &operating, &config.tax_rules)?;

    // ── Stage 5: Indicators ──────────────────────────────────────────
    let indicators = compute_indicators(
        "project",
        &project_cash_flow,
        params.discount_rate,
        &config.solver,
        warnings,
    );
    let equity_indicators = compute_indicators(
        "equity",
        &equity_cash_flow,
        params.discount_rate,
        &config.solver,
        warnings,
    );
    let profitability = summarize_profitability(params, &loan, &profit);

    debug!(npv = %indicators.npv, irr = %indicators.irr, "appraisal complete");

    Ok(EvaluationOutput {
        project_name: params.project_name.clone(),
        schedule,
        investment,
        loan,
        operating,
        project_cash_flow,
        equity_cash_flow,
        profit,
        indicators,
        equity_indicators,
        profitability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppraisalError;
    use crate::parameters::reference_parameters;
    use crate::types::Indicator;

    #[test]
    fn test_reference_project_evaluates() {
        let out = evaluate(&reference_parameters(), &EngineConfig::default()).unwrap();
        let r = &out.result;
        assert_eq!(r.schedule.len(), 20);
        assert!(r.indicators.npv.is_value());
        assert!(r.indicators.irr.is_value(), "warnings: {:?}", out.warnings);
        assert_eq!(r.project_cash_flow.years.len(), 20);
        assert_eq!(r.loan.periods.last().unwrap().closing_balance, Decimal::ZERO);
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
    }

    #[test]
    fn test_invalid_parameters_rejected_before_computation() {
        let mut p = reference_parameters();
        p.discount_rate = rust_decimal_macros::dec!(-0.01);
        assert!(matches!(
            evaluate(&p, &EngineConfig::default()),
            Err(AppraisalError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_equity_flow_differs_only_by_financing() {
        let out = evaluate(&reference_parameters(), &EngineConfig::default()).unwrap();
        let r = &out.result;
        for (p, e) in r
            .project_cash_flow
            .years
            .iter()
            .zip(&r.equity_cash_flow.years)
        {
            let loan = &r.loan.periods[(p.year - 1) as usize];
            assert_eq!(e.net, p.net + loan.draw - loan.debt_service, "year {}", p.year);
        }
        assert!(matches!(r.equity_indicators.npv, Indicator::Value(_)));
    }
}
