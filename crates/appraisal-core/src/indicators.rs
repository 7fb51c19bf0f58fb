//! Indicator engine: NPV, IRR, payback periods and benefit-cost ratio over a
//! cash-flow statement, plus the profitability and solvency summary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SolverConfig;
use crate::financing::LoanSchedule;
use crate::parameters::ProjectParameters;
use crate::statements::{CashFlowStatement, ProfitStatement};
use crate::time_value::{discounted_flows, irr, npv_checked};
use crate::types::{round_money, Indicator, Money, Phase, Rate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialIndicatorSet {
    pub npv: Indicator,
    pub irr: Indicator,
    /// Years until cumulative net cash flow turns non-negative
    pub static_payback: Indicator,
    /// As static payback, on discounted flows
    pub dynamic_payback: Indicator,
    pub benefit_cost_ratio: Indicator,
}

impl FinancialIndicatorSet {
    /// Indicator values in a fixed order, paired with their names.
    pub fn named(&self) -> [(&'static str, Indicator); 5] {
        [
            ("npv", self.npv),
            ("irr", self.irr),
            ("static_payback", self.static_payback),
            ("dynamic_payback", self.dynamic_payback),
            ("benefit_cost_ratio", self.benefit_cost_ratio),
        ]
    }
}

/// Compute every indicator for one cash-flow statement. Sentinel outcomes
/// are pushed onto `warnings` prefixed with `label`.
pub fn compute_indicators(
    label: &str,
    statement: &CashFlowStatement,
    discount_rate: Rate,
    solver: &SolverConfig,
    warnings: &mut Vec<String>,
) -> FinancialIndicatorSet {
    let net = statement.net_flows();

    let npv = match npv_checked(discount_rate, &net) {
        Some(v) => Indicator::Value(round_money(v)),
        None => {
            warnings.push(format!("{label}: NPV is not representable at {discount_rate}"));
            Indicator::Undefined
        }
    };

    let irr = compute_irr(&net, solver, warnings, label);

    let static_payback = payback_period(&net);
    let dynamic_payback = match discounted_flows(discount_rate, &net) {
        Ok(discounted) => payback_period(&discounted),
        Err(_) => Indicator::Undefined,
    };
    for (name, value) in [
        ("static payback", static_payback),
        ("dynamic payback", dynamic_payback),
    ] {
        if value == Indicator::Never {
            warnings.push(format!(
                "{label}: {name} never reached within the project timeline"
            ));
        }
    }

    let benefit_cost_ratio = benefit_cost_ratio(statement, discount_rate);
    if benefit_cost_ratio == Indicator::Undefined {
        warnings.push(format!(
            "{label}: benefit-cost ratio undefined (present value of outflows is zero)"
        ));
    }

    FinancialIndicatorSet {
        npv,
        irr,
        static_payback,
        dynamic_payback,
        benefit_cost_ratio,
    }
}

fn compute_irr(
    cash_flows: &[Money],
    solver: &SolverConfig,
    warnings: &mut Vec<String>,
    label: &str,
) -> Indicator {
    match irr(cash_flows, solver) {
        Ok(rate) => Indicator::Value(rate),
        Err(e) => {
            warn!(label, error = %e, "IRR not found");
            warnings.push(format!("{label}: IRR not found ({e})"));
            Indicator::NotFound
        }
    }
}

/// Years until the cumulative flow turns non-negative, interpolated within
/// the crossing year: `k + |cumulative[k-1]| / flow[k]`.
pub fn payback_period(flows: &[Money]) -> Indicator {
    let mut cumulative = Decimal::ZERO;
    for (k, cf) in flows.iter().enumerate() {
        let previous = cumulative;
        cumulative += cf;
        if cumulative >= Decimal::ZERO {
            if k == 0 {
                return Indicator::Value(Decimal::ZERO);
            }
            // previous < 0 <= cumulative, so cf > 0
            return Indicator::Value(Decimal::from(k as u64) + previous.abs() / cf);
        }
    }
    Indicator::Never
}

/// Present value of inflows over present value of outflows.
pub fn benefit_cost_ratio(statement: &CashFlowStatement, discount_rate: Rate) -> Indicator {
    let pv_in = npv_checked(discount_rate, &statement.inflows());
    let pv_out = npv_checked(discount_rate, &statement.outflows());
    match (pv_in, pv_out) {
        (Some(i), Some(o)) => Indicator::ratio(i, o),
        _ => Indicator::Undefined,
    }
}

// ---------------------------------------------------------------------------
// Profitability and solvency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitabilitySummary {
    /// Investment items plus construction-period interest
    pub total_investment: Money,
    pub total_net_profit: Money,
    /// Mean net profit over the operation years
    pub average_net_profit: Money,
    pub total_income_tax: Money,
    /// Mean earnings before interest and tax over total investment
    pub return_on_investment: Indicator,
    /// Loan principal over total investment
    pub debt_ratio: Indicator,
}

pub fn summarize_profitability(
    params: &ProjectParameters,
    loan: &LoanSchedule,
    profit: &ProfitStatement,
) -> ProfitabilitySummary {
    let items: Money = params.investment_items.iter().map(|i| i.amount).sum();
    let total_investment = items + loan.construction_interest;

    let operating: Vec<_> = profit
        .years
        .iter()
        .filter(|y| y.phase == Phase::Operation)
        .collect();
    let years = Decimal::from(operating.len().max(1) as u64);

    let total_net_profit = profit.total_net_profit;
    let operating_profit: Money = operating.iter().map(|y| y.net_profit).sum();
    let ebit: Money = operating
        .iter()
        .map(|y| y.taxable_income + y.interest)
        .sum();

    ProfitabilitySummary {
        total_investment,
        total_net_profit,
        average_net_profit: round_money(operating_profit / years),
        total_income_tax: profit.total_tax,
        return_on_investment: Indicator::ratio(ebit / years, total_investment),
        debt_ratio: Indicator::ratio(loan.principal, total_investment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::{CashFlowLevel, CashFlowYear};
    use rust_decimal_macros::dec;

    fn statement(inflows: &[Money], outflows: &[Money]) -> CashFlowStatement {
        let mut cumulative = Decimal::ZERO;
        let years = inflows
            .iter()
            .zip(outflows)
            .enumerate()
            .map(|(i, (inflow, outflow))| {
                let net = inflow - outflow;
                cumulative += net;
                CashFlowYear {
                    year: i as u32 + 1,
                    phase: if i == 0 {
                        Phase::Construction
                    } else {
                        Phase::Operation
                    },
                    revenue: *inflow,
                    recovery: Decimal::ZERO,
                    loan_draw: Decimal::ZERO,
                    inflow: *inflow,
                    capex: *outflow,
                    operating_cost: Decimal::ZERO,
                    surcharges: Decimal::ZERO,
                    tax: Decimal::ZERO,
                    interest_paid: Decimal::ZERO,
                    principal_repaid: Decimal::ZERO,
                    outflow: *outflow,
                    net,
                    cumulative,
                }
            })
            .collect();
        CashFlowStatement {
            level: CashFlowLevel::Project,
            years,
            total_inflow: inflows.iter().sum(),
            total_outflow: outflows.iter().sum(),
        }
    }

    #[test]
    fn test_payback_interpolates() {
        let p = payback_period(&[dec!(-100), dec!(30), dec!(40), dec!(50)]);
        // cumulative -100, -70, -30, 20 crosses in year 3 -> 3 + 30/50
        assert_eq!(p, Indicator::Value(dec!(3.6)));
    }

    #[test]
    fn test_payback_immediate_and_never() {
        assert_eq!(payback_period(&[dec!(5), dec!(-1)]), Indicator::Value(Decimal::ZERO));
        assert_eq!(payback_period(&[dec!(-100), dec!(10), dec!(10)]), Indicator::Never);
    }

    #[test]
    fn test_indicator_set_for_conventional_flows() {
        let s = statement(
            &[dec!(0), dec!(30), dec!(40), dec!(50), dec!(60)],
            &[dec!(100), dec!(0), dec!(0), dec!(0), dec!(0)],
        );
        let mut warnings = Vec::new();
        let set = compute_indicators(
            "project",
            &s,
            dec!(0.10),
            &SolverConfig::default(),
            &mut warnings,
        );
        // -100 + 27.27 + 33.06 + 37.57 + 40.98
        assert_eq!(set.npv, Indicator::Value(dec!(38.88)));
        let irr = set.irr.value().unwrap();
        assert!((irr - dec!(0.2489)).abs() < dec!(0.0005), "Expected ~24.89%, got {irr}");
        assert_eq!(set.static_payback, Indicator::Value(dec!(3.6)));
        assert!(set.dynamic_payback.value().unwrap() > dec!(3.6));
        assert!((set.benefit_cost_ratio.value().unwrap() - dec!(1.3888)).abs() < dec!(0.001));
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_sentinels_and_warnings() {
        let s = statement(&[dec!(10), dec!(10)], &[dec!(0), dec!(0)]);
        let mut warnings = Vec::new();
        let set = compute_indicators("equity", &s, dec!(0.05), &SolverConfig::default(), &mut warnings);
        assert_eq!(set.irr, Indicator::NotFound);
        assert_eq!(set.benefit_cost_ratio, Indicator::Undefined);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.starts_with("equity:")));
    }
}
