//! Statement compiler: project and equity cash-flow statements and the
//! profit statement, each checked against its defining identities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TaxRules;
use crate::error::AppraisalError;
use crate::financing::LoanSchedule;
use crate::investment::InvestmentPlan;
use crate::operating::OperatingProjection;
use crate::schedule::PeriodSchedule;
use crate::types::{round_money, Money, Phase};
use crate::AppraisalResult;

/// Whose cash the statement follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashFlowLevel {
    /// The project as a whole, before financing
    Project,
    /// The equity holders: loan draws in, debt service out
    Equity,
}

impl std::fmt::Display for CashFlowLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CashFlowLevel::Project => write!(f, "project cash flow"),
            CashFlowLevel::Equity => write!(f, "equity cash flow"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowYear {
    pub year: u32,
    pub phase: Phase,
    pub revenue: Money,
    /// Residual fixed-asset value and working capital, final year only
    pub recovery: Money,
    pub loan_draw: Money,
    pub inflow: Money,
    pub capex: Money,
    pub operating_cost: Money,
    pub surcharges: Money,
    pub tax: Money,
    pub interest_paid: Money,
    pub principal_repaid: Money,
    pub outflow: Money,
    pub net: Money,
    pub cumulative: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub level: CashFlowLevel,
    pub years: Vec<CashFlowYear>,
    pub total_inflow: Money,
    pub total_outflow: Money,
}

impl CashFlowStatement {
    pub fn net_flows(&self) -> Vec<Money> {
        self.years.iter().map(|y| y.net).collect()
    }

    pub fn inflows(&self) -> Vec<Money> {
        self.years.iter().map(|y| y.inflow).collect()
    }

    pub fn outflows(&self) -> Vec<Money> {
        self.years.iter().map(|y| y.outflow).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitYear {
    pub year: u32,
    pub phase: Phase,
    pub revenue: Money,
    pub operating_cost: Money,
    pub surcharges: Money,
    /// Operating cost plus surcharges
    pub cost: Money,
    pub depreciation: Money,
    /// Interest charged to profit (capitalised interest excluded)
    pub interest: Money,
    pub taxable_income: Money,
    pub loss_offset: Money,
    pub tax: Money,
    pub net_profit: Money,
    pub surplus_reserve: Money,
    pub distributable_profit: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitStatement {
    pub years: Vec<ProfitYear>,
    pub total_net_profit: Money,
    pub total_tax: Money,
}

// ---------------------------------------------------------------------------
// Cash flow
// ---------------------------------------------------------------------------

pub fn compile_cash_flow(
    level: CashFlowLevel,
    schedule: &PeriodSchedule,
    plan: &InvestmentPlan,
    loan: &LoanSchedule,
    projection: &OperatingProjection,
) -> AppraisalResult<CashFlowStatement> {
    let last = schedule.last_index();
    let mut years = Vec::with_capacity(schedule.len());
    let mut cumulative = Decimal::ZERO;

    for py in &schedule.years {
        let i = py.index;
        let op = projection.at(schedule, i);
        let revenue = op.map(|o| o.revenue).unwrap_or(Decimal::ZERO);
        let operating_cost = op.map(|o| o.operating_cost).unwrap_or(Decimal::ZERO);
        let surcharges = op.map(|o| o.surcharges).unwrap_or(Decimal::ZERO);
        let tax = op.map(|o| o.tax).unwrap_or(Decimal::ZERO);
        let recovery = if i == last {
            plan.terminal_recovery
        } else {
            Decimal::ZERO
        };
        let capex = plan.total_outlay[i];

        let (loan_draw, interest_paid, principal_repaid) = match level {
            CashFlowLevel::Project => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            CashFlowLevel::Equity => {
                let p = &loan.periods[i];
                (p.draw, p.interest, p.principal_repayment)
            }
        };

        let inflow = revenue + recovery + loan_draw;
        let outflow =
            capex + operating_cost + surcharges + tax + interest_paid + principal_repaid;
        let net = inflow - outflow;
        cumulative += net;

        years.push(CashFlowYear {
            year: py.year,
            phase: py.phase,
            revenue,
            recovery,
            loan_draw,
            inflow,
            capex,
            operating_cost,
            surcharges,
            tax,
            interest_paid,
            principal_repaid,
            outflow,
            net,
            cumulative,
        });
    }

    let statement = CashFlowStatement {
        level,
        total_inflow: years.iter().map(|y| y.inflow).sum(),
        total_outflow: years.iter().map(|y| y.outflow).sum(),
        years,
    };
    verify_cash_flow(&statement)?;
    debug!(%level, final_cumulative = %cumulative, "cash flow statement compiled");
    Ok(statement)
}

/// Check every row's sums and the running cumulative.
pub fn verify_cash_flow(statement: &CashFlowStatement) -> AppraisalResult<()> {
    let name = statement.level.to_string();
    let mut cumulative = Decimal::ZERO;
    for y in &statement.years {
        let inflow = y.revenue + y.recovery + y.loan_draw;
        if inflow != y.inflow {
            return Err(AppraisalError::inconsistent(
                &name,
                y.year,
                format!("inflow {} but line items sum to {inflow}", y.inflow),
            ));
        }
        let outflow = y.capex
            + y.operating_cost
            + y.surcharges
            + y.tax
            + y.interest_paid
            + y.principal_repaid;
        if outflow != y.outflow {
            return Err(AppraisalError::inconsistent(
                &name,
                y.year,
                format!("outflow {} but line items sum to {outflow}", y.outflow),
            ));
        }
        if y.net != y.inflow - y.outflow {
            return Err(AppraisalError::inconsistent(
                &name,
                y.year,
                format!("net {} != inflow - outflow", y.net),
            ));
        }
        cumulative += y.net;
        if cumulative != y.cumulative {
            return Err(AppraisalError::inconsistent(
                &name,
                y.year,
                format!("cumulative {} but running total is {cumulative}", y.cumulative),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Profit
// ---------------------------------------------------------------------------

pub fn compile_profit_statement(
    schedule: &PeriodSchedule,
    loan: &LoanSchedule,
    projection: &OperatingProjection,
    rules: &TaxRules,
) -> AppraisalResult<ProfitStatement> {
    let mut years = Vec::with_capacity(schedule.len());

    for py in &schedule.years {
        let row = match projection.at(schedule, py.index) {
            Some(op) => {
                let net_profit = op.taxable_income - op.tax;
                ProfitYear {
                    year: py.year,
                    phase: py.phase,
                    revenue: op.revenue,
                    operating_cost: op.operating_cost,
                    surcharges: op.surcharges,
                    cost: op.operating_cost + op.surcharges,
                    depreciation: op.depreciation,
                    interest: op.interest,
                    taxable_income: op.taxable_income,
                    loss_offset: op.loss_offset,
                    tax: op.tax,
                    net_profit,
                    surplus_reserve: Decimal::ZERO,
                    distributable_profit: Decimal::ZERO,
                }
            }
            None => {
                let interest = loan.expensed_interest(py.index);
                ProfitYear {
                    year: py.year,
                    phase: py.phase,
                    revenue: Decimal::ZERO,
                    operating_cost: Decimal::ZERO,
                    surcharges: Decimal::ZERO,
                    cost: Decimal::ZERO,
                    depreciation: Decimal::ZERO,
                    interest,
                    taxable_income: -interest,
                    loss_offset: Decimal::ZERO,
                    tax: Decimal::ZERO,
                    net_profit: -interest,
                    surplus_reserve: Decimal::ZERO,
                    distributable_profit: Decimal::ZERO,
                }
            }
        };
        years.push(distribute(row, rules));
    }

    let statement = ProfitStatement {
        total_net_profit: years.iter().map(|y| y.net_profit).sum(),
        total_tax: years.iter().map(|y| y.tax).sum(),
        years,
    };
    verify_profit_statement(&statement)?;
    debug!(
        total_net_profit = %statement.total_net_profit,
        "profit statement compiled"
    );
    Ok(statement)
}

fn distribute(mut row: ProfitYear, rules: &TaxRules) -> ProfitYear {
    row.surplus_reserve = if row.net_profit > Decimal::ZERO {
        round_money(row.net_profit * rules.surplus_reserve_rate)
    } else {
        Decimal::ZERO
    };
    row.distributable_profit = row.net_profit - row.surplus_reserve;
    row
}

pub fn verify_profit_statement(statement: &ProfitStatement) -> AppraisalResult<()> {
    const NAME: &str = "profit statement";
    for y in &statement.years {
        if y.cost != y.operating_cost + y.surcharges {
            return Err(AppraisalError::inconsistent(
                NAME,
                y.year,
                format!("cost {} != operating cost + surcharges", y.cost),
            ));
        }
        let taxable = y.revenue - y.cost - y.depreciation - y.interest;
        if taxable != y.taxable_income {
            return Err(AppraisalError::inconsistent(
                NAME,
                y.year,
                format!(
                    "taxable income {} but revenue less charges is {taxable}",
                    y.taxable_income
                ),
            ));
        }
        if y.net_profit != y.taxable_income - y.tax {
            return Err(AppraisalError::inconsistent(
                NAME,
                y.year,
                format!("net profit {} != taxable income - tax", y.net_profit),
            ));
        }
        if y.distributable_profit != y.net_profit - y.surplus_reserve {
            return Err(AppraisalError::inconsistent(
                NAME,
                y.year,
                format!(
                    "distributable profit {} != net profit - surplus reserve",
                    y.distributable_profit
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investment::{allocate_outlays, plan_investment};
    use crate::operating::build_operating_projection;
    use crate::parameters::{
        AllocationCurve, AssetClass, DepreciationPolicy, InvestmentItem, OperatingAssumptions,
        ProjectParameters, ProjectionSeries,
    };
    use crate::schedule::build_period_schedule;
    use rust_decimal_macros::dec;

    struct Stages {
        schedule: PeriodSchedule,
        plan: InvestmentPlan,
        loan: LoanSchedule,
        projection: OperatingProjection,
        rules: TaxRules,
    }

    fn stages() -> Stages {
        let params = ProjectParameters {
            project_name: "statement test".into(),
            construction_years: 1,
            operation_years: 3,
            start_year: None,
            investment_items: vec![
                InvestmentItem {
                    name: "plant".into(),
                    amount: dec!(1000),
                    asset_class: AssetClass::Fixed,
                    allocation: None,
                    useful_life_years: Some(5),
                },
                InvestmentItem {
                    name: "wc".into(),
                    amount: dec!(100),
                    asset_class: AssetClass::WorkingCapital,
                    allocation: None,
                    useful_life_years: None,
                },
            ],
            default_allocation: AllocationCurve::Standard,
            depreciation: DepreciationPolicy {
                salvage_rate: Decimal::ZERO,
                ..DepreciationPolicy::default()
            },
            financing: None,
            operating: OperatingAssumptions {
                revenue: ProjectionSeries::flat(dec!(600)),
                operating_cost: ProjectionSeries::flat(dec!(200)),
                maintenance_rate: Decimal::ZERO,
                income_tax_rate: dec!(0.25),
                tax_holiday: None,
            },
            discount_rate: dec!(0.08),
        };
        let rules = TaxRules::income_tax_only();
        let schedule = build_period_schedule(1, 3, None).unwrap();
        let items = allocate_outlays(&params, &schedule).unwrap();
        let plan = plan_investment(&params, &schedule, items, Decimal::ZERO).unwrap();
        let loan = LoanSchedule::empty(&schedule);
        let projection =
            build_operating_projection(&params, &schedule, &plan, &loan, &rules).unwrap();
        Stages {
            schedule,
            plan,
            loan,
            projection,
            rules,
        }
    }

    #[test]
    fn test_project_cash_flow_rows() {
        let s = stages();
        let cf = compile_cash_flow(
            CashFlowLevel::Project,
            &s.schedule,
            &s.plan,
            &s.loan,
            &s.projection,
        )
        .unwrap();
        let nets = cf.net_flows();
        // taxable = 600 - 200 - 200 = 200, tax 50
        assert_eq!(nets[0], dec!(-1000));
        assert_eq!(nets[1], dec!(600) - dec!(100) - dec!(200) - dec!(50));
        assert_eq!(nets[2], dec!(350));
        // final year recovers 1000 - 600 book value and 100 working capital
        assert_eq!(cf.years[3].recovery, dec!(500));
        assert_eq!(nets[3], dec!(850));
        assert_eq!(cf.years[3].cumulative, dec!(450));
    }

    #[test]
    fn test_profit_statement_reserve_and_distribution() {
        let s = stages();
        let ps = compile_profit_statement(&s.schedule, &s.loan, &s.projection, &s.rules).unwrap();
        assert_eq!(ps.years[0].net_profit, Decimal::ZERO);
        assert_eq!(ps.years[1].taxable_income, dec!(200));
        assert_eq!(ps.years[1].net_profit, dec!(150));
        // income-tax-only rules carry no reserve
        assert_eq!(ps.years[1].distributable_profit, dec!(150));
        assert_eq!(ps.total_net_profit, dec!(450));

        let reserved = distribute(ps.years[1].clone(), &TaxRules::default());
        assert_eq!(reserved.surplus_reserve, dec!(15));
        assert_eq!(reserved.distributable_profit, dec!(135));
    }

    #[test]
    fn test_tampered_cash_flow_is_a_consistency_violation() {
        let s = stages();
        let mut cf = compile_cash_flow(
            CashFlowLevel::Equity,
            &s.schedule,
            &s.plan,
            &s.loan,
            &s.projection,
        )
        .unwrap();
        cf.years[2].cumulative += dec!(0.01);
        let err = verify_cash_flow(&cf).unwrap_err();
        assert!(err.is_fatal());
        match err {
            AppraisalError::ConsistencyViolation { year, .. } => assert_eq!(year, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tampered_profit_is_a_consistency_violation() {
        let s = stages();
        let mut ps =
            compile_profit_statement(&s.schedule, &s.loan, &s.projection, &s.rules).unwrap();
        ps.years[1].tax += dec!(1);
        assert!(matches!(
            verify_profit_statement(&ps),
            Err(AppraisalError::ConsistencyViolation { .. })
        ));
    }
}
