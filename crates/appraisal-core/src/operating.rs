//! Operating projection: revenue, costs, indirect taxes and income tax for
//! every operation year.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TaxRules;
use crate::financing::LoanSchedule;
use crate::investment::InvestmentPlan;
use crate::error::AppraisalError;
use crate::parameters::{ProjectParameters, ProjectionSeries, MAX_AMOUNT};
use crate::schedule::PeriodSchedule;
use crate::types::{round_money, Money, Rate};
use crate::AppraisalResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingYear {
    /// 1-based timeline year
    pub year: u32,
    /// 1-based operation year
    pub operation_year: u32,
    pub revenue: Money,
    /// Operating cost including maintenance
    pub operating_cost: Money,
    pub maintenance: Money,
    pub vat_output: Money,
    pub vat_input: Money,
    pub vat_payable: Money,
    pub surcharges: Money,
    pub depreciation: Money,
    pub interest: Money,
    pub taxable_income: Money,
    /// Prior losses used against this year's income
    pub loss_offset: Money,
    pub tax_base: Money,
    pub tax_rate: Rate,
    pub tax: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingProjection {
    pub years: Vec<OperatingYear>,
    /// Losses still unused at the end of the timeline
    pub unused_losses: Money,
}

impl OperatingProjection {
    /// Row for timeline year index `index`, if it is an operation year.
    pub fn at(&self, schedule: &PeriodSchedule, index: usize) -> Option<&OperatingYear> {
        index
            .checked_sub(schedule.first_operation_index())
            .and_then(|k| self.years.get(k))
    }
}

/// Escalate a base value through its growth steps, one value per operation
/// year, each rounded to cents. Growth that carries a year past
/// [`MAX_AMOUNT`] is rejected against `field`.
pub fn project_series(
    field: &str,
    series: &ProjectionSeries,
    operation_years: u32,
) -> AppraisalResult<Vec<Money>> {
    let mut values = Vec::with_capacity(operation_years as usize);
    let mut current = round_money(series.base);
    for n in 1..=operation_years {
        if n > 1 {
            current = current
                .checked_mul(Decimal::ONE + series.rate_for(n))
                .filter(|v| *v <= MAX_AMOUNT)
                .map(round_money)
                .ok_or_else(|| {
                    AppraisalError::invalid(
                        format!("{field}.growth"),
                        format!("Projected value in operation year {n} exceeds {MAX_AMOUNT}"),
                    )
                })?;
        }
        values.push(current);
    }
    Ok(values)
}

/// Tax losses awaiting offset, oldest first.
#[derive(Debug, Default)]
struct LossPool {
    entries: VecDeque<(u32, Money)>,
    carry_years: u32,
}

impl LossPool {
    fn new(carry_years: u32) -> Self {
        Self {
            entries: VecDeque::new(),
            carry_years,
        }
    }

    fn record(&mut self, year: u32, loss: Money) {
        if loss > Decimal::ZERO {
            self.entries.push_back((year, loss));
        }
    }

    /// Drop losses older than the carry-forward window.
    fn expire(&mut self, year: u32) {
        while let Some(&(origin, _)) = self.entries.front() {
            if year - origin > self.carry_years {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Use the oldest losses first against `income`; returns the offset.
    fn offset(&mut self, income: Money) -> Money {
        let mut remaining = income;
        let mut used = Decimal::ZERO;
        while remaining > Decimal::ZERO {
            let Some(front) = self.entries.front_mut() else {
                break;
            };
            let take = front.1.min(remaining);
            front.1 -= take;
            remaining -= take;
            used += take;
            if front.1.is_zero() {
                self.entries.pop_front();
            }
        }
        used
    }

    fn total(&self) -> Money {
        self.entries.iter().map(|(_, l)| *l).sum()
    }
}

/// Build the operating projection.
///
/// Interest expensed during construction (when it is not capitalised) is a
/// loss of its construction year and joins the carry-forward pool.
pub fn build_operating_projection(
    params: &ProjectParameters,
    schedule: &PeriodSchedule,
    plan: &InvestmentPlan,
    loan: &LoanSchedule,
    rules: &TaxRules,
) -> AppraisalResult<OperatingProjection> {
    let op = &params.operating;
    let o = schedule.operation_years;

    let revenue = project_series("operating.revenue", &op.revenue, o)?;
    let base_cost = project_series("operating.operating_cost", &op.operating_cost, o)?;
    let maintenance = round_money(plan.fixed_asset_cost * op.maintenance_rate);

    let out_share = rules.vat_output_rate / (Decimal::ONE + rules.vat_output_rate);
    let in_share = rules.vat_input_rate / (Decimal::ONE + rules.vat_input_rate);
    let surcharge_rate = rules.surcharge_rate();

    let mut losses = LossPool::new(rules.loss_carry_forward_years);
    for py in schedule.construction() {
        losses.record(py.year, loan.expensed_interest(py.index));
    }

    let mut years = Vec::with_capacity(o as usize);
    for n in 1..=o {
        let index = schedule.operation_index(n);
        let year = schedule.years[index].year;
        let k = (n - 1) as usize;

        let revenue = revenue[k];
        let operating_cost = base_cost[k] + maintenance;

        // ── Indirect taxes ──────────────────────────────────────────
        let vat_output = round_money(revenue * out_share);
        let vat_input = round_money(operating_cost * in_share);
        let vat_payable = (vat_output - vat_input).max(Decimal::ZERO);
        let surcharges = round_money(vat_payable * surcharge_rate);

        // ── Income tax ──────────────────────────────────────────────
        let depreciation = plan.depreciation[index];
        let interest = loan.expensed_interest(index);
        let taxable_income = revenue - operating_cost - surcharges - depreciation - interest;

        losses.expire(year);
        let loss_offset = if taxable_income > Decimal::ZERO {
            losses.offset(taxable_income)
        } else {
            losses.record(year, -taxable_income);
            Decimal::ZERO
        };
        let tax_base = (taxable_income - loss_offset).max(Decimal::ZERO);
        let tax_rate = match &op.tax_holiday {
            Some(h) if n <= h.years => h.rate,
            _ => op.income_tax_rate,
        };
        let tax = round_money(tax_base * tax_rate);

        years.push(OperatingYear {
            year,
            operation_year: n,
            revenue,
            operating_cost,
            maintenance,
            vat_output,
            vat_input,
            vat_payable,
            surcharges,
            depreciation,
            interest,
            taxable_income,
            loss_offset,
            tax_base,
            tax_rate,
            tax,
        });
    }

    let unused_losses = losses.total();
    debug!(years = years.len(), %unused_losses, "operating projection built");

    Ok(OperatingProjection {
        years,
        unused_losses,
    })
}
