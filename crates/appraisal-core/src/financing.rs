//! Loan schedule: construction draws, interest, grace years and repayment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppraisalError;
use crate::parameters::{LoanTerms, RepaymentMethod};
use crate::schedule::PeriodSchedule;
use crate::time_value::annuity_payment;
use crate::types::{round_money, Money, Phase};
use crate::AppraisalResult;

const STATEMENT: &str = "loan schedule";

/// A single year in the loan schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanPeriod {
    pub year: u32,
    pub phase: Phase,
    pub opening_balance: Money,
    pub draw: Money,
    pub interest: Money,
    /// Interest also added to the depreciable fixed-asset base
    pub capitalised: bool,
    pub principal_repayment: Money,
    pub closing_balance: Money,
    /// Interest plus principal paid in cash this year
    pub debt_service: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSchedule {
    pub principal: Money,
    /// Level payment (equal installment) or level principal (equal principal)
    pub installment: Money,
    pub periods: Vec<LoanPeriod>,
    pub construction_interest: Money,
    pub capitalised_interest: Money,
    pub total_interest: Money,
    pub total_principal: Money,
}

impl LoanSchedule {
    /// The schedule of an all-equity project: every year zero.
    pub fn empty(schedule: &PeriodSchedule) -> Self {
        let periods = schedule
            .years
            .iter()
            .map(|y| LoanPeriod {
                year: y.year,
                phase: y.phase,
                opening_balance: Decimal::ZERO,
                draw: Decimal::ZERO,
                interest: Decimal::ZERO,
                capitalised: false,
                principal_repayment: Decimal::ZERO,
                closing_balance: Decimal::ZERO,
                debt_service: Decimal::ZERO,
            })
            .collect();
        Self {
            principal: Decimal::ZERO,
            installment: Decimal::ZERO,
            periods,
            construction_interest: Decimal::ZERO,
            capitalised_interest: Decimal::ZERO,
            total_interest: Decimal::ZERO,
            total_principal: Decimal::ZERO,
        }
    }

    /// Interest charged to profit in year `index`. Capitalised interest is
    /// carried through depreciation instead.
    pub fn expensed_interest(&self, index: usize) -> Money {
        self.periods
            .get(index)
            .filter(|p| !p.capitalised)
            .map(|p| p.interest)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Build the loan schedule over the whole timeline.
///
/// `construction_outlay` is the construction-period capital expenditure per
/// timeline year; draws follow it proportionally.
pub fn build_loan_schedule(
    terms: &LoanTerms,
    schedule: &PeriodSchedule,
    construction_outlay: &[Money],
) -> AppraisalResult<LoanSchedule> {
    if terms.term_years == 0 {
        return Err(AppraisalError::invalid(
            "financing.term_years",
            "Repayment term must be at least 1 year",
        ));
    }
    if terms.grace_years + terms.term_years > schedule.operation_years {
        return Err(AppraisalError::invalid(
            "financing.term_years",
            "Grace plus repayment term exceeds the operation period",
        ));
    }

    let draws = construction_draws(terms.principal, schedule, construction_outlay);
    let first_repayment = terms.grace_years + 1;
    let last_repayment = terms.grace_years + terms.term_years;

    let mut periods = Vec::with_capacity(schedule.len());
    let mut balance = Decimal::ZERO;
    let mut installment = Decimal::ZERO;
    let mut construction_interest = Decimal::ZERO;

    for (py, draw) in schedule.years.iter().zip(&draws) {
        let opening = balance;

        let (interest, principal, capitalised) = match py.phase {
            // ── Construction: draw, interest on the average balance ──
            Phase::Construction => {
                let interest = round_money((opening + draw / Decimal::TWO) * terms.rate);
                construction_interest += interest;
                balance += draw;
                (
                    interest,
                    Decimal::ZERO,
                    terms.capitalize_construction_interest,
                )
            }
            // ── Operation: grace, then repayment ─────────────────────
            Phase::Operation => {
                let n = py.year - schedule.construction_years;
                let interest = round_money(opening * terms.rate);

                if n == first_repayment {
                    installment = match terms.method {
                        RepaymentMethod::EqualInstallment => {
                            round_money(annuity_payment(terms.rate, terms.term_years, opening)?)
                        }
                        RepaymentMethod::EqualPrincipal => {
                            round_money(opening / Decimal::from(terms.term_years))
                        }
                    };
                }

                let principal = if n < first_repayment || n > last_repayment {
                    Decimal::ZERO
                } else if n == last_repayment {
                    opening
                } else {
                    let due = match terms.method {
                        RepaymentMethod::EqualInstallment => installment - interest,
                        RepaymentMethod::EqualPrincipal => installment,
                    };
                    due.max(Decimal::ZERO).min(opening)
                };
                balance -= principal;
                (interest, principal, false)
            }
        };

        periods.push(LoanPeriod {
            year: py.year,
            phase: py.phase,
            opening_balance: opening,
            draw: *draw,
            interest,
            capitalised,
            principal_repayment: principal,
            closing_balance: balance,
            debt_service: interest + principal,
        });
    }

    let total_interest = periods.iter().map(|p| p.interest).sum();
    let total_principal = periods.iter().map(|p| p.principal_repayment).sum();
    let capitalised_interest = if terms.capitalize_construction_interest {
        construction_interest
    } else {
        Decimal::ZERO
    };

    let loan = LoanSchedule {
        principal: terms.principal,
        installment,
        periods,
        construction_interest,
        capitalised_interest,
        total_interest,
        total_principal,
    };
    verify_loan(&loan, schedule, first_repayment, last_repayment)?;

    debug!(
        principal = %terms.principal,
        %installment,
        %construction_interest,
        %total_interest,
        "loan schedule built"
    );
    Ok(loan)
}

/// Split the principal across construction years in proportion to the
/// year's outlay. The last funded year takes the cent remainder.
fn construction_draws(
    principal: Money,
    schedule: &PeriodSchedule,
    construction_outlay: &[Money],
) -> Vec<Money> {
    let mut draws = vec![Decimal::ZERO; schedule.len()];
    let c = schedule.construction_years as usize;
    let outlays = &construction_outlay[..c.min(construction_outlay.len())];
    let total: Money = outlays.iter().sum();
    if total.is_zero() || principal.is_zero() {
        return draws;
    }
    let Some(last) = outlays.iter().rposition(|o| !o.is_zero()) else {
        return draws;
    };

    let mut drawn = Decimal::ZERO;
    for (i, outlay) in outlays.iter().enumerate().take(last) {
        let draw = round_money(principal * outlay / total);
        draws[i] = draw;
        drawn += draw;
    }
    draws[last] = principal - drawn;
    draws
}

fn verify_loan(
    loan: &LoanSchedule,
    schedule: &PeriodSchedule,
    first_repayment: u32,
    last_repayment: u32,
) -> AppraisalResult<()> {
    let drawn: Money = loan.periods.iter().map(|p| p.draw).sum();
    if drawn != loan.principal {
        return Err(AppraisalError::inconsistent(
            STATEMENT,
            schedule.construction_years,
            format!("draws total {drawn}, principal is {}", loan.principal),
        ));
    }

    for p in &loan.periods {
        if p.closing_balance < Decimal::ZERO {
            return Err(AppraisalError::inconsistent(
                STATEMENT,
                p.year,
                format!("negative balance {}", p.closing_balance),
            ));
        }
        if p.phase != Phase::Operation {
            continue;
        }
        let n = p.year - schedule.construction_years;
        let repaying = n >= first_repayment && n <= last_repayment;
        if repaying
            && p.opening_balance > Decimal::ZERO
            && !loan.installment.is_zero()
            && p.closing_balance >= p.opening_balance
        {
            return Err(AppraisalError::inconsistent(
                STATEMENT,
                p.year,
                format!(
                    "balance did not decrease ({} -> {})",
                    p.opening_balance, p.closing_balance
                ),
            ));
        }
        if n >= last_repayment && !p.closing_balance.is_zero() {
            return Err(AppraisalError::inconsistent(
                STATEMENT,
                p.year,
                format!(
                    "balance {} outstanding after the final installment",
                    p.closing_balance
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::build_period_schedule;
    use rust_decimal_macros::dec;

    fn terms(principal: Money, rate: Decimal, term: u32, method: RepaymentMethod) -> LoanTerms {
        LoanTerms {
            principal,
            rate,
            term_years: term,
            method,
            grace_years: 0,
            capitalize_construction_interest: true,
        }
    }

    #[test]
    fn test_equal_installment_scenario() {
        let s = build_period_schedule(1, 10, None).unwrap();
        let outlay = {
            let mut v = vec![Decimal::ZERO; s.len()];
            v[0] = dec!(10000);
            v
        };
        let t = terms(
            dec!(10000),
            dec!(0.06),
            10,
            RepaymentMethod::EqualInstallment,
        );
        let loan = build_loan_schedule(&t, &s, &outlay).unwrap();

        assert_eq!(loan.installment, dec!(1358.68));
        assert_eq!(loan.periods[0].draw, dec!(10000));
        assert_eq!(loan.periods[0].interest, dec!(300));
        assert!(loan.periods[0].capitalised);
        assert_eq!(loan.periods[1].interest, dec!(600));
        assert_eq!(loan.periods[1].principal_repayment, dec!(758.68));
        for p in &loan.periods[1..10] {
            assert_eq!(p.debt_service, dec!(1358.68), "year {}", p.year);
        }
        assert_eq!(loan.periods.last().unwrap().closing_balance, Decimal::ZERO);
        assert_eq!(loan.total_principal, dec!(10000));
    }

    #[test]
    fn test_equal_principal_declining_interest() {
        let s = build_period_schedule(1, 4, None).unwrap();
        let mut outlay = vec![Decimal::ZERO; s.len()];
        outlay[0] = dec!(1000);
        let t = terms(dec!(1000), dec!(0.10), 3, RepaymentMethod::EqualPrincipal);
        let loan = build_loan_schedule(&t, &s, &outlay).unwrap();

        assert_eq!(loan.installment, dec!(333.33));
        assert_eq!(loan.periods[1].principal_repayment, dec!(333.33));
        assert_eq!(loan.periods[2].principal_repayment, dec!(333.33));
        assert_eq!(loan.periods[3].principal_repayment, dec!(333.34));
        assert_eq!(loan.periods[1].interest, dec!(100));
        assert_eq!(loan.periods[2].interest, dec!(66.67));
        assert_eq!(loan.periods[4].debt_service, Decimal::ZERO);
    }

    #[test]
    fn test_grace_years_interest_only() {
        let s = build_period_schedule(2, 6, None).unwrap();
        let mut outlay = vec![Decimal::ZERO; s.len()];
        outlay[0] = dec!(600);
        outlay[1] = dec!(400);
        let mut t = terms(dec!(500), dec!(0.05), 4, RepaymentMethod::EqualPrincipal);
        t.grace_years = 2;
        let loan = build_loan_schedule(&t, &s, &outlay).unwrap();

        assert_eq!(loan.periods[0].draw, dec!(300));
        assert_eq!(loan.periods[1].draw, dec!(200));
        // (0 + 150) * 5%, (300 + 100) * 5%
        assert_eq!(loan.periods[0].interest, dec!(7.50));
        assert_eq!(loan.periods[1].interest, dec!(20));
        assert_eq!(loan.construction_interest, dec!(27.50));

        for p in &loan.periods[2..4] {
            assert_eq!(p.principal_repayment, Decimal::ZERO);
            assert_eq!(p.interest, dec!(25));
        }
        assert_eq!(loan.periods[4].principal_repayment, dec!(125));
        assert_eq!(loan.periods[7].closing_balance, Decimal::ZERO);
    }

    #[test]
    fn test_uncapitalised_construction_interest_is_expensed() {
        let s = build_period_schedule(1, 2, None).unwrap();
        let outlay = vec![dec!(100), Decimal::ZERO, Decimal::ZERO];
        let mut t = terms(dec!(100), dec!(0.10), 2, RepaymentMethod::EqualPrincipal);
        t.capitalize_construction_interest = false;
        let loan = build_loan_schedule(&t, &s, &outlay).unwrap();
        assert_eq!(loan.capitalised_interest, Decimal::ZERO);
        assert_eq!(loan.expensed_interest(0), dec!(5));
    }

    #[test]
    fn test_term_beyond_operation_rejected() {
        let s = build_period_schedule(1, 3, None).unwrap();
        let outlay = vec![dec!(100), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO];
        let mut t = terms(dec!(100), dec!(0.10), 3, RepaymentMethod::EqualPrincipal);
        t.grace_years = 1;
        assert!(matches!(
            build_loan_schedule(&t, &s, &outlay),
            Err(AppraisalError::InvalidInput { .. })
        ));
    }
}
