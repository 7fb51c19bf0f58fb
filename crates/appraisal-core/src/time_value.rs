use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::config::SolverConfig;
use crate::error::AppraisalError;
use crate::types::{Money, Rate};
use crate::AppraisalResult;

/// How many times an unrepresentable bracket bound is halved toward zero.
const MAX_BOUND_HALVINGS: u32 = 32;

/// Net Present Value of a series of annual cash flows, `t = 0` for the first.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> AppraisalResult<Money> {
    if rate <= dec!(-1) {
        return Err(AppraisalError::DivisionByZero {
            context: format!("NPV at a rate of {rate} (must be greater than -100%)"),
        });
    }
    npv_checked(rate, cash_flows).ok_or_else(|| AppraisalError::DivisionByZero {
        context: format!("NPV discount factor at rate {rate} underflows"),
    })
}

/// NPV, or `None` when a discount factor vanishes or the sum overflows.
pub fn npv_checked(rate: Rate, cash_flows: &[Money]) -> Option<Money> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let mut result = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
        }
        if discount.is_zero() {
            return None;
        }
        result = result.checked_add(cf.checked_div(discount)?)?;
    }
    Some(result)
}

/// NPV and its derivative with respect to the rate, in one pass.
fn npv_with_derivative(rate: Rate, cash_flows: &[Money]) -> Option<(Money, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let mut value = Decimal::ZERO;
    let mut slope = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
        }
        if discount.is_zero() {
            return None;
        }
        let pv = cf.checked_div(discount)?;
        value = value.checked_add(pv)?;
        if t > 0 {
            let term = pv.checked_mul(Decimal::from(t as u64))?.checked_div(one_plus_r)?;
            slope = slope.checked_sub(term)?;
        }
    }
    Some((value, slope))
}

/// Each flow divided by its discount factor `(1 + r)^t`.
pub fn discounted_flows(rate: Rate, cash_flows: &[Money]) -> AppraisalResult<Vec<Money>> {
    if rate <= dec!(-1) {
        return Err(AppraisalError::DivisionByZero {
            context: format!("discount factor at a rate of {rate}"),
        });
    }
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;
    let mut out = Vec::with_capacity(cash_flows.len());

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount
                .checked_mul(one_plus_r)
                .ok_or_else(|| AppraisalError::DivisionByZero {
                    context: format!("discount factor overflow at period {t}"),
                })?;
        }
        let pv = cf
            .checked_div(discount)
            .ok_or_else(|| AppraisalError::DivisionByZero {
                context: format!("discount factor at period {t}"),
            })?;
        out.push(pv);
    }
    Ok(out)
}

/// Internal Rate of Return.
///
/// Requires at least one sign change in the flows. The root is bracketed by
/// the configured bounds, each pulled toward zero while its NPV cannot be
/// represented. Newton steps are taken only while they stay inside the
/// current bracket; otherwise the bracket is bisected.
pub fn irr(cash_flows: &[Money], solver: &SolverConfig) -> AppraisalResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(AppraisalError::invalid(
            "cash_flows",
            "IRR requires at least 2 cash flows",
        ));
    }
    let has_positive = cash_flows.iter().any(|cf| cf.is_sign_positive() && !cf.is_zero());
    let has_negative = cash_flows.iter().any(|cf| cf.is_sign_negative() && !cf.is_zero());
    if !(has_positive && has_negative) {
        return Err(AppraisalError::invalid(
            "cash_flows",
            "IRR requires at least one sign change in the cash flows",
        ));
    }

    let (mut lo, mut f_lo) = representable_bound(solver.lower_bound, cash_flows)?;
    let (mut hi, f_hi) = representable_bound(solver.upper_bound, cash_flows)?;

    if f_lo.is_zero() {
        return Ok(lo);
    }
    if f_hi.is_zero() {
        return Ok(hi);
    }
    if f_lo.is_sign_negative() == f_hi.is_sign_negative() {
        return Err(AppraisalError::ConvergenceFailure {
            function: format!("IRR bracket [{lo}, {hi}]"),
            iterations: 0,
            last_delta: f_hi,
        });
    }

    let mut rate = if solver.initial_guess > lo && solver.initial_guess < hi {
        solver.initial_guess
    } else {
        (lo + hi) / dec!(2)
    };
    let mut last_delta = hi - lo;

    for _ in 0..solver.max_iterations {
        let (value, slope) = npv_with_derivative(rate, cash_flows).ok_or_else(|| {
            AppraisalError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: 0,
                last_delta,
            }
        })?;
        if value.is_zero() {
            return Ok(rate);
        }

        // Shrink the bracket around the root
        if value.is_sign_negative() == f_lo.is_sign_negative() {
            lo = rate;
            f_lo = value;
        } else {
            hi = rate;
        }

        let newton = if slope.is_zero() {
            None
        } else {
            value.checked_div(slope).and_then(|step| rate.checked_sub(step))
        };
        let next = match newton {
            Some(candidate) if candidate > lo && candidate < hi => candidate,
            _ => (lo + hi) / dec!(2),
        };

        last_delta = (next - rate).abs();
        rate = next;
        if last_delta < solver.tolerance || hi - lo < solver.tolerance {
            return Ok(rate);
        }
    }

    Err(AppraisalError::ConvergenceFailure {
        function: "IRR".into(),
        iterations: solver.max_iterations,
        last_delta,
    })
}

fn representable_bound(bound: Rate, cash_flows: &[Money]) -> AppraisalResult<(Rate, Money)> {
    let mut candidate = bound;
    for _ in 0..MAX_BOUND_HALVINGS {
        if let Some(value) = npv_checked(candidate, cash_flows) {
            return Ok((candidate, value));
        }
        candidate /= dec!(2);
    }
    Err(AppraisalError::ConvergenceFailure {
        function: format!("IRR bound {bound}"),
        iterations: MAX_BOUND_HALVINGS,
        last_delta: candidate,
    })
}

/// Level annual payment that repays `principal` over `periods` at `rate`.
pub fn annuity_payment(rate: Rate, periods: u32, principal: Money) -> AppraisalResult<Money> {
    if periods == 0 {
        return Err(AppraisalError::invalid(
            "periods",
            "Number of periods must be > 0",
        ));
    }

    if rate.is_zero() {
        return Ok(principal / Decimal::from(periods));
    }

    let factor = (Decimal::ONE + rate)
        .checked_powu(periods as u64)
        .ok_or_else(|| {
            AppraisalError::invalid(
                "rate",
                format!("Annuity factor (1 + {rate})^{periods} is not representable"),
            )
        })?;
    let annuity_factor = factor - Decimal::ONE;

    if annuity_factor.is_zero() {
        return Err(AppraisalError::DivisionByZero {
            context: "annuity factor".into(),
        });
    }

    factor
        .checked_div(annuity_factor)
        .and_then(|ratio| principal.checked_mul(rate)?.checked_mul(ratio))
        .ok_or_else(|| AppraisalError::DivisionByZero {
            context: format!("annuity payment on {principal} at {rate}"),
        })
}
