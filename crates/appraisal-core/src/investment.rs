//! Investment planner: construction outlays, depreciation and amortization
//! schedules, and the terminal recovery values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppraisalError;
use crate::parameters::{AssetClass, ProjectParameters};
use crate::schedule::PeriodSchedule;
use crate::types::{round_money, Money};
use crate::AppraisalResult;

/// Name of the synthetic fixed asset holding capitalised construction interest.
pub const CAPITALISED_INTEREST_ASSET: &str = "capitalised construction interest";

/// One investment item's spend, aligned to the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutlay {
    pub name: String,
    pub asset_class: AssetClass,
    pub amount: Money,
    pub outlays: Vec<Money>,
}

/// Straight-line charges for one depreciable or amortizable asset.
///
/// `charges` covers the asset's whole useful life, which may run past the
/// end of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepreciationSchedule {
    pub asset: String,
    pub asset_class: AssetClass,
    pub cost: Money,
    pub depreciable_base: Money,
    pub useful_life_years: u32,
    /// Timeline index of the first charge
    pub start_index: usize,
    pub charges: Vec<Money>,
}

impl DepreciationSchedule {
    /// Charge falling in timeline year `index`, zero outside the life.
    pub fn charge_at(&self, index: usize) -> Money {
        index
            .checked_sub(self.start_index)
            .and_then(|k| self.charges.get(k))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Sum of charges up to and including timeline year `index`.
    pub fn charged_through(&self, index: usize) -> Money {
        match index.checked_sub(self.start_index) {
            Some(k) => self.charges.iter().take(k + 1).sum(),
            None => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPlan {
    pub items: Vec<ItemOutlay>,
    /// All outlays per timeline year, working capital included
    pub total_outlay: Vec<Money>,
    /// Construction-period capital expenditure per year (no working capital)
    pub construction_outlay: Vec<Money>,
    pub depreciation_schedules: Vec<DepreciationSchedule>,
    /// Depreciation and amortization charged in each timeline year
    pub depreciation: Vec<Money>,
    /// Cost of all fixed assets, capitalised interest included
    pub fixed_asset_cost: Money,
    pub capitalised_interest: Money,
    pub working_capital: Money,
    /// Undepreciated fixed-asset book value at the end of the timeline
    pub residual_value: Money,
    /// Residual value plus working capital, recovered in the final year
    pub terminal_recovery: Money,
}

/// Spread every investment item over the timeline.
///
/// Construction items follow their own weights or the default curve; the
/// last year with a non-zero weight absorbs the cent remainder. Working
/// capital lands whole in the first operation year.
pub fn allocate_outlays(
    params: &ProjectParameters,
    schedule: &PeriodSchedule,
) -> AppraisalResult<Vec<ItemOutlay>> {
    let default_weights = params.default_allocation.weights(schedule.construction_years)?;
    let mut items = Vec::with_capacity(params.investment_items.len());

    for item in &params.investment_items {
        let mut outlays = vec![Decimal::ZERO; schedule.len()];

        if item.asset_class == AssetClass::WorkingCapital {
            outlays[schedule.first_operation_index()] = item.amount;
        } else {
            let weights = match &item.allocation {
                Some(w) => w.as_slice(),
                None => default_weights.as_slice(),
            };
            let last = weights
                .iter()
                .rposition(|w| !w.is_zero())
                .ok_or_else(|| AppraisalError::invalid(
                    format!("investment_items[{}].allocation", item.name),
                    "At least one weight must be non-zero",
                ))?;
            let mut allocated = Decimal::ZERO;
            for (i, w) in weights.iter().enumerate().take(last) {
                let share = round_money(item.amount * w);
                outlays[i] = share;
                allocated += share;
            }
            outlays[last] = item.amount - allocated;
        }

        items.push(ItemOutlay {
            name: item.name.clone(),
            asset_class: item.asset_class,
            amount: item.amount,
            outlays,
        });
    }
    Ok(items)
}

/// Construction-period capital expenditure per timeline year.
pub fn construction_outlay(items: &[ItemOutlay], timeline_len: usize) -> Vec<Money> {
    let mut out = vec![Decimal::ZERO; timeline_len];
    for item in items
        .iter()
        .filter(|i| i.asset_class != AssetClass::WorkingCapital)
    {
        for (slot, v) in out.iter_mut().zip(&item.outlays) {
            *slot += v;
        }
    }
    out
}

/// Straight-line charges over `life` years: every year `round₂(base / life)`,
/// never letting the running total pass the base, with the final year
/// charging whatever remains.
pub fn straight_line(base: Money, life: u32) -> Vec<Money> {
    if life == 0 {
        return Vec::new();
    }
    let annual = round_money(base / Decimal::from(life));
    let mut charges = Vec::with_capacity(life as usize);
    let mut charged = Decimal::ZERO;
    for _ in 1..life {
        let charge = annual.min(base - charged).max(Decimal::ZERO);
        charges.push(charge);
        charged += charge;
    }
    charges.push(base - charged);
    charges
}

/// Build the investment plan from allocated outlays and the construction
/// interest to capitalise (zero when interest is not capitalised).
pub fn plan_investment(
    params: &ProjectParameters,
    schedule: &PeriodSchedule,
    items: Vec<ItemOutlay>,
    capitalised_interest: Money,
) -> AppraisalResult<InvestmentPlan> {
    let policy = &params.depreciation;
    let start_index = schedule.first_operation_index();
    let last_index = schedule.last_index();

    // ── Depreciation and amortization schedules ─────────────────────
    let mut schedules = Vec::new();
    for (item, spec) in items.iter().zip(&params.investment_items) {
        if item.asset_class == AssetClass::WorkingCapital {
            continue;
        }
        let life = spec
            .useful_life_years
            .unwrap_or_else(|| policy.life_for(item.asset_class));
        let base = match item.asset_class {
            AssetClass::Fixed => item.amount * (Decimal::ONE - policy.salvage_rate),
            _ => item.amount,
        };
        let base = round_money(base);
        schedules.push(DepreciationSchedule {
            asset: item.name.clone(),
            asset_class: item.asset_class,
            cost: item.amount,
            depreciable_base: base,
            useful_life_years: life,
            start_index,
            charges: straight_line(base, life),
        });
    }
    if capitalised_interest > Decimal::ZERO {
        let base = round_money(capitalised_interest * (Decimal::ONE - policy.salvage_rate));
        schedules.push(DepreciationSchedule {
            asset: CAPITALISED_INTEREST_ASSET.to_string(),
            asset_class: AssetClass::Fixed,
            cost: capitalised_interest,
            depreciable_base: base,
            useful_life_years: policy.fixed_asset_life,
            start_index,
            charges: straight_line(base, policy.fixed_asset_life),
        });
    }

    for s in &schedules {
        verify_depreciation(s)?;
    }

    let depreciation: Vec<Money> = (0..schedule.len())
        .map(|i| schedules.iter().map(|s| s.charge_at(i)).sum())
        .collect();

    // ── Outlay totals ────────────────────────────────────────────────
    let mut total_outlay = vec![Decimal::ZERO; schedule.len()];
    for item in &items {
        let sum: Money = item.outlays.iter().sum();
        if sum != item.amount {
            return Err(AppraisalError::inconsistent(
                format!("investment outlays ({})", item.name),
                schedule.construction_years,
                format!("outlays sum to {sum}, item amount is {}", item.amount),
            ));
        }
        for (slot, v) in total_outlay.iter_mut().zip(&item.outlays) {
            *slot += v;
        }
    }
    let construction_outlay = construction_outlay(&items, schedule.len());

    // ── Terminal recovery ────────────────────────────────────────────
    let fixed: Vec<&DepreciationSchedule> = schedules
        .iter()
        .filter(|s| s.asset_class == AssetClass::Fixed)
        .collect();
    let fixed_asset_cost: Money = fixed.iter().map(|s| s.cost).sum();
    let residual_value: Money = fixed
        .iter()
        .map(|s| s.cost - s.charged_through(last_index))
        .sum();
    let working_capital: Money = items
        .iter()
        .filter(|i| i.asset_class == AssetClass::WorkingCapital)
        .map(|i| i.amount)
        .sum();

    debug!(
        assets = schedules.len(),
        %fixed_asset_cost,
        %residual_value,
        %working_capital,
        "investment plan built"
    );

    Ok(InvestmentPlan {
        items,
        total_outlay,
        construction_outlay,
        depreciation_schedules: schedules,
        depreciation,
        fixed_asset_cost,
        capitalised_interest,
        working_capital,
        residual_value,
        terminal_recovery: residual_value + working_capital,
    })
}

fn verify_depreciation(s: &DepreciationSchedule) -> AppraisalResult<()> {
    let statement = format!("depreciation schedule ({})", s.asset);
    let mut cumulative = Decimal::ZERO;
    for (k, charge) in s.charges.iter().enumerate() {
        let year = (s.start_index + k + 1) as u32;
        if *charge < Decimal::ZERO {
            return Err(AppraisalError::inconsistent(
                &statement,
                year,
                format!("negative charge {charge}"),
            ));
        }
        cumulative += charge;
        if cumulative > s.depreciable_base {
            return Err(AppraisalError::inconsistent(
                &statement,
                year,
                format!(
                    "cumulative charge {cumulative} exceeds base {}",
                    s.depreciable_base
                ),
            ));
        }
    }
    if cumulative != s.depreciable_base {
        return Err(AppraisalError::inconsistent(
            &statement,
            (s.start_index + s.charges.len()) as u32,
            format!(
                "charges total {cumulative}, depreciable base is {}",
                s.depreciable_base
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{
        AllocationCurve, DepreciationPolicy, InvestmentItem, OperatingAssumptions,
        ProjectionSeries,
    };
    use crate::schedule::build_period_schedule;
    use rust_decimal_macros::dec;

    fn params(items: Vec<InvestmentItem>, c: u32, o: u32) -> ProjectParameters {
        ProjectParameters {
            project_name: "test".into(),
            construction_years: c,
            operation_years: o,
            start_year: None,
            investment_items: items,
            default_allocation: AllocationCurve::Standard,
            depreciation: DepreciationPolicy::default(),
            financing: None,
            operating: OperatingAssumptions {
                revenue: ProjectionSeries::flat(dec!(100)),
                operating_cost: ProjectionSeries::flat(dec!(10)),
                maintenance_rate: Decimal::ZERO,
                income_tax_rate: dec!(0.25),
                tax_holiday: None,
            },
            discount_rate: dec!(0.08),
        }
    }

    fn item(name: &str, amount: Money, class: AssetClass) -> InvestmentItem {
        InvestmentItem {
            name: name.into(),
            amount,
            asset_class: class,
            allocation: None,
            useful_life_years: None,
        }
    }

    #[test]
    fn test_straight_line_final_year_absorbs_remainder() {
        let charges = straight_line(dec!(67062.86), 17);
        assert_eq!(charges.len(), 17);
        assert!(charges[..16].iter().all(|c| *c == dec!(3944.87)));
        assert_eq!(charges[16], dec!(3944.94));
        assert_eq!(charges.iter().copied().sum::<Decimal>(), dec!(67062.86));
    }

    #[test]
    fn test_straight_line_tiny_base_never_overshoots() {
        let charges = straight_line(dec!(0.15), 20);
        assert!(charges.iter().all(|c| *c >= Decimal::ZERO));
        assert_eq!(charges.iter().copied().sum::<Decimal>(), dec!(0.15));
    }

    #[test]
    fn test_standard_allocation_sums_exactly() {
        let p = params(vec![item("plant", dec!(1000.01), AssetClass::Fixed)], 3, 5);
        let s = build_period_schedule(3, 5, None).unwrap();
        let items = allocate_outlays(&p, &s).unwrap();
        let o = &items[0].outlays;
        assert_eq!(o[0], dec!(400.00));
        assert_eq!(o[1], dec!(300.00));
        assert_eq!(o[2], dec!(300.01));
        assert_eq!(o[3..].iter().copied().sum::<Decimal>(), Decimal::ZERO);
    }

    #[test]
    fn test_trailing_zero_weight_shifts_remainder() {
        let mut plant = item("plant", dec!(100), AssetClass::Fixed);
        plant.allocation = Some(vec![dec!(0.333), dec!(0.667), Decimal::ZERO]);
        let p = params(vec![plant], 3, 5);
        let s = build_period_schedule(3, 5, None).unwrap();
        let items = allocate_outlays(&p, &s).unwrap();
        assert_eq!(items[0].outlays[0], dec!(33.30));
        assert_eq!(items[0].outlays[1], dec!(66.70));
        assert_eq!(items[0].outlays[2], Decimal::ZERO);
    }

    #[test]
    fn test_working_capital_in_first_operation_year_and_recovered() {
        let p = params(
            vec![
                item("plant", dec!(2000), AssetClass::Fixed),
                item("wc", dec!(150), AssetClass::WorkingCapital),
            ],
            2,
            4,
        );
        let s = build_period_schedule(2, 4, None).unwrap();
        let items = allocate_outlays(&p, &s).unwrap();
        assert_eq!(items[1].outlays[2], dec!(150));
        let plan = plan_investment(&p, &s, items, Decimal::ZERO).unwrap();
        assert_eq!(plan.total_outlay[2], dec!(150));
        assert_eq!(plan.construction_outlay[2], Decimal::ZERO);
        assert_eq!(plan.working_capital, dec!(150));

        // base 1900 over 20 years = 95/yr, 4 years charged in the timeline
        assert_eq!(plan.depreciation[2], dec!(95));
        assert_eq!(plan.depreciation[1], Decimal::ZERO);
        assert_eq!(plan.residual_value, dec!(2000) - dec!(380));
        assert_eq!(plan.terminal_recovery, dec!(1620) + dec!(150));
    }

    #[test]
    fn test_capitalised_interest_becomes_fixed_asset() {
        let p = params(vec![item("plant", dec!(2000), AssetClass::Fixed)], 2, 4);
        let s = build_period_schedule(2, 4, None).unwrap();
        let items = allocate_outlays(&p, &s).unwrap();
        let plan = plan_investment(&p, &s, items, dec!(100)).unwrap();
        let synthetic = plan
            .depreciation_schedules
            .iter()
            .find(|d| d.asset == CAPITALISED_INTEREST_ASSET)
            .unwrap();
        assert_eq!(synthetic.depreciable_base, dec!(95));
        assert_eq!(plan.fixed_asset_cost, dec!(2100));
    }

    #[test]
    fn test_intangible_amortized_without_salvage() {
        let mut land = item("land use rights", dec!(500), AssetClass::Intangible);
        land.useful_life_years = Some(10);
        let p = params(vec![land], 1, 3);
        let s = build_period_schedule(1, 3, None).unwrap();
        let items = allocate_outlays(&p, &s).unwrap();
        let plan = plan_investment(&p, &s, items, Decimal::ZERO).unwrap();
        assert_eq!(plan.depreciation_schedules[0].depreciable_base, dec!(500));
        assert_eq!(plan.depreciation[1], dec!(50));
        // only fixed assets feed the residual
        assert_eq!(plan.residual_value, Decimal::ZERO);
    }
}
