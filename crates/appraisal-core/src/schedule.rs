//! Period schedule: the ordered list of project years all later stages align to.

use serde::{Deserialize, Serialize};

use crate::error::AppraisalError;
use crate::parameters::{MAX_CONSTRUCTION_YEARS, MAX_OPERATION_YEARS};
use crate::types::Phase;
use crate::AppraisalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodYear {
    /// 0-based; index 0 is the first construction year and the NPV base period
    pub index: usize,
    /// 1-based display number
    pub year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_year: Option<i32>,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSchedule {
    pub construction_years: u32,
    pub operation_years: u32,
    pub years: Vec<PeriodYear>,
}

impl PeriodSchedule {
    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Timeline index of the first operation year.
    pub fn first_operation_index(&self) -> usize {
        self.construction_years as usize
    }

    pub fn last_index(&self) -> usize {
        self.years.len().saturating_sub(1)
    }

    /// Timeline index of 1-based operation year `n`.
    pub fn operation_index(&self, n: u32) -> usize {
        self.construction_years as usize + n as usize - 1
    }

    pub fn construction(&self) -> impl Iterator<Item = &PeriodYear> {
        self.years.iter().filter(|y| y.phase == Phase::Construction)
    }

    pub fn operation(&self) -> impl Iterator<Item = &PeriodYear> {
        self.years.iter().filter(|y| y.phase == Phase::Operation)
    }
}

/// Lay out `construction_years` construction years followed by
/// `operation_years` operation years.
pub fn build_period_schedule(
    construction_years: u32,
    operation_years: u32,
    start_year: Option<i32>,
) -> AppraisalResult<PeriodSchedule> {
    if !(1..=MAX_CONSTRUCTION_YEARS).contains(&construction_years) {
        return Err(AppraisalError::invalid(
            "construction_years",
            format!("Construction period must be between 1 and {MAX_CONSTRUCTION_YEARS} years"),
        ));
    }
    if !(1..=MAX_OPERATION_YEARS).contains(&operation_years) {
        return Err(AppraisalError::invalid(
            "operation_years",
            format!("Operation period must be between 1 and {MAX_OPERATION_YEARS} years"),
        ));
    }

    let total = construction_years + operation_years;
    let years = (0..total)
        .map(|i| PeriodYear {
            index: i as usize,
            year: i + 1,
            calendar_year: start_year.map(|y| y + i as i32),
            phase: if i < construction_years {
                Phase::Construction
            } else {
                Phase::Operation
            },
        })
        .collect();

    Ok(PeriodSchedule {
        construction_years,
        operation_years,
        years,
    })
}
