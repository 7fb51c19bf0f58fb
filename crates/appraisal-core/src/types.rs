use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// Scale of the smallest monetary unit (cents).
pub const MONEY_DP: u32 = 2;

/// Round a monetary amount to the smallest monetary unit, half away from zero.
pub fn round_money(value: Money) -> Money {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Phase of a year in the project timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Construction,
    Operation,
}

/// An indicator value, or the explicit reason there is none.
///
/// Sentinels are values, not errors: a sweep carries on past a scenario
/// whose rate of return cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Indicator {
    Value(Decimal),
    /// Root search found no bracket or did not converge
    NotFound,
    /// Cumulative flow never turns non-negative within the timeline
    Never,
    /// Ratio with a zero denominator
    Undefined,
}

impl Indicator {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Indicator::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Indicator::Value(_))
    }

    /// `numerator / denominator`, or `Undefined` when the denominator is zero.
    pub fn ratio(numerator: Decimal, denominator: Decimal) -> Self {
        if denominator.is_zero() {
            Indicator::Undefined
        } else {
            Indicator::Value(numerator / denominator)
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Indicator::Value(v) => write!(f, "{v}"),
            Indicator::NotFound => write!(f, "not found"),
            Indicator::Never => write!(f, "never"),
            Indicator::Undefined => write!(f, "undefined"),
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(3944.875)), dec!(3944.88));
        assert_eq!(round_money(dec!(-0.005)), dec!(-0.01));
        assert_eq!(round_money(dec!(3944.8741176)), dec!(3944.87));
    }

    #[test]
    fn test_indicator_ratio_zero_denominator() {
        assert_eq!(Indicator::ratio(dec!(5), Decimal::ZERO), Indicator::Undefined);
        assert_eq!(Indicator::ratio(dec!(5), dec!(2)).value(), Some(dec!(2.5)));
    }

    #[test]
    fn test_indicator_serde_shape() {
        let json = serde_json::to_value(Indicator::Value(dec!(0.125))).unwrap();
        assert_eq!(json["status"], "value");
        assert_eq!(json["value"], "0.125");
        let json = serde_json::to_value(Indicator::NotFound).unwrap();
        assert_eq!(json["status"], "not_found");
    }
}
