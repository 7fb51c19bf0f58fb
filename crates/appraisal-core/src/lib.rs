pub mod config;
pub mod error;
pub mod parameters;
pub mod time_value;
pub mod types;

pub mod evaluation;
pub mod financing;
pub mod indicators;
pub mod investment;
pub mod operating;
pub mod schedule;
pub mod sensitivity;
pub mod statements;

pub use config::EngineConfig;
pub use error::AppraisalError;
pub use evaluation::{evaluate, EvaluationOutput};
pub use parameters::ProjectParameters;
pub use sensitivity::{sensitivity, Factor, RangeSpec, SensitivityResult};
pub use types::*;

/// Standard result type for all appraisal operations
pub type AppraisalResult<T> = Result<T, AppraisalError>;
