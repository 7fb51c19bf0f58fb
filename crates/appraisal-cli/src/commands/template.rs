use serde_json::Value;

use appraisal_core::parameters::reference_parameters;

/// The reference industrial park project, ready to edit and feed back into
/// `appraise evaluate`.
pub fn run_template() -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::to_value(reference_parameters())?)
}
