pub mod evaluate;
pub mod sensitivity;
pub mod template;

use appraisal_core::ProjectParameters;

use crate::input;

/// Load project parameters from `path`, or from stdin when no path is given.
pub(crate) fn load_params(
    path: Option<&str>,
) -> Result<ProjectParameters, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return input::file::read_document(path);
    }
    match input::stdin::read_stdin()? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Err("No input provided. Pass --input <file> or pipe JSON to stdin".into()),
    }
}
