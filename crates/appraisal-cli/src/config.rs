use appraisal_core::EngineConfig;
use tracing::debug;

use crate::input::file::read_text;

/// Load the engine configuration from a TOML file, or the built-in defaults
/// when no file is given.
pub fn load_engine_config(path: Option<&str>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = read_text(path)?;
    let cfg = EngineConfig::from_toml_str(&text)
        .map_err(|e| format!("Invalid engine configuration '{path}': {e}"))?;
    debug!(path, "engine configuration loaded");
    Ok(cfg)
}
