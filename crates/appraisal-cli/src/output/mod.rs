pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;
pub mod yaml;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Yaml => yaml::print_yaml(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Render an indicator (`{"status": .., "value": ..}`) as its value, or as
/// its status when it is a sentinel. Returns None for any other value.
pub(crate) fn indicator_text(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    let status = map.get("status")?.as_str()?;
    match map.get("value") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => Some(status.replace('_', " ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_indicator_text() {
        assert_eq!(
            indicator_text(&json!({"status": "value", "value": "38.88"})),
            Some("38.88".to_string())
        );
        assert_eq!(
            indicator_text(&json!({"status": "not_found"})),
            Some("not found".to_string())
        );
        assert_eq!(indicator_text(&json!({"npv": 1})), None);
        assert_eq!(indicator_text(&json!("38.88")), None);
    }
}
