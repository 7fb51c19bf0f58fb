use serde_json::Value;

use super::indicator_text;

/// Print just the headline figure from the output.
///
/// Looks for the project NPV first, then the other indicators, then falls
/// back to the first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // Full evaluations and sensitivity baselines nest their indicators
    let indicators = result_obj
        .get("indicators")
        .or_else(|| result_obj.get("baseline"))
        .unwrap_or(result_obj);

    let priority_keys = [
        "npv",
        "irr",
        "dynamic_payback",
        "static_payback",
        "benefit_cost_ratio",
    ];

    if let Value::Object(map) = indicators {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    if let Some(text) = indicator_text(value) {
        return text;
    }
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
