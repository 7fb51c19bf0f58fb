use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::indicator_text;

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result);
            } else if let Some(Value::Array(rows)) = map.get("results") {
                if let Some(Value::String(name)) = map.get("statement") {
                    println!("{}", name);
                }
                print_array_table(rows);
                if let Some(ranking) = map.get("ranking") {
                    println!("\nRanking: {}", format_value(ranking));
                }
            } else {
                print_flat_object(value);
            }
            print_footer(map);
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

/// Scalar fields and indicators go in a Field/Value table; nested sections
/// are expanded one level with dotted names; row arrays are summarised.
fn print_result_table(result: &Value) {
    let Value::Object(res_map) = result else {
        println!("{}", format_value(result));
        return;
    };

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in res_map {
        match val {
            Value::Object(inner) if indicator_text(val).is_none() => {
                for (inner_key, inner_val) in inner {
                    let name = format!("{}.{}", key, inner_key);
                    builder.push_record([name.as_str(), &format_value(inner_val)]);
                }
            }
            _ => builder.push_record([key.as_str(), &format_value(val)]),
        }
    }
    println!("{}", Table::from(builder));
}

fn print_footer(envelope: &serde_json::Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    if let Some(text) = indicator_text(value) {
        return text;
    }
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) if arr.iter().any(Value::is_object) => format!("({} rows)", arr.len()),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
