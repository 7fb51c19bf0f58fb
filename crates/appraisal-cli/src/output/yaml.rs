use serde_json::Value;

/// Print YAML to stdout. Parameter templates written this way can be edited
/// and read back with `--input <file>.yaml`.
pub fn print_yaml(value: &Value) {
    match serde_yaml::to_string(value) {
        Ok(s) => print!("{}", s),
        Err(e) => eprintln!("YAML serialization error: {}", e),
    }
}
