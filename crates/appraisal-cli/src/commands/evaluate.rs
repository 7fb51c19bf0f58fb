use clap::{Args, ValueEnum};
use serde_json::{json, Value};

use appraisal_core::{evaluate, EngineConfig, EvaluationOutput};

use super::load_params;

/// Arguments for a full appraisal run
#[derive(Args)]
pub struct EvaluateArgs {
    /// Path to a JSON or YAML parameter file (reads JSON from stdin if omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Emit headline indicators only instead of every statement
    #[arg(long, conflicts_with = "statement")]
    pub summary: bool,

    /// Emit the rows of one statement, for table or CSV output
    #[arg(long)]
    pub statement: Option<StatementKind>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatementKind {
    ProjectCashFlow,
    EquityCashFlow,
    Profit,
    Loan,
    Operating,
}

pub fn run_evaluate(
    args: EvaluateArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let params = load_params(args.input.as_deref())?;
    let output = evaluate(&params, config)?;

    if let Some(kind) = args.statement {
        return Ok(json!({
            "statement": statement_name(kind),
            "project_name": output.result.project_name,
            "results": statement_rows(kind, &output.result)?,
            "warnings": output.warnings,
        }));
    }

    if args.summary {
        let mut value = serde_json::to_value(&output)?;
        value["result"] = summarize(&output.result);
        return Ok(value);
    }

    Ok(serde_json::to_value(output)?)
}

fn statement_name(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::ProjectCashFlow => "project_cash_flow",
        StatementKind::EquityCashFlow => "equity_cash_flow",
        StatementKind::Profit => "profit",
        StatementKind::Loan => "loan",
        StatementKind::Operating => "operating",
    }
}

fn statement_rows(
    kind: StatementKind,
    result: &EvaluationOutput,
) -> Result<Value, serde_json::Error> {
    match kind {
        StatementKind::ProjectCashFlow => serde_json::to_value(&result.project_cash_flow.years),
        StatementKind::EquityCashFlow => serde_json::to_value(&result.equity_cash_flow.years),
        StatementKind::Profit => serde_json::to_value(&result.profit.years),
        StatementKind::Loan => serde_json::to_value(&result.loan.periods),
        StatementKind::Operating => serde_json::to_value(&result.operating.years),
    }
}

/// Headline figures with indicators rendered as plain strings, so sentinels
/// read as "never" or "not found" in table output.
fn summarize(result: &EvaluationOutput) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("project_name".into(), json!(result.project_name));
    for (name, indicator) in result.indicators.named() {
        map.insert(name.to_string(), json!(indicator.to_string()));
    }
    for (name, indicator) in result.equity_indicators.named() {
        map.insert(format!("equity_{name}"), json!(indicator.to_string()));
    }
    let p = &result.profitability;
    map.insert("total_investment".into(), json!(p.total_investment.to_string()));
    map.insert("total_net_profit".into(), json!(p.total_net_profit.to_string()));
    map.insert("average_net_profit".into(), json!(p.average_net_profit.to_string()));
    map.insert("total_income_tax".into(), json!(p.total_income_tax.to_string()));
    map.insert("return_on_investment".into(), json!(p.return_on_investment.to_string()));
    map.insert("debt_ratio".into(), json!(p.debt_ratio.to_string()));
    map.insert("total_loan_interest".into(), json!(result.loan.total_interest.to_string()));
    Value::Object(map)
}
