//! Case variables as shown in the variables dialog.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A variable the dialog should list, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl VariableConfig {
    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRow {
    pub label: String,
    pub value: String,
}

/// Render a variable value for display; missing values show as `-`.
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) if s.is_empty() => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| render_value(Some(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(obj @ Value::Object(_)) => obj.to_string(),
    }
}

/// Rows for the dialog. Without a configured list every variable of the case
/// is shown under its own name.
pub fn variable_rows(config: &[VariableConfig], variables: &Map<String, Value>) -> Vec<VariableRow> {
    if config.is_empty() {
        return variables
            .iter()
            .map(|(name, value)| VariableRow {
                label: name.clone(),
                value: render_value(Some(value)),
            })
            .collect();
    }

    config
        .iter()
        .map(|var| VariableRow {
            label: var.display_label().to_string(),
            value: render_value(variables.get(&var.name)),
        })
        .collect()
}
