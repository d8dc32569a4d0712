//! The canonical `RuleResult` contract.
//!
//! Every leaf plugin and every composite node produces this shape, fresh
//! on every evaluator invocation. `ensure_rule_result` is the single
//! choke point that raw plugin output passes through: the four signal
//! booleans are `true` only when the plugin said exactly `true` (plugins
//! must be explicit — truthy non-booleans normalize to `false`), risk
//! percentages must be finite and non-negative, and `meta` is deep-copied
//! so the result never aliases a plugin's internal state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Role;
use crate::error::ShapeError;

/// Evaluation site tag attached to contract violations.
#[derive(Debug, Clone, Copy)]
pub struct SignalInfo<'a> {
    pub plugin_id: &'a str,
    pub role: Role,
    pub index: usize,
}

/// The four-boolean-plus-risk-fields decision produced by every node.
/// Immutable value type: construct, merge, never mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub enter: bool,
    pub exit: bool,
    pub short: bool,
    pub cover: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_percent: Option<f64>,
    #[serde(default = "empty_meta")]
    pub meta: Value,
}

fn empty_meta() -> Value {
    Value::Object(Map::new())
}

impl Default for RuleResult {
    fn default() -> Self {
        Self {
            enter: false,
            exit: false,
            short: false,
            cover: false,
            stop_loss_percent: None,
            take_profit_percent: None,
            meta: empty_meta(),
        }
    }
}

impl RuleResult {
    /// All-false result with empty meta.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result with the boolean matching `role` set to `value` — the shim
    /// shape for plugins that answer a single yes/no question per role.
    pub fn for_role(role: Role, value: bool) -> Self {
        let mut result = Self::empty();
        match role {
            Role::LongEntry => result.enter = value,
            Role::LongExit => result.exit = value,
            Role::ShortEntry => result.short = value,
            Role::ShortExit => result.cover = value,
        }
        result
    }

    /// The boolean field corresponding to `role`.
    pub fn signal_for(&self, role: Role) -> bool {
        match role {
            Role::LongEntry => self.enter,
            Role::LongExit => self.exit,
            Role::ShortEntry => self.short,
            Role::ShortExit => self.cover,
        }
    }

    /// True if any of the four signal booleans fired.
    pub fn any_signal(&self) -> bool {
        self.enter || self.exit || self.short || self.cover
    }
}

/// Validate and coerce a raw plugin output into the canonical shape.
pub fn ensure_rule_result(raw: &Value, info: &SignalInfo) -> Result<RuleResult, ShapeError> {
    let record = raw
        .as_object()
        .ok_or_else(|| shape_error(info, "result must be a JSON object"))?;

    let mut result = RuleResult {
        enter: record.get("enter") == Some(&Value::Bool(true)),
        exit: record.get("exit") == Some(&Value::Bool(true)),
        short: record.get("short") == Some(&Value::Bool(true)),
        cover: record.get("cover") == Some(&Value::Bool(true)),
        ..RuleResult::empty()
    };

    result.stop_loss_percent = risk_percent(record, "stopLossPercent", info)?;
    result.take_profit_percent = risk_percent(record, "takeProfitPercent", info)?;

    if let Some(meta) = record.get("meta") {
        match meta {
            Value::Null => {}
            Value::Object(_) | Value::Array(_) => result.meta = meta.clone(),
            _ => return Err(shape_error(info, "meta must be an object or array")),
        }
    }

    Ok(result)
}

/// Parse an optional risk percentage: absent/null normalize to absent;
/// anything else must be a finite number >= 0.
fn risk_percent(
    record: &Map<String, Value>,
    field: &'static str,
    info: &SignalInfo,
) -> Result<Option<f64>, ShapeError> {
    let value = match record.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err(shape_error_owned(
            info,
            format!("{field} must be a finite number >= 0 or null"),
        )),
    }
}

fn shape_error(info: &SignalInfo, reason: &str) -> ShapeError {
    shape_error_owned(info, reason.to_string())
}

fn shape_error_owned(info: &SignalInfo, reason: String) -> ShapeError {
    ShapeError {
        plugin_id: info.plugin_id.to_string(),
        role: info.role,
        index: info.index,
        reason,
    }
}
