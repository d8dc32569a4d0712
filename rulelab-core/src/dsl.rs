//! Declarative rule tree.
//!
//! The serializable description of a composite rule, authored by a UI or
//! persisted as JSON. Canonical wire shapes:
//!
//! - leaf:      `{ "plugin": "<id>", "params": { ... } }`
//! - composite: `{ "op": "AND" | "OR", "rules": [node, ...] }`
//! - negation:  `{ "op": "NOT", "rule": node }`
//!
//! A strict tree by construction: children are owned (`Vec`/`Box`), so no
//! shared node identity and no back-references can be expressed.
//! `from_value` is the single parsing path and reports structural
//! problems in the `CompileError` taxonomy; serialization always emits
//! the canonical shape, so round-tripping is lossless for every field
//! the schema recognizes (`NOT` also accepts a single-element `rules`
//! array on input, as older persisted trees used that spelling).

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::CompileError;

/// Combinator operator for composite nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl CompositeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeOp::And => "AND",
            CompositeOp::Or => "OR",
        }
    }
}

impl fmt::Display for CompositeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the declarative rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DslNode {
    /// Delegates to an external strategy plugin with raw parameters.
    Leaf {
        plugin: String,
        params: Option<Map<String, Value>>,
    },
    /// AND/OR over one or more children.
    Composite {
        op: CompositeOp,
        rules: Vec<DslNode>,
    },
    /// Boolean inversion of a single child.
    Negation { rule: Box<DslNode> },
}

impl DslNode {
    pub fn leaf(plugin: &str) -> Self {
        DslNode::Leaf {
            plugin: plugin.to_string(),
            params: None,
        }
    }

    pub fn leaf_with(plugin: &str, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => Some(map),
            _ => None,
        };
        DslNode::Leaf {
            plugin: plugin.to_string(),
            params,
        }
    }

    pub fn and(rules: Vec<DslNode>) -> Self {
        DslNode::Composite {
            op: CompositeOp::And,
            rules,
        }
    }

    pub fn or(rules: Vec<DslNode>) -> Self {
        DslNode::Composite {
            op: CompositeOp::Or,
            rules,
        }
    }

    pub fn not(rule: DslNode) -> Self {
        DslNode::Negation {
            rule: Box::new(rule),
        }
    }

    /// Parse a JSON value into a rule tree, validating structure.
    pub fn from_value(value: &Value) -> Result<Self, CompileError> {
        let record = value.as_object().ok_or(CompileError::NotAnObject)?;

        if let Some(plugin) = record.get("plugin") {
            let plugin = plugin
                .as_str()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(CompileError::BlankPluginId)?;
            let params = match record.get("params") {
                None | Some(Value::Null) => None,
                Some(Value::Object(map)) => Some(map.clone()),
                Some(_) => return Err(CompileError::BadParams(plugin.to_string())),
            };
            return Ok(DslNode::Leaf {
                plugin: plugin.to_string(),
                params,
            });
        }

        let op = match record.get("op") {
            Some(Value::String(op)) => op.trim().to_ascii_uppercase(),
            _ => return Err(CompileError::MissingTag),
        };

        match op.as_str() {
            "NOT" => {
                let child = record.get("rule").or_else(|| {
                    record
                        .get("rules")
                        .and_then(Value::as_array)
                        .and_then(|rules| rules.first())
                });
                let child = child.ok_or(CompileError::MissingNegationChild)?;
                Ok(DslNode::not(DslNode::from_value(child)?))
            }
            "AND" | "OR" => {
                let op = if op == "AND" {
                    CompositeOp::And
                } else {
                    CompositeOp::Or
                };
                let rules = record
                    .get("rules")
                    .and_then(Value::as_array)
                    .filter(|rules| !rules.is_empty())
                    .ok_or(CompileError::EmptyComposite { op })?;
                let rules = rules
                    .iter()
                    .map(DslNode::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DslNode::Composite { op, rules })
            }
            other => Err(CompileError::UnknownOperator(other.to_string())),
        }
    }

    /// Parse a JSON string into a rule tree.
    pub fn from_json_str(text: &str) -> Result<Self, CompileError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| CompileError::Json(err.to_string()))?;
        Self::from_value(&value)
    }

    /// The canonical JSON shape of this tree.
    pub fn to_value(&self) -> Value {
        match self {
            DslNode::Leaf { plugin, params } => match params {
                Some(params) => json!({ "plugin": plugin, "params": params }),
                None => json!({ "plugin": plugin }),
            },
            DslNode::Composite { op, rules } => {
                let rules: Vec<Value> = rules.iter().map(DslNode::to_value).collect();
                json!({ "op": op.as_str(), "rules": rules })
            }
            DslNode::Negation { rule } => json!({ "op": "NOT", "rule": rule.to_value() }),
        }
    }
}

impl Serialize for DslNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DslNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DslNode::from_value(&value).map_err(D::Error::custom)
    }
}
