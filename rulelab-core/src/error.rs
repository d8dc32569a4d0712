//! Error taxonomy for the rule composition engine.
//!
//! - `SchemaError`: a parameter cannot be normalized even with fallback.
//! - `ShapeError`: a plugin's raw output does not conform to `RuleResult`.
//! - `CompileError`: structurally invalid rule tree — surfaced before any
//!   evaluation; no partial compiled tree is usable.
//! - `PluginRuntimeError`: the plugin's own executable failed.
//! - `EvalError`: runtime umbrella surfaced by `Evaluator::evaluate`.
//!
//! Compile-time errors abort tree construction entirely. Runtime errors
//! abort the evaluation call and propagate uncaught — they are never
//! downgraded to a "no signal" result, because that would make a failure
//! indistinguishable from a legitimate bearish/neutral outcome.

use crate::context::Role;
use crate::dsl::CompositeOp;

/// A parameter that cannot be coerced even with fallback, or a schema
/// requirement that the merged record violates. Always names the field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("required parameter `{name}` is missing and has no default")]
    MissingRequired { name: String },

    #[error("parameter `{name}` expected {expected}")]
    WrongShape { name: String, expected: &'static str },

    #[error("enum parameter `{name}` declares no values and no default")]
    EmptyEnum { name: String },
}

/// A plugin's raw output does not conform to the `RuleResult` contract.
/// Carries the originating plugin, role, and bar index for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("plugin `{plugin_id}` returned a malformed result at bar {index} ({role}): {reason}")]
pub struct ShapeError {
    pub plugin_id: String,
    pub role: Role,
    pub index: usize,
    pub reason: String,
}

/// Structurally invalid rule tree. All variants surface synchronously
/// from `compile()` (or from parsing the JSON tree shape).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("rule node must be a JSON object")]
    NotAnObject,

    #[error("rule node needs either `op` or `plugin`")]
    MissingTag,

    #[error("unsupported operator `{0}`")]
    UnknownOperator(String),

    #[error("{op} node requires at least one child rule")]
    EmptyComposite { op: CompositeOp },

    #[error("NOT node requires a child rule")]
    MissingNegationChild,

    #[error("leaf node has a blank plugin id")]
    BlankPluginId,

    #[error("`params` for plugin `{0}` must be a JSON object")]
    BadParams(String),

    #[error("unknown plugin `{0}`")]
    UnknownPlugin(String),

    #[error("plugin `{plugin_id}`: {source}")]
    Schema {
        plugin_id: String,
        #[source]
        source: SchemaError,
    },

    #[error("rule definition is not valid JSON: {0}")]
    Json(String),
}

/// The plugin's own executable failed while evaluating one bar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("plugin `{plugin_id}` failed at bar {index} ({role}): {message}")]
pub struct PluginRuntimeError {
    pub plugin_id: String,
    pub role: Role,
    pub index: usize,
    pub message: String,
}

impl PluginRuntimeError {
    /// Tag a plugin failure with the evaluation site it occurred at.
    pub fn at(plugin_id: impl Into<String>, role: Role, index: usize, message: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            role,
            index,
            message: message.into(),
        }
    }
}

/// Runtime failure surfaced by an `Evaluator` call. Aborts the backtest
/// run; the surrounding loop decides how to report it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Plugin(#[from] PluginRuntimeError),
}
