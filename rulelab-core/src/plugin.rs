//! Strategy plugin boundary.
//!
//! A plugin is an external collaborator: the engine resolves it by id at
//! compile time through an injected `PluginResolver`, normalizes its raw
//! parameters against the schema it declares, and passes its raw output
//! through the `RuleResult` contract. The engine never mutates a plugin
//! or its metadata.

use std::sync::Arc;

use serde_json::Value;

use crate::context::EvaluationContext;
use crate::error::PluginRuntimeError;
use crate::schema::{ParamRecord, ParamSchema};

/// Plugin identity and declared parameter constraints. Authored once,
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct PluginMeta {
    /// Unique identifier — cache and diagnostics key.
    pub id: String,
    /// Human-readable display name.
    pub label: String,
    pub params_schema: ParamSchema,
}

impl PluginMeta {
    pub fn new(id: &str, label: &str, params_schema: ParamSchema) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            params_schema,
        }
    }
}

/// An executable strategy rule. `run` receives the per-bar context and
/// the frozen, normalized parameter record captured at compile time, and
/// returns a raw JSON result that the contract validates.
pub trait StrategyPlugin: Send + Sync {
    fn meta(&self) -> &PluginMeta;

    fn run(
        &self,
        ctx: &EvaluationContext,
        params: &ParamRecord,
    ) -> Result<Value, PluginRuntimeError>;
}

/// Injected capability for mapping a plugin id to its implementation.
/// The compiler never reaches for an ambient/global lookup.
pub trait PluginResolver {
    fn resolve(&self, plugin_id: &str) -> Option<Arc<dyn StrategyPlugin>>;
}
