//! RuleLab Core — rule composition engine for trading decisions.
//!
//! This crate contains the heart of the engine:
//! - Parameter schemas with defaulting, coercion, and clamping
//! - The canonical `RuleResult` contract every node produces
//! - A declarative AND/OR/NOT rule tree over strategy plugins
//! - A one-shot compiler producing a reusable `Evaluator`
//! - Minimum-over-providers merging for risk fields
//! - A plugin registry plus three reference plugins

pub mod compile;
pub mod context;
pub mod dsl;
pub mod error;
pub mod merge;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod result;
pub mod schema;

pub use compile::{compile, Evaluator};
pub use context::{ContextHelpers, EvaluationContext, Role, RuntimeWindow, SeriesSnapshot};
pub use dsl::{CompositeOp, DslNode};
pub use error::{CompileError, EvalError, PluginRuntimeError, SchemaError, ShapeError};
pub use plugin::{PluginMeta, PluginResolver, StrategyPlugin};
pub use registry::{PluginRegistry, RegistryError};
pub use result::{ensure_rule_result, RuleResult, SignalInfo};
pub use schema::{normalize, ParamDescriptor, ParamKind, ParamRecord, ParamSchema};
