//! DSL compiler and the compiled evaluator.
//!
//! `compile` walks the declarative tree exactly once, producing one
//! executable node per DSL node. All structural failures surface here,
//! before the backtest loop processes a single bar: a compiled
//! `Evaluator` can only fail at runtime because a plugin misbehaved.
//!
//! Per leaf, the plugin is resolved once, its schema read once, and its
//! raw parameters normalized once; the frozen record (shared `Arc`,
//! never mutated) is what every future invocation observes — parameters
//! are not re-read from the tree on each bar. The evaluator retains no
//! reference to the input tree.
//!
//! Thread model: evaluators are `Send` but not `Sync` — the single-slot
//! leaf memo is unsynchronized, per the engine's single-threaded
//! contract. Concurrent runs compile separate evaluators; compilation is
//! cheap and side-effect-free, so that is the isolation boundary.

use std::cell::RefCell;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::context::{EvaluationContext, Role};
use crate::dsl::{CompositeOp, DslNode};
use crate::error::{CompileError, EvalError};
use crate::merge;
use crate::plugin::{PluginResolver, StrategyPlugin};
use crate::result::{ensure_rule_result, RuleResult, SignalInfo};
use crate::schema::{normalize, ParamRecord};

// ─── Compiled plan ───────────────────────────────────────────────────

/// Last-result cache for one leaf. The same leaf can appear under
/// multiple roles of one tree (e.g. as both an entry and an exit
/// condition), so within a single pass the backtest loop may ask the
/// same `(index, role)` question twice. Capacity is exactly one slot;
/// any mismatch invalidates it. An optimization, never a correctness
/// requirement.
#[derive(Debug, Clone)]
struct MemoSlot {
    index: usize,
    role: Role,
    result: RuleResult,
}

struct LeafNode {
    plugin_id: String,
    plugin: Arc<dyn StrategyPlugin>,
    params: Arc<ParamRecord>,
    memo: RefCell<Option<MemoSlot>>,
}

enum CompiledNode {
    Leaf(LeafNode),
    And(Vec<CompiledNode>),
    Or(Vec<CompiledNode>),
    Not(Box<CompiledNode>),
}

impl CompiledNode {
    fn evaluate(&self, ctx: &EvaluationContext) -> Result<RuleResult, EvalError> {
        match self {
            CompiledNode::Leaf(leaf) => leaf.evaluate(ctx),
            CompiledNode::And(children) => {
                // No short-circuiting: numeric-field merging needs every
                // child's result.
                let results = children
                    .iter()
                    .map(|child| child.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(merge::combine_and(&results))
            }
            CompiledNode::Or(children) => {
                let results = children
                    .iter()
                    .map(|child| child.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(merge::combine_or(&results))
            }
            CompiledNode::Not(child) => Ok(merge::combine_not(&child.evaluate(ctx)?)),
        }
    }

    /// Canonical JSON of the compiled plan, leaves carrying their frozen
    /// normalized parameters. Input to the evaluator fingerprint.
    fn canonical(&self) -> Value {
        match self {
            CompiledNode::Leaf(leaf) => {
                json!({ "plugin": leaf.plugin_id, "params": leaf.params.as_ref() })
            }
            CompiledNode::And(children) => {
                let children: Vec<Value> = children.iter().map(CompiledNode::canonical).collect();
                json!({ "op": "AND", "rules": children })
            }
            CompiledNode::Or(children) => {
                let children: Vec<Value> = children.iter().map(CompiledNode::canonical).collect();
                json!({ "op": "OR", "rules": children })
            }
            CompiledNode::Not(child) => json!({ "op": "NOT", "rule": child.canonical() }),
        }
    }
}

impl LeafNode {
    fn evaluate(&self, ctx: &EvaluationContext) -> Result<RuleResult, EvalError> {
        if let Some(slot) = self.memo.borrow().as_ref() {
            if slot.index == ctx.index && slot.role == ctx.role {
                return Ok(slot.result.clone());
            }
        }

        debug!(plugin = %self.plugin_id, role = %ctx.role, index = ctx.index, "leaf invocation");
        let raw = self.plugin.run(ctx, &self.params)?;
        let info = SignalInfo {
            plugin_id: &self.plugin_id,
            role: ctx.role,
            index: ctx.index,
        };
        let result = ensure_rule_result(&raw, &info)?;

        *self.memo.borrow_mut() = Some(MemoSlot {
            index: ctx.index,
            role: ctx.role,
            result: result.clone(),
        });
        Ok(result)
    }
}

// ─── Evaluator ───────────────────────────────────────────────────────

/// The compiled, executable form of a rule tree. Stateless per call
/// except for the single-slot leaf memo; call it once per bar, any
/// number of times, with no setup or teardown beyond `compile`.
pub struct Evaluator {
    root: CompiledNode,
    plugin_ids: Vec<String>,
    leaves: Vec<(String, Arc<ParamRecord>)>,
    fingerprint: String,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("plugin_ids", &self.plugin_ids)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl Evaluator {
    /// Evaluate one bar. Runtime failures (plugin error or contract
    /// violation) propagate uncaught; they abort the backtest run.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<RuleResult, EvalError> {
        self.root.evaluate(ctx)
    }

    /// Distinct plugin ids used by this tree, in first-seen order.
    pub fn used_plugin_ids(&self) -> &[String] {
        &self.plugin_ids
    }

    pub fn uses_plugin(&self, plugin_id: &str) -> bool {
        self.plugin_ids.iter().any(|id| id == plugin_id)
    }

    /// Frozen `(plugin id, normalized params)` per leaf, in compile
    /// order. The same plugin may appear more than once.
    pub fn leaf_params(&self) -> impl Iterator<Item = (&str, &ParamRecord)> {
        self.leaves
            .iter()
            .map(|(id, params)| (id.as_str(), params.as_ref()))
    }

    /// Normalized parameters of the first leaf using `plugin_id`.
    pub fn params_for(&self, plugin_id: &str) -> Option<&ParamRecord> {
        self.leaves
            .iter()
            .find(|(id, _)| id == plugin_id)
            .map(|(_, params)| params.as_ref())
    }

    /// Blake3 hex digest of the compiled structure plus every leaf's
    /// frozen parameters. Two evaluators with the same fingerprint make
    /// identical decisions; the external loop can key caches on it.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

// ─── compile ─────────────────────────────────────────────────────────

/// Compile a declarative rule tree into an executable evaluator.
///
/// One-shot synchronous recursive descent. Fails fast on structural
/// errors — composite with no children, blank or unresolvable plugin id,
/// parameters that violate the plugin's schema — so the backtest never
/// starts with a malformed tree.
pub fn compile(node: &DslNode, resolver: &dyn PluginResolver) -> Result<Evaluator, CompileError> {
    let mut state = CompileState::default();
    let root = compile_node(node, resolver, &mut state)?;
    let canonical = root.canonical();
    let fingerprint = blake3::hash(canonical.to_string().as_bytes())
        .to_hex()
        .to_string();
    debug!(
        plugins = state.plugin_ids.len(),
        leaves = state.leaves.len(),
        %fingerprint,
        "rule tree compiled",
    );
    Ok(Evaluator {
        root,
        plugin_ids: state.plugin_ids,
        leaves: state.leaves,
        fingerprint,
    })
}

#[derive(Default)]
struct CompileState {
    plugin_ids: Vec<String>,
    leaves: Vec<(String, Arc<ParamRecord>)>,
}

fn compile_node(
    node: &DslNode,
    resolver: &dyn PluginResolver,
    state: &mut CompileState,
) -> Result<CompiledNode, CompileError> {
    match node {
        DslNode::Leaf { plugin, params } => {
            let plugin_id = plugin.trim();
            if plugin_id.is_empty() {
                return Err(CompileError::BlankPluginId);
            }
            let plugin = resolver
                .resolve(plugin_id)
                .ok_or_else(|| CompileError::UnknownPlugin(plugin_id.to_string()))?;
            let record = normalize(&plugin.meta().params_schema, params.as_ref()).map_err(
                |source| CompileError::Schema {
                    plugin_id: plugin_id.to_string(),
                    source,
                },
            )?;
            let record = Arc::new(record);

            if !state.plugin_ids.iter().any(|id| id == plugin_id) {
                state.plugin_ids.push(plugin_id.to_string());
            }
            state.leaves.push((plugin_id.to_string(), record.clone()));

            Ok(CompiledNode::Leaf(LeafNode {
                plugin_id: plugin_id.to_string(),
                plugin,
                params: record,
                memo: RefCell::new(None),
            }))
        }
        DslNode::Composite { op, rules } => {
            if rules.is_empty() {
                return Err(CompileError::EmptyComposite { op: *op });
            }
            let children = rules
                .iter()
                .map(|rule| compile_node(rule, resolver, state))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match op {
                CompositeOp::And => CompiledNode::And(children),
                CompositeOp::Or => CompiledNode::Or(children),
            })
        }
        DslNode::Negation { rule } => Ok(CompiledNode::Not(Box::new(compile_node(
            rule, resolver, state,
        )?))),
    }
}
