//! Rate-of-change momentum.
//!
//! Compares the close to the close `period` bars earlier. Rate of change
//! above `threshold_pct` is bullish (`enter`/`cover`); below the negated
//! threshold is bearish (`exit`/`short`). Silent until the lookback bar
//! exists and both closes are non-null.

use serde_json::{json, Value};

use crate::context::EvaluationContext;
use crate::error::PluginRuntimeError;
use crate::plugin::{PluginMeta, StrategyPlugin};
use crate::schema::{ParamDescriptor, ParamRecord, ParamSchema};

use super::{param_f64, param_usize};

pub struct Momentum {
    meta: PluginMeta,
}

impl Momentum {
    pub fn new() -> Self {
        let schema = ParamSchema::new()
            .with("period", ParamDescriptor::integer(12).with_range(1.0, 365.0))
            .with("threshold_pct", ParamDescriptor::number(0.0).with_range(0.0, 100.0));
        Self {
            meta: PluginMeta::new("momentum", "Rate of Change", schema),
        }
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyPlugin for Momentum {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn run(
        &self,
        ctx: &EvaluationContext,
        params: &ParamRecord,
    ) -> Result<Value, PluginRuntimeError> {
        let period = param_usize(params, "period").ok_or_else(|| {
            PluginRuntimeError::at("momentum", ctx.role, ctx.index, "missing `period` parameter")
        })?;
        let threshold_pct = param_f64(params, "threshold_pct").unwrap_or(0.0);

        if ctx.index < period {
            return Ok(json!({ "meta": { "plugin": "momentum", "state": "warmup" } }));
        }
        let (Some(now), Some(then)) = (
            ctx.series.close_at(ctx.index),
            ctx.series.close_at(ctx.index - period),
        ) else {
            return Ok(json!({ "meta": { "plugin": "momentum", "state": "warmup" } }));
        };
        if then == 0.0 {
            return Ok(json!({ "meta": { "plugin": "momentum", "state": "zero base" } }));
        }

        let roc_pct = (now / then - 1.0) * 100.0;
        let bullish = roc_pct > threshold_pct;
        let bearish = roc_pct < -threshold_pct;

        Ok(json!({
            "enter": bullish,
            "cover": bullish,
            "exit": bearish,
            "short": bearish,
            "meta": {
                "plugin": "momentum",
                "rocPct": roc_pct,
                "thresholdPct": threshold_pct,
            },
        }))
    }
}
