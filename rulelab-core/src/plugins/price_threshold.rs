//! Fixed price level.
//!
//! Fires the boolean for the decision being asked whenever the close is
//! above (or below, per `mode`) the configured level. `threshold` is
//! required and has no default — there is no sensible universal price
//! level, so a tree that omits it fails at compile time. The optional
//! `stop_loss` attaches a `stopLossPercent` to every fired signal.

use serde_json::{json, Map, Value};

use crate::context::{EvaluationContext, Role};
use crate::error::PluginRuntimeError;
use crate::plugin::{PluginMeta, StrategyPlugin};
use crate::schema::{ParamDescriptor, ParamKind, ParamRecord, ParamSchema};

use super::{param_f64, param_str};

pub struct PriceThreshold {
    meta: PluginMeta,
}

impl PriceThreshold {
    pub fn new() -> Self {
        let schema = ParamSchema::new()
            .with("threshold", ParamDescriptor::new(ParamKind::Number))
            .with(
                "mode",
                ParamDescriptor::enumeration(["above", "below"], "above"),
            )
            .with(
                "stop_loss",
                ParamDescriptor::new(ParamKind::Number).with_range(0.0, 100.0),
            )
            .require("threshold");
        Self {
            meta: PluginMeta::new("price_threshold", "Price Threshold", schema),
        }
    }
}

impl Default for PriceThreshold {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyPlugin for PriceThreshold {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn run(
        &self,
        ctx: &EvaluationContext,
        params: &ParamRecord,
    ) -> Result<Value, PluginRuntimeError> {
        let threshold = param_f64(params, "threshold").ok_or_else(|| {
            PluginRuntimeError::at(
                "price_threshold",
                ctx.role,
                ctx.index,
                "missing `threshold` parameter",
            )
        })?;
        let mode = param_str(params, "mode").unwrap_or("above");

        let Some(close) = ctx.series.close_at(ctx.index) else {
            return Ok(json!({ "meta": { "plugin": "price_threshold", "state": "no quote" } }));
        };

        let holds = match mode {
            "below" => close < threshold,
            _ => close > threshold,
        };

        let field = match ctx.role {
            Role::LongEntry => "enter",
            Role::LongExit => "exit",
            Role::ShortEntry => "short",
            Role::ShortExit => "cover",
        };

        let mut record = Map::new();
        record.insert(field.to_string(), Value::Bool(holds));
        if holds {
            if let Some(stop_loss) = param_f64(params, "stop_loss") {
                record.insert("stopLossPercent".to_string(), Value::from(stop_loss));
            }
        }
        record.insert(
            "meta".to_string(),
            json!({
                "plugin": "price_threshold",
                "close": close,
                "threshold": threshold,
                "mode": mode,
            }),
        );
        Ok(Value::Object(record))
    }
}
