//! Moving-average crossover.
//!
//! Golden cross (short SMA crossing above the long) is the bullish
//! signal: `enter` and `cover`. Death cross is the bearish one: `exit`
//! and `short`. Needs `long + 1` bars of non-null closes; before that it
//! stays silent.

use serde_json::{json, Value};

use crate::context::EvaluationContext;
use crate::error::PluginRuntimeError;
use crate::plugin::{PluginMeta, StrategyPlugin};
use crate::schema::{ParamDescriptor, ParamRecord, ParamSchema};

use super::{param_usize, sma};

pub struct MaCross {
    meta: PluginMeta,
}

impl MaCross {
    pub fn new() -> Self {
        let schema = ParamSchema::new()
            .with("short", ParamDescriptor::integer(5).with_range(1.0, 240.0))
            .with("long", ParamDescriptor::integer(20).with_range(1.0, 480.0));
        Self {
            meta: PluginMeta::new("ma_cross", "Moving Average Crossover", schema),
        }
    }
}

impl Default for MaCross {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyPlugin for MaCross {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn run(
        &self,
        ctx: &EvaluationContext,
        params: &ParamRecord,
    ) -> Result<Value, PluginRuntimeError> {
        let short = param_usize(params, "short").ok_or_else(|| {
            PluginRuntimeError::at("ma_cross", ctx.role, ctx.index, "missing `short` parameter")
        })?;
        let long = param_usize(params, "long").ok_or_else(|| {
            PluginRuntimeError::at("ma_cross", ctx.role, ctx.index, "missing `long` parameter")
        })?;

        // Crossing needs the previous bar; silent until both windows fill.
        if ctx.index == 0 {
            return Ok(json!({ "meta": { "plugin": "ma_cross", "state": "warmup" } }));
        }
        let (Some(short_now), Some(long_now), Some(short_prev), Some(long_prev)) = (
            sma(ctx.series, ctx.index, short),
            sma(ctx.series, ctx.index, long),
            sma(ctx.series, ctx.index - 1, short),
            sma(ctx.series, ctx.index - 1, long),
        ) else {
            return Ok(json!({ "meta": { "plugin": "ma_cross", "state": "warmup" } }));
        };

        let golden = short_prev <= long_prev && short_now > long_now;
        let death = short_prev >= long_prev && short_now < long_now;

        Ok(json!({
            "enter": golden,
            "cover": golden,
            "exit": death,
            "short": death,
            "meta": {
                "plugin": "ma_cross",
                "short": short_now,
                "long": long_now,
                "cross": if golden { "golden" } else if death { "death" } else { "none" },
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NullHelpers, Role, SeriesSnapshot};
    use crate::result::{ensure_rule_result, SignalInfo};
    use crate::schema::normalize;

    fn run_at(closes: &[f64], index: usize) -> crate::result::RuleResult {
        let plugin = MaCross::new();
        let params = normalize(
            &plugin.meta().params_schema,
            Some(&serde_json::from_value(json!({"short": 2, "long": 3})).unwrap()),
        )
        .unwrap();
        let series = SeriesSnapshot::from_closes(closes);
        let helpers = NullHelpers;
        let ctx = EvaluationContext::new(Role::LongEntry, index, &series, &helpers);
        let raw = plugin.run(&ctx, &params).unwrap();
        let info = SignalInfo {
            plugin_id: "ma_cross",
            role: Role::LongEntry,
            index,
        };
        ensure_rule_result(&raw, &info).unwrap()
    }

    #[test]
    fn silent_during_warmup() {
        let result = run_at(&[1.0, 2.0, 3.0, 4.0], 1);
        assert!(!result.any_signal());
    }

    #[test]
    fn golden_cross_enters() {
        // Downtrend then a sharp rally: short SMA crosses above the long.
        let closes = [10.0, 9.0, 8.0, 7.0, 6.0, 14.0];
        let result = run_at(&closes, 5);
        assert!(result.enter);
        assert!(result.cover);
        assert!(!result.exit);
        assert_eq!(result.meta["cross"], json!("golden"));
    }

    #[test]
    fn death_cross_exits() {
        // Uptrend then a sharp drop: short SMA crosses below the long.
        let closes = [7.0, 8.0, 9.0, 10.0, 11.0, 3.0];
        let result = run_at(&closes, 5);
        assert!(result.exit);
        assert!(result.short);
        assert!(!result.enter);
        assert_eq!(result.meta["cross"], json!("death"));
    }

    #[test]
    fn flat_series_stays_silent() {
        let result = run_at(&[5.0, 5.0, 5.0, 5.0, 5.0], 4);
        assert!(!result.any_signal());
        assert_eq!(result.meta["cross"], json!("none"));
    }
}
