//! Reference plugins.
//!
//! Three small, self-contained strategies that double as the engine's
//! executable documentation: every part of the plugin contract — schema
//! declaration, defaulted and required parameters, role-aware output,
//! risk fields, structured meta — is exercised by at least one of them.
//!
//! - [`MaCross`]: moving-average crossover (golden/death cross).
//! - [`PriceThreshold`]: close above/below a fixed level, with an
//!   optional stop-loss attachment.
//! - [`Momentum`]: n-bar rate-of-change against a threshold.

mod ma_cross;
mod momentum;
mod price_threshold;

use std::sync::Arc;

use serde_json::Value;

pub use ma_cross::MaCross;
pub use momentum::Momentum;
pub use price_threshold::PriceThreshold;

use crate::plugin::StrategyPlugin;
use crate::schema::ParamRecord;

/// Every plugin shipped with the engine, ready for registration.
pub fn builtins() -> Vec<Arc<dyn StrategyPlugin>> {
    vec![
        Arc::new(MaCross::new()),
        Arc::new(PriceThreshold::new()),
        Arc::new(Momentum::new()),
    ]
}

// Normalized records hold exactly what the schema declared, so these
// lookups only miss for optional parameters without defaults.

pub(crate) fn param_usize(params: &ParamRecord, name: &str) -> Option<usize> {
    params
        .get(name)
        .and_then(Value::as_i64)
        .and_then(|v| usize::try_from(v).ok())
}

pub(crate) fn param_f64(params: &ParamRecord, name: &str) -> Option<f64> {
    params.get(name).and_then(Value::as_f64)
}

pub(crate) fn param_str<'a>(params: &'a ParamRecord, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

/// Simple moving average of the closes ending at `index` (inclusive).
/// `None` when the window extends past the start of the series or any
/// cell inside it is null.
pub(crate) fn sma(series: &crate::context::SeriesSnapshot, index: usize, window: usize) -> Option<f64> {
    if window == 0 || index + 1 < window {
        return None;
    }
    let start = index + 1 - window;
    let mut sum = 0.0;
    for i in start..=index {
        sum += series.close_at(i)?;
    }
    Some(sum / window as f64)
}
