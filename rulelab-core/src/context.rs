//! Evaluation context — everything the backtest loop hands the engine
//! for one bar.
//!
//! - `Role`: which of the four trading decisions this pass is for.
//! - `SeriesSnapshot`: columnar, read-only OHLCV slice (nulls allowed).
//! - `RuntimeWindow`: warmup/effective window bounds.
//! - `ContextHelpers`: capability set for indicator lookup, diagnostics,
//!   and plugin-local caching. Plugins never reach for globals.
//! - `EvaluationContext`: the per-bar bundle, supplied fresh every call
//!   and never retained by the engine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Role ────────────────────────────────────────────────────────────

/// Which of the four trading decisions a given evaluation pass serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    LongEntry,
    LongExit,
    ShortEntry,
    ShortExit,
}

impl Role {
    /// All roles, in the order the backtest loop evaluates them.
    pub fn all() -> &'static [Role] {
        &[
            Role::LongEntry,
            Role::LongExit,
            Role::ShortEntry,
            Role::ShortExit,
        ]
    }

    /// The wire name used in persisted trees and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::LongEntry => "longEntry",
            Role::LongExit => "longExit",
            Role::ShortEntry => "shortEntry",
            Role::ShortExit => "shortExit",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── SeriesSnapshot ──────────────────────────────────────────────────

/// Read-only columnar OHLCV slice. Individual cells may be null
/// (missing quotes inside the warmup window are normal).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub dates: Vec<NaiveDate>,
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub volume: Vec<Option<f64>>,
}

impl SeriesSnapshot {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn open_at(&self, index: usize) -> Option<f64> {
        self.open.get(index).copied().flatten()
    }

    pub fn high_at(&self, index: usize) -> Option<f64> {
        self.high.get(index).copied().flatten()
    }

    pub fn low_at(&self, index: usize) -> Option<f64> {
        self.low.get(index).copied().flatten()
    }

    pub fn close_at(&self, index: usize) -> Option<f64> {
        self.close.get(index).copied().flatten()
    }

    /// Build a snapshot from close prices alone. Open/high/low mirror the
    /// close and volume is null — enough for close-driven plugins and tests.
    pub fn from_closes(closes: &[f64]) -> Self {
        let col: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Self {
            dates: (0..closes.len())
                .map(|i| start + chrono::Days::new(i as u64))
                .collect(),
            open: col.clone(),
            high: col.clone(),
            low: col.clone(),
            close: col,
            volume: vec![None; closes.len()],
        }
    }
}

// ─── RuntimeWindow ───────────────────────────────────────────────────

/// Warmup/effective window bounds supplied by the backtest loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeWindow {
    pub warmup_start: usize,
    pub effective_start: usize,
    pub length: usize,
}

impl RuntimeWindow {
    /// Window covering a whole series with no warmup offset.
    pub fn whole(length: usize) -> Self {
        Self {
            warmup_start: 0,
            effective_start: 0,
            length,
        }
    }
}

// ─── ContextHelpers ──────────────────────────────────────────────────

/// Capability set handed to plugins: shared indicator lookup, namespaced
/// diagnostics, and a plugin-local cache. The engine itself holds no
/// mutable state beyond the evaluator's single-slot leaf memo — any
/// cross-bar plugin state flows through this trait.
pub trait ContextHelpers {
    /// Look up a precomputed shared indicator column by key.
    fn indicator(&self, key: &str) -> Option<&[Option<f64>]>;

    /// Emit a diagnostic message in the plugin's namespace.
    fn log(&self, message: &str, details: Option<&Value>);

    fn cache_get(&self, key: &str) -> Option<Value>;

    fn cache_set(&self, key: &str, value: Value);
}

/// No-op helpers: no indicators, no cache, diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHelpers;

impl ContextHelpers for NullHelpers {
    fn indicator(&self, _key: &str) -> Option<&[Option<f64>]> {
        None
    }

    fn log(&self, message: &str, details: Option<&Value>) {
        match details {
            Some(details) => tracing::debug!(%details, "{message}"),
            None => tracing::debug!("{message}"),
        }
    }

    fn cache_get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn cache_set(&self, _key: &str, _value: Value) {}
}

/// In-memory helpers for a single-threaded evaluation session: registered
/// indicator columns plus an interior-mutable cache for stateful plugins.
#[derive(Debug, Default)]
pub struct MemoryHelpers {
    indicators: HashMap<String, Vec<Option<f64>>>,
    cache: RefCell<HashMap<String, Value>>,
}

impl MemoryHelpers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared indicator column under `key`.
    pub fn insert_indicator(&mut self, key: impl Into<String>, column: Vec<Option<f64>>) {
        self.indicators.insert(key.into(), column);
    }
}

impl ContextHelpers for MemoryHelpers {
    fn indicator(&self, key: &str) -> Option<&[Option<f64>]> {
        self.indicators.get(key).map(Vec::as_slice)
    }

    fn log(&self, message: &str, details: Option<&Value>) {
        match details {
            Some(details) => tracing::debug!(%details, "{message}"),
            None => tracing::debug!("{message}"),
        }
    }

    fn cache_get(&self, key: &str) -> Option<Value> {
        self.cache.borrow().get(key).cloned()
    }

    fn cache_set(&self, key: &str, value: Value) {
        self.cache.borrow_mut().insert(key.to_string(), value);
    }
}

// ─── EvaluationContext ───────────────────────────────────────────────

/// The per-bar bundle supplied by the backtest loop. Not owned by the
/// engine; a fresh one arrives on every evaluator call.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub role: Role,
    pub index: usize,
    pub series: &'a SeriesSnapshot,
    pub helpers: &'a dyn ContextHelpers,
    pub runtime: RuntimeWindow,
}

impl<'a> EvaluationContext<'a> {
    /// Context covering the whole series with no warmup offset.
    pub fn new(
        role: Role,
        index: usize,
        series: &'a SeriesSnapshot,
        helpers: &'a dyn ContextHelpers,
    ) -> Self {
        Self {
            role,
            index,
            series,
            helpers,
            runtime: RuntimeWindow::whole(series.len()),
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeWindow) -> Self {
        self.runtime = runtime;
        self
    }
}

impl fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("role", &self.role)
            .field("index", &self.index)
            .field("series_len", &self.series.len())
            .field("runtime", &self.runtime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_wire_names() {
        assert_eq!(Role::LongEntry.as_str(), "longEntry");
        assert_eq!(Role::ShortExit.as_str(), "shortExit");
        assert_eq!(
            serde_json::to_value(Role::LongExit).unwrap(),
            json!("longExit")
        );
        assert_eq!(
            serde_json::from_value::<Role>(json!("shortEntry")).unwrap(),
            Role::ShortEntry
        );
    }

    #[test]
    fn role_all_covers_four_decisions() {
        assert_eq!(Role::all().len(), 4);
    }

    #[test]
    fn snapshot_from_closes() {
        let series = SeriesSnapshot::from_closes(&[100.0, 101.0, 102.0]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.close_at(1), Some(101.0));
        assert_eq!(series.close_at(99), None);
        assert!(series.volume.iter().all(Option::is_none));
    }

    #[test]
    fn snapshot_null_cells_read_as_none() {
        let mut series = SeriesSnapshot::from_closes(&[100.0, 101.0]);
        series.close[0] = None;
        assert_eq!(series.close_at(0), None);
        assert_eq!(series.close_at(1), Some(101.0));
    }

    #[test]
    fn memory_helpers_cache_round_trip() {
        let helpers = MemoryHelpers::new();
        assert_eq!(helpers.cache_get("k"), None);
        helpers.cache_set("k", json!({"state": 1}));
        assert_eq!(helpers.cache_get("k"), Some(json!({"state": 1})));
    }

    #[test]
    fn memory_helpers_indicator_lookup() {
        let mut helpers = MemoryHelpers::new();
        helpers.insert_indicator("sma_20", vec![None, Some(100.5)]);
        assert_eq!(helpers.indicator("sma_20").unwrap()[1], Some(100.5));
        assert!(helpers.indicator("missing").is_none());
    }

    #[test]
    fn context_defaults_to_whole_window() {
        let series = SeriesSnapshot::from_closes(&[1.0, 2.0]);
        let helpers = NullHelpers;
        let ctx = EvaluationContext::new(Role::LongEntry, 1, &series, &helpers);
        assert_eq!(ctx.runtime, RuntimeWindow::whole(2));
    }
}
