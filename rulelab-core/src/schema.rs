//! Parameter schemas and the normalization pass.
//!
//! Every plugin declares a `ParamSchema` once; `normalize` runs once per
//! leaf at compile time (and on every parameter edit in an authoring UI),
//! producing a fully-defaulted, type-coerced, range-clamped record. It is
//! a total function over well-formed schemas: malformed raw input either
//! falls back (enum/number defaults) or fails with a `SchemaError` naming
//! the offending field (structured shapes, missing required parameters).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaError;

/// A normalized, fully-defaulted parameter record. `BTreeMap` keeps the
/// ordering deterministic for serialization and fingerprinting.
pub type ParamRecord = BTreeMap<String, Value>;

// ─── Descriptors ─────────────────────────────────────────────────────

/// Value kind a parameter descriptor coerces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Number,
    Integer,
    Boolean,
    String,
    Enum,
    Array,
    Object,
}

/// Declarative constraints for one parameter. At most one of
/// `enum_values` or the numeric-range fields is meaningful per descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl ParamDescriptor {
    pub fn new(kind: ParamKind) -> Self {
        Self {
            kind,
            default: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            multiple_of: None,
            enum_values: Vec::new(),
        }
    }

    pub fn integer(default: i64) -> Self {
        Self::new(ParamKind::Integer).with_default(Value::from(default))
    }

    pub fn number(default: f64) -> Self {
        Self::new(ParamKind::Number).with_default(Value::from(default))
    }

    pub fn boolean(default: bool) -> Self {
        Self::new(ParamKind::Boolean).with_default(Value::from(default))
    }

    pub fn string(default: &str) -> Self {
        Self::new(ParamKind::String).with_default(Value::from(default))
    }

    pub fn enumeration<I, S>(values: I, default: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut descriptor = Self::new(ParamKind::Enum).with_default(Value::from(default));
        descriptor.enum_values = values.into_iter().map(Into::into).collect();
        descriptor
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn with_multiple_of(mut self, step: f64) -> Self {
        self.multiple_of = Some(step);
        self
    }
}

/// Declarative parameter schema: named descriptors, required names, and
/// whether undeclared keys survive normalization. Authored once per
/// plugin, immutable thereafter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, ParamDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required: BTreeSet<String>,
    #[serde(default)]
    pub allow_additional: bool,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, descriptor: ParamDescriptor) -> Self {
        self.properties.insert(name.to_string(), descriptor);
        self
    }

    pub fn require(mut self, name: &str) -> Self {
        self.required.insert(name.to_string());
        self
    }

    pub fn allow_additional(mut self) -> Self {
        self.allow_additional = true;
        self
    }
}

// ─── Normalization ───────────────────────────────────────────────────

/// Normalize a raw parameter record against a schema.
///
/// Pure function: seeds declared defaults, coerces every raw key by its
/// descriptor's kind (with clamping and fallback), copies or drops
/// undeclared keys per `allow_additional`, then enforces `required`.
pub fn normalize(
    schema: &ParamSchema,
    raw: Option<&Map<String, Value>>,
) -> Result<ParamRecord, SchemaError> {
    let mut record = ParamRecord::new();
    for (name, descriptor) in &schema.properties {
        if let Some(default) = &descriptor.default {
            record.insert(name.clone(), default.clone());
        }
    }

    if let Some(raw) = raw {
        for (name, value) in raw {
            match schema.properties.get(name) {
                None => {
                    if schema.allow_additional {
                        record.insert(name.clone(), value.clone());
                    }
                }
                Some(descriptor) => {
                    if let Some(coerced) = coerce(name, value, descriptor)? {
                        record.insert(name.clone(), coerced);
                    }
                }
            }
        }
    }

    for name in &schema.required {
        if record.get(name).map_or(true, Value::is_null) {
            return Err(SchemaError::MissingRequired { name: name.clone() });
        }
    }

    Ok(record)
}

/// Coerce one raw value by its descriptor's kind. `Ok(None)` means the
/// value stays absent (the seeded default, if any, survives).
fn coerce(
    name: &str,
    value: &Value,
    descriptor: &ParamDescriptor,
) -> Result<Option<Value>, SchemaError> {
    // Null behaves like an absent value for every kind: the default wins.
    if value.is_null() {
        return Ok(None);
    }

    match descriptor.kind {
        ParamKind::Enum => coerce_enum(name, value, descriptor).map(Some),
        ParamKind::Number | ParamKind::Integer => {
            Ok(Some(coerce_numeric(value, descriptor)))
        }
        ParamKind::Boolean => Ok(Some(Value::Bool(coerce_boolean(value)))),
        ParamKind::String => Ok(Some(Value::String(stringify(value)))),
        ParamKind::Array => match value {
            Value::Array(_) => Ok(Some(value.clone())),
            _ => Err(SchemaError::WrongShape {
                name: name.to_string(),
                expected: "an array",
            }),
        },
        ParamKind::Object => match value {
            Value::Object(_) => Ok(Some(value.clone())),
            _ => Err(SchemaError::WrongShape {
                name: name.to_string(),
                expected: "an object",
            }),
        },
    }
}

fn coerce_enum(
    name: &str,
    value: &Value,
    descriptor: &ParamDescriptor,
) -> Result<Value, SchemaError> {
    let token = stringify(value);
    if descriptor.enum_values.iter().any(|v| *v == token) {
        return Ok(Value::String(token));
    }
    if let Some(default) = &descriptor.default {
        return Ok(default.clone());
    }
    match descriptor.enum_values.first() {
        Some(first) => Ok(Value::String(first.clone())),
        None => Err(SchemaError::EmptyEnum {
            name: name.to_string(),
        }),
    }
}

fn coerce_numeric(value: &Value, descriptor: &ParamDescriptor) -> Value {
    let parsed = to_finite(value)
        .or_else(|| descriptor.default.as_ref().and_then(to_finite))
        .unwrap_or(0.0);
    let constrained = constrain(parsed, descriptor);
    if descriptor.kind == ParamKind::Integer {
        Value::from(constrained.round() as i64)
    } else {
        Value::from(constrained)
    }
}

/// Apply the descriptor's numeric constraints in order: integer rounding,
/// inclusive clamp, exclusive-bound nudge, multiple-of snap.
fn constrain(value: f64, descriptor: &ParamDescriptor) -> f64 {
    let mut out = value;
    if descriptor.kind == ParamKind::Integer {
        out = out.round();
    }
    if let Some(min) = descriptor.minimum {
        out = out.max(min);
    }
    if let Some(max) = descriptor.maximum {
        out = out.min(max);
    }
    if let Some(bound) = descriptor.exclusive_minimum {
        if out <= bound {
            out = just_inside(bound, true, descriptor);
        }
    }
    if let Some(bound) = descriptor.exclusive_maximum {
        if out >= bound {
            out = just_inside(bound, false, descriptor);
        }
    }
    if let Some(step) = descriptor.multiple_of {
        if step != 0.0 && step.is_finite() {
            out = (out / step).round() * step;
        }
    }
    out
}

/// Nearest valid value strictly inside an exclusive bound: one unit for
/// integers, one `multiple_of` step when declared, otherwise one ULP.
fn just_inside(bound: f64, upward: bool, descriptor: &ParamDescriptor) -> f64 {
    if descriptor.kind == ParamKind::Integer {
        return if upward { bound.floor() + 1.0 } else { bound.ceil() - 1.0 };
    }
    if let Some(step) = descriptor.multiple_of {
        if step != 0.0 && step.is_finite() {
            return if upward { bound + step.abs() } else { bound - step.abs() };
        }
    }
    next_toward(bound, upward)
}

/// The adjacent representable f64 in the given direction.
fn next_toward(value: f64, upward: bool) -> f64 {
    if value == 0.0 {
        let tiniest = f64::from_bits(1);
        return if upward { tiniest } else { -tiniest };
    }
    let bits = value.to_bits();
    let next = if (value > 0.0) == upward {
        bits + 1
    } else {
        bits - 1
    };
    f64::from_bits(next)
}

fn to_finite(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn coerce_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => !other.is_empty(),
        },
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Scalars stringify to their literal text; structured values to their
/// compact JSON text.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn clamped_integer() -> ParamSchema {
        ParamSchema::new().with(
            "period",
            ParamDescriptor::integer(5).with_range(1.0, 50.0),
        )
    }

    // ── Defaults and merging ─────────────────────────────────────

    #[test]
    fn absent_raw_yields_defaults() {
        let record = normalize(&clamped_integer(), None).unwrap();
        assert_eq!(record["period"], json!(5));
    }

    #[test]
    fn raw_value_overrides_default() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("period", json!(12))]))).unwrap();
        assert_eq!(record["period"], json!(12));
    }

    #[test]
    fn undeclared_keys_dropped_without_allow_additional() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("mystery", json!(1))]))).unwrap();
        assert!(!record.contains_key("mystery"));
    }

    #[test]
    fn undeclared_keys_kept_with_allow_additional() {
        let schema = clamped_integer().allow_additional();
        let record = normalize(&schema, Some(&raw(&[("mystery", json!(1))]))).unwrap();
        assert_eq!(record["mystery"], json!(1));
    }

    #[test]
    fn null_raw_value_keeps_default() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("period", Value::Null)]))).unwrap();
        assert_eq!(record["period"], json!(5));
    }

    // ── Numeric coercion ─────────────────────────────────────────

    #[test]
    fn integer_clamps_to_maximum() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("period", json!(999))]))).unwrap();
        assert_eq!(record["period"], json!(50));
    }

    #[test]
    fn integer_clamps_to_minimum() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("period", json!(-3))]))).unwrap();
        assert_eq!(record["period"], json!(1));
    }

    #[test]
    fn unparseable_number_falls_back_to_default() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("period", json!("abc"))]))).unwrap();
        assert_eq!(record["period"], json!(5));
    }

    #[test]
    fn unparseable_number_without_default_falls_back_to_zero() {
        let schema = ParamSchema::new().with("x", ParamDescriptor::new(ParamKind::Number));
        let record = normalize(&schema, Some(&raw(&[("x", json!("abc"))]))).unwrap();
        assert_eq!(record["x"], json!(0.0));
    }

    #[test]
    fn numeric_string_parses() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("period", json!(" 20 "))]))).unwrap();
        assert_eq!(record["period"], json!(20));
    }

    #[test]
    fn integer_rounds_to_nearest() {
        let record =
            normalize(&clamped_integer(), Some(&raw(&[("period", json!(7.6))]))).unwrap();
        assert_eq!(record["period"], json!(8));
    }

    #[test]
    fn multiple_of_snaps_to_nearest_multiple() {
        let schema = ParamSchema::new().with(
            "pct",
            ParamDescriptor::number(1.0).with_multiple_of(0.25),
        );
        let record = normalize(&schema, Some(&raw(&[("pct", json!(1.13))]))).unwrap();
        assert_eq!(record["pct"], json!(1.25));
    }

    #[test]
    fn exclusive_minimum_nudges_integer_inside() {
        let mut descriptor = ParamDescriptor::integer(5);
        descriptor.exclusive_minimum = Some(0.0);
        let schema = ParamSchema::new().with("n", descriptor);
        let record = normalize(&schema, Some(&raw(&[("n", json!(0))]))).unwrap();
        assert_eq!(record["n"], json!(1));
    }

    #[test]
    fn exclusive_maximum_nudges_number_inside() {
        let mut descriptor = ParamDescriptor::number(50.0);
        descriptor.exclusive_maximum = Some(100.0);
        let schema = ParamSchema::new().with("pct", descriptor);
        let record = normalize(&schema, Some(&raw(&[("pct", json!(150.0))]))).unwrap();
        let out = record["pct"].as_f64().unwrap();
        assert!(out < 100.0);
        assert!(out > 99.999);
    }

    // ── Enum coercion ────────────────────────────────────────────

    #[test]
    fn enum_accepts_member() {
        let schema = ParamSchema::new().with(
            "mode",
            ParamDescriptor::enumeration(["above", "below"], "above"),
        );
        let record = normalize(&schema, Some(&raw(&[("mode", json!("below"))]))).unwrap();
        assert_eq!(record["mode"], json!("below"));
    }

    #[test]
    fn enum_rejects_non_member_with_default_fallback() {
        let schema = ParamSchema::new().with(
            "mode",
            ParamDescriptor::enumeration(["above", "below"], "above"),
        );
        let record = normalize(&schema, Some(&raw(&[("mode", json!("sideways"))]))).unwrap();
        assert_eq!(record["mode"], json!("above"));
    }

    #[test]
    fn enum_without_default_falls_back_to_first_value() {
        let mut descriptor = ParamDescriptor::new(ParamKind::Enum);
        descriptor.enum_values = vec!["a".into(), "b".into()];
        let schema = ParamSchema::new().with("mode", descriptor);
        let record = normalize(&schema, Some(&raw(&[("mode", json!("z"))]))).unwrap();
        assert_eq!(record["mode"], json!("a"));
    }

    #[test]
    fn enum_stringifies_numeric_tokens() {
        let schema = ParamSchema::new().with(
            "level",
            ParamDescriptor::enumeration(["1", "2"], "1"),
        );
        let record = normalize(&schema, Some(&raw(&[("level", json!(2))]))).unwrap();
        assert_eq!(record["level"], json!("2"));
    }

    // ── Boolean coercion ─────────────────────────────────────────

    #[test]
    fn boolean_accepts_string_tokens_case_insensitive() {
        let schema = ParamSchema::new().with("flag", ParamDescriptor::boolean(false));
        let record = normalize(&schema, Some(&raw(&[("flag", json!("TRUE"))]))).unwrap();
        assert_eq!(record["flag"], json!(true));
        let record = normalize(&schema, Some(&raw(&[("flag", json!("False"))]))).unwrap();
        assert_eq!(record["flag"], json!(false));
    }

    #[test]
    fn boolean_falls_back_to_truthiness() {
        let schema = ParamSchema::new().with("flag", ParamDescriptor::boolean(false));
        let record = normalize(&schema, Some(&raw(&[("flag", json!(2))]))).unwrap();
        assert_eq!(record["flag"], json!(true));
        let record = normalize(&schema, Some(&raw(&[("flag", json!(0))]))).unwrap();
        assert_eq!(record["flag"], json!(false));
    }

    // ── String / structured coercion ─────────────────────────────

    #[test]
    fn string_stringifies_scalars() {
        let schema = ParamSchema::new().with("label", ParamDescriptor::new(ParamKind::String));
        let record = normalize(&schema, Some(&raw(&[("label", json!(3.5))]))).unwrap();
        assert_eq!(record["label"], json!("3.5"));
    }

    #[test]
    fn array_deep_copies() {
        let schema = ParamSchema::new().with("levels", ParamDescriptor::new(ParamKind::Array));
        let record =
            normalize(&schema, Some(&raw(&[("levels", json!([1, 2, 3]))]))).unwrap();
        assert_eq!(record["levels"], json!([1, 2, 3]));
    }

    #[test]
    fn array_shape_mismatch_fails() {
        let schema = ParamSchema::new().with("levels", ParamDescriptor::new(ParamKind::Array));
        let err = normalize(&schema, Some(&raw(&[("levels", json!(7))]))).unwrap_err();
        assert_eq!(
            err,
            SchemaError::WrongShape {
                name: "levels".into(),
                expected: "an array",
            }
        );
    }

    #[test]
    fn object_shape_mismatch_fails() {
        let schema = ParamSchema::new().with("extra", ParamDescriptor::new(ParamKind::Object));
        let err = normalize(&schema, Some(&raw(&[("extra", json!([1]))]))).unwrap_err();
        assert!(matches!(err, SchemaError::WrongShape { .. }));
    }

    // ── Required enforcement ─────────────────────────────────────

    #[test]
    fn required_without_default_fails_on_empty_raw() {
        let schema = ParamSchema::new()
            .with("threshold", ParamDescriptor::new(ParamKind::Number))
            .require("threshold");
        let err = normalize(&schema, Some(&Map::new())).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingRequired {
                name: "threshold".into(),
            }
        );
    }

    #[test]
    fn required_satisfied_by_raw_value() {
        let schema = ParamSchema::new()
            .with("threshold", ParamDescriptor::new(ParamKind::Number))
            .require("threshold");
        let record =
            normalize(&schema, Some(&raw(&[("threshold", json!(30))]))).unwrap();
        assert_eq!(record["threshold"], json!(30.0));
    }

    #[test]
    fn required_satisfied_by_default() {
        let schema = ParamSchema::new()
            .with("threshold", ParamDescriptor::number(30.0))
            .require("threshold");
        let record = normalize(&schema, None).unwrap();
        assert_eq!(record["threshold"], json!(30.0));
    }

    // ── Schema serde round-trip ──────────────────────────────────

    #[test]
    fn schema_round_trips_through_json() {
        let schema = ParamSchema::new()
            .with(
                "period",
                ParamDescriptor::integer(14).with_range(2.0, 365.0),
            )
            .with(
                "mode",
                ParamDescriptor::enumeration(["above", "below"], "above"),
            )
            .require("period");
        let json = serde_json::to_string(&schema).unwrap();
        let back: ParamSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }
}
