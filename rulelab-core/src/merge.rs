//! Combinator merge policy.
//!
//! Booleans fold strictly (`all` for AND, `any` for OR, inversion for
//! NOT). Numeric risk fields merge to the **minimum over providers** —
//! the tightest stop/target wins, so a composite can never loosen a
//! constraint one of its children asked for. Providers for a numeric
//! field are the children whose boolean fields contributed to the
//! composite's fired signals; when nothing fired, every child supplying
//! the field is eligible. Negation drops both numeric fields: inverting
//! a risk threshold has no sound interpretation.
//!
//! Meta stays fully structured so a mis-firing composite can be traced
//! leaf by leaf: `{"operator": "AND", "children": [child.meta, ...]}` in
//! child order, and `{"operator": "NOT", "child": child.meta}`.

use serde_json::json;

use crate::dsl::CompositeOp;
use crate::result::RuleResult;

/// Merge child results under AND: every boolean must hold everywhere.
pub fn combine_and(children: &[RuleResult]) -> RuleResult {
    if children.is_empty() {
        return RuleResult::empty();
    }
    let mut combined = RuleResult {
        enter: children.iter().all(|c| c.enter),
        exit: children.iter().all(|c| c.exit),
        short: children.iter().all(|c| c.short),
        cover: children.iter().all(|c| c.cover),
        ..RuleResult::empty()
    };
    merge_numeric_and_meta(&mut combined, children, CompositeOp::And);
    combined
}

/// Merge child results under OR: any child can fire a boolean.
pub fn combine_or(children: &[RuleResult]) -> RuleResult {
    if children.is_empty() {
        return RuleResult::empty();
    }
    let mut combined = RuleResult {
        enter: children.iter().any(|c| c.enter),
        exit: children.iter().any(|c| c.exit),
        short: children.iter().any(|c| c.short),
        cover: children.iter().any(|c| c.cover),
        ..RuleResult::empty()
    };
    merge_numeric_and_meta(&mut combined, children, CompositeOp::Or);
    combined
}

/// Invert a child result. Numeric fields become absent.
pub fn combine_not(child: &RuleResult) -> RuleResult {
    RuleResult {
        enter: !child.enter,
        exit: !child.exit,
        short: !child.short,
        cover: !child.cover,
        stop_loss_percent: None,
        take_profit_percent: None,
        meta: json!({ "operator": "NOT", "child": child.meta.clone() }),
    }
}

fn merge_numeric_and_meta(combined: &mut RuleResult, children: &[RuleResult], op: CompositeOp) {
    combined.stop_loss_percent = numeric_min(children, combined, |c| c.stop_loss_percent);
    combined.take_profit_percent = numeric_min(children, combined, |c| c.take_profit_percent);
    let child_meta: Vec<_> = children.iter().map(|c| c.meta.clone()).collect();
    combined.meta = json!({ "operator": op.as_str(), "children": child_meta });
}

/// Minimum finite value among providers. A child is a provider when one
/// of its fired booleans matches a fired boolean of the composite; if the
/// composite fired nothing, every child supplying the field counts.
fn numeric_min<F>(children: &[RuleResult], combined: &RuleResult, field: F) -> Option<f64>
where
    F: Fn(&RuleResult) -> Option<f64>,
{
    let relevant = |child: &RuleResult| {
        (combined.enter && child.enter)
            || (combined.exit && child.exit)
            || (combined.short && child.short)
            || (combined.cover && child.cover)
    };
    let any_signal = combined.any_signal();
    let mut min: Option<f64> = None;
    for child in children {
        if any_signal && !relevant(child) {
            continue;
        }
        if let Some(value) = field(child).filter(|v| v.is_finite()) {
            min = Some(min.map_or(value, |m| m.min(value)));
        }
    }
    min
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(enter: bool, stop: Option<f64>) -> RuleResult {
        RuleResult {
            enter,
            stop_loss_percent: stop,
            meta: json!({"plugin": "fixture"}),
            ..RuleResult::empty()
        }
    }

    // ── AND booleans ─────────────────────────────────────────────

    #[test]
    fn and_requires_all_children() {
        let combined = combine_and(&[entry(true, None), entry(true, None)]);
        assert!(combined.enter);
        let combined = combine_and(&[entry(true, None), entry(false, None)]);
        assert!(!combined.enter);
    }

    #[test]
    fn and_of_nothing_is_empty() {
        assert_eq!(combine_and(&[]), RuleResult::empty());
    }

    // ── OR booleans ──────────────────────────────────────────────

    #[test]
    fn or_fires_on_any_child() {
        let combined = combine_or(&[entry(false, None), entry(true, None)]);
        assert!(combined.enter);
        let combined = combine_or(&[entry(false, None), entry(false, None)]);
        assert!(!combined.enter);
    }

    // ── Numeric merge: minimum over providers ────────────────────

    #[test]
    fn and_takes_minimum_stop_loss_over_providers() {
        let combined = combine_and(&[entry(true, Some(5.0)), entry(true, Some(8.0))]);
        assert!(combined.enter);
        assert_eq!(combined.stop_loss_percent, Some(5.0));
    }

    #[test]
    fn or_ignores_numeric_from_non_providers() {
        // Only the first child fired; the silent child's looser stop is
        // not merged upward.
        let combined = combine_or(&[entry(true, Some(7.0)), entry(false, Some(2.0))]);
        assert!(combined.enter);
        assert_eq!(combined.stop_loss_percent, Some(7.0));
    }

    #[test]
    fn no_signal_falls_back_to_all_suppliers() {
        let combined = combine_or(&[entry(false, Some(9.0)), entry(false, Some(4.0))]);
        assert!(!combined.any_signal());
        assert_eq!(combined.stop_loss_percent, Some(4.0));
    }

    #[test]
    fn absent_everywhere_stays_absent() {
        let combined = combine_and(&[entry(true, None), entry(true, None)]);
        assert_eq!(combined.stop_loss_percent, None);
        assert_eq!(combined.take_profit_percent, None);
    }

    #[test]
    fn take_profit_merges_independently_of_stop_loss() {
        let a = RuleResult {
            enter: true,
            take_profit_percent: Some(12.0),
            ..RuleResult::empty()
        };
        let b = RuleResult {
            enter: true,
            stop_loss_percent: Some(5.0),
            take_profit_percent: Some(10.0),
            ..RuleResult::empty()
        };
        let combined = combine_and(&[a, b]);
        assert_eq!(combined.stop_loss_percent, Some(5.0));
        assert_eq!(combined.take_profit_percent, Some(10.0));
    }

    // ── Meta structure ───────────────────────────────────────────

    #[test]
    fn meta_preserves_child_order_and_operator() {
        let a = RuleResult {
            meta: json!({"plugin": "a"}),
            ..RuleResult::empty()
        };
        let b = RuleResult {
            meta: json!({"plugin": "b"}),
            ..RuleResult::empty()
        };
        let combined = combine_or(&[a, b]);
        assert_eq!(combined.meta["operator"], json!("OR"));
        assert_eq!(
            combined.meta["children"],
            json!([{"plugin": "a"}, {"plugin": "b"}])
        );
    }

    // ── Negation ─────────────────────────────────────────────────

    #[test]
    fn not_inverts_all_booleans() {
        let child = RuleResult {
            enter: true,
            exit: false,
            short: true,
            cover: false,
            ..RuleResult::empty()
        };
        let inverted = combine_not(&child);
        assert!(!inverted.enter);
        assert!(inverted.exit);
        assert!(!inverted.short);
        assert!(inverted.cover);
    }

    #[test]
    fn not_drops_numeric_fields() {
        let child = entry(true, Some(5.0));
        let inverted = combine_not(&child);
        assert_eq!(inverted.stop_loss_percent, None);
        assert_eq!(inverted.take_profit_percent, None);
    }

    #[test]
    fn not_meta_wraps_child_meta() {
        let child = entry(true, None);
        let inverted = combine_not(&child);
        assert_eq!(inverted.meta["operator"], json!("NOT"));
        assert_eq!(inverted.meta["child"], json!({"plugin": "fixture"}));
    }

    #[test]
    fn double_negation_restores_booleans() {
        let child = entry(true, Some(5.0));
        let twice = combine_not(&combine_not(&child));
        assert_eq!(twice.enter, child.enter);
        assert_eq!(twice.exit, child.exit);
        // Numeric fields stay absent by design — negation is lossy.
        assert_eq!(twice.stop_loss_percent, None);
    }
}
