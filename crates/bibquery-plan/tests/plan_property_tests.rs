//! Property tests for the plan model.
//!
//! 1. Range filters are constructible iff `start <= end`
//! 2. Plan → JSON → Plan → JSON is byte-stable
//! 3. Plan hashes agree iff canonical serializations agree

use bibquery_plan::{
    canonical_json, debug_keys, plan_hash, Filter, FilterField, FilterValidationError, QueryPlan,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn text_field_strategy() -> impl Strategy<Value = FilterField> {
    prop::sample::select(vec![
        FilterField::Publisher,
        FilterField::Place,
        FilterField::Country,
        FilterField::Language,
        FilterField::Title,
        FilterField::Subject,
        FilterField::Agent,
        FilterField::AgentNorm,
        FilterField::AgentRole,
        FilterField::AgentType,
    ])
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z ]{0,12}[a-z]"
}

fn filter_strategy() -> impl Strategy<Value = Filter> {
    let text = (text_field_strategy(), value_strategy(), any::<bool>()).prop_map(|(field, v, c)| {
        if c {
            Filter::contains(field, v).unwrap()
        } else {
            Filter::equals(field, v).unwrap()
        }
    });
    let range = (1400i32..1900, 0i32..300)
        .prop_map(|(start, span)| Filter::range(FilterField::Year, start, start + span).unwrap());
    let set = (text_field_strategy(), prop::collection::vec(value_strategy(), 1..4))
        .prop_map(|(field, values)| Filter::one_of(field, values).unwrap());

    (prop_oneof![text, range, set], any::<bool>(), prop::option::of(0.0f64..=1.0)).prop_map(
        |(filter, negate, confidence)| {
            let filter = filter.negated(negate);
            match confidence {
                Some(c) => filter.with_confidence(c).unwrap(),
                None => filter,
            }
        },
    )
}

fn plan_strategy() -> impl Strategy<Value = QueryPlan> {
    (
        "[a-zA-Z0-9 ]{0,40}",
        prop::collection::vec(filter_strategy(), 0..5),
        prop::collection::vec(filter_strategy(), 0..2),
        prop::option::of(1usize..500),
        any::<bool>(),
    )
        .prop_map(|(text, filters, soft, limit, retried)| {
            let plan = QueryPlan::new(text)
                .with_filters(filters)
                .with_soft_filters(soft)
                .with_limit(limit)
                .with_debug(debug_keys::BACKEND, "heuristic");
            if retried {
                plan.with_debug(debug_keys::RETRY_ATTEMPT, true)
            } else {
                plan
            }
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn range_construction_follows_bound_order(start in -5000i32..5000, end in -5000i32..5000) {
        let result = Filter::range(FilterField::Year, start, end);
        if start > end {
            let is_inverted = matches!(result, Err(FilterValidationError::InvertedRange { .. }));
            prop_assert!(is_inverted);
        } else {
            let filter = result.unwrap();
            prop_assert_eq!(filter.bounds(), Some((start, end)));
        }
    }

    #[test]
    fn plan_json_roundtrip_is_byte_stable(plan in plan_strategy()) {
        let first = serde_json::to_string(&plan).unwrap();
        let back = QueryPlan::from_json(&first).unwrap();
        let second = serde_json::to_string(&back).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(back, plan);
    }

    #[test]
    fn hash_equality_matches_canonical_equality(a in plan_strategy(), b in plan_strategy()) {
        let same_canonical = canonical_json(&a).unwrap() == canonical_json(&b).unwrap();
        let same_hash = plan_hash(&a).unwrap() == plan_hash(&b).unwrap();
        prop_assert_eq!(same_canonical, same_hash);
        prop_assert_eq!(plan_hash(&a).unwrap(), plan_hash(&a.clone()).unwrap());
    }
}
