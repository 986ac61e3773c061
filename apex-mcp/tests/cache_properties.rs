//! Property tests for cache key normalization.

use apex_mcp::cache::ResponseCache;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Small arbitrary JSON values for request-shaped objects.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        "[a-z]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(|entries| {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key, value);
                }
                Value::Object(map)
            }),
        ]
    })
}

/// Rebuild an object with its keys inserted in reverse order.
fn reverse_key_order(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.reverse();
            let mut reversed = Map::new();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    reversed.insert(key.clone(), reverse_key_order(inner));
                }
            }
            Value::Object(reversed)
        }
        Value::Array(items) => Value::Array(items.iter().map(reverse_key_order).collect()),
        other => other.clone(),
    }
}

proptest! {
    /// Permutations of object key order produce identical cache keys.
    #[test]
    fn key_is_order_insensitive(value in arb_json()) {
        let permuted = reverse_key_order(&value);
        prop_assert_eq!(
            ResponseCache::key("apex_patterns_lookup", &value),
            ResponseCache::key("apex_patterns_lookup", &permuted)
        );
    }

    /// The key is a stable function of its inputs.
    #[test]
    fn key_is_deterministic(value in arb_json()) {
        prop_assert_eq!(
            ResponseCache::key("apex_patterns_lookup", &value),
            ResponseCache::key("apex_patterns_lookup", &value)
        );
    }
}
