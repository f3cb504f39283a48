use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Strategy for generating API path segments
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9_]{0,11}", 1..4).prop_map(|segments| {
        format!("/{}", segments.join("/"))
    })
}

/// Strategy for generating distinct `key=value` query parameters
pub fn query_params_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..6).prop_map(|params| {
        params
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    })
}

/// Strategy for generating flat JSON request fields
pub fn body_fields_strategy() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map("[a-z_]{1,10}", any::<i64>(), 0..8)
}

/// Strategy for generating nested JSON values
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
    ];

    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Build a JSON object inserting fields in the given order
pub fn object_in_order<'a>(fields: impl Iterator<Item = (&'a String, &'a i64)>) -> Value {
    let mut object = Map::new();
    for (key, value) in fields {
        object.insert(key.clone(), Value::from(*value));
    }
    Value::Object(object)
}
