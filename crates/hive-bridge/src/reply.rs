//! Helpers for unpacking positional response arguments.

use hive_types::{Cookie, HiveError};
use serde_json::{Map, Value};

/// The first response argument, `Null` when the response was empty.
pub(crate) fn first(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Null)
}

pub(crate) fn first_bool(command: &str, args: Vec<Value>) -> Result<bool, HiveError> {
    match first(args) {
        Value::Bool(b) => Ok(b),
        other => Err(HiveError::unexpected(command, format!("expected a boolean, got {other}"))),
    }
}

pub(crate) fn first_string(command: &str, args: Vec<Value>) -> Result<String, HiveError> {
    match first(args) {
        Value::String(s) => Ok(s),
        other => Err(HiveError::unexpected(command, format!("expected a string, got {other}"))),
    }
}

pub(crate) fn first_object(
    command: &str,
    args: Vec<Value>,
) -> Result<Map<String, Value>, HiveError> {
    match first(args) {
        Value::Object(map) => Ok(map),
        other => Err(HiveError::unexpected(command, format!("expected an object, got {other}"))),
    }
}

/// Batch responses carry one boolean per element, in request order.
pub(crate) fn bools(
    command: &str,
    args: Vec<Value>,
    expected: usize,
) -> Result<Vec<bool>, HiveError> {
    if args.len() != expected {
        return Err(HiveError::unexpected(
            command,
            format!("expected {expected} results, got {}", args.len()),
        ));
    }
    args.into_iter()
        .map(|v| {
            v.as_bool().ok_or_else(|| {
                HiveError::unexpected(command, format!("expected a boolean, got {v}"))
            })
        })
        .collect()
}

pub(crate) fn cookie(cookie: &Cookie) -> Result<Value, HiveError> {
    serde_json::to_value(cookie).map_err(|e| HiveError::Encode(e.to_string()))
}

/// Build the mapping form of `get`: every requested key mapped to null.
pub(crate) fn key_map(keys: &[&str]) -> Value {
    Value::Object(keys.iter().map(|k| (k.to_string(), Value::Null)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_defaults_to_null() {
        assert_eq!(first(vec![]), Value::Null);
        assert_eq!(first(vec![json!(1), json!(2)]), json!(1));
    }

    #[test]
    fn typed_extractors_reject_wrong_shapes() {
        assert!(first_bool("injectJs", vec![json!(true)]).unwrap());
        assert!(matches!(
            first_string("open", vec![json!(5)]),
            Err(HiveError::UnexpectedReply { .. })
        ));
        assert!(first_object("get", vec![json!({"a": 1})]).is_ok());
    }

    #[test]
    fn batch_length_must_match() {
        let both = bools("addCookie", vec![json!(true), json!(false)], 2).unwrap();
        assert_eq!(both, vec![true, false]);
        assert!(bools("addCookie", vec![json!(true)], 2).is_err());
    }

    #[test]
    fn key_map_maps_to_null() {
        assert_eq!(key_map(&["url", "title"]), json!({"url": null, "title": null}));
    }
}
