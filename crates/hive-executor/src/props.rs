//! Argument conventions shared by several commands.
//!
//! - batch-or-single: an array first argument applies the operation per
//!   element and answers with one result per element, in order; anything
//!   else applies it once and answers with a single result
//! - `get`: a string key answers `[value]`; a mapping answers with the same
//!   keys mapped to their current values
//! - `set`: `(key, value)` or a mapping; `settings` is merged into the
//!   existing settings object instead of replacing it

use serde_json::{Map, Value};

use crate::engine::{EngineError, PropertyTarget};

/// Key whose value is merged rather than replaced on `set`.
pub const SETTINGS_KEY: &str = "settings";

pub fn batch<F>(command: &str, args: &[Value], mut op: F) -> Result<Vec<Value>, EngineError>
where
    F: FnMut(&Value) -> Result<Value, EngineError>,
{
    match args.first() {
        Some(Value::Array(items)) => items.iter().map(&mut op).collect(),
        Some(single) => Ok(vec![op(single)?]),
        None => Err(missing(command, 0)),
    }
}

pub fn get<T>(target: &T, command: &str, args: &[Value]) -> Result<Vec<Value>, EngineError>
where
    T: PropertyTarget + ?Sized,
{
    match args.first() {
        Some(Value::String(key)) => Ok(vec![target.property(key)?]),
        Some(Value::Object(keys)) => {
            let mut values = Map::with_capacity(keys.len());
            for key in keys.keys() {
                values.insert(key.clone(), target.property(key)?);
            }
            Ok(vec![Value::Object(values)])
        }
        Some(other) => Err(EngineError::invalid(
            command,
            format!("expected a key or a mapping of keys, got {other}"),
        )),
        None => Err(missing(command, 0)),
    }
}

pub fn set<T>(target: &mut T, command: &str, args: &[Value]) -> Result<(), EngineError>
where
    T: PropertyTarget + ?Sized,
{
    match args.first() {
        Some(Value::String(key)) => {
            let value = args.get(1).cloned().unwrap_or(Value::Null);
            set_one(target, command, key, value)
        }
        Some(Value::Object(values)) => {
            for (key, value) in values {
                set_one(target, command, key, value.clone())?;
            }
            Ok(())
        }
        Some(other) => Err(EngineError::invalid(
            command,
            format!("expected a key or a mapping, got {other}"),
        )),
        None => Err(missing(command, 0)),
    }
}

fn set_one<T>(target: &mut T, command: &str, key: &str, value: Value) -> Result<(), EngineError>
where
    T: PropertyTarget + ?Sized,
{
    if key != SETTINGS_KEY {
        return target.set_property(key, value);
    }
    let Value::Object(patch) = value else {
        return Err(EngineError::invalid(command, "settings must be a mapping"));
    };
    let mut settings = match target.property(SETTINGS_KEY)? {
        Value::Object(current) => current,
        _ => Map::new(),
    };
    settings.extend(patch);
    target.set_property(SETTINGS_KEY, Value::Object(settings))
}

/// String argument at `index`.
pub fn str_arg<'a>(command: &str, args: &'a [Value], index: usize) -> Result<&'a str, EngineError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EngineError::invalid(
            command,
            format!("argument {index} must be a string, got {other}"),
        )),
        None => Err(missing(command, index)),
    }
}

fn missing(command: &str, index: usize) -> EngineError {
    EngineError::MissingArgument {
        command: command.to_string(),
        index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Props(Map<String, Value>);

    impl PropertyTarget for Props {
        fn property(&self, key: &str) -> Result<Value, EngineError> {
            Ok(self.0.get(key).cloned().unwrap_or(Value::Null))
        }

        fn set_property(&mut self, key: &str, value: Value) -> Result<(), EngineError> {
            if key == "url" {
                return Err(EngineError::ReadOnly(key.into()));
            }
            self.0.insert(key.into(), value);
            Ok(())
        }
    }

    #[test]
    fn batch_answers_one_result_per_element() {
        let args = vec![json!(["a", "b", "c"])];
        let out = batch("deleteCookie", &args, |v| Ok(json!(v == "b"))).unwrap();
        assert_eq!(out, vec![json!(false), json!(true), json!(false)]);
    }

    #[test]
    fn single_argument_answers_one_element() {
        let out = batch("injectJs", &[json!("x.js")], |_| Ok(json!(true))).unwrap();
        assert_eq!(out, vec![json!(true)]);
    }

    #[test]
    fn empty_batch_answers_empty() {
        let out = batch("addCookie", &[json!([])], |_| Ok(json!(true))).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn batch_without_arguments_is_rejected() {
        let err = batch("addCookie", &[], |_| Ok(Value::Null)).unwrap_err();
        assert!(matches!(err, EngineError::MissingArgument { index: 0, .. }));
    }

    #[test]
    fn get_by_key_and_by_mapping() {
        let mut props = Props::default();
        props.0.insert("url".into(), json!("http://example.com"));
        props.0.insert("zoomFactor".into(), json!(1.5));

        assert_eq!(
            get(&props, "get", &[json!("url")]).unwrap(),
            vec![json!("http://example.com")]
        );
        assert_eq!(
            get(&props, "get", &[json!({"url": null, "missing": null})]).unwrap(),
            vec![json!({"url": "http://example.com", "missing": null})]
        );
        assert!(get(&props, "get", &[json!(5)]).is_err());
    }

    #[test]
    fn settings_are_merged_not_replaced() {
        let mut props = Props::default();
        props
            .0
            .insert("settings".into(), json!({"userAgent": "ua", "loadImages": true}));

        set(&mut props, "set", &[json!("settings"), json!({"loadImages": false})]).unwrap();
        assert_eq!(
            props.0["settings"],
            json!({"userAgent": "ua", "loadImages": false})
        );

        set(
            &mut props,
            "set",
            &[json!({"settings": {"javascriptEnabled": false}, "zoomFactor": 2})],
        )
        .unwrap();
        assert_eq!(
            props.0["settings"],
            json!({"userAgent": "ua", "loadImages": false, "javascriptEnabled": false})
        );
        assert_eq!(props.0["zoomFactor"], json!(2));
    }

    #[test]
    fn set_propagates_target_errors() {
        let mut props = Props::default();
        let err = set(&mut props, "set", &[json!("url"), json!("x")]).unwrap_err();
        assert!(matches!(err, EngineError::ReadOnly(_)));
        assert!(set(&mut props, "set", &[json!("settings"), json!(3)]).is_err());
    }

    #[test]
    fn string_arguments() {
        let args = [json!("http://example.com"), json!(1)];
        assert_eq!(str_arg("open", &args, 0).unwrap(), "http://example.com");
        assert!(str_arg("open", &args, 1).is_err());
        assert!(matches!(
            str_arg("open", &args, 2),
            Err(EngineError::MissingArgument { index: 2, .. })
        ));
    }
}
