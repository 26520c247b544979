//! Template functions: ref(), source(), env_var(), var(), and config().
//!
//! Each function is built by a `make_*_fn` factory that closes over an
//! `Arc<Mutex<...>>` capture cell; the renderer clears the cells before
//! every render and reads them back afterwards.

use minijinja::value::{Kwargs, Value};
use minijinja::{Error, ErrorKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use wf_core::sql_utils::quote_qualified;

/// Captured ref() target names, in call order
pub(crate) type RefCapture = Arc<Mutex<Vec<String>>>;

/// Captured source() targets as (source_name, table)
pub(crate) type SourceCapture = Arc<Mutex<Vec<(String, String)>>>;

/// Captured env var names, whether or not a default applied
pub(crate) type EnvVarCapture = Arc<Mutex<BTreeSet<String>>>;

/// First env var that was referenced without a value or default
pub(crate) type MissingEnvVarCapture = Arc<Mutex<Option<String>>>;

/// Captured config() values
pub(crate) type ConfigCapture = Arc<Mutex<HashMap<String, Value>>>;

fn poisoned(what: &str) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("{} capture mutex poisoned", what),
    )
}

/// Create the ref() function.
///
/// In parse mode (`relations` is None) it echoes the target name; in
/// compile mode it substitutes the resolved, quoted relation. Either way
/// the target is captured for dependency resolution.
pub(crate) fn make_ref_fn(
    capture: RefCapture,
    relations: Option<HashMap<String, String>>,
) -> impl Fn(&str) -> Result<String, Error> + Send + Sync + 'static {
    move |name: &str| {
        capture
            .lock()
            .map_err(|_| poisoned("ref"))?
            .push(name.to_string());
        match &relations {
            Some(map) => match map.get(name) {
                Some(relation) => Ok(quote_qualified(relation)),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("ref '{}' was not resolved before compile", name),
                )),
            },
            None => Ok(name.to_string()),
        }
    }
}

/// Create the source() function, the two-argument sibling of ref().
pub(crate) fn make_source_fn(
    capture: SourceCapture,
    relations: Option<HashMap<String, String>>,
) -> impl Fn(&str, &str) -> Result<String, Error> + Send + Sync + 'static {
    move |source_name: &str, table: &str| {
        capture
            .lock()
            .map_err(|_| poisoned("source"))?
            .push((source_name.to_string(), table.to_string()));
        let key = format!("{}.{}", source_name, table);
        match &relations {
            Some(map) => match map.get(&key) {
                Some(relation) => Ok(quote_qualified(relation)),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("source '{}' was not resolved before compile", key),
                )),
            },
            None => Ok(key),
        }
    }
}

/// Create the env_var() function.
///
/// Reads from the run's explicit env snapshot. A referenced variable is
/// always captured; a variable that is unset with no default records
/// itself as missing and fails the render.
pub(crate) fn make_env_var_fn(
    capture: EnvVarCapture,
    missing: MissingEnvVarCapture,
    env: BTreeMap<String, String>,
) -> impl Fn(&str, Option<Value>) -> Result<Value, Error> + Send + Sync + 'static {
    move |name: &str, default: Option<Value>| {
        capture
            .lock()
            .map_err(|_| poisoned("env_var"))?
            .insert(name.to_string());
        if let Some(value) = env.get(name) {
            return Ok(Value::from(value.clone()));
        }
        if let Some(default_val) = default {
            return Ok(default_val);
        }
        *missing.lock().map_err(|_| poisoned("env_var"))? = Some(name.to_string());
        Err(Error::new(
            ErrorKind::UndefinedError,
            format!("env var '{}' is not set", name),
        ))
    }
}

/// Create the var() function over the project's vars map.
pub(crate) fn make_var_fn(
    vars: HashMap<String, serde_json::Value>,
) -> impl Fn(&str, Option<Value>) -> Result<Value, Error> + Send + Sync + 'static {
    move |name: &str, default: Option<Value>| {
        if let Some(value) = vars.get(name) {
            Ok(json_to_minijinja_value(value))
        } else if let Some(default_val) = default {
            Ok(default_val)
        } else {
            Err(Error::new(
                ErrorKind::UndefinedError,
                format!("var '{}' is not defined", name),
            ))
        }
    }
}

/// Create the config() function that captures per-resource configuration.
pub(crate) fn make_config_fn(
    capture: ConfigCapture,
) -> impl Fn(Kwargs) -> Result<String, Error> + Send + Sync + 'static {
    move |kwargs: Kwargs| {
        let mut captured = capture.lock().map_err(|_| poisoned("config"))?;
        for key in kwargs.args() {
            let value = kwargs.get::<Value>(key)?;
            captured.insert(key.to_string(), value);
        }
        // config() renders to nothing
        Ok(String::new())
    }
}

/// Convert a YAML value to JSON for var() lookups.
pub(crate) fn yaml_to_json(value: &serde_yaml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn json_to_minijinja_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::from(()),
        serde_json::Value::Bool(b) => Value::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else {
                Value::from(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::from(s.clone()),
        serde_json::Value::Array(items) => {
            Value::from(items.iter().map(json_to_minijinja_value).collect::<Vec<_>>())
        }
        serde_json::Value::Object(map) => Value::from_iter(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_minijinja_value(v))),
        ),
    }
}
