//! Hierarchical key-value configuration lookup.
//!
//! Connections read their parameters through [`ConfigSource`], addressing
//! values by dotted path (`"<section>.<key>"`). [`LayeredConfig`] is the
//! bundled implementation: a stack of JSON documents where later layers
//! shadow earlier ones, the way an application merges defaults, a config
//! file and command-line overrides.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{ConfigError, Error};

/// Typed lookups over a hierarchical configuration store.
pub trait ConfigSource {
    /// String value at `key`, if present.
    ///
    /// Numbers and booleans are rendered to their textual form.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Integer value at `key`, if present.
    ///
    /// Returns an error when the key exists but does not hold an integer.
    fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError>;

    /// Whether `key` is present.
    fn has(&self, key: &str) -> bool {
        self.get_string(key).is_some()
    }

    /// Required string value.
    fn string(&self, key: &str) -> Result<String, Error> {
        self.get_string(key)
            .ok_or_else(|| Error::config(key, "required key is missing"))
    }

    /// String value, or `default` when absent.
    fn string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer value, or `default` when absent.
    fn int_or(&self, key: &str, default: i64) -> Result<i64, Error> {
        Ok(self.get_int(key)?.unwrap_or(default))
    }
}

/// Layered configuration backed by JSON documents.
#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
    /// Lowest priority first
    layers: Vec<Value>,
    /// Values written through [`LayeredConfig::set`]; highest priority
    overrides: Map<String, Value>,
}

impl LayeredConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single-layer configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            Error::Config(
                ConfigError {
                    key: String::new(),
                    message: format!("invalid JSON document: {}", e),
                    source: None,
                }
                .with_source(e),
            )
        })?;
        let mut config = Self::new();
        config.add_layer(value);
        Ok(config)
    }

    /// Load a single-layer configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(
                ConfigError {
                    key: String::new(),
                    message: format!("cannot read {}: {}", path.display(), e),
                    source: None,
                }
                .with_source(e),
            )
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Self::from_json_str(&text)
    }

    /// Push a layer that shadows every layer added before it.
    pub fn add_layer(&mut self, layer: Value) -> &mut Self {
        self.layers.push(layer);
        self
    }

    /// Builder form of [`LayeredConfig::add_layer`].
    pub fn with_layer(mut self, layer: Value) -> Self {
        self.add_layer(layer);
        self
    }

    /// Set a single dotted key in the override layer.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        let mut segments = key.split('.').peekable();
        let mut node = &mut self.overrides;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                node.insert(segment.to_string(), value.into());
                break;
            }
            let child = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            let Some(map) = child.as_object_mut() else {
                break;
            };
            node = map;
        }
        self
    }

    /// Number of layers, not counting overrides.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = lookup_in_map(&self.overrides, key) {
            return Some(value);
        }
        self.layers
            .iter()
            .rev()
            .find_map(|layer| lookup_in(layer, key))
    }
}

fn lookup_in<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    match root {
        Value::Object(map) => lookup_in_map(map, key),
        _ => None,
    }
}

fn lookup_in_map<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    // A literal dotted key wins over nested traversal, e.g. {"a.b": 1}.
    if let Some(value) = map.get(key) {
        return non_null(value);
    }
    let (head, rest) = key.split_once('.')?;
    lookup_in(map.get(head)?, rest)
}

fn non_null(value: &Value) -> Option<&Value> {
    if value.is_null() { None } else { Some(value) }
}

impl ConfigSource for LayeredConfig {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.lookup(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        let Some(value) = self.lookup(key) else {
            return Ok(None);
        };
        let malformed = |found: &str| ConfigError {
            key: key.to_string(),
            message: format!("expected an integer, found {}", found),
            source: None,
        };
        match value {
            Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| malformed(&n.to_string())),
            Value::String(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|e| malformed(&format!("'{}'", s)).with_source(e))
            }
            Value::Bool(b) => Err(malformed(&b.to_string())),
            Value::Array(_) => Err(malformed("an array")),
            Value::Object(_) => Err(malformed("a section")),
            Value::Null => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> LayeredConfig {
        LayeredConfig::new().with_layer(json!({
            "mysql_connect_timeout": 15,
            "replica": {
                "host": "db-2.internal",
                "port": "3307",
                "user": "reader",
                "password": "",
            }
        }))
    }

    #[test]
    fn test_dotted_lookup() {
        let config = sample();
        assert_eq!(
            config.get_string("replica.host"),
            Some("db-2.internal".to_string())
        );
        assert_eq!(config.get_string("replica.missing"), None);
        assert_eq!(config.get_string("nope.host"), None);
        assert!(config.has("replica.password"));
    }

    #[test]
    fn test_integer_from_string_and_number() {
        let config = sample();
        assert_eq!(config.get_int("replica.port").unwrap(), Some(3307));
        assert_eq!(config.get_int("mysql_connect_timeout").unwrap(), Some(15));
        assert_eq!(config.get_int("mysql_rw_timeout").unwrap(), None);
        assert_eq!(config.int_or("mysql_rw_timeout", 1800).unwrap(), 1800);
    }

    #[test]
    fn test_malformed_integer() {
        let config = LayeredConfig::new().with_layer(json!({ "s": { "port": "three" } }));
        let err = config.get_int("s.port").unwrap_err();
        assert_eq!(err.key, "s.port");
        assert!(err.message.contains("three"));

        let err = config.int_or("s.port", 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = config.get_int("s").unwrap_err();
        assert!(err.message.contains("section"));
    }

    #[test]
    fn test_later_layers_shadow_earlier() {
        let config = sample().with_layer(json!({ "replica": { "host": "db-3.internal" } }));
        assert_eq!(
            config.get_string("replica.host"),
            Some("db-3.internal".to_string())
        );
        // Keys not present in the newer layer fall through.
        assert_eq!(config.get_string("replica.user"), Some("reader".to_string()));
        assert_eq!(config.layer_count(), 2);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = sample();
        config.set("replica.port", 3310).set("fresh.key", "v");
        assert_eq!(config.get_int("replica.port").unwrap(), Some(3310));
        assert_eq!(config.get_string("fresh.key"), Some("v".to_string()));
        assert_eq!(
            config.get_string("replica.host"),
            Some("db-2.internal".to_string())
        );
    }

    #[test]
    fn test_required_string() {
        let config = sample();
        assert_eq!(config.string("replica.user").unwrap(), "reader");
        let err = config.string("replica.socket").unwrap_err();
        assert!(err.to_string().contains("replica.socket"));
        assert_eq!(config.string_or("replica.socket", ""), "");
    }

    #[test]
    fn test_null_is_absent() {
        let config = LayeredConfig::new().with_layer(json!({ "s": { "db": null } }));
        assert_eq!(config.get_string("s.db"), None);
        assert_eq!(config.get_int("s.db").unwrap(), None);
    }

    #[test]
    fn test_from_json_str() {
        let config = LayeredConfig::from_json_str(r#"{"a": {"b": {"c": 7}}}"#).unwrap();
        assert_eq!(config.get_int("a.b.c").unwrap(), Some(7));

        let err = LayeredConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = LayeredConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
