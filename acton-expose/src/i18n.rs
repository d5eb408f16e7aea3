//! Translation lookup for error messages

use std::collections::HashMap;

/// Translation lookup consulted for `errors.<name>` keys
pub trait Translator: Send + Sync {
    /// Translate a dotted key, returning `None` when no translation exists
    fn translate(&self, key: &str) -> Option<String>;
}

/// In-memory translation table
#[derive(Debug, Clone, Default)]
pub struct StaticTranslations {
    entries: HashMap<String, String>,
}

impl StaticTranslations {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a translation
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Build from a nested JSON object, flattening keys with `.`
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut entries = HashMap::new();
        flatten("", value, &mut entries);
        Self { entries }
    }
}

impl Translator for StaticTranslations {
    fn translate(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut HashMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        serde_json::Value::String(text) => {
            out.insert(prefix.to_string(), text.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

/// Key looked up for an error kind's message
pub fn error_key(name: &str) -> String {
    format!("errors.{name}")
}
