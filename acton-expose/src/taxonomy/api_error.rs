//! Tagged error values carrying an [`ErrorKind`]

use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::kind::ErrorKind;
use super::registry::ErrorTaxonomy;

/// Reserved context key whose entries are flattened into the error envelope
pub const METADATA_KEY: &str = "metadata";

/// Free-form data attached to a raised error
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    values: Map<String, Value>,
}

impl ErrorContext {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level entry
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Read a top-level entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set one metadata entry
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let entry = self
            .values
            .entry(METADATA_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = entry {
            metadata.insert(key.into(), value.into());
        }
    }

    /// The `metadata` sub-mapping, empty when absent or not an object
    pub fn metadata(&self) -> Map<String, Value> {
        match self.values.get(METADATA_KEY) {
            Some(Value::Object(metadata)) => metadata.clone(),
            _ => Map::new(),
        }
    }

    /// Merge another context in; metadata is merged key by key
    pub fn merge(&mut self, other: ErrorContext) {
        for (key, value) in other.values {
            match value {
                Value::Object(metadata) if key == METADATA_KEY => {
                    for (meta_key, meta_value) in metadata {
                        self.insert_metadata(meta_key, meta_value);
                    }
                }
                value => {
                    self.values.insert(key, value);
                }
            }
        }
    }

    /// Whether the context holds nothing
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for ErrorContext {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// Field-level validation messages carried by `invalid_resource`
pub type ValidationMessages = BTreeMap<String, Vec<String>>;

/// An error tagged with a registered [`ErrorKind`]
///
/// This is the value application code raises when it wants a specific
/// envelope. Any other error type reaching the dispatcher is classified
/// through the handler's mapping table.
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: Arc<ErrorKind>,
    message: Option<String>,
    context: ErrorContext,
    messages: Option<ValidationMessages>,
}

impl ApiError {
    /// Create an error of the given kind
    pub fn new(kind: Arc<ErrorKind>) -> Self {
        Self {
            kind,
            message: None,
            context: ErrorContext::new(),
            messages: None,
        }
    }

    /// Create an error of a kind looked up in the global taxonomy
    ///
    /// Unregistered names resolve to the `unknown` root.
    pub fn named(name: &str) -> Self {
        Self::named_in(&ErrorTaxonomy::global(), name)
    }

    /// Create an error of a kind looked up in `taxonomy`
    pub fn named_in(taxonomy: &ErrorTaxonomy, name: &str) -> Self {
        let kind = taxonomy.lookup(name).unwrap_or_else(|| {
            tracing::debug!(error = name, "Unregistered error kind, using unknown");
            taxonomy.unknown()
        });
        Self::new(kind)
    }

    /// `system` error from the global taxonomy
    pub fn system() -> Self {
        Self::new(ErrorTaxonomy::global().system())
    }

    /// `invalid_version` error from the global taxonomy
    pub fn invalid_version() -> Self {
        Self::named("invalid_version")
    }

    /// `throttled` error from the global taxonomy
    pub fn throttled() -> Self {
        Self::named("throttled")
    }

    /// `not_found` error from the global taxonomy
    pub fn not_found() -> Self {
        Self::named("not_found")
    }

    /// `invalid_resource` error carrying field-level messages
    ///
    /// The messages are exposed as the `messages` metadata field and survive
    /// later calls to [`with_context`](Self::with_context).
    pub fn invalid_resource(messages: ValidationMessages) -> Self {
        Self::named("invalid_resource").with_messages(messages)
    }

    /// Attach field-level validation messages
    #[must_use]
    pub fn with_messages(mut self, messages: ValidationMessages) -> Self {
        self.context
            .insert_metadata("messages", messages_to_value(&messages));
        self.messages = Some(messages);
        self
    }

    /// Re-tag with another kind, keeping message and context
    #[must_use]
    pub fn with_kind(mut self, kind: Arc<ErrorKind>) -> Self {
        self.kind = kind;
        self
    }

    /// Set an explicit message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Add one entry to the flattened metadata
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert_metadata(key, value);
        self
    }

    /// Replace the context
    ///
    /// Validation messages already attached are re-applied on top.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        if let Some(messages) = &self.messages {
            self.context
                .insert_metadata("messages", messages_to_value(messages));
        }
        self
    }

    /// The error kind
    pub fn kind(&self) -> &Arc<ErrorKind> {
        &self.kind
    }

    /// The explicit message, if any
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The attached context
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Field-level validation messages, if any
    pub fn messages(&self) -> Option<&ValidationMessages> {
        self.messages.as_ref()
    }

    /// Effective HTTP status of the kind
    pub fn status(&self) -> StatusCode {
        self.kind.http_status()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => f.write_str(message),
            None => f.write_str(&self.kind.display_name()),
        }
    }
}

impl std::error::Error for ApiError {}

fn messages_to_value(messages: &ValidationMessages) -> Value {
    Value::Object(
        messages
            .iter()
            .map(|(field, errors)| {
                (
                    field.clone(),
                    Value::Array(errors.iter().cloned().map(Value::String).collect()),
                )
            })
            .collect(),
    )
}
