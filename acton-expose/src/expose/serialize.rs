//! Serialization resolution

use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::classify::{Exposable, ExposureKind};
use crate::error::{Error, Result};

/// Context handed to a serializer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializationContext {
    /// Request URL options (host, protocol, port) for building links
    pub url_options: Map<String, Value>,
    /// Whether the serializer should wrap its output in a root key
    pub root: bool,
}

/// Reduces a value to plain JSON
pub trait Serializer: Send + Sync {
    /// Serialize `value`
    fn serialize(&self, value: &dyn Exposable, context: &SerializationContext) -> Result<Value>;
}

impl<F> Serializer for F
where
    F: Fn(&dyn Exposable, &SerializationContext) -> Result<Value> + Send + Sync,
{
    fn serialize(&self, value: &dyn Exposable, context: &SerializationContext) -> Result<Value> {
        self(value, context)
    }
}

/// Per-call exposure options
#[derive(Clone, Default)]
pub struct ExposeOptions {
    /// Serializer for a singular value
    pub serializer: Option<Arc<dyn Serializer>>,
    /// Serializer for each collection member
    pub each_serializer: Option<Arc<dyn Serializer>>,
    /// Response status, 200 when unset
    pub status: Option<StatusCode>,
    /// Extra top-level body fields
    pub metadata: Map<String, Value>,
    /// Attributes appended to every pagination `Link`
    pub link_attributes: Vec<(String, String)>,
}

impl ExposeOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer for a singular value
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Serializer for each collection member
    #[must_use]
    pub fn each_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.each_serializer = Some(serializer);
        self
    }

    /// Response status
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a top-level body field
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add an attribute to every pagination `Link`
    #[must_use]
    pub fn link_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.link_attributes.push((key.into(), value.into()));
        self
    }
}

impl fmt::Debug for ExposeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposeOptions")
            .field("serializer", &self.serializer.is_some())
            .field("each_serializer", &self.each_serializer.is_some())
            .field("status", &self.status)
            .field("metadata", &self.metadata)
            .field("link_attributes", &self.link_attributes)
            .finish()
    }
}

/// Picks how each value is reduced to plain JSON
///
/// Order: per-call override, the value's own serializer, its plain-structure
/// reduction, generic JSON conversion. With serializers disabled only the last
/// two apply.
#[derive(Debug, Clone)]
pub struct SerializationResolver {
    serializers_enabled: bool,
    url_options: Map<String, Value>,
}

impl SerializationResolver {
    /// Create a resolver
    pub fn new(serializers_enabled: bool) -> Self {
        Self {
            serializers_enabled,
            url_options: Map::new(),
        }
    }

    /// Set the URL options passed to serializers
    #[must_use]
    pub fn with_url_options(mut self, url_options: Map<String, Value>) -> Self {
        self.url_options = url_options;
        self
    }

    /// Resolve a classified value
    pub fn resolve(
        &self,
        value: &dyn Exposable,
        kind: ExposureKind,
        options: &ExposeOptions,
    ) -> Result<Value> {
        match kind {
            ExposureKind::Resource => self.resolve_one(value, options.serializer.as_ref(), true),
            ExposureKind::Collection | ExposureKind::Paginated => {
                let members = value.members().ok_or_else(|| {
                    Error::Internal("collection value exposes no members".to_string())
                })?;
                members
                    .into_iter()
                    .map(|member| self.resolve_one(member, options.each_serializer.as_ref(), false))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
        }
    }

    fn resolve_one(
        &self,
        value: &dyn Exposable,
        override_serializer: Option<&Arc<dyn Serializer>>,
        root: bool,
    ) -> Result<Value> {
        if self.serializers_enabled {
            let serializer = override_serializer.cloned().or_else(|| value.serializer());
            if let Some(serializer) = serializer {
                let context = SerializationContext {
                    url_options: self.url_options.clone(),
                    root,
                };
                return serializer.serialize(value, &context);
            }
        }

        match value.serializable_hash() {
            Some(plain) => Ok(plain),
            None => value.to_json(),
        }
    }
}

impl Default for SerializationResolver {
    fn default() -> Self {
        Self::new(true)
    }
}
