//! Error envelope field resolution

use axum::http::StatusCode;
use serde_json::{Map, Value};

use super::exception::Exception;
use super::mapping::Classification;
use crate::config::ErrorPolicy;
use crate::handler::HandlerHooks;
use crate::i18n::{error_key, Translator};
use crate::taxonomy::ApiError;

/// Resolved contents of an error envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorFields {
    /// `body.error`
    pub name: String,
    /// Response status
    pub status: StatusCode,
    /// `body.error_description`
    pub message: String,
    /// Flattened into the body
    pub extras: Map<String, Value>,
    /// `body.error_identifier`
    pub error_identifier: Option<String>,
}

impl ErrorFields {
    /// The JSON body
    ///
    /// Extras are merged over `error` and `error_description`.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(self.name.clone()));
        body.insert(
            "error_description".to_string(),
            Value::String(self.message.clone()),
        );
        for (key, value) in &self.extras {
            body.insert(key.clone(), value.clone());
        }
        if let Some(identifier) = &self.error_identifier {
            body.insert(
                "error_identifier".to_string(),
                Value::String(identifier.clone()),
            );
        }
        Value::Object(body)
    }
}

/// Fields for a tagged error using only the kind's defaults
impl From<&ApiError> for ErrorFields {
    fn from(error: &ApiError) -> Self {
        Self {
            name: error.kind().name().to_string(),
            status: error.status(),
            message: error.to_string(),
            extras: error.context().metadata(),
            error_identifier: None,
        }
    }
}

/// Resolves envelope fields for a classified exception
pub struct ErrorResolver<'a> {
    hooks: &'a dyn HandlerHooks,
    translator: Option<&'a dyn Translator>,
    policy: ErrorPolicy,
}

impl<'a> ErrorResolver<'a> {
    /// Create a resolver
    pub fn new(
        hooks: &'a dyn HandlerHooks,
        translator: Option<&'a dyn Translator>,
        policy: ErrorPolicy,
    ) -> Self {
        Self {
            hooks,
            translator,
            policy,
        }
    }

    /// Resolve name, status, message and extras
    ///
    /// Hook overrides win, then the exception's context metadata, then the
    /// kind's defaults.
    pub fn resolve(&self, exception: &dyn Exception, classification: &Classification) -> ErrorFields {
        let error = &classification.error;
        let kind = error.kind();

        let name = self
            .hooks
            .lookup_error_name(exception)
            .unwrap_or_else(|| kind.name().to_string());

        let status = self
            .hooks
            .lookup_error_status(exception)
            .unwrap_or_else(|| kind.http_status());

        let message = self
            .hooks
            .lookup_error_message(exception)
            .or_else(|| self.translator.and_then(|t| t.translate(&error_key(&name))))
            .or_else(|| error.message().map(str::to_string))
            .unwrap_or_else(|| self.fallback_message(exception, classification, status));

        let extras = self
            .hooks
            .lookup_error_extras(exception)
            .unwrap_or_else(|| error.context().metadata());

        if status.is_server_error() {
            tracing::error!(
                error = %name,
                status = status.as_u16(),
                exception_type = %exception.exception_type(),
                "Request failed: {}",
                exception
            );
        } else {
            tracing::warn!(
                error = %name,
                status = status.as_u16(),
                exception_type = %exception.exception_type(),
                "Request rejected: {}",
                exception
            );
        }

        ErrorFields {
            name,
            status,
            message,
            extras,
            error_identifier: None,
        }
    }

    fn fallback_message(
        &self,
        exception: &dyn Exception,
        classification: &Classification,
        status: StatusCode,
    ) -> String {
        let foreign = exception.as_api_error().is_none();
        if foreign && self.policy.show_exception_message {
            return exception.to_string();
        }
        if classification.is_unmapped() {
            return status
                .canonical_reason()
                .unwrap_or("An error occurred")
                .to_string();
        }
        classification.error.kind().display_name()
    }
}
