//! Raised exceptions and their type lineage

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::taxonomy::{ApiError, ErrorContext};

/// Identity of an exception type used as a mapping table key
///
/// Rust types are keyed by [`TypeId`]. Tagged [`ApiError`] values are keyed by
/// kind name, so a registered kind behaves like its own exception type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionType {
    /// A concrete Rust type
    Type {
        /// Type identity
        id: TypeId,
        /// Type name, for logs
        name: &'static str,
    },
    /// A registered error kind
    Kind(Arc<str>),
}

impl ExceptionType {
    /// Key for a concrete Rust type
    pub fn of<T: 'static>() -> Self {
        ExceptionType::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for a registered error kind
    pub fn kind(name: impl Into<Arc<str>>) -> Self {
        ExceptionType::Kind(name.into())
    }

    /// Printable name
    pub fn name(&self) -> &str {
        match self {
            ExceptionType::Type { name, .. } => name,
            ExceptionType::Kind(name) => name,
        }
    }
}

impl fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Upcast helper implemented for every `'static` type
pub trait AsAny: Any {
    /// Borrow as `dyn Any`
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An error that can reach the dispatcher
///
/// `ancestors` stands in for a class hierarchy: list the types this error
/// should also match in a mapping table, nearest first.
///
/// ```
/// use acton_expose::dispatch::{Exception, ExceptionType};
///
/// #[derive(Debug)]
/// struct StorageError;
///
/// #[derive(Debug)]
/// struct RecordMissing;
///
/// impl std::fmt::Display for RecordMissing {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         f.write_str("record missing")
///     }
/// }
///
/// impl std::error::Error for RecordMissing {}
///
/// impl Exception for RecordMissing {
///     fn exception_type(&self) -> ExceptionType {
///         ExceptionType::of::<Self>()
///     }
///
///     fn ancestors(&self) -> Vec<ExceptionType> {
///         vec![ExceptionType::of::<StorageError>()]
///     }
/// }
/// ```
pub trait Exception: std::error::Error + AsAny + Send + Sync + 'static {
    /// The exception's own type
    fn exception_type(&self) -> ExceptionType;

    /// Ancestor types, most specific first
    fn ancestors(&self) -> Vec<ExceptionType> {
        Vec::new()
    }

    /// The tagged error, when this exception carries a kind
    fn as_api_error(&self) -> Option<&ApiError> {
        None
    }

    /// Attached context, if any
    fn context(&self) -> Option<&ErrorContext> {
        self.as_api_error().map(ApiError::context)
    }
}

impl dyn Exception {
    /// Own type followed by every ancestor
    pub fn lineage(&self) -> Vec<ExceptionType> {
        let mut lineage = vec![self.exception_type()];
        lineage.extend(self.ancestors());
        lineage
    }

    /// Downcast to a concrete error type, looking through foreign wrappers
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        if let Some(value) = self.as_any().downcast_ref::<T>() {
            return Some(value);
        }
        self.as_any()
            .downcast_ref::<Foreign>()
            .and_then(|foreign| foreign.inner.downcast_ref::<T>())
    }
}

impl Exception for ApiError {
    fn exception_type(&self) -> ExceptionType {
        ExceptionType::kind(self.kind().name())
    }

    fn ancestors(&self) -> Vec<ExceptionType> {
        let mut ancestors: Vec<ExceptionType> = self
            .kind()
            .lineage()
            .skip(1)
            .map(|kind| ExceptionType::kind(kind.name()))
            .collect();
        ancestors.push(ExceptionType::of::<ApiError>());
        ancestors
    }

    fn as_api_error(&self) -> Option<&ApiError> {
        Some(self)
    }
}

impl Exception for crate::error::Error {
    fn exception_type(&self) -> ExceptionType {
        ExceptionType::of::<Self>()
    }
}

impl Exception for std::io::Error {
    fn exception_type(&self) -> ExceptionType {
        ExceptionType::of::<Self>()
    }
}

impl Exception for serde_json::Error {
    fn exception_type(&self) -> ExceptionType {
        ExceptionType::of::<Self>()
    }
}

/// A third-party error that does not implement [`Exception`]
///
/// Keeps the wrapped value's concrete type for mapping lookups.
#[derive(Debug)]
pub struct Foreign {
    inner: anyhow::Error,
    exception_type: ExceptionType,
}

impl Foreign {
    /// Wrap any standard error
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: anyhow::Error::new(error),
            exception_type: ExceptionType::of::<E>(),
        }
    }
}

impl fmt::Display for Foreign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Foreign {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl Exception for Foreign {
    fn exception_type(&self) -> ExceptionType {
        self.exception_type.clone()
    }
}

/// An exception in flight from a handler to the dispatcher
///
/// Handlers return `Result<T, Raised>` and use `?` on any [`Exception`] or
/// `anyhow::Error`.
pub struct Raised(Box<dyn Exception>);

impl Raised {
    /// Wrap a standard error that does not implement [`Exception`]
    pub fn foreign<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Raised(Box::new(Foreign::new(error)))
    }

    /// Borrow the exception
    pub fn exception(&self) -> &dyn Exception {
        self.0.as_ref()
    }

    /// Take the exception
    pub fn into_inner(self) -> Box<dyn Exception> {
        self.0
    }
}

impl<E: Exception> From<E> for Raised {
    fn from(error: E) -> Self {
        Raised(Box::new(error))
    }
}

impl From<anyhow::Error> for Raised {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ApiError>() {
            Ok(api_error) => Raised(Box::new(api_error)),
            Err(error) => Raised(Box::new(Foreign {
                inner: error,
                exception_type: ExceptionType::of::<anyhow::Error>(),
            })),
        }
    }
}

impl fmt::Debug for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Raised").field(&self.0).finish()
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Host-side rendering of a passed-through exception
///
/// Mirrors an unhandled error reaching the transport: plain text 500 with the
/// exception's debug output.
impl IntoResponse for Raised {
    fn into_response(self) -> Response {
        tracing::error!(
            exception_type = %self.0.exception_type(),
            "Unhandled exception: {}",
            self.0
        );
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:?}", self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{ErrorTaxonomy, KindOptions};

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_api_error_lineage_walks_kinds() {
        let taxonomy = ErrorTaxonomy::default();
        taxonomy
            .register("card_declined", KindOptions::new().parent("invalid_resource"))
            .expect("register");
        let err = ApiError::named_in(&taxonomy, "card_declined");
        let raised = Raised::from(err);

        let lineage: Vec<String> = raised
            .exception()
            .lineage()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(lineage[0], "card_declined");
        assert_eq!(lineage[1], "invalid_resource");
        assert_eq!(lineage[2], "unknown");
        assert!(lineage[3].ends_with("ApiError"));
    }

    #[test]
    fn test_foreign_keeps_concrete_type() {
        let raised = Raised::foreign(Boom);
        assert_eq!(raised.exception().exception_type(), ExceptionType::of::<Boom>());
        assert!(raised.exception().downcast_ref::<Boom>().is_some());
        assert_eq!(raised.to_string(), "boom");
    }

    #[test]
    fn test_anyhow_unwraps_api_errors() {
        let raised = Raised::from(anyhow::Error::new(ApiError::throttled()));
        assert_eq!(
            raised.exception().as_api_error().map(|e| e.kind().name()),
            Some("throttled")
        );

        let raised = Raised::from(anyhow::anyhow!("opaque"));
        assert!(raised.exception().as_api_error().is_none());
        assert_eq!(
            raised.exception().exception_type(),
            ExceptionType::of::<anyhow::Error>()
        );
    }

    #[test]
    fn test_passed_through_exception_renders_500() {
        let response = Raised::foreign(Boom).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
