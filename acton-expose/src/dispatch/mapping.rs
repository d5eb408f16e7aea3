//! Exception type to error kind mapping

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::exception::{Exception, ExceptionType};
use crate::taxonomy::{ApiError, ErrorKind, ErrorTaxonomy};

/// Function turning a raised exception into a tagged error
pub type Converter = Arc<dyn Fn(&dyn Exception) -> ApiError + Send + Sync>;

/// What a mapped exception type turns into
#[derive(Clone)]
pub enum MappingTarget {
    /// A fixed kind
    Kind(Arc<ErrorKind>),
    /// A conversion function
    Convert(Converter),
}

impl fmt::Debug for MappingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingTarget::Kind(kind) => f.debug_tuple("Kind").field(&kind.name()).finish(),
            MappingTarget::Convert(_) => f.write_str("Convert(..)"),
        }
    }
}

/// Outcome of classifying an exception
#[derive(Debug, Clone)]
pub struct Classification {
    /// The tagged error that drives the envelope
    pub error: ApiError,
    /// The mapping entry or tagged kind that matched, if any
    pub matched: Option<ExceptionType>,
}

impl Classification {
    /// True when nothing in the table or the exception itself named a kind
    pub fn is_unmapped(&self) -> bool {
        self.matched.is_none()
    }
}

/// Per-handler table from exception types to kinds or conversions
///
/// Cloning produces an independent table; children of a handler get a clone
/// and can change it freely.
#[derive(Debug, Clone, Default)]
pub struct ErrorMappingTable {
    entries: HashMap<ExceptionType, MappingTarget>,
}

impl ErrorMappingTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an exception type to a kind
    pub fn insert(&mut self, exception_type: ExceptionType, kind: Arc<ErrorKind>) -> &mut Self {
        self.entries.insert(exception_type, MappingTarget::Kind(kind));
        self
    }

    /// Map an exception type to a conversion function
    pub fn insert_converter<F>(&mut self, exception_type: ExceptionType, convert: F) -> &mut Self
    where
        F: Fn(&dyn Exception) -> ApiError + Send + Sync + 'static,
    {
        self.entries
            .insert(exception_type, MappingTarget::Convert(Arc::new(convert)));
        self
    }

    /// Map a concrete Rust error type to a kind
    pub fn map<T: 'static>(&mut self, kind: Arc<ErrorKind>) -> &mut Self {
        self.insert(ExceptionType::of::<T>(), kind)
    }

    /// Map a concrete Rust error type through a typed conversion
    ///
    /// The conversion only runs when the exception downcasts to `T`; a
    /// descendant listing `T` as an ancestor that is not itself a `T` falls
    /// through to the `system` kind.
    pub fn map_with<T, F>(&mut self, convert: F) -> &mut Self
    where
        T: std::error::Error + Send + Sync + 'static,
        F: Fn(&T) -> ApiError + Send + Sync + 'static,
    {
        self.insert_converter(ExceptionType::of::<T>(), move |exception| {
            match exception.downcast_ref::<T>() {
                Some(error) => convert(error),
                None => ApiError::system().with_message(exception.to_string()),
            }
        })
    }

    /// Look up an exact entry
    pub fn get(&self, exception_type: &ExceptionType) -> Option<&MappingTarget> {
        self.entries.get(exception_type)
    }

    /// Drop an entry
    pub fn remove(&mut self, exception_type: &ExceptionType) -> Option<MappingTarget> {
        self.entries.remove(exception_type)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an exception to a tagged error
    ///
    /// Walks the exception's own type then its ancestors, nearest first, and
    /// uses the first entry found. Without an entry a tagged [`ApiError`]
    /// keeps its kind, re-read from `taxonomy` when registered there, and
    /// anything else becomes `system`.
    pub fn classify(&self, exception: &dyn Exception, taxonomy: &ErrorTaxonomy) -> Classification {
        for exception_type in exception.lineage() {
            let Some(target) = self.entries.get(&exception_type) else {
                continue;
            };

            tracing::debug!(
                exception_type = %exception.exception_type(),
                matched = %exception_type,
                "Exception matched error mapping"
            );

            let error = match target {
                MappingTarget::Kind(kind) => {
                    let mut error = ApiError::new(kind.clone());
                    if let Some(context) = exception.context() {
                        error = error.with_context(context.clone());
                    }
                    if let Some(message) = exception.as_api_error().and_then(ApiError::message) {
                        error = error.with_message(message);
                    }
                    error
                }
                MappingTarget::Convert(convert) => convert(exception),
            };

            return Classification {
                error,
                matched: Some(exception_type),
            };
        }

        match exception.as_api_error() {
            Some(error) => {
                let error = match taxonomy.lookup(error.kind().name()) {
                    Some(kind) => error.clone().with_kind(kind),
                    None => error.clone(),
                };
                Classification {
                    error,
                    matched: Some(exception.exception_type()),
                }
            }
            None => Classification {
                error: ApiError::new(taxonomy.system()),
                matched: None,
            },
        }
    }
}
