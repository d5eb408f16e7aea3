//! Exposure classification and value capabilities

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::pagination::{detect, OffsetPage, Page, PaginationInfo, PaginationSource};
use super::serialize::Serializer;
use crate::caching::Cacheable;
use crate::error::Result;

/// Shape of an exposed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureKind {
    /// A single record
    Resource,
    /// An ordered sequence
    Collection,
    /// A sequence carrying pagination numbers
    Paginated,
}

impl ExposureKind {
    /// True for [`ExposureKind::Resource`]
    pub fn is_singular(&self) -> bool {
        matches!(self, ExposureKind::Resource)
    }
}

/// A value a handler can expose
///
/// Only [`to_json`](Exposable::to_json) is required. The other methods are
/// capabilities a type opts into by overriding them.
pub trait Exposable: Send + Sync {
    /// Generic JSON conversion
    fn to_json(&self) -> Result<Value>;

    /// Serializer associated with this value
    fn serializer(&self) -> Option<Arc<dyn Serializer>> {
        None
    }

    /// Reduction to a plain structure, preferred over [`to_json`](Exposable::to_json)
    fn serializable_hash(&self) -> Option<Value> {
        None
    }

    /// ETag capability
    fn cacheable(&self) -> Option<&dyn Cacheable> {
        None
    }

    /// Pagination capability
    fn pagination_source(&self) -> Option<&dyn PaginationSource> {
        None
    }

    /// Elements, when the value behaves as an ordered sequence
    fn members(&self) -> Option<Vec<&dyn Exposable>> {
        None
    }
}

/// Classify a value as paginated, collection or resource, in that order
pub fn classify(value: &dyn Exposable) -> (ExposureKind, Option<PaginationInfo>) {
    let (kind, pagination) = if let Some(info) = detect(value) {
        (ExposureKind::Paginated, Some(info))
    } else if value.members().is_some() {
        (ExposureKind::Collection, None)
    } else {
        (ExposureKind::Resource, None)
    };
    tracing::debug!(kind = ?kind, "Classified exposed value");
    (kind, pagination)
}

impl Exposable for Value {
    fn to_json(&self) -> Result<Value> {
        Ok(self.clone())
    }

    fn members(&self) -> Option<Vec<&dyn Exposable>> {
        match self {
            Value::Array(items) => Some(items.iter().map(|item| item as &dyn Exposable).collect()),
            _ => None,
        }
    }
}

fn members_of<T: Exposable>(items: &[T]) -> Vec<&dyn Exposable> {
    items.iter().map(|item| item as &dyn Exposable).collect()
}

fn json_array<T: Exposable>(items: &[T]) -> Result<Value> {
    items
        .iter()
        .map(Exposable::to_json)
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

impl<T: Exposable> Exposable for Vec<T> {
    fn to_json(&self) -> Result<Value> {
        json_array(self)
    }

    fn members(&self) -> Option<Vec<&dyn Exposable>> {
        Some(members_of(self))
    }
}

impl<T: Exposable> Exposable for Page<T> {
    fn to_json(&self) -> Result<Value> {
        json_array(&self.items)
    }

    fn pagination_source(&self) -> Option<&dyn PaginationSource> {
        Some(self)
    }

    fn members(&self) -> Option<Vec<&dyn Exposable>> {
        Some(members_of(&self.items))
    }
}

impl<T: Exposable> Exposable for OffsetPage<T> {
    fn to_json(&self) -> Result<Value> {
        json_array(&self.items)
    }

    fn pagination_source(&self) -> Option<&dyn PaginationSource> {
        Some(self)
    }

    fn members(&self) -> Option<Vec<&dyn Exposable>> {
        Some(members_of(&self.items))
    }
}

/// Exposes any `Serialize` value as a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct Plain<T>(pub T);

impl<T: Serialize + Send + Sync> Exposable for Plain<T> {
    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.0)?)
    }
}

/// Implement [`Exposable`] for `Serialize` types with no extra capabilities
///
/// ```rust
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// acton_expose::impl_exposable!(User);
/// ```
#[macro_export]
macro_rules! impl_exposable {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::expose::Exposable for $ty {
                fn to_json(&self) -> $crate::error::Result<$crate::__private::Value> {
                    Ok($crate::__private::to_value(self)?)
                }
            }
        )+
    };
}
