//! Hierarchical error kinds and the values that carry them

mod api_error;
mod kind;
mod registry;

pub use api_error::{ApiError, ErrorContext, ValidationMessages, METADATA_KEY};
pub use kind::{ErrorKind, ROOT_KIND};
pub use registry::{ErrorTaxonomy, KindOptions, SYSTEM_KIND};
