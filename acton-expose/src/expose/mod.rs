//! Value classification, serialization and envelope assembly

mod builder;
mod classify;
mod envelope;
mod links;
mod pagination;
mod serialize;

pub use builder::ResponseEnvelopeBuilder;
pub use classify::{classify, Exposable, ExposureKind, Plain};
pub use envelope::{is_valid_callback, Envelope};
pub use links::{pagination_links, Link, LinkSet};
pub use pagination::{detect, OffsetPage, Page, PaginationInfo, PaginationSource};
pub use serialize::{ExposeOptions, SerializationContext, SerializationResolver, Serializer};
