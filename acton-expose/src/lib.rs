//! # acton-expose
//!
//! Response envelopes, pagination metadata, ETag caching and a hierarchical
//! error taxonomy for axum APIs.
//!
//! ## Features
//!
//! - **Envelopes**: `{response, count, pagination}` for success and
//!   `{error, error_description, ...}` for failure, with opt-in `X-Api-*`
//!   headers, RFC 5988 `Link` headers and JSONP
//! - **Error taxonomy**: named kinds with inherited HTTP statuses, a
//!   per-handler exception mapping table and pluggable notifiers
//! - **Caching**: ETags backed by an in-memory or Redis store, `max-age` for
//!   collections
//! - **Versioning**: request version validation as axum middleware
//! - **Client**: decoding of envelopes returned by another service
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_expose::prelude::*;
//! use axum::{extract::State, routing::get, Router};
//! use std::sync::Arc;
//!
//! async fn index(
//!     State(api): State<Arc<ApiHandler>>,
//!     request: RequestData,
//! ) -> std::result::Result<Envelope, Raised> {
//!     api.call(&request, "index", || async {
//!         let users = vec![serde_json::json!({"name": "Alice"})];
//!         Ok::<_, Raised>(Page::new(users, 1, 10, 1))
//!     })
//!     .await
//! }
//!
//! #[tokio::main]
//! async fn main() -> acton_expose::Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let api = Arc::new(ApiHandler::new(config));
//!     let app: Router = versioned(
//!         Router::new().route("/{version}/users", get(index)).with_state(api),
//!         VersionPolicy::new(["1"]),
//!     );
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
//!         .await
//!         .map_err(|e| Error::Internal(e.to_string()))?;
//!     axum::serve(listener, app)
//!         .await
//!         .map_err(|e| Error::Internal(e.to_string()))?;
//!     Ok(())
//! }
//! ```

pub mod caching;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expose;
pub mod handler;
pub mod i18n;
pub mod observability;
pub mod taxonomy;
pub mod versioning;

pub use error::{Error, Result};

#[doc(hidden)]
pub mod __private {
    pub use serde_json::{to_value, Value};
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::caching::{Cacheable, CacheStore, ETagCache, MemoryStore};
    #[cfg(feature = "cache")]
    pub use crate::caching::RedisStore;
    pub use crate::client::{decode_envelope, ApiClient, ClientError, Decoded};
    pub use crate::config::{Config, ErrorPolicy};
    pub use crate::dispatch::{
        Exception, ExceptionType, NotificationService, NotificationServices, NotifierName, Raised,
        RequestData,
    };
    pub use crate::error::{Error, Result};
    pub use crate::expose::{
        Envelope, Exposable, ExposureKind, Link, OffsetPage, Page, PaginationInfo,
        PaginationSource, Plain, SerializationContext, Serializer,
    };
    pub use crate::handler::{
        ApiHandler, DefaultHooks, HandlerConfig, HandlerHooks, JsonpOptions,
    };
    pub use crate::i18n::{StaticTranslations, Translator};
    pub use crate::impl_exposable;
    pub use crate::observability::init_tracing;
    pub use crate::taxonomy::{ApiError, ErrorContext, ErrorKind, ErrorTaxonomy, KindOptions};
    pub use crate::versioning::{versioned, RequestedVersion, VersionPolicy};
}
