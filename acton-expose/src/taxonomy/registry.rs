//! Process-wide error kind registry
//!
//! Reads go against an immutable snapshot held in an [`ArcSwap`], so lookups
//! during request handling never take a lock. Registration builds a new map
//! and publishes it with read-copy-update.

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

use super::kind::{ErrorKind, ROOT_KIND};
use crate::config::Config;
use crate::error::{Error, Result};

/// Name of the kind used for unmapped exceptions
pub const SYSTEM_KIND: &str = "system";

static GLOBAL: Lazy<Arc<ErrorTaxonomy>> =
    Lazy::new(|| Arc::new(ErrorTaxonomy::with_builtins(StatusCode::SERVICE_UNAVAILABLE)));

/// Options accepted by [`ErrorTaxonomy::register`]
#[derive(Debug, Clone, Default)]
pub struct KindOptions {
    /// Explicit HTTP status; inherited from the parent when unset
    pub http_status: Option<StatusCode>,
    /// Name of a registered parent kind; defaults to `unknown`
    pub parent: Option<String>,
    /// Default human readable message
    pub display_name: Option<String>,
    /// Envelope name when it should differ from the registration key
    pub error_name: Option<String>,
}

impl KindOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP status
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Set the parent kind by name
    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the default message
    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the envelope name
    #[must_use]
    pub fn error_name(mut self, error_name: impl Into<String>) -> Self {
        self.error_name = Some(error_name.into());
        self
    }
}

/// Registry mapping a symbolic name to an [`ErrorKind`]
#[derive(Debug)]
pub struct ErrorTaxonomy {
    kinds: ArcSwap<HashMap<String, Arc<ErrorKind>>>,
}

impl ErrorTaxonomy {
    /// A taxonomy holding only the `unknown` root
    pub fn new() -> Self {
        let mut kinds = HashMap::new();
        kinds.insert(ROOT_KIND.to_string(), Arc::new(ErrorKind::root()));
        Self {
            kinds: ArcSwap::from_pointee(kinds),
        }
    }

    /// A taxonomy seeded with the built-in kinds
    pub fn with_builtins(throttled_status: StatusCode) -> Self {
        let taxonomy = Self::new();
        let builtins = [
            (SYSTEM_KIND, StatusCode::INTERNAL_SERVER_ERROR, "An unknown system error occurred"),
            ("invalid_version", StatusCode::BAD_REQUEST, "This API version is not supported"),
            ("invalid_resource", StatusCode::UNPROCESSABLE_ENTITY, "The current resource was deemed invalid"),
            ("throttled", throttled_status, "The action you are trying to perform has been throttled"),
            ("not_implemented", StatusCode::NOT_IMPLEMENTED, "The specified endpoint has not been implemented"),
            ("unauthenticated", StatusCode::UNAUTHORIZED, "Authentication is required to access this resource"),
            ("forbidden", StatusCode::FORBIDDEN, "You are not allowed to access this resource"),
            ("not_found", StatusCode::NOT_FOUND, "The requested resource could not be found"),
            ("conflict", StatusCode::CONFLICT, "The resource conflicts with an existing one"),
            ("bad_request", StatusCode::BAD_REQUEST, "The request could not be understood"),
        ];

        let mut kinds = HashMap::clone(&taxonomy.kinds.load());
        let root = kinds
            .get(ROOT_KIND)
            .cloned()
            .unwrap_or_else(|| Arc::new(ErrorKind::root()));
        for (name, status, display) in builtins {
            let kind = ErrorKind::new(name)
                .with_parent(root.clone())
                .with_status(status)
                .with_display_name(display);
            kinds.insert(name.to_string(), Arc::new(kind));
        }
        taxonomy.kinds.store(Arc::new(kinds));
        taxonomy
    }

    /// A taxonomy seeded from configuration
    ///
    /// An out-of-range `errors.throttled_status` falls back to 503.
    pub fn from_config(config: &Config) -> Self {
        let throttled = match config.errors.throttled_status {
            Some(code) => StatusCode::from_u16(code).unwrap_or_else(|_| {
                tracing::warn!(code, "Invalid throttled status, using 503");
                StatusCode::SERVICE_UNAVAILABLE
            }),
            None => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::with_builtins(throttled)
    }

    /// The process-wide default taxonomy
    pub fn global() -> Arc<ErrorTaxonomy> {
        GLOBAL.clone()
    }

    /// Register a kind, replacing any kind already published under the same name
    ///
    /// Fails with [`Error::InvalidParent`] before anything is published when
    /// the named parent is not registered.
    pub fn register(&self, name: &str, options: KindOptions) -> Result<Arc<ErrorKind>> {
        let parent = match options.parent.as_deref() {
            Some(parent) => Some(self.lookup(parent).ok_or_else(|| Error::InvalidParent {
                name: name.to_string(),
                parent: parent.to_string(),
            })?),
            None if name == ROOT_KIND => None,
            None => Some(self.unknown()),
        };

        let mut kind = ErrorKind::new(name);
        if let Some(parent) = parent {
            kind = kind.with_parent(parent);
        }
        if let Some(status) = options.http_status {
            kind = kind.with_status(status);
        } else if name == ROOT_KIND {
            kind = kind.with_status(StatusCode::BAD_REQUEST);
        }
        if let Some(display_name) = options.display_name {
            kind = kind.with_display_name(display_name);
        }
        if let Some(error_name) = options.error_name {
            kind = kind.with_error_name(error_name);
        }

        let kind = self.add(kind);
        tracing::debug!(
            error = kind.name(),
            registered_as = kind.registered_as(),
            status = kind.http_status().as_u16(),
            "Registered error kind"
        );
        Ok(kind)
    }

    /// Publish a pre-built kind under its envelope name
    pub fn add(&self, kind: ErrorKind) -> Arc<ErrorKind> {
        let kind = Arc::new(kind);
        let key = kind.name().to_string();
        self.kinds.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(key.clone(), kind.clone());
            next
        });
        kind
    }

    /// Look up a kind by name
    pub fn lookup(&self, name: &str) -> Option<Arc<ErrorKind>> {
        self.kinds.load().get(name).cloned()
    }

    /// Look up a kind by name, failing with [`Error::UnknownKind`]
    pub fn require(&self, name: &str) -> Result<Arc<ErrorKind>> {
        self.lookup(name)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))
    }

    /// Independent snapshot of every registered kind
    pub fn all(&self) -> HashMap<String, Arc<ErrorKind>> {
        HashMap::clone(&self.kinds.load())
    }

    /// The `unknown` root
    pub fn unknown(&self) -> Arc<ErrorKind> {
        self.lookup(ROOT_KIND)
            .unwrap_or_else(|| Arc::new(ErrorKind::root()))
    }

    /// The `system` kind used for unmapped exceptions
    pub fn system(&self) -> Arc<ErrorKind> {
        self.lookup(SYSTEM_KIND).unwrap_or_else(|| {
            Arc::new(
                ErrorKind::new(SYSTEM_KIND)
                    .with_parent(self.unknown())
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR),
            )
        })
    }
}

impl Default for ErrorTaxonomy {
    fn default() -> Self {
        Self::with_builtins(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let taxonomy = ErrorTaxonomy::with_builtins(StatusCode::TOO_MANY_REQUESTS);
        let expected = [
            ("unknown", 400),
            ("system", 500),
            ("invalid_version", 400),
            ("invalid_resource", 422),
            ("throttled", 429),
            ("not_implemented", 501),
            ("unauthenticated", 401),
            ("forbidden", 403),
            ("not_found", 404),
            ("conflict", 409),
            ("bad_request", 400),
        ];
        for (name, status) in expected {
            let kind = taxonomy.lookup(name).expect(name);
            assert_eq!(kind.http_status().as_u16(), status, "{name}");
            assert!(kind.is_a("unknown"));
        }
    }

    #[test]
    fn test_register_then_lookup_round_trip() {
        let taxonomy = ErrorTaxonomy::default();
        let registered = taxonomy
            .register(
                "payment_required",
                KindOptions::new()
                    .status(StatusCode::PAYMENT_REQUIRED)
                    .parent("bad_request"),
            )
            .expect("register");

        let found = taxonomy.lookup("payment_required").expect("lookup");
        assert_eq!(found, registered);
        assert_eq!(found.http_status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(found.parent().map(|p| p.name()), Some("bad_request"));
    }

    #[test]
    fn test_reregistering_replaces() {
        let taxonomy = ErrorTaxonomy::default();
        let before = taxonomy.all().len();
        taxonomy
            .register("gone", KindOptions::new().status(StatusCode::GONE))
            .expect("first");
        taxonomy
            .register("gone", KindOptions::new().status(StatusCode::NOT_FOUND))
            .expect("second");

        assert_eq!(taxonomy.all().len(), before + 1);
        assert_eq!(
            taxonomy.lookup("gone").map(|k| k.http_status()),
            Some(StatusCode::NOT_FOUND)
        );
        assert!(taxonomy.lookup("system").is_some());
    }

    #[test]
    fn test_status_defaults_to_parent() {
        let taxonomy = ErrorTaxonomy::default();
        let kind = taxonomy
            .register("card_declined", KindOptions::new().parent("invalid_resource"))
            .expect("register");
        assert_eq!(kind.http_status(), StatusCode::UNPROCESSABLE_ENTITY);

        let orphan = taxonomy
            .register("vague", KindOptions::new())
            .expect("register");
        assert_eq!(orphan.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_parent_is_rejected_before_publication() {
        let taxonomy = ErrorTaxonomy::default();
        let err = taxonomy
            .register("child", KindOptions::new().parent("std_error"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParent { .. }));
        assert!(taxonomy.lookup("child").is_none());
    }

    #[test]
    fn test_error_name_publishes_under_new_name() {
        let taxonomy = ErrorTaxonomy::default();
        let kind = taxonomy
            .register("throttled_hard", KindOptions::new().error_name("slow_down"))
            .expect("register");
        assert_eq!(kind.name(), "slow_down");
        assert_eq!(kind.registered_as(), "throttled_hard");
        assert!(taxonomy.lookup("slow_down").is_some());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let taxonomy = ErrorTaxonomy::default();
        let mut snapshot = taxonomy.all();
        snapshot.remove("system");
        snapshot.insert("bogus".to_string(), Arc::new(ErrorKind::new("bogus")));
        assert!(taxonomy.lookup("system").is_some());
        assert!(taxonomy.lookup("bogus").is_none());
    }

    #[test]
    fn test_global_has_builtins() {
        let kind = ErrorTaxonomy::global().require("throttled").expect("throttled");
        assert_eq!(kind.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(matches!(
            ErrorTaxonomy::global().require("nope"),
            Err(Error::UnknownKind(_))
        ));
    }

    #[test]
    fn test_from_config_uses_throttled_status() {
        let mut config = Config::default();
        config.errors.throttled_status = Some(429);
        let taxonomy = ErrorTaxonomy::from_config(&config);
        assert_eq!(
            taxonomy.require("throttled").map(|k| k.http_status()).ok(),
            Some(StatusCode::TOO_MANY_REQUESTS)
        );
    }
}
