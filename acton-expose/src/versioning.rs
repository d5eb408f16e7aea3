//! API version validation
//!
//! Every request names the API version it targets, usually as the first path
//! segment after an optional base path (`/1/users`, `/api/v2/users`). A
//! [`VersionPolicy`] decides whether that token is acceptable. Rejected
//! requests always receive an `invalid_version` envelope, whatever the error
//! pass-through policy says.
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_expose::versioning::{versioned, RequestedVersion, VersionPolicy};
//! use axum::{routing::get, Router};
//!
//! async fn echo(RequestedVersion(version): RequestedVersion) -> String {
//!     version
//! }
//!
//! let policy = VersionPolicy::new(["1", "2"]).with_prefix("v", false);
//! let app: Router = versioned(Router::new().route("/{version}/echo", get(echo)), policy);
//! ```

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::taxonomy::ApiError;

/// Version prefix such as the `v` in `v1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPrefix {
    /// Prefix text
    pub text: String,
    /// Reject tokens without the prefix
    pub required: bool,
}

/// Allowed versions and prefix rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPolicy {
    versions: BTreeSet<String>,
    prefix: Option<VersionPrefix>,
    base_path: Option<String>,
}

impl VersionPolicy {
    /// Allow exactly these versions, with no prefix
    pub fn new<I, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
            prefix: None,
            base_path: None,
        }
    }

    /// Accept a prefix before the version number
    #[must_use]
    pub fn with_prefix(mut self, text: impl Into<String>, required: bool) -> Self {
        self.prefix = Some(VersionPrefix {
            text: text.into(),
            required,
        });
        self
    }

    /// Path the version segment is nested under (e.g. "/api")
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_matches('/');
        self.base_path = (!trimmed.is_empty()).then(|| format!("/{}", trimmed));
        self
    }

    /// Allowed versions
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(String::as_str)
    }

    /// Prefix rules, if any
    pub fn prefix(&self) -> Option<&VersionPrefix> {
        self.prefix.as_ref()
    }

    /// Base path, if any
    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    /// Validate a raw version token and return the bare version
    ///
    /// A required prefix must be present; an optional one is stripped when
    /// present. Without a prefix configured any leading text is invalid. What
    /// remains must equal an allowed version exactly.
    pub fn validate(&self, raw: Option<&str>) -> Result<String, ApiError> {
        let raw = raw.map(str::trim).filter(|raw| !raw.is_empty());
        let Some(raw) = raw else {
            return Err(reject("missing", None));
        };

        let version = match &self.prefix {
            Some(prefix) => match raw.strip_prefix(prefix.text.as_str()) {
                Some(stripped) => stripped,
                None if prefix.required => return Err(reject("prefix required", Some(raw))),
                None => raw,
            },
            None => raw,
        };

        if self.versions.contains(version) {
            Ok(version.to_string())
        } else {
            Err(reject("not allowed", Some(raw)))
        }
    }

    /// Validate the version segment of a request path
    pub fn validate_path(&self, path: &str) -> Result<String, ApiError> {
        self.validate(extract_version_from_path(path, self.base_path()))
    }
}

fn reject(reason: &str, raw: Option<&str>) -> ApiError {
    tracing::debug!(reason, version = raw, "Rejected API version");
    ApiError::invalid_version()
}

/// Version segment of a request path
///
/// The first non-empty segment after `base_path`; `None` when the path does
/// not start with the base path.
pub fn extract_version_from_path<'p>(path: &'p str, base_path: Option<&str>) -> Option<&'p str> {
    let rest = match base_path {
        Some(base) => {
            let rest = path.strip_prefix(base)?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return None;
            }
            rest
        }
        None => path,
    };
    rest.split('/').find(|segment| !segment.is_empty())
}

/// The validated version of the current request
///
/// Inserted by [`version_guard`]; extracting it on an unguarded route yields
/// an `invalid_version` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedVersion(pub String);

impl<S> FromRequestParts<S> for RequestedVersion
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestedVersion>()
            .cloned()
            .ok_or_else(ApiError::invalid_version)
    }
}

/// Middleware rejecting requests whose path carries no acceptable version
pub async fn version_guard(
    State(policy): State<Arc<VersionPolicy>>,
    mut request: Request,
    next: Next,
) -> Response {
    match policy.validate_path(request.uri().path()) {
        Ok(version) => {
            request.extensions_mut().insert(RequestedVersion(version));
            next.run(request).await
        }
        Err(error) => error.into_response(),
    }
}

/// Guard every route of `router` with `policy`
pub fn versioned(router: Router, policy: VersionPolicy) -> Router {
    router.layer(middleware::from_fn_with_state(
        Arc::new(policy),
        version_guard,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn policy() -> VersionPolicy {
        VersionPolicy::new(["1", "2"])
    }

    fn is_invalid(result: Result<String, ApiError>) -> bool {
        matches!(result, Err(e) if e.kind().name() == "invalid_version")
    }

    #[test]
    fn test_optional_prefix() {
        let policy = policy().with_prefix("v", false);
        assert_eq!(policy.validate(Some("v1")).ok().as_deref(), Some("1"));
        assert_eq!(policy.validate(Some("1")).ok().as_deref(), Some("1"));
        assert!(is_invalid(policy.validate(Some("x1"))));
    }

    #[test]
    fn test_required_prefix() {
        let policy = policy().with_prefix("v", true);
        assert_eq!(policy.validate(Some("v1")).ok().as_deref(), Some("1"));
        assert!(is_invalid(policy.validate(Some("1"))));
        assert!(is_invalid(policy.validate(Some("x1"))));
    }

    #[test]
    fn test_prefix_not_allowed() {
        assert!(is_invalid(policy().validate(Some("v1"))));
    }

    #[test]
    fn test_version_numbers() {
        for version in ["1", "2"] {
            assert_eq!(policy().validate(Some(version)).ok().as_deref(), Some(version));
        }
        for version in ["0", "3", "10", "2.5", "2.2", "1.1"] {
            assert!(is_invalid(policy().validate(Some(version))), "{version}");
        }
        assert!(is_invalid(policy().validate(None)));
        assert!(is_invalid(policy().validate(Some(""))));
    }

    #[test]
    fn test_extract_version_from_path() {
        assert_eq!(extract_version_from_path("/1/users", None), Some("1"));
        assert_eq!(extract_version_from_path("/api/v2/users/123", Some("/api")), Some("v2"));
        assert_eq!(extract_version_from_path("/apiv2/users", Some("/api")), None);
        assert_eq!(extract_version_from_path("/users", Some("/api")), None);
        assert_eq!(extract_version_from_path("/", None), None);
    }

    #[test]
    fn test_base_path_normalized() {
        let policy = policy().with_base_path("api/");
        assert_eq!(policy.base_path(), Some("/api"));
        assert_eq!(policy.validate_path("/api/2/users").ok().as_deref(), Some("2"));
    }

    async fn echo(RequestedVersion(version): RequestedVersion) -> String {
        version
    }

    fn app() -> Router {
        versioned(
            Router::new().route("/{version}/echo", get(echo)),
            policy().with_prefix("v", false),
        )
    }

    async fn call(uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_guard_passes_valid_version() {
        let (status, body) = call("/v2/echo").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"2");
    }

    #[tokio::test]
    async fn test_guard_rejects_invalid_version() {
        let (status, body) = call("/3/echo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(body["error"], json!("invalid_version"));
    }
}
