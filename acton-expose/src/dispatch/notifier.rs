//! Exception notifier selection and dispatch
//!
//! A handler has exactly one notifier. Named notifiers forward to a
//! host-supplied [`NotificationService`]; the core never talks to a tracking
//! service itself.

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use super::exception::Exception;

/// Snapshot of the request that raised an exception
#[derive(Debug, Clone)]
pub struct RequestData {
    /// Request method
    pub method: Method,
    /// Request URI
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Whether the request originates from the local machine
    pub local: bool,
}

impl RequestData {
    /// Build from request parts
    pub fn from_parts(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        Self {
            method,
            uri,
            headers,
            query,
            local: false,
        }
    }

    /// Mark the request as local
    #[must_use]
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// A bare GET request for `uri`
    pub fn get(uri: &str) -> Self {
        let uri = uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::from_parts(Method::GET, uri, HeaderMap::new())
    }

    /// Query parameter lookup
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Snapshot taken from request parts
///
/// Requests are local when the server exposes `ConnectInfo` and the peer is a
/// loopback address.
impl<S> FromRequestParts<S> for RequestData
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let local = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .is_some_and(|ConnectInfo(addr)| addr.ip().is_loopback());
        Ok(
            RequestData::from_parts(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
                .with_local(local),
        )
    }
}

/// Per-dispatch state a notifier may write to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchContext {
    /// Identifier from an external tracking service, echoed in the envelope
    pub error_identifier: Option<String>,
}

/// Built-in notifier names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifierName {
    /// No-op
    Default,
    /// Called with the exception and request data, skipped for local requests
    Airbrake,
    /// Called with the exception only
    Honeybadger,
    /// Called with the exception and the request
    Bugsnag,
}

impl NotifierName {
    /// Parse a configured name; anything unrecognised is `Default`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "airbrake" => NotifierName::Airbrake,
            "honeybadger" => NotifierName::Honeybadger,
            "bugsnag" => NotifierName::Bugsnag,
            _ => NotifierName::Default,
        }
    }

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifierName::Default => "default",
            NotifierName::Airbrake => "airbrake",
            NotifierName::Honeybadger => "honeybadger",
            NotifierName::Bugsnag => "bugsnag",
        }
    }
}

/// External exception tracking service supplied by the host
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Report an exception; `request` is absent for services that take none
    ///
    /// The returned string, when present, becomes the envelope's
    /// `error_identifier`.
    async fn notify(
        &self,
        exception: &dyn Exception,
        request: Option<&RequestData>,
    ) -> anyhow::Result<Option<String>>;
}

/// Directly supplied notifier callback
pub type NotifierCallback =
    Arc<dyn Fn(&mut DispatchContext, &dyn Exception, &RequestData) + Send + Sync>;

/// The notifier active on a handler
#[derive(Clone)]
pub enum Notifier {
    /// A built-in adapter
    Named(NotifierName),
    /// A callback used as-is
    Custom(NotifierCallback),
}

impl Default for Notifier {
    fn default() -> Self {
        Notifier::Named(NotifierName::Default)
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notifier::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Notifier::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Notifier {
    /// Select a built-in adapter by name
    pub fn named(name: &str) -> Self {
        Notifier::Named(NotifierName::parse(name))
    }

    /// Use a callback directly
    pub fn custom<F>(callback: F) -> Self
    where
        F: Fn(&mut DispatchContext, &dyn Exception, &RequestData) + Send + Sync + 'static,
    {
        Notifier::Custom(Arc::new(callback))
    }

    /// Whether this is the no-op default
    pub fn is_default(&self) -> bool {
        matches!(self, Notifier::Named(NotifierName::Default))
    }

    /// Run the notifier
    ///
    /// Service failures are logged and swallowed.
    pub async fn dispatch(
        &self,
        context: &mut DispatchContext,
        exception: &dyn Exception,
        request: &RequestData,
        services: &NotificationServices,
    ) {
        let name = match self {
            Notifier::Custom(callback) => {
                callback(context, exception, request);
                return;
            }
            Notifier::Named(NotifierName::Default) => return,
            Notifier::Named(name) => *name,
        };

        let Some(service) = services.get(name) else {
            tracing::debug!(notifier = name.as_str(), "No notification service installed");
            return;
        };

        let result = match name {
            NotifierName::Airbrake if request.local => {
                tracing::debug!("Skipping airbrake notification for local request");
                return;
            }
            NotifierName::Airbrake | NotifierName::Bugsnag => {
                service.notify(exception, Some(request)).await
            }
            NotifierName::Honeybadger => service.notify(exception, None).await,
            NotifierName::Default => return,
        };

        match result {
            Ok(Some(identifier)) => context.error_identifier = Some(identifier),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    notifier = name.as_str(),
                    error = %e,
                    "Exception notification failed"
                );
            }
        }
    }
}

/// Notification services installed by the host, keyed by notifier name
#[derive(Clone, Default)]
pub struct NotificationServices {
    services: HashMap<NotifierName, Arc<dyn NotificationService>>,
}

impl NotificationServices {
    /// No services
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a service under a built-in name
    #[must_use]
    pub fn with(mut self, name: NotifierName, service: Arc<dyn NotificationService>) -> Self {
        self.services.insert(name, service);
        self
    }

    /// Service installed under `name`
    pub fn get(&self, name: NotifierName) -> Option<&Arc<dyn NotificationService>> {
        self.services.get(&name)
    }
}

impl fmt::Debug for NotificationServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.services.keys()).finish()
    }
}
