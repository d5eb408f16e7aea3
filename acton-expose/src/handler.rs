//! Per-handler configuration and the request-facing entry points
//!
//! An [`ApiHandler`] ties together everything a group of endpoints shares:
//! the process [`Config`], an error mapping table, a notifier, the cached
//! actions and JSONP options. Child handlers start from a copy of their
//! parent's [`HandlerConfig`] and change it independently.
//!
//! # Example
//!
//! ```rust,no_run
//! use acton_expose::prelude::*;
//! use axum::{routing::get, Router};
//! use std::sync::Arc;
//!
//! async fn show(
//!     axum::extract::State(api): axum::extract::State<Arc<ApiHandler>>,
//!     request: RequestData,
//! ) -> std::result::Result<Envelope, Raised> {
//!     api.call(&request, "show", || async {
//!         Ok::<_, Raised>(serde_json::json!({"id": 1, "name": "Alice"}))
//!     })
//!     .await
//! }
//!
//! let api = Arc::new(ApiHandler::new(Config::default()));
//! let app: Router = Router::new().route("/users/1", get(show)).with_state(api);
//! ```

use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::caching::ETagCache;
use crate::config::{Config, ErrorPolicy};
use crate::dispatch::{
    DispatchContext, ErrorMappingTable, ErrorResolver, Exception, NotificationServices, Notifier,
    Raised, RequestData,
};
use crate::expose::{
    Envelope, Exposable, ExposureKind, ResponseEnvelopeBuilder, SerializationResolver,
};
use crate::i18n::Translator;
use crate::taxonomy::{ErrorKind, ErrorTaxonomy};

/// Overridable per-handler behaviour
///
/// Every method has a default; implement only what you need.
pub trait HandlerHooks: Send + Sync {
    /// Override `body.error`
    fn lookup_error_name(&self, _exception: &dyn Exception) -> Option<String> {
        None
    }

    /// Override `body.error_description`
    fn lookup_error_message(&self, _exception: &dyn Exception) -> Option<String> {
        None
    }

    /// Override the response status
    fn lookup_error_status(&self, _exception: &dyn Exception) -> Option<StatusCode> {
        None
    }

    /// Replace the flattened extras, which default to the context metadata
    fn lookup_error_extras(&self, _exception: &dyn Exception) -> Option<Map<String, Value>> {
        None
    }

    /// Runs before serialization; may only add headers
    fn pre_process(
        &self,
        _value: &dyn Exposable,
        _kind: ExposureKind,
        _singular: bool,
        _headers: &mut HeaderMap,
    ) {
    }

    /// Runs after serialization; may only add headers
    fn post_process(
        &self,
        _value: &dyn Exposable,
        _kind: ExposureKind,
        _singular: bool,
        _headers: &mut HeaderMap,
    ) {
    }

    /// URL of page `page` for pagination `Link` headers
    fn page_url(&self, _page: u64, _request: &RequestData) -> Option<String> {
        None
    }
}

/// Hooks that override nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl HandlerHooks for DefaultHooks {}

/// JSONP wrapping options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonpOptions {
    /// Master switch
    pub enabled: bool,
    /// Query parameter carrying the callback name
    pub parameter: String,
    /// Restrict wrapping to these actions
    pub only: Option<HashSet<String>>,
    /// Never wrap these actions
    pub except: HashSet<String>,
}

impl JsonpOptions {
    /// Enabled for every action with the `callback` parameter
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Disabled
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Use a different query parameter
    #[must_use]
    pub fn parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = parameter.into();
        self
    }

    /// Only wrap these actions
    #[must_use]
    pub fn only<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.only = Some(actions.into_iter().map(Into::into).collect());
        self
    }

    /// Never wrap these actions
    #[must_use]
    pub fn except<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.except = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `action` may be wrapped
    pub fn applies_to(&self, action: &str) -> bool {
        self.enabled
            && !self.except.contains(action)
            && self.only.as_ref().map_or(true, |only| only.contains(action))
    }

    /// The callback to wrap with, if this request qualifies
    ///
    /// Only GET requests carrying the parameter are wrapped.
    pub fn callback_for<'r>(&self, action: &str, request: &'r RequestData) -> Option<&'r str> {
        if request.method != Method::GET || !self.applies_to(action) {
            return None;
        }
        request.param(&self.parameter).filter(|cb| !cb.is_empty())
    }
}

impl Default for JsonpOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            parameter: "callback".to_string(),
            only: None,
            except: HashSet::new(),
        }
    }
}

/// Inheritable per-handler configuration
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    /// Exception mapping table
    pub mapping: ErrorMappingTable,
    /// Active notifier
    pub notifier: Notifier,
    /// Actions whose responses get caching headers
    pub cached_actions: HashSet<String>,
    /// max-age for cached collections; the configured timeout when unset
    pub caching_timeout: Option<Duration>,
    /// JSONP options
    pub jsonp: JsonpOptions,
}

impl HandlerConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent copy for a child handler
    pub fn inherit(&self) -> Self {
        self.clone()
    }

    /// Map an exception type to a kind
    #[must_use]
    pub fn map_error<T: 'static>(mut self, kind: Arc<ErrorKind>) -> Self {
        self.mapping.map::<T>(kind);
        self
    }

    /// Select a built-in notifier by name; unknown names select the no-op default
    #[must_use]
    pub fn use_named_exception_notifier(mut self, name: &str) -> Self {
        self.notifier = Notifier::named(name);
        self
    }

    /// Use a notifier callback directly
    #[must_use]
    pub fn exception_notifier_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut DispatchContext, &dyn Exception, &RequestData) + Send + Sync + 'static,
    {
        self.notifier = Notifier::custom(callback);
        self
    }

    /// Mark actions as cacheable
    #[must_use]
    pub fn caches<I, A>(mut self, actions: I, cache_for: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.cached_actions
            .extend(actions.into_iter().map(Into::into));
        if cache_for.is_some() {
            self.caching_timeout = cache_for;
        }
        self
    }

    /// Set JSONP options
    #[must_use]
    pub fn jsonp(mut self, jsonp: JsonpOptions) -> Self {
        self.jsonp = jsonp;
        self
    }

    /// Whether `action` is cacheable
    pub fn is_cached(&self, action: &str) -> bool {
        self.cached_actions.contains(action)
    }
}

/// Shapes responses and errors for a group of endpoints
#[derive(Clone)]
pub struct ApiHandler {
    config: Arc<Config>,
    policy: ErrorPolicy,
    handler: HandlerConfig,
    hooks: Arc<dyn HandlerHooks>,
    taxonomy: Arc<ErrorTaxonomy>,
    translator: Option<Arc<dyn Translator>>,
    services: NotificationServices,
    etags: Option<ETagCache>,
    resolver: SerializationResolver,
}

impl ApiHandler {
    /// Create a handler from process configuration
    ///
    /// Built-in kinds come from a taxonomy seeded with the configured
    /// `errors.throttled_status`.
    pub fn new(config: Config) -> Self {
        let policy = config.error_policy();
        let taxonomy = Arc::new(ErrorTaxonomy::from_config(&config));
        let resolver = SerializationResolver::new(config.exposure.serializers_enabled);
        Self {
            config: Arc::new(config),
            policy,
            handler: HandlerConfig::default(),
            hooks: Arc::new(DefaultHooks),
            taxonomy,
            translator: None,
            services: NotificationServices::default(),
            etags: None,
            resolver,
        }
    }

    /// A child handler with an independent copy of this handler's configuration
    pub fn child(&self) -> Self {
        let mut child = self.clone();
        child.handler = self.handler.inherit();
        child
    }

    /// Replace the handler configuration
    #[must_use]
    pub fn with_handler_config(mut self, handler: HandlerConfig) -> Self {
        self.handler = handler;
        self
    }

    /// Change the handler configuration in place
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(HandlerConfig) -> HandlerConfig) -> Self {
        self.handler = f(self.handler);
        self
    }

    /// Install hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn HandlerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Use a specific taxonomy instead of the one built from configuration
    #[must_use]
    pub fn with_taxonomy(mut self, taxonomy: Arc<ErrorTaxonomy>) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    /// Install a translator for error messages
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Install notification services for named notifiers
    #[must_use]
    pub fn with_notification_services(mut self, services: NotificationServices) -> Self {
        self.services = services;
        self
    }

    /// Install an ETag cache for cacheable actions
    #[must_use]
    pub fn with_etag_cache(mut self, etags: ETagCache) -> Self {
        self.etags = Some(etags);
        self
    }

    /// Override the error policy resolved from configuration
    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set URL options passed to serializers
    #[must_use]
    pub fn with_url_options(mut self, url_options: Map<String, Value>) -> Self {
        self.resolver = self.resolver.with_url_options(url_options);
        self
    }

    /// Process configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handler configuration
    pub fn handler_config(&self) -> &HandlerConfig {
        &self.handler
    }

    /// Resolved error policy
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Installed hooks
    pub fn hooks(&self) -> &dyn HandlerHooks {
        self.hooks.as_ref()
    }

    /// Active taxonomy
    pub fn taxonomy(&self) -> &ErrorTaxonomy {
        &self.taxonomy
    }

    /// Installed ETag cache
    pub fn etag_cache(&self) -> Option<&ETagCache> {
        self.etags.as_ref()
    }

    /// Serialization resolver
    pub fn resolver(&self) -> &SerializationResolver {
        &self.resolver
    }

    /// Start building a success envelope for `action`
    pub fn envelope<'a>(&'a self, request: &'a RequestData, action: &'a str) -> ResponseEnvelopeBuilder<'a> {
        ResponseEnvelopeBuilder::new(self, request, action)
    }

    /// Expose a value with default options
    ///
    /// Failures while building the envelope are rescued like any other
    /// exception.
    pub async fn expose(
        &self,
        request: &RequestData,
        action: &str,
        value: &dyn Exposable,
    ) -> Result<Envelope, Raised> {
        match self.envelope(request, action).build(value).await {
            Ok(envelope) => Ok(envelope),
            Err(e) => self.rescue(Raised::from(e), request, action).await,
        }
    }

    /// Empty response with the JSON content type
    pub fn head(&self, status: StatusCode) -> Envelope {
        Envelope::head(status)
    }

    /// Run a handler body and expose its value or rescue its error
    pub async fn call<F, Fut, T>(
        &self,
        request: &RequestData,
        action: &str,
        f: F,
    ) -> Result<Envelope, Raised>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Raised>>,
        T: Exposable,
    {
        match f().await {
            Ok(value) => self.expose(request, action, &value).await,
            Err(raised) => self.rescue(raised, request, action).await,
        }
    }

    /// Turn a raised exception into an error envelope
    ///
    /// Unmapped exceptions are handed back untouched when pass-through is on.
    /// Tagged and mapped errors are always enveloped.
    pub async fn rescue(
        &self,
        raised: Raised,
        request: &RequestData,
        action: &str,
    ) -> Result<Envelope, Raised> {
        let exception = raised.exception();
        let classification = self.handler.mapping.classify(exception, &self.taxonomy);

        if classification.is_unmapped() && self.policy.pass_through_errors {
            tracing::debug!(
                exception_type = %exception.exception_type(),
                "Passing unmapped exception through"
            );
            return Err(raised);
        }

        let resolver = ErrorResolver::new(
            self.hooks.as_ref(),
            self.translator.as_deref(),
            self.policy,
        );
        let mut fields = resolver.resolve(exception, &classification);

        let mut context = DispatchContext::default();
        self.handler
            .notifier
            .dispatch(&mut context, exception, request, &self.services)
            .await;
        fields.error_identifier = context.error_identifier;

        let mut envelope = Envelope::error(&fields);
        if let Some(callback) = self.handler.jsonp.callback_for(action, request) {
            envelope = envelope.with_jsonp(callback);
        }
        Ok(envelope)
    }
}

impl std::fmt::Debug for ApiHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiHandler")
            .field("service", &self.config.service.name)
            .field("policy", &self.policy)
            .field("handler", &self.handler)
            .field("etags", &self.etags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ExceptionType, NotificationService, NotifierName};
    use crate::i18n::StaticTranslations;
    use crate::taxonomy::ApiError;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("not implemented yet")]
    struct NotImplementedYet;

    impl Exception for NotImplementedYet {
        fn exception_type(&self) -> ExceptionType {
            ExceptionType::of::<Self>()
        }
    }

    fn policy(pass_through: bool) -> ErrorPolicy {
        ErrorPolicy {
            pass_through_errors: pass_through,
            show_exception_message: false,
        }
    }

    async fn body(envelope: Envelope) -> Value {
        let bytes = to_bytes(envelope.into_response().into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[test]
    fn test_jsonp_options() {
        let options = JsonpOptions::enabled().only(["index"]);
        assert!(options.applies_to("index"));
        assert!(!options.applies_to("show"));

        let options = JsonpOptions::enabled().except(["show"]);
        assert!(options.applies_to("index"));
        assert!(!options.applies_to("show"));

        assert!(!JsonpOptions::disabled().applies_to("index"));

        let request = RequestData::get("/users?callback=cb");
        assert_eq!(JsonpOptions::enabled().callback_for("index", &request), Some("cb"));

        let mut post = RequestData::get("/users?callback=cb");
        post.method = Method::POST;
        assert_eq!(JsonpOptions::enabled().callback_for("index", &post), None);

        let custom = RequestData::get("/users?jsonp=fn");
        assert_eq!(
            JsonpOptions::enabled().parameter("jsonp").callback_for("index", &custom),
            Some("fn")
        );
    }

    #[test]
    fn test_child_config_is_independent() {
        let taxonomy = ErrorTaxonomy::default();
        let parent = ApiHandler::new(Config::default()).configure(|c| {
            c.map_error::<NotImplementedYet>(taxonomy.lookup("not_implemented").expect("kind"))
                .use_named_exception_notifier("airbrake")
                .jsonp(JsonpOptions::enabled())
                .caches(["index"], Some(Duration::from_secs(60)))
        });

        let child = parent.child().configure(|c| {
            let mut c = c
                .use_named_exception_notifier("bugsnag")
                .jsonp(JsonpOptions::disabled());
            c.mapping.remove(&ExceptionType::of::<NotImplementedYet>());
            c.cached_actions.clear();
            c
        });

        assert!(parent.handler_config().jsonp.enabled);
        assert!(!child.handler_config().jsonp.enabled);
        assert_eq!(parent.handler_config().mapping.len(), 1);
        assert!(child.handler_config().mapping.is_empty());
        assert!(parent.handler_config().is_cached("index"));
        assert!(!child.handler_config().is_cached("index"));
        assert!(matches!(
            parent.handler_config().notifier,
            Notifier::Named(NotifierName::Airbrake)
        ));
    }

    #[tokio::test]
    async fn test_pass_through_returns_unmapped_exception() {
        let api = ApiHandler::new(Config::default()).with_policy(policy(true));
        let result = api
            .rescue(Raised::from(NotImplementedYet), &RequestData::get("/"), "index")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tagged_errors_rendered_even_with_pass_through() {
        let api = ApiHandler::new(Config::default()).with_policy(policy(true));
        let envelope = api
            .rescue(Raised::from(ApiError::throttled()), &RequestData::get("/"), "index")
            .await
            .expect("enveloped");
        assert_eq!(envelope.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body(envelope).await;
        assert_eq!(body["error"], json!("throttled"));
        assert!(body["error_description"].is_string());
        assert!(body.get("response").is_none());
    }

    #[tokio::test]
    async fn test_configured_throttled_status() {
        let mut config = Config::default();
        config.errors.throttled_status = Some(429);
        let api = ApiHandler::new(config).with_policy(policy(false));
        let envelope = api
            .rescue(Raised::from(ApiError::throttled()), &RequestData::get("/"), "index")
            .await
            .expect("enveloped");
        assert_eq!(envelope.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body(envelope).await["error"], json!("throttled"));
    }

    #[tokio::test]
    async fn test_unmapped_becomes_system_without_pass_through() {
        let api = ApiHandler::new(Config::default()).with_policy(policy(false));
        let envelope = api
            .rescue(Raised::from(NotImplementedYet), &RequestData::get("/"), "index")
            .await
            .expect("enveloped");
        assert_eq!(envelope.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(envelope).await;
        assert_eq!(body["error"], json!("system"));
        assert_ne!(body["error_description"], json!("not implemented yet"));
    }

    #[tokio::test]
    async fn test_notifier_identifier_in_envelope() {
        let api = ApiHandler::new(Config::default())
            .with_policy(policy(false))
            .configure(|c| {
                c.exception_notifier_callback(|context, _exception, _request| {
                    context.error_identifier = Some("my-test-identifier".to_string());
                })
            });
        let envelope = api
            .rescue(Raised::from(NotImplementedYet), &RequestData::get("/"), "index")
            .await
            .expect("enveloped");
        assert_eq!(body(envelope).await["error_identifier"], json!("my-test-identifier"));
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl NotificationService for Counter {
        async fn notify(
            &self,
            _exception: &dyn Exception,
            _request: Option<&RequestData>,
        ) -> anyhow::Result<Option<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_named_notifier_called_through_services() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let api = ApiHandler::new(Config::default())
            .with_policy(policy(false))
            .with_notification_services(
                NotificationServices::new().with(NotifierName::Honeybadger, counter.clone()),
            )
            .configure(|c| c.use_named_exception_notifier("honeybadger"));
        api.rescue(Raised::from(NotImplementedYet), &RequestData::get("/"), "index")
            .await
            .expect("enveloped");
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_translated_error_message() {
        let api = ApiHandler::new(Config::default())
            .with_translator(Arc::new(
                StaticTranslations::new().with("errors.throttled", "Oh noes, a puddle."),
            ));
        let envelope = api
            .rescue(Raised::from(ApiError::throttled()), &RequestData::get("/"), "index")
            .await
            .expect("enveloped");
        assert_eq!(body(envelope).await["error_description"], json!("Oh noes, a puddle."));
    }

    #[tokio::test]
    async fn test_call_exposes_or_rescues() {
        let api = ApiHandler::new(Config::default()).with_policy(policy(false));
        let request = RequestData::get("/users/1");

        let ok = api
            .call(&request, "show", || async { Ok::<_, Raised>(json!({"id": 1})) })
            .await
            .expect("ok");
        assert_eq!(body(ok).await, json!({"response": {"id": 1}}));

        let failed = api
            .call(&request, "show", || async {
                Err::<Value, _>(Raised::from(ApiError::not_found()))
            })
            .await
            .expect("enveloped");
        assert_eq!(failed.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_envelope_jsonp() {
        let api = ApiHandler::new(Config::default())
            .with_policy(policy(false))
            .configure(|c| c.jsonp(JsonpOptions::enabled()));
        let envelope = api
            .rescue(
                Raised::from(ApiError::not_found()),
                &RequestData::get("/users/9?callback=handle"),
                "show",
            )
            .await
            .expect("enveloped");
        assert_eq!(envelope.jsonp_callback(), Some("handle"));
    }
}
