//! Success envelope assembly
//!
//! [`ResponseEnvelopeBuilder`] turns an exposable value into an [`Envelope`]:
//! classification, serialization, the `response`/`count`/`pagination` body,
//! opt-in `X-Api-*` headers, `Link` headers, caching headers and JSONP.

use axum::http::header::{CACHE_CONTROL, ETAG, LINK};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::classify::{classify, Exposable, ExposureKind};
use super::envelope::Envelope;
use super::links::{pagination_links, Link, LinkSet};
use super::pagination::PaginationInfo;
use super::serialize::{ExposeOptions, Serializer};
use crate::caching::normalise_etag;
use crate::dispatch::RequestData;
use crate::error::{Error, Result};
use crate::handler::ApiHandler;

const X_API_COUNT: HeaderName = HeaderName::from_static("x-api-count");
const X_API_PAGINATION_COUNT: HeaderName = HeaderName::from_static("x-api-pagination-count");
const X_API_PAGINATION_CURRENT: HeaderName = HeaderName::from_static("x-api-pagination-current");
const X_API_PAGINATION_NEXT: HeaderName = HeaderName::from_static("x-api-pagination-next");
const X_API_PAGINATION_PREVIOUS: HeaderName =
    HeaderName::from_static("x-api-pagination-previous");
const X_API_PAGINATION_PAGES: HeaderName = HeaderName::from_static("x-api-pagination-pages");
const X_API_PAGINATION_PER_PAGE: HeaderName =
    HeaderName::from_static("x-api-pagination-per-page");

/// Builds the success envelope for one action
pub struct ResponseEnvelopeBuilder<'a> {
    handler: &'a ApiHandler,
    request: &'a RequestData,
    action: &'a str,
    options: ExposeOptions,
    links: LinkSet,
}

impl<'a> ResponseEnvelopeBuilder<'a> {
    /// Start a builder; usually obtained through [`ApiHandler::envelope`]
    pub fn new(handler: &'a ApiHandler, request: &'a RequestData, action: &'a str) -> Self {
        Self {
            handler,
            request,
            action,
            options: ExposeOptions::default(),
            links: LinkSet::new(),
        }
    }

    /// Response status for every shape
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.options.status = Some(status);
        self
    }

    /// Extra top-level body field
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.metadata.insert(key.into(), value.into());
        self
    }

    /// Serializer for a singular value
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.options.serializer = Some(serializer);
        self
    }

    /// Serializer for each collection member
    #[must_use]
    pub fn each_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.options.each_serializer = Some(serializer);
        self
    }

    /// Replace all per-call options
    #[must_use]
    pub fn options(mut self, options: ExposeOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a manual `Link`
    #[must_use]
    pub fn link(mut self, rel: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.push(Link::new(rel, url));
        self
    }

    /// Add a manual `Link` with attributes
    #[must_use]
    pub fn link_with(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Add several manual links
    #[must_use]
    pub fn links(mut self, links: impl IntoIterator<Item = Link>) -> Self {
        self.links.extend(links);
        self
    }

    /// Empty response; manual links are still emitted
    pub fn head(self, status: StatusCode) -> Result<Envelope> {
        let mut envelope = Envelope::head(status);
        if let Some(value) = self.links.header_value() {
            envelope.headers_mut().insert(LINK, header_value(&value)?);
        }
        Ok(envelope)
    }

    /// Expose `value`
    pub async fn build(self, value: &dyn Exposable) -> Result<Envelope> {
        let hooks = self.handler.hooks();
        let config = self.handler.config();
        let (kind, pagination) = classify(value);
        let singular = kind.is_singular();

        let mut headers = HeaderMap::new();
        hooks.pre_process(value, kind, singular, &mut headers);

        let response = self.handler.resolver().resolve(value, kind, &self.options)?;
        let count = match (&kind, &response) {
            (ExposureKind::Resource, _) => None,
            (_, Value::Array(items)) => Some(items.len() as u64),
            _ => None,
        };

        let body = assemble_body(&self.options.metadata, response, count, pagination.as_ref())?;

        let mut links = LinkSet::new();
        if config.exposure.header_metadata {
            insert_metadata_headers(&mut headers, count, pagination.as_ref());
            if let Some(info) = &pagination {
                links.extend(
                    pagination_links(
                        info,
                        |page| hooks.page_url(page, self.request),
                        &self.options.link_attributes,
                    )
                    .iter()
                    .cloned(),
                );
            }
        }
        links.extend(self.links.iter().cloned());
        // Appended so a Link set by pre_process survives
        if let Some(value) = links.header_value() {
            headers.append(LINK, header_value(&value)?);
        }

        if config.caching.enabled && self.handler.handler_config().is_cached(self.action) {
            self.insert_caching_headers(value, singular, &mut headers).await?;
        }

        hooks.post_process(value, kind, singular, &mut headers);

        let status = self.options.status.unwrap_or(StatusCode::OK);
        let mut envelope = Envelope::new(status, body);
        envelope.headers_mut().extend(headers);

        if let Some(callback) = self
            .handler
            .handler_config()
            .jsonp
            .callback_for(self.action, self.request)
        {
            envelope = envelope.with_jsonp(callback);
        }

        tracing::debug!(
            action = self.action,
            kind = ?kind,
            status = status.as_u16(),
            "Exposed value"
        );
        Ok(envelope)
    }

    async fn insert_caching_headers(
        &self,
        value: &dyn Exposable,
        singular: bool,
        headers: &mut HeaderMap,
    ) -> Result<()> {
        if !singular {
            let timeout = self
                .handler
                .handler_config()
                .caching_timeout
                .unwrap_or_else(|| self.handler.config().caching.timeout());
            headers.insert(
                CACHE_CONTROL,
                header_value(&format!("max-age={}", timeout.as_secs()))?,
            );
            return Ok(());
        }

        let (Some(etags), Some(cacheable)) = (self.handler.etag_cache(), value.cacheable()) else {
            tracing::debug!(action = self.action, "Value carries no etag");
            return Ok(());
        };

        match etags.etag_for(cacheable).await {
            Ok(etag) => {
                headers.insert(ETAG, header_value(&normalise_etag(etag))?);
            }
            Err(e) => {
                tracing::warn!(action = self.action, error = %e, "Skipping etag, cache store failed");
            }
        }
        Ok(())
    }
}

/// `{response, count?, pagination?}` over the custom metadata
///
/// Metadata never replaces the reserved keys.
fn assemble_body(
    metadata: &Map<String, Value>,
    response: Value,
    count: Option<u64>,
    pagination: Option<&PaginationInfo>,
) -> Result<Value> {
    let mut body = metadata.clone();
    body.insert("response".to_string(), response);
    if let Some(count) = count {
        body.insert("count".to_string(), Value::from(count));
    }
    if let Some(info) = pagination {
        body.insert("pagination".to_string(), serde_json::to_value(info)?);
    }
    Ok(Value::Object(body))
}

fn insert_metadata_headers(
    headers: &mut HeaderMap,
    count: Option<u64>,
    pagination: Option<&PaginationInfo>,
) {
    if let Some(count) = count {
        headers.insert(X_API_COUNT, HeaderValue::from(count));
    }
    let Some(info) = pagination else { return };
    headers.insert(X_API_PAGINATION_COUNT, HeaderValue::from(info.count));
    headers.insert(X_API_PAGINATION_CURRENT, HeaderValue::from(info.current_page));
    if let Some(next) = info.next_page {
        headers.insert(X_API_PAGINATION_NEXT, HeaderValue::from(next));
    }
    if let Some(previous) = info.previous_page {
        headers.insert(X_API_PAGINATION_PREVIOUS, HeaderValue::from(previous));
    }
    headers.insert(X_API_PAGINATION_PAGES, HeaderValue::from(info.total_pages));
    headers.insert(X_API_PAGINATION_PER_PAGE, HeaderValue::from(info.per_page));
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Internal(format!("invalid header value `{}`: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{Cacheable, ETagCache, MemoryStore};
    use crate::config::Config;
    use crate::expose::{Page, SerializationContext};
    use crate::handler::{HandlerHooks, JsonpOptions};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Post {
        id: u64,
        title: &'static str,
    }

    impl Cacheable for Post {
        fn type_name(&self) -> &str {
            "Post"
        }

        fn identity(&self) -> String {
            self.id.to_string()
        }

        fn cache_key(&self) -> Option<String> {
            Some(format!("post-{}-{}", self.id, self.title))
        }
    }

    impl Exposable for Post {
        fn to_json(&self) -> Result<Value> {
            Ok(json!({"id": self.id, "title": self.title}))
        }

        fn cacheable(&self) -> Option<&dyn Cacheable> {
            Some(self)
        }
    }

    struct PageUrls;

    impl HandlerHooks for PageUrls {
        fn page_url(&self, page: u64, _request: &RequestData) -> Option<String> {
            Some(format!("http://example.com/posts?page={page}"))
        }

        fn post_process(
            &self,
            _value: &dyn Exposable,
            kind: ExposureKind,
            _singular: bool,
            headers: &mut HeaderMap,
        ) {
            headers.insert(
                HeaderName::from_static("x-exposure-kind"),
                HeaderValue::from_static(match kind {
                    ExposureKind::Resource => "resource",
                    ExposureKind::Collection => "collection",
                    ExposureKind::Paginated => "paginated",
                }),
            );
        }
    }

    #[derive(Default)]
    struct HookLog {
        calls: Mutex<Vec<(&'static str, ExposureKind, bool)>>,
    }

    impl HookLog {
        fn record(&self, phase: &'static str, kind: ExposureKind, singular: bool) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((phase, kind, singular));
            }
        }

        fn calls(&self) -> Vec<(&'static str, ExposureKind, bool)> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl HandlerHooks for HookLog {
        fn pre_process(
            &self,
            _value: &dyn Exposable,
            kind: ExposureKind,
            singular: bool,
            _headers: &mut HeaderMap,
        ) {
            self.record("pre", kind, singular);
        }

        fn post_process(
            &self,
            _value: &dyn Exposable,
            kind: ExposureKind,
            singular: bool,
            _headers: &mut HeaderMap,
        ) {
            self.record("post", kind, singular);
        }
    }

    struct HookedLink;

    impl HandlerHooks for HookedLink {
        fn pre_process(
            &self,
            _value: &dyn Exposable,
            _kind: ExposureKind,
            _singular: bool,
            headers: &mut HeaderMap,
        ) {
            headers.insert(LINK, HeaderValue::from_static("</docs>; rel=\"help\""));
        }
    }

    fn header<'e>(envelope: &'e Envelope, name: &str) -> Option<&'e str> {
        envelope.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn with_headers() -> Config {
        let mut config = Config::default();
        config.exposure.header_metadata = true;
        config
    }

    fn with_caching() -> Config {
        let mut config = Config::default();
        config.caching.enabled = true;
        config.caching.timeout_secs = 120;
        config
    }

    #[tokio::test]
    async fn test_resource_envelope() {
        let api = ApiHandler::new(Config::default());
        let request = RequestData::get("/posts/1");
        let envelope = api
            .envelope(&request, "show")
            .build(&Post { id: 1, title: "Hello" })
            .await
            .expect("envelope");
        assert_eq!(envelope.status(), StatusCode::OK);
        assert_eq!(
            envelope.body(),
            Some(&json!({"response": {"id": 1, "title": "Hello"}}))
        );
        assert!(envelope.headers().is_empty());
    }

    #[tokio::test]
    async fn test_collection_count_and_header() {
        let api = ApiHandler::new(with_headers());
        let request = RequestData::get("/numbers");
        let envelope = api
            .envelope(&request, "index")
            .build(&json!([1, 2, 3]))
            .await
            .expect("envelope");
        assert_eq!(
            envelope.body(),
            Some(&json!({"response": [1, 2, 3], "count": 3}))
        );
        assert_eq!(header(&envelope, "x-api-count"), Some("3"));
        assert!(header(&envelope, "x-api-pagination-count").is_none());
    }

    #[tokio::test]
    async fn test_paginated_body_headers_and_links() {
        let api = ApiHandler::new(with_headers()).with_hooks(Arc::new(PageUrls));
        let request = RequestData::get("/posts?page=2");
        let page = Page::new((0..10).map(|i| json!(i)).collect::<Vec<_>>(), 2, 10, 200);
        let envelope = api
            .envelope(&request, "index")
            .build(&page)
            .await
            .expect("envelope");

        let body = envelope.body().expect("body");
        assert_eq!(body["count"], json!(10));
        assert_eq!(
            body["pagination"],
            json!({
                "count": 200,
                "per_page": 10,
                "current": 2,
                "next": 3,
                "previous": 1,
                "pages": 20
            })
        );
        assert_eq!(header(&envelope, "x-api-pagination-count"), Some("200"));
        assert_eq!(header(&envelope, "x-api-pagination-current"), Some("2"));
        assert_eq!(header(&envelope, "x-api-pagination-next"), Some("3"));
        assert_eq!(header(&envelope, "x-api-pagination-previous"), Some("1"));
        assert_eq!(header(&envelope, "x-api-pagination-pages"), Some("20"));
        assert_eq!(header(&envelope, "x-api-pagination-per-page"), Some("10"));
        assert_eq!(header(&envelope, "x-exposure-kind"), Some("paginated"));

        let link = header(&envelope, "link").expect("link header");
        assert!(link.starts_with("<http://example.com/posts?page=1>; rel=\"first\""));
        assert!(link.contains("<http://example.com/posts?page=3>; rel=\"next\""));
        assert!(link.ends_with("<http://example.com/posts?page=20>; rel=\"last\""));
    }

    #[tokio::test]
    async fn test_first_page_omits_previous_header() {
        let api = ApiHandler::new(with_headers());
        let request = RequestData::get("/posts");
        let page = Page::new(vec![json!(1)], 1, 10, 5);
        let envelope = api
            .envelope(&request, "index")
            .build(&page)
            .await
            .expect("envelope");
        assert!(header(&envelope, "x-api-pagination-previous").is_none());
        assert!(header(&envelope, "x-api-pagination-next").is_none());
        assert!(header(&envelope, "link").is_none());
        assert_eq!(envelope.body().expect("body")["pagination"]["next"], Value::Null);
    }

    #[tokio::test]
    async fn test_status_metadata_and_manual_links() {
        let api = ApiHandler::new(Config::default());
        let request = RequestData::get("/posts");
        let envelope = api
            .envelope(&request, "create")
            .status(StatusCode::CREATED)
            .metadata("response", "ignored")
            .metadata("request_id", "r-1")
            .link("self", "/posts/1")
            .link_with(Link::new("search", "/search").with_attribute("awesome", "Sure Am"))
            .link("self", "/posts/1")
            .build(&Post { id: 1, title: "Hello" })
            .await
            .expect("envelope");
        assert_eq!(envelope.status(), StatusCode::CREATED);
        let body = envelope.body().expect("body");
        assert_eq!(body["request_id"], json!("r-1"));
        assert_eq!(body["response"]["id"], json!(1));
        assert_eq!(
            header(&envelope, "link"),
            Some("</posts/1>; rel=\"self\", </search>; rel=\"search\"; awesome=\"Sure Am\"")
        );
    }

    #[tokio::test]
    async fn test_hooks_wrap_every_shape() {
        let log = Arc::new(HookLog::default());
        let api = ApiHandler::new(Config::default()).with_hooks(log.clone());
        let request = RequestData::get("/posts");

        api.envelope(&request, "show")
            .build(&Post { id: 1, title: "a" })
            .await
            .expect("resource");
        api.envelope(&request, "index")
            .build(&vec![Post { id: 1, title: "a" }])
            .await
            .expect("collection");
        api.envelope(&request, "index")
            .build(&Page::new(vec![json!(1)], 1, 10, 1))
            .await
            .expect("page");

        assert_eq!(
            log.calls(),
            vec![
                ("pre", ExposureKind::Resource, true),
                ("post", ExposureKind::Resource, true),
                ("pre", ExposureKind::Collection, false),
                ("post", ExposureKind::Collection, false),
                ("pre", ExposureKind::Paginated, false),
                ("post", ExposureKind::Paginated, false),
            ]
        );
    }

    #[tokio::test]
    async fn test_hook_link_kept_alongside_manual_links() {
        let api = ApiHandler::new(Config::default()).with_hooks(Arc::new(HookedLink));
        let request = RequestData::get("/posts/1");
        let envelope = api
            .envelope(&request, "show")
            .link("self", "/posts/1")
            .build(&Post { id: 1, title: "a" })
            .await
            .expect("envelope");
        let links: Vec<_> = envelope
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert_eq!(links, vec!["</docs>; rel=\"help\"", "</posts/1>; rel=\"self\""]);
    }

    #[tokio::test]
    async fn test_serializers_receive_url_options() {
        let mut url_options = Map::new();
        url_options.insert("host".to_string(), json!("api.example.com"));
        let api = ApiHandler::new(Config::default()).with_url_options(url_options);
        let request = RequestData::get("/posts");
        let host_of = |_value: &dyn Exposable, context: &SerializationContext| -> Result<Value> {
            Ok(json!({"host": context.url_options.get("host").cloned()}))
        };

        let single = api
            .envelope(&request, "show")
            .serializer(Arc::new(host_of))
            .build(&Post { id: 1, title: "a" })
            .await
            .expect("envelope");
        assert_eq!(
            single.body().expect("body")["response"],
            json!({"host": "api.example.com"})
        );

        let many = api
            .envelope(&request, "index")
            .each_serializer(Arc::new(host_of))
            .build(&vec![Post { id: 1, title: "a" }, Post { id: 2, title: "b" }])
            .await
            .expect("envelope");
        assert_eq!(
            many.body().expect("body")["response"],
            json!([{"host": "api.example.com"}, {"host": "api.example.com"}])
        );
    }

    #[tokio::test]
    async fn test_each_serializer_override() {
        let api = ApiHandler::new(Config::default());
        let request = RequestData::get("/posts");
        let posts = vec![Post { id: 1, title: "a" }, Post { id: 2, title: "b" }];
        let envelope = api
            .envelope(&request, "index")
            .each_serializer(Arc::new(
                |value: &dyn Exposable, context: &SerializationContext| -> Result<Value> {
                    let id = value.to_json()?["id"].clone();
                    Ok(json!({"wrapped": id, "root": context.root}))
                },
            ))
            .build(&posts)
            .await
            .expect("envelope");
        assert_eq!(
            envelope.body().expect("body")["response"],
            json!([{"wrapped": 1, "root": false}, {"wrapped": 2, "root": false}])
        );
    }

    #[tokio::test]
    async fn test_cached_resource_gets_etag() {
        let store = Arc::new(MemoryStore::new());
        let api = ApiHandler::new(with_caching())
            .with_etag_cache(ETagCache::new(store))
            .configure(|c| c.caches(["show"], None));
        let request = RequestData::get("/posts/1");
        let post = Post { id: 1, title: "Hello" };

        let first = api.envelope(&request, "show").build(&post).await.expect("envelope");
        let etag = header(&first, "etag").expect("etag").to_string();
        assert!(etag.starts_with("\"Post/1:"));
        assert!(etag.ends_with('"'));

        let second = api.envelope(&request, "show").build(&post).await.expect("envelope");
        assert_eq!(header(&second, "etag"), Some(etag.as_str()));

        let uncached = api.envelope(&request, "edit").build(&post).await.expect("envelope");
        assert!(header(&uncached, "etag").is_none());
    }

    #[tokio::test]
    async fn test_cached_collection_gets_max_age() {
        let api = ApiHandler::new(with_caching())
            .with_etag_cache(ETagCache::new(Arc::new(MemoryStore::new())))
            .configure(|c| c.caches(["index"], None).caches(["feed"], Some(Duration::from_secs(30))));
        let request = RequestData::get("/posts");
        let posts = vec![Post { id: 1, title: "a" }];

        let index = api.envelope(&request, "index").build(&posts).await.expect("envelope");
        assert!(header(&index, "etag").is_none());
        assert_eq!(header(&index, "cache-control"), Some("max-age=30"));
    }

    #[tokio::test]
    async fn test_caching_disabled_sets_nothing() {
        let api = ApiHandler::new(Config::default()).configure(|c| c.caches(["index"], None));
        let request = RequestData::get("/posts");
        let envelope = api
            .envelope(&request, "index")
            .build(&vec![Post { id: 1, title: "a" }])
            .await
            .expect("envelope");
        assert!(header(&envelope, "cache-control").is_none());
    }

    #[tokio::test]
    async fn test_jsonp_only_for_get_with_parameter() {
        let api = ApiHandler::new(Config::default()).configure(|c| c.jsonp(JsonpOptions::enabled()));

        let get = RequestData::get("/posts/1?callback=done");
        let envelope = api.envelope(&get, "show").build(&json!({"id": 1})).await.expect("envelope");
        assert_eq!(envelope.jsonp_callback(), Some("done"));

        let plain = RequestData::get("/posts/1");
        let envelope = api.envelope(&plain, "show").build(&json!({"id": 1})).await.expect("envelope");
        assert!(envelope.jsonp_callback().is_none());

        let mut post = RequestData::get("/posts?callback=done");
        post.method = axum::http::Method::POST;
        let envelope = api.envelope(&post, "create").build(&json!({"id": 1})).await.expect("envelope");
        assert!(envelope.jsonp_callback().is_none());
    }

    #[test]
    fn test_head_keeps_manual_links() {
        let api = ApiHandler::new(Config::default());
        let request = RequestData::get("/posts/1");
        let envelope = api
            .envelope(&request, "destroy")
            .link("collection", "/posts")
            .head(StatusCode::NO_CONTENT)
            .expect("envelope");
        assert_eq!(envelope.status(), StatusCode::NO_CONTENT);
        assert!(envelope.body().is_none());
        assert_eq!(header(&envelope, "link"), Some("</posts>; rel=\"collection\""));
    }
}
