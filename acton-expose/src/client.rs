//! Client for APIs that speak the envelope format
//!
//! [`decode_envelope`] unwraps a response body: error envelopes come back as
//! [`ApiError`] values carrying the registered kind, success envelopes as a
//! [`Decoded`] resource, collection or page. [`ApiClient`] does the same for
//! live requests over `reqwest`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::Error;
use crate::expose::Page;
use crate::taxonomy::{ApiError, ErrorContext, ErrorTaxonomy, ValidationMessages};

/// An unwrapped success envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A single value
    Resource(Value),
    /// An unpaginated list
    Collection(Vec<Value>),
    /// One page of a paginated list
    Paginated(Page<Value>),
}

impl Decoded {
    /// The unwrapped `response` value
    pub fn into_value(self) -> Value {
        match self {
            Decoded::Resource(value) => value,
            Decoded::Collection(items) => Value::Array(items),
            Decoded::Paginated(page) => Value::Array(page.items),
        }
    }

    /// Deserialize the unwrapped `response` value
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.into_value())?)
    }

    /// Deserialize each entry of a page, keeping the page numbers
    ///
    /// Resources and collections become a single page holding every entry.
    pub fn into_page<T: DeserializeOwned>(self) -> Result<Page<T>, Error> {
        let page = match self {
            Decoded::Paginated(page) => page,
            Decoded::Collection(items) => {
                let total = items.len() as u64;
                Page::new(items, 1, total.max(1), total)
            }
            Decoded::Resource(value) => Page::new(vec![value], 1, 1, 1),
        };
        let items = page
            .items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Page::new(items, page.current_page, page.per_page, page.total_entries))
    }
}

/// Fields of an error envelope that are not carried over as metadata
const ERROR_FIELDS: [&str; 3] = ["error", "error_description", "messages"];

/// Unwrap an envelope body
///
/// Error names are resolved in `taxonomy`; unknown names decode to the
/// `unknown` kind.
pub fn decode_envelope(body: Value, taxonomy: &ErrorTaxonomy) -> Result<Decoded, ApiError> {
    let mut body = match body {
        Value::Object(body) => body,
        other => return Ok(classify_response(other, None)),
    };

    let error_name = body.get("error").and_then(Value::as_str).map(str::to_string);
    if let Some(name) = error_name {
        return Err(decode_error(name, &mut body, taxonomy));
    }

    let pagination = body.remove("pagination");
    match body.remove("response") {
        Some(response) => Ok(classify_response(response, pagination.as_ref())),
        None => Ok(Decoded::Resource(Value::Object(body))),
    }
}

fn classify_response(response: Value, pagination: Option<&Value>) -> Decoded {
    match (response, pagination.and_then(Value::as_object)) {
        (Value::Array(items), Some(pagination)) => {
            let number = |key: &str| pagination.get(key).and_then(Value::as_u64);
            let per_page = number("per_page").unwrap_or(items.len() as u64);
            let current = number("current").unwrap_or(1);
            let count = number("count").unwrap_or(items.len() as u64);
            Decoded::Paginated(Page::new(items, current, per_page, count))
        }
        (Value::Array(items), None) => Decoded::Collection(items),
        (value, _) => Decoded::Resource(value),
    }
}

fn decode_error(name: String, body: &mut Map<String, Value>, taxonomy: &ErrorTaxonomy) -> ApiError {
    let mut error = ApiError::named_in(taxonomy, &name);

    if let Some(Value::String(description)) = body.get("error_description") {
        error = error.with_message(description.clone());
    }

    if let Some(messages) = body.remove("messages") {
        match serde_json::from_value::<ValidationMessages>(messages.clone()) {
            Ok(messages) => error = error.with_messages(messages),
            Err(_) => error = error.with_metadata("messages", messages),
        }
    }

    let mut context = error.context().clone();
    for (key, value) in body.iter() {
        if !ERROR_FIELDS.contains(&key.as_str()) {
            context.insert_metadata(key.clone(), value.clone());
        }
    }

    tracing::debug!(error = %name, kind = error.kind().name(), "Decoded error envelope");
    error.with_context(context)
}

/// Failure of a client request
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an error envelope
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request failed or the body was not an envelope
    #[error(transparent)]
    Transport(#[from] Error),
}

/// HTTP client for a versioned envelope API
///
/// Requests go to `<base_uri>/<version>/<endpoint>/<path>`, skipping the
/// parts that are unset.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_uri: String,
    version: Option<String>,
    endpoint: Option<String>,
    taxonomy: Arc<ErrorTaxonomy>,
}

impl ApiClient {
    /// Client for the API at `base_uri`
    pub fn new(base_uri: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_uri: base_uri.into().trim_end_matches('/').to_string(),
            version: None,
            endpoint: None,
            taxonomy: ErrorTaxonomy::global(),
        }
    }

    /// API version prepended to every path
    #[must_use]
    pub fn with_version(mut self, version: impl ToString) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Endpoint prepended to every path, after the version
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let trimmed = endpoint.trim_matches('/');
        self.endpoint = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Taxonomy used to resolve error names
    #[must_use]
    pub fn with_taxonomy(mut self, taxonomy: Arc<ErrorTaxonomy>) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    /// Use a preconfigured `reqwest` client
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// `<version>/<endpoint>` with unset parts skipped
    pub fn endpoint(&self) -> String {
        [self.version.as_deref(), self.endpoint.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Full URL for `path`
    pub fn url_for(&self, path: &str) -> String {
        let mut url = self.base_uri.clone();
        for part in [self.endpoint().as_str(), path.trim_start_matches('/')] {
            if !part.is_empty() {
                url.push('/');
                url.push_str(part);
            }
        }
        url
    }

    /// GET `path` and unwrap the envelope
    pub async fn get(&self, path: &str) -> Result<Decoded, ClientError> {
        self.get_with_query(path, &[]).await
    }

    /// GET `path` with query parameters and unwrap the envelope
    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Decoded, ClientError> {
        let url = self.url_for(path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(Error::from)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(Error::from)?;
        let body: Value = serde_json::from_slice(&bytes).map_err(Error::from)?;

        let decoded = decode_envelope(body, &self.taxonomy);
        if let Err(error) = &decoded {
            tracing::warn!(
                url = %url,
                status = status.as_u16(),
                error = error.kind().name(),
                "API request returned an error envelope"
            );
        }
        decoded.map_err(ClientError::Api)
    }

    /// GET `path` and deserialize the unwrapped response
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Ok(self.get(path).await?.deserialize()?)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_uri", &self.base_uri)
            .field("version", &self.version)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
