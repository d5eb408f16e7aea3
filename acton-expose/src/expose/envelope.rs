//! Response envelopes and their HTTP rendering

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::dispatch::ErrorFields;
use crate::error::Result;
use crate::taxonomy::ApiError;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";

/// Dotted JavaScript identifier, e.g. `cb` or `jQuery.handlers.done`
static CALLBACK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$")
        .expect("callback regex is valid")
});

/// Whether `name` is safe to use as a JSONP callback
pub fn is_valid_callback(name: &str) -> bool {
    CALLBACK_REGEX.is_match(name)
}

/// A rendered response: status, side-channel headers and an optional body
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Value>,
    jsonp_callback: Option<String>,
}

impl Envelope {
    /// Envelope with a JSON body
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Some(body),
            jsonp_callback: None,
        }
    }

    /// Envelope with no body
    pub fn head(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
            jsonp_callback: None,
        }
    }

    /// Error envelope from resolved fields
    pub fn error(fields: &ErrorFields) -> Self {
        Self::new(fields.status, fields.body())
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Side-channel headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable side-channel headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// JSON body, `None` for head responses
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// JSONP callback the body will be wrapped in
    pub fn jsonp_callback(&self) -> Option<&str> {
        self.jsonp_callback.as_deref()
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Wrap the body in a JSONP callback
    ///
    /// Invalid callback names are ignored and the body stays plain JSON.
    #[must_use]
    pub fn with_jsonp(mut self, callback: &str) -> Self {
        if is_valid_callback(callback) {
            self.jsonp_callback = Some(callback.to_string());
        } else {
            tracing::debug!(callback, "Ignoring invalid JSONP callback");
        }
        self
    }

    /// Content type and body bytes
    pub fn render(&self) -> Result<(&'static str, Vec<u8>)> {
        let Some(body) = &self.body else {
            return Ok((JSON_CONTENT_TYPE, Vec::new()));
        };
        let json = serde_json::to_vec(body)?;
        match &self.jsonp_callback {
            Some(callback) => {
                let mut wrapped = Vec::with_capacity(json.len() + callback.len() + 3);
                wrapped.extend_from_slice(callback.as_bytes());
                wrapped.push(b'(');
                wrapped.extend_from_slice(&json);
                wrapped.extend_from_slice(b");");
                Ok((JAVASCRIPT_CONTENT_TYPE, wrapped))
            }
            None => Ok((JSON_CONTENT_TYPE, json)),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let (content_type, bytes) = match self.render() {
            Ok(rendered) => rendered,
            Err(e) => return e.into_response(),
        };
        let length = bytes.len();

        let mut response = (self.status, bytes).into_response();
        let headers = response.headers_mut();
        headers.extend(self.headers);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        response
    }
}

/// Renders a tagged error without handler hooks or translations
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let fields = ErrorFields::from(&self);
        if fields.status.is_server_error() {
            tracing::error!(error = %fields.name, status = fields.status.as_u16(), "{}", fields.message);
        } else {
            tracing::warn!(error = %fields.name, status = fields.status.as_u16(), "{}", fields.message);
        }
        Envelope::error(&fields).into_response()
    }
}
