//! In-process request and response records.
//!
//! A [`SubRequest`] is plain data: the router can be driven from it without a
//! socket or any HTTP framework. Top-level HTTP requests are converted into
//! one by the HTTP layer, batch parts by the envelope codec.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;

use crate::error::{ApiError, HandlerError};

/// `OData-Version` response header.
pub const ODATA_VERSION: HeaderName = HeaderName::from_static("odata-version");
/// The only protocol version served.
pub const ODATA_VERSION_VALUE: &str = "4.0";
/// Content type of JSON payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json;odata.metadata=minimal";

/// A request replayed in-process.
#[derive(Debug, Clone)]
pub struct SubRequest {
    pub method: Method,
    /// Request target as written: absolute URL, absolute path or service-relative path.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// `Content-ID` from the enclosing MIME part, if any.
    pub content_id: Option<String>,
}

impl SubRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            content_id: None,
        }
    }

    /// Adds a header, ignoring names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json<T: Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(body)
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The response to one [`SubRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Echo of the originating request's `Content-ID`.
    pub content_id: Option<String>,
}

impl SubResponse {
    pub fn new(status: StatusCode) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ODATA_VERSION, HeaderValue::from_static(ODATA_VERSION_VALUE));
        Self {
            status,
            headers,
            body: Bytes::new(),
            content_id: None,
        }
    }

    /// A JSON response with the OData content type.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                let mut response = Self::new(status);
                response.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(JSON_CONTENT_TYPE),
                );
                response.body = Bytes::from(body);
                response
            }
            Err(e) => Self::from_api_error(&ApiError::internal_error(format!(
                "failed to serialize response: {e}"
            ))),
        }
    }

    /// A plain text response (raw `$value`, `$count`).
    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response.body = Bytes::from(text.into());
        response
    }

    /// A binary response with the given content type.
    pub fn binary(content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        let value = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        response.headers.insert(CONTENT_TYPE, value);
        response.body = body.into();
        response
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// An OData JSON error response.
    pub fn from_api_error(error: &ApiError) -> Self {
        let mut response = Self::new(error.status());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.body = error.to_body();
        response
    }

    /// An error response for a handler failure, with `Allow` on 405.
    pub fn from_handler_error(error: &HandlerError) -> Self {
        let mut response = Self::from_api_error(&ApiError::from(error));
        if let HandlerError::MethodNotAllowed { allowed, .. } = error {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                response.headers.insert(http::header::ALLOW, value);
            }
        }
        response
    }

    pub fn with_location(mut self, location: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(location) {
            self.headers.insert(LOCATION, value);
        }
        self
    }

    pub fn with_content_id(mut self, content_id: Option<String>) -> Self {
        self.content_id = content_id;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_error(&self) -> bool {
        self.status.as_u16() >= 400
    }

    /// Parses the body as an OData JSON error, if it is one.
    pub fn api_error(&self) -> Option<ApiError> {
        ApiError::from_body(&self.body)
    }
}

impl From<HandlerError> for SubResponse {
    fn from(error: HandlerError) -> Self {
        SubResponse::from_handler_error(&error)
    }
}
