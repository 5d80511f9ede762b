//! Buffered HTTP response.

use crate::http::decode::{self, DecodeError};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};

/// A fully received response.
///
/// The body is read completely before the pool lease is released, so a
/// response outlives its connection and is cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, version, headers, body }
    }

    /// Create from response head parts and a collected body.
    pub fn from_parts(parts: http::response::Parts, body: Bytes) -> Self {
        Self::new(parts.status, parts.version, parts.headers, body)
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body, still content-encoded.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    fn header_str(&self, name: http::header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.header_str(http::header::CONTENT_ENCODING)
    }

    /// Charset declared by the Content-Type header, if any.
    pub fn charset(&self) -> Option<&str> {
        self.header_str(http::header::CONTENT_TYPE)
            .and_then(decode::charset_from_content_type)
    }

    /// Fail on 3xx/4xx/5xx statuses.
    pub fn error_for_status(self) -> Result<Self, DecodeError> {
        if self.status.as_u16() >= 300 {
            return Err(DecodeError::UnexpectedStatus { status: self.status.as_u16() });
        }
        Ok(self)
    }

    /// Decoded body text using the declared charset, UTF-8 by default.
    pub fn text(&self) -> Result<String, DecodeError> {
        decode::decode_text(&self.body, self.content_encoding(), self.charset())
    }

    /// Decoded body text, ignoring any declared charset.
    pub fn text_with_charset(&self, charset: &str) -> Result<String, DecodeError> {
        decode::decode_text(&self.body, self.content_encoding(), Some(charset))
    }

    /// Decode the body, then parse it as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let raw = decode::decompress(&self.body, self.content_encoding())?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
