//! Request descriptors and their fluent builder.
//!
//! A [`RequestDescriptor`] is immutable once built; the dispatcher shares it
//! as `Arc<RequestDescriptor>` between the worker, the callback and the
//! completion barrier.
//!
//! # Example
//!
//! ```rust,ignore
//! use dispatchnet::http::request::RequestDescriptor;
//! use std::time::Duration;
//!
//! let request = RequestDescriptor::get("http://cn.bing.com/dict/")
//!     .query("a", "中文test123")
//!     .user_agent("Test")
//!     .header("Accept", "a")
//!     .header("AA", "BB")
//!     .response_timeout(Duration::from_secs(5))
//!     .build()?;
//! ```

use crate::base::neterror::NetError;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::socket::pool::DestinationKey;
use bytes::Bytes;
use http::Method;
use std::time::Duration;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use url::Url;

/// Accept-Encoding value advertising the decoders in [`crate::http::decode`].
pub const ACCEPT_ENCODING_GZIP: &str = "gzip,deflate";
pub const HEADER_X_REQUESTED_WITH: &str = "X-Requested-With";
pub const XMLHTTPREQUEST: &str = "XMLHttpRequest";
pub const FORM_URLENCODED_UTF8: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Deadlines for the three phases of a request.
///
/// On a descriptor every field is an override: `None` inherits the
/// dispatcher default for that phase. After [`resolve`](Self::resolve), `None`
/// means the phase is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestTimeouts {
    /// Waiting for a pool lease.
    pub acquire: Option<Duration>,
    /// Establishing the TCP connection.
    pub connect: Option<Duration>,
    /// From lease granted until the whole response body is read.
    pub response: Option<Duration>,
}

impl RequestTimeouts {
    /// No deadline in any phase.
    pub const fn unbounded() -> Self {
        Self { acquire: None, connect: None, response: None }
    }

    /// Defaults used by a dispatcher when none are configured.
    pub const fn dispatcher_defaults() -> Self {
        Self {
            acquire: Some(Duration::from_secs(30)),
            connect: Some(Duration::from_secs(10)),
            response: Some(Duration::from_secs(60)),
        }
    }

    /// Field-by-field: the override wins, otherwise the default applies.
    pub fn resolve(&self, defaults: &RequestTimeouts) -> RequestTimeouts {
        RequestTimeouts {
            acquire: self.acquire.or(defaults.acquire),
            connect: self.connect.or(defaults.connect),
            response: self.response.or(defaults.response),
        }
    }
}

/// Immutable description of one outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    destination: DestinationKey,
    headers: OrderedHeaderMap,
    body: Option<Bytes>,
    timeouts: RequestTimeouts,
}

impl RequestDescriptor {
    pub fn builder<U: AsRef<str>>(method: Method, url: U) -> RequestBuilder {
        RequestBuilder::new(method, url.as_ref())
    }

    pub fn get<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::GET, url)
    }

    pub fn head<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::HEAD, url)
    }

    pub fn post<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::POST, url)
    }

    pub fn put<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::PUT, url)
    }

    pub fn patch<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::PATCH, url)
    }

    pub fn delete<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::DELETE, url)
    }

    pub fn options<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::OPTIONS, url)
    }

    pub fn trace<U: AsRef<str>>(url: U) -> RequestBuilder {
        Self::builder(Method::TRACE, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn destination(&self) -> &DestinationKey {
        &self.destination
    }

    pub fn headers(&self) -> &OrderedHeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Per-request overrides, before defaults are applied.
    pub fn timeouts(&self) -> &RequestTimeouts {
        &self.timeouts
    }

    /// Path and query, as sent on an HTTP/1.1 request line.
    pub fn origin_form(&self) -> &str {
        &self.url[url::Position::BeforePath..url::Position::AfterQuery]
    }

    /// Value for the Host header: the port is omitted when it is the scheme default.
    pub fn host_header(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

/// Builder for a [`RequestDescriptor`].
///
/// Invalid input (bad URL, header or date) is remembered and reported by
/// [`build`](Self::build), so calls can be chained without intermediate `?`.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: Result<Url, NetError>,
    headers: OrderedHeaderMap,
    body: Option<Bytes>,
    timeouts: RequestTimeouts,
    error: Option<NetError>,
}

impl RequestBuilder {
    fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: Url::parse(url).map_err(|_| NetError::InvalidUrl),
            headers: OrderedHeaderMap::new(),
            body: None,
            timeouts: RequestTimeouts::default(),
            error: None,
        }
    }

    fn record(&mut self, result: Result<(), NetError>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    /// Append a header. Repeated names are all sent.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let result = self.headers.append(name, value);
        self.record(result);
        self
    }

    /// Set a header, replacing every earlier value of that name.
    pub fn set_header(mut self, name: &str, value: &str) -> Self {
        let result = self.headers.insert(name, value);
        self.record(result);
        self
    }

    pub fn remove_headers(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// Start from an existing header list (client defaults).
    pub fn headers(mut self, headers: &OrderedHeaderMap) -> Self {
        for (name, value) in headers.iter() {
            match value.to_str() {
                Ok(v) => {
                    let result = self.headers.append(name.as_str(), v);
                    self.record(result);
                }
                Err(_) => self.record(Err(NetError::InvalidHeader)),
            }
        }
        self
    }

    pub fn user_agent(self, agent: &str) -> Self {
        self.set_header("User-Agent", agent)
    }

    pub fn cache_control(self, value: &str) -> Self {
        self.set_header("Cache-Control", value)
    }

    /// Ask the server for a compressed body the decoder understands.
    pub fn accept_gzip(self) -> Self {
        self.set_header("Accept-Encoding", ACCEPT_ENCODING_GZIP)
    }

    /// Mark the request as an XMLHttpRequest, as browsers' XHR stacks do.
    pub fn x_requested_with(self) -> Self {
        self.set_header(HEADER_X_REQUESTED_WITH, XMLHTTPREQUEST)
    }

    pub fn date(self, date: OffsetDateTime) -> Self {
        self.http_date_header("Date", date)
    }

    pub fn if_modified_since(self, date: OffsetDateTime) -> Self {
        self.http_date_header("If-Modified-Since", date)
    }

    pub fn if_unmodified_since(self, date: OffsetDateTime) -> Self {
        self.http_date_header("If-Unmodified-Since", date)
    }

    fn http_date_header(mut self, name: &str, date: OffsetDateTime) -> Self {
        match format_http_date(date) {
            Ok(value) => self.set_header(name, &value),
            Err(e) => {
                self.record(Err(e));
                self
            }
        }
    }

    /// Append a query parameter, percent-encoding it.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        if let Ok(url) = self.url.as_mut() {
            url.query_pairs_mut().append_pair(key, value);
        }
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Text body with an explicit Content-Type, e.g. `text/plain; charset=UTF-8`.
    pub fn body_string(self, body: &str, content_type: &str) -> Self {
        self.set_header("Content-Type", content_type).body(body.to_owned())
    }

    /// `application/x-www-form-urlencoded` body, UTF-8 encoded.
    pub fn body_form<'a, I>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.set_header("Content-Type", FORM_URLENCODED_UTF8).body(encoded)
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => self.set_header("Content-Type", "application/json").body(bytes),
            Err(_) => {
                self.record(Err(NetError::InvalidResponse));
                self
            }
        }
    }

    /// Replace all timeout overrides at once.
    pub fn timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.acquire = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = Some(timeout);
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.response = Some(timeout);
        self
    }

    pub fn build(self) -> Result<RequestDescriptor, NetError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let url = self.url?;
        let destination = DestinationKey::from_url(&url).ok_or(NetError::InvalidUrl)?;
        Ok(RequestDescriptor {
            method: self.method,
            url,
            destination,
            headers: self.headers,
            body: self.body,
            timeouts: self.timeouts,
        })
    }
}

/// RFC 7231 IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(date: OffsetDateTime) -> Result<String, NetError> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    date.to_offset(UtcOffset::UTC).format(&format).map_err(|_| NetError::InvalidHeader)
}
