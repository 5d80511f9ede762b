//! HTTP client with builder pattern.
//!
//! A [`Client`] bundles one [`Dispatcher`] (pool caps, timeouts, transport)
//! with default headers that every request built from it starts with.
//!
//! # Example
//!
//! ```rust,ignore
//! use dispatchnet::Client;
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .max_total(16)
//!     .max_per_destination(4)
//!     .timeout(Duration::from_secs(5))
//!     .user_agent("dispatchnet/0.1")
//!     .build()?;
//!
//! let resp = client.send(client.get("http://example.com").build()?).await?;
//! println!("{}", resp.text()?);
//! client.close().await;
//! ```

use crate::base::dispatcherror::{ConfigError, DispatchError};
use crate::base::neterror::NetError;
use crate::dispatch::barrier::{await_all, Completed};
use crate::dispatch::callback::{NoopCallback, OutcomeCallback};
use crate::dispatch::executor::{Dispatcher, DispatcherBuilder, ShutdownMode};
use crate::dispatch::handle::RequestHandle;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::request::{RequestBuilder, RequestDescriptor, RequestTimeouts};
use crate::http::response::HttpResponse;
use crate::http::transport::Transport;
use crate::socket::pool::ConnectionPool;
use http::Method;
use std::time::Duration;
use tokio::runtime::Handle;

/// HTTP client for dispatching requests.
///
/// Use [`Client::builder()`] to configure and create a client. Clones share
/// the same dispatcher and pool.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Dispatcher,
    default_headers: OrderedHeaderMap,
}

impl Client {
    /// Client with default caps and timeouts. Must be called inside a tokio runtime.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.dispatcher.pool()
    }

    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    pub fn patch<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Start building a request preloaded with the client's default headers.
    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestDescriptor::builder(method, url).headers(&self.default_headers)
    }

    /// Queue a request; see [`Dispatcher::submit`].
    pub fn submit<C: OutcomeCallback>(
        &self,
        request: RequestDescriptor,
        callback: C,
    ) -> Result<RequestHandle, DispatchError> {
        self.dispatcher.submit(request, callback)
    }

    /// Run one request to completion.
    pub async fn send(&self, request: RequestDescriptor) -> Result<HttpResponse, DispatchError> {
        self.dispatcher.submit(request, NoopCallback)?.wait().await.into_result()
    }

    /// Submit a batch and wait for all of it. Outcomes come back in input order.
    pub async fn dispatch_all<I, C>(&self, requests: I, callback: C) -> Result<Vec<Completed>, DispatchError>
    where
        I: IntoIterator<Item = RequestDescriptor>,
        C: OutcomeCallback + Clone,
    {
        let handles = self.dispatcher.submit_all(requests, callback)?;
        Ok(await_all(handles).await)
    }

    pub async fn close(&self) {
        self.dispatcher.close().await
    }
}

/// Builder for creating a [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    dispatcher: DispatcherBuilder,
    timeouts: Option<RequestTimeouts>,
    headers: OrderedHeaderMap,
    error: Option<NetError>,
}

impl ClientBuilder {
    pub fn max_total(mut self, max: usize) -> Self {
        self.dispatcher = self.dispatcher.max_total(max);
        self
    }

    pub fn max_per_destination(mut self, max: usize) -> Self {
        self.dispatcher = self.dispatcher.max_per_destination(max);
        self
    }

    /// Share an existing pool with other clients.
    pub fn pool(mut self, pool: ConnectionPool) -> Self {
        self.dispatcher = self.dispatcher.pool(pool);
        self
    }

    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.dispatcher = self.dispatcher.transport(transport);
        self
    }

    pub fn shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.dispatcher = self.dispatcher.shutdown_mode(mode);
        self
    }

    pub fn runtime(mut self, handle: Handle) -> Self {
        self.dispatcher = self.dispatcher.runtime(handle);
        self
    }

    /// Replace all default deadlines at once.
    pub fn timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Deadline from lease granted until the full response is read.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeouts_mut().response = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts_mut().connect = Some(timeout);
        self
    }

    /// How long a request may wait for a pool slot.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts_mut().acquire = Some(timeout);
        self
    }

    fn timeouts_mut(&mut self) -> &mut RequestTimeouts {
        self.timeouts.get_or_insert_with(RequestTimeouts::dispatcher_defaults)
    }

    /// Header sent with every request built by the client.
    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        if let Err(e) = self.headers.append(name, value) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn user_agent(mut self, agent: &str) -> Self {
        if let Err(e) = self.headers.insert("User-Agent", agent) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn build(self) -> Result<Client, ConfigError> {
        if let Some(e) = self.error {
            return Err(ConfigError::Header(e));
        }
        let mut dispatcher = self.dispatcher;
        if let Some(timeouts) = self.timeouts {
            dispatcher = dispatcher.timeouts(timeouts);
        }
        Ok(Client { dispatcher: dispatcher.build()?, default_headers: self.headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_headers_applied() {
        let client = Client::builder()
            .user_agent("dispatchnet-test")
            .default_header("Accept", "*/*")
            .build()
            .unwrap();

        let request = client.get("http://example.com/").header("Accept", "text/html").build().unwrap();
        assert_eq!(request.headers().get("User-Agent").unwrap(), "dispatchnet-test");
        assert_eq!(request.headers().get_all("Accept").count(), 2);
    }

    #[tokio::test]
    async fn test_bad_default_header() {
        let err = Client::builder().default_header("Bad Name", "x").build().unwrap_err();
        assert_eq!(err, ConfigError::Header(NetError::InvalidHeader));
    }

    #[tokio::test]
    async fn test_timeout_setters_start_from_defaults() {
        let client = Client::builder().timeout(Duration::from_secs(2)).build().unwrap();
        let timeouts = client.dispatcher().default_timeouts();
        assert_eq!(timeouts.response, Some(Duration::from_secs(2)));
        assert_eq!(timeouts.connect, RequestTimeouts::dispatcher_defaults().connect);
        assert_eq!(timeouts.acquire, RequestTimeouts::dispatcher_defaults().acquire);
    }
}
