//! # dispatchnet
//!
//! A bounded-concurrency asynchronous HTTP request dispatcher.
//!
//! `dispatchnet` issues many outbound requests against a shared, size-limited
//! connection pool, runs a callback exactly once per request when it
//! finishes, and lets the caller wait for every outcome in submission order.
//!
//! ## Features
//!
//! - **Connection Pool**: caps on total and per-destination connections, FIFO waiters
//! - **Dispatcher**: non-blocking submit, per-request handles, cancel, drain or cancel on close
//! - **Deadlines**: acquire, connect and response phases, overridable per request
//! - **Callbacks**: completed/failed/cancelled hooks or a plain closure
//! - **Decoding**: gzip/deflate bodies, charset detection, JSON
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dispatchnet::dispatch::{await_all, PrintCallback, Summary};
//! use dispatchnet::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::builder().max_total(4).max_per_destination(4).build()?;
//!     let requests = (0..10)
//!         .map(|i| client.get("http://127.0.0.1:8080/").query("_", &i.to_string()).build())
//!         .collect::<Result<Vec<_>, _>>()?;
//!
//!     let completed = client.dispatch_all(requests, PrintCallback).await?;
//!     println!("{:?}", Summary::from(completed.as_slice()));
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes, load states and io error mapping
//! - [`socket`] - Connection pool and TCP connect jobs
//! - [`http`] - Request descriptors, transport, responses and body decoding
//! - [`dispatch`] - Executor, handles, callbacks and the completion barrier
//! - [`client`] - Builder tying the pieces together

pub mod base;
pub mod client;
pub mod dispatch;
pub mod http;
pub mod socket;

pub use base::dispatcherror::{ConfigError, DispatchError, PoolError};
pub use base::neterror::NetError;
pub use client::{Client, ClientBuilder};
pub use dispatch::{Dispatcher, Outcome, RequestHandle};
pub use crate::http::{HttpResponse, RequestDescriptor};
