//! Outcome callbacks.
//!
//! A callback is bound to a request at submission and runs exactly once, on
//! the worker that performs the terminal transition. Implement the three
//! hooks individually, or pass a closure over the whole [`Outcome`].

use crate::base::dispatcherror::DispatchError;
use crate::dispatch::outcome::Outcome;
use crate::http::request::RequestDescriptor;
use crate::http::response::HttpResponse;
use std::sync::Arc;

pub trait OutcomeCallback: Send + Sync + 'static {
    fn completed(&self, _request: &RequestDescriptor, _response: &HttpResponse) {}

    fn failed(&self, _request: &RequestDescriptor, _error: &DispatchError) {}

    fn cancelled(&self, _request: &RequestDescriptor) {}

    /// Entry point used by the dispatcher. Routes to the hook matching the outcome.
    fn on_outcome(&self, request: &RequestDescriptor, outcome: &Outcome) {
        match outcome {
            Outcome::Succeeded(resp) => self.completed(request, resp),
            Outcome::Failed(err) => self.failed(request, err),
            Outcome::Cancelled => self.cancelled(request),
        }
    }
}

/// Callback that ignores every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl OutcomeCallback for NoopCallback {}

impl<F> OutcomeCallback for F
where
    F: Fn(&RequestDescriptor, &Outcome) + Send + Sync + 'static,
{
    fn on_outcome(&self, request: &RequestDescriptor, outcome: &Outcome) {
        self(request, outcome)
    }
}

/// Pin a closure's signature so its arguments are inferred as borrowed.
///
/// ```rust,ignore
/// let cb = on_outcome(|request, outcome| println!("{} -> {:?}", request.url(), outcome.kind()));
/// ```
pub fn on_outcome<F>(f: F) -> F
where
    F: Fn(&RequestDescriptor, &Outcome) + Send + Sync + 'static,
{
    f
}

/// Share one callback between many submissions.
impl<T: OutcomeCallback + ?Sized> OutcomeCallback for Arc<T> {
    fn on_outcome(&self, request: &RequestDescriptor, outcome: &Outcome) {
        (**self).on_outcome(request, outcome)
    }
}

/// Prints one line per outcome to stdout:
/// `->HTTP/1.1 200 OK`, `->Transport error: ... (url)`, `->cancelled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintCallback;

impl OutcomeCallback for PrintCallback {
    fn completed(&self, _request: &RequestDescriptor, response: &HttpResponse) {
        println!("->{:?} {}", response.version(), response.status());
    }

    fn failed(&self, request: &RequestDescriptor, error: &DispatchError) {
        println!("->{} ({})", error, request.url());
    }

    fn cancelled(&self, _request: &RequestDescriptor) {
        println!("->cancelled");
    }
}
