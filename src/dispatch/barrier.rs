//! Completion barrier.

use crate::base::dispatcherror::DispatchError;
use crate::dispatch::handle::{RequestHandle, RequestId};
use crate::dispatch::outcome::{Outcome, OutcomeKind};
use crate::http::request::RequestDescriptor;
use crate::http::response::HttpResponse;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// A finished request, tagged with the descriptor that produced it.
#[derive(Debug, Clone)]
pub struct Completed {
    pub id: RequestId,
    pub request: Arc<RequestDescriptor>,
    pub outcome: Outcome,
}

impl Completed {
    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.outcome.response()
    }

    pub fn error(&self) -> Option<&DispatchError> {
        self.outcome.error()
    }

    /// Cancelled becomes [`DispatchError::Cancelled`].
    pub fn into_result(self) -> Result<HttpResponse, DispatchError> {
        self.outcome.into_result()
    }
}

/// Wait until every handle is terminal.
///
/// The output has one entry per handle, in input order. A failed or
/// cancelled request never stops the others from being awaited.
pub async fn await_all<I>(handles: I) -> Vec<Completed>
where
    I: IntoIterator<Item = RequestHandle>,
{
    join_all(handles.into_iter().map(|handle| async move {
        let outcome = handle.wait().await;
        Completed { id: handle.id(), request: Arc::clone(handle.request()), outcome }
    }))
    .await
}

/// Collects handles as they are submitted, then waits for all of them.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    handles: Vec<RequestHandle>,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: RequestHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every request that is still pending. Returns how many were.
    pub fn cancel_all(&self) -> usize {
        self.handles.iter().filter(|handle| handle.cancel()).count()
    }

    pub async fn await_all(self) -> Vec<Completed> {
        await_all(self.handles).await
    }
}

impl Extend<RequestHandle> for CompletionBarrier {
    fn extend<T: IntoIterator<Item = RequestHandle>>(&mut self, iter: T) {
        self.handles.extend(iter);
    }
}

impl FromIterator<RequestHandle> for CompletionBarrier {
    fn from_iter<T: IntoIterator<Item = RequestHandle>>(iter: T) -> Self {
        Self { handles: iter.into_iter().collect() }
    }
}

/// Outcome counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

impl From<&[Completed]> for Summary {
    fn from(completed: &[Completed]) -> Self {
        completed.iter().fold(Summary::default(), |mut summary, c| {
            match c.kind() {
                OutcomeKind::Succeeded => summary.succeeded += 1,
                OutcomeKind::Failed => summary.failed += 1,
                OutcomeKind::Cancelled => summary.cancelled += 1,
            }
            summary
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::NetError;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode, Version};

    fn completed(outcome: Outcome) -> Completed {
        let request = RequestDescriptor::get("http://example.com/").build().unwrap();
        Completed { id: 1, request: Arc::new(request), outcome }
    }

    #[test]
    fn test_summary_counts() {
        let ok = HttpResponse::new(StatusCode::OK, Version::HTTP_11, HeaderMap::new(), Bytes::new());
        let batch = vec![
            completed(Outcome::Succeeded(ok.clone())),
            completed(Outcome::Succeeded(ok)),
            completed(Outcome::Failed(DispatchError::Transport(NetError::ConnectionRefused))),
            completed(Outcome::Cancelled),
        ];

        let summary = Summary::from(batch.as_slice());
        assert_eq!(summary, Summary { succeeded: 2, failed: 1, cancelled: 1 });
        assert_eq!(summary.total(), 4);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_into_result_tags_cancel() {
        let err = completed(Outcome::Cancelled).into_result().unwrap_err();
        assert_eq!(err, DispatchError::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_barrier() {
        let barrier = CompletionBarrier::new();
        assert!(barrier.is_empty());
        assert!(barrier.await_all().await.is_empty());
    }
}
