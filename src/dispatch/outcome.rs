use crate::base::dispatcherror::DispatchError;
use crate::http::response::HttpResponse;

/// Terminal state of a dispatched request.
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded(HttpResponse),
    Failed(DispatchError),
    Cancelled,
}

/// Outcome without its payload, for counting and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Cancelled,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Succeeded(_) => OutcomeKind::Succeeded,
            Outcome::Failed(_) => OutcomeKind::Failed,
            Outcome::Cancelled => OutcomeKind::Cancelled,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Outcome::Succeeded(resp) => Some(resp),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Cancelled maps to [`DispatchError::Cancelled`].
    pub fn into_result(self) -> Result<HttpResponse, DispatchError> {
        match self {
            Outcome::Succeeded(resp) => Ok(resp),
            Outcome::Failed(err) => Err(err),
            Outcome::Cancelled => Err(DispatchError::Cancelled),
        }
    }
}

impl From<Result<HttpResponse, DispatchError>> for Outcome {
    fn from(result: Result<HttpResponse, DispatchError>) -> Self {
        match result {
            Ok(resp) => Outcome::Succeeded(resp),
            Err(err) => Outcome::Failed(err),
        }
    }
}
