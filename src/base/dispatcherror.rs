//! Dispatcher and pool error taxonomy.
//!
//! [`NetError`] stays the transport-level code; these types describe what
//! happened to a request as a whole (pool wait, deadline, shutdown) and the
//! pool's own invariant violations.

use crate::base::neterror::NetError;
use crate::socket::pool::{DestinationKey, LeaseId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which part of an exchange a deadline applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Establishing the TCP connection.
    Connect,
    /// From lease granted until the full response body was read.
    Response,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Connect => f.write_str("connect"),
            TimeoutPhase::Response => f.write_str("response"),
        }
    }
}

/// Terminal failure of a dispatched request, or a synchronous submit error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No pool slot for the destination was granted in time.
    #[error("Timed out after {waited:?} waiting for a connection to {destination}")]
    PoolExhaustionTimeout { destination: DestinationKey, waited: Duration },

    /// Remote reset, connect failure or malformed response.
    #[error("Transport error: {0}")]
    Transport(#[from] NetError),

    /// The request exceeded one of its deadlines.
    #[error("Request {phase} timeout after {after:?}")]
    Timeout { phase: TimeoutPhase, after: Duration },

    /// Submission after `close()` began.
    #[error("Dispatcher is closed")]
    ExecutorClosed,

    /// A lease was released twice, or to a pool that did not grant it.
    /// Indicates a bug in the caller.
    #[error("Lease {lease} released twice")]
    DoubleRelease { lease: LeaseId },

    /// Only produced when a Cancelled outcome is converted into a `Result`.
    #[error("Request cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Transport and timeout class errors, the ones a retrying caller may try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::Transport(_)
                | DispatchError::Timeout { .. }
                | DispatchError::PoolExhaustionTimeout { .. }
        )
    }

    /// Numeric code for logging; transport errors keep their `NetError` code.
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Transport(e) => e.as_i32(),
            DispatchError::Timeout { .. } => NetError::ConnectionTimedOut.as_i32(),
            DispatchError::PoolExhaustionTimeout { .. } => -20001,
            DispatchError::ExecutorClosed => -20002,
            DispatchError::DoubleRelease { .. } => -20003,
            DispatchError::Cancelled => -20004,
        }
    }
}

/// Errors raised directly by [`crate::socket::pool::ConnectionPool`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid pool limits: total={max_total}, per destination={max_per_destination}")]
    InvalidLimits { max_total: usize, max_per_destination: usize },

    #[error("Lease {lease} released twice")]
    DoubleRelease { lease: LeaseId },

    #[error("Lease {lease} does not belong to this pool")]
    ForeignLease { lease: LeaseId },

    #[error("Timed out after {waited:?} waiting for a connection to {destination}")]
    AcquireTimeout { destination: DestinationKey, waited: Duration },
}

/// Lift a pool error to the request level, for callers that drive the pool
/// directly but report through [`DispatchError`]. Invalid limits are a
/// configuration problem and are handed back unchanged.
impl TryFrom<PoolError> for DispatchError {
    type Error = PoolError;

    fn try_from(e: PoolError) -> Result<Self, Self::Error> {
        match e {
            PoolError::DoubleRelease { lease } | PoolError::ForeignLease { lease } => {
                Ok(DispatchError::DoubleRelease { lease })
            }
            PoolError::AcquireTimeout { destination, waited } => {
                Ok(DispatchError::PoolExhaustionTimeout { destination, waited })
            }
            PoolError::InvalidLimits { .. } => Err(e),
        }
    }
}

/// Errors raised while building a dispatcher or client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("No tokio runtime: build the dispatcher inside a runtime or pass a handle")]
    NoRuntime,

    #[error("Invalid default header: {0}")]
    Header(#[from] NetError),
}
