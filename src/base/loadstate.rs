/// The current phase of a dispatched request.
/// Loosely follows net/base/load_states.h, reduced to the phases a
/// dispatcher worker actually passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LoadState {
    /// Submitted, no worker has picked it up yet.
    #[default]
    Idle = 0,

    /// Waiting for a slot from the connection pool.
    WaitingForAvailableSocket = 1,

    /// Connecting to the host (TCP handshake).
    Connecting = 2,

    /// Sending the HTTP request.
    SendingRequest = 3,

    /// Waiting for the server response (TTFB).
    WaitingForResponse = 4,

    /// Reading the response body.
    ReadingResponse = 5,

    /// Terminal state reached.
    Done = 6,
}

impl LoadState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<u8> for LoadState {
    fn from(value: u8) -> Self {
        match value {
            1 => LoadState::WaitingForAvailableSocket,
            2 => LoadState::Connecting,
            3 => LoadState::SendingRequest,
            4 => LoadState::WaitingForResponse,
            5 => LoadState::ReadingResponse,
            6 => LoadState::Done,
            _ => LoadState::Idle,
        }
    }
}

/// Shared, lock-free holder for a request's current [`LoadState`].
///
/// The dispatcher and the transport both advance it; the handle reads it.
#[derive(Debug, Clone, Default)]
pub struct LoadStateCell {
    inner: std::sync::Arc<std::sync::atomic::AtomicU8>,
}

impl LoadStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `state`. `Done` is sticky: a late update from a worker
    /// that lost a cancellation race is ignored.
    pub fn set(&self, state: LoadState) {
        use std::sync::atomic::Ordering;
        let _ = self.inner.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current != LoadState::Done.as_u8()).then_some(state.as_u8())
        });
    }

    pub fn get(&self) -> LoadState {
        LoadState::from(self.inner.load(std::sync::atomic::Ordering::Acquire))
    }
}
