//! Request dispatch: executor, handles, callbacks and the completion barrier.

pub mod barrier;
pub mod callback;
pub mod executor;
pub mod handle;
pub mod outcome;

pub use barrier::{await_all, Completed, CompletionBarrier, Summary};
pub use callback::{on_outcome, NoopCallback, OutcomeCallback, PrintCallback};
pub use executor::{Dispatcher, DispatcherBuilder, ShutdownMode};
pub use handle::{Canceller, HandleState, RequestHandle, RequestId};
pub use outcome::{Outcome, OutcomeKind};
