//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): transport error codes matching `net_error_list.h`
//! - [`DispatchError`](dispatcherror::DispatchError): per-request terminal failures
//! - [`LoadState`](loadstate::LoadState): request phases

pub mod context;
pub mod dispatcherror;
pub mod loadstate;
pub mod neterror;

#[cfg(test)]
mod tests;
