//! Connection slots and dialing.
//!
//! - [`pool`]: bounded leases, capped in total and per destination
//! - [`connectjob`]: resolve and connect one TCP socket for a lease

pub mod connectjob;
pub mod pool;
