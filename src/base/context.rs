//! Ergonomic error context helpers.
//!
//! Provides extension traits for converting IO errors into `NetError`
//! codes while recording which destination the failure belongs to.

use crate::base::neterror::NetError;
use crate::socket::pool::DestinationKey;
use std::io;

/// Map an IO error kind to the closest transport error code.
pub fn net_error_from_io(err: &io::Error) -> NetError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
        io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        io::ErrorKind::NotConnected => NetError::SocketNotConnected,
        io::ErrorKind::AddrInUse => NetError::AddressInUse,
        io::ErrorKind::AddrNotAvailable => NetError::AddressUnreachable,
        io::ErrorKind::PermissionDenied => NetError::NetworkAccessDenied,
        io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => NetError::ConnectionClosed,
        io::ErrorKind::InvalidInput => NetError::AddressInvalid,
        _ => NetError::ConnectionFailed,
    }
}

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Convert a dial error into a `NetError`, logging the destination.
    ///
    /// # Example
    /// ```ignore
    /// use dispatchnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context(&destination)?;
    /// ```
    fn connection_context(self, destination: &DestinationKey) -> Result<T, NetError>;

    /// Convert a name resolution error into `NetError::NameNotResolved`.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, destination: &DestinationKey) -> Result<T, NetError> {
        self.map_err(|e| {
            let code = net_error_from_io(&e);
            tracing::debug!(destination = %destination, error = %e, code = code.as_i32(), "connect failed");
            code
        })
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(domain = %domain, error = %e, "DNS resolution failed");
            NetError::NameNotResolved
        })
    }
}
