use crate::base::context::IoResultExt;
use crate::base::dispatcherror::{DispatchError, TimeoutPhase};
use crate::base::neterror::NetError;
use crate::socket::pool::DestinationKey;
use std::time::Duration;
use tokio::net::TcpStream;

/// Manages the connection process: DNS -> TCP.
/// Roughly equivalent to net::ConnectJob, without the TLS step.
pub struct ConnectJob;

impl ConnectJob {
    /// Dial `destination`, trying each resolved address in order.
    ///
    /// `timeout` bounds the whole job (resolution plus every attempt).
    pub async fn connect(
        destination: &DestinationKey,
        timeout: Option<Duration>,
    ) -> Result<TcpStream, DispatchError> {
        match destination.scheme() {
            "http" => {}
            "https" | "wss" => return Err(NetError::DisallowedUrlScheme.into()),
            _ => return Err(NetError::UnknownUrlScheme.into()),
        }

        let job = Self::dial(destination);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, job).await.map_err(|_| {
                tracing::debug!(destination = %destination, ?limit, "connect timed out");
                DispatchError::Timeout { phase: TimeoutPhase::Connect, after: limit }
            })?,
            None => job.await,
        }
    }

    async fn dial(destination: &DestinationKey) -> Result<TcpStream, DispatchError> {
        // 1. DNS Resolution
        let host = destination.host().trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<_> = tokio::net::lookup_host((host, destination.port()))
            .await
            .dns_context(host)?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved.into());
        }

        // 2. TCP Connect, keep the last error if every address fails
        let mut last_err = NetError::ConnectionFailed;
        for addr in addrs {
            match TcpStream::connect(addr).await.connection_context(destination) {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::trace!(target: "dispatchnet::wire", destination = %destination, %addr, error = %e, "set_nodelay failed");
                    }
                    tracing::trace!(target: "dispatchnet::wire", destination = %destination, %addr, "connected");
                    return Ok(stream);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let destination = DestinationKey::new("http", "127.0.0.1", port);

        let stream = ConnectJob::connect(&destination, Some(Duration::from_secs(5))).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn test_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let destination = DestinationKey::new("http", "127.0.0.1", port);
        let err = ConnectJob::connect(&destination, None).await.unwrap_err();
        assert_eq!(err, DispatchError::Transport(NetError::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_https_rejected() {
        let destination = DestinationKey::new("https", "127.0.0.1", 443);
        let err = ConnectJob::connect(&destination, None).await.unwrap_err();
        assert_eq!(err, DispatchError::Transport(NetError::DisallowedUrlScheme));
    }
}
