use crate::base::dispatcherror::{DispatchError, PoolError, TimeoutPhase};
use crate::socket::pool::{ConnectionPool, DestinationKey};
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use std::time::Duration;

#[test]
fn test_net_error_roundtrip() {
    let original = NetError::ConnectionRefused;
    let code = original.as_i32();
    assert_eq!(code, -102);
    assert!(matches!(NetError::from(code), NetError::ConnectionRefused));

    let custom = NetError::InvalidHeader;
    assert_eq!(NetError::from(custom.as_i32()), NetError::InvalidHeader);
}

#[test]
fn test_unknown_error() {
    let err = NetError::from(-9999);
    assert!(matches!(err, NetError::Unknown(-9999)));
}

#[test]
fn test_connect_phase_classification() {
    assert!(NetError::ConnectionRefused.is_connect_phase());
    assert!(!NetError::ConnectionReset.is_connect_phase());
    assert!(!NetError::InvalidHttpResponse.is_connect_phase());
}

#[test]
fn test_dispatch_error_codes() {
    let transport = DispatchError::from(NetError::ConnectionReset);
    assert_eq!(transport.code(), -101);
    assert!(transport.is_transient());

    let timeout = DispatchError::Timeout {
        phase: TimeoutPhase::Response,
        after: Duration::from_millis(50),
    };
    assert!(timeout.is_transient());
    assert_eq!(timeout.to_string(), "Request response timeout after 50ms");

    assert!(!DispatchError::ExecutorClosed.is_transient());
}

#[tokio::test]
async fn test_pool_errors_lift_to_dispatch_errors() {
    let pool = ConnectionPool::new(1, 1).unwrap();
    let destination = DestinationKey::new("http", "lift.test", 80);
    let lease = pool.acquire(&destination).await;
    pool.release(&lease).unwrap();

    let err = DispatchError::try_from(pool.release(&lease).unwrap_err()).unwrap();
    assert_eq!(err, DispatchError::DoubleRelease { lease: lease.id() });
    assert_eq!(err.code(), -20003);
    assert!(!err.is_transient());

    let other = ConnectionPool::new(1, 1).unwrap();
    let foreign = other.acquire(&destination).await;
    let err = DispatchError::try_from(pool.release(&foreign).unwrap_err()).unwrap();
    assert!(matches!(err, DispatchError::DoubleRelease { .. }));

    let timeout = PoolError::AcquireTimeout { destination: destination.clone(), waited: Duration::from_millis(5) };
    assert!(matches!(
        DispatchError::try_from(timeout),
        Ok(DispatchError::PoolExhaustionTimeout { waited, .. }) if waited == Duration::from_millis(5)
    ));

    let limits = PoolError::InvalidLimits { max_total: 1, max_per_destination: 2 };
    assert_eq!(DispatchError::try_from(limits.clone()), Err(limits));
}

#[test]
fn test_load_state_roundtrip() {
    for state in [
        LoadState::Idle,
        LoadState::WaitingForAvailableSocket,
        LoadState::Connecting,
        LoadState::SendingRequest,
        LoadState::WaitingForResponse,
        LoadState::ReadingResponse,
        LoadState::Done,
    ] {
        assert_eq!(LoadState::from(state.as_u8()), state);
    }
}

#[test]
fn test_load_state_cell_done_is_sticky() {
    use crate::base::loadstate::LoadStateCell;

    let cell = LoadStateCell::new();
    assert_eq!(cell.get(), LoadState::Idle);
    cell.set(LoadState::Connecting);
    assert_eq!(cell.get(), LoadState::Connecting);
    cell.set(LoadState::Done);
    cell.set(LoadState::ReadingResponse);
    assert_eq!(cell.get(), LoadState::Done);
}
