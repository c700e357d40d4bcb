//! Bounded event waits.

use std::future::Future;
use std::time::Duration;

use crate::error::{NetError, NetResult};

/// The default bound on event waits.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the caller is waiting for; selects the typed timeout error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitKind {
    PeerConnection,
    PubSubDelivery,
    PushLog,
}

impl WaitKind {
    fn timeout_error(self) -> NetError {
        match self {
            WaitKind::PeerConnection => NetError::PeerConnectionTimeout,
            WaitKind::PubSubDelivery => NetError::PubSubTimeout,
            WaitKind::PushLog => NetError::PushLogTimeout,
        }
    }
}

/// Await a future under the given bound, mapping elapse to the typed
/// timeout error for the wait kind.
pub async fn wait_for<T>(
    kind: WaitKind,
    timeout: Duration,
    fut: impl Future<Output = T>,
) -> NetResult<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| kind.timeout_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_inside_the_bound() {
        let value = wait_for(WaitKind::PushLog, Duration::from_secs(1), async { 7 })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn elapse_maps_to_the_typed_error() {
        let pending = std::future::pending::<()>();
        let err = wait_for(WaitKind::PubSubDelivery, Duration::from_millis(10), pending)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::PubSubTimeout));

        let pending = std::future::pending::<()>();
        let err = wait_for(WaitKind::PeerConnection, Duration::from_millis(10), pending)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::PeerConnectionTimeout));
    }
}
