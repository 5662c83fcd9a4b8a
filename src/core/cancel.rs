//! Cooperative cancellation for a day's run.

use std::sync::Arc;

use tokio::sync::watch;

/// Clonable cancellation flag carrying the reason it was raised.
///
/// All clones observe the same flag. The first `cancel` wins; later reasons
/// are ignored.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<Option<String>>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { state: Arc::new(tx) }
    }

    /// Raise the flag. Returns false if it was already raised.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.state.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Reason given to `cancel`, if raised
    pub fn reason(&self) -> Option<String> {
        self.state.borrow().clone()
    }

    /// Resolves once the flag is raised
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns once raised
        let _ = rx.wait_for(Option::is_some).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        assert!(token.cancel("operator abort"));
        assert!(!token.cancel("second"));

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("operator abort"));
    }

    #[tokio::test]
    async fn test_clones_observe_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            waiter.reason()
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel("stop");

        let reason = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_raised() {
        let token = CancelToken::new();
        token.cancel("already");
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
