use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Cancellable delay between connection attempts.
///
/// The delay is fixed per wait; there is no backoff growth and no attempt
/// limit. Cancelling is synchronous and sticky: once [`cancel`](Self::cancel)
/// returns, every current and future [`wait`](Self::wait) resolves to `false`.
#[derive(Clone, Debug, Default)]
pub(crate) struct ReconnectTimer {
    cancel: CancellationToken,
}

impl ReconnectTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay`. Returns `false` if cancelled first.
    pub(crate) async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}
