use crate::clock::Clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub clock: Arc<dyn Clock>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, clock: Arc<dyn Clock>) -> Self {
        Self {
            cancellation_token,
            clock,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// The same context with a child cancellation token.
    pub fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
            clock: self.clock.clone(),
        }
    }
}
