use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;

/// One-shot timer owned by exactly one session. Fires at most once; a
/// cancelled timer never runs its callback.
#[derive(Debug)]
pub struct ConfirmTimer {
    handle: JoinHandle<()>,
}

impl ConfirmTimer {
    pub fn start<F>(after: Duration, on_fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_fire.await;
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Drops ownership without aborting. Used by the firing task itself,
    /// which must not abort its own callback.
    pub fn release(self) {}
}
