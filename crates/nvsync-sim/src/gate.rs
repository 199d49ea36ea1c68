use tokio::sync::Notify;

/// Holds one load in flight until released.
///
/// Both signals keep a permit if nobody is waiting yet, so `started` and
/// `release` may be called before or after the load reaches the gate.
#[derive(Debug, Default)]
pub struct LoadGate {
    started: Notify,
    released: Notify,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the held load has begun.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    /// Let the held load finish.
    pub fn release(&self) {
        self.released.notify_one();
    }

    pub(crate) async fn pass(&self) {
        self.started.notify_one();
        self.released.notified().await;
    }
}
