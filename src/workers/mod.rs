pub mod attachment_reaper;

pub use attachment_reaper::AttachmentReaper;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Background tasks started alongside the servers.
#[derive(Debug)]
pub struct Workers {
    pub attachment_reaper: AttachmentReaper,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.attachment_reaper.run(shutdown_rx).instrument(tracing::info_span!("attachment_reaper")))]
    }
}
