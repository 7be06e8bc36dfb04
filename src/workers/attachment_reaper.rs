use crate::config::ReaperConfig;
use crate::core::attachment_service::AttachmentService;
use opentelemetry::{global, metrics::Counter};
use std::time::Duration as StdDuration;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    errors: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("attachment-coordinator");
        Self {
            errors: meter
                .u64_counter("attachments_reaper_errors_total")
                .with_description("Total number of errors encountered while reaping attachments")
                .build(),
        }
    }
}

/// Periodically removes records that uploads abandoned, along with their objects.
#[derive(Debug)]
pub struct AttachmentReaper {
    service: AttachmentService,
    config: ReaperConfig,
    metrics: Metrics,
}

impl AttachmentReaper {
    #[must_use]
    pub fn new(service: AttachmentService, config: ReaperConfig) -> Self {
        Self { service, config, metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let interval = StdDuration::from_secs(self.config.interval_secs);
        let mut next_tick = tokio::time::Instant::now() + interval;

        while !*shutdown.borrow() {
            tokio::select! {
                () = tokio::time::sleep_until(next_tick) => {
                    async {
                        tracing::debug!("Running attachment reaper...");
                        self.sweep().await;
                    }
                    .instrument(tracing::info_span!("attachment_reaper_iteration"))
                    .await;
                    next_tick = tokio::time::Instant::now() + interval;
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Attachment reaper shutting down...");
    }

    /// Reaps batches until a batch comes back short or makes no progress.
    pub async fn sweep(&self) -> u64 {
        let grace = time::Duration::seconds(self.config.pending_grace_secs);
        let batch_size = usize::try_from(self.config.batch_size).unwrap_or(0);
        let mut total = 0;

        loop {
            match self.service.reap(self.config.batch_size, grace).await {
                Ok(outcome) => {
                    total += outcome.reaped;
                    if outcome.scanned < batch_size || outcome.reaped == 0 {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Attachment reaper cycle failed");
                    self.metrics.errors.add(1, &[]);
                    break;
                }
            }
        }
        total
    }
}
