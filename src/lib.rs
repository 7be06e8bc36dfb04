#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::{DbPool, PgAttachmentRepository};
use crate::adapters::storage::{ObjectStorage, S3Storage};
use crate::config::{Config, StorageConfig};
use crate::core::attachment_service::AttachmentService;
use crate::core::health_service::HealthService;
use crate::workers::{AttachmentReaper, Workers};
use std::sync::Arc;
use tokio::sync::watch;

/// Fully wired application components.
#[derive(Debug)]
pub struct App {
    pub attachment_service: AttachmentService,
    pub health_service: HealthService,
    pub workers: Workers,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    storage: Option<Arc<dyn ObjectStorage>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, storage: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_s3(mut self, client: aws_sdk_s3::Client) -> Self {
        let storage = S3Storage::new(
            client,
            self.config.storage.bucket.clone(),
            self.config.storage.public_base_url.clone(),
        );
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Wires repositories, services and workers.
    ///
    /// # Errors
    /// Returns an error if the database or storage was not provided.
    pub fn build(self) -> anyhow::Result<App> {
        let pool = self.pool.ok_or_else(|| anyhow::anyhow!("database pool is required"))?;
        let storage = self.storage.ok_or_else(|| anyhow::anyhow!("object storage is required"))?;

        let repo = Arc::new(PgAttachmentRepository::new(pool.clone()));
        let attachment_service = AttachmentService::new(Arc::clone(&storage), repo, self.config.upload.clone());
        let health_service = HealthService::new(pool, storage, self.config.health.clone());

        let workers =
            Workers { attachment_reaper: AttachmentReaper::new(attachment_service.clone(), self.config.reaper.clone()) };

        Ok(App { attachment_service, health_service, workers })
    }
}

/// Applies pending database migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Builds an S3 client from the storage configuration.
pub async fn initialize_s3_client(config: &StorageConfig) -> aws_sdk_s3::Client {
    let mut loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(aws_config::Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        loader = loader.credentials_provider(aws_credential_types::Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }

    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style).build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Sends `true` on `shutdown_tx` when SIGINT or SIGTERM arrives.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}
