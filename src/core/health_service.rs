use crate::adapters::database::DbPool;
use crate::adapters::storage::ObjectStorage;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("attachment-coordinator");
        Self {
            status: meter
                .i64_gauge("attachments_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }

    fn record(&self, component: &'static str, ok: bool) {
        self.status.record(i64::from(ok), &[KeyValue::new("component", component)]);
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    pool: DbPool,
    storage: Arc<dyn ObjectStorage>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(pool: DbPool, storage: Arc<dyn ObjectStorage>, config: HealthConfig) -> Self {
        Self { pool, storage, config, metrics: Metrics::new() }
    }

    /// Checks database connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the database is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        let db_timeout = Duration::from_millis(self.config.db_timeout_ms);

        let res = match timeout(db_timeout, sqlx::query("SELECT 1").execute(&self.pool)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Database connection failed: {e:?}")),
            Err(_) => Err("Database connection timed out".to_string()),
        };
        self.metrics.record("database", res.is_ok());
        res
    }

    /// Checks object store connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_storage(&self) -> Result<(), String> {
        let storage_timeout = Duration::from_millis(self.config.storage_timeout_ms);

        let res = match timeout(storage_timeout, self.storage.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("Storage connection failed: {e}")),
            Err(_) => Err("Storage connection timed out".to_string()),
        };
        self.metrics.record("storage", res.is_ok());
        res
    }
}
