use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use common::{error::AppError, utils::config::AppConfig};

use crate::manager::EngineLifecycleManager;

/// Periodic sweep over the live engines. Runs for the life of the process;
/// a failing scan is logged and retried at the next tick rather than
/// crashing the loop.
pub struct ExpiryScheduler {
    manager: Arc<EngineLifecycleManager>,
    scan_interval: Duration,
}

impl ExpiryScheduler {
    pub fn new(manager: Arc<EngineLifecycleManager>, scan_interval: Duration) -> Self {
        Self {
            manager,
            scan_interval,
        }
    }

    pub fn from_config(config: &AppConfig, manager: Arc<EngineLifecycleManager>) -> Self {
        Self::new(manager, Duration::from_secs(config.expiry_scan_interval_secs))
    }

    pub async fn run(self) {
        info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            "expiry scheduler started"
        );

        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(expired) if expired.is_empty() => {
                    debug!("expiry sweep found nothing overdue");
                }
                Ok(expired) => {
                    info!(count = expired.len(), claims = ?expired, "expiry sweep released engines");
                }
                Err(err) => {
                    error!(error = %err, "expiry sweep failed; retrying at next tick");
                }
            }
        }
    }

    /// One sweep, shared by the timer loop and the manual sweep endpoint.
    pub async fn sweep_once(&self) -> Result<Vec<String>, AppError> {
        self.manager.expire_overdue(Utc::now()).await
    }
}
