//! Process-scoped state shared by every middleware layer.
//!
//! `AppState` is built once at startup and handed to each layer constructor.
//! It owns:
//!
//! - **Limiter settings**: an atomically swappable [`LimiterConfig`] snapshot
//! - **Client registry**: per-client token buckets
//! - **Collaborators**: user and permission lookups
//!
//! # Structured Concurrency
//!
//! The idle-client sweeper is tracked by a `TaskTracker` and stopped through a
//! `CancellationToken`. Call `shutdown()` before exit.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::{Config, LimiterConfig};
use crate::error::AppResult;
use crate::metrics;
use crate::middleware::ip::TrustedProxies;
use crate::middleware::registry::ClientRegistry;
use crate::store::{PermissionLookup, UserLookup};

/// Shared application state.
///
/// Cheap to clone; all fields are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    limiter: Arc<ArcSwap<LimiterConfig>>,
    pub registry: Arc<ClientRegistry>,
    pub trusted_proxies: Arc<TrustedProxies>,
    pub users: Arc<dyn UserLookup>,
    pub permissions: Arc<dyn PermissionLookup>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build the state. No background task is started; see
    /// [`AppState::spawn_background_tasks`].
    pub fn new(
        config: Config,
        users: Arc<dyn UserLookup>,
        permissions: Arc<dyn PermissionLookup>,
    ) -> Self {
        let limiter = Arc::new(ArcSwap::from_pointee(config.limiter));
        let trusted_proxies = Arc::new(TrustedProxies::new(&config.trusted_proxies));

        Self {
            config: Arc::new(config),
            limiter,
            registry: Arc::new(ClientRegistry::new()),
            trusted_proxies,
            users,
            permissions,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Current limiter settings. Each admission decision reads one snapshot.
    pub fn limiter_config(&self) -> LimiterConfig {
        **self.limiter.load()
    }

    /// Replace the limiter settings for subsequent requests.
    ///
    /// Invalid settings are rejected and the current ones stay in place.
    pub fn set_limiter_config(&self, limiter: LimiterConfig) -> AppResult<()> {
        limiter.validate()?;
        info!(
            rps = limiter.rps,
            burst = limiter.burst,
            enabled = limiter.enabled,
            "Limiter configuration updated"
        );
        self.limiter.store(Arc::new(limiter));
        Ok(())
    }

    /// Start the idle-client sweeper.
    pub fn spawn_background_tasks(&self) {
        self.spawn_registry_sweep_task();
    }

    fn spawn_registry_sweep_task(&self) {
        let registry = self.registry.clone();
        let every = self.config.limiter_sweep_interval;
        let idle_for = self.config.limiter_idle_timeout;
        let cancel = self.cancellation_token.clone();

        self.task_tracker
            .spawn(sweep_registry(registry, every, idle_for, cancel));
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }
}

/// Periodically evict idle clients until cancelled.
async fn sweep_registry(
    registry: Arc<ClientRegistry>,
    every: Duration,
    idle_for: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.tick().await; // Skip the first immediate tick

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Registry sweep task received cancellation signal");
                break;
            }
            _ = ticker.tick() => {
                let evicted = registry.evict_idle(idle_for);
                let tracked = registry.len();
                metrics::set_tracked_clients(tracked);
                if evicted > 0 {
                    debug!(evicted, tracked, "Evicted idle rate-limit clients");
                }
            }
        }
    }

    debug!("Registry sweep task shutting down");
}
