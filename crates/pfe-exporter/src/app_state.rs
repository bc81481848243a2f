//! Shared application state for the exporter.
//!
//! Owns the watching metrics store and the registries the `/metrics` handler
//! renders. The config is only consulted while building the store. Startup
//! errors are returned, not panicked on.

use std::sync::Arc;

use tokio::sync::watch;

use pfe_core::error::Result;

use crate::config::ExporterConfig;
use crate::obs::metrics::{ExporterMetrics, GaugeRegistry};
use crate::store::{MetricsStore, StoreOptions};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    store: Arc<MetricsStore>,
}

struct AppStateInner {
    gauges: Arc<GaugeRegistry>,
    obs: Arc<ExporterMetrics>,
}

impl AppState {
    /// Build application state: resolve the directory, subscribe, scan.
    pub async fn new(cfg: ExporterConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let gauges = Arc::new(GaugeRegistry::new());
        let obs = Arc::new(ExporterMetrics::default());

        let opts = StoreOptions::new(&cfg.store.path)
            .watch(cfg.store.watch)
            .filter(cfg.store.file_filter()?)
            .event_queue(cfg.store.event_queue);
        let store = MetricsStore::new(opts, gauges.clone(), obs.clone(), shutdown).await?;

        tracing::info!(
            path = %store.path().display(),
            metrics = store.len(),
            watching = store.is_watching(),
            "metrics store ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner { gauges, obs }),
            store: Arc::new(store),
        })
    }

    pub fn store(&self) -> Arc<MetricsStore> {
        Arc::clone(&self.store)
    }

    pub fn gauges(&self) -> &GaugeRegistry {
        &self.inner.gauges
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.inner.obs
    }

    pub fn is_draining(&self) -> bool {
        self.inner.obs.is_draining()
    }

    pub fn set_draining(&self) {
        self.inner.obs.set_draining();
    }
}
