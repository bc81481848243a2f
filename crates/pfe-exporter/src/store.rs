//! Metrics store: a live, in-memory view of the metric directory.
//!
//! The store scans the directory once at construction and, when watching,
//! keeps the mapping in sync from filesystem events until the shutdown signal
//! fires. Every event is resolved by `stat`ing the path rather than trusting
//! the event kind.
//!
//! Locking: one `std::sync::Mutex` guards the whole mapping. It is taken only
//! for in-memory updates and snapshot copies, never across file I/O or an
//! `.await`.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::UNIX_EPOCH;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pfe_core::error::{PfeError, Result};
use pfe_core::metric::{Metric, MetricRecord};
use pfe_core::naming::{MetricFileFilter, DEFAULT_FILE_PATTERN};
use pfe_core::sink::GaugeSink;

use crate::obs::metrics::ExporterMetrics;
use crate::watch::{self as fswatch, FsEvent, FsEventKind, Subscription};

/// How a store is set up. Without a filter, [`DEFAULT_FILE_PATTERN`] applies.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub path: PathBuf,
    pub watch: bool,
    pub filter: Option<MetricFileFilter>,
    pub event_queue: usize,
}

impl StoreOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            watch: false,
            filter: None,
            event_queue: 64,
        }
    }

    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn filter(mut self, filter: MetricFileFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn event_queue(mut self, capacity: usize) -> Self {
        self.event_queue = capacity.max(1);
        self
    }
}

struct Shared {
    path: PathBuf,
    filter: MetricFileFilter,
    metrics: Mutex<HashMap<PathBuf, Metric>>,
    sink: Arc<dyn GaugeSink>,
    obs: Arc<ExporterMetrics>,
}

/// Directory-scoped cache of metric files.
pub struct MetricsStore {
    shared: Arc<Shared>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsStore {
    /// Resolve, subscribe (if watching), scan, then start the watch loop.
    ///
    /// The subscription is live before the scan starts, so a file written
    /// during the scan is either seen by the scan or queued as an event.
    /// Events queued during the scan are handled once the loop starts.
    pub async fn new(
        opts: StoreOptions,
        sink: Arc<dyn GaugeSink>,
        obs: Arc<ExporterMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let path = std::path::absolute(&opts.path).map_err(|source| PfeError::PathResolution {
            path: opts.path.clone(),
            source,
        })?;
        let filter = match opts.filter {
            Some(filter) => filter,
            None => MetricFileFilter::new(DEFAULT_FILE_PATTERN)?,
        };

        let shared = Arc::new(Shared {
            path,
            filter,
            metrics: Mutex::new(HashMap::new()),
            sink,
            obs,
        });

        let subscription = if opts.watch {
            let (tx, rx) = mpsc::channel(opts.event_queue);
            Some((fswatch::subscribe(&shared.path, tx)?, rx))
        } else {
            None
        };

        shared.scan().await;

        let watcher = subscription.map(|(sub, rx)| {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move { shared.watch(rx, sub, shutdown).await })
        });

        Ok(Self {
            shared,
            watcher: Mutex::new(watcher),
        })
    }

    /// Absolute directory this store mirrors.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.shared.lock().contains_key(file)
    }

    /// Copy of one entry.
    pub fn get(&self, file: &Path) -> Option<MetricRecord> {
        self.shared.lock().get(file).map(|m| m.record().clone())
    }

    /// Consistent copy of the whole mapping, ordered by path.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, MetricRecord> {
        self.shared
            .lock()
            .iter()
            .map(|(p, m)| (p.clone(), m.record().clone()))
            .collect()
    }

    /// Run `f` on a loaded metric in place (e.g. to bump it), under the store lock.
    pub fn update<T>(&self, file: &Path, f: impl FnOnce(&mut Metric) -> T) -> Option<T> {
        self.shared.lock().get_mut(file).map(f)
    }

    /// Wait for the watch loop to finish after shutdown was signalled.
    pub async fn stopped(&self) {
        let handle = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Metric>> {
        // Entries only change under the lock, so a poisoned map is still consistent.
        self.metrics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load every matching file. Per-file failures are counted and skipped.
    async fn scan(&self) {
        let mut dir = match tokio::fs::read_dir(&self.path).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot list metric directory");
                return;
            }
        };

        let mut loaded = 0usize;
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "failed to read metric directory"
                    );
                    break;
                }
            };
            let file = self.path.join(entry.file_name());
            if !self.filter.matches(&file) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    self.read_failed(&file, &PfeError::Read { path: file.clone(), source: e });
                    continue;
                }
            }
            match self.load(&file).await {
                Ok(()) => loaded += 1,
                Err(e) => self.read_failed(&file, &e),
            }
        }
        info!(path = %self.path.display(), loaded, "directory scan complete");
    }

    /// Rescan after lost events: reload every file, drop entries whose file is gone.
    async fn rescan(&self) {
        self.scan().await;
        let known: Vec<PathBuf> = self.lock().keys().cloned().collect();
        for file in known {
            if let Err(e) = tokio::fs::metadata(&file).await {
                if e.kind() == io::ErrorKind::NotFound {
                    self.remove(&file);
                }
            }
        }
    }

    async fn watch(
        &self,
        mut events: mpsc::Receiver<FsEvent>,
        subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(path = %self.path.display(), "watching for metric events");

        if !*shutdown.borrow_and_update() {
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            error!(
                                path = %self.path.display(),
                                "filesystem events ended, metrics will go stale"
                            );
                            break;
                        };
                        self.handle_event(&event).await;
                    }
                }
            }
        }

        drop(events);
        subscription.stop().await;
        info!(path = %self.path.display(), "stopped watching");
    }

    async fn handle_event(&self, event: &FsEvent) {
        debug!(path = %event.path.display(), kind = ?event.kind, "handling event");
        if event.kind == FsEventKind::Rescan {
            warn!(
                path = %self.path.display(),
                "event queue overflowed or directory moved, rescanning"
            );
            self.rescan().await;
            return;
        }
        if !self.filter.matches(&event.path) {
            return;
        }
        self.refresh(&event.path).await;
    }

    /// Reconcile one path with what is on disk now.
    async fn refresh(&self, file: &Path) {
        match tokio::fs::metadata(file).await {
            Ok(_) => {
                if let Err(e) = self.load(file).await {
                    self.read_failed(file, &e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.remove(file),
            Err(source) => {
                let e = PfeError::Read {
                    path: file.to_path_buf(),
                    source,
                };
                self.read_failed(file, &e);
            }
        }
    }

    /// Read and decode outside the lock, then insert or update in place.
    async fn load(&self, file: &Path) -> Result<()> {
        debug!(file = %file.display(), "loading metric");

        let meta = tokio::fs::metadata(file).await.map_err(|source| PfeError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        if let Some(secs) = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        {
            let name = file.to_string_lossy();
            self.obs.file_mtime.set(&[("file", name.as_ref())], secs.as_secs() as f64);
        }

        let bytes = tokio::fs::read(file).await.map_err(|source| PfeError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        let record = MetricRecord::from_slice(file, &bytes)?;

        let mut metrics = self.lock();
        match metrics.get_mut(file) {
            Some(existing) => existing.apply(record)?,
            None => {
                let metric = Metric::from_record(record, Arc::clone(&self.sink))?;
                metrics.insert(file.to_path_buf(), metric);
            }
        }
        self.obs.metrics_loaded.set(metrics.len() as f64);
        Ok(())
    }

    fn remove(&self, file: &Path) {
        let mut metrics = self.lock();
        if let Some(mut metric) = metrics.remove(file) {
            debug!(file = %file.display(), "removing metric");
            metric.unregister();
            let name = file.to_string_lossy();
            self.obs.file_mtime.remove(&[("file", name.as_ref())]);
        }
        self.obs.metrics_loaded.set(metrics.len() as f64);
    }

    fn read_failed(&self, file: &Path, e: &PfeError) {
        self.obs.file_read_errors.inc();
        error!(
            file = %file.display(),
            kind = e.kind().as_str(),
            error = %e,
            "could not read metric"
        );
    }
}
