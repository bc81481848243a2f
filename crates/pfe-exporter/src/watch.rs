//! Filesystem change notifications for the metric directory.
//!
//! On Linux an inotify watch is turned into a stream of [`FsEvent`]s delivered
//! over a bounded channel. Events only name the path that changed; consumers
//! must `stat` it to learn what actually happened, because kinds are
//! coalesced and reordered under load.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use pfe_core::error::{PfeError, Result};

/// What the OS reported. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    /// A file was closed after writing.
    Written,
    /// A file was renamed into the directory.
    MovedIn,
    /// A file was renamed out of the directory.
    MovedOut,
    /// A file was deleted.
    Deleted,
    /// Events were lost or the directory itself moved; rescan everything.
    Rescan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
}

/// Live OS subscription. Stopping (or dropping) it releases the watch.
pub struct Subscription {
    quit: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivery and wait until the OS resources are released.
    pub async fn stop(mut self) {
        self.release();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn release(&mut self) {
        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Watch `dir` and deliver events into `tx`. Must be called inside a tokio runtime.
#[cfg(target_os = "linux")]
pub fn subscribe(dir: &Path, tx: mpsc::Sender<FsEvent>) -> Result<Subscription> {
    use futures_util::StreamExt;
    use inotify::{Inotify, WatchMask};
    use tracing::{debug, warn};

    let setup_err = |what: &str, e: std::io::Error| PfeError::Subscription {
        path: dir.to_path_buf(),
        reason: format!("{what}: {e}"),
    };

    let inotify = Inotify::init().map_err(|e| setup_err("failed to init inotify instance", e))?;
    inotify
        .watches()
        .add(
            dir,
            WatchMask::CLOSE_WRITE
                | WatchMask::MOVED_TO
                | WatchMask::MOVED_FROM
                | WatchMask::DELETE
                | WatchMask::DELETE_SELF
                | WatchMask::MOVE_SELF,
        )
        .map_err(|e| setup_err("failed to add watch", e))?;
    let buffer = [0u8; 4096];
    let mut event_stream = inotify
        .into_event_stream(buffer)
        .map_err(|e| setup_err("failed to create event stream", e))?;

    let dir_path = dir.to_path_buf();
    let pump = async move {
        while let Some(item) = event_stream.next().await {
            match item {
                Ok(ev) => {
                    let Some(event) = translate(&dir_path, ev.mask, ev.name.as_deref()) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        debug!(path = %dir_path.display(), "event receiver closed");
                        return;
                    }
                }
                Err(e) => {
                    warn!(path = %dir_path.display(), error = %e, "inotify watch failed");
                    return;
                }
            }
        }
        warn!(path = %dir_path.display(), "inotify watch ended unexpectedly");
    };

    let (quit_sender, quit_receiver) = oneshot::channel();
    let released = dir.to_path_buf();
    let task = tokio::spawn(async move {
        tokio::select! {
            _ = quit_receiver => {}
            _ = pump => {}
        }
        debug!(path = %released.display(), "filesystem subscription released");
    });

    Ok(Subscription {
        quit: Some(quit_sender),
        task: Some(task),
    })
}

#[cfg(not(target_os = "linux"))]
pub fn subscribe(dir: &Path, _tx: mpsc::Sender<FsEvent>) -> Result<Subscription> {
    Err(PfeError::Subscription {
        path: dir.to_path_buf(),
        reason: "directory watching is only supported on linux".into(),
    })
}

#[cfg(target_os = "linux")]
fn translate(
    dir: &Path,
    mask: inotify::EventMask,
    name: Option<&std::ffi::OsStr>,
) -> Option<FsEvent> {
    use inotify::EventMask;

    if mask.intersects(EventMask::Q_OVERFLOW | EventMask::DELETE_SELF | EventMask::MOVE_SELF) {
        return Some(FsEvent {
            path: dir.to_path_buf(),
            kind: FsEventKind::Rescan,
        });
    }
    if mask.contains(EventMask::ISDIR) {
        return None;
    }
    let kind = if mask.contains(EventMask::CLOSE_WRITE) {
        FsEventKind::Written
    } else if mask.contains(EventMask::MOVED_TO) {
        FsEventKind::MovedIn
    } else if mask.contains(EventMask::MOVED_FROM) {
        FsEventKind::MovedOut
    } else if mask.contains(EventMask::DELETE) {
        FsEventKind::Deleted
    } else {
        return None;
    };
    Some(FsEvent {
        path: dir.join(name?),
        kind,
    })
}
