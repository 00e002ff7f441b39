//! Observer notification dispatch
//!
//! All observer-facing notifications, regardless of the worker that
//! produced them, are delivered in order on one dedicated notifier
//! thread: the callback context. Pipelines enqueue events on a channel;
//! the notifier thread walks the subscriber registry and invokes the
//! observer callbacks.

use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

use crate::engine::SyncProgress;
use crate::error::ScanError;
use crate::result::ResultRecord;

/// Receives scan, sync, and search life-cycle notifications.
///
/// Every method has a default no-op body so observers implement only
/// what they care about. All methods are invoked on the notifier thread.
pub trait ScanObserver: Send + Sync {
    /// A synchronization is about to start.
    fn will_sync(&self) {}
    /// The synchronization fetched more signatures.
    fn sync_progress(&self, _progress: SyncProgress) {}
    /// The synchronization completed.
    fn did_sync(&self) {}
    /// The synchronization failed.
    fn failed_to_sync(&self, _error: &ScanError) {}

    /// A remote search is about to start.
    fn will_search(&self) {}
    /// The remote search completed; `None` means no match.
    fn did_search(&self, _result: Option<&ResultRecord>) {}
    /// The remote search failed; `Aborted` reports a cancellation.
    fn failed_to_search(&self, _error: &ScanError) {}

    /// A frame has been scanned locally; `None` reports a lost result.
    fn did_scan(&self, _result: Option<&ResultRecord>) {}
    /// Local recognition for a frame failed (non-fatal).
    fn failed_to_scan(&self, _error: &ScanError) {}
}

/// A notification traveling to the callback context.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    WillSync,
    SyncProgress(SyncProgress),
    DidSync,
    FailedToSync(ScanError),
    WillSearch,
    DidSearch(Option<ResultRecord>),
    FailedToSearch(ScanError),
    DidScan(Option<ResultRecord>),
    FailedToScan(ScanError),
}

impl ScanEvent {
    fn deliver(&self, observer: &dyn ScanObserver) {
        match self {
            ScanEvent::WillSync => observer.will_sync(),
            ScanEvent::SyncProgress(progress) => observer.sync_progress(*progress),
            ScanEvent::DidSync => observer.did_sync(),
            ScanEvent::FailedToSync(error) => observer.failed_to_sync(error),
            ScanEvent::WillSearch => observer.will_search(),
            ScanEvent::DidSearch(result) => observer.did_search(result.as_ref()),
            ScanEvent::FailedToSearch(error) => observer.failed_to_search(error),
            ScanEvent::DidScan(result) => observer.did_scan(result.as_ref()),
            ScanEvent::FailedToScan(error) => observer.failed_to_scan(error),
        }
    }

    /// Compact JSON line for trace logging.
    fn to_log_json(&self) -> serde_json::Value {
        match self {
            ScanEvent::WillSync => serde_json::json!({"_t": "will_sync"}),
            ScanEvent::SyncProgress(p) => {
                serde_json::json!({"_t": "sync_progress", "current": p.current, "total": p.total})
            }
            ScanEvent::DidSync => serde_json::json!({"_t": "did_sync"}),
            ScanEvent::FailedToSync(e) => {
                serde_json::json!({"_t": "failed_to_sync", "error": e.to_string()})
            }
            ScanEvent::WillSearch => serde_json::json!({"_t": "will_search"}),
            ScanEvent::DidSearch(r) => serde_json::json!({
                "_t": "did_search",
                "kind": r.as_ref().map(|r| r.kind().as_str()),
            }),
            ScanEvent::FailedToSearch(e) => {
                serde_json::json!({"_t": "failed_to_search", "error": e.to_string()})
            }
            ScanEvent::DidScan(r) => serde_json::json!({
                "_t": "did_scan",
                "kind": r.as_ref().map(|r| r.kind().as_str()),
            }),
            ScanEvent::FailedToScan(e) => {
                serde_json::json!({"_t": "failed_to_scan", "error": e.to_string()})
            }
        }
    }
}

type ObserverRef = Arc<dyn ScanObserver>;

struct Registry {
    next_id: u64,
    entries: Vec<(u64, ObserverRef)>,
}

enum Job {
    Deliver {
        event: ScanEvent,
        /// Task-scoped observers, delivered after the registry
        /// subscribers in registration order.
        extras: Vec<ObserverRef>,
    },
    Shutdown,
}

/// Keeps an observer registered with a [`Notifier`]. Dropping the handle
/// unregisters the observer; no notification is delivered to it after
/// the drop returns on the notifier thread.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut registry) = registry.lock() {
                registry.entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// The single callback context shared by every pipeline of a scanner.
pub struct Notifier {
    tx: Sender<Job>,
    registry: Arc<Mutex<Registry>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, rx) = unbounded::<Job>();
        let registry = Arc::new(Mutex::new(Registry {
            next_id: 0,
            entries: Vec::new(),
        }));
        let worker_registry = registry.clone();
        let worker = thread::Builder::new()
            .name("scan-notifier".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Deliver { event, extras } => {
                            if log::log_enabled!(log::Level::Trace) {
                                log::trace!("{}", event.to_log_json());
                            }
                            let subscribers: Vec<ObserverRef> = {
                                let registry = worker_registry
                                    .lock()
                                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                                registry.entries.iter().map(|(_, o)| o.clone()).collect()
                            };
                            for observer in subscribers.iter().chain(extras.iter()) {
                                event.deliver(observer.as_ref());
                            }
                        }
                        Job::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn notifier thread");
        Self {
            tx,
            registry,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Register an observer for every subsequent notification.
    pub fn subscribe(&self, observer: Arc<dyn ScanObserver>) -> Subscription {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, observer));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Enqueue an event for delivery to every subscriber.
    pub fn notify(&self, event: ScanEvent) {
        self.notify_with(event, Vec::new());
    }

    /// Enqueue an event for delivery to every subscriber plus a snapshot
    /// of task-scoped observers.
    pub(crate) fn notify_with(&self, event: ScanEvent, extras: Vec<ObserverRef>) {
        // Send only fails after shutdown, when no delivery is expected.
        let _ = self.tx.send(Job::Deliver { event, extras });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        let _ = self.tx.send(Job::Shutdown);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}
