//! Background database synchronization
//!
//! At most one synchronization runs at a time, on its own worker thread.
//! Starting a synchronization while one is in flight does not stack a
//! second task: the caller's observers join the running one and receive
//! its remaining notifications. All notifications go through the shared
//! [`Notifier`] so they interleave in order with search and scan events.

use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::ScanError;
use crate::notify::{Notifier, ScanEvent, ScanObserver};
use crate::scanner::Scanner;
use crate::task::CancelToken;

type ObserverRef = Arc<dyn ScanObserver>;

struct ActiveSync {
    /// Task-scoped observers; grows while the task runs as later
    /// `start` calls coalesce into it.
    observers: Arc<Mutex<Vec<ObserverRef>>>,
    cancel: CancelToken,
}

/// Runs database synchronizations off the caller's thread.
pub struct SyncPipeline {
    scanner: Arc<Scanner>,
    notifier: Arc<Notifier>,
    active: Arc<Mutex<Option<ActiveSync>>>,
}

impl SyncPipeline {
    pub fn new(scanner: Arc<Scanner>, notifier: Arc<Notifier>) -> Self {
        Self {
            scanner,
            notifier,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a synchronization, or join the one already running.
    ///
    /// Returns `Ok(true)` when a new task was started and `Ok(false)`
    /// when the observers were attached to an in-flight task instead.
    /// Observers receive `will_sync`, progress updates, and exactly one
    /// terminal notification, in that order, on the notifier thread.
    pub fn start(&self, observers: Vec<ObserverRef>) -> Result<bool, ScanError> {
        if !self.scanner.is_open() {
            return Err(ScanError::NotOpen);
        }
        let mut active = self.active.lock().map_err(|_| ScanError::Thread)?;
        if let Some(task) = active.as_ref() {
            if !observers.is_empty() {
                // enqueue will_sync before the observers join the task:
                // every event the task sends them afterwards is ordered
                // behind it, so late joiners still see the full
                // will -> terminal pairing
                self.notifier
                    .notify_with(ScanEvent::WillSync, observers.clone());
                task.observers
                    .lock()
                    .map_err(|_| ScanError::Thread)?
                    .extend(observers);
            }
            return Ok(false);
        }

        let task_observers = Arc::new(Mutex::new(observers));
        let cancel = CancelToken::new();
        *active = Some(ActiveSync {
            observers: task_observers.clone(),
            cancel: cancel.clone(),
        });
        drop(active);

        let scanner = self.scanner.clone();
        let notifier = self.notifier.clone();
        let slot = self.active.clone();
        let spawned = thread::Builder::new().name("scan-sync".into()).spawn(move || {
            log::info!("database synchronization started");
            notifier.notify_with(ScanEvent::WillSync, snapshot(&task_observers));

            let result = scanner.synchronize(
                &mut |progress| {
                    notifier.notify_with(ScanEvent::SyncProgress(progress), snapshot(&task_observers));
                },
                &cancel,
            );

            // free the slot before the terminal notification so an
            // observer reacting to it can start the next synchronization
            if let Ok(mut active) = slot.lock() {
                *active = None;
            }
            let extras = snapshot(&task_observers);
            match result {
                Ok(()) => {
                    log::info!("database synchronization finished");
                    notifier.notify_with(ScanEvent::DidSync, extras);
                }
                Err(error) => {
                    log::warn!("database synchronization failed: {}", error);
                    notifier.notify_with(ScanEvent::FailedToSync(error), extras);
                }
            }
        });
        if spawned.is_err() {
            if let Ok(mut active) = self.active.lock() {
                *active = None;
            }
            return Err(ScanError::Thread);
        }
        Ok(true)
    }

    /// Whether a synchronization is currently in flight.
    pub fn is_syncing(&self) -> bool {
        self.active
            .lock()
            .map(|active| active.is_some())
            .unwrap_or(false)
    }

    /// Request cancellation of the in-flight synchronization, if any.
    ///
    /// Not part of the public surface: synchronizations run to
    /// completion or failure from the caller's point of view. Used when
    /// tearing internal state down; the task keeps running until the
    /// engine observes the flag, then terminates with a
    /// `failed_to_sync(Aborted)`.
    pub(crate) fn cancel(&self) -> bool {
        match self.active.lock() {
            Ok(active) => match active.as_ref() {
                Some(task) => {
                    task.cancel.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

impl Drop for SyncPipeline {
    /// The worker holds its own handles on the scanner and notifier, so
    /// it would otherwise run to completion with no one left to start
    /// the next task. Raising the flag lets it wind down at the engine's
    /// next poll point.
    fn drop(&mut self) {
        self.cancel();
    }
}

fn snapshot(observers: &Arc<Mutex<Vec<ObserverRef>>>) -> Vec<ObserverRef> {
    observers
        .lock()
        .map(|observers| observers.clone())
        .unwrap_or_default()
}
