//! One-shot server-side image search
//!
//! A search runs on its own worker thread and holds a single-flight
//! slot: submitting while one is in flight is refused rather than
//! queued. Cancellation is cooperative; a cancelled task still
//! terminates through the notifier, with an `Aborted` failure.

use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use crate::error::ScanError;
use crate::image::Frame;
use crate::notify::{Notifier, ScanEvent, ScanObserver};
use crate::scanner::Scanner;
use crate::task::{CancelToken, TaskSlot};

type ObserverRef = Arc<dyn ScanObserver>;

/// Runs remote searches off the caller's thread, one at a time.
pub struct SearchPipeline {
    scanner: Arc<Scanner>,
    notifier: Arc<Notifier>,
    slot: Arc<TaskSlot>,
    active: Arc<Mutex<Option<CancelToken>>>,
    /// Invoked on the worker thread when a task ends, before its
    /// terminal notification is enqueued. The session uses it to leave
    /// the searching state.
    on_terminal: RwLock<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl SearchPipeline {
    pub fn new(scanner: Arc<Scanner>, notifier: Arc<Notifier>) -> Self {
        Self {
            scanner,
            notifier,
            slot: Arc::new(TaskSlot::new()),
            active: Arc::new(Mutex::new(None)),
            on_terminal: RwLock::new(None),
        }
    }

    pub(crate) fn set_on_terminal(&self, hook: Box<dyn Fn() + Send + Sync>) {
        if let Ok(mut on_terminal) = self.on_terminal.write() {
            *on_terminal = Some(hook);
        }
    }

    /// Submit a frame for a server-side search.
    ///
    /// Fails with `AlreadyActive` while a search is in flight and
    /// `NotOpen` when the scanner is closed. Observers receive
    /// `will_search` then exactly one terminal notification.
    pub fn submit(self: &Arc<Self>, query: Frame, observers: Vec<ObserverRef>) -> Result<(), ScanError> {
        self.submit_with(query, observers, CancelToken::new())
    }

    /// Like [`submit`](Self::submit), with a caller-owned cancellation
    /// token. The session shares the token with the task it spawns so a
    /// cancel raised at any point after the snap, even before the task
    /// exists, is observed by the engine call.
    pub(crate) fn submit_with(
        self: &Arc<Self>,
        query: Frame,
        observers: Vec<ObserverRef>,
        cancel: CancelToken,
    ) -> Result<(), ScanError> {
        if !self.scanner.is_open() {
            return Err(ScanError::NotOpen);
        }
        let Some(guard) = self.slot.acquire() else {
            return Err(ScanError::AlreadyActive);
        };
        *self.active.lock().map_err(|_| ScanError::Thread)? = Some(cancel.clone());

        let pipeline = self.clone();
        let spawned = thread::Builder::new().name("scan-search".into()).spawn(move || {
            log::debug!("remote search started");
            pipeline
                .notifier
                .notify_with(ScanEvent::WillSearch, observers.clone());

            let outcome = pipeline.scanner.remote_search(&query, &cancel);

            // release the slot before the terminal notification so an
            // observer reacting to it can submit the next search
            if let Ok(mut active) = pipeline.active.lock() {
                *active = None;
            }
            drop(guard);
            if let Ok(on_terminal) = pipeline.on_terminal.read() {
                if let Some(hook) = on_terminal.as_ref() {
                    hook();
                }
            }
            match outcome {
                Ok(result) => {
                    log::debug!("remote search finished, match: {}", result.is_some());
                    pipeline
                        .notifier
                        .notify_with(ScanEvent::DidSearch(result), observers);
                }
                Err(error) => {
                    log::debug!("remote search failed: {}", error);
                    pipeline
                        .notifier
                        .notify_with(ScanEvent::FailedToSearch(error), observers);
                }
            }
        });
        if spawned.is_err() {
            if let Ok(mut active) = self.active.lock() {
                *active = None;
            }
            return Err(ScanError::Thread);
        }
        Ok(())
    }

    /// Whether a search is currently in flight.
    pub fn is_searching(&self) -> bool {
        self.slot.is_active()
    }

    /// Request cancellation of the in-flight search, if any.
    ///
    /// The task still terminates through the notifier, with a
    /// `failed_to_search(Aborted)`.
    pub fn cancel(&self) -> bool {
        match self.active.lock() {
            Ok(active) => match active.as_ref() {
                Some(cancel) => {
                    cancel.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ResultKind;
    use crate::testkit::{next_event, test_frame, MockEngine, RecordingObserver};
    use std::time::{Duration, Instant};

    fn pipeline(engine: Arc<MockEngine>) -> (Arc<SearchPipeline>, tempfile::TempDir) {
        crate::testkit::init_logging();
        let dir = tempfile::tempdir().unwrap();
        let scanner = Arc::new(Scanner::new(engine));
        scanner
            .open("key", "secret", &dir.path().join("scan.db"))
            .unwrap();
        (
            Arc::new(SearchPipeline::new(scanner, Arc::new(Notifier::new()))),
            dir,
        )
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_search_delivers_match() {
        let engine = MockEngine::shared();
        engine.push_remote_result(Ok(Some(MockEngine::image_match("ref-42"))));
        let (pipeline, _dir) = pipeline(engine);
        let (observer, rx) = RecordingObserver::new();

        pipeline.submit(test_frame(), vec![observer as ObserverRef]).unwrap();

        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        match next_event(&rx) {
            ScanEvent::DidSearch(Some(result)) => {
                assert_eq!(result.kind(), ResultKind::Image);
                assert_eq!(result.text(), Some("ref-42"));
            }
            other => panic!("expected a match, got {:?}", other),
        }
        wait_until(|| !pipeline.is_searching());
    }

    #[test]
    fn test_search_delivers_no_match() {
        let engine = MockEngine::shared();
        engine.push_remote_result(Ok(None));
        let (pipeline, _dir) = pipeline(engine);
        let (observer, rx) = RecordingObserver::new();

        pipeline.submit(test_frame(), vec![observer as ObserverRef]).unwrap();
        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        assert!(matches!(next_event(&rx), ScanEvent::DidSearch(None)));
    }

    #[test]
    fn test_search_failure_reported() {
        let engine = MockEngine::shared();
        engine.push_remote_result(Err(ScanError::Timeout));
        let (pipeline, _dir) = pipeline(engine);
        let (observer, rx) = RecordingObserver::new();

        pipeline.submit(test_frame(), vec![observer as ObserverRef]).unwrap();
        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        assert!(matches!(
            next_event(&rx),
            ScanEvent::FailedToSearch(ScanError::Timeout)
        ));
    }

    #[test]
    fn test_second_submit_refused_while_in_flight() {
        let engine = MockEngine::shared();
        let gate = engine.gate_remote(Ok(None));
        let (pipeline, _dir) = pipeline(engine);
        let (observer, rx) = RecordingObserver::new();

        pipeline.submit(test_frame(), vec![observer as ObserverRef]).unwrap();
        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        assert!(pipeline.is_searching());

        assert_eq!(
            pipeline.submit(test_frame(), vec![]).unwrap_err(),
            ScanError::AlreadyActive
        );

        gate.release();
        assert!(matches!(next_event(&rx), ScanEvent::DidSearch(None)));
        wait_until(|| !pipeline.is_searching());
    }

    #[test]
    fn test_cancel_aborts_search() {
        let engine = MockEngine::shared();
        engine.block_remote_until_cancel();
        let (pipeline, _dir) = pipeline(engine);
        let (observer, rx) = RecordingObserver::new();

        pipeline.submit(test_frame(), vec![observer as ObserverRef]).unwrap();
        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        assert!(pipeline.cancel());

        assert!(matches!(
            next_event(&rx),
            ScanEvent::FailedToSearch(ScanError::Aborted)
        ));
        wait_until(|| !pipeline.is_searching());
        assert!(!pipeline.cancel());
    }

    #[test]
    fn test_submit_requires_open_scanner() {
        let scanner = Arc::new(Scanner::new(MockEngine::shared()));
        let pipeline = Arc::new(SearchPipeline::new(scanner, Arc::new(Notifier::new())));
        assert_eq!(
            pipeline.submit(test_frame(), vec![]).unwrap_err(),
            ScanError::NotOpen
        );
    }

    #[test]
    fn test_search_restarts_after_completion() {
        let engine = MockEngine::shared();
        engine.push_remote_result(Ok(None));
        engine.push_remote_result(Ok(Some(MockEngine::image_match("ref-01"))));
        let (pipeline, _dir) = pipeline(engine);
        let (observer, rx) = RecordingObserver::new();

        pipeline
            .submit(test_frame(), vec![observer.clone() as ObserverRef])
            .unwrap();
        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        assert!(matches!(next_event(&rx), ScanEvent::DidSearch(None)));
        wait_until(|| !pipeline.is_searching());

        pipeline.submit(test_frame(), vec![observer as ObserverRef]).unwrap();
        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        assert!(matches!(next_event(&rx), ScanEvent::DidSearch(Some(_))));
    }

    #[test]
    fn test_terminal_hook_runs_before_notification() {
        let engine = MockEngine::shared();
        engine.push_remote_result(Ok(None));
        let (pipeline, _dir) = pipeline(engine);
        let (observer, rx) = RecordingObserver::new();

        let hook_pipeline = pipeline.clone();
        let (hook_tx, hook_rx) = crossbeam_channel::unbounded();
        pipeline.set_on_terminal(Box::new(move || {
            let _ = hook_tx.send(hook_pipeline.is_searching());
        }));

        pipeline.submit(test_frame(), vec![observer as ObserverRef]).unwrap();
        assert!(matches!(next_event(&rx), ScanEvent::WillSearch));
        assert!(matches!(next_event(&rx), ScanEvent::DidSearch(None)));
        // the hook observed the slot already released
        assert_eq!(hook_rx.recv_timeout(Duration::from_secs(2)), Ok(false));
    }
}
