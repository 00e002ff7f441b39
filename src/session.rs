//! Scan session state machine
//!
//! A [`ScanSession`] sits between the camera and the scanner: every
//! captured frame goes through [`process_frame`](ScanSession::process_frame)
//! on the frame-delivery thread, which runs the fast local recognition
//! paths and smooths results over consecutive frames. A snap hands the
//! next frame to the server-side search pipeline instead, and pauses
//! drop frames entirely.
//!
//! States and legal transitions:
//!
//! - `Default`: frames are scanned locally. `snap` moves to `Searching`,
//!   `pause` to `Paused`.
//! - `Searching`: a server-side search is pending or in flight; frames
//!   keep being scanned locally. Only `cancel` leaves this state early;
//!   the search terminating returns the session to `Default`.
//! - `Paused`: frames are dropped. Only `resume` leaves this state.

use std::sync::{Arc, Mutex};

use crate::config::SessionConfig;
use crate::error::ScanError;
use crate::image::Frame;
use crate::notify::{Notifier, ScanEvent, ScanObserver, Subscription};
use crate::result::ResultRecord;
use crate::scanner::Scanner;
use crate::search::SearchPipeline;
use crate::task::CancelToken;

/// The activity of a [`ScanSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Frames are scanned locally.
    Default,
    /// A server-side search is pending or in flight.
    Searching,
    /// Frames are dropped.
    Paused,
}

struct SessionState {
    state: ScanState,
    /// The next frame goes to the search pipeline instead of the local
    /// recognition paths.
    snap_pending: bool,
    /// A submitted search has not terminated yet.
    in_flight: bool,
    /// Cancellation token for the current snap, created when the snap is
    /// taken and shared with the task it becomes. Owning it here means a
    /// cancel raised between consuming the snap and the pipeline storing
    /// the task is still observed by the engine call.
    search_cancel: Option<CancelToken>,
    /// Consecutive local misses since the current result was locked.
    losts: u32,
    /// The result reported by the last `did_scan`, if not yet lost.
    last_result: Option<ResultRecord>,
}

/// Per-frame scanning front end over a [`Scanner`].
pub struct ScanSession {
    scanner: Arc<Scanner>,
    notifier: Arc<Notifier>,
    search: Arc<SearchPipeline>,
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
}

impl ScanSession {
    pub fn new(scanner: Arc<Scanner>, notifier: Arc<Notifier>, config: SessionConfig) -> Self {
        let search = Arc::new(SearchPipeline::new(scanner.clone(), notifier.clone()));
        let state = Arc::new(Mutex::new(SessionState {
            state: ScanState::Default,
            snap_pending: false,
            in_flight: false,
            search_cancel: None,
            losts: 0,
            last_result: None,
        }));

        // runs on the search worker when its task ends, before the
        // terminal notification: an observer reacting to did_search can
        // immediately snap again
        let hook_state = state.clone();
        search.set_on_terminal(Box::new(move || {
            if let Ok(mut state) = hook_state.lock() {
                state.in_flight = false;
                if state.state == ScanState::Searching && !state.snap_pending {
                    state.state = ScanState::Default;
                    state.search_cancel = None;
                }
            }
        }));

        Self {
            scanner,
            notifier,
            search,
            config,
            state,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
            .lock()
            .map(|s| s.state)
            .unwrap_or(ScanState::Default)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register an observer for this session's notifications.
    pub fn subscribe(&self, observer: Arc<dyn ScanObserver>) -> Subscription {
        self.notifier.subscribe(observer)
    }

    /// Request a server-side search of the next frame.
    ///
    /// Legal from `Default` only; returns whether the session moved to
    /// `Searching`. The search starts when the next frame arrives.
    pub fn snap(&self) -> bool {
        match self.state.lock() {
            Ok(mut state) if state.state == ScanState::Default => {
                state.state = ScanState::Searching;
                state.snap_pending = true;
                state.search_cancel = Some(CancelToken::new());
                true
            }
            _ => false,
        }
    }

    /// Abandon the pending or in-flight server-side search.
    ///
    /// Returns whether the session was `Searching`. The session is back
    /// in `Default` when this returns; an already-submitted search still
    /// terminates through the notifier with an `Aborted` failure.
    pub fn cancel(&self) -> bool {
        match self.state.lock() {
            Ok(mut state) if state.state == ScanState::Searching => {
                state.state = ScanState::Default;
                state.snap_pending = false;
                // the task the snap became (or is about to become) polls
                // this very token, so the raise is observed even when it
                // lands between consuming the snap and the pipeline
                // storing the task
                if let Some(cancel) = state.search_cancel.take() {
                    cancel.cancel();
                }
                true
            }
            _ => false,
        }
    }

    /// Stop processing frames.
    ///
    /// Refused while a submitted search is in flight: the session state
    /// would be ambiguous, so the caller must `cancel` first. A snap that
    /// has not reached the pipeline yet is simply dropped.
    pub fn pause(&self) -> bool {
        match self.state.lock() {
            Ok(mut state) => match state.state {
                ScanState::Paused => true,
                ScanState::Default => {
                    state.state = ScanState::Paused;
                    true
                }
                ScanState::Searching if state.snap_pending && !state.in_flight => {
                    state.snap_pending = false;
                    state.state = ScanState::Paused;
                    true
                }
                ScanState::Searching => false,
            },
            Err(_) => false,
        }
    }

    /// Resume processing frames after a pause.
    pub fn resume(&self) -> bool {
        match self.state.lock() {
            Ok(mut state) if state.state == ScanState::Paused => {
                state.state = ScanState::Default;
                true
            }
            _ => false,
        }
    }

    /// Feed one captured frame through the session.
    ///
    /// Called on the frame-delivery thread. Depending on the state the
    /// frame is dropped (`Paused`), submitted to the search pipeline
    /// (pending snap), or scanned locally. Returns the smoothed scan
    /// result; notifications are delivered asynchronously through the
    /// notifier.
    ///
    /// A recognition error is reported via `failed_to_scan` and returned,
    /// but leaves the session state untouched: the next frame is
    /// processed normally.
    pub fn process_frame(&self, frame: &Frame) -> Result<Option<ResultRecord>, ScanError> {
        enum Action {
            Drop,
            Submit(CancelToken),
            Scan,
        }
        let action = {
            let mut state = self.state.lock().map_err(|_| ScanError::Thread)?;
            match state.state {
                ScanState::Paused => Action::Drop,
                ScanState::Searching if state.snap_pending => {
                    state.snap_pending = false;
                    state.in_flight = true;
                    // the session-owned token travels with the task, so a
                    // cancel raised while submission is still underway is
                    // observed by the engine call
                    Action::Submit(state.search_cancel.clone().unwrap_or_default())
                }
                _ => Action::Scan,
            }
        };

        match action {
            Action::Drop => Ok(None),
            Action::Submit(cancel) => {
                match self.search.submit_with(frame.clone(), Vec::new(), cancel) {
                    Ok(()) => Ok(None),
                    // the previous task has not released the slot yet;
                    // keep the snap pending and retry on the next frame
                    Err(ScanError::AlreadyActive) => {
                        if let Ok(mut state) = self.state.lock() {
                            if state.state == ScanState::Searching {
                                state.snap_pending = true;
                            }
                            state.in_flight = false;
                        }
                        Ok(None)
                    }
                    Err(error) => {
                        if let Ok(mut state) = self.state.lock() {
                            state.state = ScanState::Default;
                            state.in_flight = false;
                            state.search_cancel = None;
                        }
                        Err(error)
                    }
                }
            }
            Action::Scan => self.scan_frame(frame),
        }
    }

    /// Run the local recognition paths on a frame and smooth the outcome
    /// over consecutive frames.
    fn scan_frame(&self, frame: &Frame) -> Result<Option<ResultRecord>, ScanError> {
        let outcome = self.recognize(frame);
        let raw = match outcome {
            Ok(raw) => raw,
            Err(error) => {
                log::debug!("frame recognition failed: {}", error);
                self.notifier.notify(ScanEvent::FailedToScan(error.clone()));
                return Err(error);
            }
        };

        let mut state = self.state.lock().map_err(|_| ScanError::Thread)?;
        match raw {
            Some(result) => {
                state.losts = 0;
                let result = self.attach_extras(result, frame);
                if state.last_result.as_ref() != Some(&result) {
                    state.last_result = Some(result.clone());
                    self.notifier.notify(ScanEvent::DidScan(Some(result.clone())));
                }
                Ok(Some(result))
            }
            None => {
                if state.last_result.is_none() {
                    return Ok(None);
                }
                state.losts += 1;
                if state.losts >= self.config.max_losts {
                    // the lock is definitively lost; report it once
                    state.losts = 0;
                    state.last_result = None;
                    self.notifier.notify(ScanEvent::DidScan(None));
                    Ok(None)
                } else {
                    // tolerate an isolated miss, keep the locked result
                    Ok(state.last_result.clone())
                }
            }
        }
    }

    /// Image search first, barcode decoding second.
    fn recognize(&self, frame: &Frame) -> Result<Option<ResultRecord>, ScanError> {
        let kinds = self.config.options.kinds;
        if kinds.contains(crate::options::ResultKind::Image) {
            if let Some(result) = self.scanner.local_search(frame, &self.config.options)? {
                return Ok(Some(result));
            }
        }
        let barcodes = kinds.barcodes();
        if !barcodes.is_empty() {
            if let Some(result) = self.scanner.decode(frame, barcodes)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn attach_extras(&self, result: ResultRecord, frame: &Frame) -> ResultRecord {
        if self.config.extras.keeps_frame() {
            let frame = if self.config.use_device_orientation {
                frame.clone()
            } else {
                // orientation is opted out of: geometry stays in the
                // physical capture domain
                frame.clone().with_orientation(crate::image::FrameOrientation::Undefined)
            };
            result.with_frame(frame)
        } else {
            result
        }
    }
}
