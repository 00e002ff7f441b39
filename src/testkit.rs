//! Test support: a scriptable in-memory recognition engine and a
//! recording observer.
//!
//! The mock engine honors the engine contract the orchestration layer
//! relies on: blocking calls, cooperative cancellation observed at poll
//! points, `Empty`/`NotFound` database semantics, and exclusive
//! ownership of the database file while open.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::engine::{DatabaseInfo, EngineMatch, RecognitionEngine, SyncControl, SyncProgress};
use crate::error::ScanError;
use crate::image::{Frame, FrameOrientation, PixelFormat};
use crate::notify::{ScanEvent, ScanObserver};
use crate::options::{KindSet, ResultKind, SearchFlags};
use crate::task::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Initialize logging for a test; honors `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A 640x480 grayscale frame, valid for scanning.
pub fn test_frame() -> Frame {
    Frame::new(
        vec![0u8; 640 * 480],
        640,
        480,
        640,
        PixelFormat::Gray8,
        FrameOrientation::TopLeft,
    )
    .expect("test frame dimensions are valid")
}

/// Releases a gated mock call. Dropping the handle releases it too.
pub struct GateHandle {
    tx: Sender<()>,
}

impl GateHandle {
    pub fn release(&self) {
        let _ = self.tx.send(());
    }
}

enum RemoteScript {
    Respond(Result<Option<EngineMatch>, ScanError>),
    GateThen(Receiver<()>, Result<Option<EngineMatch>, ScanError>),
    BlockUntilCancel,
}

struct SyncScript {
    progress: Vec<(Option<u32>, Option<u32>)>,
    gate: Option<Receiver<()>>,
    result: Result<(), ScanError>,
}

#[derive(Default)]
struct MockState {
    open: bool,
    db_path: Option<PathBuf>,
    records: Vec<String>,
    fail_open: Option<ScanError>,
    local_results: VecDeque<Result<Option<EngineMatch>, ScanError>>,
    decode_results: VecDeque<Result<Option<EngineMatch>, ScanError>>,
    last_decode_formats: Option<KindSet>,
    remote_scripts: VecDeque<RemoteScript>,
    sync_scripts: VecDeque<SyncScript>,
}

/// Scriptable in-memory engine.
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock engine state poisoned")
    }

    /// An image match for the given reference identifier, with geometry.
    pub fn image_match(reference_id: &str) -> EngineMatch {
        EngineMatch {
            kind: ResultKind::Image,
            payload: reference_id.as_bytes().to_vec(),
            homography: Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
            corners: Some([[-0.4, -0.4], [0.4, -0.4], [0.4, 0.4], [-0.4, 0.4]]),
            dimensions: Some((800, 600)),
        }
    }

    pub fn barcode(kind: ResultKind, payload: Vec<u8>) -> EngineMatch {
        EngineMatch {
            kind,
            payload,
            homography: None,
            corners: None,
            dimensions: None,
        }
    }

    pub fn fail_next_open(&self, error: ScanError) {
        self.lock().fail_open = Some(error);
    }

    pub fn set_records(&self, records: Vec<String>) {
        self.lock().records = records;
    }

    pub fn push_local_result(&self, result: Result<Option<EngineMatch>, ScanError>) {
        self.lock().local_results.push_back(result);
    }

    pub fn push_decode_result(&self, result: Result<Option<EngineMatch>, ScanError>) {
        self.lock().decode_results.push_back(result);
    }

    pub fn last_decode_formats(&self) -> Option<KindSet> {
        self.lock().last_decode_formats
    }

    pub fn push_remote_result(&self, result: Result<Option<EngineMatch>, ScanError>) {
        self.lock()
            .remote_scripts
            .push_back(RemoteScript::Respond(result));
    }

    /// Script a remote search that stays in flight until released.
    pub fn gate_remote(&self, result: Result<Option<EngineMatch>, ScanError>) -> GateHandle {
        let (tx, rx) = unbounded();
        self.lock()
            .remote_scripts
            .push_back(RemoteScript::GateThen(rx, result));
        GateHandle { tx }
    }

    /// Script a remote search that blocks until its token is cancelled.
    pub fn block_remote_until_cancel(&self) {
        self.lock()
            .remote_scripts
            .push_back(RemoteScript::BlockUntilCancel);
    }

    /// Script the next synchronization: progress steps, then the result.
    pub fn script_sync(
        &self,
        result: Result<(), ScanError>,
        progress: Vec<(Option<u32>, Option<u32>)>,
    ) {
        self.lock().sync_scripts.push_back(SyncScript {
            progress,
            gate: None,
            result,
        });
    }

    /// Script a synchronization that emits its progress steps and then
    /// stays in flight until released.
    pub fn gate_sync(
        &self,
        result: Result<(), ScanError>,
        progress: Vec<(Option<u32>, Option<u32>)>,
    ) -> GateHandle {
        let (tx, rx) = unbounded();
        self.lock().sync_scripts.push_back(SyncScript {
            progress,
            gate: Some(rx),
            result,
        });
        GateHandle { tx }
    }
}

impl RecognitionEngine for MockEngine {
    fn open(&self, path: &Path, _key: &str, _secret: &str) -> Result<(), ScanError> {
        let mut state = self.lock();
        if let Some(error) = state.fail_open.take() {
            return Err(error);
        }
        fs::File::create(path).map_err(|_| ScanError::NoPerm)?;
        state.open = true;
        state.db_path = Some(path.to_path_buf());
        Ok(())
    }

    fn close(&self) -> Result<(), ScanError> {
        let mut state = self.lock();
        state.open = false;
        state.db_path = None;
        Ok(())
    }

    fn clean(&self, path: &Path) -> Result<(), ScanError> {
        let state = self.lock();
        if state.open && state.db_path.as_deref() == Some(path) {
            return Err(ScanError::Busy);
        }
        if path.exists() {
            fs::remove_file(path).map_err(|_| ScanError::NoPerm)?;
        }
        Ok(())
    }

    fn search(&self, _query: &Frame, _flags: SearchFlags) -> Result<Option<EngineMatch>, ScanError> {
        self.lock().local_results.pop_front().unwrap_or(Ok(None))
    }

    fn match_reference(
        &self,
        _query: &Frame,
        reference_id: &str,
        _flags: SearchFlags,
    ) -> Result<Option<EngineMatch>, ScanError> {
        let state = self.lock();
        if state.records.is_empty() {
            return Err(ScanError::Empty);
        }
        if !state.records.iter().any(|id| id == reference_id) {
            return Err(ScanError::NotFound);
        }
        Ok(Some(MockEngine::image_match(reference_id)))
    }

    fn decode(&self, _query: &Frame, formats: KindSet) -> Result<Option<EngineMatch>, ScanError> {
        let mut state = self.lock();
        state.last_decode_formats = Some(formats);
        state.decode_results.pop_front().unwrap_or(Ok(None))
    }

    fn remote_search(
        &self,
        _query: &Frame,
        cancel: &CancelToken,
    ) -> Result<Option<EngineMatch>, ScanError> {
        let script = self.lock().remote_scripts.pop_front();
        match script {
            None => Ok(None),
            Some(RemoteScript::Respond(result)) => result,
            Some(RemoteScript::GateThen(gate, result)) => {
                loop {
                    if cancel.is_cancelled() {
                        return Err(ScanError::Aborted);
                    }
                    match gate.recv_timeout(POLL_INTERVAL) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                }
                result
            }
            Some(RemoteScript::BlockUntilCancel) => {
                while !cancel.is_cancelled() {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(ScanError::Aborted)
            }
        }
    }

    fn synchronize(
        &self,
        progress: &mut dyn FnMut(SyncProgress) -> SyncControl,
    ) -> Result<(), ScanError> {
        let script = self.lock().sync_scripts.pop_front();
        let Some(script) = script else {
            return Ok(());
        };
        let mut last = SyncProgress::default();
        for (current, total) in script.progress {
            last = SyncProgress { current, total };
            if progress(last) == SyncControl::Cancel {
                return Err(ScanError::Aborted);
            }
        }
        if let Some(gate) = script.gate {
            // poll the callback while gated so cancellation is observed
            loop {
                match gate.recv_timeout(POLL_INTERVAL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        if progress(last) == SyncControl::Cancel {
                            return Err(ScanError::Aborted);
                        }
                    }
                }
            }
        }
        script.result
    }

    fn info(&self) -> Result<DatabaseInfo, ScanError> {
        let state = self.lock();
        if state.records.is_empty() {
            return Err(ScanError::Empty);
        }
        Ok(DatabaseInfo {
            count: state.records.len(),
            ids: state.records.clone(),
        })
    }
}

/// Observer pushing every notification into a channel for assertions.
pub struct RecordingObserver {
    tx: Sender<ScanEvent>,
}

impl RecordingObserver {
    pub fn new() -> (Arc<Self>, Receiver<ScanEvent>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl ScanObserver for RecordingObserver {
    fn will_sync(&self) {
        let _ = self.tx.send(ScanEvent::WillSync);
    }
    fn sync_progress(&self, progress: SyncProgress) {
        let _ = self.tx.send(ScanEvent::SyncProgress(progress));
    }
    fn did_sync(&self) {
        let _ = self.tx.send(ScanEvent::DidSync);
    }
    fn failed_to_sync(&self, error: &ScanError) {
        let _ = self.tx.send(ScanEvent::FailedToSync(error.clone()));
    }
    fn will_search(&self) {
        let _ = self.tx.send(ScanEvent::WillSearch);
    }
    fn did_search(&self, result: Option<&crate::result::ResultRecord>) {
        let _ = self.tx.send(ScanEvent::DidSearch(result.cloned()));
    }
    fn failed_to_search(&self, error: &ScanError) {
        let _ = self.tx.send(ScanEvent::FailedToSearch(error.clone()));
    }
    fn did_scan(&self, result: Option<&crate::result::ResultRecord>) {
        let _ = self.tx.send(ScanEvent::DidScan(result.cloned()));
    }
    fn failed_to_scan(&self, error: &ScanError) {
        let _ = self.tx.send(ScanEvent::FailedToScan(error.clone()));
    }
}

/// Wait for the next recorded notification.
pub fn next_event(rx: &Receiver<ScanEvent>) -> ScanEvent {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("expected a notification")
}

/// Assert that no notification arrives within a short window.
pub fn assert_no_event(rx: &Receiver<ScanEvent>) {
    if let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
        panic!("unexpected notification: {:?}", event);
    }
}
