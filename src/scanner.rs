//! Scanner core - owns the recognition engine handle
//!
//! The [`Scanner`] wraps exactly one [`RecognitionEngine`] and serializes
//! admin operations (open/close) against every other operation on the
//! handle: admin takes the write side of a reader/writer guard, while
//! search/decode/match/sync/remote-search take the shared side and rely
//! on the engine being safe for concurrent non-admin blocking calls.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::engine::{DatabaseInfo, EngineMatch, RecognitionEngine, SyncControl, SyncProgress};
use crate::error::ScanError;
use crate::image::Frame;
use crate::options::{KindSet, ResultKind, ScanOptions};
use crate::result::{MatchGeometry, ResultRecord};
use crate::task::CancelToken;

#[derive(Debug, Default)]
struct HandleState {
    open: bool,
    db_path: Option<PathBuf>,
}

/// Owns the single recognition-engine connection.
///
/// Explicitly constructed and owned by its creator; independent
/// instances never share state.
pub struct Scanner {
    engine: Arc<dyn RecognitionEngine>,
    state: RwLock<HandleState>,
}

impl Scanner {
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            engine,
            state: RwLock::new(HandleState::default()),
        }
    }

    /// Open the engine on a database file, binding API credentials.
    ///
    /// The scanner exclusively owns the database file while open. Fails
    /// with `AlreadyOpen` if already open; it must be closed first before
    /// reopening with different credentials or a different file.
    pub fn open(&self, key: &str, secret: &str, path: &Path) -> Result<(), ScanError> {
        let mut state = self.state.write().map_err(|_| ScanError::Thread)?;
        if state.open {
            return Err(ScanError::AlreadyOpen);
        }
        self.engine.open(path, key, secret)?;
        state.open = true;
        state.db_path = Some(path.to_path_buf());
        log::debug!("scanner opened on {:?}", path);
        Ok(())
    }

    /// Close the engine, releasing the handle and the file lock.
    pub fn close(&self) -> Result<(), ScanError> {
        let mut state = self.state.write().map_err(|_| ScanError::Thread)?;
        if !state.open {
            return Err(ScanError::NotOpen);
        }
        self.engine.close()?;
        state.open = false;
        state.db_path = None;
        log::debug!("scanner closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.read().map(|s| s.open).unwrap_or(false)
    }

    /// Remove a database file.
    ///
    /// Fails with `Busy` while this scanner holds the file open; close
    /// first.
    pub fn clean(&self, path: &Path) -> Result<(), ScanError> {
        let state = self.state.read().map_err(|_| ScanError::Thread)?;
        if state.open && state.db_path.as_deref() == Some(path) {
            return Err(ScanError::Busy);
        }
        self.engine.clean(path)
    }

    /// Number of image records in the local database; 0 when empty.
    pub fn count(&self) -> Result<usize, ScanError> {
        let _state = self.shared_handle()?;
        match self.engine.info() {
            Ok(info) => Ok(info.count),
            Err(ScanError::Empty) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Identifiers of every synchronized reference image.
    ///
    /// Fails with `Empty` when the database holds no records.
    pub fn info(&self) -> Result<DatabaseInfo, ScanError> {
        let _state = self.shared_handle()?;
        self.engine.info()
    }

    /// Match a frame against the local signature database.
    ///
    /// Blocking, but designed to be fast enough for the frame-delivery
    /// thread. Returns the single best match, or `None`.
    pub fn local_search(
        &self,
        query: &Frame,
        options: &ScanOptions,
    ) -> Result<Option<ResultRecord>, ScanError> {
        let _state = self.shared_handle()?;
        self.engine
            .search(query, options.search_flags())?
            .map(marshal)
            .transpose()
    }

    /// Decode a barcode of one of the requested formats.
    pub fn decode(&self, query: &Frame, formats: KindSet) -> Result<Option<ResultRecord>, ScanError> {
        let _state = self.shared_handle()?;
        self.engine
            .decode(query, formats.barcodes())?
            .map(marshal)
            .transpose()
    }

    /// Match a frame against one named reference image.
    ///
    /// Fails with `NotFound` when no reference carries this identifier,
    /// `Empty` when the database holds no records.
    pub fn match_reference(
        &self,
        query: &Frame,
        reference_id: &str,
        options: &ScanOptions,
    ) -> Result<Option<ResultRecord>, ScanError> {
        let _state = self.shared_handle()?;
        self.engine
            .match_reference(query, reference_id, options.search_flags())?
            .map(marshal)
            .transpose()
    }

    /// Match a frame against the recognition service over the network.
    ///
    /// Blocking; never call this on the frame-delivery thread. Raising
    /// `cancel` from another thread makes the call return `Aborted`.
    pub fn remote_search(
        &self,
        query: &Frame,
        cancel: &CancelToken,
    ) -> Result<Option<ResultRecord>, ScanError> {
        let _state = self.shared_handle()?;
        self.engine
            .remote_search(query, cancel)?
            .map(marshal)
            .transpose()
    }

    /// Synchronize the local signature database from the service.
    ///
    /// Blocking; never call this on the frame-delivery thread. The sink
    /// receives (current, total) updates; raising `cancel` stops the
    /// engine at its earliest opportunity with `Aborted`.
    pub fn synchronize(
        &self,
        progress_sink: &mut dyn FnMut(SyncProgress),
        cancel: &CancelToken,
    ) -> Result<(), ScanError> {
        let _state = self.shared_handle()?;
        self.engine.synchronize(&mut |progress| {
            progress_sink(progress);
            if cancel.is_cancelled() {
                SyncControl::Cancel
            } else {
                SyncControl::Continue
            }
        })
    }

    /// Take the shared side of the handle guard, checking the handle is
    /// open. Admin operations are excluded while the guard lives.
    fn shared_handle(&self) -> Result<RwLockReadGuard<'_, HandleState>, ScanError> {
        let state = self.state.read().map_err(|_| ScanError::Thread)?;
        if !state.open {
            return Err(ScanError::NotOpen);
        }
        Ok(state)
    }
}

/// Marshal a raw engine match into an immutable result record.
///
/// Geometry is carried over for image matches only; whatever geometry a
/// misbehaving engine reports on a barcode is dropped so the accessors
/// stay absent for barcode kinds.
fn marshal(raw: EngineMatch) -> Result<ResultRecord, ScanError> {
    if raw.kind == ResultKind::Image {
        Ok(ResultRecord::image_match(
            raw.payload,
            MatchGeometry {
                homography: raw.homography,
                corners: raw.corners,
                dimensions: raw.dimensions,
            },
        ))
    } else {
        ResultRecord::barcode(raw.kind, raw.payload)
    }
}
