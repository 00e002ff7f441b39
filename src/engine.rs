//! Recognition engine interface
//!
//! The matching and decoding algorithms live in an external engine; this
//! module defines the seam the orchestration layer drives it through.
//! Every method is blocking. Implementations must allow the non-admin
//! calls (`search`/`match`/`decode`/`remote_search`/`synchronize`/`info`)
//! to run concurrently with each other; [`crate::scanner::Scanner`]
//! guarantees they never overlap an `open` or `close`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::image::Frame;
use crate::options::{KindSet, ResultKind, SearchFlags};
use crate::task::CancelToken;

/// A raw match produced by the engine, before result marshaling.
///
/// Geometry fields are only populated for [`ResultKind::Image`] matches.
#[derive(Debug, Clone)]
pub struct EngineMatch {
    pub kind: ResultKind,
    pub payload: Vec<u8>,
    pub homography: Option<[f32; 9]>,
    pub corners: Option<[[f32; 2]; 4]>,
    pub dimensions: Option<(u32, u32)>,
}

/// Synchronization progress, as reported by the engine callback.
///
/// Either counter may be unknown while the engine negotiates the
/// signature list with the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Signatures fetched so far, if known.
    pub current: Option<u32>,
    /// Total signatures to fetch, if known.
    pub total: Option<u32>,
}

/// Returned by the progress sink to continue or cancel a running
/// synchronization at its earliest opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncControl {
    Continue,
    Cancel,
}

/// Contents of the local signature database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Number of image records.
    pub count: usize,
    /// Unique identifier of every reference image.
    pub ids: Vec<String>,
}

/// The stateful, blocking recognition engine handle.
///
/// Not reentrant for admin operations: callers must never run `open` or
/// `close` concurrently with any other method on the same instance.
pub trait RecognitionEngine: Send + Sync {
    /// Open the engine on a database file with API credentials.
    fn open(&self, path: &Path, key: &str, secret: &str) -> Result<(), ScanError>;

    /// Close the engine, releasing the database file lock.
    fn close(&self) -> Result<(), ScanError>;

    /// Remove a database file. Fails with `Busy` while an open handle
    /// references it.
    fn clean(&self, path: &Path) -> Result<(), ScanError>;

    /// Match a frame against the local signature database. `Ok(None)`
    /// means no match.
    fn search(&self, query: &Frame, flags: SearchFlags) -> Result<Option<EngineMatch>, ScanError>;

    /// Match a frame against one named reference image.
    fn match_reference(
        &self,
        query: &Frame,
        reference_id: &str,
        flags: SearchFlags,
    ) -> Result<Option<EngineMatch>, ScanError>;

    /// Decode a barcode of one of the requested formats.
    fn decode(&self, query: &Frame, formats: KindSet) -> Result<Option<EngineMatch>, ScanError>;

    /// Match a frame against the recognition service over the network.
    ///
    /// Blocking; polls `cancel` at network-layer poll points and returns
    /// `Err(Aborted)` once the flag is observed.
    fn remote_search(
        &self,
        query: &Frame,
        cancel: &CancelToken,
    ) -> Result<Option<EngineMatch>, ScanError>;

    /// Synchronize the local signature database from the service.
    ///
    /// Blocking; invokes `progress` as signatures are fetched and stops
    /// at the earliest opportunity when the sink returns
    /// [`SyncControl::Cancel`].
    fn synchronize(
        &self,
        progress: &mut dyn FnMut(SyncProgress) -> SyncControl,
    ) -> Result<(), ScanError>;

    /// Describe the local database. Fails with `Empty` when it holds no
    /// records.
    fn info(&self) -> Result<DatabaseInfo, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_progress_serialization() {
        let progress = SyncProgress {
            current: Some(12),
            total: Some(40),
        };
        let json = serde_json::to_string(&progress).unwrap();
        assert_eq!(json, r#"{"current":12,"total":40}"#);

        let unknown: SyncProgress = serde_json::from_str(r#"{"current":null,"total":null}"#).unwrap();
        assert_eq!(unknown, SyncProgress::default());
    }
}
