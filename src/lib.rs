//! Visual recognition session orchestration
//!
//! This library drives a stateful recognition engine from a camera feed:
//! per-frame local scanning with result smoothing, background database
//! synchronization, and one-shot cancellable server-side searches, with
//! every notification delivered in order on a single callback thread.

pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod notify;
pub mod options;
pub mod result;
pub mod scanner;
pub mod search;
pub mod session;
pub mod sync;
pub mod task;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::{SessionConfig, SessionConfigBuilder, DEFAULT_MAX_LOSTS};
pub use engine::{DatabaseInfo, EngineMatch, RecognitionEngine, SyncControl, SyncProgress};
pub use error::ScanError;
pub use image::{Frame, FrameOrientation, PixelFormat, MAX_FRAME_PIXELS, MIN_LARGEST_DIMENSION};
pub use notify::{Notifier, ScanEvent, ScanObserver, Subscription};
pub use options::{KindSet, ResultExtras, ResultKind, ScanOptions, SearchFlags};
pub use result::{decode_base64url, encode_base64url, MatchGeometry, ResultRecord};
pub use scanner::Scanner;
pub use search::SearchPipeline;
pub use session::{ScanSession, ScanState};
pub use sync::SyncPipeline;
pub use task::{CancelToken, TaskSlot};
