//! Configuration for a scan session

use serde::{Deserialize, Serialize};

use crate::options::{KindSet, ResultExtras, ResultKind, ScanOptions};

/// Default number of consecutive misses before a locked result is
/// reported lost. Smooths over isolated blurry frames.
pub const DEFAULT_MAX_LOSTS: u32 = 2;

/// Configuration for a [`crate::session::ScanSession`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionConfig {
    /// What frames may produce and the matching-quality flags.
    pub options: ScanOptions,

    /// Extra information to attach to produced results.
    pub extras: ResultExtras,

    /// Whether frames carry the device orientation so geometry accessors
    /// can re-express match corners in display space.
    pub use_device_orientation: bool,

    /// Consecutive misses tolerated before the current result is
    /// reported lost.
    pub max_losts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            options: ScanOptions::new(KindSet::empty().with(ResultKind::Image)),
            extras: ResultExtras::none(),
            use_device_orientation: false,
            max_losts: DEFAULT_MAX_LOSTS,
        }
    }
}

impl SessionConfig {
    /// Create a config scanning for the given kinds.
    pub fn new(kinds: KindSet) -> Self {
        Self {
            options: ScanOptions::new(kinds),
            ..Default::default()
        }
    }

    /// Create a config builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

/// Builder for SessionConfig
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result kinds frames may produce
    pub fn kinds(mut self, kinds: KindSet) -> Self {
        self.config.options.kinds = kinds;
        self
    }

    /// Add a result kind
    pub fn add_kind(mut self, kind: ResultKind) -> Self {
        self.config.options.kinds = self.config.options.kinds.with(kind);
        self
    }

    /// Enable or disable partial matching
    pub fn no_partial_matching(mut self, enabled: bool) -> Self {
        self.config.options.no_partial_matching = enabled;
        self
    }

    /// Enable or disable the small-target recognition boost
    pub fn small_target(mut self, enabled: bool) -> Self {
        self.config.options.small_target = enabled;
        self
    }

    /// Retain the originating frame on produced results
    pub fn keep_frame(mut self) -> Self {
        self.config.extras = self.config.extras.with_frame();
        self
    }

    /// Honor the device orientation carried by frames
    pub fn use_device_orientation(mut self, enabled: bool) -> Self {
        self.config.use_device_orientation = enabled;
        self
    }

    /// Set the consecutive-miss tolerance
    pub fn max_losts(mut self, losts: u32) -> Self {
        self.config.max_losts = losts;
        self
    }

    /// Build the config
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
