//! Scan option sets and result-kind flags
//!
//! Kinds and flags are tagged enums with explicit set types, but the
//! underlying bit values match the recognition engine ABI exactly so
//! that option sets can be handed to the engine unchanged.

use serde::{Deserialize, Serialize};

/// Kind of content a scan may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ResultKind {
    /// EAN8 linear barcode
    Ean8 = 1,
    /// EAN13 linear barcode
    Ean13 = 1 << 1,
    /// QR Code 2D barcode
    QrCode = 1 << 2,
    /// Datamatrix 2D barcode
    DataMatrix = 1 << 3,
    /// Image match against the signature database
    Image = 1 << 31,
}

impl ResultKind {
    /// All kinds, barcode kinds first.
    pub const ALL: [ResultKind; 5] = [
        ResultKind::Ean8,
        ResultKind::Ean13,
        ResultKind::QrCode,
        ResultKind::DataMatrix,
        ResultKind::Image,
    ];

    /// The ABI bit value of this kind.
    pub fn bit(self) -> u32 {
        self as u32
    }

    /// Whether this kind is a barcode (anything but an image match).
    pub fn is_barcode(self) -> bool {
        self != ResultKind::Image
    }

    /// Get string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Ean8 => "ean8",
            ResultKind::Ean13 => "ean13",
            ResultKind::QrCode => "qrcode",
            ResultKind::DataMatrix => "datamatrix",
            ResultKind::Image => "image",
        }
    }
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of result kinds, stored as the engine's bitwise-OR combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KindSet(u32);

impl KindSet {
    /// The empty set.
    pub fn empty() -> Self {
        KindSet(0)
    }

    /// A set containing every barcode kind.
    pub fn all_barcodes() -> Self {
        KindSet::empty()
            .with(ResultKind::Ean8)
            .with(ResultKind::Ean13)
            .with(ResultKind::QrCode)
            .with(ResultKind::DataMatrix)
    }

    /// Add a kind to the set.
    pub fn with(self, kind: ResultKind) -> Self {
        KindSet(self.0 | kind.bit())
    }

    /// Remove a kind from the set.
    pub fn without(self, kind: ResultKind) -> Self {
        KindSet(self.0 & !kind.bit())
    }

    /// Check membership.
    pub fn contains(self, kind: ResultKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Union of two sets.
    pub fn union(self, other: KindSet) -> Self {
        KindSet(self.0 | other.0)
    }

    /// The subset of barcode kinds.
    pub fn barcodes(self) -> Self {
        KindSet(self.0 & KindSet::all_barcodes().0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw ABI bits of the set.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild a set from ABI bits, dropping unknown bits.
    pub fn from_bits(bits: u32) -> Self {
        let mut set = KindSet::empty();
        for kind in ResultKind::ALL {
            if bits & kind.bit() != 0 {
                set = set.with(kind);
            }
        }
        set
    }

    /// Iterate over the kinds present in the set.
    pub fn iter(self) -> impl Iterator<Item = ResultKind> {
        ResultKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<ResultKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = ResultKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(KindSet::empty(), |set, kind| set.with(kind))
    }
}

/// Engine search flag: disable partial matching.
pub const SEARCH_NOPARTIAL: u32 = 1;
/// Engine search flag: boost small-target recognition.
pub const SEARCH_SMALLTARGET: u32 = 1 << 1;

/// Quality flags passed down to the engine search/match calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchFlags(u32);

impl SearchFlags {
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn no_partial(self) -> bool {
        self.0 & SEARCH_NOPARTIAL != 0
    }

    pub fn small_target(self) -> bool {
        self.0 & SEARCH_SMALLTARGET != 0
    }
}

/// What a frame may produce, plus two orthogonal matching-quality flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// The result kinds a frame is allowed to produce.
    pub kinds: KindSet,
    /// Disable "partial matching" to trade recall for fewer false
    /// positives among near-duplicate reference images.
    pub no_partial_matching: bool,
    /// Boost scale invariance for smaller or farther-held targets.
    /// Slightly slower than the default mode.
    pub small_target: bool,
}

impl ScanOptions {
    /// Options scanning for the given kinds with default quality flags.
    pub fn new(kinds: KindSet) -> Self {
        Self {
            kinds,
            ..Default::default()
        }
    }

    /// The engine flags encoding the quality options.
    pub fn search_flags(&self) -> SearchFlags {
        let mut bits = 0;
        if self.no_partial_matching {
            bits |= SEARCH_NOPARTIAL;
        }
        if self.small_target {
            bits |= SEARCH_SMALLTARGET;
        }
        SearchFlags(bits)
    }
}

/// Extra-information bit: retain the originating frame on results.
pub const EXTRA_FRAME: u32 = 1;

/// Extra information to attach to produced results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultExtras(u32);

impl ResultExtras {
    pub fn none() -> Self {
        ResultExtras(0)
    }

    /// Request that results retain the originating frame image.
    pub fn with_frame(self) -> Self {
        ResultExtras(self.0 | EXTRA_FRAME)
    }

    pub fn keeps_frame(self) -> bool {
        self.0 & EXTRA_FRAME != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}
