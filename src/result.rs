//! Scan result values
//!
//! A [`ResultRecord`] is the immutable value produced by any recognition
//! path: local search, remote search, or barcode decoding. It carries the
//! result kind and raw payload, and for image matches the derived
//! geometry (homography, corner polygon, reference dimensions).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::ScanError;
use crate::image::{Frame, FrameOrientation};
use crate::options::ResultKind;

/// Geometry derived from an image match.
///
/// Coordinates use the query frame in its initial orientation, i.e. as
/// the frame is physically provided by the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchGeometry {
    /// 3x3 homography in row-major order, mapping normalized [-1, 1]
    /// reference-image coordinates to normalized query-frame coordinates.
    pub homography: Option<[f32; 9]>,
    /// The 4 corners delimiting the recognized content, clockwise from
    /// top-left, as ratios of the query frame dimensions. Not clamped:
    /// values may fall outside [-1, 1].
    pub corners: Option<[[f32; 2]; 4]>,
    /// Pixel dimensions of the matched reference image.
    pub dimensions: Option<(u32, u32)>,
}

/// Result of a scan.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    kind: ResultKind,
    payload: Vec<u8>,
    geometry: Option<MatchGeometry>,
    frame: Option<Frame>,
}

impl ResultRecord {
    /// Create a barcode result. Fails with `Misuse` for the image kind.
    pub fn barcode(kind: ResultKind, payload: Vec<u8>) -> Result<Self, ScanError> {
        if !kind.is_barcode() {
            return Err(ScanError::Misuse);
        }
        Ok(Self {
            kind,
            payload,
            geometry: None,
            frame: None,
        })
    }

    /// Create an image-match result, the only kind that carries geometry.
    pub fn image_match(payload: Vec<u8>, geometry: MatchGeometry) -> Self {
        Self {
            kind: ResultKind::Image,
            payload,
            geometry: Some(geometry),
            frame: None,
        }
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    /// The raw payload bytes: an image identifier for image matches,
    /// barcode digits or raw 2D-barcode data otherwise.
    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as a UTF-8 string.
    ///
    /// Always valid for image matches; QR Code and Datamatrix payloads
    /// may contain arbitrary bytes, in which case this returns `None`.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Decode the payload as base64url without padding.
    pub fn decoded_data(&self) -> Result<Vec<u8>, ScanError> {
        decode_base64url(&self.payload)
    }

    /// The homography for an image match; `None` for every barcode kind.
    pub fn homography(&self) -> Option<[f32; 9]> {
        self.geometry.as_ref().and_then(|g| g.homography)
    }

    /// The corner polygon in the physical frame domain; `None` for every
    /// barcode kind.
    pub fn corners(&self) -> Option<[[f32; 2]; 4]> {
        self.geometry.as_ref().and_then(|g| g.corners)
    }

    /// Same as [`corners`](Self::corners), re-oriented so the coordinates
    /// fit a display orientation distinct from the physical capture
    /// orientation.
    pub fn corners_for_orientation(&self, display: FrameOrientation) -> Option<[[f32; 2]; 4]> {
        let corners = self.corners()?;
        Some(corners.map(|[x, y]| reorient_point(x, y, display)))
    }

    /// Pixel dimensions of the matched reference image; `None` for every
    /// barcode kind.
    pub fn reference_dimensions(&self) -> Option<(u32, u32)> {
        self.geometry.as_ref().and_then(|g| g.dimensions)
    }

    /// The query frame that produced this result, retained only when the
    /// session extras request it.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// The physical capture orientation of the attached frame, if any.
    pub fn frame_orientation(&self) -> Option<FrameOrientation> {
        self.frame.as_ref().map(|f| f.orientation())
    }

    pub(crate) fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }
}

impl PartialEq for ResultRecord {
    /// Two results are the same when kind and payload agree; geometry and
    /// attached frames do not participate in identity.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }
}

/// Decode base64url-without-padding data.
pub fn decode_base64url(data: &[u8]) -> Result<Vec<u8>, ScanError> {
    URL_SAFE_NO_PAD.decode(data).map_err(|_| ScanError::Generic)
}

/// Encode bytes as base64url without padding.
pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Map a normalized point from the physical frame domain into a display
/// orientation. The frame coordinate system is centered, in [-1, 1].
fn reorient_point(x: f32, y: f32, display: FrameOrientation) -> [f32; 2] {
    match display {
        FrameOrientation::Undefined | FrameOrientation::TopLeft => [x, y],
        FrameOrientation::BottomRight => [-x, -y],
        FrameOrientation::RightTop => [-y, x],
        FrameOrientation::LeftBottom => [y, -x],
    }
}
