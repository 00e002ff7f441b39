//! Query frame representation
//!
//! Frames wrap the raw pixel buffers delivered by the camera. The buffer
//! is shared so a frame can be cheaply handed to a search worker or
//! attached to a result without copying pixels.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Smallest accepted value for the largest frame dimension, in pixels.
pub const MIN_LARGEST_DIMENSION: u32 = 480;

/// Maximum accepted frame size, in pixels (1280x720).
pub const MAX_FRAME_PIXELS: u64 = 1280 * 720;

/// Color format and encoding of each pixel in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 32bpp RGBA, endian-specific (BGRA on little-endian)
    Rgb32,
    /// 8bpp grayscale
    Gray8,
    /// Planar YUV 4:2:0, 12bpp, one plane for Y and one interleaved for VU
    Nv21,
}

/// Physical orientation of a frame, EXIF-style.
///
/// Each flag specifies where the origin (0,0) of the image is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FrameOrientation {
    /// Orientation unknown, frame is used unchanged
    Undefined = 0,
    /// 0th row at the top, 0th column on the left (the default)
    #[default]
    TopLeft = 1,
    /// 0th row at the bottom, 0th column on the right
    BottomRight = 3,
    /// 0th row on the right, 0th column at the top
    RightTop = 6,
    /// 0th row on the left, 0th column at the bottom
    LeftBottom = 8,
}

/// A camera frame ready to be scanned.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    bytes_per_row: u32,
    format: PixelFormat,
    orientation: FrameOrientation,
}

impl Frame {
    /// Create a frame from raw pixel data.
    ///
    /// The largest dimension must be at least [`MIN_LARGEST_DIMENSION`]
    /// pixels and the total size must not exceed 1280x720 pixels;
    /// violating either constraint fails with [`ScanError::Misuse`].
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        bytes_per_row: u32,
        format: PixelFormat,
        orientation: FrameOrientation,
    ) -> Result<Self, ScanError> {
        if width.max(height) < MIN_LARGEST_DIMENSION {
            return Err(ScanError::Misuse);
        }
        if u64::from(width) * u64::from(height) > MAX_FRAME_PIXELS {
            return Err(ScanError::Misuse);
        }
        if bytes_per_row < width {
            return Err(ScanError::Misuse);
        }
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
            bytes_per_row,
            format,
            orientation,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.bytes_per_row
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The same frame tagged with a different capture orientation.
    /// Pixel data is shared, not copied.
    pub fn with_orientation(mut self, orientation: FrameOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// The physical orientation the camera delivered this frame in.
    pub fn orientation(&self) -> FrameOrientation {
        self.orientation
    }
}
