use std::{
    convert::TryFrom,
    path::Path,
    sync::{Arc, Mutex},
};

use parse_display::Display;
use thiserror::Error;

use crate::image::{RawImage, RawImageError, Rect};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("display mode changed")]
    ModeChanged,
    #[error("access to the capture surface was lost")]
    AccessLost,
    #[error("{0} capture is not supported by this source")]
    NotSupported(AcceleratedApi),
    #[error("capture surface unavailable: {0}")]
    Unavailable(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] RawImageError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] ::image::ImageError),
    #[error("desktop capture failed: {0}")]
    Desktop(String),
}

impl From<xcap::XCapError> for SourceError {
    fn from(error: xcap::XCapError) -> Self {
        Self::Desktop(error.to_string())
    }
}

impl SourceError {
    /// Failures expected around display mode switches, cleared by a reset
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ModeChanged | Self::AccessLost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AcceleratedApi {
    #[display("WinAPI")]
    WinApi,
    #[display("desktop duplication")]
    DesktopDuplication,
}

/// OS-level screen capture primitives
///
/// Regions are expressed in the virtual desktop coordinates returned by
/// [`crate::display::DisplayInfo::capture_region`]. Returned images must
/// cover exactly the requested region.
pub trait ScreenSource: Send {
    /// Generic screenshot primitive
    fn screenshot(&mut self, region: Rect) -> Result<RawImage, SourceError>;

    /// GPU or driver assisted capture
    fn duplicate(&mut self, region: Rect, api: AcceleratedApi) -> Result<RawImage, SourceError> {
        let _ = region;
        Err(SourceError::NotSupported(api))
    }

    /// Release and reacquire the native capture resources
    fn reset(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Release the native capture resources, the next capture reacquires them
    fn release(&mut self) {}
}

/// Capture surface shared between the capture pipeline and the still
/// screenshot path
pub type SharedSource = Arc<Mutex<dyn ScreenSource>>;

pub fn shared(source: impl ScreenSource + 'static) -> SharedSource {
    Arc::new(Mutex::new(source))
}

/// Source serving a fixed image as the whole virtual desktop
///
/// Used for headless runs, tests and calibration: every capture method reads
/// from the same still image.
pub struct StillImage {
    image: RawImage,
}

impl StillImage {
    pub fn new(image: RawImage) -> Self {
        Self { image }
    }

    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let image = ::image::open(path)?.to_rgb8();
        let (width, height) = image.dimensions();

        info!(
            path = %path.display(),
            width = width,
            height = height,
            "loaded still screen image"
        );

        Ok(Self::new(RawImage::try_from((
            image.into_raw(),
            width,
            height,
        ))?))
    }
}

impl ScreenSource for StillImage {
    fn screenshot(&mut self, region: Rect) -> Result<RawImage, SourceError> {
        Ok(self.image.crop(region)?)
    }

    fn duplicate(&mut self, region: Rect, _api: AcceleratedApi) -> Result<RawImage, SourceError> {
        self.screenshot(region)
    }
}
