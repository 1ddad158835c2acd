use std::sync::{MutexGuard, PoisonError};

use thiserror::Error;

use crate::{
    image::{Frame, Rect},
    models::CaptureMethod,
};

mod source;
pub use source::*;

mod desktop;
pub use desktop::*;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture unavailable: {0}")]
    Unavailable(#[from] SourceError),
    #[error("capture surface lock poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for CaptureError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// Hardware-accelerated capture state
pub struct AcceleratedCapture {
    source: SharedSource,
    api: AcceleratedApi,
    needs_reset: bool,
}

impl AcceleratedCapture {
    fn new(source: SharedSource, api: AcceleratedApi) -> Self {
        Self {
            source,
            api,
            needs_reset: false,
        }
    }

    fn capture(&mut self, region: Rect) -> Result<Frame, CaptureError> {
        let mut source = self.source.lock()?;

        if self.needs_reset {
            debug!(api = %self.api, "resetting capture surface");
            source.reset()?;
            self.needs_reset = false;
        }

        match source.duplicate(region, self.api) {
            Ok(image) => Ok(Frame::new(image, region).map_err(SourceError::from)?),
            Err(error) => {
                if error.is_transient() {
                    // Mode switches invalidate the duplication surface
                    self.needs_reset = true;
                }

                Err(error.into())
            }
        }
    }
}

/// Screen capture strategy, selected once per session
pub enum CaptureBackend {
    BruteForce { source: SharedSource },
    WinApi(AcceleratedCapture),
    DesktopDuplication(AcceleratedCapture),
}

impl CaptureBackend {
    pub fn new(method: CaptureMethod, source: SharedSource) -> Self {
        match method {
            CaptureMethod::BruteForce => Self::BruteForce { source },
            CaptureMethod::WinApi => {
                Self::WinApi(AcceleratedCapture::new(source, AcceleratedApi::WinApi))
            }
            CaptureMethod::DesktopDuplication => Self::DesktopDuplication(
                AcceleratedCapture::new(source, AcceleratedApi::DesktopDuplication),
            ),
        }
    }

    fn lock(source: &SharedSource) -> Result<MutexGuard<'_, dyn ScreenSource + 'static>, CaptureError> {
        Ok(source.lock()?)
    }

    /// Capture the given region
    ///
    /// The returned frame is not retained by the backend.
    pub fn capture(&mut self, region: Rect) -> Result<Frame, CaptureError> {
        match self {
            Self::BruteForce { source } => {
                let image = Self::lock(source)?.screenshot(region)?;
                Ok(Frame::new(image, region).map_err(SourceError::from)?)
            }
            Self::WinApi(capture) | Self::DesktopDuplication(capture) => capture.capture(region),
        }
    }

    /// Release the capture surface at the end of a session
    pub fn release(&mut self) -> Result<(), CaptureError> {
        match self {
            Self::BruteForce { source } => Self::lock(source)?.release(),
            Self::WinApi(capture) | Self::DesktopDuplication(capture) => {
                capture.source.lock()?.release();
                capture.needs_reset = false;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{image::RawImage, models::Color};

    #[derive(Default)]
    pub(crate) struct ScriptedSourceData {
        pub failures: VecDeque<SourceError>,
        pub screenshots: usize,
        pub duplications: usize,
        pub resets: usize,
        pub releases: usize,
    }

    /// Test source over a still image, failing according to a script
    #[derive(Clone)]
    pub(crate) struct ScriptedSource {
        image: RawImage,
        pub data: Arc<Mutex<ScriptedSourceData>>,
    }

    impl ScriptedSource {
        pub fn new(image: RawImage) -> Self {
            Self {
                image,
                data: Default::default(),
            }
        }

        pub fn fail_with(self, failures: impl IntoIterator<Item = SourceError>) -> Self {
            self.data.lock().unwrap().failures.extend(failures);
            self
        }

        fn next(&mut self, region: Rect) -> Result<RawImage, SourceError> {
            if let Some(error) = self.data.lock().unwrap().failures.pop_front() {
                return Err(error);
            }

            Ok(self.image.crop(region)?)
        }
    }

    impl ScreenSource for ScriptedSource {
        fn screenshot(&mut self, region: Rect) -> Result<RawImage, SourceError> {
            self.data.lock().unwrap().screenshots += 1;
            self.next(region)
        }

        fn duplicate(&mut self, region: Rect, _api: AcceleratedApi) -> Result<RawImage, SourceError> {
            self.data.lock().unwrap().duplications += 1;
            self.next(region)
        }

        fn reset(&mut self) -> Result<(), SourceError> {
            self.data.lock().unwrap().resets += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.data.lock().unwrap().releases += 1;
        }
    }

    fn image() -> RawImage {
        RawImage::solid(8, 8, Color::new(10, 20, 30))
    }

    #[test]
    fn brute_force_uses_screenshots() {
        let source = ScriptedSource::new(image());
        let mut backend = CaptureBackend::new(CaptureMethod::BruteForce, shared(source.clone()));

        let frame = backend.capture(Rect::new(2, 2, 4, 4)).unwrap();
        assert_eq!(frame.region(), Rect::new(2, 2, 4, 4));
        assert_eq!(frame.image().width(), 4);

        let data = source.data.lock().unwrap();
        assert_eq!(data.screenshots, 1);
        assert_eq!(data.duplications, 0);
    }

    #[test]
    fn accelerated_capture_resets_after_mode_switch() {
        let source = ScriptedSource::new(image()).fail_with(vec![SourceError::ModeChanged]);
        let mut backend =
            CaptureBackend::new(CaptureMethod::DesktopDuplication, shared(source.clone()));

        assert!(matches!(
            backend.capture(Rect::new(0, 0, 8, 8)),
            Err(CaptureError::Unavailable(SourceError::ModeChanged))
        ));
        assert_eq!(source.data.lock().unwrap().resets, 0);

        assert!(backend.capture(Rect::new(0, 0, 8, 8)).is_ok());

        let data = source.data.lock().unwrap();
        assert_eq!(data.resets, 1);
        assert_eq!(data.duplications, 2);
    }

    #[test]
    fn permanent_failures_do_not_reset() {
        let source = ScriptedSource::new(image())
            .fail_with(vec![SourceError::Unavailable("no display".to_owned())]);
        let mut backend = CaptureBackend::new(CaptureMethod::WinApi, shared(source.clone()));

        assert!(backend.capture(Rect::new(0, 0, 8, 8)).is_err());
        assert!(backend.capture(Rect::new(0, 0, 8, 8)).is_ok());
        assert_eq!(source.data.lock().unwrap().resets, 0);
    }

    #[test]
    fn release_drops_pending_reset() {
        let source = ScriptedSource::new(image()).fail_with(vec![SourceError::AccessLost]);
        let mut backend = CaptureBackend::new(CaptureMethod::WinApi, shared(source.clone()));

        assert!(backend.capture(Rect::new(0, 0, 8, 8)).is_err());
        backend.release().unwrap();
        assert!(backend.capture(Rect::new(0, 0, 8, 8)).is_ok());

        let data = source.data.lock().unwrap();
        assert_eq!(data.releases, 1);
        assert_eq!(data.resets, 0);
    }

    #[test]
    fn region_outside_of_source_is_unavailable() {
        let mut backend = CaptureBackend::new(
            CaptureMethod::BruteForce,
            shared(StillImage::new(image())),
        );

        assert!(matches!(
            backend.capture(Rect::new(4, 4, 8, 8)),
            Err(CaptureError::Unavailable(SourceError::InvalidFrame(_)))
        ));
    }
}
