use std::convert::TryFrom;

use ::image::{
    imageops::{self, FilterType},
    DynamicImage, RgbaImage,
};
use xcap::Monitor;

use super::{AcceleratedApi, ScreenSource, SourceError};
use crate::{
    display::{DisplayInfo, DisplayInfoProvider},
    image::{RawImage, RawImageError, Rect},
    models::CaptureMethod,
};

fn monitor_info(monitor: &Monitor) -> Result<DisplayInfo, SourceError> {
    Ok(DisplayInfo::new(
        monitor.x()?,
        monitor.y()?,
        monitor.width()?,
        monitor.height()?,
        f64::from(monitor.scale_factor()?),
    ))
}

/// Monitors reported by the operating system, in enumeration order
#[derive(Debug, Clone)]
pub struct DesktopDisplays {
    displays: Vec<DisplayInfo>,
}

impl DesktopDisplays {
    pub fn enumerate() -> Result<Self, SourceError> {
        let displays = Monitor::all()?
            .iter()
            .map(monitor_info)
            .collect::<Result<Vec<_>, _>>()?;

        for (i, display) in displays.iter().enumerate() {
            debug!(
                monitor = i,
                region = %display.capture_region(),
                scale = display.scale_x,
                "found monitor"
            );
        }

        Ok(Self { displays })
    }
}

impl DisplayInfoProvider for DesktopDisplays {
    fn display_info(&self, monitor: usize) -> Option<DisplayInfo> {
        self.displays.get(monitor).copied()
    }
}

/// Map `region`, in the capture coordinates of `display`, onto a capture of
/// the whole monitor, and resample it to the region size
fn frame_from_capture(
    capture: RgbaImage,
    display: &DisplayInfo,
    region: Rect,
) -> Result<RawImage, SourceError> {
    let area = display.capture_region();
    if area.width == 0 || area.height == 0 {
        return Err(SourceError::ModeChanged);
    }

    let (width, height) = capture.dimensions();
    let sx = f64::from(width) / f64::from(area.width);
    let sy = f64::from(height) / f64::from(area.height);

    let pixels = Rect::new(
        (f64::from(region.x.saturating_sub(area.x)) * sx).round() as i32,
        (f64::from(region.y.saturating_sub(area.y)) * sy).round() as i32,
        (f64::from(region.width) * sx).round() as u32,
        (f64::from(region.height) * sy).round() as u32,
    );

    let bounds = Rect::new(0, 0, width, height);
    if pixels.x < 0 || pixels.y < 0 || bounds.intersect(&pixels) != pixels {
        return Err(RawImageError::OutOfBounds {
            region,
            width: width as usize,
            height: height as usize,
        }
        .into());
    }

    let rgb = DynamicImage::ImageRgba8(capture).into_rgb8();
    let mut cropped = imageops::crop_imm(
        &rgb,
        pixels.x as u32,
        pixels.y as u32,
        pixels.width,
        pixels.height,
    )
    .to_image();

    if cropped.dimensions() != (region.width, region.height) {
        cropped = imageops::resize(&cropped, region.width, region.height, FilterType::Triangle);
    }

    Ok(RawImage::try_from((
        cropped.into_raw(),
        region.width,
        region.height,
    ))?)
}

/// Screen source capturing one monitor through the operating system
pub struct DesktopSource {
    monitor: usize,
    display: Option<DisplayInfo>,
}

impl DesktopSource {
    pub fn new(monitor: usize) -> Self {
        Self {
            monitor,
            display: None,
        }
    }

    /// Whether captures for `method` can be served by this source
    pub fn supports(method: CaptureMethod) -> bool {
        match method {
            CaptureMethod::BruteForce => true,
            // Monitor captures go through GDI on Windows
            CaptureMethod::WinApi => cfg!(windows),
            CaptureMethod::DesktopDuplication => false,
        }
    }

    fn capture(&mut self, region: Rect) -> Result<RawImage, SourceError> {
        let monitor = Monitor::all()?
            .into_iter()
            .nth(self.monitor)
            .ok_or_else(|| {
                SourceError::Unavailable(format!("monitor {} is disconnected", self.monitor))
            })?;

        let display = monitor_info(&monitor)?;
        match self.display.replace(display) {
            Some(previous) if previous != display => {
                info!(
                    monitor = self.monitor,
                    region = %display.capture_region(),
                    "monitor mode changed"
                );

                return Err(SourceError::ModeChanged);
            }
            _ => {}
        }

        frame_from_capture(monitor.capture_image()?, &display, region)
    }
}

impl ScreenSource for DesktopSource {
    fn screenshot(&mut self, region: Rect) -> Result<RawImage, SourceError> {
        self.capture(region)
    }

    fn duplicate(&mut self, region: Rect, api: AcceleratedApi) -> Result<RawImage, SourceError> {
        match api {
            AcceleratedApi::WinApi if cfg!(windows) => self.capture(region),
            _ => Err(SourceError::NotSupported(api)),
        }
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.display = None;
        Ok(())
    }

    fn release(&mut self) {
        self.display = None;
    }
}
