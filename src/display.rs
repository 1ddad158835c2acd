//! Monitor descriptors

use serde_derive::{Deserialize, Serialize};

use crate::{image::Rect, models::Config};

/// Geometry of one monitor, in physical pixels, with its OS scale factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl DisplayInfo {
    pub fn new(x: i32, y: i32, width: u32, height: u32, scale: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            scale_x: scale,
            scale_y: scale,
        }
    }

    /// Area of the virtual desktop to capture for this monitor, in the
    /// scaled coordinates used by the capture primitives
    pub fn capture_region(&self) -> Rect {
        Rect {
            x: (f64::from(self.x) / self.scale_x) as i32,
            y: (f64::from(self.y) / self.scale_y) as i32,
            width: (f64::from(self.width) / self.scale_x) as u32,
            height: (f64::from(self.height) / self.scale_y) as u32,
        }
    }
}

/// Resolves monitor geometry for a configured monitor index
pub trait DisplayInfoProvider: Send + Sync {
    fn display_info(&self, monitor: usize) -> Option<DisplayInfo>;
}

/// Monitors listed in the configuration
///
/// Without an explicit list, a single monitor at the origin is derived from
/// the configured screen resolution and OS scaling.
#[derive(Debug, Clone)]
pub struct ConfiguredDisplays {
    displays: Vec<DisplayInfo>,
}

impl From<&Config> for ConfiguredDisplays {
    fn from(config: &Config) -> Self {
        let displays = if config.displays.is_empty() {
            vec![DisplayInfo::new(
                0,
                0,
                config.screen_res_x,
                config.screen_res_y,
                config.os_scale(),
            )]
        } else {
            config.displays.clone()
        };

        Self { displays }
    }
}

impl DisplayInfoProvider for ConfiguredDisplays {
    fn display_info(&self, monitor: usize) -> Option<DisplayInfo> {
        self.displays.get(monitor).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_region_is_scaled() {
        let display = DisplayInfo::new(3840, 0, 3840, 2160, 1.5);
        assert_eq!(display.capture_region(), Rect::new(2560, 0, 2560, 1440));
    }

    #[test]
    fn default_display_from_configuration() {
        let displays = ConfiguredDisplays::from(&Config::default());

        assert_eq!(
            displays.display_info(0),
            Some(DisplayInfo::new(0, 0, 3840, 2160, 1.5))
        );
        assert_eq!(displays.display_info(1), None);
    }
}
