use super::Rect;
use crate::{
    display::DisplayInfo,
    models::{Config, ConfigError, LedMatrix, ToLedMatrix},
};

/// Builds the per-session LED matrix
///
/// Regions are always derived from the configured screen resolution and
/// offsets. A monitor whose geometry disagrees with the configuration is
/// reported, but the regions are not corrected.
pub struct LedMatrixMapper;

impl LedMatrixMapper {
    pub fn map(config: &Config, display: &DisplayInfo) -> Result<LedMatrix, ConfigError> {
        let matrix = config
            .led_matrix
            .to_led_matrix(&config.screen_geometry())?;

        let (actual_width, actual_height) = (display.width, display.height);
        if actual_width != config.screen_res_x || actual_height != config.screen_res_y {
            warn!(
                monitor = config.monitor_number,
                configured = %format_args!("{}x{}", config.screen_res_x, config.screen_res_y),
                actual = %format_args!("{}x{}", actual_width, actual_height),
                "monitor geometry does not match the configured screen resolution"
            );
        }

        let frame = display.capture_region();
        let bounds = Rect::new(0, 0, frame.width, frame.height);
        let outside = matrix
            .as_slice()
            .iter()
            .filter(|led| {
                led.scaled(config.os_scale())
                    .intersect(&bounds)
                    .is_empty()
            })
            .count();

        if outside > 0 {
            warn!(
                leds = outside,
                "some LED regions are empty once scaled to the captured frame"
            );
        }

        debug!(leds = matrix.len(), "mapped LED matrix");

        Ok(matrix)
    }
}
