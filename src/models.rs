use std::{path::Path, time::Duration};

use parse_display::Display;
use serde_derive::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;
use validator::Validate;

use crate::display::DisplayInfo;

mod devices;
pub use devices::*;

mod layouts;
pub use layouts::*;

mod power_saving;
pub use power_saving::*;

pub type Color = palette::rgb::LinSrgb<u8>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
    #[error("monitor {0} is not available")]
    UnknownMonitor(usize),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
pub enum CaptureMethod {
    /// Generic screenshot primitive, highest CPU cost
    #[serde(rename = "CPU")]
    #[display("CPU")]
    BruteForce,
    /// GPU-assisted capture through the windowing API
    #[serde(rename = "WinAPI")]
    #[display("WinAPI")]
    WinApi,
    /// Desktop duplication
    #[serde(rename = "DDUPL")]
    #[display("DDUPL")]
    DesktopDuplication,
}

impl CaptureMethod {
    pub fn is_accelerated(self) -> bool {
        !matches!(self, Self::BruteForce)
    }

    /// Frame rate used when the configuration does not override it
    pub fn default_fps(self) -> u32 {
        match self {
            Self::BruteForce => 10,
            Self::WinApi => 25,
            Self::DesktopDuplication => 30,
        }
    }
}

impl Default for CaptureMethod {
    fn default() -> Self {
        Self::DesktopDuplication
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct PowerSavingTimer {
    /// Delay before the first evaluation, in seconds
    #[validate(range(min = 1))]
    pub initial_delay: u64,
    /// Evaluation period, in seconds
    #[validate(range(min = 1))]
    pub period: u64,
}

impl PowerSavingTimer {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }
}

impl Default for PowerSavingTimer {
    fn default() -> Self {
        Self {
            initial_delay: 60,
            period: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    #[validate(range(min = 1, max = 64))]
    pub number_of_cpu_threads: u32,
    pub capture_method: CaptureMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 240))]
    pub fps: Option<u32>,
    pub serial_port: String,
    #[validate(range(min = 1))]
    pub data_rate: u32,
    /// Link timeout in milliseconds
    #[validate(range(min = 1))]
    pub timeout: u32,
    #[validate(range(min = 1))]
    pub screen_res_x: u32,
    #[validate(range(min = 1))]
    pub screen_res_y: u32,
    /// OS scaling factor, in percent
    #[validate(range(min = 25, max = 500))]
    pub os_scaling: u32,
    pub led_offset_x: i32,
    pub led_offset_y: i32,
    pub gamma: f64,
    pub power_saving: PowerSavingPolicy,
    #[validate(nested)]
    pub power_saving_timer: PowerSavingTimer,
    pub monitor_number: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub displays: Vec<DisplayInfo>,
    #[validate(nested)]
    pub device: Device,
    #[validate(nested)]
    pub led_matrix: LedLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            number_of_cpu_threads: 3,
            capture_method: CaptureMethod::default(),
            fps: None,
            serial_port: AUTO_SERIAL_PORT.to_owned(),
            data_rate: 500_000,
            timeout: 2000,
            screen_res_x: 3840,
            screen_res_y: 2160,
            os_scaling: 150,
            led_offset_x: 30,
            led_offset_y: 30,
            gamma: 2.2,
            power_saving: PowerSavingPolicy::Disabled,
            power_saving_timer: Default::default(),
            monitor_number: 0,
            displays: Vec::new(),
            device: Default::default(),
            led_matrix: Default::default(),
        }
    }
}

/// Serial port value requesting automatic discovery
pub const AUTO_SERIAL_PORT: &str = "AUTO";

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        use tokio::io::AsyncReadExt;

        let mut file = tokio::fs::File::open(path).await?;
        let mut full = String::new();
        file.read_to_string(&mut full).await?;

        let config = Self::from_toml(&full)?;
        debug!(
            path = %path.display(),
            capture_method = %config.capture_method,
            power_saving = %config.power_saving,
            "loaded configuration"
        );

        Ok(config)
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check that this configuration can drive a capture session
    ///
    /// Inconsistent values are rejected, never replaced with defaults.
    pub fn validate_session(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if !(self.gamma.is_finite() && self.gamma > 0.) {
            return Err(ConfigError::Inconsistent(format!(
                "gamma must be a positive number, got {}",
                self.gamma
            )));
        }

        self.led_matrix.check()?;

        Ok(())
    }

    /// OS scale factor (1.5 for 150%)
    pub fn os_scale(&self) -> f64 {
        f64::from(self.os_scaling) / 100.
    }

    pub fn target_fps(&self) -> u32 {
        self.fps
            .unwrap_or_else(|| self.capture_method.default_fps())
            .max(1)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.target_fps()))
    }

    /// Averaging threads, bounded by the core count
    pub fn cpu_threads(&self) -> usize {
        (self.number_of_cpu_threads as usize).clamp(1, num_cpus::get().max(1))
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout))
    }

    pub fn screen_geometry(&self) -> ScreenGeometry {
        ScreenGeometry {
            width: self.screen_res_x,
            height: self.screen_res_y,
            offset_x: self.led_offset_x,
            offset_y: self.led_offset_y,
        }
    }
}
