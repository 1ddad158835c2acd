use std::time::Duration;

use ambassador::{delegatable_trait, Delegate};
use serde_derive::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use validator::Validate;

#[delegatable_trait]
pub trait DeviceConfig: Sync + Send {
    fn rewrite_time(&self) -> Option<Duration> {
        None
    }
}

macro_rules! impl_device_config {
    ($t:ty) => {
        impl DeviceConfig for $t {
            fn rewrite_time(&self) -> Option<Duration> {
                if self.rewrite_time == 0 {
                    None
                } else {
                    Some(Duration::from_millis(self.rewrite_time as _))
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DummyDeviceMode {
    Text,
    Ansi,
}

impl Default for DummyDeviceMode {
    fn default() -> Self {
        Self::Text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Dummy {
    pub rewrite_time: u32,
    pub mode: DummyDeviceMode,
}

impl_device_config!(Dummy);

impl Default for Dummy {
    fn default() -> Self {
        Self {
            rewrite_time: 0,
            mode: Default::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[validate(length(min = 1))]
    pub output: String,
    #[serde(default)]
    pub print_time_stamp: bool,
    #[serde(default)]
    pub rewrite_time: u32,
}

impl_device_config!(File);

/// Adalight-framed output over the configured serial link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Serial {
    /// Period at which the last frame is written again, 0 to disable
    pub rewrite_time: u32,
}

impl_device_config!(Serial);

impl Default for Serial {
    fn default() -> Self {
        Self { rewrite_time: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr, Delegate)]
#[serde(rename_all = "lowercase", tag = "type")]
#[delegate(DeviceConfig)]
pub enum Device {
    Dummy(Dummy),
    File(File),
    Serial(Serial),
}

impl Default for Device {
    fn default() -> Self {
        Self::Dummy(Dummy::default())
    }
}

impl Validate for Device {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            Device::Dummy(device) => device.validate(),
            Device::File(device) => device.validate(),
            Device::Serial(device) => device.validate(),
        }
    }
}
