//! LED output devices

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{self, Color, Config, DeviceConfig};

mod common;

// Device implementation modules

mod adalight;
pub use adalight::AdalightEncoder;

mod dummy;
mod file;
mod serial;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not supported: {0}")]
    NotSupported(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("format error: {0}")]
    Format(#[from] std::fmt::Error),
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
trait DeviceImpl: Send {
    /// Set the device implementation's view of the LED data to the given values
    ///
    /// # Panics
    ///
    /// Implementations are allowed to panic if led_data.len() != led_count. The [Device]
    /// wrapper is responsible for ensuring the given slice is the right size.
    async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError>;

    /// Resolves when the device needs to write its current data again, and writes it
    async fn update(&mut self) -> Result<(), DeviceError>;
}

pub struct Device {
    name: &'static str,
    inner: Box<dyn DeviceImpl>,
    led_data: Vec<Color>,
    notified_inconsistent_led_data: bool,
}

impl Device {
    fn build_inner(config: &Config, led_count: usize) -> Result<Box<dyn DeviceImpl>, DeviceError> {
        let inner: Box<dyn DeviceImpl> = match &config.device {
            models::Device::Dummy(dummy) => {
                Box::new(dummy::DummyDevice::new(dummy.clone(), led_count)?)
            }
            models::Device::File(file) => {
                Box::new(file::FileDevice::new(file.clone(), led_count)?)
            }
            models::Device::Serial(serial) => Box::new(serial::SerialDevice::new(
                serial.clone(),
                config,
                led_count,
            )?),
        };

        Ok(inner)
    }

    #[instrument(skip(config))]
    pub fn new(config: &Config, led_count: usize) -> Result<Self, DeviceError> {
        let name: &'static str = (&config.device).into();
        let inner = Self::build_inner(config, led_count)?;

        debug!(
            rewrite_time = ?config.device.rewrite_time(),
            "initialized {} device",
            name
        );

        Ok(Self {
            name,
            inner,
            led_data: vec![Default::default(); led_count],
            notified_inconsistent_led_data: false,
        })
    }

    pub fn led_count(&self) -> usize {
        self.led_data.len()
    }

    #[instrument(skip(led_data))]
    pub async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError> {
        let led_count = led_data.len();
        let hw_led_count = self.led_data.len();

        if led_count == hw_led_count {
            self.led_data.copy_from_slice(led_data);
            self.notified_inconsistent_led_data = false;
        } else if led_count > hw_led_count {
            self.led_data.copy_from_slice(&led_data[..hw_led_count]);

            if !self.notified_inconsistent_led_data {
                self.notified_inconsistent_led_data = true;
                warn!(
                    "too much LED data for device: {} extra",
                    led_count - hw_led_count
                );
            }
        } else {
            // Pad with black
            self.led_data[..led_count].copy_from_slice(led_data);
            self.led_data[led_count..].fill(Default::default());

            if !self.notified_inconsistent_led_data {
                self.notified_inconsistent_led_data = true;
                warn!(
                    "not enough LED data for device: {} missing",
                    hw_led_count - led_count
                );
            }
        }

        self.inner.set_led_data(&self.led_data).await
    }

    /// Write black to every LED
    #[instrument]
    pub async fn turn_off(&mut self) -> Result<(), DeviceError> {
        self.led_data.fill(Default::default());
        self.inner.set_led_data(&self.led_data).await
    }

    #[instrument]
    pub async fn update(&mut self) -> Result<(), DeviceError> {
        self.inner.update().await
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("led_count", &self.led_data.len())
            .finish()
    }
}
