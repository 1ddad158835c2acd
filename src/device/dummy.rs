use std::fmt::Write;

use async_trait::async_trait;

use super::{common::*, DeviceError};
use crate::models::{self, Color};

pub type DummyDevice = Rewriter<DummyDeviceImpl>;

impl DummyDevice {
    pub fn new(config: models::Dummy, led_count: usize) -> Result<Self, DeviceError> {
        Ok(Self::from_parts(
            DummyDeviceImpl {
                leds: vec![Default::default(); led_count],
                mode: config.mode,
                ansi_buf: String::new(),
            },
            config,
        ))
    }
}

/// Logs LED data instead of driving hardware
pub struct DummyDeviceImpl {
    leds: Vec<Color>,
    mode: models::DummyDeviceMode,
    ansi_buf: String,
}

#[async_trait]
impl WritingDevice for DummyDeviceImpl {
    type Config = models::Dummy;

    async fn set_led_data(
        &mut self,
        _config: &Self::Config,
        led_data: &[Color],
    ) -> Result<(), DeviceError> {
        self.leds.copy_from_slice(led_data);
        Ok(())
    }

    async fn write(&mut self) -> Result<(), DeviceError> {
        match self.mode {
            models::DummyDeviceMode::Text => {
                for (i, led) in self.leds.iter().enumerate() {
                    debug!(
                        led = %format_args!("{:3}", i + 1),
                        red = %format_args!("{:3}", led.red),
                        green = %format_args!("{:3}", led.green),
                        blue = %format_args!("{:3}", led.blue),
                    );
                }
            }

            models::DummyDeviceMode::Ansi => {
                self.ansi_buf.clear();

                for led in &self.leds {
                    write!(
                        &mut self.ansi_buf,
                        "\x1B[38;2;{red};{green};{blue}m█",
                        red = led.red,
                        green = led.green,
                        blue = led.blue
                    )?;
                }

                write!(&mut self.ansi_buf, "\x1B[0m")?;

                info!("{}", &self.ansi_buf);
            }
        }

        Ok(())
    }
}
