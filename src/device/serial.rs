use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::Encoder;

use super::{common::*, AdalightEncoder, DeviceError};
use crate::models::{self, Color, Config, AUTO_SERIAL_PORT};

pub type SerialDevice = Rewriter<SerialDeviceImpl>;

impl SerialDevice {
    /// Open the configured serial port at the configured data rate
    pub fn new(config: models::Serial, link: &Config, led_count: usize) -> Result<Self, DeviceError> {
        if link.serial_port.eq_ignore_ascii_case(AUTO_SERIAL_PORT) {
            return Err(DeviceError::NotSupported("serial port discovery"));
        }

        let handle = tokio_serial::new(link.serial_port.as_str(), link.data_rate)
            .timeout(link.link_timeout())
            .open_native_async()?;

        info!(
            port = %link.serial_port,
            data_rate = link.data_rate,
            "opened serial link"
        );

        Ok(Self::from_parts(
            SerialDeviceImpl {
                leds: vec![Default::default(); led_count],
                handle,
                timeout: link.link_timeout(),
                encoder: AdalightEncoder,
                buf: BytesMut::new(),
            },
            config,
        ))
    }
}

pub struct SerialDeviceImpl {
    leds: Vec<Color>,
    handle: SerialStream,
    timeout: Duration,
    encoder: AdalightEncoder,
    buf: BytesMut,
}

#[async_trait]
impl WritingDevice for SerialDeviceImpl {
    type Config = models::Serial;

    async fn set_led_data(
        &mut self,
        _config: &Self::Config,
        led_data: &[Color],
    ) -> Result<(), DeviceError> {
        self.leds.copy_from_slice(led_data);
        Ok(())
    }

    async fn write(&mut self) -> Result<(), DeviceError> {
        self.buf.clear();
        self.encoder.encode(&self.leds[..], &mut self.buf)?;

        let handle = &mut self.handle;
        let buf = &self.buf;
        tokio::time::timeout(self.timeout, async move {
            handle.write_all(buf).await?;
            handle.flush().await
        })
        .await
        .map_err(|_| DeviceError::Timeout(self.timeout))??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_port_fails_to_open() {
        let link = Config {
            serial_port: "/nonexistent/lumen/ttyACM0".to_owned(),
            ..Default::default()
        };

        assert!(matches!(
            SerialDevice::new(models::Serial::default(), &link, 3),
            Err(DeviceError::Serial(_))
        ));
    }
}
