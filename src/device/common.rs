use std::time::Instant;

use async_trait::async_trait;

use super::{DeviceError, DeviceImpl};
use crate::models::{Color, DeviceConfig};

/// Device that writes its whole LED state at once
#[async_trait]
pub trait WritingDevice: Send {
    type Config: DeviceConfig;

    async fn set_led_data(
        &mut self,
        config: &Self::Config,
        led_data: &[Color],
    ) -> Result<(), DeviceError>;

    async fn write(&mut self) -> Result<(), DeviceError>;
}

/// Writes on every change, and again every `rewrite_time` if configured
pub struct Rewriter<D: WritingDevice> {
    inner: D,
    config: D::Config,
    last_write_time: Option<Instant>,
}

impl<D: WritingDevice> Rewriter<D> {
    pub fn from_parts(inner: D, config: D::Config) -> Self {
        Self {
            inner,
            config,
            last_write_time: None,
        }
    }

    async fn write(&mut self) -> Result<(), DeviceError> {
        self.inner.write().await?;
        self.last_write_time = Some(Instant::now());
        Ok(())
    }
}

#[async_trait]
impl<D: WritingDevice> DeviceImpl for Rewriter<D> {
    async fn set_led_data(&mut self, led_data: &[Color]) -> Result<(), DeviceError> {
        self.inner.set_led_data(&self.config, led_data).await?;
        self.write().await
    }

    async fn update(&mut self) -> Result<(), DeviceError> {
        match (self.config.rewrite_time(), self.last_write_time) {
            (Some(rewrite_time), Some(last_write_time)) => {
                let next = last_write_time + rewrite_time;
                if next > Instant::now() {
                    tokio::time::sleep_until(next.into()).await;
                }

                self.write().await
            }
            // Nothing to rewrite before the first frame
            _ => futures::future::pending().await,
        }
    }
}
