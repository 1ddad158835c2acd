use std::{fmt::Write, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{fs::File, io::AsyncWriteExt};

use super::{common::*, DeviceError};
use crate::models::{self, Color};

pub type FileDevice = Rewriter<FileDeviceImpl>;

impl FileDevice {
    pub fn new(config: models::File, led_count: usize) -> Result<Self, DeviceError> {
        let file_handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.output)?;

        Ok(Self::from_parts(
            FileDeviceImpl {
                leds: vec![Default::default(); led_count],
                print_timestamp: config.print_time_stamp,
                file_handle: File::from_std(file_handle),
                last_write_time: Instant::now(),
                str_buf: String::new(),
            },
            config,
        ))
    }
}

/// Appends one line per frame to a file
pub struct FileDeviceImpl {
    leds: Vec<Color>,
    print_timestamp: bool,
    file_handle: File,
    last_write_time: Instant,
    str_buf: String,
}

#[async_trait]
impl WritingDevice for FileDeviceImpl {
    type Config = models::File;

    async fn set_led_data(
        &mut self,
        _config: &Self::Config,
        led_data: &[Color],
    ) -> Result<(), DeviceError> {
        self.leds.copy_from_slice(led_data);
        Ok(())
    }

    async fn write(&mut self) -> Result<(), DeviceError> {
        self.str_buf.clear();

        if self.print_timestamp {
            let elapsed_time_ms = self.last_write_time.elapsed().as_millis();
            self.last_write_time = Instant::now();

            write!(self.str_buf, "{} | +{} ", Utc::now(), elapsed_time_ms)?;
        }

        write!(self.str_buf, "[")?;
        for led in &self.leds {
            write!(self.str_buf, "{{{},{},{}}}", led.red, led.green, led.blue)?;
        }
        writeln!(self.str_buf, "]")?;

        self.file_handle.write_all(self.str_buf.as_bytes()).await?;
        self.file_handle.flush().await?;

        Ok(())
    }
}
