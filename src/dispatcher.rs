//! Hand-off between the capture session and the LED device

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parse_display::Display;
use tokio::{select, sync::watch};

use crate::{
    device::{Device, DeviceError},
    models::{Color, Config},
};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum LinkHealth {
    #[display("connected")]
    Connected,
    #[display("disconnected: {last_error}")]
    Disconnected { last_error: String },
}

impl LinkHealth {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Output side of a capture session
///
/// Every call returns immediately: delivery happens on the dispatcher task,
/// and only the most recent state is ever delivered.
pub trait OutputSink: Send + Sync {
    /// Queue a complete LED color sequence, replacing any pending one
    fn send(&self, leds: Arc<Vec<Color>>);
    /// Force all LEDs off, ignoring sequences until turned on or resumed
    fn turn_off(&self);
    /// Turn LEDs back on with the most recent sequence
    fn turn_on(&self);
    /// Accept sequences again, without writing anything until the next one
    fn resume(&self);
    fn health(&self) -> LinkHealth;
}

#[derive(Debug, Clone)]
struct OutputState {
    powered: bool,
    leds: Option<Arc<Vec<Color>>>,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            powered: true,
            leds: None,
        }
    }
}

#[derive(Clone)]
pub struct DispatcherHandle {
    state_tx: Arc<watch::Sender<OutputState>>,
    health_rx: watch::Receiver<LinkHealth>,
}

impl OutputSink for DispatcherHandle {
    fn send(&self, leds: Arc<Vec<Color>>) {
        self.state_tx.send_if_modified(|state| {
            state.leds = Some(leds);
            state.powered
        });
    }

    fn turn_off(&self) {
        self.state_tx.send_modify(|state| state.powered = false);
    }

    fn turn_on(&self) {
        self.state_tx.send_modify(|state| state.powered = true);
    }

    fn resume(&self) {
        self.state_tx.send_if_modified(|state| {
            state.powered = true;
            false
        });
    }

    fn health(&self) -> LinkHealth {
        self.health_rx.borrow().clone()
    }
}

/// A wrapper for a device that may have failed, reopened on demand
struct DispatcherDevice {
    config: Config,
    led_count: usize,
    inner: Result<Device, DeviceError>,
    retry_interval: Duration,
    last_attempt: Instant,
}

impl DispatcherDevice {
    fn open(config: &Config, led_count: usize) -> Self {
        Self {
            config: config.clone(),
            led_count,
            inner: Device::new(config, led_count),
            retry_interval: config.link_timeout(),
            last_attempt: Instant::now(),
        }
    }

    async fn update(&mut self) -> Result<(), DeviceError> {
        if let Ok(device) = &mut self.inner {
            device.update().await
        } else {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    fn fail(&mut self, error: DeviceError) {
        self.inner = Err(error);
        self.last_attempt = Instant::now();
    }

    /// Get the device, trying to open it again if it failed at least one
    /// retry interval ago
    fn get(&mut self) -> Option<&mut Device> {
        let retry = match &self.inner {
            Ok(_) => false,
            Err(DeviceError::NotSupported(_)) => false,
            Err(_) => self.last_attempt.elapsed() >= self.retry_interval,
        };

        if retry {
            self.last_attempt = Instant::now();

            match Device::new(&self.config, self.led_count) {
                Ok(device) => {
                    info!("output device reopened");
                    self.inner = Ok(device);
                }
                Err(error) => {
                    debug!(error = %error, "reopening output device failed");
                    self.inner = Err(error);
                }
            }
        }

        self.inner.as_mut().ok()
    }
}

/// Task writing the latest output state to the device
pub struct OutputDispatcher {
    device: DispatcherDevice,
    state_rx: watch::Receiver<OutputState>,
    health_tx: watch::Sender<LinkHealth>,
    written_off: bool,
}

impl OutputDispatcher {
    pub fn new(config: &Config, led_count: usize) -> (Self, DispatcherHandle) {
        let device = DispatcherDevice::open(config, led_count);

        let health = match &device.inner {
            Ok(_) => LinkHealth::Connected,
            Err(error) => {
                error!(error = %error, "initializing device failed");

                LinkHealth::Disconnected {
                    last_error: error.to_string(),
                }
            }
        };

        let (state_tx, state_rx) = watch::channel(OutputState::default());
        let (health_tx, health_rx) = watch::channel(health);

        (
            Self {
                device,
                state_rx,
                health_tx,
                written_off: false,
            },
            DispatcherHandle {
                state_tx: Arc::new(state_tx),
                health_rx,
            },
        )
    }

    fn report(&mut self, result: Result<(), DeviceError>) {
        match result {
            Ok(()) => {
                self.health_tx.send_if_modified(|health| {
                    if health.is_connected() {
                        false
                    } else {
                        info!("link restored");
                        *health = LinkHealth::Connected;
                        true
                    }
                });
            }
            Err(error) => {
                warn!(error = %error, "writing LED data failed");

                self.health_tx.send_replace(LinkHealth::Disconnected {
                    last_error: error.to_string(),
                });
                // Black has to be written again to the reopened device
                self.written_off = false;
                self.device.fail(error);
            }
        }
    }

    async fn write(&mut self, state: OutputState) {
        let device = match self.device.get() {
            Some(device) => device,
            None => return,
        };

        let result = if state.powered {
            match &state.leds {
                Some(leds) => device.set_led_data(leds).await,
                None => return,
            }
        } else if !self.written_off {
            let result = device.turn_off().await;
            self.written_off = result.is_ok();
            result
        } else {
            return;
        };

        if state.powered {
            self.written_off = false;
        }

        self.report(result);
    }

    /// Run until every handle is dropped
    #[instrument(skip_all)]
    pub async fn run(mut self) {
        loop {
            select! {
                update = self.device.update() => {
                    trace!("device update");

                    if let Err(error) = update {
                        // A device update shouldn't error, reopen it on the next write
                        error!(error = %error, "device update failed, closing device");

                        self.health_tx.send_replace(LinkHealth::Disconnected {
                            last_error: error.to_string(),
                        });
                        self.device.fail(error);
                    }
                },
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }

                    let state = self.state_rx.borrow_and_update().clone();
                    self.write(state).await;
                }
            }
        }

        debug!("output dispatcher stopped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{path::PathBuf, sync::Mutex};

    use tokio::time;

    use super::*;
    use crate::models::{self, File};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum SinkEvent {
        Frame(Vec<Color>),
        Off,
        On,
        Resume,
    }

    /// Sink recording every call
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        events: Mutex<Vec<SinkEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<SinkEvent> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: SinkEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl OutputSink for RecordingSink {
        fn send(&self, leds: Arc<Vec<Color>>) {
            self.push(SinkEvent::Frame(leds.to_vec()));
        }

        fn turn_off(&self) {
            self.push(SinkEvent::Off);
        }

        fn turn_on(&self) {
            self.push(SinkEvent::On);
        }

        fn resume(&self) {
            self.push(SinkEvent::Resume);
        }

        fn health(&self) -> LinkHealth {
            LinkHealth::Connected
        }
    }

    fn output_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "lumen-{}-{}.txt",
            name,
            std::process::id()
        ));
        std::fs::remove_file(&path).ok();
        path
    }

    fn file_config(path: &PathBuf) -> Config {
        Config {
            device: models::Device::File(File {
                output: path.to_string_lossy().into_owned(),
                print_time_stamp: false,
                rewrite_time: 0,
            }),
            ..Default::default()
        }
    }

    fn frame() -> Arc<Vec<Color>> {
        Arc::new(vec![Color::new(255, 0, 0), Color::new(0, 0, 255)])
    }

    #[tokio::test]
    async fn writes_the_latest_frame() {
        let path = output_file("latest");
        let (dispatcher, handle) = OutputDispatcher::new(&file_config(&path), 2);

        handle.send(Arc::new(vec![Color::new(1, 1, 1); 2]));
        handle.send(frame());
        drop(handle);
        dispatcher.run().await;

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[{255,0,0}{0,0,255}]\n"
        );
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn turn_off_writes_black_and_drops_frames() {
        let path = output_file("off");
        let (dispatcher, handle) = OutputDispatcher::new(&file_config(&path), 2);

        handle.send(frame());
        handle.turn_off();
        handle.send(frame());
        drop(handle);
        dispatcher.run().await;

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[{0,0,0}{0,0,0}]\n"
        );
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn turn_on_restores_the_latest_frame() {
        let (_dispatcher, handle) = OutputDispatcher::new(&Config::default(), 2);
        let mut rx = handle.state_tx.subscribe();

        handle.turn_off();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        // Frames are kept, but not delivered while off
        handle.send(frame());
        assert!(!rx.has_changed().unwrap());

        handle.turn_on();
        let state = rx.borrow_and_update().clone();
        assert!(state.powered);
        assert_eq!(state.leds, Some(frame()));
    }

    #[tokio::test]
    async fn resume_waits_for_the_next_frame() {
        let (_dispatcher, handle) = OutputDispatcher::new(&Config::default(), 2);
        let mut rx = handle.state_tx.subscribe();

        handle.turn_off();
        rx.borrow_and_update();

        handle.resume();
        assert!(!rx.has_changed().unwrap());

        handle.send(frame());
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().powered);
    }

    #[tokio::test]
    async fn reopens_the_device_once_the_output_appears() {
        let dir = std::env::temp_dir().join(format!("lumen-reopen-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("output.txt");

        let mut config = file_config(&path);
        config.timeout = 1;

        let (dispatcher, handle) = OutputDispatcher::new(&config, 2);
        assert!(!handle.health().is_connected());
        let task = tokio::spawn(dispatcher.run());

        std::fs::create_dir_all(&dir).unwrap();
        time::sleep(Duration::from_millis(5)).await;
        handle.send(frame());

        time::timeout(Duration::from_secs(5), async {
            while !handle.health().is_connected() {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        drop(handle);
        task.await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[{255,0,0}{0,0,255}]\n"
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn failed_device_reports_disconnected() {
        let config = Config {
            device: models::Device::File(File {
                output: "/nonexistent/lumen/output.txt".to_owned(),
                print_time_stamp: false,
                rewrite_time: 0,
            }),
            ..Default::default()
        };

        let (_dispatcher, handle) = OutputDispatcher::new(&config, 2);
        assert!(!handle.health().is_connected());
    }
}
