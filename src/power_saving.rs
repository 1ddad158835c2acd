//! Idle detection and LED power management

use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::watch,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    dispatcher::OutputSink,
    models::{Config, PowerSavingPolicy},
    pipeline::SequenceFeed,
    session::SessionState,
};

mod diff;
pub use diff::*;

mod state;
pub use state::*;

mod tracker;
pub use tracker::*;

/// OS screensaver status
///
/// Implementations may query the OS synchronously: they are only called from
/// the power-saving evaluator, never from the capture loop.
pub trait ScreenSaverMonitor: Send + Sync {
    /// The platform supports polling the screensaver
    fn is_supported(&self) -> bool;
    /// A screensaver is configured
    fn is_enabled(&self) -> bool;
    fn is_running(&self) -> bool;
}

/// Platform without screensaver polling
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScreenSaver;

impl ScreenSaverMonitor for NoScreenSaver {
    fn is_supported(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ScreenSaverStatus {
    applicable: bool,
    running: bool,
}

impl ScreenSaverStatus {
    fn poll(monitor: &dyn ScreenSaverMonitor, policy: &PowerSavingPolicy) -> Self {
        let supported = monitor.is_supported();

        Self {
            applicable: supported && policy.is_enabled() && monitor.is_enabled(),
            running: supported && monitor.is_running(),
        }
    }

    fn triggered(&self) -> bool {
        self.applicable && self.running
    }
}

/// Periodic power-saving task
///
/// Owns the state machine. Screensaver status is refreshed at the end of each
/// cycle and used by the next one.
pub struct PowerSavingEvaluator {
    machine: PowerSavingStateMachine,
    tracker: StaticTracker,
    policy: PowerSavingPolicy,
    initial_delay: Duration,
    period: Duration,
    screen_saver: Arc<dyn ScreenSaverMonitor>,
    screen_saver_status: ScreenSaverStatus,
    feed: SequenceFeed,
    session: Arc<SessionState>,
    output: Arc<dyn OutputSink>,
    state_tx: watch::Sender<PowerSavingState>,
}

impl PowerSavingEvaluator {
    pub fn new(
        config: &Config,
        feed: SequenceFeed,
        session: Arc<SessionState>,
        screen_saver: Arc<dyn ScreenSaverMonitor>,
        output: Arc<dyn OutputSink>,
    ) -> (Self, watch::Receiver<PowerSavingState>) {
        let (state_tx, state_rx) = watch::channel(PowerSavingState::default());

        (
            Self {
                machine: Default::default(),
                tracker: StaticTracker::new(
                    config.power_saving.threshold(),
                    Instant::now().into_std(),
                ),
                policy: config.power_saving,
                initial_delay: config.power_saving_timer.initial_delay(),
                period: config.power_saving_timer.period(),
                screen_saver,
                screen_saver_status: Default::default(),
                feed,
                session,
                output,
                state_tx,
            },
            state_rx,
        )
    }

    pub fn state(&self) -> PowerSavingState {
        self.machine.state()
    }

    fn apply(&self, command: PowerCommand) {
        match command {
            PowerCommand::TurnOff => self.output.turn_off(),
            PowerCommand::ResumeOutput => self.output.resume(),
            PowerCommand::TurnOn => self.output.turn_on(),
        }

        self.state_tx.send_replace(self.machine.state());
    }

    /// Run one evaluation cycle
    pub async fn tick(&mut self) {
        // Static detection is meaningless without a threshold, and suspended
        // while the screensaver is the trigger
        if self.policy.is_enabled() && !self.screen_saver_status.triggered() {
            if let Some(leds) = self.feed.current().await {
                self.tracker.check(&leds, Instant::now().into_std());
            }
        }

        let inputs = PowerSavingInputs {
            screen_saver_detection_applicable: self.screen_saver_status.applicable,
            screen_saver_running: self.screen_saver_status.running,
            manual_shutdown_requested: self.session.manual_shutdown_requested(),
            static_duration_elapsed: self.tracker.is_static(),
            pipeline_running: self.session.is_running(),
        };

        if let Some(command) = self.machine.evaluate(&inputs) {
            self.apply(command);

            if self.machine.state() == PowerSavingState::TriggeredNotRunning
                && self.policy.is_enabled()
            {
                // Align the baseline with the still screenshot path
                if let Some(leds) = self.feed.screenshot().await {
                    self.tracker.reseed(&leds);
                }
            }
        }

        self.screen_saver_status = ScreenSaverStatus::poll(&*self.screen_saver, &self.policy);
    }

    #[instrument(skip_all)]
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = time::interval_at(Instant::now() + self.initial_delay, self.period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    trace!("power saving tick");
                    self.tick().await;
                }
            }
        }

        let command = self.machine.teardown();
        debug!(command = %command, "power saving teardown");
        self.apply(command);
    }
}
