//! Capture session: the capture pipeline and the power-saving evaluator
//! sharing one configuration snapshot

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::SharedSource,
    dispatcher::{LinkHealth, OutputSink},
    display::DisplayInfoProvider,
    image::{ColorAverager, LedMatrixMapper},
    models::{Color, Config, ConfigError},
    pipeline::{CapturePipeline, PipelineError, ScreenshotSampler, SequenceFeed},
    power_saving::{PowerSavingEvaluator, PowerSavingState, ScreenSaverMonitor},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// State shared by the capture pipeline and the power-saving evaluator
#[derive(Debug, Default)]
pub struct SessionState {
    running: AtomicBool,
    paused: AtomicBool,
    manual_shutdown: AtomicBool,
    last_sequence: ArcSwapOption<Vec<Color>>,
}

impl SessionState {
    /// The pipeline is currently producing sequences
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn manual_shutdown_requested(&self) -> bool {
        self.manual_shutdown.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self, shutdown: bool) {
        self.manual_shutdown.store(shutdown, Ordering::SeqCst);
    }

    /// Last accepted LED color sequence
    pub fn last_sequence(&self) -> Option<Arc<Vec<Color>>> {
        self.last_sequence.load_full()
    }

    pub fn store_sequence(&self, leds: Arc<Vec<Color>>) {
        self.last_sequence.store(Some(leds));
    }
}

/// Components of the session provided by the host
pub struct Collaborators {
    pub displays: Arc<dyn DisplayInfoProvider>,
    pub source: SharedSource,
    pub screen_saver: Arc<dyn ScreenSaverMonitor>,
    pub output: Arc<dyn OutputSink>,
}

pub struct Session;

impl Session {
    /// Validate `config` and spawn the session tasks on the current runtime
    #[instrument(skip_all, fields(monitor = config.monitor_number))]
    pub fn start(config: &Config, collaborators: Collaborators) -> Result<SessionHandle, SessionError> {
        config.validate_session()?;

        let display = collaborators
            .displays
            .display_info(config.monitor_number)
            .ok_or(ConfigError::UnknownMonitor(config.monitor_number))?;

        let matrix = Arc::new(LedMatrixMapper::map(config, &display)?);
        let region = display.capture_region();
        let state = Arc::new(SessionState::default());
        let cancel = CancellationToken::new();

        let pipeline = CapturePipeline::new(
            config,
            region,
            matrix.clone(),
            collaborators.source.clone(),
            state.clone(),
            collaborators.output.clone(),
        )?;

        let sampler = ScreenshotSampler::new(
            collaborators.source,
            region,
            matrix,
            ColorAverager::new(config.os_scale(), config.gamma),
        );

        let (evaluator, power_state) = PowerSavingEvaluator::new(
            config,
            SequenceFeed::new(state.clone(), sampler),
            state.clone(),
            collaborators.screen_saver,
            collaborators.output.clone(),
        );

        // The evaluator stops once the pipeline is done, so its final output
        // comes last
        let evaluator_cancel = CancellationToken::new();
        let evaluator = tokio::spawn(evaluator.run(evaluator_cancel.clone()));

        let pipeline = tokio::spawn({
            let cancel = cancel.clone();
            let evaluator_cancel = evaluator_cancel.clone();

            async move {
                let result = pipeline.run(cancel).await;

                if let Err(error) = &result {
                    error!(error = %error, "capture pipeline failed");
                }

                evaluator_cancel.cancel();
                result
            }
        });

        info!(power_saving = %config.power_saving, "capture session started");

        Ok(SessionHandle {
            state,
            output: collaborators.output,
            power_state,
            cancel,
            evaluator_cancel,
            pipeline,
            evaluator,
        })
    }
}

pub struct SessionHandle {
    state: Arc<SessionState>,
    output: Arc<dyn OutputSink>,
    power_state: watch::Receiver<PowerSavingState>,
    cancel: CancellationToken,
    evaluator_cancel: CancellationToken,
    pipeline: JoinHandle<Result<(), PipelineError>>,
    evaluator: JoinHandle<()>,
}

impl SessionHandle {
    /// Pause capture; the power-saving evaluator switches to still screenshots
    pub fn pause(&self) {
        debug!("pausing capture");
        self.state.set_paused(true);
    }

    pub fn resume(&self) {
        debug!("resuming capture");
        self.state.set_paused(false);
    }

    /// Ask for the LEDs to be turned off, or release a previous request
    pub fn request_shutdown(&self, shutdown: bool) {
        self.state.request_shutdown(shutdown);
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn power_state(&self) -> PowerSavingState {
        *self.power_state.borrow()
    }

    pub fn health(&self) -> LinkHealth {
        self.output.health()
    }

    /// Resolves once capture has stopped, e.g. after a fatal capture error
    pub async fn stopped(&self) {
        self.evaluator_cancel.cancelled().await
    }

    /// Stop both tasks and wait for the final output to be applied
    #[instrument(skip_all)]
    pub async fn stop(self) -> Result<(), SessionError> {
        self.cancel.cancel();

        let pipeline = self.pipeline.await;
        // In case the pipeline task panicked
        self.evaluator_cancel.cancel();
        let evaluator = self.evaluator.await;

        evaluator?;
        pipeline??;

        info!("capture session stopped");
        Ok(())
    }
}
