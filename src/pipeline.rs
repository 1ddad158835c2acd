//! Capture loop turning screen content into LED color sequences

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{select, task::JoinError, time};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::{CaptureBackend, CaptureError, SharedSource},
    dispatcher::OutputSink,
    image::{ColorAverager, Rect},
    models::{CaptureMethod, Color, Config, LedMatrix},
    session::SessionState,
};

/// Consecutive capture failures after which the pipeline gives up
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

const BASE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture failed {attempts} times in a row: {source}")]
    CaptureFailed {
        attempts: u32,
        #[source]
        source: CaptureError,
    },
    #[error("capture task failed: {0}")]
    Join(#[from] JoinError),
    #[error("cannot create the averaging thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A complete sequence was handed to the output
    Sent,
    /// Capture failed, next attempt after `backoff`
    Retrying { attempt: u32, backoff: Duration },
}

/// Capture and averaging state, moved to a blocking thread for every cycle
struct FrameWorker {
    backend: CaptureBackend,
    region: Rect,
    matrix: Arc<LedMatrix>,
    averager: ColorAverager,
    pool: rayon::ThreadPool,
    previous: Arc<Vec<Color>>,
    notified_degenerate: bool,
}

impl FrameWorker {
    fn capture_sequence(&mut self) -> Result<Arc<Vec<Color>>, CaptureError> {
        let frame = self.backend.capture(self.region)?;

        let averager = &self.averager;
        let matrix = &*self.matrix;
        let previous = &self.previous[..];
        let reduced = self
            .pool
            .install(|| averager.par_reduce(&frame, matrix, previous));

        if reduced.degenerate > 0 {
            if !self.notified_degenerate {
                self.notified_degenerate = true;
                warn!(
                    leds = reduced.degenerate,
                    "degenerate LED regions, keeping their last color"
                );
            }
        } else {
            self.notified_degenerate = false;
        }

        self.previous = Arc::new(reduced.colors);
        Ok(self.previous.clone())
    }
}

pub struct CapturePipeline {
    worker: FrameWorker,
    session: Arc<SessionState>,
    output: Arc<dyn OutputSink>,
    frame_period: Duration,
    failures: u32,
}

impl CapturePipeline {
    pub fn new(
        config: &Config,
        region: Rect,
        matrix: Arc<LedMatrix>,
        source: SharedSource,
        session: Arc<SessionState>,
        output: Arc<dyn OutputSink>,
    ) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.cpu_threads())
            .thread_name(|i| format!("lumen-avg-{}", i))
            .build()?;

        info!(
            method = %config.capture_method,
            fps = config.target_fps(),
            threads = pool.current_num_threads(),
            region = %region,
            leds = matrix.len(),
            "capture pipeline ready"
        );

        Ok(Self {
            worker: FrameWorker {
                backend: CaptureBackend::new(config.capture_method, source),
                region,
                previous: Arc::new(vec![Color::default(); matrix.len()]),
                matrix,
                averager: ColorAverager::new(config.os_scale(), config.gamma),
                pool,
                notified_degenerate: false,
            },
            session,
            output,
            frame_period: config.frame_period(),
            failures: 0,
        })
    }

    fn backoff(attempt: u32) -> Duration {
        BASE_BACKOFF * 2u32.pow(attempt.saturating_sub(1))
    }

    /// Run one capture cycle, blocking the current thread
    pub fn cycle(&mut self) -> Result<CycleOutcome, PipelineError> {
        match self.worker.capture_sequence() {
            Ok(leds) => {
                if self.failures > 0 {
                    info!(attempts = self.failures + 1, "capture recovered");
                    self.failures = 0;
                }

                self.session.set_running(true);
                self.session.store_sequence(leds.clone());
                self.output.send(leds);

                Ok(CycleOutcome::Sent)
            }
            Err(error) => {
                self.failures += 1;
                self.session.set_running(false);

                if self.failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(PipelineError::CaptureFailed {
                        attempts: self.failures,
                        source: error,
                    });
                }

                let backoff = Self::backoff(self.failures);
                warn!(
                    error = %error,
                    attempt = self.failures,
                    backoff = ?backoff,
                    "capture unavailable"
                );

                Ok(CycleOutcome::Retrying {
                    attempt: self.failures,
                    backoff,
                })
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let mut interval = time::interval(self.frame_period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        let mut pipeline = self;

        let result = loop {
            select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = interval.tick() => {}
            }

            if pipeline.session.is_paused() {
                pipeline.session.set_running(false);
                continue;
            }

            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = pipeline.cycle();
                (pipeline, outcome)
            })
            .await?;
            pipeline = returned;

            match outcome {
                Ok(CycleOutcome::Sent) => {}
                Ok(CycleOutcome::Retrying { backoff, .. }) => {
                    select! {
                        _ = cancel.cancelled() => break Ok(()),
                        _ = time::sleep(backoff) => {}
                    }
                }
                Err(error) => break Err(error),
            }
        };

        pipeline.session.set_running(false);

        if let Err(error) = pipeline.worker.backend.release() {
            warn!(error = %error, "releasing the capture surface failed");
        }

        debug!("capture pipeline stopped");

        result
    }
}

/// Low-rate LED colors from still screenshots, used while capture is paused
#[derive(Clone)]
pub struct ScreenshotSampler {
    source: SharedSource,
    region: Rect,
    matrix: Arc<LedMatrix>,
    averager: ColorAverager,
}

impl ScreenshotSampler {
    pub fn new(
        source: SharedSource,
        region: Rect,
        matrix: Arc<LedMatrix>,
        averager: ColorAverager,
    ) -> Self {
        Self {
            source,
            region,
            matrix,
            averager,
        }
    }

    /// Take a screenshot and compute LED colors, one LED after the other
    pub fn sample(&self) -> Result<Vec<Color>, CaptureError> {
        let frame = CaptureBackend::new(CaptureMethod::BruteForce, self.source.clone())
            .capture(self.region)?;

        Ok(self.averager.reduce(&frame, &self.matrix, &[]).colors)
    }
}

/// Current LED colors, from the live pipeline when it runs or from a still
/// screenshot otherwise
pub struct SequenceFeed {
    session: Arc<SessionState>,
    sampler: ScreenshotSampler,
}

impl SequenceFeed {
    pub fn new(session: Arc<SessionState>, sampler: ScreenshotSampler) -> Self {
        Self { session, sampler }
    }

    pub async fn current(&self) -> Option<Arc<Vec<Color>>> {
        if self.session.is_running() {
            self.session.last_sequence()
        } else {
            self.screenshot().await
        }
    }

    /// Force a still screenshot
    pub async fn screenshot(&self) -> Option<Arc<Vec<Color>>> {
        let sampler = self.sampler.clone();

        match tokio::task::spawn_blocking(move || sampler.sample()).await {
            Ok(Ok(leds)) => Some(Arc::new(leds)),
            Ok(Err(error)) => {
                warn!(error = %error, "screenshot failed");
                None
            }
            Err(error) => {
                error!(error = %error, "screenshot task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::{shared, tests::ScriptedSource, SourceError},
        dispatcher::tests::{RecordingSink, SinkEvent},
        image::RawImage,
        models::{LedCoordinate, LedLayout, ToLedMatrix},
    };

    lazy_static::lazy_static! {
        static ref RED: Color = Color::new(255, 0, 0);
        static ref GREEN: Color = Color::new(0, 255, 0);
        static ref BLUE: Color = Color::new(0, 0, 255);
    }

    fn rgb() -> Vec<Color> {
        vec![*RED, *GREEN, *BLUE]
    }

    fn rgb_screen() -> RawImage {
        let mut image = RawImage::solid(30, 10, Color::new(0, 0, 0));
        image.fill(Rect::new(0, 0, 10, 10), *RED).unwrap();
        image.fill(Rect::new(10, 0, 10, 10), *GREEN).unwrap();
        image.fill(Rect::new(20, 0, 10, 10), *BLUE).unwrap();
        image
    }

    fn rgb_config(method: CaptureMethod) -> Config {
        Config {
            capture_method: method,
            os_scaling: 100,
            gamma: 2.2,
            number_of_cpu_threads: 2,
            led_matrix: LedLayout::Explicit {
                leds: vec![
                    LedCoordinate::new(0, 0, 10, 10).into(),
                    LedCoordinate::new(10, 0, 10, 10).into(),
                    LedCoordinate::new(20, 0, 10, 10).into(),
                ],
            },
            ..Default::default()
        }
    }

    fn build(
        config: &Config,
        source: ScriptedSource,
    ) -> (CapturePipeline, Arc<SessionState>, Arc<RecordingSink>) {
        let matrix = Arc::new(
            config
                .led_matrix
                .to_led_matrix(&config.screen_geometry())
                .unwrap(),
        );
        let session = Arc::new(SessionState::default());
        let sink = Arc::new(RecordingSink::default());

        let pipeline = CapturePipeline::new(
            config,
            Rect::new(0, 0, 30, 10),
            matrix,
            shared(source),
            session.clone(),
            sink.clone(),
        )
        .unwrap();

        (pipeline, session, sink)
    }

    #[test]
    fn cycle_keeps_strip_order() {
        for &method in &[
            CaptureMethod::BruteForce,
            CaptureMethod::WinApi,
            CaptureMethod::DesktopDuplication,
        ] {
            let config = rgb_config(method);
            let (mut pipeline, session, sink) = build(&config, ScriptedSource::new(rgb_screen()));

            assert_eq!(pipeline.cycle().unwrap(), CycleOutcome::Sent);
            assert_eq!(sink.events(), vec![SinkEvent::Frame(rgb())]);
            assert!(session.is_running());
            assert_eq!(
                session.last_sequence().as_deref(),
                Some(&rgb())
            );
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let config = rgb_config(CaptureMethod::DesktopDuplication);
        let source = ScriptedSource::new(rgb_screen())
            .fail_with(vec![SourceError::ModeChanged, SourceError::AccessLost]);
        let (mut pipeline, session, sink) = build(&config, source);

        assert_eq!(
            pipeline.cycle().unwrap(),
            CycleOutcome::Retrying {
                attempt: 1,
                backoff: Duration::from_millis(200)
            }
        );
        assert!(!session.is_running());

        assert_eq!(
            pipeline.cycle().unwrap(),
            CycleOutcome::Retrying {
                attempt: 2,
                backoff: Duration::from_millis(400)
            }
        );
        assert!(sink.events().is_empty());

        assert_eq!(pipeline.cycle().unwrap(), CycleOutcome::Sent);
        assert!(session.is_running());
        assert_eq!(sink.events(), vec![SinkEvent::Frame(rgb())]);
    }

    #[test]
    fn three_failures_are_fatal() {
        let config = rgb_config(CaptureMethod::BruteForce);
        let source = ScriptedSource::new(rgb_screen()).fail_with(
            (0..3).map(|_| SourceError::Unavailable("display disconnected".to_owned())),
        );
        let (mut pipeline, _, _) = build(&config, source);

        assert!(pipeline.cycle().is_ok());
        assert!(pipeline.cycle().is_ok());
        assert!(matches!(
            pipeline.cycle(),
            Err(PipelineError::CaptureFailed { attempts: 3, .. })
        ));
    }

    #[test]
    fn failure_count_resets_on_success() {
        let config = rgb_config(CaptureMethod::BruteForce);
        let source = ScriptedSource::new(rgb_screen());
        let data = source.data.clone();
        let (mut pipeline, _, _) = build(&config, source);

        for _ in 0..3 {
            data.lock().unwrap().failures.extend(vec![
                SourceError::Unavailable("busy".to_owned()),
                SourceError::Unavailable("busy".to_owned()),
            ]);

            assert!(pipeline.cycle().is_ok());
            assert!(pipeline.cycle().is_ok());
            assert_eq!(pipeline.cycle().unwrap(), CycleOutcome::Sent);
        }
    }

    #[test]
    fn degenerate_leds_keep_previous_color() {
        let mut config = rgb_config(CaptureMethod::BruteForce);
        config.led_matrix = LedLayout::Explicit {
            leds: vec![
                LedCoordinate::new(0, 0, 10, 10).into(),
                LedCoordinate::new(500, 500, 10, 10).into(),
            ],
        };
        let (mut pipeline, _, sink) = build(&config, ScriptedSource::new(rgb_screen()));

        pipeline.cycle().unwrap();
        assert_eq!(
            sink.events(),
            vec![SinkEvent::Frame(vec![*RED, Color::new(0, 0, 0)])]
        );
    }

    #[test]
    fn sampler_reads_screenshots() {
        let config = rgb_config(CaptureMethod::DesktopDuplication);
        let source = ScriptedSource::new(rgb_screen());
        let data = source.data.clone();
        let matrix = Arc::new(
            config
                .led_matrix
                .to_led_matrix(&config.screen_geometry())
                .unwrap(),
        );

        let sampler = ScreenshotSampler::new(
            shared(source),
            Rect::new(0, 0, 30, 10),
            matrix,
            ColorAverager::new(1., 2.2),
        );

        assert_eq!(sampler.sample().unwrap(), rgb());
        assert_eq!(data.lock().unwrap().screenshots, 1);
        assert_eq!(data.lock().unwrap().duplications, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let config = rgb_config(CaptureMethod::BruteForce);
        let source = ScriptedSource::new(rgb_screen());
        let data = source.data.clone();
        let (pipeline, session, sink) = build(&config, source);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(pipeline.run(cancel.clone()));

        while sink.events().is_empty() {
            time::sleep(Duration::from_millis(5)).await;
        }

        cancel.cancel();
        task.await.unwrap().unwrap();

        assert!(!session.is_running());
        assert_eq!(data.lock().unwrap().releases, 1);
    }

    #[tokio::test]
    async fn run_surfaces_persistent_failures() {
        let config = rgb_config(CaptureMethod::BruteForce);
        let source = ScriptedSource::new(rgb_screen()).fail_with(
            (0..3).map(|_| SourceError::Unavailable("display disconnected".to_owned())),
        );
        let data = source.data.clone();
        let (pipeline, _, sink) = build(&config, source);

        let result = pipeline.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(PipelineError::CaptureFailed { attempts: 3, .. })
        ));
        assert!(sink.events().is_empty());
        assert_eq!(data.lock().unwrap().releases, 1);
    }
}
