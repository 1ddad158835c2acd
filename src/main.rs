#[macro_use]
extern crate tracing;

use std::{path::PathBuf, sync::Arc};

use color_eyre::eyre::WrapErr;
use structopt::StructOpt;
use tokio::runtime::Builder;
use tokio::signal;

use lumen::{
    capture::{shared, DesktopDisplays, DesktopSource, SharedSource, StillImage},
    dispatcher::OutputDispatcher,
    display::{ConfiguredDisplays, DisplayInfoProvider},
    models::{CaptureMethod, Config, ToLedMatrix},
    power_saving::NoScreenSaver,
    session::{Collaborators, Session},
};

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config")]
    config_path: Option<PathBuf>,
    /// Image standing in for the virtual desktop, instead of capturing it
    #[structopt(short, long = "screen")]
    screen_path: Option<PathBuf>,
    #[structopt(long)]
    dump_config: bool,
}

async fn run(opts: Opts) -> color_eyre::eyre::Result<()> {
    // Load configuration
    let mut config = if let Some(config_path) = opts.config_path.as_deref() {
        Config::load_file(config_path)
            .await
            .wrap_err_with(|| format!("loading {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Dump configuration if this was asked
    if opts.dump_config {
        print!("{}", config.to_string()?);
        return Ok(());
    }

    config.validate_session()?;

    let (source, displays): (SharedSource, Arc<dyn DisplayInfoProvider>) =
        if let Some(screen_path) = opts.screen_path.as_deref() {
            let displays: Arc<dyn DisplayInfoProvider> =
                Arc::new(ConfiguredDisplays::from(&config));

            (shared(StillImage::open(screen_path)?), displays)
        } else {
            if config.capture_method.is_accelerated()
                && !DesktopSource::supports(config.capture_method)
            {
                warn!(
                    method = %config.capture_method,
                    "capture method not available on this platform, using CPU capture"
                );
                config.capture_method = CaptureMethod::BruteForce;
            }

            let displays: Arc<dyn DisplayInfoProvider> = if config.displays.is_empty() {
                Arc::new(DesktopDisplays::enumerate()?)
            } else {
                Arc::new(ConfiguredDisplays::from(&config))
            };

            (shared(DesktopSource::new(config.monitor_number)), displays)
        };

    // Start the output device
    let led_count = config
        .led_matrix
        .to_led_matrix(&config.screen_geometry())?
        .len();
    let (dispatcher, output) = OutputDispatcher::new(&config, led_count);
    let dispatcher = tokio::spawn(dispatcher.run());

    let session = Session::start(
        &config,
        Collaborators {
            displays,
            source,
            screen_saver: Arc::new(NoScreenSaver),
            output: Arc::new(output),
        },
    )?;

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("interrupted");
        }
        _ = session.stopped() => {}
    }

    let result = session.stop().await;

    // All handles are gone, wait for the final write
    dispatcher.await?;

    Ok(result?)
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::try_from_env("LUMEN_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "lumen=warn,lumend=warn",
            1 => "lumen=info,lumend=info",
            2 => "lumen=debug,lumend=debug",
            _ => "lumen=trace,lumend=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Capture and averaging run on blocking threads, keep the async side small
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;
    rt.block_on(run(opts))
}
