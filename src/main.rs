use std::thread;

use anyhow::{Context, Result, anyhow, ensure};
use antinoise::alsa_io::{AlsaCapture, AlsaPlayRecord, AlsaPlayback};
use antinoise::cli::StreamArgs;
use antinoise::shutdown;
use clap::Parser;
use fxlms::{AdaptationParameters, CancelToken, Engine, run_playback};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "antinoise",
    about = "Feedforward FxLMS active noise canceller"
)]
struct Args {
    #[command(flatten)]
    stream: StreamArgs,

    /// Capture channel carrying the error microphone (0-based).
    #[arg(long, default_value_t = 1)]
    error_channel: usize,

    /// Seconds of white noise played to identify the secondary path.
    #[arg(long, default_value_t = 2.0)]
    calibration_secs: f32,

    #[arg(long, default_value_t = 0.05)]
    excitation_amplitude: f32,

    #[arg(long, default_value_t = 0x5eed)]
    excitation_seed: u64,

    /// Taps in the secondary path model.
    #[arg(long, default_value_t = 256)]
    secondary_path_order: usize,

    /// Taps in the control filter.
    #[arg(long, default_value_t = 256)]
    control_order: usize,

    /// FxLMS step size.
    #[arg(long, default_value_t = 0.0005)]
    mu: f32,

    /// NLMS step size during identification.
    #[arg(long, default_value_t = 0.5)]
    mu_id: f32,

    #[arg(long, default_value_t = 1e-5)]
    leakage: f32,

    #[arg(long, default_value_t = 1e-6)]
    epsilon: f32,

    /// Hard limit on the speaker signal.
    #[arg(long, default_value_t = 0.3)]
    output_limit: f32,

    #[arg(long, default_value_t = 1.0)]
    input_gain: f32,

    #[arg(long, default_value_t = 1.0)]
    output_gain: f32,

    /// Refuse calibrations whose captured energy is below this floor (0 accepts any).
    #[arg(long, default_value_t = 0.0)]
    min_response_energy: f32,

    /// Run capture and playback on separate threads joined by a single-slot handoff.
    #[arg(long)]
    split_streams: bool,

    /// Blocks between level reports (0 disables them).
    #[arg(long, default_value_t = 50)]
    report_interval: u64,
}

impl Args {
    fn adaptation_parameters(&self) -> AdaptationParameters {
        AdaptationParameters {
            sample_rate: self.stream.sample_rate,
            block_size: self.stream.block_size,
            calibration_secs: self.calibration_secs,
            excitation_amplitude: self.excitation_amplitude,
            excitation_seed: self.excitation_seed,
            secondary_path_order: self.secondary_path_order,
            control_order: self.control_order,
            step_size: self.mu,
            identification_step_size: self.mu_id,
            leakage: self.leakage,
            epsilon: self.epsilon,
            output_limit: self.output_limit,
            input_gain: self.input_gain,
            output_gain: self.output_gain,
            min_response_energy: self.min_response_energy,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> Result<()> {
    if let Some(secs) = args.stream.run_secs {
        ensure!(secs.is_finite() && secs >= 0.0, "run time must be a non-negative number");
    }

    let params = args.adaptation_parameters();
    let mut engine = Engine::new(params.clone())
        .context("invalid canceller configuration")?
        .with_report_interval(args.report_interval);

    let settings = args.stream.pcm_settings();
    let mut capture = AlsaCapture::open(
        &settings,
        args.stream.capture_channels,
        args.stream.reference_channel,
        args.error_channel,
    )?;
    let mut playback = AlsaPlayback::open(
        &settings,
        args.stream.playback_channels,
        args.stream.output_channels.clone(),
    )?;

    info!(
        device = %settings.device,
        reference = args.stream.reference_channel,
        error = args.error_channel,
        outputs = ?args.stream.output_channels,
        period_ms = params.block_period_secs() * 1000.0,
        "stream configured"
    );

    engine
        .calibrate(&mut AlsaPlayRecord {
            capture: &mut capture,
            playback: &mut playback,
            block_size: settings.block_size,
        })
        .context("secondary path identification failed")?;

    let token = CancelToken::new();
    shutdown::install(&token, args.stream.run_secs);
    info!(split = args.split_streams, "cancelling");

    let summary = if args.split_streams {
        let mut consumer = engine
            .take_playback_consumer()
            .context("playback handoff already taken")?;
        let playback_thread = {
            let token = token.clone();
            thread::Builder::new()
                .name("playback".into())
                .spawn(move || run_playback(&mut playback, &mut consumer, &token))
                .context("spawn playback thread")?
        };

        let captured = engine.run_capture(&mut capture, &token);
        // the playback loop only exits on cancellation; make sure it sees one
        token.cancel();
        let played = playback_thread
            .join()
            .map_err(|_| anyhow!("playback thread panicked"))?
            .context("playback stream failed")?;
        info!(
            periods = played.periods,
            silent_periods = played.silent_periods,
            "playback finished"
        );
        captured.context("capture stream failed")?
    } else {
        engine
            .run_duplex(&mut capture, &mut playback, &token)
            .context("audio stream failed")?
    };

    info!(
        blocks = summary.blocks_processed,
        overwritten = summary.overwritten_blocks,
        "stopped"
    );
    Ok(())
}
