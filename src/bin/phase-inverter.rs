use anyhow::{Context, Result, ensure};
use antinoise::alsa_io::{AlsaCapture, AlsaPlayback};
use antinoise::cli::StreamArgs;
use antinoise::shutdown;
use clap::Parser;
use fxlms::{CancelToken, CaptureSource, Limiter, PlaybackSink, rms_level};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const REPORT_INTERVAL: u64 = 50;

/// Non-adaptive baseline: plays the reference back with its polarity flipped.
#[derive(Parser, Debug)]
#[command(name = "phase-inverter")]
struct Args {
    #[command(flatten)]
    stream: StreamArgs,

    #[arg(long, default_value_t = 1.0)]
    output_gain: f32,

    /// Hard limit on the speaker signal.
    #[arg(long, default_value_t = 1.0)]
    output_limit: f32,
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
    ensure!(
        args.output_limit.is_finite() && args.output_limit >= 0.0,
        "output limit must be a non-negative number"
    );
    if let Some(secs) = args.stream.run_secs {
        ensure!(secs.is_finite() && secs >= 0.0, "run time must be a non-negative number");
    }

    let settings = args.stream.pcm_settings();
    let mut capture = AlsaCapture::open(
        &settings,
        args.stream.capture_channels,
        args.stream.reference_channel,
        args.stream.reference_channel,
    )?;
    let mut playback = AlsaPlayback::open(
        &settings,
        args.stream.playback_channels,
        args.stream.output_channels.clone(),
    )?;
    let limiter = Limiter::new(args.output_limit);

    let mut reference = vec![0.0f32; settings.block_size];
    let mut unused = vec![0.0f32; settings.block_size];
    let mut output = vec![0.0f32; settings.block_size];

    let token = CancelToken::new();
    shutdown::install(&token, args.stream.run_secs);
    info!(gain = args.output_gain, "inverting reference");

    let mut blocks = 0u64;
    while !token.is_cancelled() {
        capture
            .capture(&mut reference, &mut unused)
            .context("capture failed")?;
        invert(&reference, &mut output, args.output_gain);
        limiter.apply(&mut output);
        playback.play(&output).context("playback failed")?;

        blocks += 1;
        if blocks % REPORT_INTERVAL == 0 {
            info!(
                reference_rms = rms_level(&reference),
                output_rms = rms_level(&output),
                "levels"
            );
        }
    }

    info!(blocks, "stopped");
    Ok(())
}

fn invert(input: &[f32], output: &mut [f32], gain: f32) {
    for (out, &x) in output.iter_mut().zip(input) {
        *out = -x * gain;
    }
}
