use clap::Args;

use crate::alsa_io::PcmSettings;

/// Device and routing flags shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// ALSA device used for both capture and playback.
    #[arg(long, default_value = "default")]
    pub device: String,

    #[arg(long, default_value_t = 48_000)]
    pub sample_rate: u32,

    /// Frames per audio period.
    #[arg(long, default_value_t = 1024)]
    pub block_size: usize,

    #[arg(long, default_value_t = 2)]
    pub capture_channels: usize,

    #[arg(long, default_value_t = 2)]
    pub playback_channels: usize,

    /// Capture channel carrying the noise reference (0-based).
    #[arg(long, default_value_t = 0)]
    pub reference_channel: usize,

    /// Playback channels that receive the mono output (0-based, comma separated).
    #[arg(long, value_delimiter = ',', default_values_t = [0usize, 1])]
    pub output_channels: Vec<usize>,

    /// Stop after this many seconds instead of waiting for Enter.
    #[arg(long)]
    pub run_secs: Option<f32>,
}

impl StreamArgs {
    pub fn pcm_settings(&self) -> PcmSettings {
        PcmSettings {
            device: self.device.clone(),
            sample_rate: self.sample_rate,
            block_size: self.block_size,
        }
    }
}
