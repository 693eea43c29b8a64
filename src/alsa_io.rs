//! ALSA capture and playback for the canceller: interleaved FLOAT PCMs, with
//! the reference/error channels picked out of the capture frames and the mono
//! anti-noise cloned onto the selected playback channels.

use alsa::nix::errno::Errno;
use alsa::pcm::{Access, Format, Frames, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result, ensure};
use fxlms::{CaptureSource, PlayRecord, PlaybackSink};
use tracing::{debug, warn};

/// Device-level stream settings shared by capture and playback.
#[derive(Debug, Clone)]
pub struct PcmSettings {
    pub device: String,
    pub sample_rate: u32,
    pub block_size: usize,
}

pub fn open_pcm(direction: Direction, settings: &PcmSettings, channels: usize) -> Result<PCM> {
    let pcm = PCM::new(&settings.device, direction, false)
        .with_context(|| format!("open {:?} PCM on {}", direction, settings.device))?;

    {
        let hwp = HwParams::any(&pcm)?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::float())?;
        hwp.set_channels(channels as u32)
            .with_context(|| format!("{direction:?} device rejected {channels} channels"))?;
        hwp.set_rate(settings.sample_rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(settings.block_size as Frames, ValueOr::Nearest)?;
        hwp.set_buffer_size_near((settings.block_size * 2) as Frames)?;
        pcm.hw_params(&hwp)?;

        let rate = hwp.get_rate()?;
        if rate != settings.sample_rate {
            warn!(
                requested = settings.sample_rate,
                actual = rate,
                "{direction:?} device picked a different sample rate"
            );
        }
    }

    pcm.prepare()?;
    Ok(pcm)
}

fn read_chunk(pcm: &PCM, buffer: &mut [f32], channels: usize) -> alsa::Result<()> {
    let io = pcm.io_f32()?;
    let mut offset = 0;
    while offset < buffer.len() {
        match io.readi(&mut buffer[offset..]) {
            Ok(frames) => offset += frames * channels,
            Err(err) if err.errno() == Errno::EPIPE => {
                debug!("capture overrun");
                pcm.prepare()?;
            }
            Err(err) if err.errno() == Errno::EAGAIN => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn write_chunk(pcm: &PCM, buffer: &[f32], channels: usize) -> alsa::Result<()> {
    let io = pcm.io_f32()?;
    let mut offset = 0;
    while offset < buffer.len() {
        match io.writei(&buffer[offset..]) {
            Ok(frames) => offset += frames * channels,
            Err(err) if err.errno() == Errno::EPIPE => {
                debug!("playback underrun");
                pcm.prepare()?;
            }
            Err(err) if err.errno() == Errno::EAGAIN => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Capture PCM delivering the reference and error channels.
pub struct AlsaCapture {
    pcm: PCM,
    channels: usize,
    reference_channel: usize,
    error_channel: usize,
    frames: Vec<f32>,
}

impl AlsaCapture {
    pub fn open(
        settings: &PcmSettings,
        channels: usize,
        reference_channel: usize,
        error_channel: usize,
    ) -> Result<Self> {
        ensure!(
            reference_channel < channels && error_channel < channels,
            "capture channels {reference_channel}/{error_channel} out of range for {channels} channels"
        );
        let pcm = open_pcm(Direction::Capture, settings, channels)
            .context("failed to open capture PCM")?;
        Ok(Self {
            pcm,
            channels,
            reference_channel,
            error_channel,
            frames: vec![0.0; settings.block_size * channels],
        })
    }
}

impl CaptureSource for AlsaCapture {
    type Error = alsa::Error;

    fn capture(&mut self, reference: &mut [f32], error: &mut [f32]) -> alsa::Result<()> {
        read_chunk(&self.pcm, &mut self.frames, self.channels)?;
        deinterleave(
            &self.frames,
            self.channels,
            (self.reference_channel, self.error_channel),
            reference,
            error,
        );
        Ok(())
    }
}

/// Playback PCM writing the mono anti-noise to every routed output channel.
pub struct AlsaPlayback {
    pcm: PCM,
    channels: usize,
    outputs: Vec<usize>,
    frames: Vec<f32>,
}

impl AlsaPlayback {
    pub fn open(settings: &PcmSettings, channels: usize, outputs: Vec<usize>) -> Result<Self> {
        ensure!(!outputs.is_empty(), "at least one output channel is required");
        ensure!(
            outputs.iter().all(|&ch| ch < channels),
            "output channels {outputs:?} out of range for {channels} channels"
        );
        let pcm = open_pcm(Direction::Playback, settings, channels)
            .context("failed to open playback PCM")?;
        Ok(Self {
            pcm,
            channels,
            outputs,
            frames: vec![0.0; settings.block_size * channels],
        })
    }
}

impl PlaybackSink for AlsaPlayback {
    type Error = alsa::Error;

    fn play(&mut self, block: &[f32]) -> alsa::Result<()> {
        interleave(block, self.channels, &self.outputs, &mut self.frames);
        write_chunk(&self.pcm, &self.frames, self.channels)
    }
}

/// Plays the identification noise while recording the error channel, one
/// period at a time.
pub struct AlsaPlayRecord<'a> {
    pub capture: &'a mut AlsaCapture,
    pub playback: &'a mut AlsaPlayback,
    pub block_size: usize,
}

impl PlayRecord for AlsaPlayRecord<'_> {
    type Error = alsa::Error;

    fn play_record(&mut self, excitation: &[f32], error: &mut [f32]) -> alsa::Result<()> {
        let mut played = vec![0.0; self.block_size];
        let mut reference = vec![0.0; self.block_size];
        let mut recorded = vec![0.0; self.block_size];

        for (chunk, out) in excitation
            .chunks(self.block_size)
            .zip(error.chunks_mut(self.block_size))
        {
            played[..chunk.len()].copy_from_slice(chunk);
            played[chunk.len()..].fill(0.0);
            self.playback.play(&played)?;
            self.capture.capture(&mut reference, &mut recorded)?;
            out.copy_from_slice(&recorded[..out.len()]);
        }
        Ok(())
    }
}

fn deinterleave(
    frames: &[f32],
    channels: usize,
    (reference_channel, error_channel): (usize, usize),
    reference: &mut [f32],
    error: &mut [f32],
) {
    let frames = frames.chunks_exact(channels);
    for ((frame, x), e) in frames.zip(reference.iter_mut()).zip(error.iter_mut()) {
        *x = frame[reference_channel];
        *e = frame[error_channel];
    }
}

fn interleave(block: &[f32], channels: usize, outputs: &[usize], frames: &mut [f32]) {
    frames.fill(0.0);
    for (frame, &sample) in frames.chunks_exact_mut(channels).zip(block) {
        for &ch in outputs {
            frame[ch] = sample;
        }
    }
}
