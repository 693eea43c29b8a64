//! Phase state machine tying identification, adaptation and playback handoff together.

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::control::ControlFilter;
use crate::error::{AncError, Result};
use crate::handoff::{BlockConsumer, BlockPublisher, block_slot};
use crate::io::{CaptureSource, PlayRecord, PlaybackSink};
use crate::limiter::Limiter;
use crate::meter::LevelReport;
use crate::params::AdaptationParameters;
use crate::secondary_path::{SecondaryPathEstimator, SecondaryPathModel, gaussian_excitation};

const DEFAULT_REPORT_INTERVAL: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Calibrating,
    Adapting,
    Stopped,
}

/// Totals for one run loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks_processed: u64,
    /// Blocks replaced in the handoff before playback took them.
    pub overwritten_blocks: u64,
}

/// Totals for one playback loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub periods: u64,
    /// Periods that played silence for lack of a fresh block.
    pub silent_periods: u64,
}

pub struct Engine {
    params: AdaptationParameters,
    phase: Phase,
    limiter: Limiter,
    secondary_path: Option<SecondaryPathModel>,
    filter: Option<ControlFilter>,
    reference: Vec<f32>,
    error: Vec<f32>,
    blocks_processed: u64,
    levels: LevelReport,
    report_interval: u64,
    publisher: BlockPublisher,
    consumer: Option<BlockConsumer>,
}

impl Engine {
    pub fn new(params: AdaptationParameters) -> Result<Self> {
        params.validate()?;
        let block_size = params.block_size;
        let (publisher, consumer) = block_slot(block_size);
        Ok(Self {
            limiter: Limiter::new(params.output_limit),
            params,
            phase: Phase::Idle,
            secondary_path: None,
            filter: None,
            reference: vec![0.0; block_size],
            error: vec![0.0; block_size],
            blocks_processed: 0,
            levels: LevelReport::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            publisher,
            consumer: Some(consumer),
        })
    }

    /// Logs a level report every `blocks` processed blocks. Zero disables reports.
    pub fn with_report_interval(mut self, blocks: u64) -> Self {
        self.report_interval = blocks;
        self
    }

    pub fn params(&self) -> &AdaptationParameters {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn secondary_path(&self) -> Option<&SecondaryPathModel> {
        self.secondary_path.as_ref()
    }

    pub fn filter(&self) -> Option<&ControlFilter> {
        self.filter.as_ref()
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed
    }

    /// Levels of the last processed block.
    pub fn levels(&self) -> LevelReport {
        self.levels
    }

    /// Hands out the playback half of the block handoff fed by `run_capture`.
    /// Only the first call returns it.
    pub fn take_playback_consumer(&mut self) -> Option<BlockConsumer> {
        self.consumer.take()
    }

    /// Leaves Idle and returns the excitation to play during identification.
    pub fn begin_calibration(&mut self) -> Result<Vec<f32>> {
        self.transition(Phase::Idle, Phase::Calibrating)?;
        let len = self.params.calibration_len();
        info!(
            samples = len,
            amplitude = self.params.excitation_amplitude,
            "identifying secondary path"
        );
        Ok(gaussian_excitation(
            len,
            self.params.excitation_amplitude,
            self.params.excitation_seed,
        ))
    }

    /// Fits s_hat from the played excitation and the captured error mic, then
    /// starts adapting. Any failure here ends the run.
    pub fn complete_calibration(
        &mut self,
        excitation: &[f32],
        measured: &[f32],
    ) -> Result<&SecondaryPathModel> {
        if self.phase != Phase::Calibrating {
            return Err(AncError::InvalidTransition {
                from: self.phase,
                to: Phase::Adapting,
            });
        }

        let estimator = SecondaryPathEstimator::new(
            self.params.secondary_path_order,
            self.params.identification_step_size,
            self.params.epsilon,
        );
        let model = match estimator.identify(excitation, measured) {
            Ok(model) => model,
            Err(err) => {
                self.stop();
                return Err(err);
            }
        };

        let floor = self.params.min_response_energy;
        if model.response_energy() < floor {
            warn!(
                energy = model.response_energy(),
                floor, "error mic barely heard the excitation"
            );
            self.stop();
            return Err(AncError::CalibrationDegenerate {
                energy: model.response_energy(),
                floor,
            });
        }

        info!(
            taps = model.order(),
            response_energy = model.response_energy(),
            "secondary path identified"
        );
        self.filter = Some(ControlFilter::new(
            self.params.control_order,
            model.clone(),
            self.params.step_size,
            self.params.leakage,
            self.params.epsilon,
            self.params.root_epsilon,
            self.limiter,
        ));
        self.phase = Phase::Adapting;
        Ok(&*self.secondary_path.insert(model))
    }

    /// Runs the blocking play-and-record identification through `io`.
    pub fn calibrate<P: PlayRecord>(&mut self, io: &mut P) -> Result<&SecondaryPathModel> {
        let excitation = self.begin_calibration()?;
        let mut measured = vec![0.0; excitation.len()];
        if let Err(err) = io.play_record(&excitation, &mut measured) {
            self.stop();
            return Err(AncError::Stream(Box::new(err)));
        }
        self.complete_calibration(&excitation, &measured)
    }

    /// Produces one block of limited anti-noise from aligned reference and error blocks.
    pub fn process(&mut self, reference: &[f32], error: &[f32], output: &mut [f32]) -> Result<()> {
        let Some(filter) = self.filter.as_mut() else {
            return Err(AncError::NotAdapting(self.phase));
        };
        let expected = self.params.block_size;
        for len in [reference.len(), error.len(), output.len()] {
            if len != expected {
                return Err(AncError::BlockSizeMismatch {
                    expected,
                    actual: len,
                });
            }
        }

        let input_gain = self.params.input_gain;
        for (dst, src) in self.reference.iter_mut().zip(reference) {
            *dst = src * input_gain;
        }
        for (dst, src) in self.error.iter_mut().zip(error) {
            *dst = src * input_gain;
        }

        filter.step_block_raw(&self.reference, &self.error, output);
        let output_gain = self.params.output_gain;
        for sample in output.iter_mut() {
            *sample *= output_gain;
        }
        self.limiter.apply(output);

        self.levels = LevelReport::measure(&self.reference, &self.error, output);
        self.blocks_processed += 1;
        Ok(())
    }

    /// Ends the run and releases the adaptive state. Idempotent.
    pub fn stop(&mut self) {
        if self.phase != Phase::Stopped {
            info!(
                from = ?self.phase,
                blocks = self.blocks_processed,
                "canceller stopped"
            );
        }
        self.phase = Phase::Stopped;
        self.filter = None;
    }

    /// Capture, process and play in one loop until `token` is cancelled.
    pub fn run_duplex<C, P>(
        &mut self,
        source: &mut C,
        sink: &mut P,
        token: &CancelToken,
    ) -> Result<RunSummary>
    where
        C: CaptureSource,
        P: PlaybackSink,
    {
        self.ensure_adapting()?;
        let block_size = self.params.block_size;
        let mut reference = vec![0.0; block_size];
        let mut error = vec![0.0; block_size];
        let mut output = vec![0.0; block_size];
        let start = self.blocks_processed;

        let mut result = Ok(());
        while !token.is_cancelled() {
            result = self.duplex_period(source, sink, &mut reference, &mut error, &mut output);
            if result.is_err() {
                break;
            }
        }

        let summary = RunSummary {
            blocks_processed: self.blocks_processed - start,
            overwritten_blocks: 0,
        };
        self.stop();
        result.map(|()| summary)
    }

    /// Capture and process until `token` is cancelled, handing each block to
    /// the playback context through the consumer from `take_playback_consumer`.
    pub fn run_capture<C: CaptureSource>(
        &mut self,
        source: &mut C,
        token: &CancelToken,
    ) -> Result<RunSummary> {
        self.ensure_adapting()?;
        let block_size = self.params.block_size;
        let mut reference = vec![0.0; block_size];
        let mut error = vec![0.0; block_size];
        let mut output = vec![0.0; block_size];
        let start = self.blocks_processed;
        let overwritten_before = self.publisher.overwritten();

        let mut result = Ok(());
        while !token.is_cancelled() {
            result = source
                .capture(&mut reference, &mut error)
                .map_err(|err| AncError::Stream(Box::new(err)))
                .and_then(|()| self.process(&reference, &error, &mut output));
            if result.is_err() {
                break;
            }
            self.publisher.publish(&output);
            self.report_levels();
        }

        let summary = RunSummary {
            blocks_processed: self.blocks_processed - start,
            overwritten_blocks: self.publisher.overwritten() - overwritten_before,
        };
        self.stop();
        result.map(|()| summary)
    }

    fn duplex_period<C, P>(
        &mut self,
        source: &mut C,
        sink: &mut P,
        reference: &mut [f32],
        error: &mut [f32],
        output: &mut [f32],
    ) -> Result<()>
    where
        C: CaptureSource,
        P: PlaybackSink,
    {
        source
            .capture(reference, error)
            .map_err(|err| AncError::Stream(Box::new(err)))?;
        self.process(reference, error, output)?;
        sink.play(output)
            .map_err(|err| AncError::Stream(Box::new(err)))?;
        self.report_levels();
        Ok(())
    }

    fn ensure_adapting(&self) -> Result<()> {
        if self.phase != Phase::Adapting {
            return Err(AncError::NotAdapting(self.phase));
        }
        Ok(())
    }

    fn transition(&mut self, from: Phase, to: Phase) -> Result<()> {
        if self.phase != from {
            return Err(AncError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!(?from, ?to, "phase change");
        self.phase = to;
        Ok(())
    }

    fn report_levels(&self) {
        if self.report_interval == 0 || self.blocks_processed % self.report_interval != 0 {
            return;
        }
        info!(
            blocks = self.blocks_processed,
            reference_rms = self.levels.reference_rms,
            error_rms = self.levels.error_rms,
            output_rms = self.levels.output_rms,
            "levels"
        );
        if let Some(filter) = &self.filter {
            if !filter.weights_finite() {
                warn!("control weights are no longer finite; output is muted by the limiter");
            }
        }
    }
}

/// Plays the latest published block (or silence) each period until `token` is cancelled.
pub fn run_playback<P: PlaybackSink>(
    sink: &mut P,
    consumer: &mut BlockConsumer,
    token: &CancelToken,
) -> Result<PlaybackSummary> {
    let mut block = vec![0.0; consumer.block_size()];
    let mut summary = PlaybackSummary::default();
    while !token.is_cancelled() {
        if !consumer.consume(&mut block) {
            summary.silent_periods += 1;
        }
        sink.play(&block)
            .map_err(|err| AncError::Stream(Box::new(err)))?;
        summary.periods += 1;
    }
    debug!(
        periods = summary.periods,
        silent_periods = summary.silent_periods,
        "playback stopped"
    );
    Ok(summary)
}
