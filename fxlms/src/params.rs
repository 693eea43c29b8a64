use crate::error::{AncError, Result};

/// Longest identification run accepted, in seconds.
pub const MAX_CALIBRATION_SECS: f32 = 600.0;

/// Immutable tuning and timing for one canceller run.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationParameters {
    pub sample_rate: u32,
    /// Samples per audio period.
    pub block_size: usize,
    /// Length of the identification run in seconds.
    pub calibration_secs: f32,
    /// Standard deviation of the identification noise.
    pub excitation_amplitude: f32,
    pub excitation_seed: u64,
    /// Secondary path model order (S).
    pub secondary_path_order: usize,
    /// Control filter order (N).
    pub control_order: usize,
    /// FxLMS step size (μ).
    pub step_size: f32,
    /// NLMS step size used during identification (μ_id).
    pub identification_step_size: f32,
    /// Weight leakage per sample (λ).
    pub leakage: f32,
    /// Regularization added to the reference energy (ε).
    pub epsilon: f32,
    /// Regularization added to the square root of the energy (ε′).
    pub root_epsilon: f32,
    /// Hard output bound, applied after the output gain.
    pub output_limit: f32,
    pub input_gain: f32,
    pub output_gain: f32,
    /// Minimum captured response energy to accept a calibration; zero disables the check.
    pub min_response_energy: f32,
}

impl Default for AdaptationParameters {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
            calibration_secs: 2.0,
            excitation_amplitude: 0.05,
            excitation_seed: 0x5eed,
            secondary_path_order: 256,
            control_order: 256,
            step_size: 0.0005,
            identification_step_size: 0.5,
            leakage: 1e-5,
            epsilon: 1e-6,
            root_epsilon: 1e-6,
            output_limit: 0.3,
            input_gain: 1.0,
            output_gain: 1.0,
            min_response_energy: 0.0,
        }
    }
}

impl AdaptationParameters {
    /// Number of samples played and recorded during identification.
    pub fn calibration_len(&self) -> usize {
        (self.calibration_secs * self.sample_rate as f32).round() as usize
    }

    /// Duration of one audio period in seconds.
    pub fn block_period_secs(&self) -> f32 {
        self.block_size as f32 / self.sample_rate as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return invalid("sample rate must be positive");
        }
        if self.block_size == 0 {
            return invalid("block size must be positive");
        }
        if self.secondary_path_order == 0 || self.control_order == 0 {
            return invalid("filter orders must be positive");
        }
        if !(self.calibration_secs.is_finite() && self.calibration_secs > 0.0) {
            return invalid("calibration length must be a positive number of seconds");
        }
        if self.calibration_secs > MAX_CALIBRATION_SECS {
            return invalid("calibration may last at most 600 seconds");
        }
        if self.calibration_len() == 0 {
            return invalid("calibration must last at least one sample");
        }
        if !(self.excitation_amplitude.is_finite() && self.excitation_amplitude > 0.0) {
            return invalid("excitation amplitude must be positive");
        }
        if !(self.step_size.is_finite() && self.step_size >= 0.0) {
            return invalid("step size must be a non-negative number");
        }
        if !(self.identification_step_size > 0.0 && self.identification_step_size < 2.0) {
            return invalid("identification step size must lie in (0, 2)");
        }
        if !(0.0..1.0).contains(&self.leakage) {
            return invalid("leakage must lie in [0, 1)");
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return invalid("epsilon must be positive");
        }
        if !(self.root_epsilon.is_finite() && self.root_epsilon >= 0.0) {
            return invalid("root epsilon must be non-negative");
        }
        if !(self.output_limit.is_finite() && self.output_limit >= 0.0) {
            return invalid("output limit must be a non-negative number");
        }
        if !(self.input_gain.is_finite() && self.output_gain.is_finite()) {
            return invalid("gains must be finite");
        }
        if !(self.min_response_energy.is_finite() && self.min_response_energy >= 0.0) {
            return invalid("response energy floor must be non-negative");
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> Result<()> {
    Err(AncError::InvalidConfig(reason.to_string()))
}
