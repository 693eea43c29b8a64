use crate::history::HistoryBuffer;
use crate::limiter::Limiter;
use crate::secondary_path::SecondaryPathModel;

/// Leaky, normalized filtered-reference LMS controller.
///
/// Produces anti-noise from the reference signal and adapts its weights from
/// the error microphone, using `s_hat` to predict how the reference appears
/// at the error sensor.
pub struct ControlFilter {
    weights: Vec<f32>,
    reference: HistoryBuffer,
    filtered: HistoryBuffer,
    secondary_path: SecondaryPathModel,
    mu: f32,
    decay: f32,
    epsilon: f32,
    root_epsilon: f32,
    limiter: Limiter,
}

impl ControlFilter {
    pub fn new(
        order: usize,
        secondary_path: SecondaryPathModel,
        mu: f32,
        leakage: f32,
        epsilon: f32,
        root_epsilon: f32,
        limiter: Limiter,
    ) -> Self {
        Self {
            weights: vec![0.0; order],
            reference: HistoryBuffer::new(order),
            filtered: HistoryBuffer::new(secondary_path.order()),
            secondary_path,
            mu,
            decay: 1.0 - leakage,
            epsilon,
            root_epsilon,
            limiter,
        }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn secondary_path(&self) -> &SecondaryPathModel {
        &self.secondary_path
    }

    pub fn limiter(&self) -> Limiter {
        self.limiter
    }

    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    /// Euclidean norm of the control weights.
    pub fn weight_norm(&self) -> f32 {
        self.weights.iter().map(|w| w * w).sum::<f32>().sqrt()
    }

    pub fn weights_finite(&self) -> bool {
        self.weights.iter().all(|w| w.is_finite())
    }

    /// Advances one sample and returns the unclipped anti-noise value.
    #[inline]
    pub fn step(&mut self, reference: f32, error: f32) -> f32 {
        self.reference.push(reference);
        self.filtered.push(reference);

        let output = self.reference.dot(&self.weights);
        let filtered_reference = self.filtered.dot(&self.secondary_path);

        let norm = self.reference.energy() + self.epsilon;
        let gain = self.mu * error * filtered_reference / (norm.sqrt() + self.root_epsilon);
        self.reference
            .leaky_update(&mut self.weights, self.decay, gain);

        output
    }

    /// Processes aligned reference and error blocks, writing unclipped anti-noise to `output`.
    pub fn step_block_raw(&mut self, reference: &[f32], error: &[f32], output: &mut [f32]) {
        assert_eq!(
            reference.len(),
            error.len(),
            "reference and error blocks must match"
        );
        assert_eq!(
            reference.len(),
            output.len(),
            "output block length must match input blocks"
        );

        for ((out, &x), &e) in output.iter_mut().zip(reference).zip(error) {
            *out = self.step(x, e);
        }
    }

    /// Processes aligned reference and error blocks, writing limited anti-noise to `output`.
    pub fn step_block(&mut self, reference: &[f32], error: &[f32], output: &mut [f32]) {
        self.step_block_raw(reference, error, output);
        self.limiter.apply(output);
    }
}
