//! One-shot NLMS identification of the speaker-to-error-mic path.

use std::ops::Deref;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::error::{AncError, Result};
use crate::history::HistoryBuffer;

/// Estimated impulse response of the secondary path (s_hat).
///
/// Immutable once produced; clones share the same coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryPathModel {
    taps: Arc<[f32]>,
    response_energy: f32,
}

impl SecondaryPathModel {
    /// Wraps known coefficients, e.g. a path measured offline.
    pub fn from_taps(taps: Vec<f32>) -> Self {
        assert!(!taps.is_empty(), "secondary path needs at least one tap");
        Self {
            taps: taps.into(),
            response_energy: 0.0,
        }
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    pub fn order(&self) -> usize {
        self.taps.len()
    }

    /// Energy of the error-mic capture the model was identified from.
    pub fn response_energy(&self) -> f32 {
        self.response_energy
    }

    /// True when both handles point at the same coefficient storage.
    pub fn shares_taps_with(&self, other: &SecondaryPathModel) -> bool {
        Arc::ptr_eq(&self.taps, &other.taps)
    }
}

impl Deref for SecondaryPathModel {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.taps
    }
}

/// NLMS estimator fitting `s` so that `s * excitation` predicts the error mic.
pub struct SecondaryPathEstimator {
    taps: Vec<f32>,
    history: HistoryBuffer,
    mu: f32,
    epsilon: f32,
    response_energy: f32,
}

impl SecondaryPathEstimator {
    pub fn new(order: usize, mu: f32, epsilon: f32) -> Self {
        Self {
            taps: vec![0.0; order],
            history: HistoryBuffer::new(order),
            mu,
            epsilon,
            response_energy: 0.0,
        }
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// Feeds one excitation/response pair and returns the prediction error.
    pub fn update(&mut self, excitation: f32, measured: f32) -> f32 {
        self.history.push(excitation);
        self.response_energy += measured * measured;

        let predicted = self.history.dot(&self.taps);
        let error = measured - predicted;
        let norm = self.history.energy() + self.epsilon;
        self.history
            .leaky_update(&mut self.taps, 1.0, self.mu * error / norm);
        error
    }

    /// Runs the whole identification sequence and returns the model.
    pub fn identify(
        mut self,
        excitation: &[f32],
        measured: &[f32],
    ) -> Result<SecondaryPathModel> {
        if excitation.len() != measured.len() {
            return Err(AncError::LengthMismatch {
                excitation: excitation.len(),
                measured: measured.len(),
            });
        }
        for (&x, &d) in excitation.iter().zip(measured) {
            self.update(x, d);
        }
        Ok(self.finish())
    }

    pub fn finish(self) -> SecondaryPathModel {
        SecondaryPathModel {
            taps: self.taps.into(),
            response_energy: self.response_energy,
        }
    }
}

/// Seeded Gaussian white noise with standard deviation `amplitude`.
pub fn gaussian_excitation(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = match Normal::new(0.0f32, amplitude) {
        Ok(normal) => normal,
        Err(_) => return vec![0.0; len],
    };
    (0..len).map(|_| normal.sample(&mut rng)).collect()
}
