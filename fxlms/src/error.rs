use thiserror::Error;

use crate::engine::Phase;

/// Boxed error raised by an audio collaborator.
pub type StreamError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AncError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("excitation has {excitation} samples but the measured response has {measured}")]
    LengthMismatch { excitation: usize, measured: usize },

    #[error("expected blocks of {expected} samples, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    #[error("engine is {0:?}, not adapting")]
    NotAdapting(Phase),

    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("calibration response energy {energy:e} is below the floor {floor:e}")]
    CalibrationDegenerate { energy: f32, floor: f32 },

    #[error("audio stream failed")]
    Stream(#[source] StreamError),
}

pub type Result<T, E = AncError> = std::result::Result<T, E>;
