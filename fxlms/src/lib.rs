//! Feedforward active noise cancellation built on a leaky, normalized FxLMS
//! control filter.
//!
//! The canceller runs in two phases. A short burst of white noise is played
//! through the cancellation speaker while the error microphone is recorded,
//! and NLMS fits an FIR model of that secondary path. The control filter then
//! adapts continuously, filtering the reference through the model to steer
//! its weights, and every output block passes a hard limiter before playback.

mod cancel;
mod control;
mod engine;
mod error;
mod handoff;
mod history;
mod io;
mod limiter;
mod meter;
mod params;
mod secondary_path;

pub use cancel::CancelToken;
pub use control::ControlFilter;
pub use engine::{Engine, Phase, PlaybackSummary, RunSummary, run_playback};
pub use error::{AncError, Result, StreamError};
pub use handoff::{BlockConsumer, BlockPublisher, block_slot};
pub use history::HistoryBuffer;
pub use io::{CaptureSource, PlayRecord, PlaybackSink};
pub use limiter::Limiter;
pub use meter::{LevelReport, rms_level};
pub use params::{AdaptationParameters, MAX_CALIBRATION_SECS};
pub use secondary_path::{SecondaryPathEstimator, SecondaryPathModel, gaussian_excitation};
