//! Seams to the audio collaborator. Implementors own devices, channel routing
//! and timing; the core only sees mono reference, error and anti-noise blocks.

/// Synchronous play-while-record primitive used once for identification.
pub trait PlayRecord {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Plays `excitation` through the cancellation speaker while capturing the
    /// error microphone into `error`, which has the same length.
    fn play_record(&mut self, excitation: &[f32], error: &mut [f32]) -> Result<(), Self::Error>;
}

/// Delivers one period of aligned reference and error samples.
pub trait CaptureSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn capture(&mut self, reference: &mut [f32], error: &mut [f32]) -> Result<(), Self::Error>;
}

/// Accepts one period of anti-noise.
pub trait PlaybackSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn play(&mut self, block: &[f32]) -> Result<(), Self::Error>;
}
