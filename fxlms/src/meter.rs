/// Root-mean-square level of a block.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum = samples.iter().map(|s| s * s).sum::<f32>();
    (sum / samples.len() as f32).sqrt()
}

/// Levels of the most recently processed block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelReport {
    pub reference_rms: f32,
    pub error_rms: f32,
    pub output_rms: f32,
}

impl LevelReport {
    pub fn measure(reference: &[f32], error: &[f32], output: &[f32]) -> Self {
        Self {
            reference_rms: rms_level(reference),
            error_rms: rms_level(error),
            output_rms: rms_level(output),
        }
    }
}
