/// Fixed-length ring of the most recent samples, read back newest-first.
///
/// Insertion overwrites the oldest slot and advances a write index, so the
/// cost of `push` does not depend on the length of the window.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: Vec<f32>,
    pos: usize,
}

impl HistoryBuffer {
    /// Creates a zero-filled window of `len` samples.
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "history length must be positive");
        Self {
            samples: vec![0.0; len],
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; a zero-length window cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Inserts `sample` as the newest entry, evicting the oldest.
    pub fn push(&mut self, sample: f32) {
        self.samples[self.pos] = sample;
        self.pos += 1;
        if self.pos == self.samples.len() {
            self.pos = 0;
        }
    }

    /// Iterates the window from the newest sample to the oldest.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let (newer, older) = self.samples.split_at(self.pos);
        newer.iter().rev().chain(older.iter().rev()).copied()
    }

    /// Inner product of the window (newest-first) with `weights`.
    pub fn dot(&self, weights: &[f32]) -> f32 {
        assert_eq!(
            weights.len(),
            self.samples.len(),
            "weights must match history length"
        );
        weights.iter().zip(self.iter()).map(|(w, x)| w * x).sum()
    }

    /// Sum of squares of the window.
    pub fn energy(&self) -> f32 {
        self.samples.iter().map(|x| x * x).sum()
    }

    /// Applies `w[i] = decay * w[i] + scale * x[i]` with `x` read newest-first.
    pub fn leaky_update(&self, weights: &mut [f32], decay: f32, scale: f32) {
        assert_eq!(
            weights.len(),
            self.samples.len(),
            "weights must match history length"
        );
        for (weight, x) in weights.iter_mut().zip(self.iter()) {
            *weight = decay * *weight + scale * x;
        }
    }
}
