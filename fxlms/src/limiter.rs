/// Hard clipper guarding the transducer from an unstable filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limiter {
    limit: f32,
}

impl Limiter {
    pub fn new(limit: f32) -> Self {
        assert!(limit >= 0.0, "limit must be non-negative");
        Self { limit }
    }

    pub fn limit(&self) -> f32 {
        self.limit
    }

    /// Clamps one sample to `[-limit, limit]`. Non-finite samples become silence.
    #[inline]
    pub fn clip(&self, sample: f32) -> f32 {
        if sample.is_finite() {
            sample.clamp(-self.limit, self.limit)
        } else {
            0.0
        }
    }

    pub fn apply(&self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.clip(*sample);
        }
    }
}
