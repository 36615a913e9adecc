use std::f64::consts::PI;

use rand::{Rng, RngCore};

use super::TagBehavior;

/// Produces a tag's raw numeric value for a point in simulation time.
///
/// Implementations are pure functions of `elapsed_ms` and their parameters.
/// Randomness comes only from the injected `rng`.
pub trait TagValueGenerator: Send + Sync + std::fmt::Debug {
    fn generate(&self, elapsed_ms: u64, rng: &mut dyn RngCore) -> f64;
}

// --- Generators ---

#[derive(Debug)]
pub struct SinusoidalGenerator {
    min: f64,
    max: f64,
    period: f64,
    amplitude: f64,
    offset: f64,
}

impl TagValueGenerator for SinusoidalGenerator {
    fn generate(&self, elapsed_ms: u64, _rng: &mut dyn RngCore) -> f64 {
        let phase = 2.0 * PI * (elapsed_ms as f64) / self.period;
        (self.offset + self.amplitude * phase.sin()).clamp(self.min, self.max)
    }
}

/// Ramps from `min` at `slope` units per millisecond and saturates at `max`
#[derive(Debug)]
pub struct LinearGenerator {
    min: f64,
    max: f64,
    slope: f64,
}

impl TagValueGenerator for LinearGenerator {
    fn generate(&self, elapsed_ms: u64, _rng: &mut dyn RngCore) -> f64 {
        (self.min + self.slope * elapsed_ms as f64).clamp(self.min, self.max)
    }
}

#[derive(Debug)]
pub struct RandomUniformGenerator {
    min: f64,
    max: f64,
}

impl TagValueGenerator for RandomUniformGenerator {
    fn generate(&self, _elapsed_ms: u64, rng: &mut dyn RngCore) -> f64 {
        if self.min >= self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

#[derive(Debug)]
pub struct SteppedGenerator {
    values: Vec<f64>,
    step_duration: u64,
}

impl TagValueGenerator for SteppedGenerator {
    fn generate(&self, elapsed_ms: u64, _rng: &mut dyn RngCore) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let step = elapsed_ms / self.step_duration.max(1);
        self.values[(step % self.values.len() as u64) as usize]
    }
}

#[derive(Debug)]
pub struct ConstantGenerator {
    value: f64,
}

impl TagValueGenerator for ConstantGenerator {
    fn generate(&self, _elapsed_ms: u64, _rng: &mut dyn RngCore) -> f64 {
        self.value
    }
}

// --- Factory ---

pub struct GeneratorFactory;

impl GeneratorFactory {
    /// Total over `TagBehavior`: every kind maps to exactly one generator.
    /// Parameter sanity is checked earlier by `TagBehavior::validate`.
    pub fn create(behavior: &TagBehavior) -> Box<dyn TagValueGenerator> {
        match behavior {
            TagBehavior::Sinusoidal {
                min,
                max,
                period,
                amplitude,
                offset,
            } => Box::new(SinusoidalGenerator {
                min: *min,
                max: *max,
                period: *period,
                amplitude: *amplitude,
                offset: *offset,
            }),
            TagBehavior::Linear { min, max, slope } => Box::new(LinearGenerator {
                min: *min,
                max: *max,
                slope: *slope,
            }),
            TagBehavior::Random { min, max } => Box::new(RandomUniformGenerator {
                min: *min,
                max: *max,
            }),
            TagBehavior::Stepped {
                values,
                step_duration,
            } => Box::new(SteppedGenerator {
                values: values.clone(),
                step_duration: *step_duration,
            }),
            TagBehavior::Constant { value } => Box::new(ConstantGenerator { value: *value }),
        }
    }
}
