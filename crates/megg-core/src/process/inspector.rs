//! Per-egg inspection used by the processing phase.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{EggQuality, EggSize};
use crate::error::ProcessError;

/// Decides the quality and size of each egg
///
/// An `Err` is a fault of the inspection station and moves the work process
/// to the `error` state.
pub trait EggInspector: Send {
    /// Inspect egg number `egg_number` (1-based)
    fn inspect(&mut self, egg_number: u32) -> Result<(EggQuality, EggSize), ProcessError>;
}

/// Simulated inspection: weighted good/bad, uniform size
pub struct RandomInspector {
    rng: StdRng,
    success_rate: f64,
}

impl RandomInspector {
    /// Inspector seeded from the operating system
    pub fn new(success_rate: f64) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    /// Deterministic inspector
    pub fn seeded(success_rate: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl EggInspector for RandomInspector {
    fn inspect(&mut self, _egg_number: u32) -> Result<(EggQuality, EggSize), ProcessError> {
        let quality = if self.rng.random_bool(self.success_rate) {
            EggQuality::Good
        } else {
            EggQuality::Bad
        };
        let size = EggSize::ALL[self.rng.random_range(0..EggSize::ALL.len())];
        Ok((quality, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_extremes() {
        let mut always = RandomInspector::seeded(1.0, 1);
        let mut never = RandomInspector::seeded(0.0, 1);
        for n in 1..=50 {
            assert_eq!(always.inspect(n).unwrap().0, EggQuality::Good);
            assert_eq!(never.inspect(n).unwrap().0, EggQuality::Bad);
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let mut a = RandomInspector::seeded(0.5, 42);
        let mut b = RandomInspector::seeded(0.5, 42);
        for n in 1..=20 {
            assert_eq!(a.inspect(n).unwrap(), b.inspect(n).unwrap());
        }
    }
}
