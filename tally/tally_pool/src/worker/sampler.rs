//! Sources of request sizes and delays for worker tasks.

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Supplies the load a worker applies to its pool
pub trait LoadSampler: Send {
    /// Units to acquire or release next
    fn request_size(&mut self) -> usize;

    /// How long to pause next
    fn delay(&mut self) -> Duration;
}

/// Draws sizes and delays uniformly from inclusive ranges
#[derive(Debug, Clone)]
pub struct UniformSampler {
    rng: StdRng,
    requests: RangeInclusive<usize>,
    delays_us: RangeInclusive<u64>,
}

impl UniformSampler {
    /// Create a sampler; `seed` makes the sequence reproducible.
    ///
    /// Both ranges must be non-empty.
    pub fn new(
        requests: RangeInclusive<usize>,
        delays_us: RangeInclusive<u64>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            rng,
            requests,
            delays_us,
        }
    }
}

impl LoadSampler for UniformSampler {
    fn request_size(&mut self) -> usize {
        self.rng.random_range(self.requests.clone())
    }

    fn delay(&mut self) -> Duration {
        Duration::from_micros(self.rng.random_range(self.delays_us.clone()))
    }
}

/// Replays fixed sequences, cycling when exhausted
#[derive(Debug, Clone)]
pub struct ScriptedSampler {
    requests: VecDeque<usize>,
    delays: VecDeque<Duration>,
}

impl ScriptedSampler {
    /// Create a sampler from request sizes and delays.
    ///
    /// An empty `requests` yields 1 and an empty `delays` yields zero.
    pub fn new(
        requests: impl IntoIterator<Item = usize>,
        delays: impl IntoIterator<Item = Duration>,
    ) -> Self {
        Self {
            requests: requests.into_iter().collect(),
            delays: delays.into_iter().collect(),
        }
    }
}

impl LoadSampler for ScriptedSampler {
    fn request_size(&mut self) -> usize {
        match self.requests.pop_front() {
            Some(size) => {
                self.requests.push_back(size);
                size
            }
            None => 1,
        }
    }

    fn delay(&mut self) -> Duration {
        match self.delays.pop_front() {
            Some(delay) => {
                self.delays.push_back(delay);
                delay
            }
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_stays_in_range() {
        let mut sampler = UniformSampler::new(1..=3, 1000..=8000, Some(7));

        for _ in 0..1000 {
            let size = sampler.request_size();
            assert!((1..=3).contains(&size));

            let delay = sampler.delay();
            assert!(delay >= Duration::from_micros(1000));
            assert!(delay <= Duration::from_micros(8000));
        }
    }

    #[test]
    fn test_uniform_seed_is_reproducible() {
        let mut a = UniformSampler::new(1..=3, 0..=100, Some(42));
        let mut b = UniformSampler::new(1..=3, 0..=100, Some(42));

        let left: Vec<usize> = (0..50).map(|_| a.request_size()).collect();
        let right: Vec<usize> = (0..50).map(|_| b.request_size()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_scripted_cycles() {
        let mut sampler = ScriptedSampler::new([1, 2], [Duration::from_millis(1)]);

        assert_eq!(sampler.request_size(), 1);
        assert_eq!(sampler.request_size(), 2);
        assert_eq!(sampler.request_size(), 1);
        assert_eq!(sampler.delay(), Duration::from_millis(1));
        assert_eq!(sampler.delay(), Duration::from_millis(1));
    }

    #[test]
    fn test_scripted_defaults_when_empty() {
        let mut sampler = ScriptedSampler::new(Vec::new(), Vec::new());
        assert_eq!(sampler.request_size(), 1);
        assert_eq!(sampler.delay(), Duration::ZERO);
    }
}
