//! generator.rs
//! Directional random walk for simulated readings.
//!
//! Each step: stay put with `static_probability`; otherwise maybe reverse
//! (`reversal_probability`) and move by up to `increment` in the current
//! direction. The result is clamped to [min, max], so values drift instead of jumping.

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use std::{collections::BTreeMap, sync::Arc};

pub type Entropy = Box<dyn RngCore + Send>;

/// One entropy source shared by polling and time-series captures.
pub type SharedEntropy = Arc<Mutex<Entropy>>;

/// Seeded `StdRng` for reproducible runs, OS-seeded otherwise.
pub fn entropy(seed: Option<u64>) -> Entropy {
    match seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(StdRng::from_os_rng()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkChannel {
    pub value: f64,
    pub direction: Direction,
    pub min: f64,
    pub max: f64,
    pub increment: f64,
}

impl WalkChannel {
    /// Bounds given in the wrong order are swapped; `start` is clamped.
    pub fn new(min: f64, max: f64, increment: f64, start: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            value: start.clamp(min, max),
            direction: Direction::Up,
            min,
            max,
            increment: increment.abs(),
        }
    }

    /// Starts somewhere uniform in [min, max], heading a random way.
    pub fn random_start<R: Rng>(rng: &mut R, min: f64, max: f64, increment: f64) -> Self {
        let mut channel = Self::new(min, max, increment, min);
        channel.value = rng.random_range(channel.min..=channel.max);
        if rng.random::<f64>() < 0.5 {
            channel.direction = Direction::Down;
        }
        channel
    }

    pub fn step<R: Rng>(&mut self, rng: &mut R, static_probability: f64, reversal_probability: f64) -> f64 {
        if rng.random::<f64>() < static_probability {
            return self.value;
        }
        if rng.random::<f64>() < reversal_probability {
            self.direction = self.direction.reversed();
        }
        let offset = if self.increment > 0.0 {
            rng.random_range(0.0..self.increment)
        } else {
            0.0
        };
        self.value = (self.value + self.direction.sign() * offset).clamp(self.min, self.max);
        self.value
    }
}

/// A set of channels stepped together with shared probabilities.
#[derive(Debug, Clone)]
pub struct RandomWalk<K: Ord> {
    channels: BTreeMap<K, WalkChannel>,
    static_probability: f64,
    reversal_probability: f64,
}

impl<K: Ord + Copy> RandomWalk<K> {
    pub fn new(static_probability: f64, reversal_probability: f64) -> Self {
        Self {
            channels: BTreeMap::new(),
            static_probability: static_probability.clamp(0.0, 1.0),
            reversal_probability: reversal_probability.clamp(0.0, 1.0),
        }
    }

    pub fn insert(&mut self, key: K, channel: WalkChannel) {
        self.channels.insert(key, channel);
    }

    pub fn value(&self, key: K) -> Option<f64> {
        self.channels.get(&key).map(|c| c.value)
    }

    pub fn values(&self) -> BTreeMap<K, f64> {
        self.channels.iter().map(|(k, c)| (*k, c.value)).collect()
    }

    pub fn step<R: Rng>(&mut self, rng: &mut R) -> BTreeMap<K, f64> {
        let (sp, rp) = (self.static_probability, self.reversal_probability);
        self.channels
            .iter_mut()
            .map(|(k, c)| (*k, c.step(rng, sp, rp)))
            .collect()
    }
}
