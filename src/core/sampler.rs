use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};

use super::error::{SimError, SimResult};
use super::types::{AssetSpec, VolatilityPolicy};

/// Draws independent annual returns from a normal distribution. The random
/// stream is always supplied by the caller.
#[derive(Debug, Clone)]
pub struct ReturnSampler {
    dist: Normal<f64>,
}

impl ReturnSampler {
    pub fn new(mean: f64, std_dev: f64) -> SimResult<Self> {
        if std_dev < 0.0 {
            return Err(SimError::Distribution(format!(
                "normal({mean}, {std_dev}): standard deviation must be >= 0"
            )));
        }
        Normal::new(mean, std_dev)
            .map(|dist| Self { dist })
            .map_err(|e| SimError::Distribution(format!("normal({mean}, {std_dev}): {e}")))
    }

    pub fn for_asset(asset: &AssetSpec, policy: VolatilityPolicy) -> SimResult<Self> {
        let std_dev = policy.resolve(&asset.name, asset.return_std_dev)?;
        Self::new(asset.expected_return, std_dev)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.dist.sample(rng)
    }
}

/// Sub-seed for one simulation of one asset. Disjoint per
/// `(asset_index, simulation_id)` so paths can be generated in any order.
pub fn derive_seed(base_seed: u64, asset_index: u32, simulation_id: u32) -> u64 {
    let mixed = base_seed ^ ((asset_index as u64) << 32) ^ simulation_id as u64;
    splitmix64(mixed)
}

pub fn simulation_rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
