// This file is part of Velopolis-Core.
// Copyright © 2025 André de Palma, Lucas Javaudin
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Seeded random streams and the inter-arrival distributions.
//!
//! A single master seed spawns one independent substream per concern: one per
//! origin node for arrival sampling, one for the choice draws (profile,
//! destination, pooled-origin selection) and one for base-speed draws. Each
//! substream is an [`XorShiftRng`] so that the interleaving of agents at run
//! time cannot change the values any single concern observes, which is what
//! makes two runs with the same scenario and seed byte-identical.
use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

use crate::error::ScenarioError;

/// 64-bit fractional part of the golden ratio, used to spread substream seeds
/// over the seed space.
const SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

const ARRIVAL_SALT: u64 = 1;
const CHOICE_SALT: u64 = 2;
const SPEED_SALT: u64 = 3;
const POOLED_SALT: u64 = 4;

fn substream(master: u64, salt: u64, index: u64) -> XorShiftRng {
    let seed = master ^ salt.wrapping_mul(SEED_MIX) ^ index.wrapping_mul(SEED_MIX).rotate_left(32);
    XorShiftRng::seed_from_u64(seed)
}

/// The full set of random substreams used by one simulation run.
#[derive(Debug)]
pub struct RandomStreams {
    /// One arrival stream per node, indexed like the network nodes.
    arrivals: Vec<XorShiftRng>,
    /// Profile, destination and pooled-origin draws.
    pub choices: XorShiftRng,
    /// Base-speed draws.
    pub speeds: XorShiftRng,
    /// Inter-arrival sampling in pooled-generator mode.
    pub pooled: XorShiftRng,
}

impl RandomStreams {
    pub fn new(master_seed: u64, nb_nodes: usize) -> Self {
        RandomStreams {
            arrivals: (0..nb_nodes)
                .map(|i| substream(master_seed, ARRIVAL_SALT, i as u64))
                .collect(),
            choices: substream(master_seed, CHOICE_SALT, 0),
            speeds: substream(master_seed, SPEED_SALT, 0),
            pooled: substream(master_seed, POOLED_SALT, 0),
        }
    }

    /// The arrival stream of a given origin node.
    pub fn arrivals(&mut self, node: usize) -> &mut XorShiftRng {
        &mut self.arrivals[node]
    }
}

/// An inter-arrival time distribution attached to an origin node.
///
/// The samplers are the classical ones: inversion for exponential and
/// weibull, Box–Muller for normal and lognormal and Marsaglia–Tsang for
/// gamma. All samples are clamped to be non-negative.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[schemars(title = "Distribution")]
pub enum Distribution {
    /// Exponential with rate `rate` > 0; mean `1 / rate`.
    Exponential { rate: f64 },
    /// Normal with mean `mean` and standard deviation `std_dev` > 0,
    /// truncated at zero.
    Normal { mean: f64, std_dev: f64 },
    /// Lognormal: `exp(mu + sigma * Z)` with `sigma` > 0.
    LogNormal { mu: f64, sigma: f64 },
    /// Gamma with shape `shape` > 0 and scale `scale` > 0; mean
    /// `shape * scale`.
    Gamma { shape: f64, scale: f64 },
    /// Weibull with shape `shape` > 0 and scale `scale` > 0.
    Weibull { shape: f64, scale: f64 },
}

impl Default for Distribution {
    /// The per-node default when the scenario configures nothing:
    /// exponential with rate 0.5 (one arrival every two seconds on average).
    fn default() -> Self {
        Distribution::Exponential { rate: 0.5 }
    }
}

impl Distribution {
    /// Checks the parameter domains.
    pub fn validate(&self, node: &str) -> Result<(), ScenarioError> {
        let bad = |reason: String| ScenarioError::BadDistribution {
            node: node.to_owned(),
            reason,
        };
        match *self {
            Distribution::Exponential { rate } => {
                if !(rate > 0.0 && rate.is_finite()) {
                    return Err(bad(format!("exponential rate must be > 0, got {rate}")));
                }
            }
            Distribution::Normal { mean, std_dev } => {
                if !mean.is_finite() || !(std_dev > 0.0 && std_dev.is_finite()) {
                    return Err(bad(format!(
                        "normal requires finite mean and std_dev > 0, got ({mean}, {std_dev})"
                    )));
                }
            }
            Distribution::LogNormal { mu, sigma } => {
                if !mu.is_finite() || !(sigma > 0.0 && sigma.is_finite()) {
                    return Err(bad(format!(
                        "lognormal requires finite mu and sigma > 0, got ({mu}, {sigma})"
                    )));
                }
            }
            Distribution::Gamma { shape, scale } => {
                if !(shape > 0.0 && shape.is_finite()) || !(scale > 0.0 && scale.is_finite()) {
                    return Err(bad(format!(
                        "gamma requires shape > 0 and scale > 0, got ({shape}, {scale})"
                    )));
                }
            }
            Distribution::Weibull { shape, scale } => {
                if !(shape > 0.0 && shape.is_finite()) || !(scale > 0.0 && scale.is_finite()) {
                    return Err(bad(format!(
                        "weibull requires shape > 0 and scale > 0, got ({shape}, {scale})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Draws one inter-arrival time, clamped to be non-negative.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let value = match *self {
            Distribution::Exponential { rate } => -ln_open_unit(rng) / rate,
            Distribution::Normal { mean, std_dev } => mean + std_dev * standard_normal(rng),
            Distribution::LogNormal { mu, sigma } => (mu + sigma * standard_normal(rng)).exp(),
            Distribution::Gamma { shape, scale } => sample_gamma(rng, shape) * scale,
            Distribution::Weibull { shape, scale } => {
                scale * (-ln_open_unit(rng)).powf(1.0 / shape)
            }
        };
        value.max(0.0)
    }

    /// The theoretical mean inter-arrival time.
    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Exponential { rate } => 1.0 / rate,
            Distribution::Normal { mean, .. } => mean,
            Distribution::LogNormal { mu, sigma } => (mu + 0.5 * sigma * sigma).exp(),
            Distribution::Gamma { shape, scale } => shape * scale,
            Distribution::Weibull { shape, scale } => {
                scale * (ln_gamma(1.0 + 1.0 / shape)).exp()
            }
        }
    }

    /// The arrival rate used to weight origins in pooled-generator mode:
    /// the exponential rate itself, or the reciprocal mean otherwise.
    pub fn rate(&self) -> f64 {
        match *self {
            Distribution::Exponential { rate } => rate,
            _ => 1.0 / self.mean(),
        }
    }
}

/// `ln(U)` with `U` uniform on `(0, 1]`, safe against `ln(0)`.
fn ln_open_unit<R: Rng>(rng: &mut R) -> f64 {
    // `gen` yields [0, 1); flipping the interval makes the log well-defined.
    (1.0 - rng.gen::<f64>()).ln()
}

/// One standard-normal draw via Box–Muller.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Marsaglia–Tsang sampler for a standard gamma with the given shape.
///
/// Shapes below one use the boosting identity
/// `Gamma(k) = Gamma(k + 1) * U^(1/k)`.
fn sample_gamma<R: Rng>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        let boost = rng.gen::<f64>().powf(1.0 / shape);
        return sample_gamma(rng, shape + 1.0) * boost;
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u: f64 = rng.gen();
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Lanczos approximation of `ln(Gamma(x))` for `x > 0`, used for the
/// weibull mean.
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection formula.
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = COEFFS[0];
    for (i, &c) in COEFFS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mean(dist: &Distribution, n: usize) -> f64 {
        let mut rng = XorShiftRng::seed_from_u64(2024);
        (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64
    }

    #[test]
    fn sample_means_match_theory() {
        // 5% relative tolerance over 1e5 samples.
        let cases = [
            Distribution::Exponential { rate: 0.8 },
            Distribution::Normal {
                mean: 4.0,
                std_dev: 0.5,
            },
            Distribution::LogNormal {
                mu: 0.5,
                sigma: 0.4,
            },
            Distribution::Gamma {
                shape: 2.0,
                scale: 1.5,
            },
            Distribution::Gamma {
                shape: 0.5,
                scale: 2.0,
            },
            Distribution::Weibull {
                shape: 1.5,
                scale: 3.0,
            },
        ];
        for dist in &cases {
            let mean = sample_mean(dist, 100_000);
            let expected = dist.mean();
            assert!(
                (mean - expected).abs() / expected < 0.05,
                "{dist:?}: sample mean {mean} vs theoretical {expected}"
            );
        }
    }

    #[test]
    fn samples_are_non_negative() {
        let dist = Distribution::Normal {
            mean: 0.1,
            std_dev: 5.0,
        };
        let mut rng = XorShiftRng::seed_from_u64(7);
        assert!((0..10_000).all(|_| dist.sample(&mut rng) >= 0.0));
    }

    #[test]
    fn rate_is_reciprocal_mean_for_non_exponential() {
        let dist = Distribution::Gamma {
            shape: 2.0,
            scale: 3.0,
        };
        assert!((dist.rate() - 1.0 / 6.0).abs() < 1e-12);
        let dist = Distribution::Exponential { rate: 0.25 };
        assert_eq!(dist.rate(), 0.25);
    }

    #[test]
    fn domains_are_checked() {
        assert!(Distribution::Exponential { rate: 0.0 }.validate("A").is_err());
        assert!(Distribution::Normal {
            mean: 1.0,
            std_dev: -1.0
        }
        .validate("A")
        .is_err());
        assert!(Distribution::Gamma {
            shape: 1.0,
            scale: f64::NAN
        }
        .validate("A")
        .is_err());
        assert!(Distribution::Weibull {
            shape: 2.0,
            scale: 1.0
        }
        .validate("A")
        .is_ok());
    }

    #[test]
    fn ln_gamma_matches_known_values() {
        // Gamma(1) = Gamma(2) = 1, Gamma(5) = 24.
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!(ln_gamma(2.0).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24.0f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn substreams_are_independent_of_each_other() {
        let mut a = RandomStreams::new(42, 3);
        let mut b = RandomStreams::new(42, 3);
        // Consuming one stream does not disturb another.
        let _ = a.choices.gen::<f64>();
        assert_eq!(a.arrivals(1).gen::<u64>(), b.arrivals(1).gen::<u64>());
    }
}
