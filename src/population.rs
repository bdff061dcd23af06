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

//! The population model: cyclist-type mix and destination choice.
//!
//! Profiles are resolved against the network's attribute vocabulary at load
//! time: only attributes that exist in the edge set participate, and a
//! profile whose weights all miss falls back to length-only. O-D rows are
//! normalized here (with a warning when they deviate from one, per the
//! loader contract) and turned into cumulative tables so a draw is a single
//! uniform variate.
use log::warn;
use petgraph::graph::NodeIndex;
use rand::Rng;

use crate::network::CycleNetwork;
use crate::scenario::{Scenario, MASS_TOLERANCE};

/// Attributes inverted by default when a profile does not say otherwise:
/// shorter and flatter are preferred.
const DEFAULT_PREFER_SMALLER: [&str; 2] = ["length", "grade"];

/// A resolved cyclist profile.
#[derive(Clone, Debug)]
pub struct Profile {
    pub id: u32,
    /// Normalized selection probability.
    pub probability: f64,
    /// `(attribute, importance, inverted)` for every attribute present in
    /// both the profile and the edge set.
    pub weights: Vec<ProfileWeight>,
}

#[derive(Clone, Copy, Debug)]
pub struct ProfileWeight {
    pub attr: crate::network::AttrId,
    pub importance: f64,
    /// `true` when a smaller raw value is preferred (length, grade by
    /// default). Higher-is-better attributes get their normalized value
    /// inverted so that the composite weight is a cost in both cases.
    pub prefer_smaller: bool,
}

/// Profile mix and O-D matrix, resolved to network indices.
#[derive(Clone, Debug)]
pub struct Population {
    profiles: Vec<Profile>,
    /// Cumulative profile probabilities.
    cumulative: Vec<f64>,
    /// Per-origin cumulative destination table, or `None` for origins
    /// without a configured row.
    od_rows: Vec<Option<Vec<(NodeIndex, f64)>>>,
    /// Number of O-D rows that had to be re-normalized on load.
    od_rows_normalized: u32,
    nb_nodes: usize,
}

impl Population {
    /// Resolves the scenario's profiles and O-D matrix against the network.
    /// The scenario is assumed validated.
    pub fn from_scenario(scenario: &Scenario, network: &CycleNetwork) -> Self {
        let profiles = resolve_profiles(scenario, network);
        let mut cumulative = Vec::with_capacity(profiles.len());
        let mut acc = 0.0;
        for profile in &profiles {
            acc += profile.probability;
            cumulative.push(acc);
        }

        let mut od_rows = vec![None; network.nb_nodes()];
        let mut od_rows_normalized = 0;
        for (origin_id, row) in &scenario.od {
            let origin = match network.node_by_id(origin_id) {
                Some(index) => index,
                None => continue,
            };
            // Diagonal forced to zero; the remaining mass is renormalized.
            let mut entries: Vec<(NodeIndex, f64)> = row
                .iter()
                .filter(|(destination, _)| destination.as_str() != origin_id.as_str())
                .filter_map(|(destination, &p)| {
                    network.node_by_id(destination).map(|index| (index, p))
                })
                .collect();
            // Sort by node index so that the cumulative table, and therefore
            // the draws, do not depend on hash-map iteration order.
            entries.sort_by_key(|(index, _)| index.index());
            let mass: f64 = entries.iter().map(|(_, p)| p).sum();
            if (mass - 1.0).abs() > MASS_TOLERANCE {
                warn!(
                    "O-D row for `{origin_id}` sums to {mass:.4}; normalizing to 1"
                );
                od_rows_normalized += 1;
            }
            let mut acc = 0.0;
            for (_, p) in entries.iter_mut() {
                acc += *p / mass;
                *p = acc;
            }
            od_rows[origin.index()] = Some(entries);
        }

        Population {
            profiles,
            cumulative,
            od_rows,
            od_rows_normalized,
            nb_nodes: network.nb_nodes(),
        }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn od_rows_normalized(&self) -> u32 {
        self.od_rows_normalized
    }

    /// Draws a profile from the mix.
    pub fn draw_profile<R: Rng>(&self, rng: &mut R) -> &Profile {
        let u: f64 = rng.gen();
        let position = self
            .cumulative
            .iter()
            .position(|&c| u < c)
            .unwrap_or(self.profiles.len() - 1);
        &self.profiles[position]
    }

    /// Draws a destination for a cyclist born at `origin`: from the O-D row
    /// when one is configured, uniformly over the other nodes otherwise.
    /// Returns `None` only when the network has no other node.
    pub fn draw_destination<R: Rng>(&self, origin: NodeIndex, rng: &mut R) -> Option<NodeIndex> {
        if let Some(row) = &self.od_rows[origin.index()] {
            let u: f64 = rng.gen();
            let position = row
                .iter()
                .position(|&(_, c)| u < c)
                .unwrap_or(row.len() - 1);
            return Some(row[position].0);
        }
        if self.nb_nodes < 2 {
            return None;
        }
        let mut pick = rng.gen_range(0..self.nb_nodes - 1);
        if pick >= origin.index() {
            pick += 1;
        }
        Some(NodeIndex::new(pick))
    }
}

fn resolve_profiles(scenario: &Scenario, network: &CycleNetwork) -> Vec<Profile> {
    let length_only = |id: u32, probability: f64| Profile {
        id,
        probability,
        weights: vec![ProfileWeight {
            attr: network.length_attr(),
            importance: 1.0,
            prefer_smaller: true,
        }],
    };
    if scenario.profiles.is_empty() {
        return vec![length_only(0, 1.0)];
    }
    let mass: f64 = scenario.profiles.iter().map(|p| p.probability).sum();
    scenario
        .profiles
        .iter()
        .map(|record| {
            let prefer_smaller: Vec<&str> = record
                .prefer_smaller
                .as_ref()
                .map(|list| list.iter().map(String::as_str).collect())
                .unwrap_or_else(|| DEFAULT_PREFER_SMALLER.to_vec());
            let mut weights: Vec<ProfileWeight> = record
                .weights
                .iter()
                .filter_map(|(name, &importance)| {
                    network.vocabulary().id(name).map(|attr| ProfileWeight {
                        attr,
                        importance,
                        prefer_smaller: prefer_smaller.contains(&name.as_str()),
                    })
                })
                .collect();
            // Stable composite weights regardless of map iteration order.
            weights.sort_by_key(|w| w.attr);
            if weights.is_empty() {
                return length_only(record.id, record.probability / mass);
            }
            Profile {
                id: record.id,
                probability: record.probability / mass,
                weights,
            }
        })
        .collect()
}
