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

//! The scenario record shapes consumed by the core.
//!
//! These are the logical records of the external-loader contract: nodes,
//! directed edges with free-form numeric attributes, an optional cyclist-type
//! mix, an optional origin-destination matrix, per-node arrival distributions
//! and the kinematic parameters. [`Scenario::validate`] checks everything
//! up front so that a failed reset leaves no partial state behind.
use std::collections::HashMap;

use hashbrown::HashSet;
use schemars::JsonSchema;
use serde_derive::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::rng::Distribution;

/// Tolerance on probability masses (profile mix, O-D rows) before
/// normalization.
pub const MASS_TOLERANCE: f64 = 1e-2;

/// A network node: a named point of the cycling network.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Node")]
pub struct NodeRecord {
    /// Unique identifier.
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// A directed cycle-path segment between two nodes.
///
/// A bidirectional segment can either be given as two records (preferred;
/// the two directions are independent) or as a single record with
/// `bidirectional: true`, in which case the reverse edge is materialized
/// with copied attributes.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Edge")]
pub struct EdgeRecord {
    pub origin: String,
    pub destination: String,
    /// Physical length in meters, > 0.
    pub length: f64,
    /// Free-form numeric attributes (`grade`, `safety`, `lighting`, ...).
    #[serde(default)]
    pub attrs: HashMap<String, f64>,
    #[serde(default)]
    pub bidirectional: bool,
}

/// A cyclist type: a selection probability and per-attribute importances
/// used by the router.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Profile")]
pub struct ProfileRecord {
    pub id: u32,
    /// Selection probability in `[0, 1]`; the mix is normalized on load.
    pub probability: f64,
    /// Attribute name -> importance. Only attributes present in the edge
    /// set participate in routing.
    pub weights: HashMap<String, f64>,
    /// Attributes for which a smaller value is preferred (their normalized
    /// value is inverted in the composite weight). Defaults to
    /// `["length", "grade"]`.
    #[serde(default)]
    pub prefer_smaller: Option<Vec<String>>,
}

/// How new cyclists are generated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalMode {
    /// One perpetual generator per origin node (preferred).
    #[default]
    PerOrigin,
    /// A single generator drawing the origin proportionally to each
    /// origin's arrival rate. Stochastically equivalent for exponential
    /// arrivals.
    Pooled,
}

fn default_retention() -> f64 {
    60.0
}

/// Kinematic parameters and run control.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Kinematics")]
pub struct KinematicsRecord {
    /// Lower bound of the base-speed draw, m/s. Must satisfy
    /// `0 < v_min <= v_max`.
    pub v_min: f64,
    /// Upper bound of the base-speed draw, m/s.
    pub v_max: f64,
    /// Simulated duration, seconds.
    pub t_sim: f64,
    /// Master seed for all random substreams.
    pub seed: u64,
    /// How long a completed cyclist slot is kept before it may be recycled,
    /// seconds.
    #[serde(default = "default_retention")]
    pub retention_secs: f64,
    #[serde(default)]
    pub arrival_mode: ArrivalMode,
}

/// A full scenario: everything the core needs for one run.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[schemars(title = "Scenario")]
pub struct Scenario {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    /// Cyclist-type mix. When empty, every cyclist uses the default
    /// length-only profile.
    #[serde(default)]
    pub profiles: Vec<ProfileRecord>,
    /// Origin id -> destination id -> probability. Rows are normalized on
    /// load and the diagonal is forced to zero. When absent, destinations
    /// are drawn uniformly over the other nodes.
    #[serde(default)]
    pub od: HashMap<String, HashMap<String, f64>>,
    /// Per-node inter-arrival distribution. Nodes without an entry default
    /// to `exponential(rate = 0.5)`.
    #[serde(default)]
    pub distributions: HashMap<String, Distribution>,
    pub kinematics: KinematicsRecord,
}

impl Scenario {
    /// Checks the whole scenario; returns the first violation found.
    ///
    /// O-D rows that do not sum to one are *not* an error here: they are
    /// normalized on load with a warning (see
    /// [`Population`](crate::population::Population)). Rows with negative,
    /// non-finite or all-zero mass are rejected.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.nodes.len() < 2 {
            return Err(ScenarioError::Empty {
                kind: "nodes",
                minimum: 2,
                got: self.nodes.len(),
            });
        }
        if self.edges.is_empty() {
            return Err(ScenarioError::Empty {
                kind: "edges",
                minimum: 1,
                got: 0,
            });
        }
        let mut ids: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(&node.id) {
                return Err(ScenarioError::DuplicateNode(node.id.clone()));
            }
        }
        let known = |id: &str| ids.contains(id);

        for edge in &self.edges {
            for endpoint in [&edge.origin, &edge.destination] {
                if !known(endpoint) {
                    return Err(ScenarioError::UnknownNode {
                        id: endpoint.clone(),
                        context: "an edge",
                    });
                }
            }
            if !(edge.length > 0.0 && edge.length.is_finite()) {
                return Err(ScenarioError::NonPositiveLength {
                    origin: edge.origin.clone(),
                    destination: edge.destination.clone(),
                    length: edge.length,
                });
            }
            for (name, value) in &edge.attrs {
                if !value.is_finite() {
                    return Err(ScenarioError::NonFiniteAttribute {
                        origin: edge.origin.clone(),
                        destination: edge.destination.clone(),
                        attribute: name.clone(),
                    });
                }
            }
        }

        if !self.profiles.is_empty() {
            let mut mass = 0.0;
            for profile in &self.profiles {
                if !(0.0..=1.0).contains(&profile.probability) {
                    return Err(ScenarioError::InvalidProbability {
                        id: profile.id,
                        probability: profile.probability,
                    });
                }
                mass += profile.probability;
                for (name, weight) in &profile.weights {
                    if !weight.is_finite() {
                        return Err(ScenarioError::NonFiniteWeight {
                            id: profile.id,
                            attribute: name.clone(),
                        });
                    }
                }
            }
            if (mass - 1.0).abs() > MASS_TOLERANCE {
                return Err(ScenarioError::ProfileMass { sum: mass });
            }
        }

        for (origin, row) in &self.od {
            if !known(origin) {
                return Err(ScenarioError::UnknownNode {
                    id: origin.clone(),
                    context: "an O-D row",
                });
            }
            let mut mass = 0.0;
            for (destination, p) in row {
                if !known(destination) {
                    return Err(ScenarioError::UnknownNode {
                        id: destination.clone(),
                        context: "an O-D row",
                    });
                }
                if !(p.is_finite() && *p >= 0.0) {
                    return Err(ScenarioError::BadOdRow {
                        origin: origin.clone(),
                        reason: format!("probability for `{destination}` is {p}"),
                    });
                }
                if destination != origin {
                    mass += p;
                }
            }
            if mass <= 0.0 {
                return Err(ScenarioError::BadOdRow {
                    origin: origin.clone(),
                    reason: "the row has no off-diagonal mass".to_owned(),
                });
            }
        }

        for (node, dist) in &self.distributions {
            if !known(node) {
                return Err(ScenarioError::UnknownNode {
                    id: node.clone(),
                    context: "a distribution",
                });
            }
            dist.validate(node)?;
        }

        let k = &self.kinematics;
        if !(k.v_min > 0.0 && k.v_min.is_finite() && k.v_max.is_finite() && k.v_min <= k.v_max) {
            return Err(ScenarioError::BadKinematics(format!(
                "requires 0 < v_min <= v_max, got ({}, {})",
                k.v_min, k.v_max
            )));
        }
        if !(k.t_sim > 0.0 && k.t_sim.is_finite()) {
            return Err(ScenarioError::BadKinematics(format!(
                "t_sim must be positive, got {}",
                k.t_sim
            )));
        }
        if !(k.retention_secs >= 0.0 && k.retention_secs.is_finite()) {
            return Err(ScenarioError::BadKinematics(format!(
                "retention_secs must be non-negative, got {}",
                k.retention_secs
            )));
        }
        Ok(())
    }
}
