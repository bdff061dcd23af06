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

//! Scenario builders shared by the end-to-end tests.
#![allow(dead_code)]

use std::collections::HashMap;

use velopolis_core::rng::Distribution;
use velopolis_core::scenario::{
    ArrivalMode, EdgeRecord, KinematicsRecord, NodeRecord, ProfileRecord, Scenario,
};

/// An arrival rate small enough that the origin effectively never fires
/// within a test horizon (the parameter domain requires a positive rate).
pub const SILENT_RATE: f64 = 1e-9;

pub fn node(id: &str, x: f64, y: f64) -> NodeRecord {
    NodeRecord {
        id: id.into(),
        x,
        y,
    }
}

pub fn edge(origin: &str, destination: &str, length: f64, attrs: &[(&str, f64)]) -> EdgeRecord {
    EdgeRecord {
        origin: origin.into(),
        destination: destination.into(),
        length,
        attrs: attrs.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
        bidirectional: false,
    }
}

pub fn profile(id: u32, probability: f64, weights: &[(&str, f64)]) -> ProfileRecord {
    ProfileRecord {
        id,
        probability,
        weights: weights.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
        prefer_smaller: None,
    }
}

pub fn exponential(rate: f64) -> Distribution {
    Distribution::Exponential { rate }
}

pub fn od_row(origin: &str, destinations: &[(&str, f64)]) -> (String, HashMap<String, f64>) {
    (
        origin.to_string(),
        destinations
            .iter()
            .map(|&(d, p)| (d.to_string(), p))
            .collect(),
    )
}

/// A scenario with sensible defaults: fill in nodes/edges and override the
/// rest as needed.
pub fn scenario(nodes: Vec<NodeRecord>, edges: Vec<EdgeRecord>) -> Scenario {
    Scenario {
        nodes,
        edges,
        profiles: vec![],
        od: HashMap::new(),
        distributions: HashMap::new(),
        kinematics: KinematicsRecord {
            v_min: 10.0,
            v_max: 10.0,
            t_sim: 600.0,
            seed: 42,
            retention_secs: 60.0,
            arrival_mode: ArrivalMode::PerOrigin,
        },
    }
}
