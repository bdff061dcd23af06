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

//! Typed errors returned when a scenario fails validation.
use thiserror::Error;

/// Error raised when a scenario cannot be turned into a runnable simulation.
///
/// All variants are raised before any simulation state is replaced, so a
/// failed [`reset`](crate::simulation::Simulation::reset) leaves the previous
/// state untouched.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("the scenario must have at least {minimum} {kind}, got {got}")]
    Empty {
        kind: &'static str,
        minimum: usize,
        got: usize,
    },
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),
    #[error("node id `{id}` is referenced by {context} but is not part of the node set")]
    UnknownNode { id: String, context: &'static str },
    #[error("edge `{origin}` -> `{destination}`: length must be positive and finite, got {length}")]
    NonPositiveLength {
        origin: String,
        destination: String,
        length: f64,
    },
    #[error("edge `{origin}` -> `{destination}`: attribute `{attribute}` is not finite")]
    NonFiniteAttribute {
        origin: String,
        destination: String,
        attribute: String,
    },
    #[error("profile {id}: probability must be in [0, 1], got {probability}")]
    InvalidProbability { id: u32, probability: f64 },
    #[error("profile {id}: weight for `{attribute}` is not finite")]
    NonFiniteWeight { id: u32, attribute: String },
    #[error("the profile probabilities sum to {sum}, too far from 1 to normalize")]
    ProfileMass { sum: f64 },
    #[error("O-D row for `{origin}`: {reason}")]
    BadOdRow { origin: String, reason: String },
    #[error("distribution for node `{node}`: {reason}")]
    BadDistribution { node: String, reason: String },
    #[error("kinematics: {0}")]
    BadKinematics(String),
}
