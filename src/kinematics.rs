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

//! The kinematic model for one edge traversal.
//!
//! Three independent factors shape a traversal:
//!
//! - the **grade factor** scales the cyclist's base speed (uphill slows,
//!   downhill speeds up, both capped),
//! - the **time-dilation factor** scales the elapsed edge time according to
//!   perceived safety and lighting,
//! - the **density factor** scales speed down once a directed edge holds
//!   more cyclists than its capacity.

/// Nominal duration of one interpolation micro-step, in seconds.
pub const MICRO_STEP_SECS: f64 = 0.5;

/// Upper bound on the number of micro-steps per edge.
pub const MAX_MICRO_STEPS: usize = 200;

/// Uphill speed reduction is capped at 50%.
const MAX_UPHILL_PCT: f64 = 50.0;

/// Downhill speed increase is capped at 30%.
const MAX_DOWNHILL_PCT: f64 = 30.0;

/// Speed multiplier for a grade given in percent (positive = uphill in the
/// travel direction). The result lies in `[0.5, 1.3]`.
pub fn grade_speed_factor(grade_pct: f64) -> f64 {
    if grade_pct > 0.0 {
        1.0 - grade_pct.min(MAX_UPHILL_PCT) / 100.0
    } else if grade_pct < 0.0 {
        1.0 + (-grade_pct).min(MAX_DOWNHILL_PCT) / 100.0
    } else {
        1.0
    }
}

/// Multiplier on the elapsed edge time from perceived safety and lighting.
///
/// A missing attribute contributes a neutral factor. The combined factor is
/// clamped to `[0.5, 2.0]`.
pub fn time_dilation_factor(safety: Option<f64>, lighting: Option<f64>) -> f64 {
    // Safety 5 -> 1.3, safety 9 -> 0.8.
    let safety_factor = safety.map_or(1.0, |s| 1.3 - (s - 5.0) * 0.125);
    // Lighting 4 -> 1.2, lighting 8 -> 0.9.
    let lighting_factor = lighting.map_or(1.0, |l| 1.2 - (l - 4.0) * 0.075);
    (safety_factor * lighting_factor).clamp(0.5, 2.0)
}

/// Speed multiplier from the current occupancy of a directed edge.
///
/// Capacity is advisory: overshooting it degrades speed but never blocks
/// entry. The factor is `1` up to capacity, then `capacity / occupancy`
/// floored at `0.1`.
pub fn density_factor(occupancy: usize, capacity: usize) -> f64 {
    if occupancy <= capacity {
        1.0
    } else {
        (capacity as f64 / occupancy as f64).max(0.1)
    }
}

/// The micro-step subdivision of a traversal (or of its remainder).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraversalPlan {
    /// Number of micro-steps.
    pub steps: usize,
    /// Duration of each micro-step, in seconds.
    pub dt_secs: f64,
}

/// Subdivides a traversal of duration `time_secs` into between 1 and
/// [`MAX_MICRO_STEPS`] micro-steps of roughly [`MICRO_STEP_SECS`] each.
pub fn plan_traversal(time_secs: f64) -> TraversalPlan {
    let steps = ((time_secs / MICRO_STEP_SECS).round() as i64)
        .clamp(1, MAX_MICRO_STEPS as i64) as usize;
    TraversalPlan {
        steps,
        dt_secs: time_secs / steps as f64,
    }
}

/// Nominal traversal time of an edge: `length * phi / (v_grade * rho)`.
pub fn edge_time_secs(length_m: f64, phi: f64, v_grade: f64, rho: f64) -> f64 {
    length_m * phi / (v_grade * rho)
}
