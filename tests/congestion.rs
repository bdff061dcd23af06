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

//! Congestion is directional: a flooded direction slows down while the
//! opposite direction stays free-flowing.
mod common;

use common::{edge, exponential, node, od_row, scenario};
use velopolis_core::cyclist::CyclistState;
use velopolis_core::simulation::Simulation;

#[test]
fn congestion_is_per_direction() {
    // One 100 m segment (capacity floor(100 / 2.5) = 40 per direction).
    // U floods its direction with 10 arrivals/s; V sends a trickle the
    // other way. Fixed base speed of 5 m/s.
    let mut s = scenario(
        vec![node("U", 0.0, 0.0), node("V", 100.0, 0.0)],
        vec![edge("U", "V", 100.0, &[]), edge("V", "U", 100.0, &[])],
    );
    s.kinematics.v_min = 5.0;
    s.kinematics.v_max = 5.0;
    s.kinematics.t_sim = 300.0;
    s.distributions.insert("U".into(), exponential(10.0));
    s.distributions.insert("V".into(), exponential(0.1));
    s.od.extend([od_row("U", &[("V", 1.0)]), od_row("V", &[("U", 1.0)])]);

    let mut sim = Simulation::new(&s).unwrap();

    // With 10 arrivals/s on a 20 s free-flow trip the occupancy blows past
    // the capacity of 40 within a few seconds.
    sim.run_until(60.0);
    let uv_occupancy = sim
        .snapshot()
        .edges
        .iter()
        .find(|e| e.origin == "U")
        .unwrap()
        .occupancy;
    assert!(
        uv_occupancy > 40,
        "expected saturation, occupancy was {uv_occupancy}"
    );

    sim.run_until(f64::INFINITY);
    let results = sim.results();

    let speeds = |origin: &str| -> Vec<f64> {
        results
            .cyclists
            .iter()
            .filter(|c| c.state == CyclistState::Completed && c.origin == origin)
            .map(|c| c.observed_speed_ms.unwrap())
            .collect()
    };
    let uv = speeds("U");
    let vu = speeds("V");
    assert!(!uv.is_empty() && !vu.is_empty());

    let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
    let mean_uv = mean(&uv);
    let mean_vu = mean(&vu);

    // The trickle direction never congests: every trip runs at exactly the
    // base speed. The flooded direction is strictly slower.
    assert!(
        vu.iter().all(|&v| (v - 5.0).abs() < 1e-9),
        "V -> U saw congestion"
    );
    assert!(mean_uv < 5.0, "U -> V mean speed {mean_uv} not degraded");
    assert!(mean_uv < mean_vu);

    // The density factor never pushes speed below the 0.1 floor.
    assert!(uv.iter().all(|&v| v >= 5.0 * 0.1 - 1e-9));
}
