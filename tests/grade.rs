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

//! Uphill/downhill asymmetry between the two directions of a segment.
mod common;

use common::{edge, exponential, node, od_row, scenario};
use velopolis_core::cyclist::CyclistState;
use velopolis_core::simulation::Simulation;

#[test]
fn grade_shapes_edge_times_per_direction() {
    // One 100 m segment: +10% uphill from U to V, -10% downhill back.
    // For a base speed v0, the uphill edge takes 100 / (0.9 v0) and the
    // downhill edge 100 / (1.1 v0), a ratio of 1.1 / 0.9 = 1.222...
    // (both speeds clamped to the configured band first).
    let mut s = scenario(
        vec![node("U", 0.0, 0.0), node("V", 100.0, 0.0)],
        vec![
            edge("U", "V", 100.0, &[("grade", 10.0)]),
            edge("V", "U", 100.0, &[("grade", -10.0)]),
        ],
    );
    s.kinematics.v_min = 2.0;
    s.kinematics.v_max = 20.0;
    s.kinematics.t_sim = 200.0;
    s.distributions.insert("U".into(), exponential(0.2));
    s.distributions.insert("V".into(), exponential(0.2));
    s.od.extend([od_row("U", &[("V", 1.0)]), od_row("V", &[("U", 1.0)])]);

    let mut sim = Simulation::new(&s).unwrap();
    sim.run_until(f64::INFINITY);
    let results = sim.results();

    let completed: Vec<_> = results
        .cyclists
        .iter()
        .filter(|c| c.state == CyclistState::Completed)
        .collect();
    assert!(completed.len() > 10, "only {} trips completed", completed.len());

    let mut saw_uphill = false;
    let mut saw_downhill = false;
    for cyclist in completed {
        let factor = match cyclist.origin.as_str() {
            "U" => {
                saw_uphill = true;
                0.9
            }
            _ => {
                saw_downhill = true;
                1.1
            }
        };
        let v_grade = (cyclist.base_speed_ms * factor).clamp(2.0, 20.0);
        let expected = 100.0 / v_grade;
        let actual = cyclist.total_time_secs.unwrap();
        assert!(
            (actual - expected).abs() < 1e-9,
            "cyclist {:?} ({} -> {}, v0 = {}): took {actual}, expected {expected}",
            cyclist.id,
            cyclist.origin,
            cyclist.destination,
            cyclist.base_speed_ms
        );
        assert_eq!(cyclist.per_edge_secs.len(), 1);
        assert_eq!(cyclist.total_distance_m, 100.0);
    }
    assert!(saw_uphill && saw_downhill);
}

#[test]
fn extreme_grades_are_capped() {
    // A 60% wall still only halves the speed, and a -60% drop only adds
    // 30%.
    let mut s = scenario(
        vec![node("U", 0.0, 0.0), node("V", 100.0, 0.0)],
        vec![
            edge("U", "V", 100.0, &[("grade", 60.0)]),
            edge("V", "U", 100.0, &[("grade", -60.0)]),
        ],
    );
    s.kinematics.v_min = 1.0;
    s.kinematics.v_max = 20.0;
    s.kinematics.t_sim = 100.0;
    s.distributions.insert("U".into(), exponential(0.5));
    s.distributions.insert("V".into(), exponential(0.5));
    s.od.extend([od_row("U", &[("V", 1.0)]), od_row("V", &[("U", 1.0)])]);

    let mut sim = Simulation::new(&s).unwrap();
    sim.run_until(f64::INFINITY);

    for cyclist in sim
        .results()
        .cyclists
        .iter()
        .filter(|c| c.state == CyclistState::Completed)
    {
        let factor = if cyclist.origin == "U" { 0.5 } else { 1.3 };
        let expected = 100.0 / (cyclist.base_speed_ms * factor).clamp(1.0, 20.0);
        let actual = cyclist.total_time_secs.unwrap();
        assert!((actual - expected).abs() < 1e-9);
    }
}
