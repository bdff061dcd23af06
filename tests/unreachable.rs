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

//! Cyclists drawing an unreachable destination are discarded, counted and
//! never simulated.
mod common;

use common::{edge, exponential, node, od_row, scenario, SILENT_RATE};
use velopolis_core::cyclist::CyclistState;
use velopolis_core::simulation::Simulation;

#[test]
fn unreachable_destinations_are_discarded() {
    // D has no incident edge, yet half of A's demand points at it.
    let mut s = scenario(
        vec![
            node("A", 0.0, 0.0),
            node("B", 100.0, 0.0),
            node("D", 200.0, 0.0),
        ],
        vec![edge("A", "B", 100.0, &[]), edge("B", "A", 100.0, &[])],
    );
    s.kinematics.t_sim = 100.0;
    s.distributions.insert("A".into(), exponential(1.0));
    s.distributions.insert("B".into(), exponential(SILENT_RATE));
    s.distributions.insert("D".into(), exponential(SILENT_RATE));
    s.od.extend([od_row("A", &[("B", 0.5), ("D", 0.5)])]);

    let mut sim = Simulation::new(&s).unwrap();
    sim.run_until(f64::INFINITY);
    let results = sim.results();

    let arrivals = results
        .origins
        .iter()
        .find(|o| o.node == "A")
        .unwrap()
        .arrivals;
    let discarded = results.diagnostics.discarded_unreachable;
    assert!(discarded > 0);

    // Every arrival either became a cyclist or was discarded.
    assert_eq!(arrivals, results.aggregates.nb_generated + discarded);

    // Discards do not appear in the records, and no surviving trip points
    // at D.
    assert_eq!(results.cyclists.len() as u64, results.aggregates.nb_generated);
    assert!(results.cyclists.iter().all(|c| c.destination == "B"));
    assert!(results
        .cyclists
        .iter()
        .filter(|c| c.state == CyclistState::Completed)
        .count() as u64 <= results.aggregates.nb_generated);

    // Roughly half the draws hit D: binomial with p = 0.5 over ~100
    // arrivals, four sigmas wide.
    let share = discarded as f64 / arrivals as f64;
    assert!(
        (0.3..=0.7).contains(&share),
        "discard share was {share} over {arrivals} arrivals"
    );
}
