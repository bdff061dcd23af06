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

//! Velopolis-Core: an event-based multi-agent simulator core for cycling
//! networks.
//!
//! Given a directed network of cycle-path segments (distance, grade,
//! safety, lighting), a population model (per-origin arrival processes,
//! cyclist-type mix, origin-destination matrix) and kinematic parameters,
//! the core simulates every cyclist from birth to trip completion:
//! profile and destination choice, composite-weight routing, grade- and
//! congestion-aware edge traversal, and exact per-edge utilization
//! statistics.
#![doc(html_no_source)]

pub mod cyclist;
pub mod error;
pub mod event;
pub mod generator;
pub mod io;
pub mod kinematics;
pub mod logging;
pub mod network;
pub mod population;
pub mod process;
pub mod progress_bar;
pub mod rng;
pub mod router;
pub mod scenario;
pub mod simulation;

use std::path::Path;

use anyhow::{Context, Result};
// Dependencies only used in the bins.
use clap as _;
use log::info;

use crate::simulation::Simulation;

/// Deserializes a scenario, runs it to completion and stores the results to
/// the given output directory.
pub fn run_simulation(scenario_path: &Path, output_dir: &Path) -> Result<()> {
    println!(
        "
        Velopolis-Core v{}
        Copyright (C) 2025 André de Palma, Lucas Javaudin
        This program comes with ABSOLUTELY NO WARRANTY.
        This is free software, and you are welcome to redistribute it
        under certain conditions; see `https://www.gnu.org/licenses/' for details.
        ",
        env!("CARGO_PKG_VERSION")
    );
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory `{output_dir:?}`"))?;
    logging::initialize_logging(output_dir)?;

    let scenario = io::json::get_scenario_from_json(scenario_path)?;
    info!(
        "loaded scenario: {} nodes, {} edge records, {} profiles",
        scenario.nodes.len(),
        scenario.edges.len(),
        scenario.profiles.len()
    );
    let mut simulation = Simulation::new(&scenario).context("Invalid scenario")?;
    info!("running until t = {}s", scenario.kinematics.t_sim);
    simulation.run()?;

    info!("saving results");
    io::json::write_json(&simulation.results(), output_dir, "results")?;
    info!("done");
    Ok(())
}
