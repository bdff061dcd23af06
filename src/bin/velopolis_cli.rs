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

//! Binary to run a Velopolis-Core simulation from a scenario file.
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Velopolis-Core: an event-based multi-agent simulator for cycling
/// networks.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON file with the scenario
    #[arg(required = true)]
    scenario: PathBuf,
    /// Directory where the results and logs are written
    #[arg(short, long, default_value = "output")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    velopolis_core::run_simulation(&args.scenario, &args.output)
}
