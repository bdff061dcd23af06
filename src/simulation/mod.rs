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

//! The simulation: all run state and the in-process control surface.
pub mod results;

use anyhow::Result;
use log::{info, warn};
use serde_derive::Serialize;

use self::results::{build_results, build_snapshot, RunningStats, SimulationResults, Snapshot};
use crate::cyclist::{CyclistArena, CyclistState, SlotIndex};
use crate::error::ScenarioError;
use crate::event::{EventContext, EventHandle, EventQueue};
use crate::generator::{ArrivalEvent, PooledArrivalEvent, StopEvent};
use crate::network::state::NetworkState;
use crate::network::CycleNetwork;
use crate::population::Population;
use crate::progress_bar::SimProgressBar;
use crate::rng::{Distribution, RandomStreams};
use crate::router::Router;
use crate::scenario::{ArrivalMode, KinematicsRecord, Scenario};

/// Number of dispatched events between two progress-bar refreshes.
const PROGRESS_UPDATE: usize = 1000;

/// Externally visible state of a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

/// A fully built simulation run.
///
/// All mutable state of the core lives here; there are no ambient globals.
/// The struct is the single in-process API surface: build it from a
/// [`Scenario`], drive it with [`step`](Self::step) /
/// [`run_until`](Self::run_until) / [`run`](Self::run), observe it with
/// [`snapshot`](Self::snapshot) and collect [`results`](Self::results).
#[derive(Debug)]
pub struct Simulation {
    network: CycleNetwork,
    population: Population,
    router: Router,
    kinematics: KinematicsRecord,
    /// Per-node inter-arrival distribution, node-indexed.
    distributions: Vec<Distribution>,
    streams: RandomStreams,
    state: NetworkState,
    cyclists: CyclistArena,
    stats: RunningStats,
    queue: EventQueue,
    arrival_handles: Vec<EventHandle>,
    stop: bool,
    status: Status,
}

impl Simulation {
    /// Builds a simulation with the seed from the scenario.
    pub fn new(scenario: &Scenario) -> Result<Self, ScenarioError> {
        Self::with_seed(scenario, scenario.kinematics.seed)
    }

    /// Builds a simulation, overriding the scenario's seed.
    ///
    /// Validation runs before anything is built, so a failure leaves no
    /// partial state anywhere.
    pub fn with_seed(scenario: &Scenario, seed: u64) -> Result<Self, ScenarioError> {
        scenario.validate()?;
        let network = CycleNetwork::from_records(&scenario.nodes, &scenario.edges)?;
        let population = Population::from_scenario(scenario, &network);
        let mut router = Router::new();
        router.warm_up(&network, &population);

        let distributions: Vec<Distribution> = network
            .graph()
            .node_indices()
            .map(|n| {
                scenario
                    .distributions
                    .get(&network.node(n).id)
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();

        let mut streams = RandomStreams::new(seed, network.nb_nodes());
        let mut stats = RunningStats::new(network.nb_nodes());
        stats.diagnostics.od_rows_normalized = population.od_rows_normalized();
        let mut queue = EventQueue::new();

        // Each generator samples its first inter-arrival up front: sample,
        // wait, then create.
        let arrival_handles = match scenario.kinematics.arrival_mode {
            ArrivalMode::PerOrigin => network
                .graph()
                .node_indices()
                .map(|origin| {
                    let delta =
                        distributions[origin.index()].sample(streams.arrivals(origin.index()));
                    queue.push(Box::new(ArrivalEvent::new(origin, delta)))
                })
                .collect(),
            ArrivalMode::Pooled => {
                let rates = PooledArrivalEvent::rate_table(&distributions);
                let origin = PooledArrivalEvent::draw_origin(&rates, &mut streams.choices);
                let delta = distributions[origin.index()].sample(&mut streams.pooled);
                vec![queue.push(Box::new(PooledArrivalEvent::new(origin, delta, rates)))]
            }
        };
        queue.push(Box::new(StopEvent::new(scenario.kinematics.t_sim)));

        Ok(Simulation {
            state: NetworkState::new(network.nb_edges()),
            cyclists: CyclistArena::new(scenario.kinematics.retention_secs),
            kinematics: scenario.kinematics.clone(),
            network,
            population,
            router,
            distributions,
            streams,
            stats,
            queue,
            arrival_handles,
            stop: false,
            status: Status::Idle,
        })
    }

    /// Rebuilds all derived state from a scenario and seed: queues cleared,
    /// clock back to zero. On error the previous state is left untouched.
    pub fn reset(&mut self, scenario: &Scenario, seed: u64) -> Result<(), ScenarioError> {
        *self = Self::with_seed(scenario, seed)?;
        Ok(())
    }

    /// The current simulated time, in seconds.
    pub fn now(&self) -> f64 {
        self.queue.now()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Number of cyclists currently being simulated.
    pub fn nb_active(&self) -> usize {
        self.cyclists.nb_active()
    }

    /// Dispatches one event. Returns the clock and the number of active
    /// cyclists afterwards. A paused simulation dispatches nothing; an
    /// empty queue completes the run and leaves the clock unchanged.
    pub fn step(&mut self) -> (f64, usize) {
        if self.status == Status::Paused || self.status == Status::Completed {
            return (self.queue.now(), self.cyclists.nb_active());
        }
        let event = match self.queue.pop() {
            Some(event) => event,
            None => {
                self.status = Status::Completed;
                return (self.queue.now(), self.cyclists.nb_active());
            }
        };
        if self.status == Status::Idle {
            self.status = Status::Running;
        }
        let slot = event.cyclist();
        let Simulation {
            network,
            state,
            population,
            router,
            cyclists,
            streams,
            stats,
            kinematics,
            distributions,
            arrival_handles,
            stop,
            queue,
            ..
        } = self;
        let mut ctx = EventContext {
            network,
            state,
            population,
            router,
            cyclists,
            streams,
            stats,
            kinematics,
            distributions: distributions.as_slice(),
            arrival_handles,
            stop,
        };
        if let Err(error) = event.execute(&mut ctx, queue) {
            match slot {
                Some(slot) => {
                    // A failing trip continuation terminates that cyclist
                    // only; the scheduler continues.
                    warn!("trip continuation failed: {error:#}");
                    self.stats.diagnostics.agent_failures += 1;
                    self.force_fail(slot);
                }
                None => {
                    warn!("scheduler event failed: {error:#}");
                    self.status = Status::Failed;
                }
            }
        }
        if self.status != Status::Failed && self.queue.next_time().is_none() {
            self.status = Status::Completed;
        }
        (self.queue.now(), self.cyclists.nb_active())
    }

    /// Forces a cyclist out of the simulation at its current position.
    fn force_fail(&mut self, slot: SlotIndex) {
        let now = self.queue.now();
        let id = self.cyclists.get(slot).id;
        if self.cyclists.get(slot).is_retired() {
            return;
        }
        let _ = self.state.force_remove(id, now);
        let cyclist = self.cyclists.get_mut(slot);
        cyclist.state = CyclistState::Completed;
        cyclist.total_time_secs = Some(now - cyclist.start_time_secs);
        self.stats.commit(self.cyclists.get(slot), &self.network);
        self.cyclists.retire(slot, now);
    }

    /// Dispatches events until the clock would pass `t_end` or the queue is
    /// drained.
    pub fn run_until(&mut self, t_end: f64) -> (f64, usize) {
        loop {
            if self.status == Status::Paused || self.status == Status::Failed {
                break;
            }
            match self.queue.next_time() {
                Some(time) if time <= t_end => {
                    self.step();
                }
                Some(_) => break,
                None => {
                    self.status = Status::Completed;
                    break;
                }
            }
        }
        (self.queue.now(), self.cyclists.nb_active())
    }

    /// Runs to completion: the termination process fires at `T_sim`,
    /// arrivals stop and the live agents drain.
    pub fn run(&mut self) -> Result<()> {
        let bar = SimProgressBar::new(self.kinematics.t_sim);
        let mut nb_events: usize = 0;
        loop {
            if self.status == Status::Paused || self.status == Status::Failed {
                break;
            }
            if self.queue.next_time().is_none() {
                self.status = Status::Completed;
                break;
            }
            let (now, active) = self.step();
            nb_events += 1;
            if nb_events % PROGRESS_UPDATE == 0 {
                bar.set_position(now);
                bar.set_message(format!("{active} active"));
            }
        }
        bar.finish();
        info!(
            "dispatched {} events; {} cyclists generated, {} completed",
            nb_events,
            self.cyclists.nb_created(),
            self.stats.nb_completed()
        );
        Ok(())
    }

    /// Raises the cooperative stop flag and cancels the pending arrivals.
    /// Live agents drain on their next resume.
    pub fn stop(&mut self) {
        self.stop = true;
        for handle in self.arrival_handles.drain(..) {
            self.queue.cancel(handle);
        }
    }

    pub fn pause(&mut self) {
        if self.status == Status::Running || self.status == Status::Idle {
            self.status = Status::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == Status::Paused {
            self.status = Status::Running;
        }
    }

    /// Read-only view of the live state.
    pub fn snapshot(&self) -> Snapshot {
        build_snapshot(
            &self.stats,
            &self.network,
            &self.state,
            &self.cyclists,
            self.queue.now(),
            self.status,
        )
    }

    /// The result arrays; coherent at any point of the run.
    pub fn results(&self) -> SimulationResults {
        build_results(
            &self.stats,
            &self.network,
            &self.state,
            &self.cyclists,
            self.queue.now(),
            self.status,
        )
    }

    /// Occupancy bookkeeping view, used by the property tests.
    pub fn network_state(&self) -> &NetworkState {
        &self.state
    }
}
