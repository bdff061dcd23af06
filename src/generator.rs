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

//! Arrival generators and the termination process.
//!
//! In per-origin mode every origin node runs its own perpetual generator:
//! fire, birth a cyclist, sample the next inter-arrival from the origin's
//! distribution, reschedule. In pooled mode a single generator first draws
//! the origin proportionally to each origin's arrival rate and then samples
//! that origin's distribution; for exponential arrivals the two forms are
//! stochastically equivalent. The termination process fires once at `T_sim`,
//! raises the cooperative stop flag and cancels the pending arrivals, after
//! which live agents drain on their next resume.
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};
use petgraph::graph::NodeIndex;
use rand::Rng;

use crate::cyclist::{Cyclist, CyclistState};
use crate::event::{Event, EventContext, EventQueue};
use crate::process::TripEvent;

/// One origin's perpetual arrival process.
#[derive(Debug)]
pub struct ArrivalEvent {
    at_time: f64,
    origin: NodeIndex,
}

impl ArrivalEvent {
    pub fn new(origin: NodeIndex, at_time: f64) -> Self {
        ArrivalEvent { at_time, origin }
    }
}

impl Event for ArrivalEvent {
    fn execute(mut self: Box<Self>, ctx: &mut EventContext, queue: &mut EventQueue) -> Result<()> {
        if *ctx.stop {
            return Ok(());
        }
        let now = self.at_time;
        spawn_cyclist(ctx, queue, self.origin, now);
        let delta = ctx.distributions[self.origin.index()]
            .sample(ctx.streams.arrivals(self.origin.index()));
        let origin = self.origin;
        self.at_time = now + delta;
        let handle = queue.push(self);
        ctx.arrival_handles[origin.index()] = handle;
        Ok(())
    }

    fn time(&self) -> f64 {
        self.at_time
    }
}

/// The single-generator alternative: origins are drawn by arrival-rate
/// proportion, one at a time.
#[derive(Debug)]
pub struct PooledArrivalEvent {
    at_time: f64,
    /// Origin drawn when this firing was scheduled.
    origin: NodeIndex,
    /// Cumulative arrival-rate table over all origins.
    rates: Arc<Vec<(NodeIndex, f64)>>,
}

impl PooledArrivalEvent {
    /// Builds the cumulative rate table: `r_o / sum(r)` per origin.
    pub fn rate_table(distributions: &[crate::rng::Distribution]) -> Arc<Vec<(NodeIndex, f64)>> {
        let total: f64 = distributions.iter().map(|d| d.rate()).sum();
        let mut acc = 0.0;
        Arc::new(
            distributions
                .iter()
                .enumerate()
                .map(|(index, dist)| {
                    acc += dist.rate() / total;
                    (NodeIndex::new(index), acc)
                })
                .collect(),
        )
    }

    pub fn new(origin: NodeIndex, at_time: f64, rates: Arc<Vec<(NodeIndex, f64)>>) -> Self {
        PooledArrivalEvent {
            at_time,
            origin,
            rates,
        }
    }

    /// Draws the next origin by rate proportion.
    pub fn draw_origin<R: Rng>(rates: &[(NodeIndex, f64)], rng: &mut R) -> NodeIndex {
        let u: f64 = rng.gen();
        rates
            .iter()
            .find(|&&(_, c)| u < c)
            .unwrap_or(&rates[rates.len() - 1])
            .0
    }
}

impl Event for PooledArrivalEvent {
    fn execute(mut self: Box<Self>, ctx: &mut EventContext, queue: &mut EventQueue) -> Result<()> {
        if *ctx.stop {
            return Ok(());
        }
        let now = self.at_time;
        spawn_cyclist(ctx, queue, self.origin, now);
        let next_origin = Self::draw_origin(&self.rates, &mut ctx.streams.choices);
        let delta = ctx.distributions[next_origin.index()].sample(&mut ctx.streams.pooled);
        self.origin = next_origin;
        self.at_time = now + delta;
        let handle = queue.push(self);
        ctx.arrival_handles[0] = handle;
        Ok(())
    }

    fn time(&self) -> f64 {
        self.at_time
    }
}

/// The decision block: profile, destination, route, base speed, then the
/// trip process is scheduled immediately.
fn spawn_cyclist(ctx: &mut EventContext, queue: &mut EventQueue, origin: NodeIndex, now: f64) {
    ctx.stats.record_arrival(origin);
    let profile = ctx.population.draw_profile(&mut ctx.streams.choices);
    let destination = match ctx.population.draw_destination(origin, &mut ctx.streams.choices) {
        Some(node) => node,
        None => return,
    };
    let route = match ctx.router.route(ctx.network, profile, origin, destination) {
        Some(route) => route,
        None => {
            debug!(
                "no route from {} to {} for profile {}; cyclist discarded",
                ctx.network.node(origin).id,
                ctx.network.node(destination).id,
                profile.id
            );
            ctx.stats.diagnostics.discarded_unreachable += 1;
            return;
        }
    };
    let base_speed = ctx
        .streams
        .speeds
        .gen_range(ctx.kinematics.v_min..=ctx.kinematics.v_max);
    let start = ctx.network.node(origin);
    let id = ctx.cyclists.next_id();
    let mut cyclist = Cyclist::new(
        id,
        profile.id,
        origin,
        destination,
        route.clone(),
        base_speed,
        (start.x, start.y),
        now,
        ctx.network.node_color(origin),
    );
    cyclist.state = CyclistState::Active;
    ctx.stats.record_route(route);
    let slot = ctx.cyclists.insert(cyclist, now);
    queue.push(Box::new(TripEvent::spawn(slot, now)));
}

/// The termination process: fires once at `T_sim`.
#[derive(Debug)]
pub struct StopEvent {
    at_time: f64,
}

impl StopEvent {
    pub fn new(at_time: f64) -> Self {
        StopEvent { at_time }
    }
}

impl Event for StopEvent {
    fn execute(self: Box<Self>, ctx: &mut EventContext, queue: &mut EventQueue) -> Result<()> {
        info!(
            "simulated horizon reached at {:.1}s; draining {} active cyclists",
            self.at_time,
            ctx.cyclists.nb_active()
        );
        *ctx.stop = true;
        for handle in ctx.arrival_handles.drain(..) {
            queue.cancel(handle);
        }
        Ok(())
    }

    fn time(&self) -> f64 {
        self.at_time
    }
}
