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

//! The per-cyclist trip process.
//!
//! Each trip is an explicit state machine carried by a [`TripEvent`] that
//! re-inserts itself into the queue at every suspension: entering an edge
//! computes the traversal plan, each micro-step advances the interpolated
//! position, and leaving the last edge completes the trip. Density is
//! re-sampled whenever the cumulative progress crosses a quarter of the
//! edge, so congestion tracking stays responsive without re-planning on
//! every step.
use anyhow::{anyhow, Result};
use petgraph::graph::EdgeIndex;

use crate::cyclist::SlotIndex;
use crate::event::{Event, EventContext, EventQueue};
use crate::kinematics;

/// The trip state machine of one cyclist.
#[derive(Debug)]
pub struct TripEvent {
    at_time: f64,
    slot: SlotIndex,
    phase: TripPhase,
}

#[derive(Debug)]
enum TripPhase {
    /// About to enter `(route[cursor], route[cursor + 1])`.
    EnterEdge,
    /// Mid-edge, between two interpolation steps.
    MicroStep(StepState),
}

/// Traversal bookkeeping between two micro-steps.
#[derive(Clone, Copy, Debug)]
struct StepState {
    edge: EdgeIndex,
    entered_at: f64,
    /// Grade-adjusted speed, clamped to the configured speed band.
    v_grade: f64,
    /// Safety/lighting time-dilation factor.
    phi: f64,
    /// Cumulative progress along the edge, in `[0, 1]`.
    alpha: f64,
    /// Progress gained per micro-step under the current plan.
    da: f64,
    /// Duration of a micro-step under the current plan.
    dt: f64,
    /// Micro-steps left in the current plan.
    steps_left: usize,
}

impl TripEvent {
    /// The event that starts the trip of a freshly registered cyclist.
    pub fn spawn(slot: SlotIndex, at_time: f64) -> Self {
        TripEvent {
            at_time,
            slot,
            phase: TripPhase::EnterEdge,
        }
    }

    fn enter_edge(
        mut self: Box<Self>,
        ctx: &mut EventContext,
        queue: &mut EventQueue,
    ) -> Result<()> {
        let now = self.at_time;
        let cyclist = ctx.cyclists.get(self.slot);
        let (u, v) = cyclist.current_leg();
        let edge_index = ctx.network.find_edge(u, v).ok_or_else(|| {
            anyhow!(
                "route of cyclist {:?} uses a missing edge {} -> {}",
                cyclist.id,
                ctx.network.node(u).id,
                ctx.network.node(v).id
            )
        })?;
        let id = cyclist.id;
        let base_speed = cyclist.base_speed_ms;
        ctx.state.enter(edge_index, id, now);

        let edge = ctx.network.edge(edge_index);
        let v_grade = (base_speed
            * kinematics::grade_speed_factor(ctx.network.grade(edge).unwrap_or(0.0)))
        .clamp(ctx.kinematics.v_min, ctx.kinematics.v_max);
        let phi =
            kinematics::time_dilation_factor(ctx.network.safety(edge), ctx.network.lighting(edge));
        // Occupancy already includes this cyclist.
        let rho = ctx.state.density_factor(edge_index, edge.capacity);
        let total = kinematics::edge_time_secs(edge.length_m, phi, v_grade, rho);
        let plan = kinematics::plan_traversal(total);

        let start = ctx.network.node(u);
        let position = (start.x, start.y);
        let cyclist = ctx.cyclists.get_mut(self.slot);
        cyclist.position = position;
        cyclist.push_trail(position);

        self.at_time = now + plan.dt_secs;
        self.phase = TripPhase::MicroStep(StepState {
            edge: edge_index,
            entered_at: now,
            v_grade,
            phi,
            alpha: 0.0,
            da: 1.0 / plan.steps as f64,
            dt: plan.dt_secs,
            steps_left: plan.steps,
        });
        queue.push(self);
        Ok(())
    }

    fn micro_step(
        mut self: Box<Self>,
        mut step: StepState,
        ctx: &mut EventContext,
        queue: &mut EventQueue,
    ) -> Result<()> {
        let now = self.at_time;
        let alpha_before = step.alpha;
        step.alpha = (step.alpha + step.da).min(1.0);
        step.steps_left -= 1;

        let (u, v) = ctx.network.endpoints(step.edge);
        let from = ctx.network.node(u);
        let to = ctx.network.node(v);
        let position = (
            from.x + step.alpha * (to.x - from.x),
            from.y + step.alpha * (to.y - from.y),
        );
        let cyclist = ctx.cyclists.get_mut(self.slot);
        cyclist.position = position;
        cyclist.push_trail(position);

        if step.steps_left == 0 {
            return self.exit_edge(step, ctx, queue);
        }

        if crosses_quarter(alpha_before, step.alpha) {
            // Occupancy may have changed; re-plan the remaining fraction.
            let capacity = ctx.network.edge(step.edge).capacity;
            let rho = ctx.state.density_factor(step.edge, capacity);
            let length = ctx.network.edge(step.edge).length_m;
            let remaining = kinematics::edge_time_secs(
                (1.0 - step.alpha) * length,
                step.phi,
                step.v_grade,
                rho,
            );
            let plan = kinematics::plan_traversal(remaining);
            step.steps_left = plan.steps;
            step.dt = plan.dt_secs;
            step.da = (1.0 - step.alpha) / plan.steps as f64;
        }

        self.at_time = now + step.dt;
        self.phase = TripPhase::MicroStep(step);
        queue.push(self);
        Ok(())
    }

    fn exit_edge(
        mut self: Box<Self>,
        step: StepState,
        ctx: &mut EventContext,
        queue: &mut EventQueue,
    ) -> Result<()> {
        let now = self.at_time;
        let cyclist = ctx.cyclists.get(self.slot);
        let id = cyclist.id;
        ctx.state.exit(step.edge, id, now);

        let length = ctx.network.edge(step.edge).length_m;
        let finished = {
            let cyclist = ctx.cyclists.get_mut(self.slot);
            cyclist.per_edge_secs.push(now - step.entered_at);
            cyclist.total_distance_m += length;
            cyclist.on_last_edge()
        };
        if finished {
            let cyclist = ctx.cyclists.get_mut(self.slot);
            cyclist.complete(now);
            ctx.stats.commit(ctx.cyclists.get(self.slot), ctx.network);
            ctx.cyclists.retire(self.slot, now);
            return Ok(());
        }
        ctx.cyclists.get_mut(self.slot).edge_cursor += 1;
        // The next edge starts at the same instant; no need to go through
        // the queue.
        self.at_time = now;
        self.phase = TripPhase::EnterEdge;
        self.enter_edge(ctx, queue)
    }

    /// Cooperative shutdown: the micro-step being resumed still lands, then
    /// the edge is released and the cyclist stays Active for reporting,
    /// with its metrics so far.
    fn terminate_at_stop(&self, ctx: &mut EventContext) {
        let now = self.at_time;
        if let TripPhase::MicroStep(step) = &self.phase {
            let alpha = (step.alpha + step.da).min(1.0);
            let (u, v) = ctx.network.endpoints(step.edge);
            let from = ctx.network.node(u);
            let to = ctx.network.node(v);
            let position = (
                from.x + alpha * (to.x - from.x),
                from.y + alpha * (to.y - from.y),
            );
            let cyclist = ctx.cyclists.get_mut(self.slot);
            cyclist.position = position;
            cyclist.push_trail(position);
            let id = cyclist.id;
            ctx.state.exit(step.edge, id, now);
        }
        ctx.stats.commit(ctx.cyclists.get(self.slot), ctx.network);
        ctx.cyclists.retire(self.slot, now);
    }
}

impl Event for TripEvent {
    fn execute(self: Box<Self>, ctx: &mut EventContext, queue: &mut EventQueue) -> Result<()> {
        if *ctx.stop {
            self.terminate_at_stop(ctx);
            return Ok(());
        }
        match self.phase {
            TripPhase::EnterEdge => self.enter_edge(ctx, queue),
            TripPhase::MicroStep(step) => self.micro_step(step, ctx, queue),
        }
    }

    fn time(&self) -> f64 {
        self.at_time
    }

    fn cyclist(&self) -> Option<SlotIndex> {
        Some(self.slot)
    }
}

/// `true` when the progress moved into a new quarter of the edge. For plans
/// shorter than four steps every step crosses a quarter, so short edges
/// re-sample density on each step.
fn crosses_quarter(before: f64, after: f64) -> bool {
    if after >= 1.0 {
        return false;
    }
    (before * 4.0).floor() < (after * 4.0).floor()
}
