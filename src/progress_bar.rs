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

//! Thin wrapper around [`indicatif::ProgressBar`] tracking simulated time.
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the simulated horizon, cheap to clone.
#[derive(Clone, Debug)]
pub struct SimProgressBar(ProgressBar);

impl SimProgressBar {
    /// A bar spanning `[0, t_sim]` seconds of simulated time.
    pub fn new(t_sim: f64) -> Self {
        let bar = ProgressBar::new(t_sim.ceil() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len}s simulated ({msg}) [{elapsed}]",
            )
            .expect("invalid progress-bar template")
            .progress_chars("=>-"),
        );
        SimProgressBar(bar)
    }

    pub fn set_position(&self, now_secs: f64) {
        self.0.set_position(now_secs.floor() as u64);
    }

    pub fn set_message(&self, message: String) {
        self.0.set_message(message);
    }

    /// Runs `f` with the bar hidden, so log lines do not tear it.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.0.suspend(f)
    }

    pub fn finish(&self) {
        self.0.finish_and_clear();
    }
}
