//! Mission engine.
//!
//! Goals are loaded from the `[mission]` config section and executed once
//! each, in declaration order, against a [`Vehicle`].

mod action;
mod goal;
mod vehicle;

pub use action::Action;
pub use goal::{Goal, GoalConfig, GoalState, Location, Term, FAILED_CERTAINTY};
pub use vehicle::{HubVehicle, RemoteVehicle, Vehicle};

use crate::config::MissionConfig;

/// Outcome of one goal in a mission run.
#[derive(Clone, Debug, PartialEq)]
pub struct GoalOutcome {
    pub name: String,
    pub state: GoalState,
    pub fails: u32,
}

/// Result of [`Mission::run`].
#[derive(Clone, Debug, Default)]
pub struct MissionReport {
    pub outcomes: Vec<GoalOutcome>,
}

impl MissionReport {
    pub fn succeeded(&self) -> usize {
        self.count(GoalState::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(GoalState::Failed)
    }

    /// Goals never started (shutdown came first).
    pub fn skipped(&self) -> usize {
        self.count(GoalState::Pending)
    }

    fn count(&self, state: GoalState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

/// Ordered list of goals.
#[derive(Clone, Debug, Default)]
pub struct Mission {
    goals: Vec<Goal>,
}

impl Mission {
    pub fn new(goals: Vec<Goal>) -> Self {
        Self { goals }
    }

    pub fn from_config(config: &MissionConfig) -> Self {
        Self::new(config.goals.iter().map(Goal::from_config).collect())
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// Run every goal once, in order. Stops starting goals on shutdown.
    pub fn run(&mut self, vehicle: &mut dyn Vehicle) -> MissionReport {
        tracing::info!("[mission] Starting mission with {} goals", self.goals.len());

        for goal in &mut self.goals {
            if vehicle.should_stop() {
                tracing::info!("[mission] Shutdown requested, not starting '{}'", goal.name());
                break;
            }

            let state = goal.run(vehicle);
            tracing::info!(
                "[mission] '{}' -> {:?} (value={:.2}, time={:.1}s, certainty={:.3})",
                goal.name(),
                state,
                goal.value(),
                goal.time(),
                goal.certainty()
            );
        }

        let report = MissionReport {
            outcomes: self
                .goals
                .iter()
                .map(|g| GoalOutcome {
                    name: g.name().to_string(),
                    state: g.state(),
                    fails: g.fails(),
                })
                .collect(),
        };

        tracing::info!(
            "[mission] Mission finished: {} succeeded, {} failed, {} skipped",
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        report
    }
}
