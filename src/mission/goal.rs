//! Goals: ranked bundles of actions with a model-relative target.

use serde::Deserialize;

use super::action::Action;
use super::vehicle::Vehicle;
use crate::types::{Feature, Model, Pose};

/// Certainty reported once a goal has failed at least once.
pub const FAILED_CERTAINTY: f32 = 0.001;

/// Goal lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One weighted model feature in a location row.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Term {
    pub feature: Feature,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

/// Linear map from the model vector to a target pose, plus a fixed offset.
///
/// Each of `x`, `y` and `depth` is a weighted sum of model features. Rotation
/// comes from `offset` alone.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub x: Vec<Term>,
    #[serde(default)]
    pub y: Vec<Term>,
    #[serde(default)]
    pub depth: Vec<Term>,
    #[serde(default)]
    pub offset: Pose,
}

impl Location {
    /// Features 0, 1 and 2 map straight to x, y and depth.
    pub fn identity() -> Self {
        let unit = |n| {
            vec![Term {
                feature: Feature(n),
                weight: 1.0,
            }]
        };
        Self {
            x: unit(0),
            y: unit(1),
            depth: unit(2),
            offset: Pose::ZERO,
        }
    }

    /// Fixed location that ignores the model.
    pub fn fixed(pose: Pose) -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            depth: Vec::new(),
            offset: pose,
        }
    }

    /// Apply the map to a model. Features outside the model count as zero.
    pub fn apply(&self, model: &Model) -> Pose {
        let row = |terms: &[Term]| -> f32 {
            terms
                .iter()
                .map(|t| t.weight * model.get(t.feature).unwrap_or(0.0))
                .sum()
        };
        Pose {
            x: row(&self.x) + self.offset.x,
            y: row(&self.y) + self.offset.y,
            depth: row(&self.depth) + self.offset.depth,
            ..self.offset
        }
    }
}

/// Goal as written in the mission file.
#[derive(Clone, Debug, Deserialize)]
pub struct GoalConfig {
    pub name: String,

    /// Static utility
    #[serde(default)]
    pub value: f32,

    /// Expected duration in seconds (scheduling hint only)
    #[serde(default)]
    pub time: f32,

    /// Success certainty before any failure (default: 1.0)
    #[serde(default = "default_certainty")]
    pub certainty: f32,

    #[serde(default = "Location::identity")]
    pub location: Location,

    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_certainty() -> f32 {
    1.0
}

/// A mission task: ranking metrics plus an ordered action list.
///
/// Only `fails` and `state` change after construction.
#[derive(Clone, Debug)]
pub struct Goal {
    name: String,
    value: f32,
    time: f32,
    certainty: f32,
    fails: u32,
    location: Location,
    actions: Vec<Action>,
    state: GoalState,
}

impl Goal {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            value: 0.0,
            time: 0.0,
            certainty: default_certainty(),
            fails: 0,
            location: Location::identity(),
            actions,
            state: GoalState::Pending,
        }
    }

    pub fn from_config(config: &GoalConfig) -> Self {
        Self {
            name: config.name.clone(),
            value: config.value,
            time: config.time,
            certainty: config.certainty,
            fails: 0,
            location: config.location.clone(),
            actions: config.actions.clone(),
            state: GoalState::Pending,
        }
    }

    pub fn with_metrics(mut self, value: f32, time: f32, certainty: f32) -> Self {
        self.value = value;
        self.time = time;
        self.certainty = certainty;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Base certainty, or [`FAILED_CERTAINTY`] after any failure.
    pub fn certainty(&self) -> f32 {
        if self.fails > 0 {
            FAILED_CERTAINTY
        } else {
            self.certainty
        }
    }

    pub fn fails(&self) -> u32 {
        self.fails
    }

    pub fn state(&self) -> GoalState {
        self.state
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Target pose under the given model.
    pub fn location(&self, model: &Model) -> Pose {
        self.location.apply(model)
    }

    /// Execute every action in order.
    ///
    /// The first failing action ends the run: later actions never execute
    /// and `fails` grows by one.
    pub fn run(&mut self, vehicle: &mut dyn Vehicle) -> GoalState {
        self.state = GoalState::Running;
        tracing::info!("[mission] Goal '{}' started ({} actions)", self.name, self.actions.len());

        for (index, action) in self.actions.iter().enumerate() {
            tracing::debug!("[mission] '{}' action {}: {}", self.name, index, action.kind());
            if let Err(e) = action.execute(vehicle) {
                self.fails += 1;
                self.state = GoalState::Failed;
                tracing::warn!(
                    "[mission] Goal '{}' failed at action {} ({}): {}",
                    self.name,
                    index,
                    action.kind(),
                    e
                );
                return self.state;
            }
        }

        self.state = GoalState::Succeeded;
        tracing::info!("[mission] Goal '{}' succeeded", self.name);
        self.state
    }
}
