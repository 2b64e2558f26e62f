//! Mission actions.
//!
//! A closed set of primitives, each executed to completion against a
//! [`Vehicle`]. Move-class actions re-poll the pose until within tolerance;
//! they never time out and only stop early on shutdown.

use std::time::Duration;

use serde::Deserialize;

use super::vehicle::Vehicle;
use crate::error::{MatsyaError, Result};
use crate::hub::ActuatorFlag;
use crate::types::{Feature, Pose, Side};

/// One mission primitive.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Go to a fixed world pose.
    MoveAbsolute {
        target: Pose,
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },

    /// Go to a pose relative to where the action starts (vehicle frame).
    MoveRelative {
        delta: Pose,
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },

    /// Go to a model feature position plus an offset; the target follows the
    /// live model.
    MoveModel {
        x: Feature,
        y: Feature,
        #[serde(default)]
        depth: Option<Feature>,
        #[serde(default)]
        offset: Pose,
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },

    /// Step along a model bearing until a model angle falls inside `[min, max]`.
    MoveUntil {
        bearing: Feature,
        elevation: Feature,
        min: f32,
        max: f32,
        #[serde(default = "default_step")]
        step: f32,
    },

    /// Turn in place to face a model feature position.
    TurnTo {
        x: Feature,
        y: Feature,
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },

    SetVision { process: usize, enabled: bool },

    Wait { seconds: f32 },

    /// Hold station in front of a target described by model offsets
    /// (lateral, vertical, optional range and skew), `standoff` meters away.
    AlignWith {
        horizontal: Feature,
        vertical: Feature,
        #[serde(default)]
        distance: Option<Feature>,
        #[serde(default)]
        skew: Option<Feature>,
        #[serde(default)]
        standoff: f32,
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },

    Shoot { side: Side },

    Drop,

    Grab,

    Release,

    Log { message: String },

    SetSpeed { speed: f32 },

    SetMaxThrust { thrust: f32 },

    AdjustVariance { feature: Feature, variance: f32 },
}

fn default_tolerance() -> f32 {
    0.2
}

fn default_step() -> f32 {
    0.5
}

impl Action {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::MoveAbsolute { .. } => "move_absolute",
            Action::MoveRelative { .. } => "move_relative",
            Action::MoveModel { .. } => "move_model",
            Action::MoveUntil { .. } => "move_until",
            Action::TurnTo { .. } => "turn_to",
            Action::SetVision { .. } => "set_vision",
            Action::Wait { .. } => "wait",
            Action::AlignWith { .. } => "align_with",
            Action::Shoot { .. } => "shoot",
            Action::Drop => "drop",
            Action::Grab => "grab",
            Action::Release => "release",
            Action::Log { .. } => "log",
            Action::SetSpeed { .. } => "set_speed",
            Action::SetMaxThrust { .. } => "set_max_thrust",
            Action::AdjustVariance { .. } => "adjust_variance",
        }
    }

    /// Run to completion. Any error fails the action.
    pub fn execute(&self, vehicle: &mut dyn Vehicle) -> Result<()> {
        match self {
            Action::MoveAbsolute { target, tolerance } => {
                let target = *target;
                settle(vehicle, *tolerance, |_| Ok(target))
            }
            Action::MoveRelative { delta, tolerance } => {
                let target = vehicle.pose()?.offset_body(delta);
                settle(vehicle, *tolerance, |_| Ok(target))
            }
            Action::MoveModel {
                x,
                y,
                depth,
                offset,
                tolerance,
            } => settle(vehicle, *tolerance, |vehicle| {
                let model = vehicle.model()?;
                let pose = vehicle.pose()?;
                let z = match depth {
                    Some(f) => model.require(*f)?,
                    None => 0.0,
                };
                Ok(Pose {
                    x: model.require(*x)? + offset.x,
                    y: model.require(*y)? + offset.y,
                    depth: z + offset.depth,
                    ..pose
                })
            }),
            Action::MoveUntil {
                bearing,
                elevation,
                min,
                max,
                step,
            } => move_until(vehicle, *bearing, *elevation, (*min, *max), *step),
            Action::TurnTo { x, y, tolerance } => {
                let start = vehicle.pose()?;
                settle(vehicle, *tolerance, |vehicle| {
                    let model = vehicle.model()?;
                    let (tx, ty) = (model.require(*x)?, model.require(*y)?);
                    let pose = vehicle.pose()?;
                    Ok(start.with_yaw(pose.bearing_to(tx, ty)))
                })
            }
            Action::SetVision { process, enabled } => vehicle.set_vision(*process, *enabled),
            Action::Wait { seconds } => {
                let duration = if seconds.is_nan() {
                    None
                } else {
                    Duration::try_from_secs_f32(seconds.max(0.0)).ok()
                };
                let Some(duration) = duration else {
                    return Err(MatsyaError::Mission(format!("cannot wait {} seconds", seconds)));
                };
                wait(vehicle, duration)
            }
            Action::AlignWith {
                horizontal,
                vertical,
                distance,
                skew,
                standoff,
                tolerance,
            } => align_with(
                vehicle,
                AlignTarget {
                    horizontal: *horizontal,
                    vertical: *vertical,
                    distance: *distance,
                    skew: *skew,
                    standoff: *standoff,
                },
                *tolerance,
            ),
            Action::Shoot { side } => vehicle.shoot(*side),
            Action::Drop => vehicle.actuate(ActuatorFlag::Drop),
            Action::Grab => vehicle.actuate(ActuatorFlag::Grab),
            Action::Release => vehicle.actuate(ActuatorFlag::Release),
            Action::Log { message } => {
                vehicle.log(message);
                Ok(())
            }
            Action::SetSpeed { speed } => vehicle.set_speed(*speed),
            Action::SetMaxThrust { thrust } => vehicle.set_max_thrust(*thrust),
            Action::AdjustVariance { feature, variance } => {
                vehicle.adjust_variance(*feature, *variance)
            }
        }
    }
}

fn stop_requested(vehicle: &dyn Vehicle) -> Result<()> {
    if vehicle.should_stop() {
        return Err(MatsyaError::Shutdown);
    }
    Ok(())
}

/// Command the target from `target_of` each poll until the pose is within
/// `tolerance` of it.
fn settle(
    vehicle: &mut dyn Vehicle,
    tolerance: f32,
    mut target_of: impl FnMut(&mut dyn Vehicle) -> Result<Pose>,
) -> Result<()> {
    loop {
        stop_requested(vehicle)?;

        let target = target_of(vehicle)?;
        vehicle.command_pose(target)?;

        let pose = vehicle.pose()?;
        if pose.distance(&target) < tolerance {
            return Ok(());
        }

        let interval = vehicle.poll_interval();
        vehicle.sleep(interval);
    }
}

fn move_until(
    vehicle: &mut dyn Vehicle,
    bearing: Feature,
    elevation: Feature,
    (min, max): (f32, f32),
    step: f32,
) -> Result<()> {
    loop {
        stop_requested(vehicle)?;

        let model = vehicle.model()?;
        let angle = model.require(elevation)?;
        if (min..=max).contains(&angle) {
            return Ok(());
        }

        // Below the window: keep closing in. Above it: back off.
        let heading = model.require(bearing)?;
        let pose = vehicle.pose()?;
        let advance = if angle < min { step } else { -step };
        let (sin, cos) = heading.sin_cos();
        vehicle.command_pose(Pose {
            x: pose.x + advance * cos,
            y: pose.y + advance * sin,
            ..pose.with_yaw(heading)
        })?;

        let interval = vehicle.poll_interval();
        vehicle.sleep(interval);
    }
}

struct AlignTarget {
    horizontal: Feature,
    vertical: Feature,
    distance: Option<Feature>,
    skew: Option<Feature>,
    standoff: f32,
}

fn align_with(vehicle: &mut dyn Vehicle, target: AlignTarget, tolerance: f32) -> Result<()> {
    loop {
        stop_requested(vehicle)?;

        let model = vehicle.model()?;
        let lateral = model.require(target.horizontal)?;
        let vertical = model.require(target.vertical)?;
        let range = match target.distance {
            Some(f) => model.require(f)? - target.standoff,
            None => 0.0,
        };
        let skew = match target.skew {
            Some(f) => model.require(f)?,
            None => 0.0,
        };

        let error = (lateral * lateral + vertical * vertical + range * range + skew * skew).sqrt();
        if error < tolerance {
            return Ok(());
        }

        let pose = vehicle.pose()?;
        let delta = Pose::new(range, lateral, vertical, skew, 0.0, 0.0);
        vehicle.command_pose(pose.offset_body(&delta))?;

        let interval = vehicle.poll_interval();
        vehicle.sleep(interval);
    }
}

fn wait(vehicle: &mut dyn Vehicle, duration: Duration) -> Result<()> {
    let mut remaining = duration;
    while !remaining.is_zero() {
        stop_requested(vehicle)?;
        let slice = remaining.min(vehicle.poll_interval().max(Duration::from_millis(1)));
        vehicle.sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    Ok(())
}
