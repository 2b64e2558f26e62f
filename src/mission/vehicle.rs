//! What mission actions drive.
//!
//! [`HubVehicle`] writes straight into the in-process [`StateHub`];
//! [`RemoteVehicle`] speaks the front-end protocol to a running instance.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::channel::Channel;
use crate::error::{MatsyaError, Result};
use crate::hub::{ActuatorFlag, StateHub};
use crate::protocol::Request;
use crate::shutdown::Shutdown;
use crate::types::{read_vector, Feature, Model, Pose, Side};

/// Vehicle interface used by mission actions.
pub trait Vehicle {
    fn pose(&mut self) -> Result<Pose>;

    fn model(&mut self) -> Result<Model>;

    fn command_pose(&mut self, pose: Pose) -> Result<()>;

    fn set_vision(&mut self, process: usize, enabled: bool) -> Result<()>;

    /// Raise a one-shot drop, grab or release command.
    fn actuate(&mut self, flag: ActuatorFlag) -> Result<()>;

    fn shoot(&mut self, side: Side) -> Result<()>;

    fn set_speed(&mut self, speed: f32) -> Result<()>;

    fn set_max_thrust(&mut self, thrust: f32) -> Result<()>;

    fn adjust_variance(&mut self, feature: Feature, variance: f32) -> Result<()>;

    fn log(&mut self, message: &str) {
        tracing::info!("[mission] {}", message);
    }

    /// Whether running actions must give up.
    fn should_stop(&self) -> bool;

    /// Interval between pose polls in move actions.
    fn poll_interval(&self) -> Duration;

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Vehicle backed by the in-process hub.
pub struct HubVehicle {
    hub: Arc<StateHub>,
    poll_interval: Duration,
}

impl HubVehicle {
    pub fn new(hub: Arc<StateHub>, poll_interval: Duration) -> Self {
        Self { hub, poll_interval }
    }
}

impl Vehicle for HubVehicle {
    fn pose(&mut self) -> Result<Pose> {
        Ok(self.hub.snapshot_pose())
    }

    fn model(&mut self) -> Result<Model> {
        Ok(self.hub.snapshot_model())
    }

    fn command_pose(&mut self, pose: Pose) -> Result<()> {
        self.hub.set_pose_command(pose);
        Ok(())
    }

    fn set_vision(&mut self, process: usize, enabled: bool) -> Result<()> {
        self.hub.set_vision(process, enabled)
    }

    fn actuate(&mut self, flag: ActuatorFlag) -> Result<()> {
        self.hub.set_flag(flag);
        Ok(())
    }

    fn shoot(&mut self, side: Side) -> Result<()> {
        self.hub.set_shoot(side);
        Ok(())
    }

    fn set_speed(&mut self, speed: f32) -> Result<()> {
        self.hub.set_speed(speed);
        Ok(())
    }

    fn set_max_thrust(&mut self, thrust: f32) -> Result<()> {
        self.hub.set_max_thrust(thrust);
        Ok(())
    }

    fn adjust_variance(&mut self, feature: Feature, variance: f32) -> Result<()> {
        self.hub.request_variance(feature, variance);
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.hub.should_shutdown()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Vehicle reached over the front-end protocol.
///
/// The remote model carries no version, so models read here report 0.
/// Vision process indices are checked against `vision_processes` locally,
/// since the front end never answers a command.
pub struct RemoteVehicle {
    channel: Channel,
    shutdown: Shutdown,
    poll_interval: Duration,
    vision_processes: usize,
}

impl RemoteVehicle {
    pub fn new(
        channel: Channel,
        shutdown: Shutdown,
        poll_interval: Duration,
        vision_processes: usize,
    ) -> Self {
        Self {
            channel,
            shutdown,
            poll_interval,
            vision_processes,
        }
    }

    fn command(&mut self, request: Request) -> Result<()> {
        request.write(&mut self.channel)
    }
}

impl Vehicle for RemoteVehicle {
    fn pose(&mut self) -> Result<Pose> {
        Request::QueryState.write(&mut self.channel)?;
        Pose::read(&mut self.channel)
    }

    fn model(&mut self) -> Result<Model> {
        Request::QueryModel.write(&mut self.channel)?;
        let values = read_vector(&mut self.channel)?;
        Ok(Model::new(values, 0))
    }

    fn command_pose(&mut self, pose: Pose) -> Result<()> {
        self.command(Request::SetPose(pose))
    }

    fn set_vision(&mut self, process: usize, enabled: bool) -> Result<()> {
        if process >= self.vision_processes {
            return Err(MatsyaError::Config(format!(
                "vision process {} outside 0..{}",
                process, self.vision_processes
            )));
        }
        self.command(Request::SetVision { process, enabled })
    }

    fn actuate(&mut self, flag: ActuatorFlag) -> Result<()> {
        let request = match flag {
            ActuatorFlag::Drop => Request::Drop,
            ActuatorFlag::Grab => Request::Grab,
            ActuatorFlag::Release => Request::Release,
        };
        self.command(request)
    }

    fn shoot(&mut self, side: Side) -> Result<()> {
        self.command(Request::Shoot(side))
    }

    fn set_speed(&mut self, speed: f32) -> Result<()> {
        self.command(Request::SetSpeed(speed))
    }

    fn set_max_thrust(&mut self, thrust: f32) -> Result<()> {
        self.command(Request::SetMaxThrust(thrust))
    }

    fn adjust_variance(&mut self, feature: Feature, variance: f32) -> Result<()> {
        self.command(Request::AdjustVariance { feature, variance })
    }

    fn should_stop(&self) -> bool {
        self.shutdown.is_signaled()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
