//! Front end: command/query server over the hub.
//!
//! Queries are answered from hub snapshots; commands set pending flags that
//! the actuator relay forwards. Every reply is flushed before the next read.

use std::sync::Arc;

use super::{Pace, Role};
use crate::channel::Channel;
use crate::error::Result;
use crate::hub::{ActuatorFlag, StateHub};
use crate::protocol::Request;
use crate::types::{write_vector, Frame};

pub struct FrontEndRole {
    hub: Arc<StateHub>,
    channel: Channel,
}

impl FrontEndRole {
    pub fn new(hub: Arc<StateHub>, channel: Channel) -> Self {
        Self { hub, channel }
    }

    fn serve(&mut self, request: &Request) -> Result<()> {
        match request {
            Request::QueryState => self.hub.snapshot_pose().write(&mut self.channel)?,
            Request::QueryImage(camera) => match self.hub.get_image(camera.index()) {
                Some((frame, _)) => frame.write(&mut self.channel)?,
                None => Frame::default().write(&mut self.channel)?,
            },
            Request::QueryModel => {
                let model = self.hub.snapshot_model();
                write_vector(&mut self.channel, model.values())?;
            }
            Request::QuerySystem => self.hub.system().write(&mut self.channel)?,
            // No certainty export; peers get a constant.
            Request::QueryCertainty => self.channel.send("0")?,
            Request::SetPose(pose) => self.hub.set_pose_command(*pose),
            Request::Drop => self.hub.set_flag(ActuatorFlag::Drop),
            Request::Grab => self.hub.set_flag(ActuatorFlag::Grab),
            Request::Release => self.hub.set_flag(ActuatorFlag::Release),
            Request::Shoot(side) => self.hub.set_shoot(*side),
            Request::SetVision { process, enabled } => {
                self.hub.set_vision(*process, *enabled)?
            }
            Request::SetSpeed(speed) => self.hub.set_speed(*speed),
            Request::SetMaxThrust(thrust) => self.hub.set_max_thrust(*thrust),
            Request::AdjustVariance { feature, variance } => {
                self.hub.request_variance(*feature, *variance)
            }
        }

        if request.expects_reply() {
            self.channel.flush()?;
        }
        Ok(())
    }
}

impl Role for FrontEndRole {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn cycle(&mut self) -> Result<Pace> {
        let request = Request::read(&mut self.channel)?;
        tracing::debug!("[{}] {:?}", self.channel.name(), request);
        self.serve(&request)?;
        // Commands often arrive in bursts.
        Ok(Pace::Now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SharedBuffer;
    use crate::error::MatsyaError;
    use crate::hub::HubLayout;
    use crate::shutdown::Shutdown;
    use crate::types::{Feature, Pose, Side};
    use std::io::Cursor;

    fn serve_all(hub: &Arc<StateHub>, script: &str) -> String {
        let out = SharedBuffer::new();
        let channel = Channel::in_memory(
            "frontend",
            Cursor::new(script.as_bytes().to_vec()),
            out.clone(),
        );
        let mut role = FrontEndRole::new(Arc::clone(hub), channel);
        loop {
            match role.cycle() {
                Ok(_) => {}
                Err(e) if e.is_terminal() => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        out.contents()
    }

    fn hub() -> Arc<StateHub> {
        Arc::new(StateHub::new(HubLayout::default(), Shutdown::new()))
    }

    #[test]
    fn test_queries_answer_from_snapshots() {
        let hub = hub();
        hub.store_pose(Pose::at(1.0, 2.0, 3.0));
        hub.replace_model(vec![0.5, 4.0]);
        hub.put_image(1, Frame::new(1, 2, b"xy".to_vec())).unwrap();

        let out = serve_all(&hub, "q s\nq m m\nq i d\nq i f\nq m c\n");
        assert_eq!(out, "1 2 3 0 0 0\n2 0.5 4\n1 2 2\nxy0 0 0\n0\n");
    }

    #[test]
    fn test_commands_set_pending_state() {
        let hub = hub();
        serve_all(
            &hub,
            "c s 5 0 2 0 0 0\nc t l\nc g g\nc v 2 1\nc l 0.7\nc e 3 1.5\n",
        );

        let commands = hub.take_commands();
        assert_eq!(commands.pose, Some(Pose::at(5.0, 0.0, 2.0)));
        assert_eq!(commands.shoot, Some(Side::Left));
        assert!(commands.grab);
        assert!(!commands.drop);
        assert_eq!(commands.max_thrust, Some(0.7));
        assert!(hub.vision_enabled(2));
        assert_eq!(hub.take_variance_requests(), vec![(Feature(3), 1.5)]);
    }

    #[test]
    fn test_unknown_request_is_protocol_error() {
        let hub = hub();
        let channel = Channel::in_memory(
            "frontend",
            Cursor::new(b"z\n".to_vec()),
            SharedBuffer::new(),
        );
        let mut role = FrontEndRole::new(hub, channel);
        assert!(matches!(role.cycle(), Err(MatsyaError::Protocol(_))));
    }
}
