//! Camera role: pulls one frame per cycle into an image slot.

use std::sync::Arc;

use super::{Pace, Role};
use crate::channel::Channel;
use crate::error::Result;
use crate::hub::StateHub;
use crate::types::Frame;

pub struct CameraRole {
    image: usize,
    hub: Arc<StateHub>,
    channel: Channel,
}

impl CameraRole {
    pub fn new(image: usize, hub: Arc<StateHub>, channel: Channel) -> Self {
        Self {
            image,
            hub,
            channel,
        }
    }
}

impl Role for CameraRole {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn cycle(&mut self) -> Result<Pace> {
        self.channel.send("i")?;
        self.channel.flush()?;

        let frame = Frame::read(&mut self.channel)?;
        let (width, height, bytes) = (frame.width, frame.height, frame.data.len());
        let id = self.hub.put_image(self.image, frame)?;
        tracing::debug!(
            "[{}] frame {} ({}x{}, {} bytes)",
            self.channel.name(),
            id,
            width,
            height,
            bytes
        );

        Ok(Pace::Idle)
    }
}
