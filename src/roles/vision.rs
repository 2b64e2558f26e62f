//! Vision role: hands new frames to a detection peer and collects evidence.

use std::sync::Arc;

use super::{Pace, Role};
use crate::channel::Channel;
use crate::error::Result;
use crate::hub::StateHub;
use crate::types::Evidence;

pub struct VisionRole {
    process: usize,
    image: usize,
    hub: Arc<StateHub>,
    channel: Channel,
    /// Id of the last frame handed to the peer
    last_frame: u64,
}

impl VisionRole {
    pub fn new(process: usize, image: usize, hub: Arc<StateHub>, channel: Channel) -> Self {
        Self {
            process,
            image,
            hub,
            channel,
            last_frame: 0,
        }
    }
}

impl Role for VisionRole {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn cycle(&mut self) -> Result<Pace> {
        if !self.hub.vision_enabled(self.process) {
            return Ok(Pace::Idle);
        }

        let Some((frame, id)) = self.hub.image_newer_than(self.image, self.last_frame) else {
            return Ok(Pace::Fast);
        };

        // Mark the frame seen first so a failed exchange is not retried on
        // the same image.
        self.last_frame = id;

        frame.write(&mut self.channel)?;
        self.channel.flush()?;
        let evidence = Evidence::read(&mut self.channel)?;

        tracing::debug!(
            "[{}] frame {} -> {} observations",
            self.channel.name(),
            id,
            evidence.len()
        );
        if !evidence.is_empty() {
            self.hub.push_evidence(evidence);
        }

        Ok(Pace::Now)
    }
}
