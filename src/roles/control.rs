//! Actuator relay: pose in, pending commands out.
//!
//! | Sent                | Meaning                 |
//! |---------------------|-------------------------|
//! | `c`                 | request current pose    |
//! | `s <pose>`          | set target pose         |
//! | `t l` / `t r`       | fire torpedo            |
//! | `d` / `g` / `r`     | drop / grab / release   |
//! | `p <speed>`         | speed limit             |
//! | `l <thrust>`        | thrust limit            |

use std::sync::Arc;

use super::{Pace, Role};
use crate::channel::Channel;
use crate::error::Result;
use crate::hub::{PendingCommands, StateHub};
use crate::types::Pose;

pub struct ControlRole {
    hub: Arc<StateHub>,
    channel: Channel,
}

impl ControlRole {
    pub fn new(hub: Arc<StateHub>, channel: Channel) -> Self {
        Self { hub, channel }
    }

    fn forward(&mut self, commands: &PendingCommands) -> Result<()> {
        let ch = &mut self.channel;
        if let Some(pose) = commands.pose {
            ch.send(&format!("s {}", pose.to_wire()))?;
        }
        if let Some(side) = commands.shoot {
            ch.send(&format!("t {}", side.as_char()))?;
        }
        if commands.drop {
            ch.send("d")?;
        }
        if commands.grab {
            ch.send("g")?;
        }
        if commands.release {
            ch.send("r")?;
        }
        if let Some(speed) = commands.speed {
            ch.send(&format!("p {}", speed))?;
        }
        if let Some(thrust) = commands.max_thrust {
            ch.send(&format!("l {}", thrust))?;
        }
        ch.flush()
    }
}

impl Role for ControlRole {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn cycle(&mut self) -> Result<Pace> {
        self.channel.send("c")?;
        self.channel.flush()?;
        let pose = Pose::read(&mut self.channel)?;

        let commands = self.hub.exchange_pose(pose);
        if !commands.is_empty() {
            tracing::debug!("[{}] forwarding {:?}", self.channel.name(), commands);
            self.forward(&commands)?;
        }

        Ok(Pace::Fast)
    }
}
