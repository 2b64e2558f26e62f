//! Worker roles.
//!
//! Each role owns one [`Channel`] and runs on its own thread:
//! - Hydrophone: acoustic bearings → pinger evidence (fast)
//! - Vision: new frames → detection evidence (fast / idle when disabled)
//! - Camera: one frame per cycle into an image slot (idle)
//! - Estimator: evidence out, model in (idle)
//! - Control: pose in, pending actuator commands out (fast)
//! - Front end: textual command/query server over the hub (paced by the client)
//!
//! A cycle may block on its peer; the sleep between cycles is the only other
//! suspension point. Neither ever happens while holding the hub lock.

mod camera;
mod control;
mod estimator;
mod frontend;
mod hydrophone;
mod vision;

pub use camera::CameraRole;
pub use control::ControlRole;
pub use estimator::EstimatorRole;
pub use frontend::FrontEndRole;
pub use hydrophone::HydrophoneRole;
pub use vision::VisionRole;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::channel::Channel;
use crate::config::{MatsyaConfig, RoleConfig};
use crate::error::{MatsyaError, Result};
use crate::hub::StateHub;

/// How long a role wants to wait before its next cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pace {
    /// Run again right away (work is likely pending)
    Now,
    /// High-frequency cadence
    Fast,
    /// Low-frequency or idle cadence
    Idle,
}

/// Sleep intervals for each [`Pace`].
#[derive(Clone, Copy, Debug)]
pub struct Cadence {
    pub fast: Duration,
    pub idle: Duration,
}

impl Cadence {
    pub fn interval(&self, pace: Pace) -> Duration {
        match pace {
            Pace::Now => Duration::ZERO,
            Pace::Fast => self.fast,
            Pace::Idle => self.idle,
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            fast: Duration::from_millis(10),
            idle: Duration::from_millis(100),
        }
    }
}

/// One worker loop body.
pub trait Role: Send {
    fn name(&self) -> &str;

    /// One-time exchange after the channel is open.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// One request/response/update cycle.
    fn cycle(&mut self) -> Result<Pace>;
}

/// Drive a role until shutdown or until its channel is gone for good.
///
/// Protocol errors and reconnects skip the current cycle; the hub is not
/// touched by a failed cycle.
pub fn run_role(role: &mut dyn Role, hub: &StateHub, cadence: Cadence) {
    tracing::info!("[{}] Role started", role.name());

    if let Err(e) = role.start() {
        if e.is_terminal() {
            tracing::error!("[{}] Start failed: {}", role.name(), e);
            return;
        }
        tracing::warn!("[{}] Start exchange failed: {}", role.name(), e);
    }

    let mut skipped: u64 = 0;

    loop {
        if hub.should_shutdown() {
            tracing::info!("[{}] Role shutting down", role.name());
            break;
        }

        let pace = match role.cycle() {
            Ok(pace) => pace,
            Err(MatsyaError::Shutdown) => {
                tracing::info!("[{}] Role shutting down", role.name());
                break;
            }
            Err(e) if e.is_terminal() => {
                tracing::error!("[{}] Role exiting: {}", role.name(), e);
                break;
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!("[{}] Cycle skipped ({} so far): {}", role.name(), skipped, e);
                Pace::Idle
            }
        };

        let interval = cadence.interval(pace);
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
}

/// Build the role described by `role` around an open channel.
pub fn build_role(
    role: &RoleConfig,
    config: &MatsyaConfig,
    hub: Arc<StateHub>,
    channel: Channel,
) -> Box<dyn Role> {
    match role {
        RoleConfig::Hydrophone { .. } => {
            Box::new(HydrophoneRole::new(config.hydrophone.clone(), hub, channel))
        }
        RoleConfig::Vision { process, image, .. } => {
            Box::new(VisionRole::new(*process, *image, hub, channel))
        }
        RoleConfig::Camera { image, .. } => Box::new(CameraRole::new(*image, hub, channel)),
        RoleConfig::Estimator { .. } => Box::new(EstimatorRole::new(
            config.system(),
            config.estimator.evidence_warn_threshold,
            hub,
            channel,
        )),
        RoleConfig::Control { .. } => Box::new(ControlRole::new(hub, channel)),
        RoleConfig::FrontEnd { .. } => Box::new(FrontEndRole::new(hub, channel)),
    }
}

/// Thread handle of one running role.
pub struct RoleHandle {
    pub name: String,
    pub handle: JoinHandle<()>,
}

/// Spawn one thread per configured role.
///
/// Each thread opens its own channel (blocking until the peer exists) before
/// entering its loop, so a missing peer never delays the other roles.
pub fn spawn_roles(config: &MatsyaConfig, hub: &Arc<StateHub>) -> Result<Vec<RoleHandle>> {
    let cadence = Cadence {
        fast: Duration::from_millis(config.cadence.fast_ms),
        idle: Duration::from_millis(config.cadence.idle_ms),
    };
    let retry = config.retry_policy();

    let mut handles = Vec::with_capacity(config.roles.len());

    for role_config in &config.roles {
        let name = role_config.name();
        let role_config = role_config.clone();
        let config = config.clone();
        let hub = Arc::clone(hub);
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let channel = match Channel::open(
                    &thread_name,
                    role_config.endpoint().clone(),
                    retry,
                    hub.shutdown_handle(),
                ) {
                    Ok(channel) => channel,
                    Err(MatsyaError::Shutdown) => return,
                    Err(e) => {
                        tracing::error!("[{}] Cannot open channel: {}", thread_name, e);
                        return;
                    }
                };

                let mut role = build_role(&role_config, &config, Arc::clone(&hub), channel);
                run_role(role.as_mut(), &hub, cadence);
            })?;

        handles.push(RoleHandle { name, handle });
    }

    Ok(handles)
}
