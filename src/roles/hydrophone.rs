//! Hydrophone role: acoustic pinger bearings to position evidence.
//!
//! The peer streams `h <theta> <phi>` records unprompted. `theta` is the
//! bearing relative to the vehicle heading and `phi` the elevation angle
//! (negative below the horizon). Combined with the current pose and the known
//! pool depth this places the pinger on the floor.

use std::sync::Arc;

use super::{Pace, Role};
use crate::channel::Channel;
use crate::config::HydrophoneConfig;
use crate::error::{MatsyaError, Result};
use crate::hub::StateHub;
use crate::types::{Evidence, Observation, Pose};
use crate::utils::normalize_angle;

pub struct HydrophoneRole {
    config: HydrophoneConfig,
    hub: Arc<StateHub>,
    channel: Channel,
}

impl HydrophoneRole {
    pub fn new(config: HydrophoneConfig, hub: Arc<StateHub>, channel: Channel) -> Self {
        Self {
            config,
            hub,
            channel,
        }
    }
}

impl Role for HydrophoneRole {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn cycle(&mut self) -> Result<Pace> {
        let tag = self.channel.read_char()?;
        if tag != 'h' {
            return Err(MatsyaError::Protocol(format!(
                "expected hydrophone record 'h', got {:?}",
                tag
            )));
        }
        let theta: f32 = self.channel.read_value()?;
        let phi: f32 = self.channel.read_value()?;

        let pose = self.hub.snapshot_pose();
        let evidence = locate_pinger(&self.config, &pose, theta, phi)?;
        tracing::debug!(
            "[{}] theta={:.3} phi={:.3} -> {} observations",
            self.channel.name(),
            theta,
            phi,
            evidence.len()
        );
        self.hub.push_evidence(evidence);

        Ok(Pace::Fast)
    }
}

/// Pinger position evidence from one bearing/elevation pair.
///
/// The horizontal range is the height above the floor times `tan(-phi)`;
/// its spread brackets `phi` by the configured small angle.
pub fn locate_pinger(
    config: &HydrophoneConfig,
    pose: &Pose,
    theta: f32,
    phi: f32,
) -> Result<Evidence> {
    if !theta.is_finite() || !phi.is_finite() {
        return Err(MatsyaError::Protocol(format!(
            "non-finite bearing ({}, {})",
            theta, phi
        )));
    }

    let height = config.pool_depth - pose.depth;
    let range = height * (-phi).tan();
    let spread = (height
        * ((-phi + config.small_angle).tan() - (-phi - config.small_angle).tan()))
    .abs();

    if !range.is_finite() || !spread.is_finite() {
        return Err(MatsyaError::Protocol(format!(
            "elevation {} gives no usable range",
            phi
        )));
    }

    let heading = theta + pose.yaw;
    let mut observations = vec![
        Observation::new(config.pinger_x, pose.x + range * heading.cos(), spread),
        Observation::new(config.pinger_y, pose.y + range * heading.sin(), spread),
    ];
    if let Some(feature) = config.bearing {
        observations.push(Observation::new(
            feature,
            normalize_angle(heading),
            config.small_angle,
        ));
    }
    if let Some(feature) = config.elevation {
        observations.push(Observation::new(feature, phi, config.small_angle));
    }

    Ok(Evidence::new(observations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SharedBuffer;
    use crate::hub::HubLayout;
    use crate::shutdown::Shutdown;
    use crate::types::Feature;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
    use std::io::Cursor;

    fn config() -> HydrophoneConfig {
        HydrophoneConfig {
            pool_depth: 10.0,
            ..HydrophoneConfig::default()
        }
    }

    #[test]
    fn test_pinger_straight_ahead() {
        // 5 m above the floor, looking 45 degrees down.
        let pose = Pose::at(1.0, 2.0, 5.0);
        let evidence = locate_pinger(&config(), &pose, 0.0, -FRAC_PI_4).unwrap();
        let obs = evidence.observations();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].feature, Feature(0));
        assert_relative_eq!(obs[0].value, 6.0, epsilon = 1e-4);
        assert_relative_eq!(obs[1].value, 2.0, epsilon = 1e-4);
        assert!(obs[0].spread > 0.0);
        assert_eq!(obs[0].spread, obs[1].spread);
    }

    #[test]
    fn test_bearing_uses_vehicle_heading() {
        let pose = Pose::new(0.0, 0.0, 5.0, FRAC_PI_2, 0.0, 0.0);
        let cfg = HydrophoneConfig {
            bearing: Some(Feature(4)),
            elevation: Some(Feature(5)),
            ..config()
        };
        let evidence = locate_pinger(&cfg, &pose, 0.0, -FRAC_PI_4).unwrap();
        let obs = evidence.observations();
        assert_relative_eq!(obs[0].value, 0.0, epsilon = 1e-4);
        assert_relative_eq!(obs[1].value, 5.0, epsilon = 1e-4);
        assert_eq!(obs[2].feature, Feature(4));
        assert_relative_eq!(obs[2].value, FRAC_PI_2);
        assert_relative_eq!(obs[3].value, -FRAC_PI_4);
    }

    #[test]
    fn test_cycle_pushes_evidence() {
        let hub = Arc::new(StateHub::new(HubLayout::default(), Shutdown::new()));
        hub.store_pose(Pose::at(0.0, 0.0, 5.0));
        let channel = Channel::in_memory(
            "hydrophone",
            Cursor::new(b"h 0 -0.785398\nx 1 2\n".to_vec()),
            SharedBuffer::new(),
        );
        let mut role = HydrophoneRole::new(config(), Arc::clone(&hub), channel);

        assert_eq!(role.cycle().unwrap(), Pace::Fast);
        assert_eq!(hub.evidence_pending(), 1);

        assert!(matches!(role.cycle(), Err(MatsyaError::Protocol(_))));
        assert_eq!(hub.evidence_pending(), 1);
    }
}
