//! Configuration loading for Matsya

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::channel::{Endpoint, RetryPolicy};
use crate::error::{MatsyaError, Result};
use crate::hub::HubLayout;
use crate::mission::GoalConfig;
use crate::types::{Feature, System};

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MatsyaConfig {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub cadence: CadenceConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub hydrophone: HydrophoneConfig,
    /// Worker roles to run, one thread each
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    pub mission: Option<MissionConfig>,
}

/// Hub slot sizes
#[derive(Clone, Debug, Deserialize)]
pub struct HubConfig {
    /// Number of image buffers (default: 2, front and down)
    #[serde(default = "default_image_slots")]
    pub image_slots: usize,

    /// Number of vision process enable flags (default: 4)
    #[serde(default = "default_vision_processes")]
    pub vision_processes: usize,
}

/// Role loop sleep intervals
#[derive(Clone, Debug, Deserialize)]
pub struct CadenceConfig {
    /// Interval for high-frequency roles in milliseconds (default: 10)
    #[serde(default = "default_fast_ms")]
    pub fast_ms: u64,

    /// Interval for low-frequency or idle roles in milliseconds (default: 100)
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
}

/// Channel open and reconnect timing
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelConfig {
    /// Fixed interval between open attempts in milliseconds (default: 10)
    #[serde(default = "default_open_interval_ms")]
    pub open_interval_ms: u64,

    /// First reconnect delay in milliseconds (default: 10)
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Reconnect delay ceiling in milliseconds (default: 1000)
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

/// Estimator bootstrap and queue monitoring
#[derive(Clone, Debug, Deserialize)]
pub struct EstimatorConfig {
    /// Estimator state dimension (default: 16)
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Initial feature coordinates
    #[serde(default)]
    pub initial: Vec<f32>,

    /// Initial per-feature variance
    #[serde(default)]
    pub variance: Vec<f32>,

    /// Warn when one drain carries more evidence than this (default: 1000)
    #[serde(default = "default_evidence_warn")]
    pub evidence_warn_threshold: usize,
}

/// Acoustic pinger geometry
#[derive(Clone, Debug, Deserialize)]
pub struct HydrophoneConfig {
    /// Depth of the pool floor where the pinger sits, meters (default: 15.0)
    #[serde(default = "default_pool_depth")]
    pub pool_depth: f32,

    /// Half-width of the elevation bracket used for the spread, radians (default: 0.3)
    #[serde(default = "default_small_angle")]
    pub small_angle: f32,

    /// Model feature for the pinger x coordinate
    #[serde(default = "default_pinger_x")]
    pub pinger_x: Feature,

    /// Model feature for the pinger y coordinate
    #[serde(default = "default_pinger_y")]
    pub pinger_y: Feature,

    /// Optional model feature receiving the world bearing to the pinger
    #[serde(default)]
    pub bearing: Option<Feature>,

    /// Optional model feature receiving the elevation angle to the pinger
    #[serde(default)]
    pub elevation: Option<Feature>,
}

/// One worker role and its peer
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleConfig {
    /// Acoustic bearing ingest
    Hydrophone { endpoint: Endpoint },
    /// Visual detection ingest for one vision process
    Vision {
        endpoint: Endpoint,
        process: usize,
        image: usize,
    },
    /// Image acquisition into one image slot
    Camera { endpoint: Endpoint, image: usize },
    /// Model update against the external estimator
    Estimator { endpoint: Endpoint },
    /// Pose update and actuator command relay
    Control { endpoint: Endpoint },
    /// External command/query server
    FrontEnd { endpoint: Endpoint },
}

impl RoleConfig {
    /// Thread and log name for this role
    pub fn name(&self) -> String {
        match self {
            RoleConfig::Hydrophone { .. } => "hydrophone".to_string(),
            RoleConfig::Vision { process, .. } => format!("vision-{}", process),
            RoleConfig::Camera { image, .. } => format!("camera-{}", image),
            RoleConfig::Estimator { .. } => "estimator".to_string(),
            RoleConfig::Control { .. } => "control".to_string(),
            RoleConfig::FrontEnd { .. } => "frontend".to_string(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            RoleConfig::Hydrophone { endpoint }
            | RoleConfig::Vision { endpoint, .. }
            | RoleConfig::Camera { endpoint, .. }
            | RoleConfig::Estimator { endpoint }
            | RoleConfig::Control { endpoint }
            | RoleConfig::FrontEnd { endpoint } => endpoint,
        }
    }
}

/// Mission engine settings and goals
#[derive(Clone, Debug, Deserialize)]
pub struct MissionConfig {
    /// Pose polling interval for move actions in milliseconds (default: 100)
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,

    /// Run against a remote front end instead of the in-process hub
    #[serde(default)]
    pub link: Option<Endpoint>,

    /// Stop every role once the mission finishes (default: true)
    #[serde(default = "default_shutdown_on_complete")]
    pub shutdown_on_complete: bool,

    #[serde(default)]
    pub goals: Vec<GoalConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            image_slots: default_image_slots(),
            vision_processes: default_vision_processes(),
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            fast_ms: default_fast_ms(),
            idle_ms: default_idle_ms(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            open_interval_ms: default_open_interval_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            initial: Vec::new(),
            variance: Vec::new(),
            evidence_warn_threshold: default_evidence_warn(),
        }
    }
}

impl Default for HydrophoneConfig {
    fn default() -> Self {
        Self {
            pool_depth: default_pool_depth(),
            small_angle: default_small_angle(),
            pinger_x: default_pinger_x(),
            pinger_y: default_pinger_y(),
            bearing: None,
            elevation: None,
        }
    }
}

// Default value functions
fn default_image_slots() -> usize {
    2
}
fn default_vision_processes() -> usize {
    4
}
fn default_fast_ms() -> u64 {
    10
}
fn default_idle_ms() -> u64 {
    100
}
fn default_open_interval_ms() -> u64 {
    10
}
fn default_reconnect_initial_ms() -> u64 {
    10
}
fn default_reconnect_max_ms() -> u64 {
    1000
}
fn default_dimension() -> usize {
    16
}
fn default_evidence_warn() -> usize {
    1000
}
fn default_pool_depth() -> f32 {
    15.0
}
fn default_small_angle() -> f32 {
    0.3
}
fn default_pinger_x() -> Feature {
    Feature(0)
}
fn default_pinger_y() -> Feature {
    Feature(1)
}
fn default_poll_ms() -> u64 {
    100
}
fn default_shutdown_on_complete() -> bool {
    true
}

impl MatsyaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MatsyaError::Config(format!("Failed to read config file: {}", e)))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: MatsyaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject role slot indices the hub will not have.
    pub fn validate(&self) -> Result<()> {
        for role in &self.roles {
            match role {
                RoleConfig::Vision { process, image, .. } => {
                    if *process >= self.hub.vision_processes {
                        return Err(MatsyaError::Config(format!(
                            "{}: process {} but only {} vision flags",
                            role.name(),
                            process,
                            self.hub.vision_processes
                        )));
                    }
                    if *image >= self.hub.image_slots {
                        return Err(MatsyaError::Config(format!(
                            "{}: image {} but only {} image slots",
                            role.name(),
                            image,
                            self.hub.image_slots
                        )));
                    }
                }
                RoleConfig::Camera { image, .. } if *image >= self.hub.image_slots => {
                    return Err(MatsyaError::Config(format!(
                        "{}: image {} but only {} image slots",
                        role.name(),
                        image,
                        self.hub.image_slots
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn hub_layout(&self) -> HubLayout {
        HubLayout {
            image_slots: self.hub.image_slots,
            vision_processes: self.hub.vision_processes,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            open_interval: Duration::from_millis(self.channel.open_interval_ms),
            reconnect_initial: Duration::from_millis(self.channel.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.channel.reconnect_max_ms),
        }
    }

    /// Estimator bootstrap description
    pub fn system(&self) -> System {
        System {
            dimension: self.estimator.dimension,
            initial: self.estimator.initial.clone(),
            variance: self.estimator.variance.clone(),
        }
    }
}
