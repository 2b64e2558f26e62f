//! Core value types and their text wire format.
//!
//! | Type     | Wire format                                  |
//! |----------|----------------------------------------------|
//! | Pose     | `x y depth yaw pitch roll`                   |
//! | Model    | `n v0 .. v(n-1)`                             |
//! | Evidence | `n` then `feature value spread` per entry    |
//! | Frame    | `width height len` newline, then `len` bytes |
//! | System   | `dimension`, initial model, variance vector  |

use serde::Deserialize;

use crate::channel::Channel;
use crate::error::{MatsyaError, Result};
use crate::utils::normalize_angle;

/// Upper bound on vector lengths accepted from peers.
pub const MAX_VECTOR_LEN: usize = 4096;

/// Upper bound on a single frame payload (64 MiB).
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Vehicle pose, or a commanded pose/delta.
///
/// Translation in meters (depth positive down), rotation in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub depth: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Pose {
    pub const ZERO: Pose = Pose {
        x: 0.0,
        y: 0.0,
        depth: 0.0,
        yaw: 0.0,
        pitch: 0.0,
        roll: 0.0,
    };

    pub fn new(x: f32, y: f32, depth: f32, yaw: f32, pitch: f32, roll: f32) -> Self {
        Self {
            x,
            y,
            depth,
            yaw,
            pitch,
            roll,
        }
    }

    /// Pose with translation only.
    pub fn at(x: f32, y: f32, depth: f32) -> Self {
        Self {
            x,
            y,
            depth,
            ..Self::ZERO
        }
    }

    /// Combined translation and rotation error to another pose.
    pub fn distance(&self, other: &Pose) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.depth - other.depth;
        let dyaw = normalize_angle(self.yaw - other.yaw);
        let dpitch = normalize_angle(self.pitch - other.pitch);
        let droll = normalize_angle(self.roll - other.roll);
        (dx * dx + dy * dy + dz * dz + dyaw * dyaw + dpitch * dpitch + droll * droll).sqrt()
    }

    /// Apply a delta expressed in the vehicle frame (x forward, y left).
    pub fn offset_body(&self, delta: &Pose) -> Pose {
        let (sin, cos) = self.yaw.sin_cos();
        Pose {
            x: self.x + delta.x * cos - delta.y * sin,
            y: self.y + delta.x * sin + delta.y * cos,
            depth: self.depth + delta.depth,
            yaw: normalize_angle(self.yaw + delta.yaw),
            pitch: normalize_angle(self.pitch + delta.pitch),
            roll: normalize_angle(self.roll + delta.roll),
        }
    }

    /// Heading from this pose toward a point in the horizontal plane.
    pub fn bearing_to(&self, x: f32, y: f32) -> f32 {
        (y - self.y).atan2(x - self.x)
    }

    /// Same pose with a different heading.
    pub fn with_yaw(&self, yaw: f32) -> Pose {
        Pose {
            yaw: normalize_angle(yaw),
            ..*self
        }
    }

    pub fn to_wire(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.x, self.y, self.depth, self.yaw, self.pitch, self.roll
        )
    }

    pub fn read(channel: &mut Channel) -> Result<Self> {
        Ok(Self {
            x: channel.read_value()?,
            y: channel.read_value()?,
            depth: channel.read_value()?,
            yaw: channel.read_value()?,
            pitch: channel.read_value()?,
            roll: channel.read_value()?,
        })
    }

    pub fn write(&self, channel: &mut Channel) -> Result<()> {
        channel.send(&self.to_wire())
    }
}

/// Index of a world feature inside the model vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct Feature(pub usize);

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Current best estimate of world-feature coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    values: Vec<f32>,
    version: u64,
}

impl Model {
    pub fn new(values: Vec<f32>, version: u64) -> Self {
        Self { values, version }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Coordinate of a feature, if the model covers it.
    pub fn get(&self, feature: Feature) -> Option<f32> {
        self.values.get(feature.0).copied()
    }

    /// Coordinate of a feature, or a mission error naming it.
    pub fn require(&self, feature: Feature) -> Result<f32> {
        self.get(feature).ok_or_else(|| {
            MatsyaError::Mission(format!(
                "feature {} outside model of length {}",
                feature,
                self.values.len()
            ))
        })
    }

    pub fn write(&self, channel: &mut Channel) -> Result<()> {
        write_vector(channel, &self.values)
    }
}

/// Read a length-prefixed vector of floats.
pub fn read_vector(channel: &mut Channel) -> Result<Vec<f32>> {
    let len: usize = channel.read_value()?;
    if len > MAX_VECTOR_LEN {
        return Err(MatsyaError::Protocol(format!(
            "vector length {} exceeds {}",
            len, MAX_VECTOR_LEN
        )));
    }
    (0..len).map(|_| channel.read_value()).collect()
}

/// Write a length-prefixed vector of floats on one line.
pub fn write_vector(channel: &mut Channel, values: &[f32]) -> Result<()> {
    let mut line = values.len().to_string();
    for v in values {
        line.push(' ');
        line.push_str(&v.to_string());
    }
    channel.send(&line)
}

/// One measured feature coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub feature: Feature,
    pub value: f32,
    /// Uncertainty spread (standard deviation)
    pub spread: f32,
}

impl Observation {
    pub fn new(feature: Feature, value: f32, spread: f32) -> Self {
        Self {
            feature,
            value,
            spread,
        }
    }
}

/// Immutable bundle of observations produced by one role in one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Evidence {
    observations: Vec<Observation>,
}

impl Evidence {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn read(channel: &mut Channel) -> Result<Self> {
        let len: usize = channel.read_value()?;
        if len > MAX_VECTOR_LEN {
            return Err(MatsyaError::Protocol(format!(
                "evidence length {} exceeds {}",
                len, MAX_VECTOR_LEN
            )));
        }
        let mut observations = Vec::with_capacity(len);
        for _ in 0..len {
            observations.push(Observation {
                feature: Feature(channel.read_value()?),
                value: channel.read_value()?,
                spread: channel.read_value()?,
            });
        }
        Ok(Self { observations })
    }

    pub fn write(&self, channel: &mut Channel) -> Result<()> {
        channel.send(&self.observations.len().to_string())?;
        for o in &self.observations {
            channel.send(&format!("{} {} {}", o.feature.0, o.value, o.spread))?;
        }
        Ok(())
    }
}

/// Camera frame as opaque bytes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn read(channel: &mut Channel) -> Result<Self> {
        let width: u32 = channel.read_value()?;
        let height: u32 = channel.read_value()?;
        let len: usize = channel.read_value()?;
        if len > MAX_FRAME_BYTES {
            return Err(MatsyaError::Protocol(format!(
                "frame of {} bytes exceeds {}",
                len, MAX_FRAME_BYTES
            )));
        }
        let data = channel.read_bytes(len)?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn write(&self, channel: &mut Channel) -> Result<()> {
        channel.send(&format!("{} {} {}", self.width, self.height, self.data.len()))?;
        channel.send_bytes(&self.data)
    }
}

/// Torpedo launcher side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_char(&self) -> char {
        match self {
            Side::Left => 'l',
            Side::Right => 'r',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'l' => Some(Side::Left),
            'r' => Some(Side::Right),
            _ => None,
        }
    }
}

/// Estimator bootstrap description.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct System {
    /// State dimension of the estimator
    pub dimension: usize,
    /// Initial feature coordinates
    #[serde(default)]
    pub initial: Vec<f32>,
    /// Initial per-feature variance
    #[serde(default)]
    pub variance: Vec<f32>,
}

impl System {
    pub fn write(&self, channel: &mut Channel) -> Result<()> {
        channel.send(&self.dimension.to_string())?;
        write_vector(channel, &self.initial)?;
        write_vector(channel, &self.variance)
    }
}
