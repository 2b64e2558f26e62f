//! Matsya - AUV runtime core
//!
//! A central process that fuses observations from independent sensor and
//! actuator peers into one vehicle state and world model, and drives a
//! scripted mission through that state.
//!
//! ## Architecture
//!
//! ```text
//! hydrophone / vision roles ──Evidence──▶ StateHub ──▶ estimator role ──▶ estimator peer
//!                                           ▲  │                              │
//!                      camera role ─frames──┘  │◀──────── Model ──────────────┘
//!                                              │
//!            mission (Vehicle) ──commands──▶ StateHub ──▶ control role ──▶ actuator peer
//!                                              ▲
//!                         front-end role ──────┘
//! ```
//!
//! - [`hub`]: lock-guarded shared state
//! - [`roles`]: one thread per peer
//! - [`mission`]: goals and actions
//! - [`channel`] / [`protocol`]: text peer links and the front-end grammar

pub mod channel;
pub mod config;
pub mod error;
pub mod hub;
pub mod mission;
pub mod protocol;
pub mod roles;
pub mod shutdown;
pub mod types;
pub mod utils;

pub use channel::{Channel, Endpoint, RetryPolicy};
pub use config::MatsyaConfig;
pub use error::{MatsyaError, Result};
pub use hub::{ActuatorFlag, HubLayout, StateHub};
pub use mission::{Action, Goal, GoalState, HubVehicle, Mission, RemoteVehicle, Vehicle};
pub use shutdown::Shutdown;
pub use types::{Evidence, Feature, Frame, Model, Observation, Pose, Side, System};
