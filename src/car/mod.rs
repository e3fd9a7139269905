//! car - engine-agnostic vehicle control (controller, AI driver, effects)

pub mod ai;
pub mod config;
pub mod contact;
pub mod controller;
pub mod effects;
pub mod noise;

pub use ai::{AiConfig, BrakeCondition, CarAiControl};
pub use config::{CarConfig, ConfigError, DriveType, SpeedUnit, ROAD_CAR};
pub use contact::{BodyState, CarPhysics, ControlInput, TargetPose, WheelContact, WheelId};
pub use controller::CarController;
pub use effects::{SkidTrailPool, WheelEffects, WheelEffectsSet, TRAIL_LINGER_SECS};
