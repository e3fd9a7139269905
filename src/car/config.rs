//! Per-vehicle tuning record, validated once at construction.

use thiserror::Error;

use crate::car::contact::WheelId;

/// Which axle(s) receive engine torque. Immutable per vehicle instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    FrontWheelDrive,
    RearWheelDrive,
    FourWheelDrive,
}

impl DriveType {
    /// Wheels the engine torque is split across.
    pub fn driven_wheels(self) -> &'static [WheelId] {
        match self {
            DriveType::FrontWheelDrive => &WheelId::FRONT,
            DriveType::RearWheelDrive => &WheelId::REAR,
            DriveType::FourWheelDrive => &WheelId::ALL,
        }
    }

    #[inline]
    pub fn wheel_count(self) -> f32 {
        self.driven_wheels().len() as f32
    }
}

/// Unit the top speed is expressed in (and telemetry speed is reported in).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    Mph,
    Kph,
}

impl SpeedUnit {
    /// Conversion factor from m/s to this unit.
    #[inline]
    pub fn per_meter_second(self) -> f32 {
        match self {
            SpeedUnit::Mph => 2.236_936_3,
            SpeedUnit::Kph => 3.6,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    GainOutOfRange { name: &'static str, value: f32 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("gear count must be at least 1")]
    NoGears,
}

/// Flat tuning record for one vehicle. All fields immutable after spawn.
#[derive(Debug, Clone, Copy)]
pub struct CarConfig {
    pub drive_type: DriveType,
    pub speed_unit: SpeedUnit,

    pub max_steer_angle: f32, // degrees
    /// 0 is raw physics, 1 fully realigns velocity to the heading change.
    pub steer_helper: f32,
    /// Heading jumps beyond this many degrees per tick are treated as a
    /// discontinuity and skipped by the steer assist.
    pub steer_assist_jump_deg: f32,

    pub full_torque_over_all_wheels: f32, // N*m
    pub reverse_torque: f32,              // N*m
    pub max_handbrake_torque: f32,        // N*m
    pub brake_torque: f32,                // N*m

    /// 0 is no traction control, 1 is full interference.
    pub traction_control: f32,
    /// Budget adjustment per tick, scaled by `traction_control`.
    pub traction_control_step: f32,
    /// Slip ratio at which a wheel counts as spinning/skidding.
    pub slip_limit: f32,

    pub downforce: f32, // N per m/s
    pub top_speed: f32, // in `speed_unit`

    pub gear_count: u32,
    /// Upper bound of the lowest gear's rev band, 0..1.
    pub rev_range_boundary: f32,
}

/// Road-car baseline, tuned for the default rapier chassis.
pub const ROAD_CAR: CarConfig = CarConfig {
    drive_type: DriveType::FourWheelDrive,
    speed_unit: SpeedUnit::Mph,

    max_steer_angle: 25.0,
    steer_helper: 0.6,
    steer_assist_jump_deg: 10.0,

    full_torque_over_all_wheels: 2500.0,
    reverse_torque: 500.0,
    max_handbrake_torque: 10_000.0,
    brake_torque: 20_000.0,

    traction_control: 1.0,
    traction_control_step: 10.0,
    slip_limit: 0.3,

    downforce: 100.0,
    top_speed: 120.0,

    gear_count: 5,
    rev_range_boundary: 1.0,
};

impl CarConfig {
    /// Fail-fast construction-time check. Runtime ticks assume this passed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("steer_helper", self.steer_helper),
            ("traction_control", self.traction_control),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::GainOutOfRange { name, value });
            }
        }

        for (name, value) in [
            ("max_steer_angle", self.max_steer_angle),
            ("steer_assist_jump_deg", self.steer_assist_jump_deg),
            ("full_torque_over_all_wheels", self.full_torque_over_all_wheels),
            ("brake_torque", self.brake_torque),
            ("traction_control_step", self.traction_control_step),
            ("slip_limit", self.slip_limit),
            ("top_speed", self.top_speed),
            ("rev_range_boundary", self.rev_range_boundary),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        if self.gear_count == 0 {
            return Err(ConfigError::NoGears);
        }

        Ok(())
    }

    /// Top speed converted to m/s.
    #[inline]
    pub fn top_speed_ms(&self) -> f32 {
        self.top_speed / self.speed_unit.per_meter_second()
    }
}
