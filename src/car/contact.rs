//! Core shared types for the `car` module (engine-agnostic).
//!
//! Conventions used throughout: +Z is chassis forward, +X is right, +Y is up.
//! Steer angles cross the boundary in degrees, torques in N*m.

use nalgebra::{Point3, UnitQuaternion, Vector3};

// ============================================
// Wheel identification
// ============================================

/// Wheel slots in physics-array order: front axle first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WheelId {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelId {
    pub const ALL: [WheelId; 4] = [
        WheelId::FrontLeft,
        WheelId::FrontRight,
        WheelId::RearLeft,
        WheelId::RearRight,
    ];

    pub const FRONT: [WheelId; 2] = [WheelId::FrontLeft, WheelId::FrontRight];
    pub const REAR: [WheelId; 2] = [WheelId::RearLeft, WheelId::RearRight];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            WheelId::FrontLeft => 0,
            WheelId::FrontRight => 1,
            WheelId::RearLeft => 2,
            WheelId::RearRight => 3,
        }
    }

    #[inline]
    pub fn is_front(self) -> bool {
        matches!(self, WheelId::FrontLeft | WheelId::FrontRight)
    }

    #[inline]
    pub fn is_rear(self) -> bool {
        !self.is_front()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WheelId::FrontLeft => "FL",
            WheelId::FrontRight => "FR",
            WheelId::RearLeft => "RL",
            WheelId::RearRight => "RR",
        }
    }
}

// ============================================
// Driver input
// ============================================

/// Raw driver axes as fed to [`CarController::drive`](crate::car::CarController::drive).
///
/// `footbrake` uses the negative-axis convention: 0 is released, -1 is full
/// brake. The controller sign-inverts and clamps it; out-of-range values on
/// any axis are silently clamped, never rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInput {
    pub steer: f32,     // -1..1
    pub accel: f32,     // 0..1
    pub footbrake: f32, // -1..0
    pub handbrake: f32, // 0..1
}

impl ControlInput {
    /// Full stop: no steer, no throttle, full footbrake + handbrake.
    pub const FULL_STOP: ControlInput = ControlInput {
        steer: 0.0,
        accel: 0.0,
        footbrake: -1.0,
        handbrake: 1.0,
    };
}

// ============================================
// Contact + body snapshots
// ============================================

/// Per-wheel ground contact snapshot supplied by the physics engine.
///
/// Valid only within the tick it was sampled in. A zero `normal` means the
/// wheel is airborne and the slip ratios are meaningless.
#[derive(Debug, Clone, Copy)]
pub struct WheelContact {
    pub normal: Vector3<f32>,
    pub forward_slip: f32,
    pub sideways_slip: f32,
    pub world_position: Point3<f32>,
    pub world_rotation: UnitQuaternion<f32>,
}

impl WheelContact {
    /// Snapshot for a wheel with no ground under it.
    pub fn airborne() -> Self {
        Self {
            normal: Vector3::zeros(),
            forward_slip: 0.0,
            sideways_slip: 0.0,
            world_position: Point3::origin(),
            world_rotation: UnitQuaternion::identity(),
        }
    }

    #[inline]
    pub fn grounded(&self) -> bool {
        self.normal != Vector3::zeros()
    }
}

/// Read-only rigid body sample used by the AI planner.
#[derive(Debug, Clone, Copy)]
pub struct BodyState {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
}

impl BodyState {
    #[inline]
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    #[inline]
    pub fn right(&self) -> Vector3<f32> {
        self.rotation * Vector3::x()
    }

    /// World point expressed in the chassis local frame.
    #[inline]
    pub fn inverse_transform_point(&self, p: Point3<f32>) -> Point3<f32> {
        self.rotation.inverse_transform_point(&Point3::from(p - self.position.coords))
    }
}

/// World pose a vehicle can be asked to drive towards.
#[derive(Debug, Clone, Copy)]
pub struct TargetPose {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl TargetPose {
    #[inline]
    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    #[inline]
    pub fn right(&self) -> Vector3<f32> {
        self.rotation * Vector3::x()
    }
}

// ============================================
// Physics engine boundary
// ============================================

/// Everything the controller is allowed to do to the physics engine.
///
/// One implementor wraps a rapier rigid body + wheel command array
/// (`physics::RapierCar`); tests use a bench rig. Contact reads are
/// snapshot reads valid only within the current tick.
pub trait CarPhysics {
    fn wheel_contact(&self, wheel: WheelId) -> WheelContact;

    fn set_motor_torque(&mut self, wheel: WheelId, torque: f32);
    fn set_brake_torque(&mut self, wheel: WheelId, torque: f32);
    fn set_steer_angle(&mut self, wheel: WheelId, degrees: f32);

    fn velocity(&self) -> Vector3<f32>;
    fn set_velocity(&mut self, velocity: Vector3<f32>);
    fn angular_velocity(&self) -> Vector3<f32>;
    fn apply_force(&mut self, force: Vector3<f32>);

    fn position(&self) -> Point3<f32>;
    fn rotation(&self) -> UnitQuaternion<f32>;

    fn body_state(&self) -> BodyState {
        BodyState {
            position: self.position(),
            rotation: self.rotation(),
            velocity: self.velocity(),
            angular_velocity: self.angular_velocity(),
        }
    }
}

/// Angle between two vectors in degrees; 0 if either is ~zero.
#[inline]
pub(crate) fn angle_between_deg(a: Vector3<f32>, b: Vector3<f32>) -> f32 {
    let denom = a.norm() * b.norm();
    if denom < 1e-6 {
        return 0.0;
    }
    (a.dot(&b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}
