// ==============================================================================
// suspension.rs — RAYCAST SUSPENSION + CONTACT PATCH KINEMATICS
// ------------------------------------------------------------------------------
// Per-wheel raycasts against the scene, producing a SuspensionSample with:
// - geometry: hit point, ground normal, apply point
// - suspension state: compression, compression ratio, spring+damper force
// - kinematics: point velocity at the contact (linvel + ω×r)
// - wheel basis (forward/side) including the commanded steer angle
// - slip velocity components (v_long, v_lat) used when applying tire impulses
//
// This module does NOT apply impulses. It only measures and constructs
// contact data; physics.rs turns samples into forces.
//
// Ground normal is assumed flat-up. Chassis convention: +Z forward, +X right.
// ==============================================================================

use nalgebra::UnitQuaternion;
use rapier3d::prelude::*;
use rapier3d::prelude::vector;

use crate::car::WheelId;

/// Spring + raycast geometry of one wheel, fixed at spawn.
#[derive(Clone)]
pub struct WheelMount {
    pub wheel: WheelId,
    pub offset: Point<Real>, // chassis local space
    pub rest_length: Real,
    pub max_length: Real,
    pub radius: Real,

    pub stiffness: Real, // N/m
    pub damping: Real,   // N*s/m
}

/// One wheel's measured contact for the current tick.
#[derive(Clone, Copy)]
pub struct SuspensionSample {
    pub wheel: WheelId,

    // geometry
    pub hit_point: Point<Real>,
    pub apply_point: Point<Real>,
    pub ground_normal: Vector<Real>,

    // suspension state
    pub compression: f32,
    pub compression_ratio: f32,
    pub normal_force: f32,

    // kinematics
    pub point_vel: Vector<Real>,

    // wheel basis (world, ground-projected)
    pub forward: Vector<Real>,
    pub side: Vector<Real>,

    // slip velocity components
    pub v_long: f32,
    pub v_lat: f32,
}

/// Spring/damper constants from the static sag you want under gravity.
/// `zeta` is the damping ratio (0.7–1.0 sensible).
pub fn suspension_from_sag(vehicle_mass: f32, wheels: usize, sag_m: f32, zeta: f32) -> (f32, f32) {
    let m = vehicle_mass / wheels as f32;
    let g = 9.81_f32;
    let f_static = m * g; // per wheel
    let k = f_static / sag_m.max(1e-3); // N/m

    // c = 2*zeta*sqrt(k*m)
    let c = 2.0 * zeta * (k * m).sqrt();
    (k, c)
}

pub(crate) fn compute_suspension_force(
    compression: f32,
    suspension_vel: f32,
    k: f32,
    c: f32,
) -> f32 {
    // Deadzone to kill micro jitter
    let v = if suspension_vel.abs() < 0.05 { 0.0 } else { suspension_vel };

    // One-way damper (kills rebound bounce)
    let v = if v > 0.0 { v * 0.4 } else { v };

    let spring = k * compression;
    let damper = (-c * v).clamp(-spring * 0.6, spring * 0.6);

    (spring + damper).max(0.0)
}

/// World-space steered wheel basis on a flat ground plane.
///
/// Positive `steer_deg` turns the wheel towards +X (right). Returns
/// (forward, side) with side pointing right of the wheel's travel.
pub fn steered_basis(
    rot: &UnitQuaternion<Real>,
    steer_deg: f32,
    ground_n: &Vector<Real>,
) -> (Vector<Real>, Vector<Real>) {
    let steer_rot = UnitQuaternion::from_axis_angle(&Vector::y_axis(), steer_deg.to_radians());
    let steered = steer_rot * (rot * vector![0.0, 0.0, 1.0]);

    // project onto the ground plane
    let forward = {
        let v = steered - ground_n * steered.dot(ground_n);
        if v.magnitude() > 1e-6 {
            v.normalize()
        } else {
            vector![0.0, 0.0, 1.0]
        }
    };

    let side = ground_n.cross(&forward);
    (forward, side)
}

/// Cast one wheel's suspension ray and build the full contact sample.
///
/// `steer_deg` is the commanded steer angle for THIS wheel (0 for rear).
/// Returns None when the wheel is airborne or the spring is fully extended.
pub fn sample_wheel(
    mount: &WheelMount,
    steer_deg: f32,
    body_ro: &RigidBody,
    handle: RigidBodyHandle,
    query: &QueryPipeline,
    bodies: &RigidBodySet,
    colliders: &ColliderSet,
) -> Option<SuspensionSample> {
    let pos = body_ro.position();
    let rot = pos.rotation;
    let linvel = *body_ro.linvel();
    let angvel = *body_ro.angvel();
    // center_of_mass() is already world-space
    let com = *body_ro.center_of_mass();

    let origin = pos * (mount.offset + vector![0.0, mount.radius + 0.02, 0.0]);
    let dir = vector![0.0, -1.0, 0.0];
    let ground_n = vector![0.0, 1.0, 0.0];

    let ray = Ray::new(origin, dir);
    let max_dist = mount.rest_length + mount.max_length + mount.radius;

    let filter = QueryFilter::default().exclude_rigid_body(handle);

    let (_hit, toi) = query.cast_ray(bodies, colliders, &ray, max_dist, true, filter)?;

    if toi <= mount.radius {
        return None;
    }

    let hit_point = origin + dir * toi;
    let suspension_length = toi - mount.radius;
    let compression = (mount.rest_length - suspension_length).clamp(0.0, mount.max_length);

    if compression <= 0.0 {
        return None;
    }

    let compression_ratio = compression / mount.max_length;

    let r = hit_point.coords - com.coords;
    let point_vel = linvel + angvel.cross(&r);
    let suspension_vel = point_vel.dot(&ground_n);

    let normal_force =
        compute_suspension_force(compression, suspension_vel, mount.stiffness, mount.damping);

    let (forward, side) = steered_basis(&rot, steer_deg, &ground_n);

    let v_long = point_vel.dot(&forward);
    let v_lat = point_vel.dot(&side);

    // applying slightly above the contact reduces roll overshoot
    let apply_point = hit_point + ground_n * (mount.radius * 0.25);

    Some(SuspensionSample {
        wheel: mount.wheel,
        hit_point,
        apply_point,
        ground_normal: ground_n,
        compression,
        compression_ratio,
        normal_force,
        point_vel,
        forward,
        side,
        v_long,
        v_lat,
    })
}
