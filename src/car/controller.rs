//! Drive controller: normalized driver axes in, per-wheel commands out.
//!
//! `drive` runs once per physics tick and is not reentrant; it owns every
//! piece of persistent vehicle state (torque budget, gear, smoothed gear
//! factor, previous heading). All engine access goes through [`CarPhysics`].

use log::trace;
use nalgebra::{UnitQuaternion, Vector3};

use crate::car::config::{CarConfig, ConfigError};
use crate::car::contact::{CarPhysics, ControlInput, WheelId, angle_between_deg};
use crate::car::effects::{SkidTrailPool, WheelEffectsSet};

/// Speed (in the configured unit) above which footbrake means braking
/// rather than reversing.
const REVERSING_SPEED_LIMIT: f32 = 5.0;

/// Max angle between heading and velocity for footbrake to count as braking.
const REVERSING_ANGLE_LIMIT_DEG: f32 = 50.0;

/// Time constant of the gear-factor smoothing, per second.
const GEAR_FACTOR_RATE: f32 = 5.0;

pub struct CarController {
    config: CarConfig,

    // persistent per-tick state
    current_torque: f32,
    gear_index: u32,
    gear_factor: f32,
    revs: f32,
    steer_angle: f32,
    prev_heading_deg: Option<f32>,

    // telemetry, refreshed every tick
    current_speed: f32,
    accel_input: f32,
    brake_input: f32,
}

impl CarController {
    /// Fails fast on an invalid tuning record; ticks never fail afterwards.
    pub fn new(config: CarConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            // traction control starts with the budget already reduced
            current_torque: config.full_torque_over_all_wheels
                * (1.0 - config.traction_control),
            gear_index: 0,
            gear_factor: 0.0,
            revs: 0.0,
            steer_angle: 0.0,
            prev_heading_deg: None,
            current_speed: 0.0,
            accel_input: 0.0,
            brake_input: 0.0,
        })
    }

    // ----- telemetry -----

    pub fn config(&self) -> &CarConfig {
        &self.config
    }

    /// Speed at the last tick, in the configured unit.
    #[inline]
    pub fn current_speed(&self) -> f32 {
        self.current_speed
    }

    /// Top speed in the configured unit.
    #[inline]
    pub fn max_speed(&self) -> f32 {
        self.config.top_speed
    }

    #[inline]
    pub fn revs(&self) -> f32 {
        self.revs
    }

    #[inline]
    pub fn gear(&self) -> u32 {
        self.gear_index
    }

    #[inline]
    pub fn current_steer_angle(&self) -> f32 {
        self.steer_angle
    }

    #[inline]
    pub fn accel_input(&self) -> f32 {
        self.accel_input
    }

    #[inline]
    pub fn brake_input(&self) -> f32 {
        self.brake_input
    }

    #[inline]
    pub fn current_torque(&self) -> f32 {
        self.current_torque
    }

    // ----- the per-tick pipeline -----

    /// Apply one tick of driver input. Out-of-range axes are clamped, never
    /// rejected; the whole tick is a total function of its inputs.
    pub fn drive<P: CarPhysics>(
        &mut self,
        input: ControlInput,
        physics: &mut P,
        effects: &mut WheelEffectsSet,
        trails: &mut SkidTrailPool,
        now: f32,
        dt: f32,
    ) {
        let steer = input.steer.clamp(-1.0, 1.0);
        let accel = input.accel.clamp(0.0, 1.0);
        let footbrake = -input.footbrake.clamp(-1.0, 0.0);
        let handbrake = input.handbrake.clamp(0.0, 1.0);

        self.accel_input = accel;
        self.brake_input = footbrake;
        self.current_speed =
            physics.velocity().norm() * self.config.speed_unit.per_meter_second();

        // steer maps onto the front axle only
        self.steer_angle = steer * self.config.max_steer_angle;
        for wheel in WheelId::FRONT {
            physics.set_steer_angle(wheel, self.steer_angle);
        }

        self.steer_helper(physics);
        self.apply_drive(accel, footbrake, physics);
        self.cap_speed(physics);

        // handbrake overrides the rear brake torque
        if handbrake > 0.0 {
            let torque = handbrake * self.config.max_handbrake_torque;
            for wheel in WheelId::REAR {
                physics.set_brake_torque(wheel, torque);
            }
        }

        self.calculate_revs(dt);
        self.gear_changing();

        self.add_downforce(physics);
        self.check_for_wheel_spin(physics, effects, trails, now);
        self.traction_control(physics);
    }

    /// Grip-proportional velocity realignment: rotate the velocity vector
    /// toward the new heading. Skipped while any wheel is airborne or the
    /// heading jumped too far in one tick (physics teleport).
    fn steer_helper<P: CarPhysics>(&mut self, physics: &mut P) {
        let all_grounded = WheelId::ALL
            .iter()
            .all(|&w| physics.wheel_contact(w).grounded());
        if !all_grounded {
            // don't trust the heading sample either; resync on touchdown
            self.prev_heading_deg = None;
            return;
        }

        let heading = heading_deg(physics.rotation());
        if let Some(prev) = self.prev_heading_deg {
            let delta = wrap_deg(heading - prev);
            if delta.abs() < self.config.steer_assist_jump_deg {
                let adjust = (delta * self.config.steer_helper).to_radians();
                let realign = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), adjust);
                physics.set_velocity(realign * physics.velocity());
            } else {
                trace!("steer assist skipped: heading jumped {delta:.1} deg");
            }
        }
        self.prev_heading_deg = Some(heading);
    }

    fn apply_drive<P: CarPhysics>(&mut self, accel: f32, footbrake: f32, physics: &mut P) {
        let driven = self.config.drive_type.driven_wheels();
        let thrust = accel * self.current_torque / self.config.drive_type.wheel_count();
        for &wheel in driven {
            physics.set_motor_torque(wheel, thrust);
        }

        let velocity = physics.velocity();
        let forward = physics.rotation() * Vector3::z();
        let braking_forward = self.current_speed > REVERSING_SPEED_LIMIT
            && angle_between_deg(forward, velocity) < REVERSING_ANGLE_LIMIT_DEG;

        for wheel in WheelId::ALL {
            if braking_forward {
                physics.set_brake_torque(wheel, self.config.brake_torque * footbrake);
            } else if footbrake > 0.0 {
                // nearly stopped or already moving backwards: footbrake is a
                // reverse command
                physics.set_brake_torque(wheel, 0.0);
                physics.set_motor_torque(wheel, -self.config.reverse_torque * footbrake);
            }
        }
    }

    /// Rescale the velocity magnitude down to the configured top speed.
    fn cap_speed<P: CarPhysics>(&mut self, physics: &mut P) {
        let factor = self.config.speed_unit.per_meter_second();
        let velocity = physics.velocity();
        let speed = velocity.norm() * factor;
        if speed > self.config.top_speed {
            physics.set_velocity(velocity * (self.config.top_speed / speed));
            self.current_speed = self.config.top_speed;
        }
    }

    /// Cosmetic engine revs: normalized position of the speed within the
    /// current gear's band, smoothed, then remapped through gear-dependent
    /// bounds. Never feeds back into torque.
    fn calculate_revs(&mut self, dt: f32) {
        self.calculate_gear_factor(dt);
        let gears = self.config.gear_count as f32;
        let gear_num_factor = self.gear_index as f32 / gears;
        let revs_min = ulerp(0.0, self.config.rev_range_boundary, curve_factor(gear_num_factor));
        let revs_max = ulerp(self.config.rev_range_boundary, 1.0, gear_num_factor);
        self.revs = ulerp(revs_min, revs_max, self.gear_factor);
    }

    fn calculate_gear_factor(&mut self, dt: f32) {
        let f = 1.0 / self.config.gear_count as f32;
        let speed_ratio = (self.current_speed / self.max_speed()).abs();
        let target = inverse_lerp(
            f * self.gear_index as f32,
            f * (self.gear_index + 1) as f32,
            speed_ratio,
        );
        // smooth so revs don't snap when changing gear
        self.gear_factor += (target - self.gear_factor) * (dt * GEAR_FACTOR_RATE).min(1.0);
    }

    /// Step the gear index by at most one per tick, following the speed band.
    fn gear_changing(&mut self) {
        let gears = self.config.gear_count;
        let f = (self.current_speed / self.max_speed()).abs();
        let band = 1.0 / gears as f32;
        let upshift_limit = band * (self.gear_index + 1) as f32;
        let downshift_limit = band * self.gear_index as f32;

        if self.gear_index > 0 && f < downshift_limit {
            self.gear_index -= 1;
        } else if f > upshift_limit && self.gear_index < gears - 1 {
            self.gear_index += 1;
        }
    }

    /// More grip in relation to speed.
    fn add_downforce<P: CarPhysics>(&self, physics: &mut P) {
        let up = physics.rotation() * Vector3::y();
        let speed_ms = physics.velocity().norm();
        physics.apply_force(-up * (self.config.downforce * speed_ms));
    }

    /// Dispatch slip state to the per-wheel effects, serializing skid audio
    /// to one voice at a time.
    fn check_for_wheel_spin<P: CarPhysics>(
        &self,
        physics: &P,
        effects: &mut WheelEffectsSet,
        trails: &mut SkidTrailPool,
        now: f32,
    ) {
        for wheel in WheelId::ALL {
            let contact = physics.wheel_contact(wheel);

            if contact.forward_slip.abs() >= self.config.slip_limit
                || contact.sideways_slip.abs() >= self.config.slip_limit
            {
                effects.wheel_mut(wheel).emit_slip(trails, contact.world_position);
                if !effects.any_audio_playing() {
                    effects.wheel_mut(wheel).play_audio();
                }
                continue;
            }

            if effects.wheel(wheel).playing_audio() {
                effects.wheel_mut(wheel).stop_audio();
            }
            effects.wheel_mut(wheel).end_skid(trails, now);
        }
    }

    /// Additive-decrease/additive-increase budget controller over the driven
    /// wheels' forward slip. The budget stays within
    /// `[0, full_torque_over_all_wheels]` for any slip sequence.
    fn traction_control<P: CarPhysics>(&mut self, physics: &P) {
        for &wheel in self.config.drive_type.driven_wheels() {
            let slip = physics.wheel_contact(wheel).forward_slip;
            self.adjust_torque(slip);
        }
    }

    fn adjust_torque(&mut self, forward_slip: f32) {
        let step = self.config.traction_control_step * self.config.traction_control;
        if forward_slip >= self.config.slip_limit {
            self.current_torque = (self.current_torque - step).max(0.0);
        } else {
            self.current_torque =
                (self.current_torque + step).min(self.config.full_torque_over_all_wheels);
        }
    }
}

/// Compass heading of the chassis forward vector, degrees.
#[inline]
fn heading_deg(rotation: UnitQuaternion<f32>) -> f32 {
    let forward = rotation * Vector3::z();
    forward.x.atan2(forward.z).to_degrees()
}

/// Wrap a degree delta into (-180, 180].
#[inline]
fn wrap_deg(delta: f32) -> f32 {
    let d = (delta + 180.0).rem_euclid(360.0) - 180.0;
    if d == -180.0 { 180.0 } else { d }
}

#[inline]
fn inverse_lerp(from: f32, to: f32, value: f32) -> f32 {
    if (to - from).abs() < f32::EPSILON {
        return 0.0;
    }
    ((value - from) / (to - from)).clamp(0.0, 1.0)
}

/// Unclamped lerp; the revs remap relies on exceeding the from-to range.
#[inline]
fn ulerp(from: f32, to: f32, value: f32) -> f32 {
    (1.0 - value) * from + value * to
}

/// Curved bias towards 1 for a value in the 0-1 range.
#[inline]
fn curve_factor(factor: f32) -> f32 {
    1.0 - (1.0 - factor) * (1.0 - factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::config::{DriveType, ROAD_CAR, SpeedUnit};
    use crate::car::contact::WheelContact;
    use nalgebra::Point3;
    use proptest::prelude::*;

    /// Bench implementation of the physics boundary: four contact slots and
    /// recorded wheel commands, no integration.
    struct BenchRig {
        contacts: [WheelContact; 4],
        motor: [f32; 4],
        brake: [f32; 4],
        steer: [f32; 4],
        velocity: Vector3<f32>,
        angular_velocity: Vector3<f32>,
        position: Point3<f32>,
        rotation: UnitQuaternion<f32>,
        force: Vector3<f32>,
    }

    impl BenchRig {
        fn on_ground() -> Self {
            let contact = WheelContact {
                normal: Vector3::y(),
                forward_slip: 0.0,
                sideways_slip: 0.0,
                world_position: Point3::origin(),
                world_rotation: UnitQuaternion::identity(),
            };
            Self {
                contacts: [contact; 4],
                motor: [0.0; 4],
                brake: [0.0; 4],
                steer: [0.0; 4],
                velocity: Vector3::zeros(),
                angular_velocity: Vector3::zeros(),
                position: Point3::origin(),
                rotation: UnitQuaternion::identity(),
                force: Vector3::zeros(),
            }
        }

        fn set_forward_slip(&mut self, wheel: WheelId, slip: f32) {
            self.contacts[wheel.index()].forward_slip = slip;
        }
    }

    impl CarPhysics for BenchRig {
        fn wheel_contact(&self, wheel: WheelId) -> WheelContact {
            self.contacts[wheel.index()]
        }
        fn set_motor_torque(&mut self, wheel: WheelId, torque: f32) {
            self.motor[wheel.index()] = torque;
        }
        fn set_brake_torque(&mut self, wheel: WheelId, torque: f32) {
            self.brake[wheel.index()] = torque;
        }
        fn set_steer_angle(&mut self, wheel: WheelId, degrees: f32) {
            self.steer[wheel.index()] = degrees;
        }
        fn velocity(&self) -> Vector3<f32> {
            self.velocity
        }
        fn set_velocity(&mut self, velocity: Vector3<f32>) {
            self.velocity = velocity;
        }
        fn angular_velocity(&self) -> Vector3<f32> {
            self.angular_velocity
        }
        fn apply_force(&mut self, force: Vector3<f32>) {
            self.force += force;
        }
        fn position(&self) -> Point3<f32> {
            self.position
        }
        fn rotation(&self) -> UnitQuaternion<f32> {
            self.rotation
        }
    }

    const DT: f32 = 1.0 / 60.0;

    fn controller() -> CarController {
        CarController::new(ROAD_CAR).unwrap()
    }

    fn tick(car: &mut CarController, rig: &mut BenchRig, input: ControlInput) {
        let mut effects = WheelEffectsSet::new();
        let mut trails = SkidTrailPool::new();
        car.drive(input, rig, &mut effects, &mut trails, 0.0, DT);
    }

    #[test]
    fn steer_maps_to_front_axle_only() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        tick(&mut car, &mut rig, ControlInput { steer: 0.5, ..Default::default() });

        let expected = 0.5 * ROAD_CAR.max_steer_angle;
        assert_eq!(rig.steer[0], expected);
        assert_eq!(rig.steer[1], expected);
        assert_eq!(rig.steer[2], 0.0);
        assert_eq!(rig.steer[3], 0.0);
        assert_eq!(car.current_steer_angle(), expected);
    }

    #[test]
    fn steer_clamp_is_idempotent() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        let input = ControlInput { steer: 2.0, ..Default::default() };
        tick(&mut car, &mut rig, input);
        let first = car.current_steer_angle();
        tick(&mut car, &mut rig, input);
        assert_eq!(first, ROAD_CAR.max_steer_angle);
        assert_eq!(car.current_steer_angle(), first);
    }

    #[test]
    fn torque_splits_across_driven_wheels() {
        let mut cfg = ROAD_CAR;
        cfg.traction_control = 0.0; // full budget from the start
        cfg.drive_type = DriveType::RearWheelDrive;
        let mut car = CarController::new(cfg).unwrap();
        let mut rig = BenchRig::on_ground();

        tick(&mut car, &mut rig, ControlInput { accel: 1.0, ..Default::default() });
        let per_wheel = cfg.full_torque_over_all_wheels / 2.0;
        assert_eq!(rig.motor[2], per_wheel);
        assert_eq!(rig.motor[3], per_wheel);
        assert_eq!(rig.motor[0], 0.0);
    }

    #[test]
    fn footbrake_brakes_when_moving_forward() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        rig.velocity = Vector3::z() * 10.0; // well above the reversing limit

        tick(&mut car, &mut rig, ControlInput { footbrake: -0.5, ..Default::default() });
        for i in 0..4 {
            assert_eq!(rig.brake[i], ROAD_CAR.brake_torque * 0.5);
        }
        assert_eq!(car.brake_input(), 0.5);
    }

    #[test]
    fn footbrake_reverses_when_nearly_stopped() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();

        tick(&mut car, &mut rig, ControlInput { footbrake: -1.0, ..Default::default() });
        for i in 0..4 {
            assert_eq!(rig.brake[i], 0.0);
            assert_eq!(rig.motor[i], -ROAD_CAR.reverse_torque);
        }
    }

    #[test]
    fn handbrake_overrides_rear_brakes() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        rig.velocity = Vector3::z() * 10.0;

        tick(
            &mut car,
            &mut rig,
            ControlInput { footbrake: -0.2, handbrake: 1.0, ..Default::default() },
        );
        assert_eq!(rig.brake[0], ROAD_CAR.brake_torque * 0.2);
        assert_eq!(rig.brake[2], ROAD_CAR.max_handbrake_torque);
        assert_eq!(rig.brake[3], ROAD_CAR.max_handbrake_torque);
    }

    #[test]
    fn speed_cap_preserves_direction() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        let dir = Vector3::new(3.0, 0.0, 4.0).normalize();
        rig.velocity = dir * 500.0;

        tick(&mut car, &mut rig, ControlInput::default());
        let capped = rig.velocity;
        let unit = ROAD_CAR.speed_unit.per_meter_second();
        assert!((capped.norm() * unit - ROAD_CAR.top_speed).abs() < 1e-2);
        assert!(capped.normalize().dot(&dir) > 0.9999);
        assert_eq!(car.current_speed(), ROAD_CAR.top_speed);
    }

    #[test]
    fn steer_assist_rotates_velocity_when_grounded() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        rig.velocity = Vector3::z() * 10.0;

        // establish the previous heading sample
        tick(&mut car, &mut rig, ControlInput::default());

        // yaw the chassis 5 degrees; helper should drag velocity along
        rig.rotation =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 5.0_f32.to_radians());
        let before = rig.velocity;
        tick(&mut car, &mut rig, ControlInput::default());
        let rotated = angle_between_deg(before, rig.velocity);
        assert!((rotated - 5.0 * ROAD_CAR.steer_helper).abs() < 0.2, "rotated {rotated}");
    }

    #[test]
    fn steer_assist_skips_airborne_and_jumps() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        rig.velocity = Vector3::z() * 10.0;
        tick(&mut car, &mut rig, ControlInput::default());

        // a wheel off the ground: velocity untouched
        rig.contacts[2].normal = Vector3::zeros();
        rig.rotation =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 5.0_f32.to_radians());
        let before = rig.velocity;
        tick(&mut car, &mut rig, ControlInput::default());
        assert_eq!(rig.velocity, before);

        // grounded again but a 90 degree teleport: also untouched
        rig.contacts[2].normal = Vector3::y();
        tick(&mut car, &mut rig, ControlInput::default()); // resync heading
        rig.rotation =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 95.0_f32.to_radians());
        let before = rig.velocity;
        tick(&mut car, &mut rig, ControlInput::default());
        assert_eq!(rig.velocity, before);
    }

    #[test]
    fn downforce_opposes_up_axis_proportionally_to_speed() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        rig.velocity = Vector3::z() * 20.0;

        tick(&mut car, &mut rig, ControlInput::default());
        assert!(rig.force.y < 0.0);
        assert!((rig.force.y + ROAD_CAR.downforce * 20.0).abs() < 1e-2);
    }

    #[test]
    fn traction_control_reduces_then_restores_budget() {
        let mut cfg = ROAD_CAR;
        cfg.traction_control = 0.0;
        let mut car = CarController::new(cfg).unwrap();
        // traction_control = 0 means no interference at all
        car.adjust_torque(10.0);
        assert_eq!(car.current_torque(), cfg.full_torque_over_all_wheels);

        let mut car = controller(); // traction_control = 1, budget starts at 0
        let mut rig = BenchRig::on_ground();
        for _ in 0..10 {
            tick(&mut car, &mut rig, ControlInput::default());
        }
        let recovered = car.current_torque();
        assert!(recovered > 0.0);

        for wheel in WheelId::ALL {
            rig.set_forward_slip(wheel, ROAD_CAR.slip_limit * 2.0);
        }
        tick(&mut car, &mut rig, ControlInput::default());
        assert!(car.current_torque() < recovered);
    }

    #[test]
    fn skid_dispatch_serializes_audio_to_one_voice() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        rig.set_forward_slip(WheelId::FrontLeft, 1.0);
        rig.set_forward_slip(WheelId::RearRight, 1.0);

        let mut effects = WheelEffectsSet::new();
        let mut trails = SkidTrailPool::new();
        car.drive(ControlInput::default(), &mut rig, &mut effects, &mut trails, 0.0, DT);

        assert!(effects.wheel(WheelId::FrontLeft).skidding());
        assert!(effects.wheel(WheelId::RearRight).skidding());
        let voices = WheelId::ALL
            .iter()
            .filter(|&&w| effects.wheel(w).playing_audio())
            .count();
        assert_eq!(voices, 1);

        // slip ends: audio stops, trails detach
        rig.set_forward_slip(WheelId::FrontLeft, 0.0);
        rig.set_forward_slip(WheelId::RearRight, 0.0);
        car.drive(ControlInput::default(), &mut rig, &mut effects, &mut trails, 1.0, DT);
        assert!(!effects.any_skidding());
        assert!(!effects.any_audio_playing());
        assert_eq!(trails.detached_count(), 2);
    }

    #[test]
    fn revs_stay_normalized_while_accelerating() {
        let mut car = controller();
        let mut rig = BenchRig::on_ground();
        for k in 0..200 {
            rig.velocity = Vector3::z() * (k as f32 * 0.3);
            tick(&mut car, &mut rig, ControlInput { accel: 1.0, ..Default::default() });
            assert!((0.0..=1.0).contains(&car.revs()), "revs {}", car.revs());
        }
    }

    proptest! {
        #[test]
        fn steer_angle_always_within_limits(steer in -2.0f32..2.0) {
            let mut car = controller();
            let mut rig = BenchRig::on_ground();
            tick(&mut car, &mut rig, ControlInput { steer, ..Default::default() });
            prop_assert!(car.current_steer_angle().abs() <= ROAD_CAR.max_steer_angle);
        }

        #[test]
        fn torque_budget_stays_bounded(slips in prop::collection::vec(-3.0f32..3.0, 1..64)) {
            let mut car = controller();
            let mut rig = BenchRig::on_ground();
            for slip in slips {
                for wheel in WheelId::ALL {
                    rig.set_forward_slip(wheel, slip);
                }
                tick(&mut car, &mut rig, ControlInput { accel: 1.0, ..Default::default() });
                prop_assert!(car.current_torque() >= 0.0);
                prop_assert!(car.current_torque() <= ROAD_CAR.full_torque_over_all_wheels);
            }
        }

        #[test]
        fn gear_steps_at_most_one_per_tick(speeds in prop::collection::vec(0.0f32..200.0, 1..64)) {
            let mut car = controller();
            let mut rig = BenchRig::on_ground();
            let unit = ROAD_CAR.speed_unit.per_meter_second();
            let mut prev_gear = car.gear();
            for speed in speeds {
                rig.velocity = Vector3::z() * (speed / unit);
                tick(&mut car, &mut rig, ControlInput::default());
                let gear = car.gear();
                prop_assert!(gear < ROAD_CAR.gear_count);
                prop_assert!(gear.abs_diff(prev_gear) <= 1);
                prev_gear = gear;
            }
        }

        #[test]
        fn speed_never_exceeds_cap(magnitude in 0.0f32..400.0) {
            let mut car = controller();
            let mut rig = BenchRig::on_ground();
            rig.velocity = Vector3::new(0.3, 0.0, 0.7).normalize() * magnitude;
            tick(&mut car, &mut rig, ControlInput::default());
            let unit = ROAD_CAR.speed_unit.per_meter_second();
            prop_assert!(rig.velocity.norm() * unit <= ROAD_CAR.top_speed + 1e-2);
        }
    }

    #[test]
    fn wrap_deg_handles_compass_crossing() {
        assert!((wrap_deg(359.0 - 1.0) - (-2.0)).abs() < 1e-4);
        assert!((wrap_deg(1.0 - 359.0) - 2.0).abs() < 1e-4);
        assert_eq!(wrap_deg(180.0), 180.0);
    }

    #[test]
    fn kph_unit_caps_in_kph() {
        let mut cfg = ROAD_CAR;
        cfg.speed_unit = SpeedUnit::Kph;
        cfg.top_speed = 90.0;
        let mut car = CarController::new(cfg).unwrap();
        let mut rig = BenchRig::on_ground();
        rig.velocity = Vector3::z() * 50.0; // 180 kph

        tick(&mut car, &mut rig, ControlInput::default());
        assert!((rig.velocity.norm() - 25.0).abs() < 1e-3);
    }
}
