//! Autonomous driving policy: synthesizes normalized driver input for the
//! controller from a target pose and live telemetry.
//!
//! This layer really "drives" the car through the same [`ControlInput`] a
//! human would produce; it has no actuation authority of its own. Wander is
//! deterministic noise keyed on simulated time and a per-instance seed, so
//! identical setups replay identically while distinct cars still diverge.

use log::debug;
use nalgebra::Point3;

use crate::car::contact::{BodyState, ControlInput, TargetPose, angle_between_deg};
use crate::car::controller::CarController;
use crate::car::noise::{noise01, noise11};

/// What the policy considers when deciding to slow down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrakeCondition {
    /// Full throttle all the time.
    NeverBrake,
    /// Brake for the upcoming change in target direction; suits route
    /// following, slowing for corners.
    TargetDirectionDifference,
    /// Brake on approach regardless of target direction; suits heading for a
    /// stationary target and coming to rest there.
    TargetDistance,
}

/// Policy tuning. Defaults follow the reference road-car behaviour.
#[derive(Debug, Clone, Copy)]
pub struct AiConfig {
    /// Fraction of max speed used when maximally cautious.
    pub cautious_speed_factor: f32,
    /// Corner angle (degrees) treated as warranting maximum caution.
    pub cautious_max_angle: f32,
    /// Distance at which distance-based caution begins.
    pub cautious_max_distance: f32,
    /// Weight of own angular velocity in the caution estimate.
    pub cautious_angular_velocity_factor: f32,

    pub steer_sensitivity: f32,
    pub accel_sensitivity: f32,
    pub brake_sensitivity: f32,

    /// How far the car wanders laterally across the path to its target.
    pub lateral_wander_distance: f32,
    pub lateral_wander_speed: f32,
    /// Multiplicative wander on the accel magnitude, 0..1.
    pub accel_wander_amount: f32,
    pub accel_wander_speed: f32,

    pub brake_condition: BrakeCondition,
    pub stop_when_target_reached: bool,
    /// Proximity at which the target counts as reached.
    pub reach_target_threshold: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            cautious_speed_factor: 0.05,
            cautious_max_angle: 50.0,
            cautious_max_distance: 100.0,
            cautious_angular_velocity_factor: 30.0,
            steer_sensitivity: 0.05,
            accel_sensitivity: 0.04,
            brake_sensitivity: 1.0,
            lateral_wander_distance: 3.0,
            lateral_wander_speed: 0.1,
            accel_wander_amount: 0.1,
            accel_wander_speed: 0.1,
            brake_condition: BrakeCondition::TargetDistance,
            stop_when_target_reached: false,
            reach_target_threshold: 2.0,
        }
    }
}

/// How long the evasive window stays open after a collision, seconds.
const AVOID_WINDOW_SECS: f32 = 1.0;

pub struct CarAiControl {
    config: AiConfig,
    target: Option<TargetPose>,
    driving: bool,
    /// Fixed per instance so cars don't all wander in the same pattern.
    wander_seed: u32,

    // evasive state from the last collision with another AI car
    avoid_until: f32,
    avoid_slowdown: f32,
    avoid_offset: f32,
}

impl CarAiControl {
    pub fn new(config: AiConfig, wander_seed: u32) -> Self {
        Self {
            config,
            target: None,
            driving: false,
            wander_seed,
            avoid_until: 0.0,
            avoid_slowdown: 1.0,
            avoid_offset: 0.0,
        }
    }

    #[inline]
    pub fn is_driving(&self) -> bool {
        self.driving
    }

    /// Reassign the target and (re)start driving, even after a completed
    /// approach.
    pub fn set_target(&mut self, target: TargetPose) {
        self.target = Some(target);
        self.driving = true;
    }

    pub fn stop_driving(&mut self) {
        self.driving = false;
    }

    /// One tick of input derivation. Must run to completion before the
    /// controller consumes the result; `now` is simulated time.
    pub fn plan(&mut self, car: &CarController, body: &BodyState, now: f32) -> ControlInput {
        let Some(target) = self.target else {
            return ControlInput::FULL_STOP;
        };
        if !self.driving {
            return ControlInput::FULL_STOP;
        }

        let desired_speed = self.desired_speed(car, body, &target);

        // Evasive action due to collision with other cars: inside the window
        // we slow down (if we were the one behind) and veer to the side of
        // the path away from the other car. Otherwise wander across the path
        // so multiple cars don't trace identical lines.
        let mut aim = target.position;
        let desired_speed = if now < self.avoid_until {
            aim += target.right() * self.avoid_offset;
            desired_speed * self.avoid_slowdown
        } else {
            let wander = noise11(now * self.config.lateral_wander_speed, self.wander_seed);
            aim += target.right() * (wander * self.config.lateral_wander_distance);
            desired_speed
        };

        // asymmetric gains for speeding up vs slowing down
        let gain = if desired_speed < car.current_speed() {
            self.config.brake_sensitivity
        } else {
            self.config.accel_sensitivity
        };
        let mut accel = ((desired_speed - car.current_speed()) * gain).clamp(-1.0, 1.0);

        // accel wander on a separate noise stream than the lateral one
        accel *= (1.0 - self.config.accel_wander_amount)
            + noise01(now * self.config.accel_wander_speed, self.wander_seed ^ 0x9e37)
                * self.config.accel_wander_amount;

        let local_target = body.inverse_transform_point(aim);
        let target_angle = local_target.x.atan2(local_target.z).to_degrees();

        // flipping the steer sense keeps steering correct while reversing
        let speed_sign = if body.velocity.dot(&body.forward()) < -0.1 { -1.0 } else { 1.0 };
        let steer = (target_angle * self.config.steer_sensitivity).clamp(-1.0, 1.0) * speed_sign;

        // one signed scalar feeds both pedal channels; the controller's
        // per-channel clamps split it into throttle or brake
        let input = ControlInput {
            steer,
            accel,
            footbrake: accel,
            handbrake: 0.0,
        };

        if self.config.stop_when_target_reached
            && local_target.coords.norm() < self.config.reach_target_threshold
        {
            debug!("target reached at {:.2} m, stopping", local_target.coords.norm());
            self.driving = false;
        }

        input
    }

    /// Cautious-speed selection per the configured brake condition.
    fn desired_speed(&self, car: &CarController, body: &BodyState, target: &TargetPose) -> f32 {
        // prefer the actual direction of travel once properly moving, so we
        // don't react to yaw alone while drifting
        let heading = if car.current_speed() > car.max_speed() * 0.1 {
            body.velocity
        } else {
            body.forward()
        };

        let spinning_angle =
            body.angular_velocity.norm() * self.config.cautious_angular_velocity_factor;

        let caution = match self.config.brake_condition {
            BrakeCondition::NeverBrake => return car.max_speed(),
            BrakeCondition::TargetDirectionDifference => {
                let corner_angle = angle_between_deg(target.forward(), heading);
                inverse_lerp(0.0, self.config.cautious_max_angle, spinning_angle.max(corner_angle))
            }
            BrakeCondition::TargetDistance => {
                let distance = (target.position - body.position).norm();
                let distance_caution =
                    inverse_lerp(self.config.cautious_max_distance, 0.0, distance);
                inverse_lerp(0.0, self.config.cautious_max_angle, spinning_angle)
                    .max(distance_caution)
            }
        };

        lerp(
            car.max_speed(),
            car.max_speed() * self.config.cautious_speed_factor,
            caution,
        )
    }

    /// Sustained contact with another AI car: open the evasive window. The
    /// trailing car (other one is within 90 degrees of our forward) slows
    /// down; the leading car doesn't. Both veer away from each other.
    pub fn notify_collision(&mut self, body: &BodyState, other_position: Point3<f32>, now: f32) {
        self.avoid_until = now + AVOID_WINDOW_SECS;

        let to_other = other_position - body.position;
        self.avoid_slowdown = if angle_between_deg(body.forward(), to_other) < 90.0 {
            0.5
        } else {
            1.0
        };

        let local_other = body.inverse_transform_point(other_position);
        let other_angle = local_other.x.atan2(local_other.z);
        self.avoid_offset = self.config.lateral_wander_distance * -other_angle.signum();
    }
}

#[inline]
fn inverse_lerp(from: f32, to: f32, value: f32) -> f32 {
    if (to - from).abs() < f32::EPSILON {
        return 0.0;
    }
    ((value - from) / (to - from)).clamp(0.0, 1.0)
}

#[inline]
fn lerp(from: f32, to: f32, value: f32) -> f32 {
    from + (to - from) * value
}
