// src/physics.rs
//
// Rapier world + per-player vehicles. Each tick:
//   1) sample suspension contacts per wheel
//   2) AI (if engaged) or the stored manual input produces the driver axes
//   3) the controller turns axes into wheel commands + body-level effects
//   4) wheel commands become impulses at the contact patches
//   5) contact pairs feed AI collision avoidance, trails expire, rapier steps

use rapier3d::prelude::*;
use rapier3d::prelude::{Group, InteractionGroups};
use std::collections::HashMap;

use log::{info, warn};
use nalgebra::UnitQuaternion;

use crate::car::{
    BodyState, CarAiControl, CarConfig, CarController, CarPhysics, ConfigError, ControlInput,
    SkidTrailPool, TargetPose, WheelContact, WheelEffectsSet, WheelId,
};
use crate::suspension::{sample_wheel, suspension_from_sag, SuspensionSample, WheelMount};

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

/// Base tire friction coefficient against the ground.
const MU_BASE: f32 = 0.9;
/// Upper bound on a single wheel's support force, N.
const MAX_NORMAL_FORCE: f32 = 25_000.0;

/// Physical chassis parameters, separate from the control tuning in
/// [`CarConfig`].
pub struct ChassisSpec {
    pub mass: f32,              // kg
    pub linear_damping: f32,    // drag
    pub angular_damping: f32,   // rotational drag
    pub half_extents: [f32; 3], // [hx, hy, hz] meters
    pub com_offset: [f32; 3],   // local offset from collider center
    pub wheel_radius: f32,
    pub suspension_sag_m: f32,
    pub suspension_zeta: f32,
}

pub const ROAD_CHASSIS: ChassisSpec = ChassisSpec {
    mass: 1350.0,
    linear_damping: 0.08,
    angular_damping: 0.6,
    half_extents: [1.0, 0.35, 2.1],
    com_offset: [0.0, -0.15, 0.0],
    wheel_radius: 0.35,
    suspension_sag_m: 0.05,
    suspension_zeta: 0.9,
};

/// What the controller last commanded for one wheel. Persists across ticks
/// until overwritten, like a real actuator holding its setpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct WheelCommand {
    pub motor_torque: f32, // N*m, signed
    pub brake_torque: f32, // N*m, >= 0
    pub steer_deg: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WheelCommands(pub [WheelCommand; 4]);

/// One player's simulated car: rapier body + wheels + control stack.
pub struct VehicleSim {
    pub body: RigidBodyHandle,
    mounts: [WheelMount; 4],
    commands: WheelCommands,
    contacts: [WheelContact; 4],
    samples: [Option<SuspensionSample>; 4],

    pub controller: CarController,
    pub ai: Option<CarAiControl>,
    pub effects: WheelEffectsSet,
    /// Last manual input, used whenever no AI is engaged.
    pub input: ControlInput,
}

impl VehicleSim {
    #[inline]
    pub fn skidding_wheels(&self) -> [bool; 4] {
        WheelId::ALL.map(|w| self.effects.wheel(w).skidding())
    }
}

/// Adapter giving the controller scoped access to one rapier body and its
/// wheel command array. Forces become impulses over the current dt.
pub struct RapierCar<'a> {
    body: &'a mut RigidBody,
    commands: &'a mut WheelCommands,
    contacts: &'a [WheelContact; 4],
    dt: f32,
}

impl CarPhysics for RapierCar<'_> {
    fn wheel_contact(&self, wheel: WheelId) -> WheelContact {
        self.contacts[wheel.index()]
    }

    fn set_motor_torque(&mut self, wheel: WheelId, torque: f32) {
        self.commands.0[wheel.index()].motor_torque = torque;
    }

    fn set_brake_torque(&mut self, wheel: WheelId, torque: f32) {
        self.commands.0[wheel.index()].brake_torque = torque;
    }

    fn set_steer_angle(&mut self, wheel: WheelId, degrees: f32) {
        self.commands.0[wheel.index()].steer_deg = degrees;
    }

    fn velocity(&self) -> Vector<Real> {
        *self.body.linvel()
    }

    fn set_velocity(&mut self, velocity: Vector<Real>) {
        self.body.set_linvel(velocity, true);
    }

    fn angular_velocity(&self) -> Vector<Real> {
        *self.body.angvel()
    }

    fn apply_force(&mut self, force: Vector<Real>) {
        self.body.apply_impulse(force * self.dt, true);
    }

    fn position(&self) -> Point<Real> {
        Point::from(*self.body.translation())
    }

    fn rotation(&self) -> UnitQuaternion<Real> {
        self.body.position().rotation
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,

    pub vehicles: HashMap<String, VehicleSim>, // playerId -> vehicle
    pub body_to_player: HashMap<RigidBodyHandle, String>,

    pub trails: SkidTrailPool,
    /// Simulated time, advanced by `step`. Timers key off this, not wall clock.
    pub elapsed: f32,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Big static ground box, top surface at y = 0.
        let ground_rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let ground_handle = bodies.insert(ground_rb);

        let ground_collider = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        info!("ground inserted, bodies = {}, colliders = {}", bodies.len(), colliders.len());

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            vehicles: HashMap::new(),
            body_to_player: HashMap::new(),
            trails: SkidTrailPool::new(),
            elapsed: 0.0,
        }
    }

    /// Store manual driver axes for a player; consumed in `step` unless an
    /// AI driver is engaged.
    pub fn apply_player_input(&mut self, player_id: &str, input: ControlInput) {
        if let Some(sim) = self.vehicles.get_mut(player_id) {
            sim.input = input;
        }
    }

    /// Point the player's AI at a world pose (engages driving if an AI is
    /// attached).
    pub fn set_player_target(&mut self, player_id: &str, target: TargetPose) {
        if let Some(sim) = self.vehicles.get_mut(player_id) {
            if let Some(ai) = sim.ai.as_mut() {
                ai.set_target(target);
            }
        }
    }

    /// Attach or detach the autonomous driver.
    pub fn set_ai_enabled(&mut self, player_id: &str, enabled: bool) {
        if let Some(sim) = self.vehicles.get_mut(player_id) {
            if enabled && sim.ai.is_none() {
                // each car gets its own wander stream
                let seed: u32 = rand::random();
                sim.ai = Some(CarAiControl::new(Default::default(), seed));
            } else if !enabled {
                sim.ai = None;
                // hold the brakes rather than coasting with stale input
                sim.input = ControlInput::FULL_STOP;
            }
        }
    }

    /// Spawn a car for this player: dynamic box chassis + 4 raycast wheels.
    pub fn spawn_vehicle_for_player(
        &mut self,
        id: String,
        position: [f32; 3],
        config: CarConfig,
    ) -> Result<(), ConfigError> {
        let controller = CarController::new(config)?;

        let spawn_x = position[0];
        let spawn_z = position[2];
        let spawn_y = 1.3; // fixed server convention

        let chassis = ROAD_CHASSIS;
        let [hx, hy, hz] = chassis.half_extents;
        let volume = (2.0 * hx) * (2.0 * hy) * (2.0 * hz);
        let density = chassis.mass / volume;

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![spawn_x, spawn_y, spawn_z])
            .linear_damping(chassis.linear_damping)
            .angular_damping(chassis.angular_damping)
            .ccd_enabled(true)
            .build();

        let [cx, cy, cz] = chassis.com_offset;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![cx, cy, cz])
            // chassis collides with ground AND other chassis (the AI needs
            // car-vs-car contacts for its avoidance behaviour)
            .collision_groups(InteractionGroups::new(
                GROUP_CHASSIS,
                GROUP_GROUND | GROUP_CHASSIS,
            ))
            .density(density)
            .friction(0.0) // tires provide all traction
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        self.body_to_player.insert(handle, id.clone());

        let (k, c) = suspension_from_sag(
            chassis.mass,
            4,
            chassis.suspension_sag_m,
            chassis.suspension_zeta,
        );
        let r = chassis.wheel_radius;
        let mount = |wheel: WheelId, x: f32, z: f32| WheelMount {
            wheel,
            offset: point![x, -0.3, z],
            rest_length: 0.5,
            max_length: 0.9,
            radius: r,
            stiffness: k,
            damping: c,
        };
        let mounts = [
            mount(WheelId::FrontLeft, -0.8, 1.5),
            mount(WheelId::FrontRight, 0.8, 1.5),
            mount(WheelId::RearLeft, -0.8, -1.5),
            mount(WheelId::RearRight, 0.8, -1.5),
        ];

        self.vehicles.insert(
            id.clone(),
            VehicleSim {
                body: handle,
                mounts,
                commands: WheelCommands::default(),
                contacts: [WheelContact::airborne(); 4],
                samples: [None; 4],
                controller,
                ai: None,
                effects: WheelEffectsSet::new(),
                input: ControlInput::default(),
            },
        );

        info!("spawned vehicle for player {} at {:?} (body = {:?})", id, position, handle);
        Ok(())
    }

    pub fn remove_player(&mut self, player_id: &str) {
        if let Some(sim) = self.vehicles.remove(player_id) {
            self.body_to_player.remove(&sim.body);
            self.bodies.remove(
                sim.body,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.joints,
                &mut self.multibody_joints,
                true,
            );
            info!("removed vehicle for player {}", player_id);
        }
    }

    pub fn step(&mut self, dt: Real) {
        let now = self.elapsed;

        self.query_pipeline.update(&self.colliders);

        let Self { bodies, colliders, query_pipeline, vehicles, trails, .. } = self;

        // ------------------------------------------------------------
        // Per-vehicle: sample -> plan -> drive -> impulses
        // ------------------------------------------------------------
        for sim in vehicles.values_mut() {
            let Some(body_ro) = bodies.get(sim.body) else { continue };
            let speed = body_ro.linvel().magnitude();
            let rot = body_ro.position().rotation;

            // 1) suspension raycasts with the steer commanded last tick
            for (i, m) in sim.mounts.iter().enumerate() {
                let steer = sim.commands.0[i].steer_deg;
                sim.samples[i] =
                    sample_wheel(m, steer, body_ro, sim.body, query_pipeline, bodies, colliders);
                sim.contacts[i] = match &sim.samples[i] {
                    Some(s) => derive_contact(s, &sim.commands.0[i], &sim.mounts[i], speed, rot),
                    None => WheelContact::airborne(),
                };
            }

            // 2) driver input: AI plan or the stored manual axes
            let input = match sim.ai.as_mut() {
                Some(ai) => ai.plan(&sim.controller, &body_ro.body_state(), now),
                None => sim.input,
            };

            // 3) run the controller against this body
            let Some(body) = bodies.get_mut(sim.body) else { continue };
            let mut car = RapierCar {
                body: &mut *body,
                commands: &mut sim.commands,
                contacts: &sim.contacts,
                dt,
            };
            sim.controller.drive(input, &mut car, &mut sim.effects, trails, now, dt);

            // 4) wheel commands -> impulses at the contact patches
            let body_mass = body.mass();
            let linvel_mag = body.linvel().magnitude();
            let mut impulses: Vec<(Vector<Real>, Point<Real>)> = Vec::new();

            for (i, sample) in sim.samples.iter().enumerate() {
                let Some(s) = sample else { continue };
                let cmd = &sim.commands.0[i];
                let mount = &sim.mounts[i];

                let mut normal_force = s.normal_force.min(MAX_NORMAL_FORCE);
                // keep minimal support to avoid tunneling
                if normal_force < 200.0 {
                    normal_force = 200.0;
                }
                if !(linvel_mag < 0.05 && normal_force <= 200.0) {
                    impulses.push((s.ground_normal * (normal_force * dt), s.hit_point));
                }

                let capacity = MU_BASE * normal_force;
                let share_mass = body_mass / 4.0;

                // longitudinal: drive clamped to grip, brake opposes rolling
                let drive_f = (cmd.motor_torque / mount.radius).clamp(-capacity, capacity);
                let mut f_long = drive_f;
                if cmd.brake_torque > 0.0 && s.v_long.abs() > 1e-3 {
                    let brake_f = (cmd.brake_torque / mount.radius).min(capacity);
                    // never reverses the wheel within one tick
                    let stop_f = s.v_long.abs() * share_mass / dt;
                    f_long += -s.v_long.signum() * brake_f.min(stop_f);
                }

                // lateral: kill slip velocity within the remaining grip
                // (combined-slip ellipse)
                let long_frac = (f_long / capacity).clamp(-1.0, 1.0);
                let lat_capacity = capacity * (1.0 - long_frac * long_frac).sqrt();
                let desired_lat = -s.v_lat * share_mass / dt;
                let f_lat = desired_lat.clamp(-lat_capacity, lat_capacity);

                let force = s.forward * f_long + s.side * f_lat;
                if force.magnitude() > 1e-4 {
                    impulses.push((force * dt, s.apply_point));
                }
            }

            for (impulse, at) in impulses {
                body.apply_impulse_at_point(impulse, at, true);
            }
        }

        // ------------------------------------------------------------
        // Car-vs-car contacts feed AI avoidance (pairs from last step)
        // ------------------------------------------------------------
        let mut touching: Vec<(String, String)> = Vec::new();
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let player_of = |ch: ColliderHandle| {
                self.colliders
                    .get(ch)
                    .and_then(|c| c.parent())
                    .and_then(|b| self.body_to_player.get(&b))
                    .cloned()
            };
            if let (Some(a), Some(b)) = (player_of(pair.collider1), player_of(pair.collider2)) {
                touching.push((a, b));
            }
        }
        for (a, b) in touching {
            self.notify_pair(&a, &b, now);
        }

        self.trails.expire(now);

        // ------------------------------------------------------------
        // Step rapier
        // ------------------------------------------------------------
        let hooks = ();
        let mut events = ();
        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters { dt, ..IntegrationParameters::default() },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &mut events,
            &hooks,
        );

        // Safety: prevent bodies from exploding to insane coordinates
        for (_, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !pos.x.is_finite()
                || !pos.y.is_finite()
                || !pos.z.is_finite()
                || pos.x.abs() > 1_000.0
                || pos.y.abs() > 1_000.0
                || pos.z.abs() > 1_000.0;

            if bad {
                body.set_translation(vector![0.0, 1.3, 0.0], true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                warn!("reset exploding body back to spawn");
            }
        }

        self.elapsed += dt;
    }

    fn notify_pair(&mut self, a: &str, b: &str, now: f32) {
        let state_of = |world: &Self, id: &str| {
            world
                .vehicles
                .get(id)
                .and_then(|s| world.bodies.get(s.body))
                .map(|b| b.body_state())
        };
        let (Some(sa), Some(sb)) = (state_of(self, a), state_of(self, b)) else { return };

        if let Some(ai) = self.vehicles.get_mut(a).and_then(|s| s.ai.as_mut()) {
            ai.notify_collision(&sa, sb.position, now);
        }
        if let Some(ai) = self.vehicles.get_mut(b).and_then(|s| s.ai.as_mut()) {
            ai.notify_collision(&sb, sa.position, now);
        }
    }
}

trait BodyStateExt {
    fn body_state(&self) -> BodyState;
}

impl BodyStateExt for RigidBody {
    fn body_state(&self) -> BodyState {
        BodyState {
            position: Point::from(*self.translation()),
            rotation: self.position().rotation,
            velocity: *self.linvel(),
            angular_velocity: *self.angvel(),
        }
    }
}

/// Build the controller-facing contact from a suspension sample plus the
/// wheel's standing commands.
///
/// forward_slip is demand-over-capacity (how much of the available grip the
/// standing torque asks for); sideways_slip is lateral slip velocity over
/// travel speed. Both exceed 1 when the wheel is genuinely overdriven.
fn derive_contact(
    s: &SuspensionSample,
    cmd: &WheelCommand,
    mount: &WheelMount,
    speed: f32,
    rot: UnitQuaternion<Real>,
) -> WheelContact {
    let capacity = (MU_BASE * s.normal_force).max(1.0);

    let drive_f = cmd.motor_torque / mount.radius;
    // brake only slips against an actually-rolling wheel
    let brake_term = if s.v_long.abs() > 0.5 {
        -s.v_long.signum() * (cmd.brake_torque / mount.radius)
    } else {
        0.0
    };
    let forward_slip = ((drive_f + brake_term) / capacity).clamp(-10.0, 10.0);

    let sideways_slip = s.v_lat / speed.max(1.0);

    let steer_rot = UnitQuaternion::from_axis_angle(&Vector::y_axis(), cmd.steer_deg.to_radians());

    WheelContact {
        normal: s.ground_normal,
        forward_slip,
        sideways_slip,
        world_position: s.hit_point,
        world_rotation: steer_rot * rot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::ROAD_CAR;

    fn world_with_car(id: &str) -> PhysicsWorld {
        let mut world = PhysicsWorld::new();
        world
            .spawn_vehicle_for_player(id.to_string(), [0.0, 0.0, 0.0], ROAD_CAR)
            .unwrap();
        world
    }

    #[test]
    fn spawn_registers_body_and_wheels() {
        let world = world_with_car("p1");
        let sim = world.vehicles.get("p1").unwrap();
        assert!(world.bodies.get(sim.body).is_some());
        assert_eq!(world.body_to_player.get(&sim.body), Some(&"p1".to_string()));
        assert_eq!(sim.mounts.len(), 4);
        // front mounts ahead of the rear ones (+Z forward)
        assert!(sim.mounts[0].offset.z > sim.mounts[2].offset.z);
    }

    #[test]
    fn remove_player_drops_body() {
        let mut world = world_with_car("p1");
        let handle = world.vehicles.get("p1").unwrap().body;
        world.remove_player("p1");
        assert!(world.vehicles.is_empty());
        assert!(world.bodies.get(handle).is_none());
        assert!(world.body_to_player.is_empty());
    }

    #[test]
    fn step_advances_simulated_time() {
        let mut world = world_with_car("p1");
        let dt = 1.0 / 60.0;
        for _ in 0..3 {
            world.step(dt);
        }
        assert!((world.elapsed - 3.0 * dt).abs() < 1e-6);
    }

    #[test]
    fn car_settles_on_suspension() {
        let mut world = world_with_car("p1");
        let dt = 1.0 / 60.0;
        for _ in 0..300 {
            world.step(dt);
        }
        let sim = world.vehicles.get("p1").unwrap();
        let body = world.bodies.get(sim.body).unwrap();
        let y = body.translation().y;
        // sitting on its springs, neither through the floor nor launched
        assert!(y > 0.1 && y < 1.5, "settled height {y}");
        // all four wheels grounded
        assert!(sim.contacts.iter().all(|c| c.grounded()));
    }

    #[test]
    fn throttle_moves_car_forward() {
        let mut world = world_with_car("p1");
        let dt = 1.0 / 60.0;
        for _ in 0..120 {
            world.step(dt); // settle
        }
        world.apply_player_input(
            "p1",
            ControlInput { steer: 0.0, accel: 1.0, footbrake: 0.0, handbrake: 0.0 },
        );
        for _ in 0..240 {
            world.step(dt);
        }
        let sim = world.vehicles.get("p1").unwrap();
        let body = world.bodies.get(sim.body).unwrap();
        assert!(body.translation().z > 1.0, "z = {}", body.translation().z);
        assert!(sim.controller.current_speed() > 0.0);
    }

    #[test]
    fn ai_toggle_attaches_and_detaches() {
        let mut world = world_with_car("p1");
        world.set_ai_enabled("p1", true);
        assert!(world.vehicles.get("p1").unwrap().ai.is_some());

        world.set_player_target(
            "p1",
            TargetPose {
                position: point![0.0, 0.0, 50.0],
                rotation: UnitQuaternion::identity(),
            },
        );
        assert!(world.vehicles.get("p1").unwrap().ai.as_ref().unwrap().is_driving());

        world.set_ai_enabled("p1", false);
        let sim = world.vehicles.get("p1").unwrap();
        assert!(sim.ai.is_none());
        assert_eq!(sim.input, ControlInput::FULL_STOP);
    }

    #[test]
    fn derived_contact_flags_overdriven_wheel() {
        let s = SuspensionSample {
            wheel: WheelId::RearLeft,
            hit_point: point![0.0, 0.0, 0.0],
            apply_point: point![0.0, 0.1, 0.0],
            ground_normal: vector![0.0, 1.0, 0.0],
            compression: 0.2,
            compression_ratio: 0.25,
            normal_force: 3300.0,
            point_vel: vector![0.0, 0.0, 0.0],
            forward: vector![0.0, 0.0, 1.0],
            side: vector![1.0, 0.0, 0.0],
            v_long: 0.0,
            v_lat: 0.0,
        };
        let mount = WheelMount {
            wheel: WheelId::RearLeft,
            offset: point![-0.8, -0.3, -1.5],
            rest_length: 0.5,
            max_length: 0.9,
            radius: 0.35,
            stiffness: 60_000.0,
            damping: 4_000.0,
        };
        // full per-wheel torque demands more than the patch can carry
        let cmd = WheelCommand { motor_torque: 2500.0, brake_torque: 0.0, steer_deg: 0.0 };
        let contact = derive_contact(&s, &cmd, &mount, 0.0, UnitQuaternion::identity());
        assert!(contact.forward_slip > 1.0);

        // parked with the footbrake held is not slip
        let cmd = WheelCommand { motor_torque: 0.0, brake_torque: 20_000.0, steer_deg: 0.0 };
        let contact = derive_contact(&s, &cmd, &mount, 0.0, UnitQuaternion::identity());
        assert_eq!(contact.forward_slip, 0.0);
    }
}
