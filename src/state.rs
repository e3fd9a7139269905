use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::physics::PhysicsWorld;

/// Per-player wire snapshot: pose plus the controller telemetry a client
/// needs for HUD, engine audio and skid effects.
#[derive(Serialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Chassis orientation quaternion (i, j, k, w).
    pub rot: [f32; 4],

    pub speed: f32,
    pub revs: f32,
    pub gear: u32,
    pub steer_angle: f32,
    pub accel_input: f32,
    pub brake_input: f32,
    /// FL, FR, RL, RR.
    pub skidding: [bool; 4],
    pub ai_driving: bool,
}

#[derive(Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub players: Vec<PlayerSnapshot>,
    pub live_trails: usize,
}

pub struct SharedGameState {
    pub tick: u64,
    clients: Vec<UnboundedSender<String>>,
}

impl SharedGameState {
    pub fn new() -> Self {
        Self { tick: 0, clients: Vec::new() }
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) {
        self.clients.push(tx);
    }

    /// Build and send a snapshot of all vehicles to all clients. Clients
    /// whose channel has closed are dropped here.
    pub fn broadcast_snapshot(&mut self, physics: &PhysicsWorld) {
        let mut players = Vec::with_capacity(physics.vehicles.len());

        for (id, sim) in &physics.vehicles {
            let Some(body) = physics.bodies.get(sim.body) else { continue };
            let pos = body.translation();
            let rot = body.position().rotation;

            players.push(PlayerSnapshot {
                id: id.clone(),
                x: pos.x,
                y: pos.y,
                z: pos.z,
                rot: [rot.i, rot.j, rot.k, rot.w],
                speed: sim.controller.current_speed(),
                revs: sim.controller.revs(),
                gear: sim.controller.gear(),
                steer_angle: sim.controller.current_steer_angle(),
                accel_input: sim.controller.accel_input(),
                brake_input: sim.controller.brake_input(),
                skidding: sim.skidding_wheels(),
                ai_driving: sim.ai.as_ref().is_some_and(|ai| ai.is_driving()),
            });
        }

        let snapshot = Snapshot {
            tick: self.tick,
            players,
            live_trails: physics.trails.live_count() + physics.trails.detached_count(),
        };
        let Ok(json) = serde_json::to_string(&snapshot) else { return };

        self.clients.retain(|tx| tx.send(json.clone()).is_ok());
    }
}
