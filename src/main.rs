mod car;
mod net;
mod physics;
mod state;
mod suspension;

use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};

use crate::net::start_websocket_server;
use crate::physics::PhysicsWorld;
use crate::state::SharedGameState;

const TICK_DT: f32 = 1.0 / 60.0;

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("starting drive server");

    let state = Arc::new(Mutex::new(SharedGameState::new()));
    let physics = Arc::new(Mutex::new(PhysicsWorld::new()));

    tokio::spawn(start_websocket_server(Arc::clone(&state), Arc::clone(&physics)));

    // Fixed timestep: ~60 Hz. Inputs land on the vehicles between ticks via
    // the net tasks; each tick runs AI + controller + rapier, then broadcasts.
    let mut ticker = interval(Duration::from_millis(16));

    loop {
        ticker.tick().await;

        let mut phys = physics.lock().await;
        let mut game = state.lock().await;

        phys.step(TICK_DT);

        game.tick += 1;
        game.broadcast_snapshot(&phys);
    }
}
