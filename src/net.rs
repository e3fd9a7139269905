use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{info, warn};
use nalgebra::{UnitQuaternion, Vector3};
use rapier3d::prelude::point;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::car::{ControlInput, TargetPose, ROAD_CAR};
use crate::physics::PhysicsWorld;
use crate::state::SharedGameState;

#[derive(Debug)]
struct ClientMessage {
    msg_type: String,

    // "input"
    steer: f32,
    accel: f32,
    footbrake: f32,
    handbrake: f32,

    // "ai"
    enabled: bool,

    // "target"
    x: f32,
    y: f32,
    z: f32,
    yaw_deg: f32,
}

impl ClientMessage {
    fn from_json(txt: &str) -> Option<Self> {
        let v = serde_json::from_str::<serde_json::Value>(txt).ok()?;
        let f = |key: &str| v.get(key).and_then(|x| x.as_f64()).unwrap_or(0.0) as f32;

        Some(ClientMessage {
            msg_type: v.get("type")?.as_str()?.to_string(),
            steer: f("steer"),
            accel: f("accel"),
            footbrake: f("footbrake"),
            handbrake: f("handbrake"),
            enabled: v.get("enabled").and_then(|x| x.as_bool()).unwrap_or(false),
            x: f("x"),
            y: f("y"),
            z: f("z"),
            yaw_deg: f("yaw_deg"),
        })
    }
}

pub async fn start_websocket_server(
    state: Arc<Mutex<SharedGameState>>,
    physics: Arc<Mutex<PhysicsWorld>>,
) {
    let listener = TcpListener::bind("0.0.0.0:9001")
        .await
        .expect("failed to bind WebSocket port");

    info!("WebSocket listening on ws://localhost:9001");

    loop {
        let Ok((raw, addr)) = listener.accept().await else { continue };
        let state_clone = Arc::clone(&state);
        let physics_clone = Arc::clone(&physics);

        tokio::spawn(async move {
            let ws = match accept_async(raw).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("handshake failed for {}: {}", addr, e);
                    return;
                }
            };
            let (mut write, mut read) = ws.split();

            // outgoing channel: the tick loop broadcasts through it
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            {
                let mut game = state_clone.lock().await;
                game.register_client(tx.clone());
            }

            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    let _ = write.send(Message::Text(msg)).await;
                }
            });

            // spawn this player's car
            let player_id = Uuid::new_v4().to_string();
            {
                let mut phys = physics_clone.lock().await;
                // stagger spawns so cars don't land inside each other
                let lane = phys.vehicles.len() as f32;
                if let Err(e) = phys.spawn_vehicle_for_player(
                    player_id.clone(),
                    [lane * 4.0, 0.0, 0.0],
                    ROAD_CAR,
                ) {
                    warn!("spawn rejected for {}: {}", player_id, e);
                    return;
                }
            }

            info!("player connected: {}", player_id);
            let welcome = format!(r#"{{"type":"welcome","player_id":"{}"}}"#, player_id);
            let _ = tx.send(welcome);

            while let Some(msg) = read.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(_) => break,
                };
                if !msg.is_text() {
                    continue;
                }
                let Ok(text) = msg.to_text() else { continue };

                if text.contains("\"type\":\"ping\"") {
                    let _ = tx.send("{\"type\":\"pong\"}".into());
                    continue;
                }

                let Some(parsed) = ClientMessage::from_json(text) else { continue };

                match parsed.msg_type.as_str() {
                    "input" => {
                        let mut phys = physics_clone.lock().await;
                        phys.apply_player_input(
                            &player_id,
                            ControlInput {
                                steer: parsed.steer,
                                accel: parsed.accel,
                                footbrake: parsed.footbrake,
                                handbrake: parsed.handbrake,
                            },
                        );
                    }
                    "ai" => {
                        let mut phys = physics_clone.lock().await;
                        phys.set_ai_enabled(&player_id, parsed.enabled);
                    }
                    "target" => {
                        let rotation = UnitQuaternion::from_axis_angle(
                            &Vector3::y_axis(),
                            parsed.yaw_deg.to_radians(),
                        );
                        let mut phys = physics_clone.lock().await;
                        phys.set_player_target(
                            &player_id,
                            TargetPose {
                                position: point![parsed.x, parsed.y, parsed.z],
                                rotation,
                            },
                        );
                    }
                    other => {
                        warn!("unknown message type {:?} from {}", other, player_id);
                    }
                }
            }

            info!("player disconnected: {}", player_id);
            let mut phys = physics_clone.lock().await;
            phys.remove_player(&player_id);
        });
    }
}
