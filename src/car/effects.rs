//! Per-wheel skid feedback: trail lifecycle + skid audio flags.
//!
//! Purely cosmetic observers of the slip values the controller dispatches.
//! Never blocks or errors the physics tick. Trail handles are opaque ids a
//! renderer can attach geometry to; the pool owns their lifecycle and keeps
//! detached trails around for a linger window before dropping them.

use log::trace;
use nalgebra::Point3;

use crate::car::contact::WheelId;

/// How long a finished skid trail stays visible after the wheel stops
/// slipping, in simulated seconds.
pub const TRAIL_LINGER_SECS: f32 = 10.0;

/// Opaque id of a skid trail owned by a [`SkidTrailPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrailHandle(u64);

#[derive(Debug, Clone, Copy)]
struct LiveTrail {
    id: u64,
    origin: Point3<f32>,
}

#[derive(Debug, Clone, Copy)]
struct DetachedTrail {
    id: u64,
    expires_at: f32,
}

/// Arena for skid trails, owned by the simulation world (not a global).
///
/// `expire` is scanned once per tick by the host loop; detach is therefore a
/// deferred "drop at time T" event rather than an immediate destruction.
#[derive(Debug, Default)]
pub struct SkidTrailPool {
    next_id: u64,
    live: Vec<LiveTrail>,
    detached: Vec<DetachedTrail>,
}

impl SkidTrailPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new trail at the wheel's contact point.
    pub fn spawn(&mut self, origin: Point3<f32>) -> TrailHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.live.push(LiveTrail { id, origin });
        TrailHandle(id)
    }

    /// Move a live trail to the linger queue; it is dropped by `expire` once
    /// `TRAIL_LINGER_SECS` of simulated time have passed.
    pub fn detach(&mut self, handle: TrailHandle, now: f32) {
        if let Some(i) = self.live.iter().position(|t| t.id == handle.0) {
            self.live.swap_remove(i);
            self.detached.push(DetachedTrail {
                id: handle.0,
                expires_at: now + TRAIL_LINGER_SECS,
            });
        }
    }

    /// Drop every detached trail whose linger window has passed.
    pub fn expire(&mut self, now: f32) {
        self.detached.retain(|t| t.expires_at > now);
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn detached_count(&self) -> usize {
        self.detached.len()
    }

    /// Contact point a live trail was started at, if it is still live.
    pub fn origin(&self, handle: TrailHandle) -> Option<Point3<f32>> {
        self.live.iter().find(|t| t.id == handle.0).map(|t| t.origin)
    }
}

/// Reactive skid state of one wheel: {Idle, Skidding} plus an audio voice.
#[derive(Debug)]
pub struct WheelEffects {
    wheel: WheelId,
    skidding: bool,
    playing_audio: bool,
    trail: Option<TrailHandle>,
}

impl WheelEffects {
    pub fn new(wheel: WheelId) -> Self {
        Self {
            wheel,
            skidding: false,
            playing_audio: false,
            trail: None,
        }
    }

    #[inline]
    pub fn skidding(&self) -> bool {
        self.skidding
    }

    #[inline]
    pub fn playing_audio(&self) -> bool {
        self.playing_audio
    }

    /// Slip exceeded the limit this tick: enter Skidding and start a trail at
    /// the contact point. Repeat calls while already skidding are no-ops for
    /// the trail (the existing one keeps growing).
    pub fn emit_slip(&mut self, pool: &mut SkidTrailPool, contact_point: Point3<f32>) {
        if self.skidding {
            return;
        }
        self.skidding = true;
        self.trail = Some(pool.spawn(contact_point));
        trace!("wheel {} skid start", self.wheel.as_str());
    }

    pub fn play_audio(&mut self) {
        self.playing_audio = true;
    }

    pub fn stop_audio(&mut self) {
        self.playing_audio = false;
    }

    /// Slip back under the limit: return to Idle and hand the trail to the
    /// pool's linger queue. Safe to call every non-slipping tick.
    pub fn end_skid(&mut self, pool: &mut SkidTrailPool, now: f32) {
        if !self.skidding {
            return;
        }
        self.skidding = false;
        if let Some(trail) = self.trail.take() {
            pool.detach(trail, now);
        }
        trace!("wheel {} skid end", self.wheel.as_str());
    }
}

/// The four per-wheel effect machines of one vehicle.
#[derive(Debug)]
pub struct WheelEffectsSet {
    wheels: [WheelEffects; 4],
}

impl WheelEffectsSet {
    pub fn new() -> Self {
        Self {
            wheels: WheelId::ALL.map(WheelEffects::new),
        }
    }

    #[inline]
    pub fn wheel(&self, wheel: WheelId) -> &WheelEffects {
        &self.wheels[wheel.index()]
    }

    #[inline]
    pub fn wheel_mut(&mut self, wheel: WheelId) -> &mut WheelEffects {
        &mut self.wheels[wheel.index()]
    }

    /// One skid voice at a time across the car, to avoid chorus artifacts.
    pub fn any_audio_playing(&self) -> bool {
        self.wheels.iter().any(|w| w.playing_audio)
    }

    pub fn any_skidding(&self) -> bool {
        self.wheels.iter().any(|w| w.skidding)
    }
}

impl Default for WheelEffectsSet {
    fn default() -> Self {
        Self::new()
    }
}
