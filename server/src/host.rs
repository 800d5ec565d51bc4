//! Collaborator interfaces the extension calls into
//!
//! The core never talks to the game world directly. Everything it needs from
//! the host (where a player stands, what they hold, how to play a sound or
//! spawn a light) goes through the narrow traits in this module. The UDP host
//! in [`crate::network`] and the in-memory [`crate::sandbox::SandboxHost`]
//! are the two implementations shipped with the crate.

use shared::{DuelNotice, PlayerId, Rgb, TitleCard, TitleTiming, Timestamp, Vec3, WeaponVariant};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Failure reported by a world collaborator while applying a side effect
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("light handle for {0} is no longer valid")]
    StaleLight(PlayerId),
    #[error("host rejected the effect: {0}")]
    Rejected(String),
}

/// Where a player stands and which way they face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPose {
    pub position: Vec3,
    /// Unit vector of the view direction
    pub facing: Vec3,
}

impl PlayerPose {
    pub fn new(position: Vec3, facing: Vec3) -> Self {
        Self { position, facing }
    }
}

/// Read-only view of connected players
pub trait PlayerDirectory: Send + Sync {
    /// Returns `None` when the player is unknown or offline.
    fn locate(&self, player: PlayerId) -> Option<PlayerPose>;

    fn is_online(&self, player: PlayerId) -> bool {
        self.locate(player).is_some()
    }
}

/// Item-stack access for the weapon held in the main hand
pub trait Inventory: Send + Sync {
    fn held_item(&self, player: PlayerId) -> Option<String>;

    /// Mirrors the weapon's on/off state into the held item's data.
    fn set_blade_flag(&self, player: PlayerId, active: bool);

    fn give_item(&self, player: PlayerId, item_id: &str, variant: WeaponVariant) -> bool;
}

/// Fire-and-forget presentation calls
pub trait Effects: Send + Sync {
    fn play_sound(&self, at: Vec3, key: &str, volume: f32, pitch: f32);
    fn play_sound_to(&self, player: PlayerId, key: &str, volume: f32, pitch: f32);
    fn stop_sound(&self, player: PlayerId, key: &str);
    fn spawn_particles(&self, at: Vec3, key: &str, count: u32, spread: Vec3, speed: f64);
    fn play_animation(&self, player: PlayerId, key: &str);
    fn apply_velocity(&self, player: PlayerId, velocity: Vec3);
    fn show_title(&self, player: PlayerId, card: TitleCard, timing: TitleTiming);
    fn notify(&self, player: PlayerId, notice: DuelNotice);
}

/// A light object living in the world
pub trait LightHandle: Send + Sync {
    fn set_position(&mut self, at: Vec3) -> Result<(), EffectError>;
    fn set_intensity(&mut self, intensity: f32) -> Result<(), EffectError>;
    fn set_radius(&mut self, radius: i32) -> Result<(), EffectError>;
    fn follow_entity(&mut self, player: PlayerId) -> Result<(), EffectError>;
    fn remove(self: Box<Self>);
}

pub trait LightBackend: Send + Sync {
    fn create_light(
        &self,
        at: Vec3,
        color: Rgb,
        radius: i32,
        intensity: f32,
    ) -> Result<Box<dyn LightHandle>, EffectError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock in milliseconds since the Unix epoch
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        (millis.min(u64::MAX as u128)) as u64
    }
}

/// Settable clock for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) -> Timestamp {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(250), 1_250);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let first = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.now() > first);
    }
}
