//! Dynamic blade lighting
//!
//! Every active weapon owns exactly one light in the world. The synchronizer
//! creates it on activation, moves and modulates it on every tick, and
//! destroys it on deactivation, disconnect or respawn.
//!
//! Per-player slots live in a [`DashMap`], so a register or unregister for one
//! player holds only that player's shard while the tick walks the rest.

use crate::config::LightingConfig;
use crate::host::{EffectError, LightBackend, LightHandle, PlayerDirectory, PlayerPose};
use crate::registry::{LightProfile, WeaponRegistry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};
use shared::{PlayerId, Rgb, Timestamp, Vec3, WeaponVariant};
use std::sync::Arc;

/// A light bound to one player's blade
pub struct LightSource {
    pub owner: PlayerId,
    pub color: Rgb,
    pub base_radius: i32,
    pub radius: i32,
    pub base_intensity: f32,
    pub flickers: bool,
    pub current_intensity: f32,
    handle: Option<Box<dyn LightHandle>>,
}

impl LightSource {
    fn spawn(
        owner: PlayerId,
        profile: LightProfile,
        at: Vec3,
        backend: &dyn LightBackend,
    ) -> Result<Self, EffectError> {
        let mut handle =
            backend.create_light(at, profile.color, profile.radius, profile.intensity)?;
        if let Err(e) = handle.follow_entity(owner) {
            handle.remove();
            return Err(e);
        }

        Ok(Self {
            owner,
            color: profile.color,
            base_radius: profile.radius,
            radius: profile.radius,
            base_intensity: profile.intensity,
            flickers: profile.flickers,
            current_intensity: profile.intensity,
            handle: Some(handle),
        })
    }

    /// Moves the light to the blade and applies flicker and pulse.
    fn update(
        &mut self,
        pose: PlayerPose,
        now: Timestamp,
        config: &LightingConfig,
    ) -> Result<(), EffectError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        handle.set_position(blade_position(pose, config))?;

        let t = now as f64;
        if self.flickers {
            let flicker = (t / config.flicker_period_ms).sin() as f32 * config.flicker_amplitude;
            self.current_intensity = self.base_intensity + flicker;
            handle.set_intensity(self.current_intensity)?;
        }

        let pulse = (config.pulse_amplitude * (t / config.pulse_period_ms).sin()).round() as i32;
        self.radius = self.base_radius + pulse;
        handle.set_radius(self.radius)
    }

    fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.remove();
        }
    }
}

/// Blade tip: forward along the facing vector and up to hand height
pub fn blade_position(pose: PlayerPose, config: &LightingConfig) -> Vec3 {
    pose.position + pose.facing * config.blade_reach + Vec3::UP * config.blade_height
}

/// Summary of one tick pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    /// Owner was not found in the directory
    pub skipped: usize,
    /// The world rejected an update for this light
    pub faulted: usize,
}

/// Read-only copy of a registered light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSnapshot {
    pub owner: PlayerId,
    pub color: Rgb,
    pub radius: i32,
    pub intensity: f32,
    pub flickers: bool,
}

pub struct LightSynchronizer {
    lights: DashMap<PlayerId, LightSource>,
    registry: WeaponRegistry,
    directory: Arc<dyn PlayerDirectory>,
    backend: Arc<dyn LightBackend>,
    config: LightingConfig,
}

impl LightSynchronizer {
    pub fn new(
        directory: Arc<dyn PlayerDirectory>,
        backend: Arc<dyn LightBackend>,
        config: LightingConfig,
    ) -> Self {
        Self {
            lights: DashMap::new(),
            registry: WeaponRegistry::new(),
            directory,
            backend,
            config,
        }
    }

    /// Replaces any light the player has with a fresh one for `variant`.
    ///
    /// The old light is destroyed before the new one is created, so a player
    /// never owns two lights at once. A player the directory cannot locate
    /// ends up with no light.
    pub fn register(&self, player: PlayerId, variant: WeaponVariant) {
        let profile = self.registry.light_profile(variant);
        let pose = self.directory.locate(player);

        match self.lights.entry(player) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().destroy();
                let spawned = pose
                    .ok_or(EffectError::StaleLight(player))
                    .and_then(|pose| self.spawn(player, profile, pose));
                match spawned {
                    Ok(source) => {
                        slot.insert(source);
                    }
                    Err(e) => {
                        warn!("Dropping light for {}: {}", player, e);
                        slot.remove();
                    }
                }
            }
            Entry::Vacant(slot) => {
                let Some(pose) = pose else {
                    debug!("Not registering light for offline {}", player);
                    return;
                };
                match self.spawn(player, profile, pose) {
                    Ok(source) => {
                        slot.insert(source);
                    }
                    Err(e) => warn!("Failed to create light for {}: {}", player, e),
                }
            }
        }

        debug!("Registered {:?} light for {}", variant, player);
    }

    fn spawn(
        &self,
        player: PlayerId,
        profile: LightProfile,
        pose: PlayerPose,
    ) -> Result<LightSource, EffectError> {
        LightSource::spawn(
            player,
            profile,
            blade_position(pose, &self.config),
            self.backend.as_ref(),
        )
    }

    /// Destroys the player's light. Returns whether one existed; absence is not an error.
    pub fn unregister(&self, player: PlayerId) -> bool {
        match self.lights.remove(&player) {
            Some((_, mut source)) => {
                source.destroy();
                debug!("Unregistered light for {}", player);
                true
            }
            None => false,
        }
    }

    /// Updates every registered light.
    ///
    /// Lights whose owner is missing from the directory are left untouched;
    /// destroying them is the job of [`LightSynchronizer::unregister`]. A world
    /// fault on one light is logged and does not stop the pass.
    pub fn tick(&self, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();

        for mut entry in self.lights.iter_mut() {
            let owner = *entry.key();
            let Some(pose) = self.directory.locate(owner) else {
                report.skipped += 1;
                continue;
            };

            match entry.value_mut().update(pose, now, &self.config) {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!("Light update for {} failed: {}", owner, e);
                    report.faulted += 1;
                }
            }
        }

        report
    }

    /// Destroys every light. Used at shutdown.
    pub fn cleanup_all(&self) -> usize {
        let owners: Vec<PlayerId> = self.lights.iter().map(|entry| *entry.key()).collect();
        owners
            .into_iter()
            .filter(|owner| self.unregister(*owner))
            .count()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.lights.contains_key(&player)
    }

    pub fn snapshot(&self, player: PlayerId) -> Option<LightSnapshot> {
        self.lights.get(&player).map(|source| LightSnapshot {
            owner: source.owner,
            color: source.color,
            radius: source.radius,
            intensity: source.current_intensity,
            flickers: source.flickers,
        })
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}
