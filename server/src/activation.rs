//! Per-player weapon activation state
//!
//! The tracker is the single source of truth for whether a player's blade is
//! lit. Each transition runs inside that player's map entry, so two toggles
//! for the same player can never interleave, and the light and item flag are
//! updated before the entry is released.

use crate::host::{Effects, Inventory, PlayerDirectory};
use crate::lighting::LightSynchronizer;
use crate::registry::{assets, WeaponRegistry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use shared::{PlayerId, Timestamp, Vec3, WeaponVariant};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationEvent {
    Activated(WeaponVariant),
    Deactivated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaponState {
    pub owner: PlayerId,
    pub variant: WeaponVariant,
    pub active: bool,
    /// Only meaningful while `active`
    pub activated_at: Timestamp,
    pub swing_count: u32,
    pub hit_count: u32,
}

impl WeaponState {
    fn activated(owner: PlayerId, variant: WeaponVariant, now: Timestamp) -> Self {
        Self {
            owner,
            variant,
            active: true,
            activated_at: now,
            swing_count: 0,
            hit_count: 0,
        }
    }

    /// How long the blade has been lit, zero while off
    pub fn active_for(&self, now: Timestamp) -> u64 {
        if self.active {
            now.saturating_sub(self.activated_at)
        } else {
            0
        }
    }
}

pub struct ActivationTracker {
    states: DashMap<PlayerId, WeaponState>,
    registry: WeaponRegistry,
    lights: Arc<LightSynchronizer>,
    directory: Arc<dyn PlayerDirectory>,
    inventory: Arc<dyn Inventory>,
    effects: Arc<dyn Effects>,
}

impl ActivationTracker {
    pub fn new(
        lights: Arc<LightSynchronizer>,
        directory: Arc<dyn PlayerDirectory>,
        inventory: Arc<dyn Inventory>,
        effects: Arc<dyn Effects>,
    ) -> Self {
        Self {
            states: DashMap::new(),
            registry: WeaponRegistry::new(),
            lights,
            directory,
            inventory,
            effects,
        }
    }

    /// Lights the blade if it is off, otherwise puts it out.
    pub fn toggle(&self, player: PlayerId, variant: WeaponVariant, now: Timestamp) -> ActivationEvent {
        let event = match self.states.entry(player) {
            Entry::Occupied(mut slot) if slot.get().active => {
                slot.get_mut().active = false;
                self.lights.unregister(player);
                self.inventory.set_blade_flag(player, false);
                ActivationEvent::Deactivated
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                if state.variant == variant {
                    state.active = true;
                    state.activated_at = now;
                } else {
                    *state = WeaponState::activated(player, variant, now);
                }
                self.lights.register(player, variant);
                self.inventory.set_blade_flag(player, true);
                ActivationEvent::Activated(variant)
            }
            Entry::Vacant(slot) => {
                slot.insert(WeaponState::activated(player, variant, now));
                self.lights.register(player, variant);
                self.inventory.set_blade_flag(player, true);
                ActivationEvent::Activated(variant)
            }
        };

        debug!("{} toggled blade: {:?}", player, event);
        match event {
            ActivationEvent::Activated(variant) => self.present_activation(player, variant),
            ActivationEvent::Deactivated => self.present_deactivation(player),
        }
        event
    }

    /// Puts the blade out if lit. Returns whether anything changed.
    pub fn deactivate(&self, player: PlayerId) -> bool {
        let changed = match self.states.get_mut(&player) {
            Some(mut state) if state.active => {
                state.active = false;
                self.lights.unregister(player);
                self.inventory.set_blade_flag(player, false);
                true
            }
            _ => false,
        };

        if changed {
            debug!("{} blade forced off", player);
            self.present_deactivation(player);
        }
        changed
    }

    pub fn is_active(&self, player: PlayerId) -> bool {
        self.states
            .get(&player)
            .map(|state| state.active)
            .unwrap_or(false)
    }

    pub fn state(&self, player: PlayerId) -> Option<WeaponState> {
        self.states.get(&player).map(|state| state.clone())
    }

    /// Counts a swing if the blade is lit and returns its variant.
    pub fn record_swing(&self, player: PlayerId) -> Option<WeaponVariant> {
        let mut state = self.states.get_mut(&player)?;
        if !state.active {
            return None;
        }
        state.swing_count += 1;
        Some(state.variant)
    }

    /// Counts a hit if the blade is lit and returns its variant.
    pub fn record_hit(&self, player: PlayerId) -> Option<WeaponVariant> {
        let mut state = self.states.get_mut(&player)?;
        if !state.active {
            return None;
        }
        state.hit_count += 1;
        Some(state.variant)
    }

    pub fn reset_stats(&self, player: PlayerId) -> bool {
        match self.states.get_mut(&player) {
            Some(mut state) => {
                state.swing_count = 0;
                state.hit_count = 0;
                true
            }
            None => false,
        }
    }

    /// Drops all weapon state for a departing or dead player.
    ///
    /// The light is always told to go away, even when nothing was tracked.
    pub fn on_disconnect_or_death(&self, player: PlayerId) {
        let was_lit = match self.states.entry(player) {
            Entry::Occupied(slot) => {
                self.lights.unregister(player);
                let was_lit = slot.get().active;
                if was_lit {
                    self.inventory.set_blade_flag(player, false);
                }
                let state = slot.remove();
                debug!(
                    "Dropped weapon state for {} ({} swings, {} hits)",
                    player, state.swing_count, state.hit_count
                );
                was_lit
            }
            Entry::Vacant(_) => {
                self.lights.unregister(player);
                false
            }
        };

        if was_lit {
            self.effects.stop_sound(player, assets::SOUND_HUM);
            self.effects.stop_sound(player, assets::SOUND_HUM_SITH);
        }
    }

    pub fn tracked_players(&self) -> Vec<PlayerId> {
        self.states.iter().map(|entry| *entry.key()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.states.iter().filter(|entry| entry.active).count()
    }

    pub fn clear(&self) {
        self.states.clear();
    }

    fn present_activation(&self, player: PlayerId, variant: WeaponVariant) {
        if let Some(pose) = self.directory.locate(player) {
            self.effects.play_sound(pose.position, assets::SOUND_ON, 1.0, 1.0);
            let ignite_at = pose.position + Vec3::new(0.0, 1.2, 0.0) + pose.facing * 0.5;
            self.effects.spawn_particles(
                ignite_at,
                assets::PARTICLE_IGNITE,
                15,
                Vec3::new(0.1, 0.5, 0.1),
                0.2,
            );
        }
        self.effects.play_animation(player, assets::ANIM_ACTIVATE);
        self.effects
            .play_sound_to(player, self.registry.hum_sound(variant), 0.4, 1.0);
    }

    fn present_deactivation(&self, player: PlayerId) {
        if let Some(pose) = self.directory.locate(player) {
            self.effects.play_sound(pose.position, assets::SOUND_OFF, 1.0, 1.0);
        }
        self.effects.play_animation(player, assets::ANIM_DEACTIVATE);
        self.effects.stop_sound(player, assets::SOUND_HUM);
        self.effects.stop_sound(player, assets::SOUND_HUM_SITH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LightingConfig;
    use crate::host::PlayerPose;
    use crate::sandbox::{HostCall, SandboxHost};

    fn setup() -> (Arc<SandboxHost>, Arc<LightSynchronizer>, ActivationTracker) {
        let host = Arc::new(SandboxHost::new());
        let lights = Arc::new(LightSynchronizer::new(
            host.clone(),
            host.clone(),
            LightingConfig::default(),
        ));
        let tracker =
            ActivationTracker::new(lights.clone(), host.clone(), host.clone(), host.clone());
        host.join(
            PlayerId(1),
            PlayerPose::new(Vec3::new(0.0, 64.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
        );
        (host, lights, tracker)
    }

    #[test]
    fn test_inactive_until_toggled() {
        let (_host, _lights, tracker) = setup();
        assert!(!tracker.is_active(PlayerId(1)));
        assert!(tracker.state(PlayerId(1)).is_none());
    }

    #[test]
    fn test_toggle_alternates() {
        let (host, lights, tracker) = setup();

        let event = tracker.toggle(PlayerId(1), WeaponVariant::Blue, 100);
        assert_eq!(event, ActivationEvent::Activated(WeaponVariant::Blue));
        assert!(tracker.is_active(PlayerId(1)));
        assert!(lights.contains(PlayerId(1)));
        assert_eq!(host.blade_flag(PlayerId(1)), Some(true));

        let event = tracker.toggle(PlayerId(1), WeaponVariant::Blue, 200);
        assert_eq!(event, ActivationEvent::Deactivated);
        assert!(!tracker.is_active(PlayerId(1)));
        assert!(!lights.contains(PlayerId(1)));
        assert_eq!(host.blade_flag(PlayerId(1)), Some(false));

        for _ in 0..5 {
            tracker.toggle(PlayerId(1), WeaponVariant::Blue, 300);
        }
        assert!(tracker.is_active(PlayerId(1)));
    }

    #[test]
    fn test_reactivation_resets_timestamp() {
        let (_host, _lights, tracker) = setup();
        tracker.toggle(PlayerId(1), WeaponVariant::Green, 1_000);
        assert_eq!(tracker.state(PlayerId(1)).unwrap().active_for(1_500), 500);

        tracker.toggle(PlayerId(1), WeaponVariant::Green, 2_000);
        assert_eq!(tracker.state(PlayerId(1)).unwrap().active_for(9_000), 0);

        tracker.toggle(PlayerId(1), WeaponVariant::Green, 5_000);
        assert_eq!(tracker.state(PlayerId(1)).unwrap().activated_at, 5_000);
    }

    #[test]
    fn test_counters_persist_across_toggles() {
        let (_host, _lights, tracker) = setup();
        tracker.toggle(PlayerId(1), WeaponVariant::Red, 0);
        tracker.record_swing(PlayerId(1));
        tracker.record_swing(PlayerId(1));
        tracker.record_hit(PlayerId(1));

        tracker.toggle(PlayerId(1), WeaponVariant::Red, 10);
        assert_eq!(tracker.record_swing(PlayerId(1)), None);

        tracker.toggle(PlayerId(1), WeaponVariant::Red, 20);
        let state = tracker.state(PlayerId(1)).unwrap();
        assert_eq!(state.swing_count, 2);
        assert_eq!(state.hit_count, 1);

        assert!(tracker.reset_stats(PlayerId(1)));
        assert_eq!(tracker.state(PlayerId(1)).unwrap().swing_count, 0);
    }

    #[test]
    fn test_switching_variant_starts_fresh_record() {
        let (host, _lights, tracker) = setup();
        tracker.toggle(PlayerId(1), WeaponVariant::Blue, 0);
        tracker.record_swing(PlayerId(1));
        tracker.toggle(PlayerId(1), WeaponVariant::Blue, 10);

        tracker.toggle(PlayerId(1), WeaponVariant::Purple, 20);
        let state = tracker.state(PlayerId(1)).unwrap();
        assert_eq!(state.variant, WeaponVariant::Purple);
        assert_eq!(state.swing_count, 0);
        assert_eq!(
            host.light_following(PlayerId(1)).unwrap().color,
            WeaponVariant::Purple.rgb()
        );
    }

    #[test]
    fn test_disconnect_forces_inactive() {
        let (host, lights, tracker) = setup();
        tracker.toggle(PlayerId(1), WeaponVariant::Yellow, 0);

        tracker.on_disconnect_or_death(PlayerId(1));
        assert!(!tracker.is_active(PlayerId(1)));
        assert!(tracker.state(PlayerId(1)).is_none());
        assert!(!lights.contains(PlayerId(1)));
        assert!(host.live_lights().is_empty());

        // Nothing tracked: still fine
        tracker.on_disconnect_or_death(PlayerId(1));
        tracker.on_disconnect_or_death(PlayerId(42));
    }

    #[test]
    fn test_death_with_lit_blade_clears_item_flag_and_hum() {
        let (host, _lights, tracker) = setup();
        tracker.toggle(PlayerId(1), WeaponVariant::Red, 0);
        assert_eq!(host.blade_flag(PlayerId(1)), Some(true));
        host.clear_calls();

        tracker.on_disconnect_or_death(PlayerId(1));
        assert_eq!(host.blade_flag(PlayerId(1)), Some(false));
        let stops: Vec<_> = host
            .calls()
            .into_iter()
            .filter(|call| matches!(call, HostCall::StopSound { .. }))
            .collect();
        assert_eq!(stops.len(), 2);

        // An unlit blade has nothing to put out
        tracker.toggle(PlayerId(1), WeaponVariant::Red, 10);
        tracker.toggle(PlayerId(1), WeaponVariant::Red, 20);
        host.clear_calls();
        tracker.on_disconnect_or_death(PlayerId(1));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_deactivate_only_when_lit() {
        let (_host, _lights, tracker) = setup();
        assert!(!tracker.deactivate(PlayerId(1)));

        tracker.toggle(PlayerId(1), WeaponVariant::Blue, 0);
        assert!(tracker.deactivate(PlayerId(1)));
        assert!(!tracker.deactivate(PlayerId(1)));
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_activation_presentation() {
        let (host, _lights, tracker) = setup();
        tracker.toggle(PlayerId(1), WeaponVariant::Red, 0);

        let sounds = host.sounds();
        assert!(sounds.contains(&assets::SOUND_ON.to_string()));
        assert!(sounds.contains(&assets::SOUND_HUM_SITH.to_string()));
        assert!(host.calls().iter().any(|call| matches!(
            call,
            HostCall::Particles { count: 15, .. }
        )));

        host.clear_calls();
        tracker.toggle(PlayerId(1), WeaponVariant::Red, 10);
        let stops = host
            .calls()
            .iter()
            .filter(|call| matches!(call, HostCall::StopSound { .. }))
            .count();
        assert_eq!(stops, 2);
    }

    #[test]
    fn test_concurrent_toggles_stay_consistent() {
        let (host, lights, tracker) = setup();
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        tracker.toggle(PlayerId(1), WeaponVariant::Blue, i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 200 toggles: even count leaves the blade off
        assert!(!tracker.is_active(PlayerId(1)));
        assert!(!lights.contains(PlayerId(1)));
        assert!(host.live_lights().is_empty());
    }
}
