//! Swing, hit and clash handling
//!
//! The host reports raw melee events. This module turns them into counter
//! updates on the tracker, presentation calls, and a damage outcome the host
//! applies itself. Lethal clashes between duel opponents end the duel.

use crate::activation::ActivationTracker;
use crate::config::CombatConfig;
use crate::duel::DuelCoordinator;
use crate::host::{Effects, Inventory, PlayerDirectory};
use crate::registry::{assets, WeaponRegistry};
use log::debug;
use rand::Rng;
use shared::{PlayerId, StrikeKind, Vec3};
use std::sync::Arc;

const TRAIL_POINTS: u32 = 10;
const TRAIL_LENGTH: f64 = 3.0;
const HIT_REACH: f64 = 2.0;
const CHEST_HEIGHT: f64 = 1.5;
const KNOCKBACK: f64 = 0.5;
const KNOCKBACK_LIFT: f64 = 0.2;

/// Damage the host should apply after a strike, and what happened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeOutcome {
    pub kind: StrikeKind,
    pub damage: f64,
    pub duel_ended: bool,
}

impl StrikeOutcome {
    fn new(kind: StrikeKind, damage: f64) -> Self {
        Self {
            kind,
            damage,
            duel_ended: false,
        }
    }
}

fn jitter(base: f32, spread: f32) -> f32 {
    base + rand::thread_rng().gen_range(0.0..spread)
}

pub struct CombatResolver {
    registry: WeaponRegistry,
    tracker: Arc<ActivationTracker>,
    duels: Arc<DuelCoordinator>,
    directory: Arc<dyn PlayerDirectory>,
    inventory: Arc<dyn Inventory>,
    effects: Arc<dyn Effects>,
    config: CombatConfig,
}

impl CombatResolver {
    pub fn new(
        tracker: Arc<ActivationTracker>,
        duels: Arc<DuelCoordinator>,
        directory: Arc<dyn PlayerDirectory>,
        inventory: Arc<dyn Inventory>,
        effects: Arc<dyn Effects>,
        config: CombatConfig,
    ) -> Self {
        Self {
            registry: WeaponRegistry::new(),
            tracker,
            duels,
            directory,
            inventory,
            effects,
            config,
        }
    }

    fn holds_weapon(&self, player: PlayerId) -> bool {
        self.registry
            .is_weapon(self.inventory.held_item(player).as_deref())
    }

    /// Swing sound and blade trail. Returns false when the blade is off.
    pub fn on_swing(&self, player: PlayerId) -> bool {
        let Some(pose) = self.directory.locate(player) else {
            return false;
        };
        let Some(variant) = self.tracker.record_swing(player) else {
            return false;
        };

        self.effects
            .play_sound(pose.position, assets::SOUND_SWING, 0.8, jitter(0.9, 0.2));

        let start = pose.position + Vec3::UP * CHEST_HEIGHT;
        let end = start + pose.facing * TRAIL_LENGTH;
        let particle = self.registry.trail_particle(variant);
        for step in 0..=TRAIL_POINTS {
            let point = start.lerp(end, step as f64 / TRAIL_POINTS as f64);
            self.effects.spawn_particles(
                point,
                &particle,
                3,
                Vec3::new(0.05, 0.05, 0.05),
                0.01,
            );
        }
        true
    }

    /// Impact sound and sparks in front of the attacker.
    ///
    /// `target` is `None` when the blade struck something other than a player.
    pub fn on_hit(&self, attacker: PlayerId, target: Option<PlayerId>) -> bool {
        let Some(pose) = self.directory.locate(attacker) else {
            return false;
        };
        if self.tracker.record_hit(attacker).is_none() {
            return false;
        }

        let at = pose.position + pose.facing * HIT_REACH;
        self.effects
            .play_sound(at, assets::SOUND_HIT, 1.0, jitter(0.85, 0.3));
        self.effects.spawn_particles(
            at,
            assets::PARTICLE_SPARKS,
            20,
            Vec3::new(0.2, 0.2, 0.2),
            0.3,
        );
        match target {
            Some(target) => debug!("{} hit {}", attacker, target),
            None => debug!("{} hit something", attacker),
        }
        true
    }

    /// Two lit blades meet. Both players are pushed back from the contact point.
    pub fn on_clash(&self, a: PlayerId, b: PlayerId) -> bool {
        if !(self.tracker.is_active(a) && self.tracker.is_active(b)) {
            return false;
        }
        let (Some(pose_a), Some(pose_b)) = (self.directory.locate(a), self.directory.locate(b))
        else {
            return false;
        };

        let clash_point = pose_a.position.midpoint(pose_b.position) + Vec3::UP * CHEST_HEIGHT;
        self.effects
            .play_sound(clash_point, assets::SOUND_CLASH, 1.2, jitter(0.9, 0.2));
        self.effects.spawn_particles(
            clash_point,
            assets::PARTICLE_CLASH_SPARKS,
            50,
            Vec3::new(0.1, 0.1, 0.1),
            0.5,
        );
        self.effects
            .spawn_particles(clash_point, assets::PARTICLE_CLASH_FLASH, 1, Vec3::ZERO, 0.0);

        for (player, pose) in [(a, pose_a), (b, pose_b)] {
            let away = (pose.position - clash_point).normalize();
            self.effects
                .apply_velocity(player, (away * KNOCKBACK).with_y(KNOCKBACK_LIFT));
        }
        debug!("{} clashed with {}", a, b);
        true
    }

    /// Resolves one melee strike reported by the host.
    ///
    /// `target` is `None` when something other than a player was struck.
    /// `target_health` is the target's health before this strike lands.
    pub fn on_strike(
        &self,
        attacker: PlayerId,
        target: Option<PlayerId>,
        damage: f64,
        target_health: f64,
    ) -> StrikeOutcome {
        if !self.holds_weapon(attacker) {
            return StrikeOutcome::new(StrikeKind::Ignored, damage);
        }
        if !self.tracker.is_active(attacker) {
            return StrikeOutcome::new(
                StrikeKind::Unpowered,
                damage * self.config.unpowered_damage_scale,
            );
        }

        let defender = target.filter(|t| self.holds_weapon(*t) && self.tracker.is_active(*t));
        let Some(defender) = defender else {
            self.on_hit(attacker, target);
            return StrikeOutcome::new(StrikeKind::Hit, damage);
        };

        self.on_clash(attacker, defender);
        let damage = damage * self.config.clash_damage_scale;
        let mut outcome = StrikeOutcome::new(StrikeKind::Clash, damage);
        if target_health - damage <= 0.0 {
            outcome.duel_ended = self.on_lethal_hit(attacker, defender);
        }
        outcome
    }

    /// Ends the duel when `victim` falls to their duel opponent.
    pub fn on_lethal_hit(&self, attacker: PlayerId, victim: PlayerId) -> bool {
        if self.duels.opponent_of(victim) != Some(attacker) {
            return false;
        }
        self.duels.end_duel(attacker, victim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DuelConfig, LightingConfig};
    use crate::host::PlayerPose;
    use crate::lighting::LightSynchronizer;
    use crate::sandbox::{HostCall, SandboxHost};
    use assert_approx_eq::assert_approx_eq;
    use shared::{TitleCard, WeaponVariant};

    const A: PlayerId = PlayerId(1);
    const B: PlayerId = PlayerId(2);

    struct Rig {
        host: Arc<SandboxHost>,
        tracker: Arc<ActivationTracker>,
        duels: Arc<DuelCoordinator>,
        combat: CombatResolver,
    }

    fn rig() -> Rig {
        let host = Arc::new(SandboxHost::new());
        host.join(
            A,
            PlayerPose::new(Vec3::new(0.0, 64.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
        );
        host.join(
            B,
            PlayerPose::new(Vec3::new(2.0, 64.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)),
        );
        host.hold(A, Some("lightsaber_mod:lightsaber_blue"));
        host.hold(B, Some("lightsaber_mod:lightsaber_red"));

        let lights = Arc::new(LightSynchronizer::new(
            host.clone(),
            host.clone(),
            LightingConfig::default(),
        ));
        let tracker = Arc::new(ActivationTracker::new(
            lights,
            host.clone(),
            host.clone(),
            host.clone(),
        ));
        let duels = Arc::new(DuelCoordinator::new(
            host.clone(),
            host.clone(),
            DuelConfig::default(),
        ));
        let combat = CombatResolver::new(
            tracker.clone(),
            duels.clone(),
            host.clone(),
            host.clone(),
            host.clone(),
            CombatConfig::default(),
        );
        Rig {
            host,
            tracker,
            duels,
            combat,
        }
    }

    #[test]
    fn test_swing_requires_lit_blade() {
        let rig = rig();
        assert!(!rig.combat.on_swing(A));

        rig.tracker.toggle(A, WeaponVariant::Blue, 0);
        rig.host.clear_calls();
        assert!(rig.combat.on_swing(A));
        assert_eq!(rig.tracker.state(A).unwrap().swing_count, 1);

        let trail = rig
            .host
            .calls()
            .into_iter()
            .filter(|call| matches!(call, HostCall::Particles { key, .. } if key.ends_with("trail_blue")))
            .count();
        assert_eq!(trail, 11);
    }

    #[test]
    fn test_hit_sparks_in_front_of_attacker() {
        let rig = rig();
        assert!(!rig.combat.on_hit(A, Some(B)));

        rig.tracker.toggle(A, WeaponVariant::Blue, 0);
        rig.host.clear_calls();
        assert!(rig.combat.on_hit(A, Some(B)));
        assert!(rig.combat.on_hit(A, None));
        assert_eq!(rig.tracker.state(A).unwrap().hit_count, 2);

        let sparks: Vec<Vec3> = rig
            .host
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Particles { at, count: 20, .. } => Some(at),
                _ => None,
            })
            .collect();
        assert_eq!(sparks.len(), 2);
        assert_approx_eq!(sparks[0].x, 2.0);
        assert_approx_eq!(sparks[0].y, 64.0);
    }

    #[test]
    fn test_swing_pitch_stays_in_range() {
        let rig = rig();
        rig.tracker.toggle(A, WeaponVariant::Blue, 0);
        for _ in 0..50 {
            rig.combat.on_swing(A);
        }
        for call in rig.host.calls() {
            if let HostCall::Sound { key, pitch, .. } = call {
                if key == assets::SOUND_SWING {
                    assert!((0.9..=1.1).contains(&pitch));
                }
            }
        }
    }

    #[test]
    fn test_unpowered_strike_is_weakened() {
        let rig = rig();
        let outcome = rig.combat.on_strike(A, Some(B), 10.0, 20.0);
        assert_eq!(outcome.kind, StrikeKind::Unpowered);
        assert_approx_eq!(outcome.damage, 3.0);
    }

    #[test]
    fn test_strike_without_weapon_is_ignored() {
        let rig = rig();
        rig.host.hold(A, Some("hytale:iron_sword"));
        let outcome = rig.combat.on_strike(A, None, 7.0, 20.0);
        assert_eq!(outcome.kind, StrikeKind::Ignored);
        assert_approx_eq!(outcome.damage, 7.0);
    }

    #[test]
    fn test_hit_on_unarmed_target() {
        let rig = rig();
        rig.tracker.toggle(A, WeaponVariant::Blue, 0);
        let outcome = rig.combat.on_strike(A, Some(B), 8.0, 20.0);
        assert_eq!(outcome.kind, StrikeKind::Hit);
        assert_approx_eq!(outcome.damage, 8.0);
        assert_eq!(rig.tracker.state(A).unwrap().hit_count, 1);
    }

    #[test]
    fn test_clash_halves_damage_and_knocks_back() {
        let rig = rig();
        rig.tracker.toggle(A, WeaponVariant::Blue, 0);
        rig.tracker.toggle(B, WeaponVariant::Red, 0);
        rig.host.clear_calls();

        let outcome = rig.combat.on_strike(A, Some(B), 8.0, 20.0);
        assert_eq!(outcome.kind, StrikeKind::Clash);
        assert_approx_eq!(outcome.damage, 4.0);
        assert!(!outcome.duel_ended);

        let pushes: Vec<_> = rig
            .host
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Velocity { player, velocity } => Some((player, velocity)),
                _ => None,
            })
            .collect();
        assert_eq!(pushes.len(), 2);
        let (_, push_a) = pushes.iter().find(|(p, _)| *p == A).unwrap();
        assert!(push_a.x < 0.0);
        assert_approx_eq!(push_a.y, 0.2);
    }

    #[test]
    fn test_lethal_clash_ends_duel() {
        let rig = rig();
        rig.tracker.toggle(A, WeaponVariant::Blue, 0);
        rig.tracker.toggle(B, WeaponVariant::Red, 0);
        rig.duels.request_duel(A, B, 0).unwrap();
        rig.duels.accept(B, 100).unwrap();

        let outcome = rig.combat.on_strike(A, Some(B), 10.0, 5.0);
        assert!(outcome.duel_ended);
        assert!(!rig.duels.is_in_duel(A));
        assert!(!rig.duels.is_in_duel(B));
        assert_eq!(rig.host.titles_for(A), vec![TitleCard::Victory]);
    }

    #[test]
    fn test_lethal_hit_outside_duel_changes_nothing() {
        let rig = rig();
        assert!(!rig.combat.on_lethal_hit(A, B));
    }
}
