//! Composition root
//!
//! [`LightsaberExtension`] builds every component once from a single host and
//! is the only thing the adapter layer talks to. Each host event maps to one
//! method here.

use crate::activation::{ActivationEvent, ActivationTracker};
use crate::combat::{CombatResolver, StrikeOutcome};
use crate::config::{ConfigError, ExtensionConfig};
use crate::duel::{ActiveDuel, DuelCoordinator, DuelEnding};
use crate::host::{Clock, Effects, Inventory, LightBackend, PlayerDirectory};
use crate::lighting::{LightSynchronizer, TickReport};
use crate::registry::WeaponRegistry;
use log::{debug, info};
use shared::{DuelRejection, PlayerId, Timestamp, VariantInfo, WeaponVariant};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Why a player is leaving the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    Disconnect,
    Death,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub lights: TickReport,
    pub countdown_steps: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub expired_requests: usize,
    /// Players still tracked although the directory no longer knows them
    pub reaped_players: usize,
}

pub struct LightsaberExtension {
    config: ExtensionConfig,
    clock: Arc<dyn Clock>,
    registry: WeaponRegistry,
    directory: Arc<dyn PlayerDirectory>,
    inventory: Arc<dyn Inventory>,
    lights: Arc<LightSynchronizer>,
    tracker: Arc<ActivationTracker>,
    duels: Arc<DuelCoordinator>,
    combat: CombatResolver,
}

impl LightsaberExtension {
    pub fn new<H>(
        config: ExtensionConfig,
        clock: Arc<dyn Clock>,
        host: Arc<H>,
    ) -> Result<Self, ConfigError>
    where
        H: PlayerDirectory + Inventory + Effects + LightBackend + 'static,
    {
        config.validate()?;

        let directory: Arc<dyn PlayerDirectory> = host.clone();
        let inventory: Arc<dyn Inventory> = host.clone();
        let effects: Arc<dyn Effects> = host.clone();
        let backend: Arc<dyn LightBackend> = host;

        let lights = Arc::new(LightSynchronizer::new(
            directory.clone(),
            backend,
            config.lighting.clone(),
        ));
        let tracker = Arc::new(ActivationTracker::new(
            lights.clone(),
            directory.clone(),
            inventory.clone(),
            effects.clone(),
        ));
        let duels = Arc::new(DuelCoordinator::new(
            directory.clone(),
            effects.clone(),
            config.duel.clone(),
        ));
        let combat = CombatResolver::new(
            tracker.clone(),
            duels.clone(),
            directory.clone(),
            inventory.clone(),
            effects,
            config.combat.clone(),
        );

        info!(
            "Lightsaber extension ready: {} variants, request timeout {}ms",
            WeaponVariant::ALL.len(),
            config.duel.request_timeout_ms
        );

        Ok(Self {
            config,
            clock,
            registry: WeaponRegistry::new(),
            directory,
            inventory,
            lights,
            tracker,
            duels,
            combat,
        })
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ActivationTracker {
        &self.tracker
    }

    pub fn lights(&self) -> &LightSynchronizer {
        &self.lights
    }

    pub fn duels(&self) -> &DuelCoordinator {
        &self.duels
    }

    // --- Weapons ---

    /// Toggles the blade in the player's hand. `None` if they hold no weapon.
    pub fn toggle(&self, player: PlayerId) -> Option<ActivationEvent> {
        let held = self.inventory.held_item(player)?;
        let variant = self.registry.resolve(&held)?;
        Some(self.tracker.toggle(player, variant, self.now()))
    }

    pub fn is_active(&self, player: PlayerId) -> bool {
        self.tracker.is_active(player)
    }

    pub fn give_weapon(&self, player: PlayerId, variant: WeaponVariant) -> bool {
        if !self.directory.is_online(player) {
            return false;
        }
        let item_id = self.registry.item_id(variant);
        let given = self.inventory.give_item(player, &item_id, variant);
        if given {
            debug!("Gave {} to {}", item_id, player);
        }
        given
    }

    pub fn weapon_variants(&self) -> &'static [WeaponVariant] {
        self.registry.variants()
    }

    /// Name, lore and colour of every blade, in registry order.
    pub fn variant_catalogue(&self) -> Vec<VariantInfo> {
        self.weapon_variants()
            .iter()
            .copied()
            .map(VariantInfo::from)
            .collect()
    }

    /// The player moved their hand off `previous`. A lit blade goes out.
    pub fn on_item_switched(&self, player: PlayerId, previous: Option<&str>) -> bool {
        self.registry.is_weapon(previous) && self.tracker.deactivate(player)
    }

    pub fn on_item_dropped(&self, player: PlayerId, item: &str) -> bool {
        self.registry.is_weapon(Some(item)) && self.tracker.deactivate(player)
    }

    // --- Combat ---

    pub fn on_swing(&self, player: PlayerId) -> bool {
        self.combat.on_swing(player)
    }

    pub fn on_hit(&self, attacker: PlayerId, target: Option<PlayerId>) -> bool {
        self.combat.on_hit(attacker, target)
    }

    pub fn on_clash(&self, a: PlayerId, b: PlayerId) -> bool {
        self.combat.on_clash(a, b)
    }

    pub fn on_strike(
        &self,
        attacker: PlayerId,
        target: Option<PlayerId>,
        damage: f64,
        target_health: f64,
    ) -> StrikeOutcome {
        self.combat.on_strike(attacker, target, damage, target_health)
    }

    pub fn on_lethal_hit(&self, attacker: PlayerId, victim: PlayerId) -> bool {
        self.combat.on_lethal_hit(attacker, victim)
    }

    // --- Duels ---

    pub fn request_duel(&self, challenger: PlayerId, target: PlayerId) -> Result<(), DuelRejection> {
        self.duels.request_duel(challenger, target, self.now())
    }

    pub fn accept(&self, player: PlayerId) -> Result<ActiveDuel, DuelRejection> {
        self.duels.accept(player, self.now())
    }

    pub fn decline(&self, player: PlayerId) -> Result<PlayerId, DuelRejection> {
        self.duels.decline(player)
    }

    pub fn is_in_duel(&self, player: PlayerId) -> bool {
        self.duels.is_in_duel(player)
    }

    pub fn get_opponent(&self, player: PlayerId) -> Option<PlayerId> {
        self.duels.opponent_of(player)
    }

    // --- Lifecycle ---

    /// Weapon state goes in both cases. A death hands the duel to the
    /// opponent, a disconnect abandons it and cancels every request.
    pub fn on_disconnect_or_death(
        &self,
        player: PlayerId,
        departure: Departure,
    ) -> Option<DuelEnding> {
        self.tracker.on_disconnect_or_death(player);
        match departure {
            Departure::Disconnect => self.duels.on_disconnect(player),
            Departure::Death => self.duels.on_death(player),
        }
    }

    pub fn on_disconnect(&self, player: PlayerId) -> Option<DuelEnding> {
        self.on_disconnect_or_death(player, Departure::Disconnect)
    }

    pub fn on_death(&self, player: PlayerId) -> Option<DuelEnding> {
        self.on_disconnect_or_death(player, Departure::Death)
    }

    /// Clears any light left behind by the previous life.
    pub fn on_respawn(&self, player: PlayerId) -> bool {
        self.lights.unregister(player)
    }

    // --- Drivers ---

    /// One game tick: move every light, then fire due countdown steps.
    pub fn tick(&self, now: Timestamp) -> TickSummary {
        TickSummary {
            lights: self.lights.tick(now),
            countdown_steps: self.duels.advance_countdowns(now),
        }
    }

    /// Expires stale requests and cleans up after players the host lost track of.
    pub fn sweep(&self, now: Timestamp) -> SweepSummary {
        let expired_requests = self.duels.sweep(now);

        let known: BTreeSet<PlayerId> = self
            .tracker
            .tracked_players()
            .into_iter()
            .chain(self.duels.known_players())
            .collect();
        let mut reaped_players = 0;
        for player in known {
            if !self.directory.is_online(player) {
                debug!("Reaping state of vanished {}", player);
                self.on_disconnect(player);
                reaped_players += 1;
            }
        }

        SweepSummary {
            expired_requests,
            reaped_players,
        }
    }

    /// Destroys every light and forgets all weapon and duel state.
    pub fn shutdown(&self) {
        let lights = self.lights.cleanup_all();
        self.tracker.clear();
        self.duels.end_all();
        info!("Lightsaber extension shut down, {} lights removed", lights);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ManualClock, PlayerPose};
    use crate::sandbox::SandboxHost;
    use shared::{DuelNotice, Vec3};

    const C: PlayerId = PlayerId(1);
    const T: PlayerId = PlayerId(2);

    fn extension() -> (Arc<SandboxHost>, Arc<ManualClock>, LightsaberExtension) {
        let host = Arc::new(SandboxHost::new());
        let clock = Arc::new(ManualClock::new(0));
        for player in [C, T] {
            host.join(
                player,
                PlayerPose::new(Vec3::new(player.0 as f64, 64.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
            );
        }
        let ext = LightsaberExtension::new(ExtensionConfig::default(), clock.clone(), host.clone())
            .unwrap();
        (host, clock, ext)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ExtensionConfig::default();
        config.sweep_period_ms = 0;
        let result = LightsaberExtension::new(
            config,
            Arc::new(ManualClock::new(0)),
            Arc::new(SandboxHost::new()),
        );
        assert!(matches!(result, Err(ConfigError::Zero("sweep_period_ms"))));
    }

    #[test]
    fn test_toggle_needs_a_weapon_in_hand() {
        let (host, _clock, ext) = extension();
        assert_eq!(ext.toggle(C), None);

        assert!(ext.give_weapon(C, WeaponVariant::Green));
        assert_eq!(ext.toggle(C), Some(ActivationEvent::Activated(WeaponVariant::Green)));
        assert_eq!(host.blade_flag(C), Some(true));
        assert!(ext.lights().contains(C));

        assert_eq!(ext.toggle(C), Some(ActivationEvent::Deactivated));
        assert!(!ext.lights().contains(C));
    }

    #[test]
    fn test_variant_catalogue_lists_every_blade() {
        let (_host, _clock, ext) = extension();
        let catalogue = ext.variant_catalogue();
        assert_eq!(catalogue.len(), 6);
        assert_eq!(catalogue[0].variant, WeaponVariant::Blue);
        assert_eq!(catalogue[0].lore, "Jedi Guardian");
        assert_eq!(catalogue[5].color, "#FFFFFF");
    }

    #[test]
    fn test_hit_reports_target() {
        let (host, _clock, ext) = extension();
        assert!(!ext.on_hit(C, Some(T)));

        ext.give_weapon(C, WeaponVariant::Green);
        ext.toggle(C);
        host.clear_calls();
        assert!(ext.on_hit(C, Some(T)));
        assert_eq!(ext.tracker().state(C).unwrap().hit_count, 1);
        assert!(!host.sounds().is_empty());
    }

    #[test]
    fn test_switching_away_puts_blade_out() {
        let (host, _clock, ext) = extension();
        ext.give_weapon(C, WeaponVariant::Red);
        ext.toggle(C);

        host.hold(C, None);
        assert!(ext.on_item_switched(C, Some("lightsaber_mod:lightsaber_red")));
        assert!(!ext.is_active(C));
        assert!(!ext.on_item_switched(C, Some("lightsaber_mod:lightsaber_red")));
    }

    #[test]
    fn test_death_in_duel_hands_win_to_opponent() {
        let (host, clock, ext) = extension();
        ext.request_duel(C, T).unwrap();
        clock.advance(1_000);
        ext.accept(T).unwrap();

        let ending = ext.on_death(T);
        assert_eq!(ending, Some(DuelEnding::Decided { winner: C, loser: T }));
        assert!(!ext.is_in_duel(C));
        assert!(host.titles_for(C).contains(&shared::TitleCard::Victory));
    }

    #[test]
    fn test_sweep_reaps_vanished_players() {
        let (host, clock, ext) = extension();
        ext.give_weapon(C, WeaponVariant::Blue);
        ext.toggle(C);
        ext.request_duel(C, T).unwrap();
        ext.accept(T).unwrap();

        host.leave(C);
        clock.advance(10_000);
        let summary = ext.sweep(clock.now());
        assert_eq!(summary.reaped_players, 1);
        assert!(!ext.is_active(C));
        assert!(!ext.is_in_duel(T));
        assert!(ext.lights().is_empty());
        assert!(host
            .notices_for(T)
            .contains(&DuelNotice::OpponentDisconnected { opponent: C }));
    }

    #[test]
    fn test_tick_drives_lights_and_countdown() {
        let (host, clock, ext) = extension();
        ext.give_weapon(C, WeaponVariant::White);
        ext.toggle(C);
        ext.request_duel(C, T).unwrap();
        ext.accept(T).unwrap();

        let summary = ext.tick(clock.advance(1_000));
        assert_eq!(summary.lights.updated, 1);
        assert_eq!(summary.countdown_steps, 1);
        assert_eq!(host.titles_for(T), vec![shared::TitleCard::Countdown(3)]);
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let (host, _clock, ext) = extension();
        ext.give_weapon(C, WeaponVariant::Purple);
        ext.toggle(C);
        ext.request_duel(C, T).unwrap();
        ext.accept(T).unwrap();

        ext.shutdown();
        assert!(!ext.is_active(C));
        assert!(!ext.is_in_duel(C));
        assert!(ext.lights().is_empty());
        assert!(host.live_lights().is_empty());
    }
}
