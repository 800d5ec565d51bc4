//! In-memory host
//!
//! Implements every collaborator trait against plain maps and records each call
//! it receives. Useful for headless embedding and for exercising the core
//! without a network.

use crate::host::{EffectError, Effects, Inventory, LightBackend, LightHandle, PlayerDirectory, PlayerPose};
use shared::{DuelNotice, PlayerId, Rgb, TitleCard, TitleTiming, Vec3, WeaponVariant};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// One recorded collaborator call
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Sound {
        at: Option<Vec3>,
        player: Option<PlayerId>,
        key: String,
        volume: f32,
        pitch: f32,
    },
    StopSound {
        player: PlayerId,
        key: String,
    },
    Particles {
        at: Vec3,
        key: String,
        count: u32,
    },
    Animation {
        player: PlayerId,
        key: String,
    },
    Velocity {
        player: PlayerId,
        velocity: Vec3,
    },
    Title {
        player: PlayerId,
        card: TitleCard,
        timing: TitleTiming,
    },
    Notice {
        player: PlayerId,
        notice: DuelNotice,
    },
    BladeFlag {
        player: PlayerId,
        active: bool,
    },
    ItemGiven {
        player: PlayerId,
        item_id: String,
    },
    LightCreated {
        light: u64,
        color: Rgb,
        radius: i32,
        intensity: f32,
    },
    LightRemoved {
        light: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxLight {
    pub position: Vec3,
    pub color: Rgb,
    pub radius: i32,
    pub intensity: f32,
    pub following: Option<PlayerId>,
}

#[derive(Debug, Clone)]
struct SandboxPlayer {
    pose: PlayerPose,
    held_item: Option<String>,
    items: Vec<String>,
    blade_active: bool,
}

#[derive(Default)]
struct LightTable {
    live: HashMap<u64, SandboxLight>,
    broken: HashSet<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct SandboxHost {
    players: RwLock<HashMap<PlayerId, SandboxPlayer>>,
    calls: Arc<Mutex<Vec<HostCall>>>,
    lights: Arc<Mutex<LightTable>>,
    next_light: AtomicU64,
}

impl SandboxHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a player online at `pose` with empty hands.
    pub fn join(&self, player: PlayerId, pose: PlayerPose) {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        players.insert(
            player,
            SandboxPlayer {
                pose,
                held_item: None,
                items: Vec::new(),
                blade_active: false,
            },
        );
    }

    pub fn leave(&self, player: PlayerId) {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        players.remove(&player);
    }

    pub fn set_pose(&self, player: PlayerId, pose: PlayerPose) {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = players.get_mut(&player) {
            entry.pose = pose;
        }
    }

    pub fn hold(&self, player: PlayerId, item: Option<&str>) {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = players.get_mut(&player) {
            entry.held_item = item.map(str::to_string);
        }
    }

    pub fn blade_flag(&self, player: PlayerId) -> Option<bool> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.get(&player).map(|entry| entry.blade_active)
    }

    pub fn items(&self, player: PlayerId) -> Vec<String> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players
            .get(&player)
            .map(|entry| entry.items.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn titles_for(&self, player: PlayerId) -> Vec<TitleCard> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HostCall::Title { player: p, card, .. } if *p == player => Some(*card),
                _ => None,
            })
            .collect()
    }

    pub fn notices_for(&self, player: PlayerId) -> Vec<DuelNotice> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HostCall::Notice { player: p, notice } if *p == player => Some(*notice),
                _ => None,
            })
            .collect()
    }

    pub fn sounds(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                HostCall::Sound { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn live_lights(&self) -> Vec<SandboxLight> {
        lock(&self.lights).live.values().cloned().collect()
    }

    pub fn light_following(&self, player: PlayerId) -> Option<SandboxLight> {
        lock(&self.lights)
            .live
            .values()
            .find(|light| light.following == Some(player))
            .cloned()
    }

    /// Makes every later update of the light following `player` fail.
    pub fn break_light_of(&self, player: PlayerId) {
        let mut table = lock(&self.lights);
        let ids: Vec<u64> = table
            .live
            .iter()
            .filter(|(_, light)| light.following == Some(player))
            .map(|(id, _)| *id)
            .collect();
        table.broken.extend(ids);
    }

    fn record(&self, call: HostCall) {
        lock(&self.calls).push(call);
    }
}

impl PlayerDirectory for SandboxHost {
    fn locate(&self, player: PlayerId) -> Option<PlayerPose> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.get(&player).map(|entry| entry.pose)
    }
}

impl Inventory for SandboxHost {
    fn held_item(&self, player: PlayerId) -> Option<String> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.get(&player).and_then(|entry| entry.held_item.clone())
    }

    fn set_blade_flag(&self, player: PlayerId, active: bool) {
        {
            let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = players.get_mut(&player) {
                entry.blade_active = active;
            }
        }
        self.record(HostCall::BladeFlag { player, active });
    }

    fn give_item(&self, player: PlayerId, item_id: &str, _variant: WeaponVariant) -> bool {
        let given = {
            let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
            match players.get_mut(&player) {
                Some(entry) => {
                    entry.items.push(item_id.to_string());
                    if entry.held_item.is_none() {
                        entry.held_item = Some(item_id.to_string());
                    }
                    true
                }
                None => false,
            }
        };
        if given {
            self.record(HostCall::ItemGiven {
                player,
                item_id: item_id.to_string(),
            });
        }
        given
    }
}

impl Effects for SandboxHost {
    fn play_sound(&self, at: Vec3, key: &str, volume: f32, pitch: f32) {
        self.record(HostCall::Sound {
            at: Some(at),
            player: None,
            key: key.to_string(),
            volume,
            pitch,
        });
    }

    fn play_sound_to(&self, player: PlayerId, key: &str, volume: f32, pitch: f32) {
        self.record(HostCall::Sound {
            at: None,
            player: Some(player),
            key: key.to_string(),
            volume,
            pitch,
        });
    }

    fn stop_sound(&self, player: PlayerId, key: &str) {
        self.record(HostCall::StopSound {
            player,
            key: key.to_string(),
        });
    }

    fn spawn_particles(&self, at: Vec3, key: &str, count: u32, _spread: Vec3, _speed: f64) {
        self.record(HostCall::Particles {
            at,
            key: key.to_string(),
            count,
        });
    }

    fn play_animation(&self, player: PlayerId, key: &str) {
        self.record(HostCall::Animation {
            player,
            key: key.to_string(),
        });
    }

    fn apply_velocity(&self, player: PlayerId, velocity: Vec3) {
        self.record(HostCall::Velocity { player, velocity });
    }

    fn show_title(&self, player: PlayerId, card: TitleCard, timing: TitleTiming) {
        self.record(HostCall::Title {
            player,
            card,
            timing,
        });
    }

    fn notify(&self, player: PlayerId, notice: DuelNotice) {
        self.record(HostCall::Notice { player, notice });
    }
}

impl LightBackend for SandboxHost {
    fn create_light(
        &self,
        at: Vec3,
        color: Rgb,
        radius: i32,
        intensity: f32,
    ) -> Result<Box<dyn LightHandle>, EffectError> {
        let id = self.next_light.fetch_add(1, Ordering::SeqCst);
        lock(&self.lights).live.insert(
            id,
            SandboxLight {
                position: at,
                color,
                radius,
                intensity,
                following: None,
            },
        );
        self.record(HostCall::LightCreated {
            light: id,
            color,
            radius,
            intensity,
        });
        Ok(Box::new(SandboxLightHandle {
            id,
            owner: None,
            table: Arc::clone(&self.lights),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct SandboxLightHandle {
    id: u64,
    owner: Option<PlayerId>,
    table: Arc<Mutex<LightTable>>,
    calls: Arc<Mutex<Vec<HostCall>>>,
}

impl SandboxLightHandle {
    fn with_light(&self, apply: impl FnOnce(&mut SandboxLight)) -> Result<(), EffectError> {
        let mut table = lock(&self.table);
        let stale = EffectError::StaleLight(self.owner.unwrap_or(PlayerId(0)));
        if table.broken.contains(&self.id) {
            return Err(stale);
        }
        match table.live.get_mut(&self.id) {
            Some(light) => {
                apply(light);
                Ok(())
            }
            None => Err(stale),
        }
    }
}

impl LightHandle for SandboxLightHandle {
    fn set_position(&mut self, at: Vec3) -> Result<(), EffectError> {
        self.with_light(|light| light.position = at)
    }

    fn set_intensity(&mut self, intensity: f32) -> Result<(), EffectError> {
        self.with_light(|light| light.intensity = intensity)
    }

    fn set_radius(&mut self, radius: i32) -> Result<(), EffectError> {
        self.with_light(|light| light.radius = radius)
    }

    fn follow_entity(&mut self, player: PlayerId) -> Result<(), EffectError> {
        self.owner = Some(player);
        self.with_light(|light| light.following = Some(player))
    }

    fn remove(self: Box<Self>) {
        let mut table = lock(&self.table);
        table.live.remove(&self.id);
        table.broken.remove(&self.id);
        drop(table);
        lock(&self.calls).push(HostCall::LightRemoved { light: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose() -> PlayerPose {
        PlayerPose::new(Vec3::new(0.0, 64.0, 0.0), Vec3::new(1.0, 0.0, 0.0))
    }

    #[test]
    fn test_directory_follows_join_and_leave() {
        let host = SandboxHost::new();
        assert!(!host.is_online(PlayerId(1)));

        host.join(PlayerId(1), pose());
        assert!(host.is_online(PlayerId(1)));

        host.leave(PlayerId(1));
        assert!(host.locate(PlayerId(1)).is_none());
    }

    #[test]
    fn test_give_item_holds_first_item() {
        let host = SandboxHost::new();
        host.join(PlayerId(1), pose());

        assert!(host.give_item(PlayerId(1), "lightsaber_mod:lightsaber_red", WeaponVariant::Red));
        assert_eq!(
            host.held_item(PlayerId(1)).as_deref(),
            Some("lightsaber_mod:lightsaber_red")
        );
        assert!(!host.give_item(PlayerId(2), "lightsaber_mod:lightsaber_red", WeaponVariant::Red));
    }

    #[test]
    fn test_light_lifecycle() {
        let host = SandboxHost::new();
        let mut handle = host
            .create_light(Vec3::ZERO, Rgb(1, 2, 3), 8, 1.0)
            .unwrap();
        handle.follow_entity(PlayerId(4)).unwrap();
        handle.set_radius(9).unwrap();

        let light = host.light_following(PlayerId(4)).unwrap();
        assert_eq!(light.radius, 9);

        host.break_light_of(PlayerId(4));
        assert_eq!(
            handle.set_radius(10),
            Err(EffectError::StaleLight(PlayerId(4)))
        );

        handle.remove();
        assert!(host.live_lights().is_empty());
    }
}
