//! Weapon registry: item ids, variants and their derived light parameters
//!
//! Everything here is a fixed literal table. Nothing is mutated after startup.

use shared::{Rgb, WeaponVariant, ITEM_NAMESPACE};

/// Sound, particle and animation keys understood by the client resource pack
pub mod assets {
    pub const SOUND_ON: &str = "lightsaber_mod:lightsaber_on";
    pub const SOUND_OFF: &str = "lightsaber_mod:lightsaber_off";
    pub const SOUND_SWING: &str = "lightsaber_mod:lightsaber_swing";
    pub const SOUND_HIT: &str = "lightsaber_mod:lightsaber_hit";
    pub const SOUND_CLASH: &str = "lightsaber_mod:lightsaber_clash";
    pub const SOUND_HUM: &str = "lightsaber_mod:lightsaber_hum";
    pub const SOUND_HUM_SITH: &str = "lightsaber_mod:lightsaber_hum_sith";
    pub const SOUND_CHALLENGE: &str = "hytale:ui_notification";
    pub const SOUND_COUNTDOWN: &str = "hytale:ui_countdown";
    pub const SOUND_FIGHT: &str = "hytale:combat_start";
    pub const SOUND_VICTORY: &str = "hytale:victory_fanfare";

    pub const ANIM_ACTIVATE: &str = "lightsaber_mod:lightsaber_activate";
    pub const ANIM_DEACTIVATE: &str = "lightsaber_mod:lightsaber_deactivate";

    pub const PARTICLE_IGNITE: &str = "lightsaber_mod:lightsaber_ignite";
    pub const PARTICLE_SPARKS: &str = "lightsaber_mod:lightsaber_sparks";
    pub const PARTICLE_CLASH_SPARKS: &str = "lightsaber_mod:lightsaber_clash_sparks";
    pub const PARTICLE_CLASH_FLASH: &str = "lightsaber_mod:lightsaber_clash_flash";
    pub const PARTICLE_TRAIL_PREFIX: &str = "lightsaber_mod:lightsaber_trail_";
}

/// Light parameters derived from a blade variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightProfile {
    pub color: Rgb,
    pub radius: i32,
    pub intensity: f32,
    pub flickers: bool,
}

const ITEM_TABLE: [(&str, WeaponVariant); 6] = [
    ("lightsaber_mod:lightsaber_blue", WeaponVariant::Blue),
    ("lightsaber_mod:lightsaber_green", WeaponVariant::Green),
    ("lightsaber_mod:lightsaber_red", WeaponVariant::Red),
    ("lightsaber_mod:lightsaber_purple", WeaponVariant::Purple),
    ("lightsaber_mod:lightsaber_yellow", WeaponVariant::Yellow),
    ("lightsaber_mod:lightsaber_white", WeaponVariant::White),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct WeaponRegistry;

impl WeaponRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Maps an item id to its blade variant, `None` for anything that is not a weapon.
    pub fn resolve(&self, item_id: &str) -> Option<WeaponVariant> {
        ITEM_TABLE
            .iter()
            .find(|(id, _)| *id == item_id)
            .map(|(_, variant)| *variant)
    }

    pub fn is_weapon(&self, item_id: Option<&str>) -> bool {
        item_id.and_then(|id| self.resolve(id)).is_some()
    }

    pub fn item_id(&self, variant: WeaponVariant) -> String {
        format!("{}:lightsaber_{}", ITEM_NAMESPACE, variant.key())
    }

    pub fn variants(&self) -> &'static [WeaponVariant] {
        &WeaponVariant::ALL
    }

    pub fn light_profile(&self, variant: WeaponVariant) -> LightProfile {
        let (radius, intensity) = match variant {
            WeaponVariant::White => (10, 1.6),
            WeaponVariant::Purple => (9, 1.3),
            WeaponVariant::Red => (8, 1.4),
            WeaponVariant::Yellow => (7, 1.5),
            WeaponVariant::Blue | WeaponVariant::Green => (8, 1.2),
        };
        LightProfile {
            color: variant.rgb(),
            radius,
            intensity,
            flickers: variant == WeaponVariant::Red,
        }
    }

    pub fn hum_sound(&self, variant: WeaponVariant) -> &'static str {
        if variant == WeaponVariant::Red {
            assets::SOUND_HUM_SITH
        } else {
            assets::SOUND_HUM
        }
    }

    pub fn trail_particle(&self, variant: WeaponVariant) -> String {
        format!("{}{}", assets::PARTICLE_TRAIL_PREFIX, variant.key())
    }
}
