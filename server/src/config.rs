//! Tunables for the extension
//!
//! Defaults reproduce the stock behaviour: 30 s request expiry, a sweep every
//! 10 s, one tick per 50 ms and a three-step countdown one second apart.

use shared::{REQUEST_TIMEOUT_MS, TICK_MS};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} must be between 0 and 1, got {1}")]
    OutOfRange(&'static str, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuelConfig {
    /// Pending requests older than this are refused and swept
    pub request_timeout_ms: u64,
    pub countdown_steps: u8,
    pub countdown_step_ms: u64,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            countdown_steps: 3,
            countdown_step_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightingConfig {
    pub flicker_amplitude: f32,
    pub flicker_period_ms: f64,
    pub pulse_amplitude: f64,
    pub pulse_period_ms: f64,
    /// Distance along the facing vector to the blade
    pub blade_reach: f64,
    pub blade_height: f64,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            flicker_amplitude: 0.1,
            flicker_period_ms: 100.0,
            pulse_amplitude: 0.1,
            pulse_period_ms: 500.0,
            blade_reach: 0.5,
            blade_height: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombatConfig {
    /// Damage multiplier when both blades meet
    pub clash_damage_scale: f64,
    /// Damage multiplier when striking with the blade switched off
    pub unpowered_damage_scale: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            clash_damage_scale: 0.5,
            unpowered_damage_scale: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionConfig {
    pub tick_period_ms: u64,
    pub sweep_period_ms: u64,
    pub duel: DuelConfig,
    pub lighting: LightingConfig,
    pub combat: CombatConfig,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: TICK_MS,
            sweep_period_ms: 10_000,
            duel: DuelConfig::default(),
            lighting: LightingConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl ExtensionConfig {
    /// Defaults with the operator-facing knobs applied. Out-of-range
    /// second counts saturate instead of wrapping.
    pub fn from_flags(tick_rate: u32, sweep_interval_secs: u64, request_timeout_secs: u64) -> Self {
        let mut config = Self::default();
        config.tick_period_ms = 1000 / u64::from(tick_rate.max(1));
        config.sweep_period_ms = sweep_interval_secs.saturating_mul(1000);
        config.duel.request_timeout_ms = request_timeout_secs.saturating_mul(1000);
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::Zero("tick_period_ms"));
        }
        if self.sweep_period_ms == 0 {
            return Err(ConfigError::Zero("sweep_period_ms"));
        }
        if self.duel.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("request_timeout_ms"));
        }
        if self.duel.countdown_step_ms == 0 {
            return Err(ConfigError::Zero("countdown_step_ms"));
        }
        if self.lighting.flicker_period_ms <= 0.0 {
            return Err(ConfigError::Zero("flicker_period_ms"));
        }
        if self.lighting.pulse_period_ms <= 0.0 {
            return Err(ConfigError::Zero("pulse_period_ms"));
        }
        for (name, scale) in [
            ("clash_damage_scale", self.combat.clash_damage_scale),
            ("unpowered_damage_scale", self.combat.unpowered_damage_scale),
        ] {
            if !(0.0..=1.0).contains(&scale) {
                return Err(ConfigError::OutOfRange(name, scale));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExtensionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.duel.request_timeout_ms, 30_000);
        assert_eq!(config.sweep_period_ms, 10_000);
        assert_eq!(config.duel.countdown_steps, 3);
    }

    #[test]
    fn test_zero_periods_rejected() {
        let mut config = ExtensionConfig::default();
        config.sweep_period_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("sweep_period_ms")));

        let mut config = ExtensionConfig::default();
        config.duel.countdown_step_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("countdown_step_ms"))
        );
    }

    #[test]
    fn test_from_flags() {
        let config = ExtensionConfig::from_flags(20, 10, 30);
        assert_eq!(config, ExtensionConfig::default());

        let config = ExtensionConfig::from_flags(0, 1, 2);
        assert_eq!(config.tick_period_ms, 1000);
        assert_eq!(config.sweep_period_ms, 1_000);
        assert_eq!(config.duel.request_timeout_ms, 2_000);
    }

    #[test]
    fn test_from_flags_saturates_huge_values() {
        let config = ExtensionConfig::from_flags(20, u64::MAX, u64::MAX / 10);
        assert_eq!(config.sweep_period_ms, u64::MAX);
        assert_eq!(config.duel.request_timeout_ms, u64::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_damage_scale_range() {
        let mut config = ExtensionConfig::default();
        config.combat.clash_damage_scale = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::OutOfRange("clash_damage_scale", 1.5))
        );
    }
}
