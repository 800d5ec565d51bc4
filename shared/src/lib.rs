use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use thiserror::Error;

pub const PROTOCOL_VERSION: u32 = 1;
pub const ITEM_NAMESPACE: &str = "lightsaber_mod";
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const TICK_MS: u64 = 50;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalize(&self) -> Vec3 {
        let len = self.length();
        if len > 0.0 {
            *self * (1.0 / len)
        } else {
            Vec3::ZERO
        }
    }

    pub fn midpoint(&self, other: Vec3) -> Vec3 {
        (*self + other) * 0.5
    }

    pub fn lerp(&self, other: Vec3, t: f64) -> Vec3 {
        *self + (other - *self) * t
    }

    pub fn with_y(&self, y: f64) -> Vec3 {
        Vec3::new(self.x, y, self.z)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Blade colour. Fixed once a weapon item is minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponVariant {
    Blue,
    Green,
    Red,
    Purple,
    Yellow,
    White,
}

impl WeaponVariant {
    pub const ALL: [WeaponVariant; 6] = [
        WeaponVariant::Blue,
        WeaponVariant::Green,
        WeaponVariant::Red,
        WeaponVariant::Purple,
        WeaponVariant::Yellow,
        WeaponVariant::White,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            WeaponVariant::Blue => "blue",
            WeaponVariant::Green => "green",
            WeaponVariant::Red => "red",
            WeaponVariant::Purple => "purple",
            WeaponVariant::Yellow => "yellow",
            WeaponVariant::White => "white",
        }
    }

    pub fn rgb(&self) -> Rgb {
        match self {
            WeaponVariant::Blue => Rgb(0, 120, 255),
            WeaponVariant::Green => Rgb(0, 255, 100),
            WeaponVariant::Red => Rgb(255, 0, 0),
            WeaponVariant::Purple => Rgb(180, 0, 255),
            WeaponVariant::Yellow => Rgb(255, 230, 0),
            WeaponVariant::White => Rgb(255, 255, 255),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WeaponVariant::Blue => "Blue",
            WeaponVariant::Green => "Green",
            WeaponVariant::Red => "Red",
            WeaponVariant::Purple => "Purple",
            WeaponVariant::Yellow => "Yellow",
            WeaponVariant::White => "White",
        }
    }

    pub fn lore(&self) -> &'static str {
        match self {
            WeaponVariant::Blue => "Jedi Guardian",
            WeaponVariant::Green => "Jedi Consular",
            WeaponVariant::Red => "Sith",
            WeaponVariant::Purple => "Rare",
            WeaponVariant::Yellow => "Jedi Sentinel",
            WeaponVariant::White => "Purified",
        }
    }

    /// Case-insensitive lookup by key.
    pub fn parse(name: &str) -> Option<WeaponVariant> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|variant| variant.key().eq_ignore_ascii_case(name))
    }

    /// Like [`WeaponVariant::parse`] but unknown names fall back to blue.
    pub fn from_name(name: &str) -> WeaponVariant {
        Self::parse(name).unwrap_or(WeaponVariant::Blue)
    }
}

/// Title cards shown to duel participants. Text is rendered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleCard {
    Countdown(u8),
    Fight,
    Victory,
    Defeat { winner: PlayerId },
}

/// Fade timings in game ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleTiming {
    pub fade_in: u32,
    pub stay: u32,
    pub fade_out: u32,
}

impl TitleTiming {
    pub const COUNTDOWN: TitleTiming = TitleTiming::new(0, 20, 5);
    pub const FIGHT: TitleTiming = TitleTiming::new(5, 30, 10);
    pub const RESULT: TitleTiming = TitleTiming::new(10, 60, 20);

    pub const fn new(fade_in: u32, stay: u32, fade_out: u32) -> Self {
        Self {
            fade_in,
            stay,
            fade_out,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuelNotice {
    ChallengeSent { target: PlayerId },
    ChallengeReceived { challenger: PlayerId },
    Declined { by: PlayerId },
    DeclineConfirmed { challenger: PlayerId },
    OpponentDisconnected { opponent: PlayerId },
}

/// Expected, user-facing refusals. The command layer turns these into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DuelRejection {
    #[error("a participant is already in a duel")]
    AlreadyInDuel,
    #[error("target already has a pending duel request")]
    AlreadyPending,
    #[error("no pending duel request")]
    NoPendingRequest,
    #[error("duel request expired")]
    RequestExpired,
    #[error("challenger is no longer online")]
    ChallengerOffline,
    #[error("cannot duel yourself")]
    SelfTarget,
    #[error("target player not found")]
    TargetNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrikeKind {
    /// Attacker was not holding a weapon.
    Ignored,
    /// Weapon held but switched off.
    Unpowered,
    Clash,
    Hit,
}

/// One row of the blade colour listing sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInfo {
    pub variant: WeaponVariant,
    pub name: String,
    pub lore: String,
    /// `#RRGGBB`
    pub color: String,
}

impl From<WeaponVariant> for VariantInfo {
    fn from(variant: WeaponVariant) -> Self {
        Self {
            variant,
            name: variant.display_name().to_string(),
            lore: variant.lore().to_string(),
            color: variant.rgb().to_hex(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub position: Vec3,
    pub color: Rgb,
    pub radius: i32,
    pub intensity: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Pose {
        position: Vec3,
        facing: Vec3,
    },
    Hold {
        item: Option<String>,
    },
    Toggle,
    Swing,
    Strike {
        target: Option<PlayerId>,
        damage: f64,
        target_health: f64,
    },
    Challenge {
        target: PlayerId,
    },
    Accept,
    Decline,
    Give {
        variant: WeaponVariant,
        target: Option<PlayerId>,
    },
    ListVariants,
    Died,
    Respawned,
    Disconnect,

    Connected {
        client_id: PlayerId,
    },
    Disconnected {
        reason: String,
    },
    Rejected {
        reason: DuelRejection,
    },
    StrikeResolved {
        kind: StrikeKind,
        damage: f64,
        duel_ended: bool,
    },
    Title {
        card: TitleCard,
        timing: TitleTiming,
    },
    Sound {
        at: Option<Vec3>,
        key: String,
        volume: f32,
        pitch: f32,
    },
    StopSound {
        key: String,
    },
    Particles {
        at: Vec3,
        key: String,
        count: u32,
        spread: Vec3,
        speed: f64,
    },
    Animation {
        player: PlayerId,
        key: String,
    },
    Velocity {
        velocity: Vec3,
    },
    Notice {
        notice: DuelNotice,
    },
    BladeFlag {
        active: bool,
    },
    ItemGranted {
        item_id: String,
        variant: WeaponVariant,
    },
    Light {
        owner: PlayerId,
        light: LightState,
    },
    LightRemoved {
        owner: PlayerId,
    },
    Variants {
        entries: Vec<VariantInfo>,
    },
}
