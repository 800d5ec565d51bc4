//! # Lightsaber Server Library
//!
//! This library implements a server-side lightsaber extension for a multiplayer
//! game, plus a small UDP host that exposes it to networked clients. Players can
//! ignite and extinguish a blade, see a light that follows it, and challenge each
//! other to formal duels with a countdown and a declared winner.
//!
//! ## Core Responsibilities
//!
//! ### Weapon Activation
//! Each player's blade is either lit or off. The activation tracker is the single
//! source of truth for that state and keeps per-player swing and hit counters for
//! the session. Every transition also updates the blade flag stored on the held
//! item and starts or stops the blade's light.
//!
//! ### Blade Lighting
//! Every lit blade owns one light in the world. On each tick the light is moved
//! to the tip of the blade, the red blade flickers, and all lights pulse very
//! slightly. A player who has gone missing is skipped until the normal cleanup
//! path removes their light.
//!
//! ### Duels
//! Duels are negotiated with a challenge that the target may accept or decline
//! within 30 seconds. An accepted duel counts down from three before the fight
//! begins. It ends when one participant falls, dies or leaves. A player is in at
//! most one duel and holds at most one incoming challenge at any time.
//!
//! ## Architecture Design
//!
//! ### Explicit Wiring
//! Components receive the collaborators they need at construction time and are
//! assembled once by [`extension::LightsaberExtension`]. The game world is reached
//! only through the traits in [`host`], so the whole core runs unchanged against
//! the in-memory [`sandbox::SandboxHost`] or the UDP [`network::NetworkHost`].
//!
//! ### Concurrency
//! Player events arrive from many sources and two periodic drivers run alongside
//! them. Per-player maps use atomic per-key updates, and both duel collections
//! share one lock, so a duel is never visible under one participant and missing
//! under the other. No operation blocks or awaits.
//!
//! ### Time
//! Core components take the current time as an argument. Only the composition
//! root reads a [`host::Clock`], which makes expiry and countdown behaviour fully
//! reproducible in tests with [`host::ManualClock`].
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Fixed table mapping item ids to blade variants and variants to light
//! parameters and sound keys.
//!
//! ### Activation Module (`activation`)
//! Per-player weapon state and the toggle state machine.
//!
//! ### Lighting Module (`lighting`)
//! Creation, per-tick update and destruction of blade lights.
//!
//! ### Duel Module (`duel`)
//! Challenge, accept, decline, expiry, countdown and duel endings.
//!
//! ### Combat Module (`combat`)
//! Swing, hit and clash presentation and the damage outcome of a strike.
//!
//! ### Scheduler Module (`scheduler`)
//! The tick and sweep drivers as tokio tasks.
//!
//! ### Network Module (`network`)
//! UDP socket handling, packet dispatch and client tracking through the
//! `client_manager` module.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ExtensionConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind to a local port with room for 32 players and stock tunables
//!     let mut server = Server::new("127.0.0.1:8080", 32, ExtensionConfig::default()).await?;
//!
//!     // Runs until a shutdown message arrives:
//!     // - Dispatches client packets into the extension
//!     // - Ticks lights and duel countdowns
//!     // - Sweeps expired challenges in the background
//!     // - Drops clients that stop sending packets
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Embedding without a network works the same way against any host that
//! implements the collaborator traits:
//!
//! ```rust
//! use server::config::ExtensionConfig;
//! use server::extension::LightsaberExtension;
//! use server::host::{ManualClock, PlayerPose};
//! use server::sandbox::SandboxHost;
//! use shared::{PlayerId, Vec3, WeaponVariant};
//! use std::sync::Arc;
//!
//! let host = Arc::new(SandboxHost::new());
//! host.join(PlayerId(1), PlayerPose::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)));
//!
//! let ext = LightsaberExtension::new(
//!     ExtensionConfig::default(),
//!     Arc::new(ManualClock::new(0)),
//!     host.clone(),
//! )
//! .unwrap();
//!
//! ext.give_weapon(PlayerId(1), WeaponVariant::Green);
//! ext.toggle(PlayerId(1));
//! assert!(ext.is_active(PlayerId(1)));
//! ```

pub mod activation;
pub mod client_manager;
pub mod combat;
pub mod config;
pub mod duel;
pub mod extension;
pub mod host;
pub mod lighting;
pub mod network;
pub mod registry;
pub mod sandbox;
pub mod scheduler;
