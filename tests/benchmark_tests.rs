//! Performance benchmarks for the per-tick and periodic paths

use server::config::ExtensionConfig;
use server::extension::LightsaberExtension;
use server::host::{ManualClock, PlayerPose};
use server::sandbox::SandboxHost;
use shared::{PlayerId, Vec3, WeaponVariant};
use std::sync::Arc;
use std::time::Instant;

fn crowd(players: u32) -> (Arc<SandboxHost>, Arc<ManualClock>, LightsaberExtension) {
    let host = Arc::new(SandboxHost::new());
    let clock = Arc::new(ManualClock::new(0));
    for id in 1..=players {
        host.join(
            PlayerId(id),
            PlayerPose::new(
                Vec3::new(id as f64, 64.0, -(id as f64)),
                Vec3::new(0.0, 0.0, 1.0),
            ),
        );
    }
    let ext = LightsaberExtension::new(ExtensionConfig::default(), clock.clone(), host.clone())
        .unwrap();
    (host, clock, ext)
}

/// Benchmarks one light tick over a full server of lit blades
#[test]
fn benchmark_light_tick() {
    let players = 500;
    let (_host, clock, ext) = crowd(players);
    for id in 1..=players {
        let player = PlayerId(id);
        ext.give_weapon(player, WeaponVariant::ALL[id as usize % 6]);
        ext.toggle(player);
    }
    assert_eq!(ext.lights().len(), players as usize);

    let iterations = 100;
    let start = Instant::now();

    for _ in 0..iterations {
        let summary = ext.tick(clock.advance(50));
        assert_eq!(summary.lights.updated, players as usize);
    }

    let duration = start.elapsed();
    println!(
        "Light tick: {} lights x {} ticks in {:?} ({:.2} μs/tick)",
        players,
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // A 50ms tick budget leaves plenty of headroom
    assert!(duration.as_millis() < 5_000);
}

/// Benchmarks a sweep over a large backlog of challenges
#[test]
fn benchmark_request_sweep() {
    let players = 10_000;
    let (_host, clock, ext) = crowd(players);

    for id in (1..players).step_by(2) {
        if id % 4 == 1 {
            clock.set(0);
        } else {
            clock.set(20_000);
        }
        ext.request_duel(PlayerId(id), PlayerId(id + 1)).unwrap();
    }
    let pending = ext.duels().pending_count();
    assert_eq!(pending, players as usize / 2);

    let start = Instant::now();
    let summary = ext.sweep(31_000);
    let duration = start.elapsed();

    println!(
        "Sweep: {} pending, {} expired in {:?}",
        pending, summary.expired_requests, duration
    );
    assert_eq!(summary.expired_requests, pending / 2);
    assert_eq!(ext.duels().pending_count(), pending / 2);
    assert!(duration.as_millis() < 2_000);
}

/// Benchmarks rapid toggling for a single player
#[test]
fn benchmark_toggle_throughput() {
    let (_host, _clock, ext) = crowd(1);
    ext.give_weapon(PlayerId(1), WeaponVariant::Red);

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        ext.toggle(PlayerId(1));
    }

    let duration = start.elapsed();
    println!(
        "Toggle: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(!ext.is_active(PlayerId(1)));
    assert!(duration.as_millis() < 5_000);
}
