//! Periodic drivers
//!
//! Both drivers read the extension's clock on every firing. A late firing is
//! skipped rather than replayed in a burst.

use crate::extension::LightsaberExtension;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Runs [`LightsaberExtension::tick`] every `period`.
pub fn spawn_ticker(extension: Arc<LightsaberExtension>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let summary = extension.tick(extension.now());
            if summary.lights.faulted > 0 {
                debug!("{} light updates faulted this tick", summary.lights.faulted);
            }
        }
    })
}

/// Runs [`LightsaberExtension::sweep`] every `period`.
pub fn spawn_sweeper(extension: Arc<LightsaberExtension>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sweeper = interval(period);
        sweeper.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick fires immediately
        sweeper.tick().await;
        info!("Sweeper running every {:?}", period);

        loop {
            sweeper.tick().await;
            let summary = extension.sweep(extension.now());
            if summary.expired_requests + summary.reaped_players > 0 {
                debug!(
                    "Sweep: {} expired requests, {} departed players",
                    summary.expired_requests, summary.reaped_players
                );
            }
        }
    })
}
