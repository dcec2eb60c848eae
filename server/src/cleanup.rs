use std::time::Duration;

use rocket::{
    Build, Rocket,
    fairing::{self, Fairing, Info, Kind},
};
use tokio::time;
use tracing::{debug, info, warn};

use crate::{config::ServerConfig, logic::Games};

/// Starts the periodic sweep of stale games once Rocket ignites.
pub struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Cleanup Task",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        match (rocket.state::<Games>(), rocket.state::<ServerConfig>()) {
            (Some(games), Some(config)) => {
                info!("Starting cleanup task for game management");
                tokio::spawn(start_cleanup_task(
                    games.clone(),
                    config.cleanup_interval,
                    config.inactive_timeout,
                    config.active_timeout,
                ));
            }
            _ => warn!("Failed to get games state for cleanup task"),
        }
        Ok(rocket)
    }
}

pub async fn start_cleanup_task(
    games: Games,
    cleanup_interval: Duration,
    inactive_timeout: Duration,
    active_timeout: Duration,
) {
    let mut interval = time::interval(cleanup_interval.max(Duration::from_secs(1)));

    info!(
        "Started game cleanup task: checking every {}s, inactive timeout: {}s, active timeout: {}s",
        cleanup_interval.as_secs(),
        inactive_timeout.as_secs(),
        active_timeout.as_secs()
    );

    loop {
        interval.tick().await;
        cleanup_games(&games, inactive_timeout, active_timeout);
    }
}

pub fn cleanup_games(games: &Games, inactive_timeout: Duration, active_timeout: Duration) -> usize {
    let stale: Vec<String> = games
        .iter()
        .filter(|entry| {
            // Games busy handling input are skipped until the next sweep.
            entry
                .value()
                .try_lock()
                .is_ok_and(|game| game.should_cleanup(inactive_timeout, active_timeout))
        })
        .map(|entry| entry.key().clone())
        .collect();

    for id in &stale {
        games.remove(id);
        debug!("Cleaned up game: {}", id);
    }

    if !stale.is_empty() {
        info!("Cleaned up {} inactive games", stale.len());
    }
    stale.len()
}
