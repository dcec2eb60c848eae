//! HTTP and WebSocket front end for the minefield engine.
//!
//! `POST /create` starts a game and returns its id; `GET /ws?id=` attaches a
//! socket that receives the field and every notification batch, and sends
//! player input back.

pub mod cleanup;
pub mod config;
pub mod cors;
pub mod logic;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;

use dashmap::DashMap;
use rocket::{Build, Rocket, routes};
use tracing::info;

use crate::{
    cleanup::CleanupFairing,
    config::ServerConfig,
    cors::create_cors,
    logic::Games,
    rate_limit::create_rate_limiter,
    routes::{create_game, websocket_handler},
};

pub fn build(config: ServerConfig) -> Result<Rocket<Build>, rocket_cors::Error> {
    let games: Games = Arc::new(DashMap::new());
    let cors = create_cors(&config.allowed_origins)?;

    info!("📊 Initialized game storage and rate limiter");

    Ok(rocket::build()
        .attach(cors)
        .attach(CleanupFairing)
        .manage(games)
        .manage(create_rate_limiter())
        .manage(config)
        .mount("/", routes![create_game, websocket_handler]))
}
