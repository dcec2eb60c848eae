use std::error::Error;

use minefield_server::{build, config::ServerConfig};
use tracing::info;

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    info!("🚀 Starting minefield server");

    let config = ServerConfig::from_env();
    let rocket = build(config)?;

    info!("📡 Endpoints: POST /create, GET /ws");
    let _ = rocket.launch().await?;
    Ok(())
}
