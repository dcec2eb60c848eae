use std::{env, str::FromStr, time::Duration};

use minefield_engine::EngineSettings;
use tracing::{debug, warn};

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub engine: EngineSettings,
    pub games_per_minute: u32,
    pub cleanup_interval: Duration,
    pub inactive_timeout: Duration,
    pub active_timeout: Duration,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            games_per_minute: 10,
            cleanup_interval: Duration::from_secs(60),
            inactive_timeout: Duration::from_secs(600),
            active_timeout: Duration::from_secs(86400),
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let engine = EngineSettings {
            step_delay: Duration::from_millis(env_or(
                "FILL_STEP_DELAY_MS",
                defaults.engine.step_delay.as_millis() as u64,
            )),
            question_marks: env_or("QUESTION_MARKS", defaults.engine.question_marks),
            ..defaults.engine
        };

        let allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|raw| split_origins(&raw))
            .unwrap_or(defaults.allowed_origins);

        let config = Self {
            engine,
            games_per_minute: env_or("RATE_LIMIT_GAMES_PER_MINUTE", defaults.games_per_minute),
            cleanup_interval: Duration::from_secs(env_or(
                "CLEANUP_INTERVAL_SECONDS",
                defaults.cleanup_interval.as_secs(),
            )),
            inactive_timeout: Duration::from_secs(env_or(
                "INACTIVE_GAME_TIMEOUT_SECONDS",
                defaults.inactive_timeout.as_secs(),
            )),
            active_timeout: Duration::from_secs(env_or(
                "ACTIVE_GAME_TIMEOUT_SECONDS",
                defaults.active_timeout.as_secs(),
            )),
            allowed_origins,
        };

        debug!("Loaded configuration: {:?}", config);
        config
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_setting(key, env::var(key).ok().as_deref(), default)
}

fn parse_setting<T: FromStr>(key: &str, raw: Option<&str>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("Ignoring unparsable value {:?} for {}", raw, key);
            default
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
