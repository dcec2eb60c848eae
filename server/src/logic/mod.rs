use std::{collections::HashMap, sync::Arc, time::Duration};

use dashmap::DashMap;
use rocket::futures::{SinkExt, stream::SplitSink};
use rocket_ws::{Message, stream::DuplexStream};
use tokio::{
    sync::{Mutex, broadcast::error::RecvError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use minefield_common::{
    models::GameOptions,
    protocol::{ClientMessage, ServerMessage},
};
use minefield_engine::{EngineSettings, GameRng, MinefieldEngine, Session};

pub type Games = Arc<DashMap<String, Arc<Mutex<Game>>>>;

/// A hosted game: one engine session plus the sockets watching it.
pub struct Game {
    session: Arc<Session>,
    streams: HashMap<Uuid, JoinHandle<()>>,
    created_at: Instant,
    last_activity: Instant,
}

type Sink = SplitSink<DuplexStream, Message>;

async fn send(sink: &mut Sink, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => sink.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Pushes the initial field and then every notification batch to one socket.
/// A subscriber that falls behind gets a fresh snapshot instead of the
/// batches it missed.
async fn forward(id: Uuid, session: Arc<Session>, mut sink: Sink) {
    let mut events = session.subscribe();

    if !send(&mut sink, &session.init_message().await).await {
        debug!("Stream {} closed before init", id);
        return;
    }

    loop {
        let message = match events.recv().await {
            Ok(events) => ServerMessage::Update { events },
            Err(RecvError::Lagged(skipped)) => {
                warn!("Stream {} lagged by {} batches, resending field", id, skipped);
                session.init_message().await
            }
            Err(RecvError::Closed) => break,
        };

        if !send(&mut sink, &message).await {
            debug!("Stream {} closed, stopping forwarder", id);
            break;
        }
    }
}

impl Game {
    #[instrument(level = "trace")]
    pub fn new(settings: EngineSettings, options: &GameOptions) -> Self {
        let settings = settings.with_options(options);
        let engine = MinefieldEngine::new(settings, GameRng::from_random());
        let now = Instant::now();

        Self {
            session: Arc::new(Session::spawn(engine)),
            streams: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[instrument(level = "trace", skip(self, sink))]
    pub fn add_stream(&mut self, sink: Sink) -> Uuid {
        let id = Uuid::new_v4();
        let forwarder = tokio::spawn(forward(id, Arc::clone(&self.session), sink));

        self.streams.insert(id, forwarder);
        self.last_activity = Instant::now();
        info!(
            "Stream {} added, total connections: {}",
            id,
            self.streams.len()
        );
        id
    }

    #[instrument(level = "trace", skip(self))]
    pub fn remove_stream(&mut self, id: &Uuid) {
        match self.streams.remove(id) {
            Some(forwarder) => {
                forwarder.abort();
                info!(
                    "Stream {} removed, remaining connections: {}",
                    id,
                    self.streams.len()
                );
            }
            None => warn!("Attempted to remove non-existent stream: {}", id),
        }
        self.last_activity = Instant::now();
    }

    pub async fn handle(&mut self, message: ClientMessage) {
        self.last_activity = Instant::now();
        self.session.apply(message).await;
    }

    pub fn has_active_connections(&self) -> bool {
        self.streams.values().any(|forwarder| !forwarder.is_finished())
    }

    /// Idle games go after `inactive_timeout`; games that still have players
    /// go once they are older than `active_timeout`.
    pub fn should_cleanup(&self, inactive_timeout: Duration, active_timeout: Duration) -> bool {
        if self.has_active_connections() {
            return self.created_at.elapsed() > active_timeout;
        }

        self.last_activity.elapsed() > inactive_timeout
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        for forwarder in self.streams.values() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use minefield_common::models::{Difficulty, GameStatus, GridSize, Pos};

    use super::*;

    const INACTIVE: Duration = Duration::from_secs(600);
    const ACTIVE: Duration = Duration::from_secs(86400);

    #[tokio::test(start_paused = true)]
    async fn idle_games_expire() {
        let game = Game::new(EngineSettings::default(), &GameOptions::default());
        assert!(!game.should_cleanup(INACTIVE, ACTIVE));

        tokio::time::advance(INACTIVE + Duration::from_secs(1)).await;
        assert!(game.should_cleanup(INACTIVE, ACTIVE));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_idle_clock() {
        let mut game = Game::new(EngineSettings::default(), &GameOptions::default());
        tokio::time::advance(Duration::from_secs(500)).await;

        game.handle(ClientMessage::Secondary {
            pos: Pos::new(0, 0),
            primary_held: false,
        })
        .await;
        tokio::time::advance(Duration::from_secs(500)).await;

        assert!(!game.should_cleanup(INACTIVE, ACTIVE));
    }

    #[tokio::test]
    async fn options_shape_the_engine() {
        let game = Game::new(
            EngineSettings::default(),
            &GameOptions::preset(Difficulty::Intermediate),
        );

        let size = game
            .session()
            .with_engine(|engine| engine.grid().size())
            .await;
        assert_eq!(size, GridSize::new(30, 17));
        assert_eq!(game.session().status().await, GameStatus::InProgress);
    }
}
