use std::sync::Arc;

use dashmap::Entry;
use nanoid::nanoid;
use rocket::{State, futures::StreamExt, get, http::Status, post, serde::json::Json};
use rocket_ws::{Channel, Message, WebSocket, stream::DuplexStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use minefield_common::{
    models::{CreateResponse, GameOptions},
    protocol::ClientMessage,
};

use crate::{
    config::ServerConfig,
    logic::{Game, Games},
    rate_limit::{ClientIp, RateLimiter, check_rate_limit},
};

const MIN_ID_LENGTH: usize = 5;
const ID_ATTEMPTS_PER_LENGTH: usize = 10;

/// Stores `game` under a fresh short id. Ids grow by one character whenever
/// a whole round of draws collides.
#[instrument(level = "trace", skip(games, game))]
fn register_game(games: &Games, game: Game) -> String {
    let game = Arc::new(Mutex::new(game));
    let mut length = MIN_ID_LENGTH;

    loop {
        for candidate in (0..ID_ATTEMPTS_PER_LENGTH).map(|_| nanoid!(length)) {
            match games.entry(candidate) {
                Entry::Vacant(slot) => {
                    let id = slot.key().clone();
                    slot.insert(game);
                    return id;
                }
                Entry::Occupied(taken) => trace!("Game id {} already taken", taken.key()),
            }
        }

        warn!("Game ids of length {} exhausted, growing", length);
        length += 1;
    }
}

#[post("/create", data = "<options>")]
#[instrument(level = "trace", skip(games, rate_limiter, config), fields(client_ip = %client_ip.0))]
pub async fn create_game(
    options: Json<GameOptions>,
    games: &State<Games>,
    rate_limiter: &State<RateLimiter>,
    config: &State<ServerConfig>,
    client_ip: ClientIp,
) -> Result<Json<CreateResponse>, Status> {
    check_rate_limit(rate_limiter, &client_ip, config.games_per_minute)?;

    let id = register_game(games, Game::new(config.engine.clone(), &options));

    info!("Client {} created game {} with {:?}", client_ip.0, id, options.0);
    Ok(Json(CreateResponse { id }))
}

#[get("/ws?<id>")]
#[instrument(level = "trace", skip(ws, games), fields(game_id = %id))]
pub fn websocket_handler(
    ws: WebSocket,
    games: &State<Games>,
    id: String,
) -> Result<Channel<'static>, Status> {
    let Some(game) = games.get(&id).map(|entry| Arc::clone(entry.value())) else {
        warn!("Rejecting socket for unknown game {}", id);
        return Err(Status::NotFound);
    };

    Ok(ws.channel(move |stream| Box::pin(play(game, id, stream))))
}

/// Attaches one socket to a game and feeds its input into the session until
/// the socket goes away.
async fn play(
    game: Arc<Mutex<Game>>,
    game_id: String,
    stream: DuplexStream,
) -> rocket_ws::result::Result<()> {
    let (sink, mut frames) = stream.split();
    let stream_id = game.lock().await.add_stream(sink);
    info!("Stream {} joined game {}", stream_id, game_id);

    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                error!("Socket error on stream {}: {}", stream_id, e);
                break;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(input) => {
                debug!("Game {} input: {:?}", game_id, input);
                game.lock().await.handle(input).await;
            }
            Err(e) => warn!("Dropping malformed input on game {}: {}", game_id, e),
        }
    }

    game.lock().await.remove_stream(&stream_id);
    info!("Stream {} left game {}", stream_id, game_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use dashmap::DashMap;
    use minefield_engine::EngineSettings;

    use super::*;

    #[tokio::test]
    async fn registered_ids_are_unique() {
        let games: Games = Arc::new(DashMap::new());

        let ids: HashSet<String> = (0..50)
            .map(|_| {
                register_game(
                    &games,
                    Game::new(EngineSettings::default(), &GameOptions::default()),
                )
            })
            .collect();

        assert_eq!(ids.len(), 50);
        assert_eq!(games.len(), 50);
        assert!(ids.iter().all(|id| id.len() >= MIN_ID_LENGTH));
    }
}
