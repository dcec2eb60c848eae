use serde::{Deserialize, Serialize};

use crate::models::{GameOptions, GameStatus, Pos, Tile};

/// Input events sent by a player.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    /// Primary activation: uncover a cell.
    #[serde(rename = "primary")]
    Primary { pos: Pos },
    /// Secondary activation: cycle the mark, or chord-clear when the primary
    /// button is held at the same time.
    #[serde(rename = "secondary")]
    Secondary {
        pos: Pos,
        #[serde(default)]
        primary_held: bool,
    },
    /// Auxiliary activation: chord-clear.
    #[serde(rename = "aux")]
    Aux { pos: Pos },
    #[serde(rename = "restart")]
    Restart {
        #[serde(default)]
        options: Option<GameOptions>,
    },
}

/// State changes published by the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event")]
pub enum Notification {
    #[serde(rename = "tile_revealed")]
    TileRevealed { pos: Pos, tile: Tile },
    #[serde(rename = "tile_marked")]
    TileMarked { pos: Pos, tile: Tile },
    #[serde(rename = "mine_count_changed")]
    MineCountChanged { count: i64 },
    #[serde(rename = "time_changed")]
    TimeChanged { seconds: u16 },
    #[serde(rename = "game_won")]
    GameWon,
    #[serde(rename = "game_lost")]
    GameLost { pos: Pos },
    #[serde(rename = "restarted")]
    Restarted { width: usize, height: usize },
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init {
        width: usize,
        height: usize,
        status: GameStatus,
        mines_left: i64,
        elapsed: u16,
        field: Vec<Vec<Tile>>,
    },
    #[serde(rename = "update")]
    Update { events: Vec<Notification> },
}
