//! Minesweeper game-state engine.
//!
//! [`MinefieldEngine`] owns one field and applies player input to it. Time is
//! virtual: deferred work such as flood-fill continuations, the end-of-turn
//! check and the game clock sits in an internal queue and runs when the
//! caller advances the engine. [`Session`] drives an engine from the tokio
//! clock and broadcasts its notifications.

pub mod engine;
pub mod grid;
pub mod placement;
pub mod rng;
pub mod schedule;
pub mod session;
pub mod settings;

pub use engine::MinefieldEngine;
pub use rng::GameRng;
pub use session::Session;
pub use settings::EngineSettings;
