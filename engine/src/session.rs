use std::sync::Arc;

use minefield_common::{
    models::{GameOptions, GameStatus, Pos},
    protocol::{ClientMessage, Notification, ServerMessage},
};
use tokio::{
    sync::{Mutex, Notify, broadcast},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, trace};

use crate::engine::MinefieldEngine;

const EVENT_CAPACITY: usize = 256;

/// Runs a [`MinefieldEngine`] against the tokio clock.
///
/// A background driver task fires scheduled engine work when it comes due,
/// and every batch of notifications is broadcast to subscribers.
pub struct Session {
    engine: Arc<Mutex<MinefieldEngine>>,
    events: broadcast::Sender<Vec<Notification>>,
    wake: Arc<Notify>,
    epoch: Instant,
    driver: JoinHandle<()>,
}

impl Session {
    /// Must be called from within a tokio runtime.
    pub fn spawn(engine: MinefieldEngine) -> Self {
        let epoch = Instant::now()
            .checked_sub(engine.now())
            .unwrap_or_else(Instant::now);
        let engine = Arc::new(Mutex::new(engine));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let wake = Arc::new(Notify::new());

        let driver = tokio::spawn(drive(
            Arc::clone(&engine),
            events.clone(),
            Arc::clone(&wake),
            epoch,
        ));

        Self {
            engine,
            events,
            wake,
            epoch,
            driver,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Notification>> {
        self.events.subscribe()
    }

    /// Runs `f` on the engine after catching it up with the clock, then
    /// publishes whatever it emitted.
    pub async fn with_engine<R>(&self, f: impl FnOnce(&mut MinefieldEngine) -> R) -> R {
        let mut engine = self.engine.lock().await;
        engine.advance_to(self.epoch.elapsed());
        let result = f(&mut *engine);
        publish(&self.events, &mut *engine);
        drop(engine);

        self.wake.notify_one();
        result
    }

    pub async fn apply(&self, message: ClientMessage) {
        self.with_engine(|engine| engine.handle(message)).await
    }

    pub async fn primary_activate(&self, pos: Pos) {
        self.with_engine(|engine| engine.primary_activate(pos)).await
    }

    pub async fn secondary_activate(&self, pos: Pos, primary_held: bool) {
        self.with_engine(|engine| engine.secondary_activate(pos, primary_held))
            .await
    }

    pub async fn aux_activate(&self, pos: Pos) {
        self.with_engine(|engine| engine.aux_activate(pos)).await
    }

    pub async fn restart(&self, options: Option<GameOptions>) {
        self.with_engine(|engine| engine.restart(options.as_ref()))
            .await
    }

    pub async fn init_message(&self) -> ServerMessage {
        self.with_engine(|engine| engine.init_message()).await
    }

    pub async fn status(&self) -> GameStatus {
        self.with_engine(|engine| engine.status()).await
    }

    pub async fn elapsed_seconds(&self) -> u16 {
        self.with_engine(|engine| engine.elapsed_seconds()).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn publish(events: &broadcast::Sender<Vec<Notification>>, engine: &mut MinefieldEngine) {
    let batch = engine.take_events();
    if batch.is_empty() {
        return;
    }

    if events.send(batch).is_err() {
        trace!("No subscribers for engine events");
    }
}

async fn drive(
    engine: Arc<Mutex<MinefieldEngine>>,
    events: broadcast::Sender<Vec<Notification>>,
    wake: Arc<Notify>,
    epoch: Instant,
) {
    debug!("Session driver started");

    loop {
        let deadline = {
            let mut engine = engine.lock().await;
            engine.advance_to(epoch.elapsed());
            publish(&events, &mut *engine);
            engine.next_deadline()
        };

        match deadline {
            Some(due) => {
                tokio::select! {
                    _ = sleep_until(epoch + due) => {}
                    _ = wake.notified() => {}
                }
            }
            None => wake.notified().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use minefield_common::models::GridSize;

    use super::*;
    use crate::{rng::GameRng, settings::EngineSettings};

    fn session(width: usize, height: usize, mines: &[Pos], step_delay: Duration) -> Session {
        let settings = EngineSettings {
            grid_size: GridSize::new(width, height),
            mine_probability: 0.0,
            step_delay,
            question_marks: true,
        };
        Session::spawn(MinefieldEngine::with_mines(settings, mines, GameRng::new(9)))
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_fill_drains_to_a_win() {
        let session = session(10, 10, &[], Duration::from_millis(40));
        let mut events = session.subscribe();

        session.primary_activate(Pos::new(4, 4)).await;

        let mut revealed = 0;
        loop {
            let batch = events.recv().await.unwrap();
            revealed += batch
                .iter()
                .filter(|event| matches!(event, Notification::TileRevealed { .. }))
                .count();
            if batch.contains(&Notification::GameWon) {
                break;
            }
        }

        assert_eq!(revealed, 100);
        assert_eq!(session.status().await, GameStatus::Won);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_discards_in_flight_fill() {
        let session = session(10, 10, &[], Duration::from_millis(40));
        session.primary_activate(Pos::new(0, 0)).await;
        session.restart(None).await;

        tokio::time::sleep(Duration::from_secs(2)).await;

        let hidden = session
            .with_engine(|engine| engine.grid().hidden_count())
            .await;
        assert_eq!(hidden, 100);
        assert_eq!(session.status().await, GameStatus::InProgress);
        assert_eq!(session.elapsed_seconds().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_ticks_while_playing() {
        let session = session(4, 4, &[Pos::new(0, 0)], Duration::ZERO);
        let mut events = session.subscribe();
        session.primary_activate(Pos::new(1, 1)).await;

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(session.elapsed_seconds().await, 3);

        let mut ticks = Vec::new();
        while let Ok(batch) = events.try_recv() {
            for event in batch {
                if let Notification::TimeChanged { seconds } = event {
                    ticks.push(seconds);
                }
            }
        }
        assert_eq!(ticks, vec![1, 2, 3]);
    }
}
