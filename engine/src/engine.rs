use std::{collections::VecDeque, mem, time::Duration};

use minefield_common::{
    models::{GameOptions, GameStatus, GridSize, Mark, Pos, Tile},
    protocol::{ClientMessage, Notification, ServerMessage},
};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    grid::{Cell, Grid, RevealState, neighbours},
    placement::{find_mine_free_cell, place_mines, recompute_adjacency},
    rng::GameRng,
    schedule::{PendingAction, Scheduler},
    settings::{EngineSettings, MAX_ELAPSED_SECONDS, TICK_INTERVAL},
};

/// Game-state engine for a single minefield.
///
/// The engine is a plain state machine. Input events mutate the grid right
/// away; everything that happens later (flood-fill continuations, the
/// debounced end of turn, clock ticks) is queued on an internal virtual clock
/// and fires from [`advance_to`](Self::advance_to) or [`settle`](Self::settle).
/// State changes are buffered as [`Notification`]s and drained with
/// [`take_events`](Self::take_events).
#[derive(Debug)]
pub struct MinefieldEngine {
    settings: EngineSettings,
    grid: Grid,
    rng: GameRng,
    /// Bumped on every restart; deferred work from older games is dropped.
    generation: u64,
    status: GameStatus,
    first_move_made: bool,
    /// Cells known to have every neighbour revealed.
    visited: Vec<bool>,
    /// Cells with a fill continuation waiting in the scheduler.
    queued: Vec<bool>,
    detonated: Option<Pos>,
    elapsed: u16,
    timer_running: bool,
    settle_token: u64,
    displayed_mines: i64,
    scheduler: Scheduler,
    events: Vec<Notification>,
}

impl MinefieldEngine {
    /// Creates a game with randomly placed mines.
    #[instrument(level = "trace", skip(rng))]
    pub fn new(settings: EngineSettings, rng: GameRng) -> Self {
        let mut engine = Self::unplaced(settings, rng);
        engine.build_field(None);
        info!(
            "Created new game: {}x{} with {} mines (seed {})",
            engine.grid.size().width,
            engine.grid.size().height,
            engine.grid.mine_count(),
            engine.rng.seed()
        );
        engine
    }

    /// Creates a game with mines on exactly the given cells. Out-of-bounds
    /// positions are ignored.
    pub fn with_mines(settings: EngineSettings, mines: &[Pos], rng: GameRng) -> Self {
        let mut engine = Self::unplaced(settings, rng);
        engine.build_field(Some(mines));
        engine
    }

    fn unplaced(settings: EngineSettings, rng: GameRng) -> Self {
        Self {
            grid: Grid::new(settings.grid_size),
            settings,
            rng,
            generation: 1,
            status: GameStatus::InProgress,
            first_move_made: false,
            visited: Vec::new(),
            queued: Vec::new(),
            detonated: None,
            elapsed: 0,
            timer_running: false,
            settle_token: 0,
            displayed_mines: 0,
            scheduler: Scheduler::default(),
            events: Vec::new(),
        }
    }

    fn build_field(&mut self, layout: Option<&[Pos]>) {
        let requested = self.settings.grid_size;
        let size = GridSize::new(requested.width, requested.height);
        self.settings.grid_size = size;
        self.grid = Grid::new(size);

        match layout {
            Some(mines) => {
                for &pos in mines {
                    if let Some(cell) = self.grid.get_mut(pos) {
                        cell.mine = true;
                    }
                }
            }
            None => {
                place_mines(&mut self.grid, self.settings.mine_probability, &mut self.rng);
            }
        }

        recompute_adjacency(&mut self.grid);
        self.grid.hide_all();
        self.visited = vec![false; size.cells()];
        self.queued = vec![false; size.cells()];
        self.displayed_mines = self.count_mines_left();
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn first_move_made(&self) -> bool {
        self.first_move_made
    }

    pub fn elapsed_seconds(&self) -> u16 {
        self.elapsed
    }

    pub fn detonated(&self) -> Option<Pos> {
        self.detonated
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn cell(&self, pos: Pos) -> Option<&Cell> {
        self.grid.get(pos)
    }

    /// The value shown on the remaining-mines display. Negative when the
    /// player placed more flags than there are mines.
    pub fn mines_left(&self) -> i64 {
        self.displayed_mines
    }

    /// Current reading of the virtual clock.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// When the earliest queued action is due, on the virtual clock.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    /// Whether fill continuations or a turn settle are still queued.
    pub fn has_pending_turn(&self) -> bool {
        self.scheduler.has_turn_work()
    }

    pub fn take_events(&mut self) -> Vec<Notification> {
        mem::take(&mut self.events)
    }

    pub fn tile(&self, pos: Pos) -> Option<Tile> {
        let cell = self.grid.get(pos)?;
        let tile = match (cell.state, cell.mark) {
            (RevealState::Hidden, Mark::Flag) => Tile::Flagged,
            (RevealState::Hidden, Mark::Question) => Tile::Questioned,
            (RevealState::Hidden, _) => Tile::Hidden,
            (RevealState::Revealed, Mark::Flag) => Tile::Flagged,
            (RevealState::Revealed, Mark::WrongGuess) => Tile::WrongFlag,
            (RevealState::Revealed, _) if cell.mine && self.detonated == Some(pos) => {
                Tile::Detonated
            }
            (RevealState::Revealed, _) if cell.mine => Tile::Mine,
            (RevealState::Revealed, _) => Tile::Revealed {
                adjacent: cell.adjacent,
            },
        };
        Some(tile)
    }

    /// Tiles row by row, for rendering.
    pub fn snapshot(&self) -> Vec<Vec<Tile>> {
        let size = self.grid.size();
        (0..size.height)
            .map(|y| {
                (0..size.width)
                    .map(|x| self.tile(Pos { x, y }).unwrap_or(Tile::Hidden))
                    .collect()
            })
            .collect()
    }

    pub fn init_message(&self) -> ServerMessage {
        let size = self.grid.size();
        ServerMessage::Init {
            width: size.width,
            height: size.height,
            status: self.status,
            mines_left: self.displayed_mines,
            elapsed: self.elapsed,
            field: self.snapshot(),
        }
    }

    /// Applies a player input event.
    pub fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Primary { pos } => self.primary_activate(pos),
            ClientMessage::Secondary { pos, primary_held } => {
                self.secondary_activate(pos, primary_held)
            }
            ClientMessage::Aux { pos } => self.aux_activate(pos),
            ClientMessage::Restart { options } => self.restart(options.as_ref()),
        }
    }

    /// Uncovers a hidden, unflagged cell. The very first activation of a
    /// game never detonates: a mine under it is moved elsewhere.
    #[instrument(level = "trace", skip(self), fields(x = pos.x, y = pos.y))]
    pub fn primary_activate(&mut self, pos: Pos) {
        let Some(cell) = self.playable_cell(pos, "reveal") else {
            return;
        };

        if cell.is_flagged() {
            debug!("Ignoring reveal on flagged cell ({}, {})", pos.x, pos.y);
            return;
        }

        if !cell.is_hidden() {
            trace!("Cell ({}, {}) is already revealed", pos.x, pos.y);
            return;
        }

        let first_move = !self.first_move_made;
        self.first_move_made = true;

        if cell.mine {
            if first_move {
                self.relocate_first_mine(pos);
            } else {
                warn!("Player hit mine at ({}, {}) - game over!", pos.x, pos.y);
                self.game_over(pos);
            }
            return;
        }

        debug!(
            "Revealing cell ({}, {}) with {} adjacent mines",
            pos.x, pos.y, cell.adjacent
        );
        self.uncover(pos);
    }

    /// Cycles the mark, or chord-clears when the primary button is held too.
    pub fn secondary_activate(&mut self, pos: Pos, primary_held: bool) {
        if primary_held {
            self.quick_clear(pos);
        } else {
            self.cycle_mark(pos);
        }
    }

    pub fn aux_activate(&mut self, pos: Pos) {
        self.quick_clear(pos);
    }

    /// `None -> Flag -> Question -> None`, or `None -> Flag -> None` with
    /// question marks disabled. Revealed cells cannot be marked.
    #[instrument(level = "trace", skip(self), fields(x = pos.x, y = pos.y))]
    pub fn cycle_mark(&mut self, pos: Pos) {
        let Some(cell) = self.playable_cell(pos, "mark") else {
            return;
        };

        if !cell.is_hidden() {
            debug!("Ignoring mark on revealed cell ({}, {})", pos.x, pos.y);
            return;
        }

        let next = match (cell.mark, self.settings.question_marks) {
            (Mark::None, _) | (Mark::Question, false) => Mark::Flag,
            (Mark::Flag, true) => Mark::Question,
            _ => Mark::None,
        };

        if let Some(cell) = self.grid.get_mut(pos) {
            cell.mark = next;
        }
        debug!("Cell ({}, {}) marked {:?}", pos.x, pos.y, next);

        if let Some(tile) = self.tile(pos) {
            self.events.push(Notification::TileMarked { pos, tile });
        }
        self.publish_mine_count();
    }

    /// Chord-clear around a revealed cell: when the flags around it match
    /// the mines around it, every unflagged neighbour is uncovered. A wrong
    /// flag leaves a mine unflagged, which then detonates.
    #[instrument(level = "trace", skip(self), fields(x = pos.x, y = pos.y))]
    pub fn quick_clear(&mut self, pos: Pos) {
        let Some(cell) = self.playable_cell(pos, "quick clear") else {
            return;
        };

        if cell.is_hidden() {
            debug!("Ignoring quick clear on hidden cell ({}, {})", pos.x, pos.y);
            return;
        }

        let around: Vec<Pos> = neighbours(self.grid.size(), pos).collect();
        let mines = around
            .iter()
            .filter(|&&near| self.grid.get(near).is_some_and(|cell| cell.mine))
            .count();
        let flags = around
            .iter()
            .filter(|&&near| self.grid.get(near).is_some_and(|cell| cell.is_flagged()))
            .count();

        if mines != flags {
            debug!(
                "Quick clear at ({}, {}) skipped: {} mines, {} flags",
                pos.x, pos.y, mines, flags
            );
            return;
        }

        let mut detonated = None;
        for near in around {
            let Some(cell) = self.grid.get(near).copied() else {
                continue;
            };

            if cell.is_flagged() || !cell.is_hidden() {
                continue;
            }

            if cell.mine {
                detonated.get_or_insert(near);
                continue;
            }

            self.uncover(near);
        }

        if let Some(mine) = detonated {
            warn!(
                "Quick clear at ({}, {}) uncovered mine at ({}, {}) - game over!",
                pos.x, pos.y, mine.x, mine.y
            );
            self.game_over(mine);
        }
    }

    /// Throws the current field away and starts a new game, optionally with
    /// new settings. Deferred work of the old game becomes stale.
    #[instrument(level = "trace", skip(self))]
    pub fn restart(&mut self, options: Option<&GameOptions>) {
        self.stop_timer();
        self.generation += 1;
        self.settle_token += 1;

        if let Some(options) = options {
            self.settings.apply(options);
        }

        self.status = GameStatus::InProgress;
        self.first_move_made = false;
        self.detonated = None;
        self.elapsed = 0;
        self.build_field(None);

        let size = self.grid.size();
        info!(
            "Restarted game {}: {}x{} with {} mines",
            self.generation,
            size.width,
            size.height,
            self.grid.mine_count()
        );

        self.events.push(Notification::Restarted {
            width: size.width,
            height: size.height,
        });
        self.events.push(Notification::TimeChanged { seconds: 0 });
        self.events.push(Notification::MineCountChanged {
            count: self.displayed_mines,
        });
    }

    /// Runs every queued action due at or before `now` on the virtual clock.
    pub fn advance_to(&mut self, now: Duration) {
        while let Some(action) = self.scheduler.pop_due(now) {
            self.dispatch(action);
        }
        self.scheduler.advance_to(now);
    }

    pub fn advance(&mut self, by: Duration) {
        self.advance_to(self.scheduler.now() + by);
    }

    /// Runs queued work until the current turn has fully drained, including
    /// the end-of-turn check. Clock ticks due in between fire as well.
    pub fn settle(&mut self) {
        while self.scheduler.has_turn_work() {
            let Some(action) = self.scheduler.pop_next() else {
                break;
            };
            self.dispatch(action);
        }
    }

    fn dispatch(&mut self, action: PendingAction) {
        match action {
            PendingAction::FillStep { generation, pos } => {
                if generation != self.generation || self.status.is_finished() {
                    trace!(
                        "Dropping stale fill step at ({}, {}) from game {}",
                        pos.x, pos.y, generation
                    );
                    return;
                }
                self.reset_turn_settle();
                self.run_fill(pos, generation);
            }
            PendingAction::TurnSettle { generation, token } => {
                if generation == self.generation && token == self.settle_token {
                    self.end_of_turn();
                }
            }
            PendingAction::Tick { generation } => {
                if generation == self.generation {
                    self.tick();
                }
            }
        }
    }

    fn playable_cell(&self, pos: Pos, action: &str) -> Option<Cell> {
        let Some(cell) = self.grid.get(pos).copied() else {
            warn!("Invalid {} position: ({}, {})", action, pos.x, pos.y);
            return None;
        };

        if self.status.is_finished() {
            debug!(
                "Ignoring {} on finished game at ({}, {})",
                action, pos.x, pos.y
            );
            return None;
        }

        Some(cell)
    }

    fn relocate_first_mine(&mut self, pos: Pos) {
        if let Some(cell) = self.grid.get_mut(pos) {
            cell.mine = false;
        }

        match find_mine_free_cell(&self.grid, pos, &mut self.rng) {
            Some(target) => {
                info!(
                    "Moved first-click mine from ({}, {}) to ({}, {})",
                    pos.x, pos.y, target.x, target.y
                );
                if let Some(cell) = self.grid.get_mut(target) {
                    cell.mine = true;
                }
                recompute_adjacency(&mut self.grid);
                self.uncover(pos);
            }
            None => {
                info!("No mine-free cell left for the first-click mine, awarding the win");
                recompute_adjacency(&mut self.grid);
                self.win();
            }
        }
    }

    fn uncover(&mut self, pos: Pos) {
        self.start_timer();
        self.reset_turn_settle();
        self.run_fill(pos, self.generation);
    }

    /// Works through the fill from `start`. With no step delay the whole
    /// region is handled here; otherwise each frontier cell becomes a
    /// scheduled continuation.
    fn run_fill(&mut self, start: Pos, generation: u64) {
        let mut worklist = VecDeque::from([start]);

        while let Some(pos) = worklist.pop_front() {
            for next in self.fill_step(pos, generation) {
                if self.settings.step_delay.is_zero() {
                    worklist.push_back(next);
                } else {
                    self.scheduler.schedule(
                        self.settings.step_delay,
                        PendingAction::FillStep {
                            generation,
                            pos: next,
                        },
                    );
                }
            }
        }
    }

    /// Reveals `pos` and, for a zero cell, its neighbours. Returns the zero
    /// neighbours that still border hidden cells.
    fn fill_step(&mut self, pos: Pos, generation: u64) -> Vec<Pos> {
        if generation != self.generation || self.status.is_finished() {
            return Vec::new();
        }

        let Some(index) = self.grid.index(pos) else {
            return Vec::new();
        };
        self.queued[index] = false;

        if self.visited[index] {
            return Vec::new();
        }

        self.reveal_cell(pos);

        let is_zero = self
            .grid
            .get(pos)
            .is_some_and(|cell| !cell.mine && cell.adjacent == 0);
        if !is_zero {
            return Vec::new();
        }

        let around: Vec<Pos> = neighbours(self.grid.size(), pos).collect();
        for &near in &around {
            self.reveal_cell(near);
        }
        self.visited[index] = true;

        let mut frontier = Vec::new();
        for near in around {
            let Some(near_index) = self.grid.index(near) else {
                continue;
            };

            let near_zero = self
                .grid
                .get(near)
                .is_some_and(|cell| !cell.mine && cell.adjacent == 0);
            if !near_zero || self.visited[near_index] || self.queued[near_index] {
                continue;
            }

            if self.is_fully_enclosed(near) {
                continue;
            }

            self.queued[near_index] = true;
            frontier.push(near);
        }

        frontier
    }

    /// Whether every neighbour of `pos` is revealed. A positive answer is
    /// remembered for the rest of the game.
    fn is_fully_enclosed(&mut self, pos: Pos) -> bool {
        let enclosed = neighbours(self.grid.size(), pos)
            .all(|near| self.grid.get(near).is_some_and(|cell| !cell.is_hidden()));

        if enclosed && let Some(index) = self.grid.index(pos) {
            self.visited[index] = true;
        }
        enclosed
    }

    fn reveal_cell(&mut self, pos: Pos) {
        let Some(cell) = self.grid.get_mut(pos) else {
            return;
        };

        if !cell.is_hidden() {
            return;
        }

        cell.state = RevealState::Revealed;
        cell.mark = Mark::None;

        if let Some(tile) = self.tile(pos) {
            self.events.push(Notification::TileRevealed { pos, tile });
        }
    }

    /// Reveals whatever is still hidden once the game is decided. Flags on
    /// mines stay, flags on safe cells become wrong guesses after a loss and
    /// question marks are dropped.
    fn reveal_everything(&mut self) {
        let lost = self.status == GameStatus::Lost;

        for pos in self.grid.positions() {
            let Some(cell) = self.grid.get_mut(pos) else {
                continue;
            };

            if !cell.is_hidden() {
                continue;
            }

            cell.state = RevealState::Revealed;
            cell.mark = match cell.mark {
                Mark::Flag if cell.mine => Mark::Flag,
                Mark::Flag if lost => Mark::WrongGuess,
                _ => Mark::None,
            };

            if let Some(tile) = self.tile(pos) {
                self.events.push(Notification::TileRevealed { pos, tile });
            }
        }
    }

    fn end_of_turn(&mut self) {
        if self.status.is_finished() {
            return;
        }

        self.publish_mine_count();

        if self.grid.hidden_count() == self.grid.mine_count() {
            self.win();
        }
    }

    fn game_over(&mut self, pos: Pos) {
        if self.status.is_finished() {
            return;
        }

        self.stop_timer();
        self.status = GameStatus::Lost;
        self.detonated = Some(pos);
        self.reveal_everything();

        info!("Game lost at ({}, {}) after {}s", pos.x, pos.y, self.elapsed);
        self.events.push(Notification::GameLost { pos });
    }

    fn win(&mut self) {
        if self.status.is_finished() {
            return;
        }

        self.stop_timer();
        self.status = GameStatus::Won;
        self.reveal_everything();
        self.display_mines(0);

        info!("Game won in {}s", self.elapsed);
        self.events.push(Notification::GameWon);
    }

    fn count_mines_left(&self) -> i64 {
        self.grid.mine_count() as i64 - self.grid.flag_count() as i64
    }

    fn publish_mine_count(&mut self) {
        self.display_mines(self.count_mines_left());
    }

    fn display_mines(&mut self, count: i64) {
        if count != self.displayed_mines {
            self.displayed_mines = count;
            self.events.push(Notification::MineCountChanged { count });
        }
    }

    fn reset_turn_settle(&mut self) {
        self.settle_token += 1;
        self.scheduler.schedule(
            self.settings.settle_delay(),
            PendingAction::TurnSettle {
                generation: self.generation,
                token: self.settle_token,
            },
        );
    }

    fn start_timer(&mut self) {
        if self.timer_running || self.status.is_finished() {
            return;
        }

        if self.elapsed >= MAX_ELAPSED_SECONDS {
            return;
        }

        self.timer_running = true;
        self.scheduler.schedule(
            TICK_INTERVAL,
            PendingAction::Tick {
                generation: self.generation,
            },
        );
    }

    fn stop_timer(&mut self) {
        self.timer_running = false;
    }

    fn tick(&mut self) {
        if !self.timer_running || self.status.is_finished() {
            return;
        }

        self.elapsed = (self.elapsed + 1).min(MAX_ELAPSED_SECONDS);
        self.events.push(Notification::TimeChanged {
            seconds: self.elapsed,
        });

        if self.elapsed >= MAX_ELAPSED_SECONDS {
            debug!("Game clock reached {}s and stopped", MAX_ELAPSED_SECONDS);
            self.timer_running = false;
        } else {
            self.scheduler.schedule(
                TICK_INTERVAL,
                PendingAction::Tick {
                    generation: self.generation,
                },
            );
        }
    }
}
