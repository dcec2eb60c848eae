use std::time::Duration;

use minefield_common::models::{CustomField, GameOptions, GridSize};
use tracing::debug;

pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(40);
pub const DEFAULT_MINE_PROBABILITY: f64 = 0.1;
/// Quiet period added to the step delay before a turn counts as settled.
pub const SETTLE_GRACE: Duration = Duration::from_millis(100);
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_ELAPSED_SECONDS: u16 = 999;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub grid_size: GridSize,
    pub mine_probability: f64,
    /// Delay between flood-fill steps. Zero fills synchronously.
    pub step_delay: Duration,
    pub question_marks: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grid_size: GridSize::default(),
            mine_probability: DEFAULT_MINE_PROBABILITY,
            step_delay: DEFAULT_STEP_DELAY,
            question_marks: true,
        }
    }
}

impl EngineSettings {
    pub fn with_options(mut self, options: &GameOptions) -> Self {
        self.apply(options);
        self
    }

    /// Resolves game options against the current settings: preset first,
    /// then explicit size, probability and finally an explicit mine count.
    pub fn apply(&mut self, options: &GameOptions) {
        self.grid_size = GridSize::new(self.grid_size.width, self.grid_size.height);

        if let Some((size, probability)) = options.difficulty.and_then(|d| d.preset()) {
            self.grid_size = size;
            self.mine_probability = probability;
        }

        if let Some(size) = options.grid_size {
            self.grid_size = GridSize::new(size.width, size.height);
        }

        if let Some(probability) = options.mine_probability
            && !probability.is_nan()
        {
            self.mine_probability = probability.clamp(0.0, 1.0);
        }

        if let Some(mines) = options.mines {
            let cells = self.grid_size.cells();
            let field = CustomField {
                width: self.grid_size.width,
                height: self.grid_size.height,
                mines: mines.clamp(1, cells - 1),
            };
            self.mine_probability = field.probability();
        }

        debug!(
            "Resolved settings: {}x{} with mine probability {}",
            self.grid_size.width, self.grid_size.height, self.mine_probability
        );
    }

    /// Quiet period after which a turn is considered drained.
    pub fn settle_delay(&self) -> Duration {
        SETTLE_GRACE + self.step_delay
    }
}
