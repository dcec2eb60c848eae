use serde::{Deserialize, Serialize};

/// Smallest allowed side length of a field.
pub const MIN_SIDE: usize = 4;
/// Largest allowed side length of a field.
pub const MAX_SIDE: usize = 200;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pos {
    pub x: usize,
    pub y: usize,
}

impl Pos {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

impl GridSize {
    /// Builds a size with both sides clamped to `MIN_SIDE..=MAX_SIDE`.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.clamp(MIN_SIDE, MAX_SIDE),
            height: height.clamp(MIN_SIDE, MAX_SIDE),
        }
    }

    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x < self.width && pos.y < self.height
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
        }
    }
}

/// Player annotation on a cell.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    #[default]
    None,
    Flag,
    Question,
    /// A flag that turned out to sit on a safe cell once the game was lost.
    WrongGuess,
}

/// What a renderer should draw for a single cell.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "state")]
pub enum Tile {
    #[serde(rename = "hidden")]
    Hidden,
    #[serde(rename = "flagged")]
    Flagged,
    #[serde(rename = "questioned")]
    Questioned,
    #[serde(rename = "revealed")]
    Revealed { adjacent: u8 },
    #[serde(rename = "mine")]
    Mine,
    #[serde(rename = "detonated")]
    Detonated,
    #[serde(rename = "wrong_flag")]
    WrongFlag,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    InProgress,
    Won,
    Lost,
}

impl GameStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Expert,
    Custom,
}

impl Difficulty {
    /// Field size and mine probability of a named preset. `Custom` has none.
    pub fn preset(self) -> Option<(GridSize, f64)> {
        match self {
            Difficulty::Beginner => Some((GridSize::new(15, 15), 0.1)),
            Difficulty::Intermediate => Some((GridSize::new(30, 17), 0.15)),
            Difficulty::Expert => Some((GridSize::new(45, 17), 0.25)),
            Difficulty::Custom => None,
        }
    }
}

/// Options for a new game. Every field is optional; missing ones keep the
/// current value.
#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GameOptions {
    pub difficulty: Option<Difficulty>,
    pub grid_size: Option<GridSize>,
    pub mine_probability: Option<f64>,
    /// Explicit mine count, converted to an equivalent probability.
    pub mines: Option<usize>,
}

impl GameOptions {
    pub fn preset(difficulty: Difficulty) -> Self {
        Self {
            difficulty: Some(difficulty),
            ..Default::default()
        }
    }
}

/// A custom field as typed in by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomField {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
}

impl CustomField {
    /// Parses raw text input. Blank text counts as zero, anything else that
    /// is not a finite number falls back to a default.
    pub fn parse(width: &str, height: &str, mines: &str) -> Self {
        let width = parse_number(width)
            .map(|value| value.max(MIN_SIDE as f64).round() as usize)
            .unwrap_or(MIN_SIDE);
        let height = parse_number(height)
            .map(|value| value.max(MIN_SIDE as f64).round() as usize)
            .unwrap_or(MIN_SIDE);
        let size = GridSize::new(width, height);
        let cells = size.cells();

        let mines = parse_number(mines)
            .map(|value| value.clamp(1.0, (cells - 1) as f64).round() as usize)
            .unwrap_or_else(|| (cells as f64 * 0.1).round() as usize);

        Self {
            width: size.width,
            height: size.height,
            mines,
        }
    }

    pub fn probability(&self) -> f64 {
        self.mines as f64 / (self.width * self.height) as f64
    }

    pub fn to_options(self) -> GameOptions {
        GameOptions {
            difficulty: Some(Difficulty::Custom),
            grid_size: Some(GridSize::new(self.width, self.height)),
            mine_probability: None,
            mines: Some(self.mines),
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0.0);
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Formats a counter the way the three-digit displays show it: `007`,
/// `123`, `-05`.
pub fn format_counter(value: i64) -> String {
    if value >= 0 {
        format!("{value:03}")
    } else {
        format!("-{:02}", value.unsigned_abs())
    }
}

#[derive(Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_size_is_clamped() {
        assert_eq!(GridSize::new(1, 2), GridSize::new(4, 4));
        assert_eq!(GridSize::new(1000, 9).width, MAX_SIDE);
        assert_eq!(GridSize::new(12, 9).cells(), 108);
    }

    #[test]
    fn custom_field_falls_back_on_garbage() {
        let field = CustomField::parse("abc", "7.6", "lots");
        assert_eq!(field.width, 4);
        assert_eq!(field.height, 8);
        assert_eq!(field.mines, 3);
    }

    #[test]
    fn custom_field_clamps_mines() {
        assert_eq!(CustomField::parse("4", "4", "999").mines, 15);
        assert_eq!(CustomField::parse("4", "4", "0").mines, 1);
        assert_eq!(CustomField::parse("", "", "").mines, 1);
        assert_eq!(CustomField::parse("2", "3", "inf").width, 4);
    }

    #[test]
    fn custom_field_probability_matches_count() {
        let field = CustomField::parse("10", "10", "25");
        assert!((field.probability() - 0.25).abs() < f64::EPSILON);
        assert_eq!(field.to_options().mines, Some(25));
    }

    #[test]
    fn counters_are_padded() {
        assert_eq!(format_counter(0), "000");
        assert_eq!(format_counter(7), "007");
        assert_eq!(format_counter(999), "999");
        assert_eq!(format_counter(-3), "-03");
        assert_eq!(format_counter(-42), "-42");
    }

    #[test]
    fn tile_serializes_with_state_tag() {
        let json = serde_json::to_string(&Tile::Revealed { adjacent: 3 }).unwrap();
        assert_eq!(json, r#"{"state":"revealed","adjacent":3}"#);
    }

    #[test]
    fn options_default_missing_fields() {
        let options: GameOptions = serde_json::from_str(r#"{"difficulty":"expert"}"#).unwrap();
        assert_eq!(options, GameOptions::preset(Difficulty::Expert));
    }
}
