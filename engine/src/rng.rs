use std::fmt;

use minefield_common::models::{GridSize, Pos};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded random source for one engine. The seed is kept so a game can be
/// reproduced.
pub struct GameRng {
    rng: StdRng,
    seed: u64,
}

impl GameRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn from_random() -> Self {
        let seed: u64 = rand::rng().random();
        Self::new(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.random()
    }

    pub fn pos(&mut self, size: GridSize) -> Pos {
        Pos {
            x: self.rng.random_range(0..size.width),
            y: self.rng.random_range(0..size.height),
        }
    }
}

impl fmt::Debug for GameRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameRng").field("seed", &self.seed).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_draws() {
        let mut a = GameRng::new(7);
        let mut b = GameRng::new(7);
        let size = GridSize::new(9, 9);
        for _ in 0..32 {
            assert_eq!(a.pos(size), b.pos(size));
            assert_eq!(a.unit().to_bits(), b.unit().to_bits());
        }
    }

    #[test]
    fn unit_stays_below_one() {
        let mut rng = GameRng::new(1);
        assert!((0..1000).map(|_| rng.unit()).all(|draw| (0.0..1.0).contains(&draw)));
    }
}
