use minefield_common::models::Pos;
use tracing::debug;

use crate::grid::{Grid, neighbours};
use crate::rng::GameRng;

/// Random draws allowed per cell when looking for a relocation target.
pub const RELOCATION_SEARCH_FACTOR: usize = 10;

/// Independently mines every cell with the given probability. The realised
/// mine count varies from game to game.
pub fn place_mines(grid: &mut Grid, probability: f64, rng: &mut GameRng) -> usize {
    for pos in grid.positions() {
        let mine = rng.unit() <= probability;
        if let Some(cell) = grid.get_mut(pos) {
            cell.mine = mine;
        }
    }

    let placed = grid.mine_count();
    debug!(
        "Placed {} mines on {}x{} with probability {}",
        placed,
        grid.size().width,
        grid.size().height,
        probability
    );
    placed
}

/// Recounts the mined neighbours of every safe cell. Mined cells keep 0.
pub fn recompute_adjacency(grid: &mut Grid) {
    let size = grid.size();

    for pos in grid.positions() {
        let count = match grid.get(pos) {
            Some(cell) if !cell.mine => neighbours(size, pos)
                .filter(|&near| grid.get(near).is_some_and(|cell| cell.mine))
                .count() as u8,
            _ => 0,
        };

        if let Some(cell) = grid.get_mut(pos) {
            cell.adjacent = count;
        }
    }
}

/// Draws random cells until one without a mine (other than `exclude`) turns
/// up, giving up after `RELOCATION_SEARCH_FACTOR` draws per cell.
pub fn find_mine_free_cell(grid: &Grid, exclude: Pos, rng: &mut GameRng) -> Option<Pos> {
    let budget = grid.size().cells() * RELOCATION_SEARCH_FACTOR;

    (0..budget).find_map(|_| {
        let pos = rng.pos(grid.size());
        let free = pos != exclude && grid.get(pos).is_some_and(|cell| !cell.mine);
        free.then_some(pos)
    })
}

#[cfg(test)]
mod tests {
    use minefield_common::models::GridSize;

    use super::*;

    fn brute_force_count(grid: &Grid, pos: Pos) -> u8 {
        let mut count = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let x = pos.x as i64 + dx;
                let y = pos.y as i64 + dy;
                if x < 0 || y < 0 {
                    continue;
                }
                if grid
                    .get(Pos::new(x as usize, y as usize))
                    .is_some_and(|cell| cell.mine)
                {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn probability_bounds() {
        let mut rng = GameRng::new(3);
        let mut grid = Grid::new(GridSize::new(8, 6));
        assert_eq!(place_mines(&mut grid, 1.0, &mut rng), 48);
        assert_eq!(place_mines(&mut grid, -1.0, &mut rng), 0);
    }

    #[test]
    fn adjacency_matches_neighbourhood() {
        for seed in 0..20 {
            let mut rng = GameRng::new(seed);
            let mut grid = Grid::new(GridSize::new(11, 7));
            place_mines(&mut grid, 0.2, &mut rng);
            recompute_adjacency(&mut grid);

            for pos in grid.positions() {
                let Some(cell) = grid.get(pos) else {
                    continue;
                };
                if !cell.mine {
                    assert_eq!(cell.adjacent, brute_force_count(&grid, pos), "at {pos:?}");
                }
            }
        }
    }

    #[test]
    fn relocation_skips_mines_and_origin() {
        let mut rng = GameRng::new(11);
        let mut grid = Grid::new(GridSize::new(4, 4));
        for pos in grid.positions() {
            if let Some(cell) = grid.get_mut(pos) {
                cell.mine = pos != Pos::new(2, 1) && pos != Pos::new(0, 0);
            }
        }

        for _ in 0..10 {
            assert_eq!(
                find_mine_free_cell(&grid, Pos::new(0, 0), &mut rng),
                Some(Pos::new(2, 1))
            );
        }
    }

    #[test]
    fn relocation_gives_up_on_saturated_field() {
        let mut rng = GameRng::new(5);
        let mut grid = Grid::new(GridSize::new(4, 4));
        place_mines(&mut grid, 1.0, &mut rng);
        if let Some(cell) = grid.get_mut(Pos::new(1, 1)) {
            cell.mine = false;
        }
        assert_eq!(find_mine_free_cell(&grid, Pos::new(1, 1), &mut rng), None);
    }
}
