use minefield_common::models::{GridSize, Mark, Pos};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevealState {
    #[default]
    Hidden,
    Revealed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    pub mine: bool,
    /// Mines among the neighbours. Not meaningful on a mined cell.
    pub adjacent: u8,
    pub state: RevealState,
    pub mark: Mark,
}

impl Cell {
    pub fn is_hidden(&self) -> bool {
        self.state == RevealState::Hidden
    }

    pub fn is_flagged(&self) -> bool {
        self.mark == Mark::Flag
    }
}

/// Row-major field of cells.
#[derive(Debug, Clone)]
pub struct Grid {
    size: GridSize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            cells: vec![Cell::default(); size.cells()],
        }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.size.contains(pos)
    }

    /// Flat index of an in-bounds position.
    pub fn index(&self, pos: Pos) -> Option<usize> {
        self.contains(pos).then(|| pos.x + pos.y * self.size.width)
    }

    pub fn get(&self, pos: Pos) -> Option<&Cell> {
        self.index(pos).and_then(|index| self.cells.get(index))
    }

    pub fn get_mut(&mut self, pos: Pos) -> Option<&mut Cell> {
        self.index(pos).and_then(|index| self.cells.get_mut(index))
    }

    pub fn positions(&self) -> impl Iterator<Item = Pos> + use<> {
        positions(self.size)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn mine_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.mine).count()
    }

    pub fn hidden_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_hidden()).count()
    }

    /// Flags placed on cells that are still hidden.
    pub fn flag_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.is_hidden() && cell.is_flagged())
            .count()
    }

    /// Returns every cell to `Hidden` without touching marks or mines.
    pub fn hide_all(&mut self) {
        for cell in &mut self.cells {
            cell.state = RevealState::Hidden;
        }
    }
}

pub fn positions(size: GridSize) -> impl Iterator<Item = Pos> {
    (0..size.height).flat_map(move |y| (0..size.width).map(move |x| Pos { x, y }))
}

/// The up to eight in-bounds neighbours of `pos`. No wraparound.
pub fn neighbours(size: GridSize, pos: Pos) -> impl Iterator<Item = Pos> {
    (-1i64..=1)
        .flat_map(|dy| (-1i64..=1).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx != 0 || dy != 0)
        .filter_map(move |(dx, dy)| {
            let x = pos.x as i64 + dx;
            let y = pos.y as i64 + dy;

            if x >= 0 && y >= 0 && (x as usize) < size.width && (y as usize) < size.height {
                Some(Pos {
                    x: x as usize,
                    y: y as usize,
                })
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours_are_clipped_at_edges() {
        let size = GridSize::new(4, 5);
        assert_eq!(neighbours(size, Pos::new(0, 0)).count(), 3);
        assert_eq!(neighbours(size, Pos::new(3, 4)).count(), 3);
        assert_eq!(neighbours(size, Pos::new(0, 2)).count(), 5);
        assert_eq!(neighbours(size, Pos::new(2, 2)).count(), 8);
        assert!(neighbours(size, Pos::new(2, 2)).all(|pos| pos != Pos::new(2, 2)));
    }

    #[test]
    fn out_of_bounds_lookups_are_rejected() {
        let mut grid = Grid::new(GridSize::new(4, 4));
        assert!(grid.get(Pos::new(4, 0)).is_none());
        assert!(grid.get_mut(Pos::new(0, 4)).is_none());
        assert!(grid.index(Pos::new(3, 3)).is_some());
    }

    #[test]
    fn positions_walk_rows() {
        let grid = Grid::new(GridSize::new(4, 4));
        let all: Vec<Pos> = grid.positions().collect();
        assert_eq!(all.len(), 16);
        assert_eq!(all[1], Pos::new(1, 0));
        assert_eq!(all[4], Pos::new(0, 1));
    }

    #[test]
    fn flag_count_ignores_revealed_cells() {
        let mut grid = Grid::new(GridSize::new(4, 4));
        if let Some(cell) = grid.get_mut(Pos::new(1, 1)) {
            cell.mark = Mark::Flag;
        }
        if let Some(cell) = grid.get_mut(Pos::new(2, 2)) {
            cell.mark = Mark::Flag;
            cell.state = RevealState::Revealed;
        }
        assert_eq!(grid.flag_count(), 1);
        assert_eq!(grid.hidden_count(), 15);
    }
}
