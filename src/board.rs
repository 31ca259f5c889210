use std::{
    fmt::Display,
    ops::{Index, Not},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIN_GRID_SIZE: usize = 3;
// cells are addressed by a single file letter
pub const MAX_GRID_SIZE: usize = 26;

#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Player {
    #[default]
    X,
    O,
}

impl Not for Player {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Player::O => Player::X,
            Player::X => Player::O,
        }
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Player::O => write!(f, "O"),
            Player::X => write!(f, "X"),
        }
    }
}

/// Cell indices of one row, column or diagonal.
pub type Line = Vec<usize>;

pub fn index(row: usize, col: usize, grid_size: usize) -> usize {
    row * grid_size + col
}

/// All winning lines of a `grid_size`×`grid_size` board: rows, then columns,
/// then the two diagonals.
pub fn lines(grid_size: usize) -> Vec<Line> {
    let n = grid_size;
    let mut lines = Vec::with_capacity(2 * n + 2);
    for row in 0..n {
        lines.push((0..n).map(|col| index(row, col, n)).collect());
    }
    for col in 0..n {
        lines.push((0..n).map(|row| index(row, col, n)).collect());
    }
    lines.push((0..n).map(|i| index(i, i, n)).collect());
    lines.push((0..n).map(|i| index(i, n - 1 - i, n)).collect());
    lines
}

pub fn validate_grid_size(grid_size: usize) -> Result<()> {
    if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&grid_size) {
        return Err(Error::InvalidConfig(format!(
            "grid size must be between {MIN_GRID_SIZE} and {MAX_GRID_SIZE}, got {grid_size}"
        )));
    }
    Ok(())
}

// rank:
// 1: 0 1 2
// 2: 3 4 5
// 3: 6 7 8
//    a b c : file
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn to_index(self, grid_size: usize) -> Option<usize> {
        if self.row >= grid_size || self.col >= grid_size {
            return None;
        }
        Some(index(self.row, self.col, grid_size))
    }
}

impl FromStr for Coord {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let file = chars.next().ok_or(())?.to_ascii_lowercase();
        if !file.is_ascii_lowercase() {
            return Err(());
        }
        let rank = chars.as_str();
        if !rank.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(());
        }
        let rank: usize = rank.parse().map_err(|_| ())?;
        if rank == 0 {
            return Err(());
        }
        Ok(Coord {
            row: rank - 1,
            col: (file as u8 - b'a') as usize,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<Player>>", into = "Vec<Option<Player>>")]
pub struct Board {
    size: usize,
    tiles: Vec<Option<Player>>,
}

impl Board {
    pub fn new(grid_size: usize) -> Result<Self> {
        validate_grid_size(grid_size)?;
        Ok(Self {
            size: grid_size,
            tiles: vec![None; grid_size * grid_size],
        })
    }

    /// Builds a board from row-major cells; the cell count must be a perfect
    /// square of a supported grid size.
    pub fn from_tiles(tiles: Vec<Option<Player>>) -> Result<Self> {
        let size = (tiles.len() as f64).sqrt().round() as usize;
        if size * size != tiles.len() {
            return Err(Error::InvalidConfig(format!(
                "board of {} cells is not square",
                tiles.len()
            )));
        }
        validate_grid_size(size)?;
        Ok(Self { size, tiles })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn tiles(&self) -> &[Option<Player>] {
        &self.tiles
    }

    pub fn get(&self, idx: usize) -> Option<Option<Player>> {
        self.tiles.get(idx).copied()
    }

    pub fn is_empty_at(&self, idx: usize) -> bool {
        matches!(self.get(idx), Some(None))
    }

    /// Places `player` on an empty cell. Occupied cells are never overwritten.
    pub fn mark(&mut self, idx: usize, player: Player) -> Result<()> {
        match self.tiles.get_mut(idx) {
            None => Err(Error::InvalidCell(idx)),
            Some(Some(_)) => Err(Error::OutOfTurnOrOccupied),
            Some(tile @ None) => {
                *tile = Some(player);
                Ok(())
            }
        }
    }

    /// A scratch copy with `player` on `idx`, leaving `self` untouched.
    pub fn with_mark(&self, idx: usize, player: Player) -> Self {
        let mut probe = self.clone();
        probe.tiles[idx] = Some(player);
        probe
    }

    pub fn clear(&mut self) {
        self.tiles.fill(None);
    }

    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| tile.is_none())
            .map(|(idx, _)| idx)
    }

    pub fn mark_count(&self) -> usize {
        self.tiles.iter().flatten().count()
    }

    pub fn is_full(&self) -> bool {
        self.tiles.iter().all(Option::is_some)
    }

    /// The middle cell; only odd grids have one.
    pub fn center(&self) -> Option<usize> {
        (self.size % 2 == 1).then(|| (self.tiles.len() - 1) / 2)
    }

    pub fn corners(&self) -> [usize; 4] {
        let n = self.size;
        [0, n - 1, n * (n - 1), n * n - 1]
    }
}

impl Index<usize> for Board {
    type Output = Option<Player>;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.tiles[idx]
    }
}

impl TryFrom<Vec<Option<Player>>> for Board {
    type Error = Error;

    fn try_from(tiles: Vec<Option<Player>>) -> Result<Self> {
        Board::from_tiles(tiles)
    }
}

impl From<Board> for Vec<Option<Player>> {
    fn from(board: Board) -> Self {
        board.tiles
    }
}

impl Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self.size.to_string().len();
        for (i, rank) in self.tiles.chunks_exact(self.size).enumerate() {
            write!(f, "{:>width$}│ ", i + 1)?;
            for tile in rank {
                match tile {
                    Some(player) => write!(f, "{player}")?,
                    None => write!(f, "-")?,
                };
            }
            writeln!(f)?;
        }
        write!(f, "{:>width$}╰{}\n{:>width$}  ", "", "─".repeat(self.size + 2), "")?;
        for col in 0..self.size {
            write!(f, "{}", (b'a' + col as u8) as char)?;
        }
        Ok(())
    }
}
