//! Move selection for the computer opponent.

use std::{fmt::Display, str::FromStr};

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::board::{lines, Board, Player};
use crate::rules::evaluate;

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Easy,
    Hard,
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "EASY"),
            Difficulty::Hard => write!(f, "HARD"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" | "EASY" | "Easy" => Ok(Difficulty::Easy),
            "hard" | "HARD" | "Hard" => Ok(Difficulty::Hard),
            _ => Err(()),
        }
    }
}

/// Picks the next cell for `player`, or `None` when the board is full.
///
/// Both tiers take an immediate win, then block an immediate loss. Hard then
/// tries to fork, takes the center, then a random free corner. Whatever is
/// left is a uniformly random empty cell. The board is only ever probed
/// through scratch copies.
pub fn choose_move<R: Rng + ?Sized>(
    board: &Board,
    player: Player,
    difficulty: Difficulty,
    rng: &mut R,
) -> Option<usize> {
    let available: Vec<usize> = board.empty_cells().collect();
    if available.is_empty() {
        return None;
    }

    if let Some(idx) = winning_cell(board, player, &available) {
        debug!(cell = idx, %player, "taking winning cell");
        return Some(idx);
    }

    if let Some(idx) = winning_cell(board, !player, &available) {
        debug!(cell = idx, %player, "blocking opponent");
        return Some(idx);
    }

    if difficulty == Difficulty::Hard {
        if let Some(idx) = forking_cell(board, player, &available) {
            debug!(cell = idx, %player, "creating fork");
            return Some(idx);
        }

        // no check for the human's forks, so hard stays beatable

        if let Some(center) = board.center().filter(|&idx| board.is_empty_at(idx)) {
            return Some(center);
        }

        let corners: Vec<usize> = board
            .corners()
            .into_iter()
            .filter(|&idx| board.is_empty_at(idx))
            .collect();
        if let Some(&corner) = corners.choose(rng) {
            return Some(corner);
        }
    }

    available.choose(rng).copied()
}

fn winning_cell(board: &Board, player: Player, available: &[usize]) -> Option<usize> {
    available
        .iter()
        .copied()
        .find(|&idx| evaluate(&board.with_mark(idx, player)).winner() == Some(player))
}

fn forking_cell(board: &Board, player: Player, available: &[usize]) -> Option<usize> {
    let lines = lines(board.size());
    available.iter().copied().find(|&idx| {
        let probe = board.with_mark(idx, player);
        let threats = lines
            .iter()
            .filter(|line| is_threat(&probe, line, player))
            .count();
        threats >= 2
    })
}

/// One move from completion: every cell but one is `player`'s and the last
/// is empty.
fn is_threat(board: &Board, line: &[usize], player: Player) -> bool {
    let mut own = 0;
    let mut empty = 0;
    for &idx in line {
        match board[idx] {
            Some(p) if p == player => own += 1,
            Some(_) => return false,
            None => empty += 1,
        }
    }
    own == line.len() - 1 && empty == 1
}
