//! Win detection for boards of any supported size.

use serde::{Deserialize, Serialize};

use crate::board::{lines, Board, Player};

/// How a finished game ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Conclusion {
    Win(Player),
    Draw,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Outcome {
    InProgress,
    Concluded(Conclusion),
}

impl Outcome {
    pub fn conclusion(self) -> Option<Conclusion> {
        match self {
            Outcome::InProgress => None,
            Outcome::Concluded(conclusion) => Some(conclusion),
        }
    }

    pub fn winner(self) -> Option<Player> {
        match self {
            Outcome::Concluded(Conclusion::Win(player)) => Some(player),
            _ => None,
        }
    }
}

/// Checks rows, then columns, then diagonals; the first complete line wins.
/// A full board with no complete line is a draw.
pub fn evaluate(board: &Board) -> Outcome {
    let n = board.size();
    if board.mark_count() < n {
        return Outcome::InProgress;
    }

    for line in lines(n) {
        if let Some(player) = board[line[0]] {
            if line[1..].iter().all(|&idx| board[idx] == Some(player)) {
                return Outcome::Concluded(Conclusion::Win(player));
            }
        }
    }

    if board.is_full() {
        return Outcome::Concluded(Conclusion::Draw);
    }

    Outcome::InProgress
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const X: Option<Player> = Some(Player::X);
    const O: Option<Player> = Some(Player::O);
    const E: Option<Player> = None;

    fn board(tiles: Vec<Option<Player>>) -> Board {
        Board::from_tiles(tiles).unwrap()
    }

    #[test]
    fn empty_board_is_in_progress() {
        assert_eq!(evaluate(&Board::new(3).unwrap()), Outcome::InProgress);
    }

    #[test]
    fn full_board_without_line_is_draw() {
        let b = board(vec![X, O, X, X, O, O, O, X, X]);
        assert_eq!(evaluate(&b), Outcome::Concluded(Conclusion::Draw));
    }

    #[test]
    fn detects_each_kind_of_line() {
        let row = board(vec![E, E, E, O, O, O, X, X, E]);
        assert_eq!(evaluate(&row).winner(), Some(Player::O));

        let col = board(vec![X, O, E, X, O, E, X, E, E]);
        assert_eq!(evaluate(&col).winner(), Some(Player::X));

        let diag = board(vec![X, O, E, O, X, E, E, E, X]);
        assert_eq!(evaluate(&diag).winner(), Some(Player::X));

        let anti = board(vec![X, X, O, E, O, E, O, E, X]);
        assert_eq!(evaluate(&anti).winner(), Some(Player::O));
    }

    #[test]
    fn win_on_last_cell_beats_draw() {
        let b = board(vec![X, O, X, O, X, O, O, X, X]);
        assert_eq!(evaluate(&b).winner(), Some(Player::X));
    }

    #[test]
    fn four_by_four_needs_full_line() {
        let mut b = Board::new(4).unwrap();
        for idx in [0, 1, 2] {
            b.mark(idx, Player::X).unwrap();
        }
        assert_eq!(evaluate(&b), Outcome::InProgress);
        b.mark(3, Player::X).unwrap();
        assert_eq!(evaluate(&b).winner(), Some(Player::X));

        let mut anti = Board::new(4).unwrap();
        for idx in [3, 6, 9, 12] {
            anti.mark(idx, Player::O).unwrap();
        }
        assert_eq!(evaluate(&anti).winner(), Some(Player::O));
    }

    #[test]
    fn rows_are_checked_before_columns() {
        // X holds row 0 and column 0 at once; the row is reported first but
        // both name the same mark.
        let b = board(vec![X, X, X, X, O, O, X, O, O]);
        assert_eq!(evaluate(&b).winner(), Some(Player::X));
    }

    fn arb_board() -> impl Strategy<Value = Board> {
        (3usize..=5).prop_flat_map(|n| {
            proptest::collection::vec(prop_oneof![Just(E), Just(X), Just(O)], n * n)
                .prop_map(|tiles| Board::from_tiles(tiles).unwrap())
        })
    }

    proptest! {
        #[test]
        fn evaluate_is_pure(b in arb_board()) {
            let before = b.clone();
            let first = evaluate(&b);
            let second = evaluate(&b);
            prop_assert_eq!(first, second);
            prop_assert_eq!(b, before);
        }
    }
}
