//! Offline play: a human against the computer opponent.

use rand::Rng;
use tracing::{debug, info};

use crate::board::{Board, Player};
use crate::error::{Error, Result};
use crate::opponent::{choose_move, Difficulty};
use crate::rules::{evaluate, Conclusion, Outcome};

pub const HUMAN: Player = Player::X;
pub const OPPONENT: Player = Player::O;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    AwaitingHuman,
    AwaitingOpponent,
    Concluded(Conclusion),
}

/// User intents and scheduled work fed into [`LocalGame::handle`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Command {
    ClaimCell(usize),
    OpponentReply,
    NewGame(Difficulty),
}

#[derive(Debug, Clone)]
pub struct LocalGame {
    board: Board,
    state: State,
    difficulty: Difficulty,
}

impl LocalGame {
    pub fn new(grid_size: usize, difficulty: Difficulty) -> Result<Self> {
        Ok(Self {
            board: Board::new(grid_size)?,
            state: State::AwaitingHuman,
            difficulty,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn whos_turn(&self) -> Option<Player> {
        match self.state {
            State::AwaitingHuman => Some(HUMAN),
            State::AwaitingOpponent => Some(OPPONENT),
            State::Concluded(_) => None,
        }
    }

    pub fn handle<R: Rng + ?Sized>(&mut self, command: Command, rng: &mut R) -> Result<State> {
        match command {
            Command::ClaimCell(idx) => self.claim_cell(idx),
            Command::OpponentReply => {
                self.opponent_reply(rng);
                Ok(self.state)
            }
            Command::NewGame(difficulty) => {
                self.new_game(difficulty);
                Ok(self.state)
            }
        }
    }

    /// Places the human's mark. Rejected without touching the board once the
    /// game is over, while the opponent is thinking, or on an occupied cell.
    pub fn claim_cell(&mut self, idx: usize) -> Result<State> {
        if self.state != State::AwaitingHuman {
            return Err(Error::OutOfTurnOrOccupied);
        }
        self.board.mark(idx, HUMAN)?;
        debug!(cell = idx, "human marked cell");
        self.advance(State::AwaitingOpponent);
        Ok(self.state)
    }

    /// Lets the opponent move. A reply that arrives after the game concluded
    /// or was restarted does nothing and returns `None`.
    pub fn opponent_reply<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.state != State::AwaitingOpponent {
            return None;
        }
        let idx = choose_move(&self.board, OPPONENT, self.difficulty, rng)?;
        self.board.mark(idx, OPPONENT).ok()?;
        debug!(cell = idx, difficulty = %self.difficulty, "opponent marked cell");
        self.advance(State::AwaitingHuman);
        Some(idx)
    }

    pub fn new_game(&mut self, difficulty: Difficulty) {
        self.board.clear();
        self.state = State::AwaitingHuman;
        self.difficulty = difficulty;
        info!(%difficulty, grid_size = self.board.size(), "new offline game");
    }

    fn advance(&mut self, next: State) {
        self.state = match evaluate(&self.board) {
            Outcome::InProgress => next,
            Outcome::Concluded(conclusion) => {
                info!(?conclusion, "offline game concluded");
                State::Concluded(conclusion)
            }
        };
    }
}
