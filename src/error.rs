use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("could not find game {0}")]
    NotFound(String),
    #[error("game {0} is already in session")]
    AlreadyInSession(String),
    #[error("invalid move or not your turn")]
    OutOfTurnOrOccupied,
    #[error("cell {0} is not on the board")]
    InvalidCell(usize),
    #[error("game store unreachable: {0}")]
    TransportFailure(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the user can simply try the same action again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OutOfTurnOrOccupied | Error::TransportFailure(_))
    }
}
