use crate::store::{GameState, Snapshot, StoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Disconnect,
    Request(Request),
    Response(Result<Response, Error>),
    Notification(Notification),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Get(String),
    Create {
        id: String,
        state: GameState,
    },
    /// Oldest queued public game of the given grid size.
    QueryWaitingPublic(usize),
    CompareAndSwap {
        id: String,
        expected_version: u64,
        state: GameState,
    },
    Delete {
        id: String,
        expected_version: u64,
    },
    /// Turns the connection into a stream of `Notification::Snapshot`s.
    Subscribe(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Record(Option<Snapshot>),
    Waiting(Option<(String, Snapshot)>),
    Committed(Snapshot),
    Subscribed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Notification {
    Snapshot(Option<Snapshot>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Error {
    NotFound(String),
    Conflict(String),
    AlreadyExists(String),
    InvalidMessage(String),
    ServerError(String),
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::Request(value)
    }
}

impl From<Notification> for Message {
    fn from(value: Notification) -> Self {
        Message::Notification(value)
    }
}

impl From<Response> for Message {
    fn from(value: Response) -> Self {
        Message::Response(Ok(value))
    }
}

impl From<Error> for Message {
    fn from(value: Error) -> Self {
        Message::Response(Err(value))
    }
}

impl From<StoreError> for Error {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Error::NotFound(id),
            StoreError::Conflict(id) => Error::Conflict(id),
            StoreError::AlreadyExists(id) => Error::AlreadyExists(id),
            StoreError::Transport(msg) => Error::ServerError(msg),
        }
    }
}

impl From<Error> for StoreError {
    fn from(value: Error) -> Self {
        match value {
            Error::NotFound(id) => StoreError::NotFound(id),
            Error::Conflict(id) => StoreError::Conflict(id),
            Error::AlreadyExists(id) => StoreError::AlreadyExists(id),
            Error::InvalidMessage(msg) => StoreError::Transport(format!("invalid message: {msg}")),
            Error::ServerError(msg) => StoreError::Transport(format!("server error: {msg}")),
        }
    }
}
