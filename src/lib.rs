//! Tic-tac-toe on any N×N board, played offline against a scripted opponent
//! or online against another person through a shared document store.

pub mod board;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod message;
pub mod opponent;
pub mod remote;
pub mod rules;
pub mod server;
pub mod session;
pub mod store;
pub mod term;

pub use board::{Board, Player};
pub use error::{Error, Result};
pub use rules::{evaluate, Conclusion, Outcome};
