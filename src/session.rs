//! Two-player games over a shared [`DocumentStore`] record.
//!
//! Each participant owns a [`RemoteSession`]. Moves go through [`transact`],
//! so of two racing submissions for the same turn at most one commits; the
//! other re-reads the record and is rejected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{distributions::Alphanumeric, Rng};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::board::{Board, Player};
use crate::config::{GameConfig, Privacy, Settings};
use crate::error::{Error, Result};
use crate::rules::{evaluate, Conclusion, Outcome};
use crate::store::{
    transact, DocumentStore, GameState, Snapshot, Status, StoreError, Subscription,
};

pub const GAME_ID_LEN: usize = 6;

const MAX_CREATE_ATTEMPTS: usize = 5;

pub fn generate_game_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.sample_iter(Alphanumeric)
        .take(GAME_ID_LEN)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

pub fn normalize_game_id(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

/// How a participant wants to enter an online game.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Mode {
    Queue,
    Code(String),
    Private,
}

impl Mode {
    /// Parses URL-style parameters such as `mode=code&gameId=abc123`.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut mode = None;
        let mut code = None;
        for param in query.trim_start_matches('?').split('&') {
            match param.split_once('=') {
                Some(("mode", value)) => mode = Some(value),
                Some(("gameId", value)) if !value.trim().is_empty() => code = Some(value),
                _ => {}
            }
        }

        match (mode, code) {
            (Some("queue"), _) => Ok(Mode::Queue),
            (Some("private"), _) => Ok(Mode::Private),
            (Some("code"), Some(code)) => Ok(Mode::Code(normalize_game_id(code))),
            (Some("code"), None) => Err(Error::InvalidConfig("no game code provided".into())),
            _ => Err(Error::InvalidConfig("no game mode provided".into())),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Ping {
    Good,
    Fair,
    Poor,
}

impl Ping {
    pub fn from_latency(latency: Duration) -> Self {
        match latency.as_millis() {
            0..=300 => Ping::Good,
            301..=1000 => Ping::Fair,
            _ => Ping::Poor,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MoveReceipt {
    pub snapshot: Snapshot,
    pub latency: Duration,
    pub ping: Ping,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SessionStatus {
    Waiting { code: String },
    YourTurn,
    TheirTurn,
    Won,
    Lost,
    Draw,
    Removed,
}

impl SessionStatus {
    pub fn is_over(&self) -> bool {
        matches!(
            self,
            SessionStatus::Won | SessionStatus::Lost | SessionStatus::Draw | SessionStatus::Removed
        )
    }
}

/// What the local participant should currently be shown.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SessionView {
    pub board: Board,
    pub status: SessionStatus,
    pub opponent_active: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub transaction_timeout: Duration,
    pub max_retries: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SessionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            transaction_timeout: settings.transaction_timeout(),
            max_retries: settings.max_transaction_retries,
        }
    }
}

/// Validates and applies one move to a record, producing the record to
/// commit. The turn passes to the other side and the outcome is settled in
/// the same write.
pub fn apply_move(state: &GameState, idx: usize, mark: Player) -> Result<GameState> {
    if state.status != Status::Playing || state.turn != mark {
        return Err(Error::OutOfTurnOrOccupied);
    }

    let mut next = state.clone();
    next.board.mark(idx, mark)?;
    next.turn = !mark;
    if let Outcome::Concluded(conclusion) = evaluate(&next.board) {
        next.status = Status::Finished;
        next.winner = Some(conclusion);
    }
    Ok(next)
}

fn join(state: &GameState, game_id: &str) -> Result<GameState> {
    if !state.is_joinable() {
        return Err(Error::AlreadyInSession(game_id.to_string()));
    }
    let mut next = state.clone();
    next.player_o_joined = true;
    next.player_o_active = true;
    next.status = Status::Playing;
    Ok(next)
}

pub struct RemoteSession {
    store: Arc<dyn DocumentStore>,
    game_id: String,
    mark: Player,
    options: SessionOptions,
    subscription: Option<Subscription>,
    view: SessionView,
    last_version: u64,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("game_id", &self.game_id)
            .field("mark", &self.mark)
            .field("view", &self.view)
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}

impl RemoteSession {
    /// Enters a game the way `mode` asks for.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        mode: Mode,
        config: &GameConfig,
        options: SessionOptions,
    ) -> Result<Self> {
        match mode {
            Mode::Queue => Self::find_or_create(store, config, options).await,
            Mode::Code(id) => Self::join_by_id(store, &id, options).await,
            Mode::Private => {
                let config =
                    GameConfig::new(config.grid_size(), config.difficulty(), Privacy::Private)?;
                Self::create(store, &config, options).await
            }
        }
    }

    /// Joins the oldest public game waiting for an opponent, or opens a new
    /// one when there is none.
    #[instrument(skip(store, options))]
    pub async fn find_or_create(
        store: Arc<dyn DocumentStore>,
        config: &GameConfig,
        options: SessionOptions,
    ) -> Result<Self> {
        if config.privacy() == Privacy::Public {
            if let Some((id, _)) = store.query_waiting_public(config.grid_size()).await? {
                match Self::join_by_id(Arc::clone(&store), &id, options).await {
                    Ok(session) => return Ok(session),
                    // someone else got there first
                    Err(Error::AlreadyInSession(_) | Error::NotFound(_)) => {
                        debug!(game_id = %id, "queued game taken, creating a new one");
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Self::create(store, config, options).await
    }

    /// Opens a new game as X under a fresh game id.
    pub async fn create(
        store: Arc<dyn DocumentStore>,
        config: &GameConfig,
        options: SessionOptions,
    ) -> Result<Self> {
        let board = Board::new(config.grid_size())?;
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let id = generate_game_id(&mut rand::thread_rng());
            let state = GameState::new(board.clone(), config.privacy());
            match store.create(&id, state).await {
                Ok(snapshot) => {
                    info!(game_id = %id, privacy = %config.privacy(), "created online game");
                    return Self::attach(store, id, Player::X, snapshot, options).await;
                }
                Err(StoreError::AlreadyExists(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(Error::TransportFailure("could not allocate a game id".into()))
    }

    /// Joins a specific waiting game as O.
    #[instrument(skip(store, options))]
    pub async fn join_by_id(
        store: Arc<dyn DocumentStore>,
        id: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        let id = normalize_game_id(id);
        let snapshot = transact(store.as_ref(), &id, options.max_retries, |state| {
            join(state, &id)
        })
        .await?;
        info!(game_id = %id, "joined online game as O");
        Self::attach(store, id, Player::O, snapshot, options).await
    }

    async fn attach(
        store: Arc<dyn DocumentStore>,
        game_id: String,
        mark: Player,
        snapshot: Snapshot,
        options: SessionOptions,
    ) -> Result<Self> {
        let subscription = store.subscribe(&game_id).await?;
        let view = view_of(&snapshot.state, &game_id, mark);
        Ok(Self {
            store,
            game_id,
            mark,
            options,
            subscription: Some(subscription),
            view,
            last_version: snapshot.version,
        })
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn mark(&self) -> Player {
        self.mark
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Submits a move as one conditional update of the shared record.
    #[instrument(skip(self), fields(game_id = %self.game_id, mark = %self.mark))]
    pub async fn attempt_move(&self, idx: usize) -> Result<MoveReceipt> {
        let started = Instant::now();
        let mark = self.mark;
        let committed = tokio::time::timeout(
            self.options.transaction_timeout,
            transact(
                self.store.as_ref(),
                &self.game_id,
                self.options.max_retries,
                |state| apply_move(state, idx, mark),
            ),
        )
        .await
        .map_err(|_| Error::TransportFailure("move timed out, try again".into()))?;

        let snapshot = match committed {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(cell = idx, %err, "move rejected");
                return Err(err);
            }
        };
        let latency = started.elapsed();
        info!(cell = idx, latency_ms = latency.as_millis() as u64, "move committed");
        Ok(MoveReceipt {
            snapshot,
            latency,
            ping: Ping::from_latency(latency),
        })
    }

    /// Waits for the shared record to change and returns the new view, or
    /// `None` once the feed is over. Snapshots that change nothing on screen
    /// are skipped. The feed is dropped as soon as the game is over.
    pub async fn next_update(&mut self) -> Option<SessionView> {
        loop {
            let snapshot = match self.subscription.as_mut()?.next().await {
                Some(snapshot) => snapshot,
                None => {
                    self.unsubscribe();
                    return None;
                }
            };
            if let Some(view) = self.reconcile(snapshot) {
                if view.status.is_over() {
                    self.unsubscribe();
                }
                return Some(view);
            }
        }
    }

    /// Brings the local view in line with a snapshot. Every snapshot is
    /// authoritative except ones older than what was already shown. Returns
    /// the new view only if it differs from the current one.
    pub fn reconcile(&mut self, snapshot: Option<Snapshot>) -> Option<SessionView> {
        let view = match snapshot {
            Some(snapshot) if snapshot.version < self.last_version => {
                debug!(version = snapshot.version, "ignoring stale snapshot");
                return None;
            }
            Some(snapshot) => {
                self.last_version = snapshot.version;
                view_of(&snapshot.state, &self.game_id, self.mark)
            }
            None => SessionView {
                board: self.view.board.clone(),
                status: SessionStatus::Removed,
                opponent_active: false,
            },
        };

        if view == self.view {
            return None;
        }
        self.view = view.clone();
        Some(view)
    }

    pub fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!(game_id = %self.game_id, "unsubscribed");
        }
    }

    /// Cancels the feed and, in the background, marks this side inactive.
    /// The record is deleted once neither side is active, unless it changed
    /// after this side's write. Failures are only
    /// logged; the returned handle may be ignored.
    pub fn teardown(mut self) -> JoinHandle<()> {
        self.unsubscribe();
        let store = Arc::clone(&self.store);
        let game_id = self.game_id.clone();
        let mark = self.mark;
        let retries = self.options.max_retries;

        tokio::spawn(async move {
            let result = transact(store.as_ref(), &game_id, retries, |state| {
                let mut next = state.clone();
                next.set_active(mark, false);
                Ok(next)
            })
            .await;

            match result {
                Ok(snapshot)
                    if !snapshot.state.player_x_active && !snapshot.state.player_o_active =>
                {
                    match store.delete(&game_id, snapshot.version).await {
                        Ok(()) => debug!(%game_id, "removed abandoned game"),
                        Err(StoreError::Conflict(_)) => {
                            debug!(%game_id, "game changed after teardown, keeping it")
                        }
                        Err(err) => warn!(%game_id, %err, "could not remove abandoned game"),
                    }
                }
                Ok(_) => debug!(%game_id, %mark, "marked inactive"),
                Err(err) => warn!(%game_id, %err, "could not mark player inactive"),
            }
        })
    }
}

fn view_of(state: &GameState, game_id: &str, mark: Player) -> SessionView {
    let status = match state.status {
        Status::Waiting => SessionStatus::Waiting {
            code: game_id.to_string(),
        },
        Status::Playing if state.turn == mark => SessionStatus::YourTurn,
        Status::Playing => SessionStatus::TheirTurn,
        Status::Finished => match state.winner {
            Some(Conclusion::Win(winner)) if winner == mark => SessionStatus::Won,
            Some(Conclusion::Win(_)) => SessionStatus::Lost,
            Some(Conclusion::Draw) | None => SessionStatus::Draw,
        },
    };
    SessionView {
        board: state.board.clone(),
        status,
        opponent_active: state.is_active(!mark),
    }
}
