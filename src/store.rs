//! The shared game record and the document store it lives in.
//!
//! Stores only offer plain reads plus a versioned compare-and-swap. Turn
//! arbitration is built on top of that by [`transact`], which re-reads and
//! re-validates on every conflict, so a write computed from a stale record is
//! never applied.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::board::{Board, Player};
use crate::config::Privacy;
use crate::error::Error;
use crate::rules::Conclusion;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Status {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub board: Board,
    pub status: Status,
    pub turn: Player,
    pub winner: Option<Conclusion>,
    pub privacy: Privacy,
    pub player_x_active: bool,
    pub player_o_joined: bool,
    pub player_o_active: bool,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl GameState {
    /// A fresh record owned by its creator, who plays X and moves first.
    pub fn new(board: Board, privacy: Privacy) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            board,
            status: Status::Waiting,
            turn: Player::X,
            winner: None,
            privacy,
            player_x_active: true,
            player_o_joined: false,
            player_o_active: false,
            created_at,
        }
    }

    /// Waiting for a second player while its creator is still around.
    pub fn is_joinable(&self) -> bool {
        self.status == Status::Waiting && !self.player_o_joined && self.player_x_active
    }

    pub fn is_queued(&self, grid_size: usize) -> bool {
        self.is_joinable() && self.privacy == Privacy::Public && self.board.size() == grid_size
    }

    pub fn is_active(&self, player: Player) -> bool {
        match player {
            Player::X => self.player_x_active,
            Player::O => self.player_o_active,
        }
    }

    pub fn set_active(&mut self, player: Player, active: bool) {
        match player {
            Player::X => self.player_x_active = active,
            Player::O => self.player_o_active = active,
        }
    }
}

/// A record as read from the store, tagged with the version a
/// compare-and-swap must quote to replace it.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub state: GameState,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no record for {0}")]
    NotFound(String),
    #[error("record {0} changed concurrently")]
    Conflict(String),
    #[error("record {0} already exists")]
    AlreadyExists(String),
    #[error("transport: {0}")]
    Transport(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Error::NotFound(id),
            StoreError::AlreadyExists(id) => Error::AlreadyInSession(id),
            StoreError::Conflict(id) => {
                Error::TransportFailure(format!("game {id} is busy, try again"))
            }
            StoreError::Transport(msg) => Error::TransportFailure(msg),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Snapshot>, StoreError>;

    async fn create(&self, id: &str, state: GameState) -> Result<Snapshot, StoreError>;

    /// The oldest public `grid_size` record still waiting for a second player
    /// whose creator is still around.
    async fn query_waiting_public(
        &self,
        grid_size: usize,
    ) -> Result<Option<(String, Snapshot)>, StoreError>;

    /// Replaces the record only if it is still at `expected_version`.
    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        state: GameState,
    ) -> Result<Snapshot, StoreError>;

    /// Removes the record only if it is still at `expected_version`.
    async fn delete(&self, id: &str, expected_version: u64) -> Result<(), StoreError>;

    /// Streams full snapshots of one record; `None` once it is deleted.
    async fn subscribe(&self, id: &str) -> Result<Subscription, StoreError>;
}

/// A cancellable feed of snapshots for one record.
///
/// Intermediate snapshots may be coalesced; each delivered one is the full
/// record. Dropping the subscription cancels it.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<Option<Snapshot>>,
    initial: Option<Option<Snapshot>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(mut rx: watch::Receiver<Option<Snapshot>>) -> Self {
        let initial = Some(rx.borrow_and_update().clone());
        Self {
            rx,
            initial,
            task: None,
        }
    }

    /// Ties a forwarding task to the subscription; it is aborted on cancel.
    pub fn with_task(rx: watch::Receiver<Option<Snapshot>>, task: JoinHandle<()>) -> Self {
        let mut sub = Self::new(rx);
        sub.task = Some(task);
        sub
    }

    /// Waits for the next snapshot. The first call yields the snapshot current
    /// at subscription time. Returns `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Option<Snapshot>> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Cancels the feed. Dropping the subscription does the same.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Runs `apply` against the current record and commits its result with
/// compare-and-swap. On a conflict the record is re-read and `apply` runs
/// again, up to `max_retries` times; rejections from `apply` are returned
/// untouched and nothing is written.
pub async fn transact<F>(
    store: &dyn DocumentStore,
    id: &str,
    max_retries: u32,
    mut apply: F,
) -> crate::error::Result<Snapshot>
where
    F: FnMut(&GameState) -> crate::error::Result<GameState> + Send,
{
    let mut retries = 0;
    loop {
        let current = store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let next = apply(&current.state)?;

        match store.compare_and_swap(id, current.version, next).await {
            Ok(committed) => return Ok(committed),
            Err(StoreError::Conflict(_)) if retries < max_retries => {
                retries += 1;
                debug!(game_id = id, retries, "transaction conflict, retrying");
            }
            Err(err) => {
                warn!(game_id = id, %err, "transaction failed");
                return Err(err.into());
            }
        }
    }
}

#[derive(Debug)]
struct Document {
    snapshot: Snapshot,
    seq: u64,
    tx: watch::Sender<Option<Snapshot>>,
}

#[derive(Debug, Default)]
struct Documents {
    docs: HashMap<String, Document>,
    next_seq: u64,
}

/// A process-local store. Also backs the TCP store server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.docs.get(id).map(|doc| doc.snapshot.clone()))
    }

    async fn create(&self, id: &str, state: GameState) -> Result<Snapshot, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.docs.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        let snapshot = Snapshot { version: 1, state };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let (tx, _) = watch::channel(Some(snapshot.clone()));
        inner.docs.insert(
            id.to_string(),
            Document {
                snapshot: snapshot.clone(),
                seq,
                tx,
            },
        );
        info!(game_id = id, "record created");
        Ok(snapshot)
    }

    async fn query_waiting_public(
        &self,
        grid_size: usize,
    ) -> Result<Option<(String, Snapshot)>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .docs
            .iter()
            .filter(|(_, doc)| doc.snapshot.state.is_queued(grid_size))
            .min_by_key(|(_, doc)| (doc.snapshot.state.created_at, doc.seq))
            .map(|(id, doc)| (id.clone(), doc.snapshot.clone())))
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        state: GameState,
    ) -> Result<Snapshot, StoreError> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .docs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if doc.snapshot.version != expected_version {
            debug!(
                game_id = id,
                expected_version,
                actual_version = doc.snapshot.version,
                "stale write rejected"
            );
            return Err(StoreError::Conflict(id.to_string()));
        }
        doc.snapshot = Snapshot {
            version: expected_version + 1,
            state,
        };
        doc.tx.send_replace(Some(doc.snapshot.clone()));
        Ok(doc.snapshot.clone())
    }

    async fn delete(&self, id: &str, expected_version: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let version = inner
            .docs
            .get(id)
            .map(|doc| doc.snapshot.version)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if version != expected_version {
            debug!(
                game_id = id,
                expected_version,
                actual_version = version,
                "stale delete rejected"
            );
            return Err(StoreError::Conflict(id.to_string()));
        }
        let Some(doc) = inner.docs.remove(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        doc.tx.send_replace(None);
        info!(game_id = id, "record deleted");
        Ok(())
    }

    async fn subscribe(&self, id: &str) -> Result<Subscription, StoreError> {
        let inner = self.inner.lock().await;
        let doc = inner
            .docs
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(Subscription::new(doc.tx.subscribe()))
    }
}
