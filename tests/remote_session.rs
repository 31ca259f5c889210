//! Remote sessions against an in-process store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tictactoe_sync::config::{GameConfig, Privacy};
use tictactoe_sync::opponent::Difficulty;
use tictactoe_sync::session::{
    apply_move, Mode, RemoteSession, SessionOptions, SessionStatus, SessionView,
};
use tictactoe_sync::store::{
    DocumentStore, GameState, MemoryStore, Snapshot, Status, StoreError, Subscription,
};
use tictactoe_sync::{Error, Player};

fn public() -> GameConfig {
    GameConfig::new(3, Difficulty::Easy, Privacy::Public).unwrap()
}

fn options() -> SessionOptions {
    SessionOptions {
        transaction_timeout: Duration::from_secs(2),
        max_retries: 5,
    }
}

/// Pulls updates until one satisfies `done`.
async fn wait_for(
    session: &mut RemoteSession,
    done: impl Fn(&SessionView) -> bool,
) -> SessionView {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = session.next_update().await.expect("feed ended early");
            if done(&view) {
                return view;
            }
        }
    })
    .await
    .expect("no matching update")
}

async fn paired(store: &Arc<MemoryStore>) -> (RemoteSession, RemoteSession) {
    let x = RemoteSession::find_or_create(store.clone(), &public(), options())
        .await
        .unwrap();
    let o = RemoteSession::find_or_create(store.clone(), &public(), options())
        .await
        .unwrap();
    (x, o)
}

#[tokio::test]
async fn queue_pairs_two_players() {
    let store = Arc::new(MemoryStore::new());
    let mut x = RemoteSession::find_or_create(store.clone(), &public(), options())
        .await
        .unwrap();
    assert_eq!(x.mark(), Player::X);
    assert_eq!(
        x.view().status,
        SessionStatus::Waiting {
            code: x.game_id().to_string()
        }
    );

    let o = RemoteSession::find_or_create(store.clone(), &public(), options())
        .await
        .unwrap();
    assert_eq!(o.mark(), Player::O);
    assert_eq!(o.game_id(), x.game_id());
    assert_eq!(o.view().status, SessionStatus::TheirTurn);

    let view = wait_for(&mut x, |v| v.status == SessionStatus::YourTurn).await;
    assert!(view.opponent_active);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn private_games_stay_out_of_the_queue() {
    let store = Arc::new(MemoryStore::new());
    let private = RemoteSession::start(store.clone(), Mode::Private, &public(), options())
        .await
        .unwrap();

    let queued = RemoteSession::start(store.clone(), Mode::Queue, &public(), options())
        .await
        .unwrap();
    assert_ne!(queued.game_id(), private.game_id());
    assert_eq!(queued.mark(), Player::X);

    let code = Mode::from_query(&format!("mode=code&gameId={}", private.game_id().to_lowercase()))
        .unwrap();
    let friend = RemoteSession::start(store.clone(), code, &public(), options())
        .await
        .unwrap();
    assert_eq!(friend.game_id(), private.game_id());
    assert_eq!(friend.mark(), Player::O);
}

#[tokio::test]
async fn queue_keeps_grid_sizes_apart() {
    let store = Arc::new(MemoryStore::new());
    let small = RemoteSession::find_or_create(store.clone(), &public(), options())
        .await
        .unwrap();

    let four = GameConfig::new(4, Difficulty::Easy, Privacy::Public).unwrap();
    let big = RemoteSession::find_or_create(store.clone(), &four, options())
        .await
        .unwrap();
    assert_ne!(big.game_id(), small.game_id());
    assert_eq!(big.mark(), Player::X);
    assert_eq!(big.view().board.size(), 4);

    let partner = RemoteSession::find_or_create(store.clone(), &four, options())
        .await
        .unwrap();
    assert_eq!(partner.game_id(), big.game_id());
    assert_eq!(partner.mark(), Player::O);
}

#[tokio::test]
async fn full_game_reaches_both_players() {
    let store = Arc::new(MemoryStore::new());
    let (mut x, mut o) = paired(&store).await;

    for (idx, mover) in [(0, Player::X), (3, Player::O), (1, Player::X), (4, Player::O)] {
        let session = if mover == Player::X { &x } else { &o };
        let receipt = session.attempt_move(idx).await.unwrap();
        assert_eq!(receipt.snapshot.state.board[idx], Some(mover));
    }
    x.attempt_move(2).await.unwrap();

    let x_view = wait_for(&mut x, |v| v.status.is_over()).await;
    let o_view = wait_for(&mut o, |v| v.status.is_over()).await;
    assert_eq!(x_view.status, SessionStatus::Won);
    assert_eq!(o_view.status, SessionStatus::Lost);
    assert_eq!(x_view.board, o_view.board);
    assert!(!x.is_subscribed());
    assert!(!o.is_subscribed());

    let id = x.game_id().to_string();
    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.state.status, Status::Finished);
    assert_eq!(
        o.attempt_move(5).await.unwrap_err(),
        Error::OutOfTurnOrOccupied
    );
}

#[tokio::test]
async fn racing_updates_commit_exactly_one_move() {
    let store = Arc::new(MemoryStore::new());
    let (x, _o) = paired(&store).await;
    let id = x.game_id().to_string();

    let before = store.get(&id).await.unwrap().unwrap();
    assert_eq!(before.state.turn, Player::X);
    let first = apply_move(&before.state, 4, Player::X).unwrap();
    let second = apply_move(&before.state, 4, Player::X).unwrap();

    store
        .compare_and_swap(&id, before.version, first)
        .await
        .unwrap();
    assert_eq!(
        store.compare_and_swap(&id, before.version, second).await,
        Err(StoreError::Conflict(id.clone()))
    );

    // retrying through the session re-reads the record and is refused
    assert_eq!(
        x.attempt_move(4).await.unwrap_err(),
        Error::OutOfTurnOrOccupied
    );

    let after = store.get(&id).await.unwrap().unwrap();
    assert_eq!(after.state.board.mark_count(), 1);
    assert_eq!(after.state.board[4], Some(Player::X));
    assert_eq!(after.state.turn, Player::O);
}

#[tokio::test]
async fn concurrent_submissions_from_one_side() {
    let store = Arc::new(MemoryStore::new());
    let (x, _o) = paired(&store).await;

    let (a, b) = tokio::join!(x.attempt_move(0), x.attempt_move(8));
    let accepted = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(accepted, 1);
    let rejected = if a.is_ok() { b } else { a };
    assert_eq!(rejected.unwrap_err(), Error::OutOfTurnOrOccupied);

    let stored = store.get(x.game_id()).await.unwrap().unwrap();
    assert_eq!(stored.state.board.mark_count(), 1);
}

#[tokio::test]
async fn joining_a_running_game_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (x, _o) = paired(&store).await;
    let id = x.game_id().to_string();
    let before = store.get(&id).await.unwrap().unwrap();

    let err = RemoteSession::join_by_id(store.clone(), &id, options())
        .await
        .unwrap_err();
    assert_eq!(err, Error::AlreadyInSession(id.clone()));
    assert!(!err.is_recoverable());
    assert_eq!(store.get(&id).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn joining_unknown_game_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let err = RemoteSession::join_by_id(store, "nope42", options())
        .await
        .unwrap_err();
    assert_eq!(err, Error::NotFound("NOPE42".into()));
}

#[tokio::test]
async fn replayed_snapshot_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (mut x, _o) = paired(&store).await;
    wait_for(&mut x, |v| v.status == SessionStatus::YourTurn).await;

    let current = store.get(x.game_id()).await.unwrap();
    let shown = x.view().clone();
    assert_eq!(x.reconcile(current.clone()), None);
    assert_eq!(x.reconcile(current), None);
    assert_eq!(x.view(), &shown);

    let mut stale = store.get(x.game_id()).await.unwrap().unwrap();
    stale.version -= 1;
    stale.state.status = Status::Waiting;
    assert_eq!(x.reconcile(Some(stale)), None);
    assert_eq!(x.view(), &shown);
}

#[tokio::test]
async fn teardown_marks_players_inactive_then_removes_game() {
    let store = Arc::new(MemoryStore::new());
    let (x, mut o) = paired(&store).await;
    let id = x.game_id().to_string();

    x.teardown().await.unwrap();
    let view = wait_for(&mut o, |v| !v.opponent_active).await;
    assert_eq!(view.status, SessionStatus::TheirTurn);
    let stored = store.get(&id).await.unwrap().unwrap();
    assert!(!stored.state.player_x_active);
    assert!(stored.state.player_o_active);

    o.teardown().await.unwrap();
    assert_eq!(store.get(&id).await.unwrap(), None);
}

#[tokio::test]
async fn abandoned_waiting_game_leaves_the_queue() {
    let store = Arc::new(MemoryStore::new());
    let x = RemoteSession::find_or_create(store.clone(), &public(), options())
        .await
        .unwrap();
    x.teardown().await.unwrap();

    assert!(store.is_empty().await);
    assert!(store.query_waiting_public(3).await.unwrap().is_none());
}

#[tokio::test]
async fn deleted_record_ends_the_feed() {
    let store = Arc::new(MemoryStore::new());
    let (mut x, _o) = paired(&store).await;
    let current = store.get(x.game_id()).await.unwrap().unwrap();
    store.delete(x.game_id(), current.version).await.unwrap();

    let view = wait_for(&mut x, |v| v.status.is_over()).await;
    assert_eq!(view.status, SessionStatus::Removed);
    assert!(x.next_update().await.is_none());
}

/// Hangs every read once `stalled` is set.
struct Stalling {
    inner: MemoryStore,
    stalled: AtomicBool,
}

#[async_trait]
impl DocumentStore for Stalling {
    async fn get(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        if self.stalled.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.inner.get(id).await
    }

    async fn create(&self, id: &str, state: GameState) -> Result<Snapshot, StoreError> {
        self.inner.create(id, state).await
    }

    async fn query_waiting_public(
        &self,
        grid_size: usize,
    ) -> Result<Option<(String, Snapshot)>, StoreError> {
        self.inner.query_waiting_public(grid_size).await
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        state: GameState,
    ) -> Result<Snapshot, StoreError> {
        self.inner.compare_and_swap(id, expected_version, state).await
    }

    async fn delete(&self, id: &str, expected_version: u64) -> Result<(), StoreError> {
        self.inner.delete(id, expected_version).await
    }

    async fn subscribe(&self, id: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(id).await
    }
}

#[tokio::test]
async fn stalled_move_times_out_with_retryable_error() {
    let store = Arc::new(Stalling {
        inner: MemoryStore::new(),
        stalled: AtomicBool::new(false),
    });
    let short = SessionOptions {
        transaction_timeout: Duration::from_millis(50),
        max_retries: 1,
    };
    let x = RemoteSession::find_or_create(store.clone(), &public(), short)
        .await
        .unwrap();
    let _o = RemoteSession::find_or_create(store.clone(), &public(), short)
        .await
        .unwrap();

    store.stalled.store(true, Ordering::SeqCst);
    let err = x.attempt_move(4).await.unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
    assert!(err.is_recoverable());
}

/// What another participant does between teardown's write and its delete.
#[derive(Clone, Copy)]
enum Interloper {
    Join,
    Touch,
}

/// Runs the interloper once, right before forwarding a delete.
struct RacesTeardown {
    inner: Arc<MemoryStore>,
    interloper: Interloper,
    joined: std::sync::Mutex<Option<Result<SessionStatus, Error>>>,
}

impl RacesTeardown {
    fn new(interloper: Interloper) -> Self {
        Self {
            inner: Arc::new(MemoryStore::new()),
            interloper,
            joined: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl DocumentStore for RacesTeardown {
    async fn get(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        self.inner.get(id).await
    }

    async fn create(&self, id: &str, state: GameState) -> Result<Snapshot, StoreError> {
        self.inner.create(id, state).await
    }

    async fn query_waiting_public(
        &self,
        grid_size: usize,
    ) -> Result<Option<(String, Snapshot)>, StoreError> {
        self.inner.query_waiting_public(grid_size).await
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        state: GameState,
    ) -> Result<Snapshot, StoreError> {
        self.inner.compare_and_swap(id, expected_version, state).await
    }

    async fn delete(&self, id: &str, expected_version: u64) -> Result<(), StoreError> {
        match self.interloper {
            Interloper::Join => {
                let joined = RemoteSession::join_by_id(self.inner.clone(), id, options())
                    .await
                    .map(|session| session.view().status.clone());
                *self.joined.lock().unwrap() = Some(joined);
            }
            Interloper::Touch => {
                let current = self.inner.get(id).await?.unwrap();
                self.inner
                    .compare_and_swap(id, current.version, current.state)
                    .await?;
            }
        }
        self.inner.delete(id, expected_version).await
    }

    async fn subscribe(&self, id: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(id).await
    }
}

#[tokio::test]
async fn abandoned_game_cannot_be_joined_during_teardown() {
    let store = Arc::new(RacesTeardown::new(Interloper::Join));
    let x = RemoteSession::start(store.clone(), Mode::Private, &public(), options())
        .await
        .unwrap();
    let id = x.game_id().to_string();
    x.teardown().await.unwrap();

    let joined = store.joined.lock().unwrap().take();
    assert_eq!(joined, Some(Err(Error::AlreadyInSession(id.clone()))));
    assert_eq!(store.get(&id).await.unwrap(), None);
}

#[tokio::test]
async fn teardown_keeps_a_game_written_after_it() {
    let store = Arc::new(RacesTeardown::new(Interloper::Touch));
    let x = RemoteSession::start(store.clone(), Mode::Private, &public(), options())
        .await
        .unwrap();
    let id = x.game_id().to_string();
    x.teardown().await.unwrap();

    let kept = store.get(&id).await.unwrap().unwrap();
    assert!(!kept.state.player_x_active);
    assert_eq!(kept.version, 3);
}
