//! [`DocumentStore`] client for a store served by [`crate::server::run`].

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::message::{Message, Notification, Request, Response};
use crate::store::{DocumentStore, GameState, Snapshot, StoreError, Subscription};

fn transport(err: anyhow::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn unexpected(reply: impl std::fmt::Debug) -> StoreError {
    StoreError::Transport(format!("unexpected reply {reply:?}"))
}

/// Opens one connection per request, plus one per subscription.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    addr: String,
}

impl RemoteStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn open(&self, request: Request) -> Result<(Connection, Response), StoreError> {
        let mut conn = Connection::connect(&self.addr).await.map_err(transport)?;
        conn.send(request).await.map_err(transport)?;
        match conn.recv::<Message>().await.map_err(transport)? {
            Some(Message::Response(Ok(response))) => Ok((conn, response)),
            Some(Message::Response(Err(err))) => Err(err.into()),
            Some(other) => Err(unexpected(other)),
            None => Err(StoreError::Transport("connection closed by store".into())),
        }
    }

    async fn request(&self, request: Request) -> Result<Response, StoreError> {
        let (mut conn, response) = self.open(request).await?;
        if let Err(err) = conn.send(Message::Disconnect).await {
            debug!(%err, "store hung up before disconnect");
        }
        Ok(response)
    }
}

#[async_trait]
impl DocumentStore for RemoteStore {
    async fn get(&self, id: &str) -> Result<Option<Snapshot>, StoreError> {
        match self.request(Request::Get(id.to_string())).await? {
            Response::Record(snapshot) => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    async fn create(&self, id: &str, state: GameState) -> Result<Snapshot, StoreError> {
        let request = Request::Create {
            id: id.to_string(),
            state,
        };
        match self.request(request).await? {
            Response::Committed(snapshot) => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    async fn query_waiting_public(
        &self,
        grid_size: usize,
    ) -> Result<Option<(String, Snapshot)>, StoreError> {
        match self.request(Request::QueryWaitingPublic(grid_size)).await? {
            Response::Waiting(found) => Ok(found),
            other => Err(unexpected(other)),
        }
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected_version: u64,
        state: GameState,
    ) -> Result<Snapshot, StoreError> {
        let request = Request::CompareAndSwap {
            id: id.to_string(),
            expected_version,
            state,
        };
        match self.request(request).await? {
            Response::Committed(snapshot) => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, id: &str, expected_version: u64) -> Result<(), StoreError> {
        let request = Request::Delete {
            id: id.to_string(),
            expected_version,
        };
        match self.request(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn subscribe(&self, id: &str) -> Result<Subscription, StoreError> {
        let (mut conn, response) = self.open(Request::Subscribe(id.to_string())).await?;
        if !matches!(response, Response::Subscribed) {
            return Err(unexpected(response));
        }

        let first = match conn.recv::<Message>().await.map_err(transport)? {
            Some(Message::Notification(Notification::Snapshot(snapshot))) => snapshot,
            Some(other) => return Err(unexpected(other)),
            None => return Err(StoreError::Transport("subscription closed by store".into())),
        };

        let (tx, rx) = watch::channel(first);
        let game_id = id.to_string();
        let task = tokio::spawn(async move {
            loop {
                match conn.recv::<Message>().await {
                    Ok(Some(Message::Notification(Notification::Snapshot(snapshot)))) => {
                        let removed = snapshot.is_none();
                        tx.send_replace(snapshot);
                        if removed {
                            break;
                        }
                    }
                    Ok(Some(other)) => debug!(%game_id, ?other, "ignoring non-notification"),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%game_id, %err, "subscription feed failed");
                        break;
                    }
                }
            }
        });
        Ok(Subscription::with_task(rx, task))
    }
}
