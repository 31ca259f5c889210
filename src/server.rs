//! Serves a [`MemoryStore`] over TCP so separate processes can share games.

use std::sync::Arc;

use ron::error::SpannedError;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::message::{Error, Message, Notification, Request, Response};
use crate::store::{DocumentStore, MemoryStore};

// echo 'Request(Get("AB12CD"))' | nc localhost 6969
pub async fn run(listener: TcpListener, store: Arc<MemoryStore>) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "listening for connections");

    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "failed to accept connection");
                continue;
            }
        };
        debug!(%addr, "got connection");
        let store = Arc::clone(&store);

        tokio::spawn(async move {
            match serve(Connection::new(socket, addr), &store).await {
                Ok(()) => debug!(%addr, "connection closed"),
                Err(err) => warn!(%addr, %err, "connection dropped"),
            }
        });
    }
}

async fn serve(mut conn: Connection, store: &MemoryStore) -> anyhow::Result<()> {
    loop {
        let message = match conn.recv::<Message>().await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(err) if err.is::<SpannedError>() => {
                warn!(addr = %conn.addr, %err, "error reading message");
                conn.send(Error::InvalidMessage(err.to_string())).await?;
                continue;
            }
            Err(err) => return Err(err),
        };

        match message {
            Message::Disconnect => return Ok(()),
            Message::Request(Request::Subscribe(id)) => {
                return stream_snapshots(conn, store, &id).await
            }
            Message::Request(request) => {
                let response = handle(store, request).await;
                conn.send(Message::Response(response)).await?;
            }
            other => {
                conn.send(Error::InvalidMessage(format!("expected a request, got {other:?}")))
                    .await?
            }
        }
    }
}

async fn handle(store: &MemoryStore, request: Request) -> Result<Response, Error> {
    let response = match request {
        Request::Get(id) => Response::Record(store.get(&id).await?),
        Request::Create { id, state } => Response::Committed(store.create(&id, state).await?),
        Request::QueryWaitingPublic(grid_size) => {
            Response::Waiting(store.query_waiting_public(grid_size).await?)
        }
        Request::CompareAndSwap {
            id,
            expected_version,
            state,
        } => Response::Committed(store.compare_and_swap(&id, expected_version, state).await?),
        Request::Delete {
            id,
            expected_version,
        } => {
            store.delete(&id, expected_version).await?;
            Response::Ok
        }
        Request::Subscribe(_) => {
            return Err(Error::ServerError("subscriptions need their own connection".into()))
        }
    };
    Ok(response)
}

/// Pushes every change of one record until it is deleted or the client goes
/// away.
async fn stream_snapshots(
    mut conn: Connection,
    store: &MemoryStore,
    id: &str,
) -> anyhow::Result<()> {
    let mut subscription = match store.subscribe(id).await {
        Ok(subscription) => subscription,
        Err(err) => {
            conn.send(Error::from(err)).await?;
            return Ok(());
        }
    };
    conn.send(Response::Subscribed).await?;
    info!(addr = %conn.addr, game_id = id, "subscriber attached");

    loop {
        tokio::select! {
            snapshot = subscription.next() => {
                let Some(snapshot) = snapshot else { return Ok(()) };
                let removed = snapshot.is_none();
                conn.send(Notification::Snapshot(snapshot)).await?;
                if removed {
                    return Ok(());
                }
            }
            incoming = conn.recv::<Message>() => match incoming {
                Ok(None) | Ok(Some(Message::Disconnect)) => {
                    info!(addr = %conn.addr, game_id = id, "subscriber detached");
                    return Ok(());
                }
                Ok(Some(_)) => debug!(addr = %conn.addr, "ignoring message on subscription"),
                Err(err) => return Err(err),
            }
        }
    }
}
