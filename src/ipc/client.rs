//! Sway IPC client — tree queries and event subscription.
//!
//! One connection per role: a command connection for `GET_TREE`, and a
//! dedicated connection that `SUBSCRIBE` turns into an [`EventStream`].

use std::io;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_io::Async;
use futures::StreamExt;
use swayipc_async::{Connection, EventType};

use super::IpcError;
use super::scene::{CompositorEvent, SceneNode};

/// Resolve the compositor socket, preferring an explicit override over
/// `$SWAYSOCK`.
pub fn resolve_socket_path(explicit: Option<&Path>) -> Result<PathBuf, IpcError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    std::env::var_os("SWAYSOCK")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or(IpcError::NoSocket)
}

/// Request/reply connection to the compositor.
pub struct SwayClient {
    conn: Connection,
}

impl SwayClient {
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        let stream = Async::<UnixStream>::connect(path)
            .await
            .map_err(|e| IpcError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self {
            conn: Connection::from(stream),
        })
    }

    /// Fetch a point-in-time snapshot of the scene graph.
    pub async fn get_tree(&mut self) -> Result<SceneNode, IpcError> {
        Ok(self.conn.get_tree().await?.into())
    }

    /// Subscribe to the given event families and hand the connection
    /// over to an [`EventStream`].
    pub async fn subscribe(self, events: &[EventType]) -> Result<EventStream, IpcError> {
        let inner = self.conn.subscribe(events).await?;
        tracing::debug!(?events, "subscribed to compositor events");
        Ok(EventStream {
            inner: Box::pin(inner),
        })
    }
}

/// Ordered stream of compositor events on a subscribed connection.
pub struct EventStream {
    inner: Pin<Box<swayipc_async::EventStream>>,
}

impl EventStream {
    /// Wait for the next window or workspace event. Returns `Ok(None)`
    /// when the compositor closes the connection.
    ///
    /// Cancel-safe: a partially read event stays buffered in the stream.
    pub async fn next_event(&mut self) -> Result<Option<CompositorEvent>, IpcError> {
        while let Some(event) = self.inner.next().await {
            match event {
                Ok(event) => {
                    if let Some(event) = CompositorEvent::from_event(event) {
                        return Ok(Some(event));
                    }
                }
                Err(swayipc_async::Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}
