//! Compositor IPC — sway's socket, driven through `swayipc_async`.

pub mod client;
pub mod scene;
#[cfg(test)]
pub mod testing;

use std::path::PathBuf;

pub use client::{SwayClient, resolve_socket_path};
pub use scene::{CompositorEvent, NodeType, SceneNode};

/// Compositor IPC errors.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("$SWAYSOCK is not set")]
    NoSocket,
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("sway IPC: {0}")]
    Sway(#[from] swayipc_async::Error),
}
