//! Test helpers for standing in for sway on a Unix socket.
//!
//! Frames follow sway's wire format: `"i3-ipc"`, payload length (LE u32),
//! message type (LE u32), JSON payload.

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

const MAGIC: &[u8; 6] = b"i3-ipc";

pub const SUBSCRIBE: u32 = 2;
pub const GET_TREE: u32 = 4;
pub const WORKSPACE_EVENT: u32 = 0x8000_0000;
pub const WINDOW_EVENT: u32 = 0x8000_0003;

/// Read one request frame. Returns `None` once the peer hangs up.
pub async fn read_frame(stream: &mut UnixStream) -> Option<(u32, Vec<u8>)> {
    let mut header = [0u8; 14];
    stream.read_exact(&mut header).await.ok()?;
    assert_eq!(&header[..6], MAGIC);
    let len = u32::from_le_bytes(header[6..10].try_into().unwrap()) as usize;
    let kind = u32::from_le_bytes(header[10..14].try_into().unwrap());
    let mut payload = vec![0; len];
    stream.read_exact(&mut payload).await.ok()?;
    Some((kind, payload))
}

pub async fn write_frame(stream: &mut UnixStream, kind: u32, payload: &[u8]) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(14 + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&kind.to_le_bytes());
    buf.extend_from_slice(payload);
    stream.write_all(&buf).await
}

/// A complete `GET_TREE` node, with every field sway always sends.
pub fn node(kind: &str, name: &str, visible: bool, nodes: Vec<Value>) -> Value {
    let rect = json!({"x": 0, "y": 0, "width": 1920, "height": 1080});
    json!({
        "id": 1,
        "name": name,
        "type": kind,
        "border": "none",
        "current_border_width": 0,
        "layout": "splith",
        "orientation": "horizontal",
        "percent": 1.0,
        "rect": rect,
        "window_rect": rect,
        "deco_rect": rect,
        "geometry": rect,
        "urgent": false,
        "sticky": false,
        "marks": [],
        "focused": false,
        "focus": [],
        "fullscreen_mode": 0,
        "visible": visible,
        "nodes": nodes,
        "floating_nodes": [],
    })
}

pub fn with_floating(mut node: Value, floating: Vec<Value>) -> Value {
    node["floating_nodes"] = Value::Array(floating);
    node
}

/// Root with one workspace per output holding a single container whose
/// visibility is given.
pub fn tree(outputs: &[(&str, bool)]) -> Value {
    let outputs = outputs
        .iter()
        .map(|(name, visible)| {
            node(
                "output",
                name,
                false,
                vec![node(
                    "workspace",
                    "1",
                    false,
                    vec![node("con", "term", *visible, vec![])],
                )],
            )
        })
        .collect();
    node("root", "root", false, outputs)
}

pub fn window_event(change: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "change": change,
        "container": node("con", "term", true, vec![]),
    }))
    .unwrap()
}

pub fn workspace_event() -> Vec<u8> {
    br#"{"change":"focus","current":null,"old":null}"#.to_vec()
}
