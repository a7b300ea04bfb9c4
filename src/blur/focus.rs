//! Focus classification — does any window show on an output?

use crate::ipc::{NodeType, SceneNode};

/// Whether any container or floating container below `root` (or `root`
/// itself) is visible.
///
/// Depth-first in child order, stopping at the first visible container.
pub fn is_descendant_focused(root: &SceneNode) -> bool {
    match find_visible(root) {
        Some(node) => {
            tracing::debug!(node = node.name(), "visible node");
            true
        }
        None => false,
    }
}

fn find_visible(node: &SceneNode) -> Option<&SceneNode> {
    if matches!(node.node_type, NodeType::Con | NodeType::FloatingCon) && node.is_visible() {
        return Some(node);
    }
    node.children.iter().find_map(find_visible)
}

/// Per-output blur signal for every real output in a tree snapshot.
///
/// Sway's internal pseudo-outputs (`__i3`, holding the scratchpad) are
/// skipped.
pub fn output_signals(root: &SceneNode) -> Vec<(String, bool)> {
    root.children
        .iter()
        .filter(|node| node.node_type == NodeType::Output)
        .filter(|node| !node.name().starts_with("__"))
        .map(|output| {
            tracing::debug!(output = output.name(), "checking output");
            (output.name().to_string(), is_descendant_focused(output))
        })
        .collect()
}
