//! Scene-graph snapshot and the compositor events the daemon reacts to.
//!
//! Projections of the `swayipc_async` reply types, reduced to what focus
//! classification and event filtering read.

use swayipc_async::{Event, Node, WindowChange};

/// Scene-graph node type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Root,
    Output,
    Workspace,
    Con,
    FloatingCon,
    Other,
}

impl From<swayipc_async::NodeType> for NodeType {
    fn from(kind: swayipc_async::NodeType) -> Self {
        use swayipc_async::NodeType as Sway;
        match kind {
            Sway::Root => Self::Root,
            Sway::Output => Self::Output,
            Sway::Workspace => Self::Workspace,
            Sway::Con => Self::Con,
            Sway::FloatingCon => Self::FloatingCon,
            _ => Self::Other,
        }
    }
}

/// A node in the compositor's scene graph.
///
/// `children` holds tiled children followed by floating ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneNode {
    pub node_type: NodeType,
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub children: Vec<SceneNode>,
}

impl From<Node> for SceneNode {
    fn from(node: Node) -> Self {
        let children = node
            .nodes
            .into_iter()
            .chain(node.floating_nodes)
            .map(SceneNode::from)
            .collect();
        Self {
            node_type: node.node_type.into(),
            name: node.name,
            visible: node.visible,
            children,
        }
    }
}

impl SceneNode {
    #[cfg(test)]
    pub fn new(node_type: NodeType, name: &str, visible: bool, children: Vec<SceneNode>) -> Self {
        Self {
            node_type,
            name: Some(name.to_string()),
            visible: Some(visible),
            children,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.unwrap_or(false)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Compositor events the daemon reacts to.
#[derive(Debug)]
pub enum CompositorEvent {
    Window(WindowChange),
    Workspace,
}

impl CompositorEvent {
    /// Keep window and workspace events; anything else is `None`.
    pub fn from_event(event: Event) -> Option<Self> {
        match event {
            Event::Window(ev) => Some(Self::Window(ev.change)),
            Event::Workspace(_) => Some(Self::Workspace),
            _ => None,
        }
    }

    /// Whether the event can change which outputs have a visible window.
    /// Title changes are the only window change that cannot.
    pub fn triggers_recheck(&self) -> bool {
        !matches!(self, Self::Window(WindowChange::Title))
    }
}
