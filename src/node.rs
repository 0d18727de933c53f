//! Host-visible audio endpoints.

/// Direction of audio flow.
///
/// `Both` only describes nodes (a duplex device); a flux is always either
/// `In` or `Out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Direction unknown or not applicable.
    #[default]
    None,
    /// Capture: audio flows from the host into the application.
    In,
    /// Playback: audio flows from the application into the host.
    Out,
    /// Duplex endpoint (nodes only).
    Both,
}

impl Direction {
    /// Returns true if this direction covers capture.
    #[must_use]
    pub fn has_input(self) -> bool {
        matches!(self, Self::In | Self::Both)
    }

    /// Returns true if this direction covers playback.
    #[must_use]
    pub fn has_output(self) -> bool {
        matches!(self, Self::Out | Self::Both)
    }
}

/// A host-discovered audio endpoint (device, sink, source, monitor).
///
/// `id` is stable for the lifetime of the [`Engine`](crate::Engine) that
/// produced it; nothing is guaranteed across engines or backends. `name`
/// is the human-readable description shown in UIs.
///
/// Node lists returned by [`Engine::nodes`](crate::Engine::nodes) are
/// owned snapshots: later hot-plug events never mutate a list you already
/// hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Backend-stable identifier, usable as [`FluxConfig::node`](crate::FluxConfig::node).
    pub id: String,
    /// Human-readable description.
    pub name: String,
    /// What the endpoint can do.
    pub direction: Direction,
}

impl Node {
    /// Creates a node from its parts.
    pub fn new(id: impl Into<String>, name: impl Into<String>, direction: Direction) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_capabilities() {
        assert!(Direction::In.has_input());
        assert!(Direction::Both.has_input());
        assert!(Direction::Both.has_output());
        assert!(!Direction::Out.has_input());
        assert!(!Direction::None.has_output());
    }

    #[test]
    fn test_node_snapshots_are_disjoint() {
        let original = Node::new("hw:0", "Built-in Audio", Direction::Both);
        let mut copy = original.clone();
        copy.name.push_str(" (modified)");
        assert_eq!(original.name, "Built-in Audio");
    }
}
