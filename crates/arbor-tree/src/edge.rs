//! Dependency edges

use crate::arena::{EdgeId, NodeId};
use crate::override_set::OverrideSet;
use std::fmt;

/// How a dependency was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeType {
    Prod,
    Dev,
    Optional,
    Peer,
    PeerOptional,
    Workspace,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Dev => "dev",
            Self::Optional => "optional",
            Self::Peer => "peer",
            Self::PeerOptional => "peerOptional",
            Self::Workspace => "workspace",
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional | Self::PeerOptional)
    }

    pub fn is_peer(&self) -> bool {
        matches!(self, Self::Peer | Self::PeerOptional)
    }

    pub fn is_workspace(&self) -> bool {
        matches!(self, Self::Workspace)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an edge is not satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeError {
    /// Nothing resolves for a non-optional dependency.
    Missing,
    /// A peer dependency satisfied by the dependent's own child.
    PeerLocal,
    /// Something resolves but does not satisfy the spec.
    Invalid,
    /// The edge no longer has a source node.
    Detached,
}

impl EdgeError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "MISSING",
            Self::PeerLocal => "PEER LOCAL",
            Self::Invalid => "INVALID",
            Self::Detached => "DETACHED",
        }
    }
}

impl fmt::Display for EdgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared dependency from one node to whatever currently resolves for
/// its name.
///
/// Edges are owned by the arena; `from` is cleared when the edge is
/// detached, after which it is never resolved again. Validity depends on the
/// current shape of the tree and is computed by
/// [`Arena::edge_error`](crate::Arena::edge_error).
#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) from: Option<NodeId>,
    pub(crate) to: Option<NodeId>,
    pub(crate) edge_type: EdgeType,
    pub(crate) name: String,
    pub(crate) spec: String,
    pub(crate) accept: Option<String>,
    pub(crate) overrides: Option<OverrideSet>,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn from(&self) -> Option<NodeId> {
        self.from
    }

    pub fn to(&self) -> Option<NodeId> {
        self.to
    }

    pub fn edge_type(&self) -> EdgeType {
        self.edge_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The spec as declared, before overrides.
    pub fn raw_spec(&self) -> &str {
        &self.spec
    }

    /// An alternative spec from `acceptDependencies`.
    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    pub fn overrides(&self) -> Option<&OverrideSet> {
        self.overrides.as_ref()
    }

    pub fn is_detached(&self) -> bool {
        self.from.is_none()
    }

    pub fn dev(&self) -> bool {
        self.edge_type.is_dev()
    }

    pub fn optional(&self) -> bool {
        self.edge_type.is_optional()
    }

    pub fn peer(&self) -> bool {
        self.edge_type.is_peer()
    }

    pub fn workspace(&self) -> bool {
        self.edge_type.is_workspace()
    }
}
