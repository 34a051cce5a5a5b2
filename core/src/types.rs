use malloc_size_of_derive::MallocSizeOf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dense, per-corpus identifier for a node.
pub type NodeID = u32;

/// An identifier into the interned [string pool](crate::stringstorage::StringStorage).
///
/// ID `0` is reserved for the wildcard "any" value; real strings start at `1`.
pub type StringID = u32;

/// The reserved string ID that represents "any namespace/name/value".
pub const ANY_STRING_ID: StringID = 0;

/// A `(name, namespace)` pair identifying a distinct annotation key.
///
/// Orderd lexicographically on `(name, ns)` so range queries over `by_key` can
/// enumerate all namespaces of a name with a single range scan.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, MallocSizeOf,
)]
pub struct AnnoKey {
    pub name: StringID,
    pub ns: StringID,
}

impl AnnoKey {
    pub const fn wildcard() -> AnnoKey {
        AnnoKey {
            name: ANY_STRING_ID,
            ns: ANY_STRING_ID,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == ANY_STRING_ID && self.ns == ANY_STRING_ID
    }
}

/// An annotation key together with the interned value ID it holds for a given item.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, MallocSizeOf,
)]
pub struct Annotation {
    pub key: AnnoKey,
    pub val: StringID,
}

impl Annotation {
    pub fn is_wildcard(&self) -> bool {
        self.key.is_wildcard() && self.val == ANY_STRING_ID
    }
}

/// A directed edge between two nodes inside one graph storage / component.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, MallocSizeOf,
)]
pub struct Edge {
    pub source: NodeID,
    pub target: NodeID,
}

impl Edge {
    pub fn inverse(&self) -> Edge {
        Edge {
            source: self.target,
            target: self.source,
        }
    }
}

/// The different kinds of edge components a graph storage can belong to.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, MallocSizeOf,
)]
pub enum ComponentType {
    Coverage,
    InverseCoverage,
    Dominance,
    Pointing,
    Ordering,
    LeftToken,
    RightToken,
    PartOfSubcorpus,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ComponentType::Coverage => "Coverage",
            ComponentType::InverseCoverage => "InverseCoverage",
            ComponentType::Dominance => "Dominance",
            ComponentType::Pointing => "Pointing",
            ComponentType::Ordering => "Ordering",
            ComponentType::LeftToken => "LeftToken",
            ComponentType::RightToken => "RightToken",
            ComponentType::PartOfSubcorpus => "PartOfSubcorpus",
        };
        write!(f, "{}", name)
    }
}

/// A named, typed edge component. A graph storage belongs to exactly one component.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, MallocSizeOf,
)]
pub struct Component {
    pub ctype: ComponentType,
    pub layer: String,
    pub name: String,
}

impl Component {
    pub fn new(ctype: ComponentType, layer: impl Into<String>, name: impl Into<String>) -> Component {
        Component {
            ctype,
            layer: layer.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.ctype, self.layer, self.name)
    }
}

/// The built-in namespace used for all metadata annotations (`tok`, `node_name`, ...).
pub const ANNIS_NS: &str = "annis";
/// The annotation name that stores a node's human readable name.
pub const NODE_NAME: &str = "node_name";
/// The annotation name that, if present, marks a node as a token.
pub const TOK: &str = "tok";

lazy_static::lazy_static! {
    /// The built-in `LeftToken/annis/` component every corpus maintains.
    pub static ref LEFT_TOKEN_COMPONENT: Component = Component::new(ComponentType::LeftToken, ANNIS_NS, "");
    /// The built-in `RightToken/annis/` component every corpus maintains.
    pub static ref RIGHT_TOKEN_COMPONENT: Component = Component::new(ComponentType::RightToken, ANNIS_NS, "");
    /// The built-in `Coverage/annis/` component every corpus maintains.
    pub static ref COVERAGE_COMPONENT: Component = Component::new(ComponentType::Coverage, ANNIS_NS, "");
    /// The built-in `InverseCoverage/annis/` component every corpus maintains.
    pub static ref INVERSE_COVERAGE_COMPONENT: Component = Component::new(ComponentType::InverseCoverage, ANNIS_NS, "");
    /// The built-in `Ordering/annis/` component (no segmentation) every corpus maintains.
    pub static ref ORDERING_COMPONENT: Component = Component::new(ComponentType::Ordering, ANNIS_NS, "");
}

/// One matched query node: the concrete node and the annotation that satisfied the
/// node's predicate (a wildcard annotation if the node had no predicate).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Match {
    pub node: NodeID,
    pub anno: Annotation,
}

impl Match {
    pub fn new(node: NodeID, anno: Annotation) -> Match {
        Match { node, anno }
    }
}

/// A full result tuple, one [`Match`] per query node in declaration order.
pub type MatchGroup = Vec<Match>;
