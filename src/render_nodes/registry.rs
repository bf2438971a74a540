//! The node registry: name-keyed storage and lazy construction.
//!
//! Nodes register either as constructed instances or as constructors that
//! run on first lookup. Names are unique across both tables; registering a
//! taken name is a setup-time error. Lookups of unknown names are not
//! errors; they return `None` so callers can fall back to defaults.

use std::collections::HashMap;

use super::batch::BatcherId;
use super::camera_node::CameraRenderer;
use super::compositor::Compositor;
use super::stages::{Texturer, Tinter, Transformer};
use super::submitter::Submitter;
use std::rc::Rc;

/// A registered node, tagged by the role it fills.
///
/// Stage and pipeline nodes are shared immutable trait objects; batch
/// handlers are owned by the manager's batcher set and register here by
/// id, so the registry stays free of mutable GPU state.
#[derive(Clone)]
pub enum Node {
    Submitter(Rc<dyn Submitter>),
    Texturer(Rc<dyn Texturer>),
    Transformer(Rc<dyn Transformer>),
    Tinter(Rc<dyn Tinter>),
    Compositor(Rc<dyn Compositor>),
    Camera(Rc<dyn CameraRenderer>),
    Batcher(BatcherId),
}

impl Node {
    /// The role this node fills, for diagnostics.
    pub fn role(&self) -> &'static str {
        match self {
            Node::Submitter(_) => "submitter",
            Node::Texturer(_) => "texturer",
            Node::Transformer(_) => "transformer",
            Node::Tinter(_) => "tinter",
            Node::Compositor(_) => "compositor",
            Node::Camera(_) => "camera",
            Node::Batcher(_) => "batcher",
        }
    }
}

/// Errors raised by node registration.
///
/// These indicate a wiring mistake at setup time and are never recovered;
/// they propagate to whoever is configuring the pipeline.
#[derive(Debug)]
pub enum NodeError {
    /// A node instance is already registered under this name.
    DuplicateNode(String),
    /// A constructor is already registered under this name.
    DuplicateConstructor(String),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::DuplicateNode(name) => {
                write!(f, "render node '{}' is already registered", name)
            }
            NodeError::DuplicateConstructor(name) => {
                write!(f, "render node constructor '{}' is already registered", name)
            }
        }
    }
}

impl std::error::Error for NodeError {}

/// Deferred node construction, run on first lookup.
pub type NodeCtor = Box<dyn Fn() -> Node>;

/// Name → node mapping with a lazy constructor table.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Node>,
    ctors: HashMap<String, NodeCtor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructed node. Fails if the name is taken by either
    /// an instance or a constructor.
    pub fn add_node(&mut self, name: impl Into<String>, node: Node) -> Result<(), NodeError> {
        let name = name.into();
        if self.nodes.contains_key(&name) || self.ctors.contains_key(&name) {
            return Err(NodeError::DuplicateNode(name));
        }
        self.nodes.insert(name, node);
        Ok(())
    }

    /// Registers a constructor to run on first lookup of `name`. Fails if
    /// the name is taken.
    pub fn add_constructor(
        &mut self,
        name: impl Into<String>,
        ctor: NodeCtor,
    ) -> Result<(), NodeError> {
        let name = name.into();
        if self.nodes.contains_key(&name) || self.ctors.contains_key(&name) {
            return Err(NodeError::DuplicateConstructor(name));
        }
        self.ctors.insert(name, ctor);
        Ok(())
    }

    /// Looks up a node, constructing it from the constructor table on first
    /// request. Returns `None` when the name is neither constructed nor
    /// constructable.
    pub fn get(&mut self, name: &str) -> Option<&Node> {
        if !self.nodes.contains_key(name)
            && let Some(ctor) = self.ctors.remove(name)
        {
            log::debug!("constructing render node '{}' on first use", name);
            self.nodes.insert(name.to_string(), ctor());
        }
        self.nodes.get(name)
    }

    /// Whether `name` is known. With `constructed_only`, pending
    /// constructors don't count.
    pub fn has(&self, name: &str, constructed_only: bool) -> bool {
        self.nodes.contains_key(name) || (!constructed_only && self.ctors.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_nodes::compositor::ListCompositor;

    #[test]
    fn duplicate_instance_registration_fails() {
        let mut registry = NodeRegistry::new();
        registry
            .add_node("quad", Node::Batcher(BatcherId::Quad))
            .unwrap();

        let err = registry
            .add_node("quad", Node::Batcher(BatcherId::Quad))
            .unwrap_err();
        assert!(matches!(err, NodeError::DuplicateNode(ref name) if name == "quad"));
    }

    #[test]
    fn constructor_name_conflicts_with_instance_name() {
        let mut registry = NodeRegistry::new();
        registry
            .add_node("quad", Node::Batcher(BatcherId::Quad))
            .unwrap();
        assert!(
            registry
                .add_constructor("quad", Box::new(|| Node::Batcher(BatcherId::Quad)))
                .is_err()
        );

        registry
            .add_constructor("strip", Box::new(|| Node::Batcher(BatcherId::Strip)))
            .unwrap();
        assert!(
            registry
                .add_node("strip", Node::Batcher(BatcherId::Strip))
                .is_err()
        );
        assert!(
            registry
                .add_constructor("strip", Box::new(|| Node::Batcher(BatcherId::Strip)))
                .is_err()
        );
    }

    #[test]
    fn distinct_names_are_independently_retrievable() {
        let mut registry = NodeRegistry::new();
        registry
            .add_node("quad", Node::Batcher(BatcherId::Quad))
            .unwrap();
        registry
            .add_node("light", Node::Batcher(BatcherId::Light))
            .unwrap();

        assert!(matches!(
            registry.get("quad"),
            Some(Node::Batcher(BatcherId::Quad))
        ));
        assert!(matches!(
            registry.get("light"),
            Some(Node::Batcher(BatcherId::Light))
        ));
    }

    #[test]
    fn lookup_constructs_lazily_and_only_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();

        let mut registry = NodeRegistry::new();
        registry
            .add_constructor(
                "compositor",
                Box::new(move || {
                    counter.set(counter.get() + 1);
                    Node::Compositor(Rc::new(ListCompositor))
                }),
            )
            .unwrap();

        assert_eq!(runs.get(), 0);
        assert!(registry.get("compositor").is_some());
        assert!(registry.get("compositor").is_some());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn missing_names_are_absent_not_errors() {
        let mut registry = NodeRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(!registry.has("nope", false));
    }

    #[test]
    fn has_respects_the_constructed_only_flag() {
        let mut registry = NodeRegistry::new();
        registry
            .add_constructor("lazy", Box::new(|| Node::Batcher(BatcherId::TileSprite)))
            .unwrap();

        assert!(registry.has("lazy", false));
        assert!(!registry.has("lazy", true));

        registry.get("lazy");
        assert!(registry.has("lazy", true));
    }
}
