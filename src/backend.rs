use std::fmt;

/// What a node is, as far as reconciliation cares.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind<'n> {
    Element { tag: &'n str },
    Text,
}

/// The tree operations the engine needs from whatever presents its output.
///
/// Nodes are addressed by cheap copyable handles. Parsed and cloned nodes
/// start out detached; a detached subtree that is no longer needed must be
/// given back with [`RenderBackend::release`].
///
/// Operations on a handle the backend no longer knows are no-ops, and
/// queries on one return empty results.
pub trait RenderBackend {
    type Handle: Copy + Eq + fmt::Debug;

    /// Parses `markup` into detached top-level nodes, in document order.
    fn parse_fragment(&mut self, markup: &str) -> Vec<Self::Handle>;

    fn kind(&self, node: Self::Handle) -> Option<NodeKind<'_>>;

    /// Attribute `(name, value)` pairs of an element, in stored order.
    fn attributes(&self, node: Self::Handle) -> Vec<(String, String)>;

    fn attribute(&self, node: Self::Handle, name: &str) -> Option<&str>;

    fn set_attribute(&mut self, node: Self::Handle, name: &str, value: &str);

    fn remove_attribute(&mut self, node: Self::Handle, name: &str);

    /// The content of a text node. `None` for elements.
    fn text(&self, node: Self::Handle) -> Option<&str>;

    fn set_text(&mut self, node: Self::Handle, text: &str);

    fn children(&self, node: Self::Handle) -> Vec<Self::Handle>;

    /// A detached deep copy of `node`.
    fn deep_clone(&mut self, node: Self::Handle) -> Self::Handle;

    /// Appends the detached `child` as the last child of `parent`.
    fn append_child(&mut self, parent: Self::Handle, child: Self::Handle);

    /// Puts the detached `new` where `old` is and releases `old`. If `old`
    /// has no parent, `old` is released and `new` stays detached.
    fn replace(&mut self, old: Self::Handle, new: Self::Handle);

    /// Detaches `node` from its parent and releases it.
    fn remove(&mut self, node: Self::Handle);

    /// Frees a detached subtree.
    fn release(&mut self, node: Self::Handle);
}
