//! In-place patching of a live node tree against a freshly rendered one.
//!
//! # Algorithm
//!
//! 1. Nodes of a different category (element vs. text), or elements with a
//!    different tag, are replaced wholesale by a deep copy of the fresh node.
//!    This is the only destructive step.
//! 2. Elements get their attribute sets patched: attributes missing from the
//!    fresh node are removed, new or changed ones are set.
//! 3. Text nodes get their content overwritten when it differs.
//! 4. Children are matched strictly by position. Extra live children are
//!    removed from the end; extra fresh children are copied and appended.
//!
//! There is no key-based matching. Inserting into the middle of a list makes
//! every later sibling compare against its new neighbour, which usually means
//! patching (or replacing) each of them.

use crate::backend::{NodeKind, RenderBackend};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Shape {
    Same,
    Different,
    LiveGone,
}

/// Patches `live` so it matches `fresh`. `fresh` is only read.
///
/// Returns the node now standing where `live` stood: `live` itself, unless
/// it had to be replaced. A stale `live` yields a detached copy of `fresh`.
pub fn reconcile<B: RenderBackend>(backend: &mut B, live: B::Handle, fresh: B::Handle) -> B::Handle {
    let shape = match (backend.kind(live), backend.kind(fresh)) {
        (Some(NodeKind::Text), Some(NodeKind::Text)) => Shape::Same,
        (Some(NodeKind::Element { tag: a }), Some(NodeKind::Element { tag: b })) if a == b => {
            Shape::Same
        }
        (Some(_), Some(_)) => Shape::Different,
        (None, Some(_)) => Shape::LiveGone,
        (_, None) => return live,
    };

    if shape == Shape::LiveGone {
        return backend.deep_clone(fresh);
    }
    if shape == Shape::Different {
        tracing::trace!(?live, ?fresh, "replacing node");
        let copy = backend.deep_clone(fresh);
        backend.replace(live, copy);
        return copy;
    }

    if let Some(text) = backend.text(fresh).map(str::to_string) {
        if backend.text(live) != Some(text.as_str()) {
            backend.set_text(live, &text);
        }
        return live;
    }

    patch_attributes(backend, live, fresh);
    patch_children(backend, live, fresh);
    live
}

fn patch_attributes<B: RenderBackend>(backend: &mut B, live: B::Handle, fresh: B::Handle) {
    let fresh_attributes = backend.attributes(fresh);

    for (name, _) in backend.attributes(live) {
        if !fresh_attributes.iter().any(|(fresh_name, _)| *fresh_name == name) {
            backend.remove_attribute(live, &name);
        }
    }

    for (name, value) in &fresh_attributes {
        if backend.attribute(live, name) != Some(value.as_str()) {
            backend.set_attribute(live, name, value);
        }
    }
}

fn patch_children<B: RenderBackend>(backend: &mut B, live: B::Handle, fresh: B::Handle) {
    let live_children = backend.children(live);
    let fresh_children = backend.children(fresh);

    let mut live_iter = live_children.into_iter();
    let mut fresh_iter = fresh_children.into_iter();
    loop {
        match (live_iter.next(), fresh_iter.next()) {
            (Some(live_child), Some(fresh_child)) => {
                reconcile(backend, live_child, fresh_child);
            }
            (Some(live_child), None) => backend.remove(live_child),
            (None, Some(fresh_child)) => {
                let copy = backend.deep_clone(fresh_child);
                backend.append_child(live, copy);
            }
            (None, None) => break,
        }
    }
}
