//! An in-memory node tree implementing [`RenderBackend`].
//!
//! Nodes live in a generational arena, so a [`NodeId`] keeps naming the same
//! node for as long as that node exists and never aliases a later one.
//! Markup is tokenized with `html5gum`.

use html5gum::{State as TokenizerState, Token, Tokenizer};
use indexmap::IndexMap;

use crate::backend::{NodeKind, RenderBackend};

/// HTML void elements that cannot have children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeData {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
pub struct Dom {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id)?.parent
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let entry = Entry {
            data,
            parent: None,
            children: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index) {
                slot.entry = Some(entry);
                return NodeId {
                    index,
                    generation: slot.generation,
                };
            }
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)?
            .entry
            .as_ref()
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?
            .entry
            .as_mut()
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.entry_mut(id).and_then(|entry| entry.parent.take()) else {
            return;
        };
        if let Some(parent) = self.entry_mut(parent) {
            parent.children.retain(|child| *child != id);
        }
    }

    /// Frees `id` and everything below it. Does not touch the parent's list.
    fn free_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(slot) = self
                .slots
                .get_mut(id.index)
                .filter(|slot| slot.generation == id.generation)
            else {
                continue;
            };
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                pending.extend(entry.children);
            }
        }
    }

    /// Appends text to `parent`, merging with a trailing text child.
    fn push_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        let last = self
            .entry(parent)
            .and_then(|entry| entry.children.last().copied());
        if let Some(last) = last {
            if let Some(Entry {
                data: NodeData::Text(existing),
                ..
            }) = self.entry_mut(last)
            {
                existing.push_str(text);
                return;
            }
        }
        let child = self.create_text(text);
        self.append_child(parent, child);
    }

    /// Serializes `id` and its subtree as markup.
    ///
    /// ```
    /// use reweave::{Dom, RenderBackend};
    ///
    /// let mut dom = Dom::new();
    /// let roots = dom.parse_fragment(r#"<p class="x">a &amp; b<br></p>"#);
    /// assert_eq!(dom.outer_html(roots[0]), r#"<p class="x">a &amp; b<br></p>"#);
    /// ```
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, false, &mut out);
        out
    }

    /// The concatenated text of `id` and all its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(entry) = self.entry(id) else {
                continue;
            };
            match &entry.data {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element { .. } => pending.extend(entry.children.iter().rev()),
            }
        }
        out
    }

    fn write_html(&self, id: NodeId, raw_text: bool, out: &mut String) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        match &entry.data {
            NodeData::Text(text) if raw_text => out.push_str(text),
            NodeData::Text(text) => escape_text_into(text, out),
            NodeData::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attribute_into(value, out);
                    out.push('"');
                }
                out.push('>');
                if is_void_element(tag) {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
                for child in &entry.children {
                    self.write_html(*child, raw, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape_text_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

fn escape_attribute_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

impl RenderBackend for Dom {
    type Handle = NodeId;

    fn parse_fragment(&mut self, markup: &str) -> Vec<NodeId> {
        let mut tokenizer = Tokenizer::new(markup);
        let mut stack: Vec<NodeId> = Vec::new();
        let mut roots: Vec<NodeId> = Vec::new();

        while let Some(Ok(token)) = tokenizer.next() {
            match token {
                Token::StartTag(tag) => {
                    let name = String::from_utf8_lossy(&tag.name).to_ascii_lowercase();
                    let element = self.create_element(&name);
                    for (key, value) in tag.attributes.iter() {
                        self.set_attribute(
                            element,
                            &String::from_utf8_lossy(key),
                            &String::from_utf8_lossy(value),
                        );
                    }

                    match stack.last() {
                        Some(parent) => self.append_child(*parent, element),
                        None => roots.push(element),
                    }

                    if !(tag.self_closing || is_void_element(&name)) {
                        match name.as_str() {
                            "script" | "style" => tokenizer.set_state(TokenizerState::ScriptData),
                            "textarea" | "title" => tokenizer.set_state(TokenizerState::RcData),
                            _ => {}
                        }
                        stack.push(element);
                    }
                }
                Token::EndTag(tag) => {
                    let end_name = String::from_utf8_lossy(&tag.name).to_ascii_lowercase();
                    let matching = stack.iter().rposition(|id| {
                        matches!(self.kind(*id), Some(NodeKind::Element { tag }) if tag == end_name)
                    });
                    // Unmatched end tags are ignored.
                    if let Some(index) = matching {
                        stack.truncate(index);
                    }
                }
                Token::String(text) => {
                    let text = String::from_utf8_lossy(&text);
                    match stack.last() {
                        Some(parent) => self.push_text(*parent, &text),
                        None => {
                            let merged = roots.last().copied().and_then(|last| {
                                match self.entry_mut(last) {
                                    Some(Entry {
                                        data: NodeData::Text(existing),
                                        ..
                                    }) => {
                                        existing.push_str(&text);
                                        Some(())
                                    }
                                    Some(_) | None => None,
                                }
                            });
                            if merged.is_none() {
                                roots.push(self.create_text(&text));
                            }
                        }
                    }
                }
                Token::Doctype(_) | Token::Comment(_) | Token::Error(_) => {}
            }
        }

        roots
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind<'_>> {
        Some(match &self.entry(node)?.data {
            NodeData::Element { tag, .. } => NodeKind::Element { tag },
            NodeData::Text(_) => NodeKind::Text,
        })
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        match self.entry(node).map(|entry| &entry.data) {
            Some(NodeData::Element { attributes, .. }) => attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            Some(NodeData::Text(_)) | None => Vec::new(),
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.entry(node)?.data {
            NodeData::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(Entry {
            data: NodeData::Element { attributes, .. },
            ..
        }) = self.entry_mut(node)
        {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(Entry {
            data: NodeData::Element { attributes, .. },
            ..
        }) = self.entry_mut(node)
        {
            attributes.shift_remove(name);
        }
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match &self.entry(node)?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(Entry {
            data: NodeData::Text(existing),
            ..
        }) = self.entry_mut(node)
        {
            text.clone_into(existing);
        }
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.entry(node)
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    fn deep_clone(&mut self, node: NodeId) -> NodeId {
        let Some(entry) = self.entry(node) else {
            return node;
        };
        let data = entry.data.clone();
        let children = entry.children.clone();
        let copy = self.alloc(data);
        for child in children {
            let child_copy = self.deep_clone(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return;
        }
        self.detach(child);
        if let Some(entry) = self.entry_mut(child) {
            entry.parent = Some(parent);
        }
        if let Some(entry) = self.entry_mut(parent) {
            entry.children.push(child);
        }
    }

    fn replace(&mut self, old: NodeId, new: NodeId) {
        if old == new || !self.contains(new) {
            return;
        }
        self.detach(new);
        if let Some(parent) = self.parent(old) {
            if let Some(entry) = self.entry_mut(parent) {
                if let Some(position) = entry.children.iter().position(|child| *child == old) {
                    if let Some(slot) = entry.children.get_mut(position) {
                        *slot = new;
                    }
                }
            }
            if let Some(entry) = self.entry_mut(new) {
                entry.parent = Some(parent);
            }
        }
        self.free_subtree(old);
    }

    fn remove(&mut self, node: NodeId) {
        self.detach(node);
        self.free_subtree(node);
    }

    fn release(&mut self, node: NodeId) {
        self.remove(node);
    }
}
