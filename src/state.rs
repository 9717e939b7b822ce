//! Observable state.
//!
//! An [`Observable`] is a handle onto a shared JSON store plus a path into
//! it. The root handle addresses the whole mapping; [`Observable::child`]
//! and [`Observable::index`] hand out handles for nested mappings and
//! sequences. Handles are created on every call, so two reads of the same
//! nested mapping give distinct handles that behave identically.
//!
//! Every write that changes a value notifies the store's listeners exactly
//! once, synchronously, before the write returns. Writes of an equal value
//! are silent; numbers compare by value, so `1.0` over `1` is equal. There is
//! no batching.
//!
//! Merges through the root handle pass through the store's middleware first.
//! Each middleware maps `(next, old)` to a new `next`. A failing middleware
//! is reported to the store's diagnostic sink and skipped.
//!
//! Listeners run with no borrow of the store held, so a listener may write
//! back into the state. That write notifies again, nested inside the outer
//! one. A listener that always writes a new value recurses without bound;
//! nothing here stops it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};

/// A mapping from string keys to JSON values.
pub type State = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener = Rc<dyn Fn()>;
type Middleware = Rc<dyn Fn(&State, &State) -> Result<State, String>>;

struct Store {
    /// Always a `Value::Object` at the root.
    value: RefCell<Value>,
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
    next_id: Cell<u64>,
    middleware: RefCell<Vec<Middleware>>,
    sink: RefCell<Rc<dyn DiagnosticSink>>,
}

#[derive(Clone)]
pub struct Observable {
    store: Rc<Store>,
    path: Vec<PathSegment>,
}

fn resolve<'v>(mut value: &'v Value, path: &[PathSegment]) -> Option<&'v Value> {
    for segment in path {
        value = match segment {
            PathSegment::Key(key) => value.get(key.as_str())?,
            PathSegment::Index(index) => value.get(*index)?,
        };
    }
    Some(value)
}

/// Equality where numbers compare by value.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, x)| y.get(key).is_some_and(|y| same_value(x, y)))
        }
        (a, b) => a == b,
    }
}

fn resolve_mut<'v>(mut value: &'v mut Value, path: &[PathSegment]) -> Option<&'v mut Value> {
    for segment in path {
        value = match segment {
            PathSegment::Key(key) => value.get_mut(key.as_str())?,
            PathSegment::Index(index) => value.get_mut(*index)?,
        };
    }
    Some(value)
}

/// Wraps `state` so that `on_change` runs once per changing write.
///
/// ```
/// use std::{cell::Cell, rc::Rc};
/// use serde_json::json;
///
/// let calls = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&calls);
/// let state = json!({ "count": 1 }).as_object().cloned().unwrap();
/// let observable = reweave::wrap(state, move || counter.set(counter.get() + 1));
///
/// observable.set("count", 1);
/// assert_eq!(calls.get(), 0);
/// observable.set("count", 2);
/// assert_eq!(calls.get(), 1);
/// ```
pub fn wrap(state: State, on_change: impl Fn() + 'static) -> Observable {
    let observable = Observable::new(state);
    observable.subscribe(on_change);
    observable
}

impl Observable {
    pub fn new(state: State) -> Self {
        Self {
            store: Rc::new(Store {
                value: RefCell::new(Value::Object(state)),
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                middleware: RefCell::new(Vec::new()),
                sink: RefCell::new(Rc::new(TracingSink)),
            }),
            path: Vec::new(),
        }
    }

    /// The path of this handle from the root of the store.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Whether two handles share the same backing store.
    pub fn same_store(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    /// A copy of the value this handle points at, or `None` if the path no
    /// longer resolves.
    pub fn value(&self) -> Option<Value> {
        resolve(&self.store.value.borrow(), &self.path).cloned()
    }

    /// A copy of the mapping this handle points at. Empty if the handle does
    /// not point at a mapping.
    pub fn snapshot(&self) -> State {
        match resolve(&self.store.value.borrow(), &self.path) {
            Some(Value::Object(map)) => map.clone(),
            Some(_) | None => State::new(),
        }
    }

    /// A copy of the value under `key` in this mapping.
    pub fn get(&self, key: &str) -> Option<Value> {
        resolve(&self.store.value.borrow(), &self.path)?
            .as_object()?
            .get(key)
            .cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        resolve(&self.store.value.borrow(), &self.path)
            .and_then(Value::as_object)
            .is_some_and(|map| map.contains_key(key))
    }

    fn descend(&self, segment: PathSegment) -> Option<Self> {
        let mut path = self.path.clone();
        path.push(segment);
        let nested = matches!(
            resolve(&self.store.value.borrow(), &path),
            Some(Value::Object(_) | Value::Array(_))
        );
        nested.then(|| Self {
            store: Rc::clone(&self.store),
            path,
        })
    }

    /// A handle for the mapping or sequence under `key`. `None` for scalars
    /// and missing keys.
    pub fn child(&self, key: &str) -> Option<Self> {
        self.descend(PathSegment::Key(key.to_string()))
    }

    /// A handle for the mapping or sequence at `index` of this sequence.
    pub fn index(&self, index: usize) -> Option<Self> {
        self.descend(PathSegment::Index(index))
    }

    /// Writes `value` under `key`, notifying listeners if it changed.
    ///
    /// Returns whether anything changed. Writing through a handle whose path
    /// no longer resolves to a mapping is a silent no-op.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let changed = {
            let mut root = self.store.value.borrow_mut();
            match resolve_mut(&mut root, &self.path).and_then(Value::as_object_mut) {
                Some(map) if !map.get(key).is_some_and(|old| same_value(old, &value)) => {
                    map.insert(key.to_string(), value);
                    true
                }
                Some(_) | None => false,
            }
        };
        if changed {
            self.notify();
        }
        changed
    }

    /// Writes `value` at `index` of this sequence. `index == len` appends.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> bool {
        let value = value.into();
        let changed = {
            let mut root = self.store.value.borrow_mut();
            match resolve_mut(&mut root, &self.path).and_then(Value::as_array_mut) {
                Some(items) if index == items.len() => {
                    items.push(value);
                    true
                }
                Some(items) => match items.get_mut(index) {
                    Some(slot) if !same_value(slot, &value) => {
                        *slot = value;
                        true
                    }
                    Some(_) | None => false,
                },
                None => false,
            }
        };
        if changed {
            self.notify();
        }
        changed
    }

    /// Removes `key` from this mapping, notifying listeners if it existed.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut root = self.store.value.borrow_mut();
            resolve_mut(&mut root, &self.path)
                .and_then(Value::as_object_mut)
                .and_then(|map| map.remove(key))
        };
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Assigns every entry of `partial`, one write at a time. Each changed
    /// entry notifies separately. Returns the number of entries that changed.
    ///
    /// Through the root handle, the merged state is first run through the
    /// middleware in registration order. Keys the middleware dropped are
    /// removed.
    pub fn merge(&self, partial: State) -> usize {
        let middleware: Vec<Middleware> = if self.path.is_empty() {
            self.store.middleware.borrow().clone()
        } else {
            Vec::new()
        };
        if middleware.is_empty() {
            return partial
                .into_iter()
                .filter(|(key, value)| self.set(key, value.clone()))
                .count();
        }

        let old = self.snapshot();
        let mut next = old.clone();
        next.extend(partial);
        for (position, layer) in middleware.iter().enumerate() {
            match layer(&next, &old) {
                Ok(transformed) => next = transformed,
                Err(message) => {
                    let sink = Rc::clone(&*self.store.sink.borrow());
                    sink.emit(&Diagnostic::MiddlewareFailed { position, message });
                }
            }
        }

        let dropped: Vec<String> = old
            .keys()
            .filter(|key| !next.contains_key(*key))
            .cloned()
            .collect();
        let removed = dropped
            .iter()
            .filter(|key| self.remove(key).is_some())
            .count();
        removed
            + next
                .into_iter()
                .filter(|(key, value)| self.set(key, value.clone()))
                .count()
    }

    /// Adds a middleware run on every root merge. It receives the merged
    /// state and the state before the merge, and returns the state to
    /// commit. An `Err` is reported and the middleware's change discarded.
    ///
    /// ```
    /// use serde_json::json;
    ///
    /// let state = reweave::Observable::new(json!({ "n": 1 }).as_object().cloned().unwrap());
    /// state.use_middleware(|next: &reweave::State, _old: &reweave::State| {
    ///     let mut next = next.clone();
    ///     next.insert("touched".to_string(), json!(true));
    ///     Ok::<_, String>(next)
    /// });
    /// state.merge(json!({ "n": 2 }).as_object().cloned().unwrap());
    /// assert_eq!(state.get("touched"), Some(json!(true)));
    /// ```
    pub fn use_middleware<F, E>(&self, middleware: F)
    where
        F: Fn(&State, &State) -> Result<State, E> + 'static,
        E: fmt::Display,
    {
        self.store
            .middleware
            .borrow_mut()
            .push(Rc::new(move |next: &State, old: &State| {
                middleware(next, old).map_err(|error| error.to_string())
            }));
    }

    /// Sends middleware failures to `sink` instead of `tracing`.
    pub fn report_to(&self, sink: impl DiagnosticSink + 'static) {
        *self.store.sink.borrow_mut() = Rc::new(sink);
    }

    /// Replaces the whole mapping without notifying. Used when restoring
    /// persisted state before anything is rendered.
    pub(crate) fn replace_silently(&self, state: State) {
        let mut root = self.store.value.borrow_mut();
        if let Some(target) = resolve_mut(&mut root, &self.path) {
            *target = Value::Object(state);
        }
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.store.next_id.get());
        self.store.next_id.set(id.0.wrapping_add(1));
        self.store
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.store.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn notify(&self) {
        // Clone the list first: listeners may subscribe or write while we run.
        let listeners: Vec<Listener> = self
            .store
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("path", &self.path)
            .field("value", &self.value())
            .finish_non_exhaustive()
    }
}
