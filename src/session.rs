//! Render sessions: one template, one observable state, one mounted tree.
//!
//! A session subscribes to its own state. Every changing write recompiles
//! the template, parses the result into a fresh tree, and reconciles the
//! mounted tree against it, all before the write returns. The fresh tree is
//! released afterwards.
//!
//! Refreshes do not nest. A write made while a refresh of the same session
//! is running (say, from inside a directive handler) is applied to the state,
//! but its re-render is skipped and reported as
//! [`Diagnostic::ReentrantRefresh`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::RenderBackend;
use crate::diagnostics::Diagnostic;
use crate::dom::Dom;
use crate::engine::Shared;
use crate::reconcile::reconcile;
use crate::state::{Observable, State, SubscriptionId};

struct SessionInner<B: RenderBackend> {
    shared: Rc<Shared<B>>,
    template: Rc<str>,
    state: Observable,
    element: RefCell<Option<B::Handle>>,
}

pub struct Session<B: RenderBackend = Dom> {
    inner: Rc<SessionInner<B>>,
    subscription: SubscriptionId,
}

fn is_blank<B: RenderBackend>(backend: &B, node: B::Handle) -> bool {
    backend.text(node).is_some_and(|text| text.trim().is_empty())
}

impl<B: RenderBackend> SessionInner<B> {
    fn compile(&self) -> String {
        self.shared.compile(&self.template, &self.state.snapshot())
    }

    /// Parses `markup` and keeps its first root. Further roots are reported
    /// and released.
    fn materialize(&self, backend: &mut B, markup: &str) -> Option<B::Handle> {
        let mut roots = backend.parse_fragment(markup.trim()).into_iter();
        let Some(root) = roots.next() else {
            self.shared.emit(&Diagnostic::EmptyTemplate);
            return None;
        };

        let mut extra = 0usize;
        for node in roots {
            if !is_blank(&*backend, node) {
                extra += 1;
            }
            backend.release(node);
        }
        if extra > 0 {
            self.shared.emit(&Diagnostic::MultipleRoots { count: extra + 1 });
        }
        Some(root)
    }

    fn on_change(&self) {
        self.shared.persist(&self.state.snapshot());
        self.refresh();
    }

    /// Mounts a brand new tree, forgetting the old one.
    fn mount(&self) -> Option<B::Handle> {
        let Ok(mut element) = self.element.try_borrow_mut() else {
            self.shared.emit(&Diagnostic::ReentrantRefresh);
            return None;
        };
        let markup = self.compile();
        let Ok(mut backend) = self.shared.backend.try_borrow_mut() else {
            self.shared.emit(&Diagnostic::ReentrantRefresh);
            return None;
        };
        let root = self.materialize(&mut backend, &markup);
        tracing::debug!(?root, "mounted session");
        *element = root;
        root
    }

    /// Re-renders and patches the mounted tree in place.
    fn refresh(&self) {
        let Ok(mut element) = self.element.try_borrow_mut() else {
            self.shared.emit(&Diagnostic::ReentrantRefresh);
            return;
        };
        let markup = self.compile();
        let Ok(mut backend) = self.shared.backend.try_borrow_mut() else {
            self.shared.emit(&Diagnostic::ReentrantRefresh);
            return;
        };
        // An empty render leaves the mounted tree as it was.
        let Some(fresh) = self.materialize(&mut backend, &markup) else {
            return;
        };

        let root = match *element {
            Some(live) => {
                let _span = tracing::trace_span!("reconcile", ?live).entered();
                let root = reconcile(&mut *backend, live, fresh);
                backend.release(fresh);
                root
            }
            None => fresh,
        };
        *element = Some(root);
    }
}

impl<B: RenderBackend + 'static> Session<B> {
    pub(crate) fn mount(shared: Rc<Shared<B>>, template: Rc<str>, initial: State) -> Self {
        let state = Observable::new(initial);
        let sink = Rc::downgrade(&shared);
        state.report_to(move |diagnostic: &Diagnostic| {
            if let Some(shared) = sink.upgrade() {
                shared.emit(diagnostic);
            }
        });
        if let Some(stored) = shared.restore() {
            tracing::debug!("restored persisted state");
            state.replace_silently(stored);
        }

        let inner = Rc::new(SessionInner {
            shared,
            template,
            state,
            element: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let subscription = inner.state.subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_change();
            }
        });
        inner.mount();

        Self {
            inner,
            subscription,
        }
    }
}

impl<B: RenderBackend> Session<B> {
    /// The mounted root, or `None` if the template rendered nothing.
    pub fn element(&self) -> Option<B::Handle> {
        self.inner
            .element
            .try_borrow()
            .ok()
            .and_then(|element| *element)
    }

    /// The session's state. Writes through it re-render the session.
    pub fn state(&self) -> &Observable {
        &self.inner.state
    }

    pub fn template(&self) -> &str {
        &self.inner.template
    }

    /// Merges `partial` into the state, then re-renders once more. Each
    /// changed key already re-renders on its own as it is written.
    pub fn update(&self, partial: State) {
        let changed = self.inner.state.merge(partial);
        tracing::trace!(changed, "session update");
        self.inner.refresh();
    }

    /// Renders from scratch and mounts the result as a new root.
    ///
    /// The previous tree is left in the backend untouched; it belongs to the
    /// caller from here on.
    pub fn render(&self) -> Option<B::Handle> {
        self.inner.mount()
    }

    /// Fires the handler bound to `node` through its `data-event` attribute.
    ///
    /// Returns whether a handler ran. The handler receives the session's
    /// state, so anything it writes re-renders the session.
    pub fn dispatch(&self, node: B::Handle) -> bool {
        let name = match self.inner.shared.backend.try_borrow() {
            Ok(backend) => backend.attribute(node, "data-event").map(str::to_string),
            Err(_) => None,
        };
        let Some(name) = name else {
            return false;
        };

        match self.inner.shared.event_handler(&name) {
            Some(handler) => {
                tracing::debug!(event = %name, "dispatching event");
                handler(&self.inner.state);
                true
            }
            None => {
                self.inner
                    .shared
                    .emit(&Diagnostic::UnknownEventHandler { name });
                false
            }
        }
    }
}

impl Session<Dom> {
    /// The mounted tree serialized as markup.
    pub fn outer_html(&self) -> Option<String> {
        let root = self.element()?;
        let backend = self.inner.shared.backend.try_borrow().ok()?;
        Some(backend.outer_html(root))
    }
}

impl<B: RenderBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.inner.state.unsubscribe(self.subscription);
    }
}
