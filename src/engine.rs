use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;

use crate::backend::RenderBackend;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::dom::Dom;
use crate::loader::{TemplateCache, TemplateSource};
use crate::session::Session;
use crate::state::{Observable, State};
use crate::storage::{self, Storage};
use crate::template::{Compiler, DirectiveHandler, Directives};

/// Handles an event marker: `event:name` in a template binds `name`.
pub type EventHandler = Rc<dyn Fn(&Observable)>;

/// Everything sessions share with the engine that created them.
pub(crate) struct Shared<B: RenderBackend> {
    pub(crate) config: EngineConfig,
    sink: Box<dyn DiagnosticSink>,
    directives: RefCell<Directives>,
    event_handlers: RefCell<IndexMap<String, EventHandler>>,
    cache: RefCell<TemplateCache>,
    source: Option<Box<dyn TemplateSource>>,
    storage: Option<Box<dyn Storage>>,
    on_destroy: Option<Box<dyn Fn()>>,
    pub(crate) backend: Rc<RefCell<B>>,
}

impl<B: RenderBackend> Shared<B> {
    pub(crate) fn emit(&self, diagnostic: &Diagnostic) {
        self.sink.emit(diagnostic);
    }

    pub(crate) fn compile(&self, template: &str, state: &State) -> String {
        // A snapshot, so handlers may register directives while we run.
        let directives = self.directives.borrow().clone();
        let _span = tracing::debug_span!("compile", template_len = template.len()).entered();
        Compiler {
            directives: &directives,
            default_value: &self.config.default_value,
            sink: &*self.sink,
        }
        .compile(template, state)
    }

    pub(crate) fn event_handler(&self, name: &str) -> Option<EventHandler> {
        self.event_handlers.borrow().get(name).cloned()
    }

    /// The persisted state, if persistence is on and something was stored.
    pub(crate) fn restore(&self) -> Option<State> {
        let key = &self.config.persistence.as_ref()?.storage_key;
        match self.storage.as_ref()?.load(key) {
            Ok(stored) => stored,
            Err(error) => {
                self.emit(&Diagnostic::StorageFailed {
                    key: key.clone(),
                    message: error.to_string(),
                });
                None
            }
        }
    }

    pub(crate) fn persist(&self, state: &State) {
        let (Some(persistence), Some(storage)) = (&self.config.persistence, &self.storage) else {
            return;
        };
        if let Err(error) = storage.save(&persistence.storage_key, state) {
            self.emit(&Diagnostic::StorageFailed {
                key: persistence.storage_key.clone(),
                message: error.to_string(),
            });
        }
    }
}

/// Compiles templates against reactive state and keeps the rendered trees in
/// sync with it.
///
/// # Examples
///
/// ```
/// use reweave::{Engine, NullSink};
/// use serde_json::json;
///
/// let engine = Engine::builder().sink(NullSink).build();
/// let state = json!({ "cls": "highlight", "text": "hi" });
/// let session = engine.render(
///     r#"<div class="{{cls}}">{{text}}</div>"#,
///     state.as_object().cloned().unwrap(),
/// );
/// let root = session.element().unwrap();
///
/// session.state().set("text", "bye");
/// assert_eq!(session.element(), Some(root));
/// assert_eq!(session.outer_html().unwrap(), r#"<div class="highlight">bye</div>"#);
/// ```
pub struct Engine<B: RenderBackend = Dom> {
    shared: Rc<Shared<B>>,
}

impl Engine<Dom> {
    pub fn builder() -> EngineBuilder<Dom> {
        EngineBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl Default for Engine<Dom> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend + 'static> Engine<B> {
    /// Renders `template` against `state` and keeps the result live: any
    /// change to the session's state re-renders and patches it.
    pub fn render(&self, template: impl Into<Rc<str>>, state: State) -> Session<B> {
        Session::mount(Rc::clone(&self.shared), template.into(), state)
    }

    /// Like [`Engine::render`], with the template fetched by locator through
    /// the configured source and cache. Failures are reported and yield
    /// `None`.
    pub fn render_from_source(&self, locator: &str, state: State) -> Option<Session<B>> {
        let fetched = {
            let Some(source) = self.shared.source.as_deref() else {
                self.shared.emit(&Diagnostic::FetchFailed {
                    locator: locator.to_string(),
                    message: "no template source configured".to_string(),
                });
                return None;
            };
            let _span = tracing::debug_span!("fetch", locator).entered();
            self.shared.cache.borrow_mut().get_or_fetch(locator, source)
        };

        match fetched {
            Ok(template) => Some(self.render(template, state)),
            Err(error) => {
                self.shared.emit(&Diagnostic::FetchFailed {
                    locator: locator.to_string(),
                    message: error.to_string(),
                });
                None
            }
        }
    }
}

impl<B: RenderBackend> Engine<B> {
    /// Compiles `template` against `state` without rendering it.
    pub fn compile(&self, template: &str, state: &State) -> String {
        self.shared.compile(template, state)
    }

    /// Registers a directive. Re-registering a name replaces its handler but
    /// keeps its place in the expansion order.
    pub fn add_directive(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&str, &str, &State) -> String + 'static,
    ) {
        let handler: DirectiveHandler = Rc::new(handler);
        self.shared
            .directives
            .borrow_mut()
            .insert(name.into(), handler);
    }

    pub fn add_event_handler(&self, name: impl Into<String>, handler: impl Fn(&Observable) + 'static) {
        let handler: EventHandler = Rc::new(handler);
        self.shared
            .event_handlers
            .borrow_mut()
            .insert(name.into(), handler);
    }

    /// Runs the teardown callback and empties the template cache. Existing
    /// sessions keep working.
    pub fn destroy(&self) {
        if let Some(on_destroy) = &self.shared.on_destroy {
            on_destroy();
        }
        self.shared.cache.borrow_mut().clear();
        tracing::debug!("engine destroyed");
    }

    /// The backend holding every tree this engine renders.
    pub fn backend(&self) -> Rc<RefCell<B>> {
        Rc::clone(&self.shared.backend)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Number of templates currently cached.
    pub fn cached_templates(&self) -> usize {
        self.shared.cache.borrow().len()
    }
}

pub struct EngineBuilder<B: RenderBackend = Dom> {
    config: EngineConfig,
    sink: Box<dyn DiagnosticSink>,
    source: Option<Box<dyn TemplateSource>>,
    storage: Option<Box<dyn Storage>>,
    on_initialize: Option<Box<dyn FnOnce()>>,
    on_destroy: Option<Box<dyn Fn()>>,
    backend: B,
}

impl EngineBuilder<Dom> {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            sink: Box::new(TracingSink),
            source: None,
            storage: None,
            on_initialize: None,
            on_destroy: None,
            backend: Dom::new(),
        }
    }
}

impl Default for EngineBuilder<Dom> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> EngineBuilder<B> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Where diagnostics go. Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Where [`Engine::render_from_source`] fetches templates from.
    pub fn source(mut self, source: impl TemplateSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Overrides the storage the persistence config would select. Has no
    /// effect unless persistence is configured.
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Runs once, when the engine is built.
    pub fn on_initialize(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_initialize = Some(Box::new(callback));
        self
    }

    /// Runs on every [`Engine::destroy`].
    pub fn on_destroy(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_destroy = Some(Box::new(callback));
        self
    }

    /// Renders into `backend` instead.
    pub fn backend<C: RenderBackend>(self, backend: C) -> EngineBuilder<C> {
        EngineBuilder {
            config: self.config,
            sink: self.sink,
            source: self.source,
            storage: self.storage,
            on_initialize: self.on_initialize,
            on_destroy: self.on_destroy,
            backend,
        }
    }

    pub fn build(self) -> Engine<B> {
        let storage = match &self.config.persistence {
            Some(persistence) => self
                .storage
                .or_else(|| Some(storage::open(&persistence.backend))),
            None => None,
        };
        let cache = TemplateCache::new(
            self.config.cache_limit,
            Duration::from_millis(self.config.cache_expiration_ms),
        );

        let engine = Engine {
            shared: Rc::new(Shared {
                config: self.config,
                sink: self.sink,
                directives: RefCell::new(Directives::new()),
                event_handlers: RefCell::new(IndexMap::new()),
                cache: RefCell::new(cache),
                source: self.source,
                storage,
                on_destroy: self.on_destroy,
                backend: Rc::new(RefCell::new(self.backend)),
            }),
        };
        tracing::debug!(config = ?engine.shared.config, "engine initialized");
        if let Some(on_initialize) = self.on_initialize {
            on_initialize();
        }
        engine
    }
}
