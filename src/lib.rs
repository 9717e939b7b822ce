//! Reactive HTML templating.
//!
//! Templates are compiled against a JSON state into markup, the markup is
//! parsed into a node tree, and later state changes patch that tree in place
//! instead of rebuilding it. See [`Engine`] for the entry point.

mod ast;
mod backend;
mod config;
mod diagnostics;
mod dom;
mod engine;
mod error;
mod evaluate;
mod loader;
mod parser;
mod reconcile;
mod sanitize;
mod session;
mod state;
mod storage;
mod template;

// Public exports.
pub use backend::{NodeKind, RenderBackend};
pub use config::{EngineConfig, PersistenceConfig, StorageKind};
pub use diagnostics::{Diagnostic, DiagnosticSink, NullSink, Severity, TracingSink};
pub use dom::{Dom, NodeId};
pub use engine::{Engine, EngineBuilder, EventHandler};
pub use error::{
    EvalError, FetchError, ParseError, ParseErrorKind, ReweaveError, ReweaveResult, StorageError,
};
pub use evaluate::{evaluate, try_evaluate};
pub use loader::{FsSource, TemplateCache, TemplateSource};
pub use reconcile::reconcile;
pub use sanitize::{escape, sanitize};
pub use session::Session;
pub use state::{Observable, PathSegment, State, SubscriptionId, wrap};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use template::DirectiveHandler;
