//! Non-fatal reporting for template, expression, transport and structural
//! defects.
//!
//! Nothing in the render path returns an error to its caller. Instead every
//! recoverable defect is turned into a [`Diagnostic`] and handed to the
//! engine's [`DiagnosticSink`]. The default sink forwards to [`tracing`].

use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Diagnostic {
    /// `{{key}}` with no `key` in the state; the default value was used.
    MissingPlaceholder { key: String },
    /// `{{#key}}...{{/key}}` where `state[key]` is not a sequence.
    LoopTargetNotSequence { key: String },
    /// A `{{...}}` marker no pass could interpret, left as literal text.
    UnmatchedMarker { marker: String },
    /// A condition failed to parse or evaluate and was treated as false.
    ConditionFailed { expression: String, message: String },
    /// The compiled markup had more than one root; only the first was mounted.
    MultipleRoots { count: usize },
    /// The compiled markup produced no node at all.
    EmptyTemplate,
    FetchFailed { locator: String, message: String },
    StorageFailed { key: String, message: String },
    UnknownEventHandler { name: String },
    /// A state middleware failed; the update went on without its change.
    MiddlewareFailed { position: usize, message: String },
    /// A state change arrived while the same session was still refreshing.
    ReentrantRefresh,
}

impl Diagnostic {
    pub const fn severity(&self) -> Severity {
        match self {
            Self::ConditionFailed { .. }
            | Self::FetchFailed { .. }
            | Self::StorageFailed { .. }
            | Self::MiddlewareFailed { .. } => Severity::Error,
            Self::MissingPlaceholder { .. }
            | Self::LoopTargetNotSequence { .. }
            | Self::UnmatchedMarker { .. }
            | Self::MultipleRoots { .. }
            | Self::EmptyTemplate
            | Self::UnknownEventHandler { .. }
            | Self::ReentrantRefresh => Severity::Warning,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPlaceholder { key } => {
                write!(f, "Placeholder \"{}\" has no matching value", key)
            }
            Self::LoopTargetNotSequence { key } => {
                write!(f, "Expected an array for \"{}\"", key)
            }
            Self::UnmatchedMarker { marker } => write!(f, "Unmatched marker {}", marker),
            Self::ConditionFailed {
                expression,
                message,
            } => write!(f, "Error evaluating condition `{}`: {}", expression, message),
            Self::MultipleRoots { count } => write!(
                f,
                "Template can only have one root element, found {}",
                count
            ),
            Self::EmptyTemplate => write!(f, "Template produced no nodes"),
            Self::FetchFailed { locator, message } => {
                write!(f, "Error fetching template {}: {}", locator, message)
            }
            Self::StorageFailed { key, message } => {
                write!(f, "Storage failed for {}: {}", key, message)
            }
            Self::UnknownEventHandler { name } => {
                write!(f, "No event handler named \"{}\"", name)
            }
            Self::MiddlewareFailed { position, message } => {
                write!(f, "State middleware {} failed: {}", position, message)
            }
            Self::ReentrantRefresh => write!(f, "Skipped a re-render requested during a re-render"),
        }
    }
}

/// Receives every diagnostic an engine emits.
pub trait DiagnosticSink {
    fn emit(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Diagnostic),
{
    fn emit(&self, diagnostic: &Diagnostic) {
        self(diagnostic);
    }
}

/// Forwards diagnostics to `tracing` at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        match diagnostic.severity() {
            Severity::Warning => tracing::warn!(?diagnostic, "{}", diagnostic),
            Severity::Error => tracing::error!(?diagnostic, "{}", diagnostic),
        }
    }
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: &Diagnostic) {}
}
