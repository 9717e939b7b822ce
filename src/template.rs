//! The template compiler.
//!
//! A template is plain text and is recompiled from source on every render.
//! Compilation is a fixed sequence of rewriting passes, each working on the
//! output of the one before:
//!
//! 1. directives: `{{#name args}}content{{/name}}` for every registered name
//! 2. loops: `{{#key}}content{{/key}}`
//! 3. conditionals: `{{#if a}}..{{elseif b}}..{{else}}..{{/if}}`
//! 4. ternaries: `{{cond ? yes : no}}`
//! 5. placeholders: `{{key}}`
//! 6. event markers: `event:name` becomes `data-event="name"`
//!
//! Loop bodies are compiled again, from the top, once per item. Anything a
//! pass does not recognise is left for the later passes, and whatever is
//! still unrecognised at the end stays in the output as literal text.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::evaluate::evaluate;
use crate::sanitize::{escape, sanitize};
use crate::state::State;

/// Expands a directive: `(args, content, state) -> replacement`.
pub type DirectiveHandler = Rc<dyn Fn(&str, &str, &State) -> String>;

pub(crate) type Directives = IndexMap<String, DirectiveHandler>;

/// Everything one compilation needs from its engine.
pub(crate) struct Compiler<'e> {
    pub(crate) directives: &'e Directives,
    /// Substituted, escaped, for placeholders with no value.
    pub(crate) default_value: &'e str,
    pub(crate) sink: &'e dyn DiagnosticSink,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Strips `keyword` from the front of `text` if a whitespace character
/// follows it. The whitespace is left on the returned remainder.
fn strip_keyword<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let rest = text.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace).then_some(rest)
}

/// Byte offset of `suffix` within `text`, given `suffix` is a suffix of it.
const fn offset_of(text: &str, suffix: &str) -> usize {
    text.len().saturating_sub(suffix.len())
}

/// A parsed `{{#if}}` block: branches in written order, `None` marking the
/// else branch, plus the text following `{{/if}}`.
struct Conditional<'t> {
    branches: Vec<(Option<&'t str>, &'t str)>,
    remaining: &'t str,
}

/// Parses the rest of an `{{#if` marker. Nested `{{#if}}` blocks are skipped
/// over, so only top-level `elseif`/`else` markers split branches.
fn split_conditional(after_open: &str) -> Option<Conditional<'_>> {
    let condition_start = after_open.strip_prefix(char::is_whitespace)?;
    let (condition, body) = condition_start.split_once("}}")?;

    let mut branches = Vec::new();
    let mut branch_condition = Some(condition);
    let mut branch_start = 0;
    let mut seen_else = false;
    let mut depth = 0usize;
    let mut cursor = 0;

    loop {
        let at = cursor + body.get(cursor..)?.find("{{")?;
        let tail = body.get(at..)?;

        if strip_keyword(tail, "{{#if").is_some() {
            depth += 1;
            cursor = at + "{{#if".len();
            continue;
        }

        if let Some(remaining) = tail.strip_prefix("{{/if}}") {
            if depth == 0 {
                branches.push((branch_condition, body.get(branch_start..at)?));
                return Some(Conditional {
                    branches,
                    remaining,
                });
            }
            depth -= 1;
            cursor = offset_of(body, remaining);
            continue;
        }

        if depth == 0 && !seen_else {
            let elseif = strip_keyword(tail, "{{elseif").or_else(|| strip_keyword(tail, "{{#elseif"));
            if let Some(after) = elseif {
                let (next_condition, next_body) = after.split_once("}}")?;
                branches.push((branch_condition, body.get(branch_start..at)?));
                branch_condition = Some(next_condition);
                branch_start = offset_of(body, next_body);
                cursor = branch_start;
                continue;
            }

            let else_body = tail
                .strip_prefix("{{else}}")
                .or_else(|| tail.strip_prefix("{{#else}}"));
            if let Some(else_body) = else_body {
                branches.push((branch_condition, body.get(branch_start..at)?));
                branch_condition = None;
                seen_else = true;
                branch_start = offset_of(body, else_body);
                cursor = branch_start;
                continue;
            }
        }

        cursor = at + "{{".len();
    }
}

/// Splits the rest of a `{{#key` marker into key, body and what follows
/// `{{/key}}`.
fn split_loop(after_open: &str) -> Option<(&str, &str, &str)> {
    let key_len = after_open
        .find(|c: char| !is_word_char(c))
        .unwrap_or(after_open.len());
    if key_len == 0 {
        return None;
    }
    let (key, tail) = after_open.split_at(key_len);
    let body = tail.strip_prefix("}}")?;
    let (content, remaining) = body.split_once(format!("{{{{/{}}}}}", key).as_str())?;
    Some((key, content, remaining))
}

/// Splits the rest of a `{{#name` directive marker into args, content and
/// what follows `close`.
fn split_directive<'t>(after_open: &'t str, close: &str) -> Option<(&'t str, &'t str, &'t str)> {
    let args_start = after_open.strip_prefix(char::is_whitespace)?;
    let (args, body) = args_start.split_once("}}")?;
    if args.contains('\n') {
        return None;
    }
    let (content, remaining) = body.split_once(close)?;
    Some((args.trim(), content, remaining))
}

/// Rewrites every single-line `{{tag}}` with `rewrite`. Tags it declines are
/// copied through unchanged.
fn rewrite_tags(template: &str, mut rewrite: impl FnMut(&str) -> Option<String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after_open)) = rest.split_once("{{") {
        output.push_str(before);
        match after_open.split_once("}}") {
            Some((tag, remaining)) if !tag.contains('\n') => {
                match rewrite(tag) {
                    Some(replacement) => output.push_str(&replacement),
                    None => {
                        output.push_str("{{");
                        output.push_str(tag);
                        output.push_str("}}");
                    }
                }
                rest = remaining;
            }
            Some(_) | None => {
                output.push_str("{{");
                rest = after_open;
            }
        }
    }
    output.push_str(rest);
    output
}

/// Whether a leftover tag is block syntax rather than a placeholder key.
fn is_block_marker(key: &str) -> bool {
    key.starts_with('#')
        || key.starts_with('/')
        || key == "else"
        || strip_keyword(key, "elseif").is_some()
}

impl Compiler<'_> {
    /// Compiles `template` against `state` into markup.
    pub(crate) fn compile(&self, template: &str, state: &State) -> String {
        let output = self.expand_directives(template, state);
        let output = self.expand_loops(&output, state);
        let output = self.expand_conditionals(&output, state);
        let output = self.expand_ternaries(&output, state);
        let output = self.expand_placeholders(&output, state);
        expand_events(&output)
    }

    fn expand_directives(&self, template: &str, state: &State) -> String {
        let mut output = template.to_string();
        for (name, handler) in self.directives {
            let open = format!("{{{{#{}", name);
            let close = format!("{{{{/{}}}}}", name);
            let mut expanded = String::with_capacity(output.len());
            let mut rest = output.as_str();
            while let Some((before, after_open)) = rest.split_once(open.as_str()) {
                expanded.push_str(before);
                match split_directive(after_open, &close) {
                    Some((args, content, remaining)) => {
                        tracing::trace!(directive = %name, args, "expanding directive");
                        expanded.push_str(&handler(args, content, state));
                        rest = remaining;
                    }
                    None => {
                        expanded.push_str(&open);
                        rest = after_open;
                    }
                }
            }
            expanded.push_str(rest);
            output = expanded;
        }
        output
    }

    fn expand_loops(&self, template: &str, state: &State) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some((before, after_open)) = rest.split_once("{{#") {
            output.push_str(before);
            let Some((key, content, remaining)) = split_loop(after_open) else {
                output.push_str("{{#");
                rest = after_open;
                continue;
            };

            match state.get(key) {
                Some(Value::Array(items)) => {
                    for item in items {
                        let item_state = match item {
                            Value::Object(map) => map.clone(),
                            other => {
                                let mut wrapped = State::new();
                                wrapped.insert(".".to_string(), other.clone());
                                wrapped
                            }
                        };
                        output.push_str(&self.compile(content, &item_state));
                    }
                }
                Some(_) | None => self.sink.emit(&Diagnostic::LoopTargetNotSequence {
                    key: key.to_string(),
                }),
            }
            rest = remaining;
        }
        output.push_str(rest);
        output
    }

    fn expand_conditionals(&self, template: &str, state: &State) -> String {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some((before, after_open)) = rest.split_once("{{#if") {
            output.push_str(before);
            let Some(conditional) = split_conditional(after_open) else {
                output.push_str("{{#if");
                rest = after_open;
                continue;
            };

            let chosen = conditional
                .branches
                .iter()
                .find(|(condition, _)| match condition {
                    Some(condition) => evaluate(condition, state, self.sink),
                    None => true,
                })
                .map(|(_, body)| *body);
            if let Some(body) = chosen {
                output.push_str(&self.expand_conditionals(body, state));
            }
            rest = conditional.remaining;
        }
        output.push_str(rest);
        output
    }

    fn expand_ternaries(&self, template: &str, state: &State) -> String {
        rewrite_tags(template, |tag| {
            if is_block_marker(tag.trim_start()) {
                return None;
            }
            let (condition, branches) = tag.split_once('?')?;
            let (if_true, if_false) = branches.split_once(':')?;
            let branch = if evaluate(condition, state, self.sink) {
                if_true
            } else {
                if_false
            };
            Some(branch.trim().to_string())
        })
    }

    fn expand_placeholders(&self, template: &str, state: &State) -> String {
        rewrite_tags(template, |tag| {
            let key = tag.trim();
            if key.is_empty() || is_block_marker(key) {
                self.sink.emit(&Diagnostic::UnmatchedMarker {
                    marker: format!("{{{{{}}}}}", tag),
                });
                return None;
            }
            match state.get(key) {
                Some(value) => Some(sanitize(value).into_owned()),
                None => {
                    self.sink.emit(&Diagnostic::MissingPlaceholder {
                        key: key.to_string(),
                    });
                    Some(escape(self.default_value).into_owned())
                }
            }
        })
    }
}

/// Rewrites `event:name` to `data-event="name"`.
fn expand_events(template: &str) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after)) = rest.split_once("event:") {
        output.push_str(before);
        let name_len = after.find(|c: char| !is_word_char(c)).unwrap_or(after.len());
        let (name, remaining) = after.split_at(name_len);
        if name.is_empty() {
            output.push_str("event:");
        } else {
            output.push_str("data-event=\"");
            output.push_str(name);
            output.push('"');
        }
        rest = remaining;
    }
    output.push_str(rest);
    output
}
