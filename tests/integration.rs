
use std::cell::RefCell;
use std::rc::Rc;

use fixtures::{
    generate_random_whitespace, generate_random_whitespace_at_least_one, get_builder, get_engine,
    state,
};
use reweave::{
    Diagnostic, Dom, Engine, EngineConfig, FileStorage, FsSource, NodeId, NodeKind, NullSink,
    Observable, PersistenceConfig, RenderBackend, State, StorageKind,
};
use serde_json::json;

fn first_child(engine: &Engine, node: NodeId) -> NodeId {
    engine
        .backend()
        .borrow()
        .children(node)
        .first()
        .copied()
        .unwrap()
}

#[test]
#[ntest::timeout(100)]
fn test_update_patches_in_place() {
    let (engine, seen) = get_engine();
    let session = engine.render(
        r#"<div class="{{c}}">{{t}}</div>"#,
        state(json!({ "c": "highlight", "t": "hi" })),
    );
    let root = session.element().unwrap();
    let text = first_child(&engine, root);
    assert_eq!(session.outer_html().unwrap(), r#"<div class="highlight">hi</div>"#);

    session.update(state(json!({ "c": "faded", "t": "bye" })));

    assert_eq!(session.element(), Some(root), "root identity preserved");
    assert_eq!(first_child(&engine, root), text, "text node identity preserved");
    assert_eq!(session.outer_html().unwrap(), r#"<div class="faded">bye</div>"#);
    assert!(seen.borrow().is_empty(), "{:?}", seen.borrow());
}

#[test]
#[ntest::timeout(100)]
fn test_state_writes_rerender_synchronously() {
    let (engine, _) = get_engine();
    let session = engine.render("<h1>{{title}}</h1>", state(json!({ "title": "Hello" })));
    let root = session.element().unwrap();

    for title in ["one", "two", "three"] {
        session.state().set("title", title);
        assert_eq!(session.outer_html().unwrap(), format!("<h1>{title}</h1>"));
    }
    assert_eq!(session.element(), Some(root));
}

#[test]
#[ntest::timeout(100)]
fn test_placeholder_whitespace_is_ignored() {
    let template = format!(
        "<p>{{{{{}name{}}}}}</p>",
        generate_random_whitespace(),
        generate_random_whitespace(),
    );
    dbg!(&template);

    let (engine, seen) = get_engine();
    let session = engine.render(template, state(json!({ "name": "Jessica" })));
    assert_eq!(session.outer_html().unwrap(), "<p>Jessica</p>");
    assert!(seen.borrow().is_empty());
}

#[test]
#[ntest::timeout(100)]
fn test_conditional_whitespace_is_ignored() {
    let template = format!(
        "<p>{{{{#if{}a{}&&{}!b{}}}}}yes{{{{else}}}}no{{{{/if}}}}</p>",
        generate_random_whitespace_at_least_one(),
        generate_random_whitespace(),
        generate_random_whitespace(),
        generate_random_whitespace(),
    );
    dbg!(&template);

    let (engine, _) = get_engine();
    let session = engine.render(template, state(json!({ "a": true, "b": false })));
    assert_eq!(session.outer_html().unwrap(), "<p>yes</p>");
    session.state().set("b", true);
    assert_eq!(session.outer_html().unwrap(), "<p>no</p>");
}

#[test]
#[ntest::timeout(100)]
fn test_loop_growth_keeps_existing_items() {
    let (engine, _) = get_engine();
    let session = engine.render(
        "<ul>{{#items}}<li>{{.}}</li>{{/items}}</ul>",
        state(json!({ "items": ["Item 1", "Item 2"] })),
    );
    let root = session.element().unwrap();
    let before = engine.backend().borrow().children(root);

    session.update(state(json!({ "items": ["Item 1", "Item 2", "Item 3"] })));

    let after = engine.backend().borrow().children(root);
    assert_eq!(after.len(), 3);
    assert_eq!(after.get(..2), Some(before.as_slice()));
    assert_eq!(
        session.outer_html().unwrap(),
        "<ul><li>Item 1</li><li>Item 2</li><li>Item 3</li></ul>"
    );

    session.update(state(json!({ "items": [] })));
    assert_eq!(session.outer_html().unwrap(), "<ul></ul>");
    assert!(!engine.backend().borrow().contains(before[0]));
}

#[test]
#[ntest::timeout(100)]
fn test_grade_chain_follows_state() {
    let (engine, _) = get_engine();
    let session = engine.render(
        "<span>{{#if score > 90}}A{{elseif score > 75}}B{{elseif score > 50}}C{{else}}F{{/if}}</span>",
        state(json!({ "score": 80 })),
    );
    assert_eq!(session.outer_html().unwrap(), "<span>B</span>");
    session.state().set("score", 95);
    assert_eq!(session.outer_html().unwrap(), "<span>A</span>");
    session.state().set("score", 10);
    assert_eq!(session.outer_html().unwrap(), "<span>F</span>");
}

#[test]
#[ntest::timeout(100)]
fn test_ternary_and_nested_state() {
    let (engine, _) = get_engine();
    let session = engine.render(
        r#"<p class="{{isPremium ? gold : plain}}">{{isPremium ? Premium User : Regular User}}{{#profiles}}, {{name}}{{/profiles}}</p>"#,
        state(json!({ "isPremium": false, "profiles": [{ "name": "ann" }] })),
    );
    let root = session.element().unwrap();
    assert_eq!(
        session.outer_html().unwrap(),
        r#"<p class="plain">Regular User, ann</p>"#
    );

    session.state().set("isPremium", true);
    assert_eq!(
        session.outer_html().unwrap(),
        r#"<p class="gold">Premium User, ann</p>"#
    );

    // Writes through nested handles reach the same session.
    let profile = session.state().child("profiles").unwrap().index(0).unwrap();
    profile.set("name", "bob");
    assert_eq!(
        session.outer_html().unwrap(),
        r#"<p class="gold">Premium User, bob</p>"#
    );
    assert_eq!(session.element(), Some(root));
}

#[test]
#[ntest::timeout(100)]
fn test_update_runs_state_middleware() {
    let (engine, seen) = get_engine();
    let session = engine.render("<p>{{count}}</p>", state(json!({ "count": 1 })));
    session
        .state()
        .use_middleware(|next: &State, _: &State| {
            let mut next = next.clone();
            let count = next.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            next.insert("count".to_string(), json!(count.min(10)));
            Ok::<_, String>(next)
        });
    session
        .state()
        .use_middleware(|_: &State, _: &State| Err("audit log unavailable"));

    session.update(state(json!({ "count": 50 })));
    assert_eq!(session.outer_html().unwrap(), "<p>10</p>");
    assert_eq!(
        *seen.borrow(),
        vec![Diagnostic::MiddlewareFailed {
            position: 1,
            message: "audit log unavailable".to_string()
        }]
    );
}

#[test]
#[ntest::timeout(100)]
fn test_values_are_escaped_before_parsing() {
    let (engine, _) = get_engine();
    let session = engine.render(
        r#"<div title="{{t}}">{{unsafe}}</div>"#,
        state(json!({ "unsafe": "<script>alert('x')</script>", "t": "\"quoted\"" })),
    );
    let root = session.element().unwrap();
    let backend = engine.backend();
    let backend = backend.borrow();

    // One text child, no script element.
    let children = backend.children(root);
    assert_eq!(children.len(), 1);
    assert_eq!(backend.kind(children[0]), Some(NodeKind::Text));
    assert_eq!(backend.text(children[0]), Some("<script>alert('x')</script>"));
    assert_eq!(backend.attribute(root, "title"), Some("\"quoted\""));
}

#[test]
#[ntest::timeout(100)]
fn test_missing_values_use_configured_default() {
    let (builder, seen) = get_builder();
    let config = EngineConfig {
        default_value: "N/A".to_string(),
        ..EngineConfig::default()
    };
    let engine = builder.config(config).build();
    let session = engine.render("<p>{{missing}}</p>", State::new());
    assert_eq!(session.outer_html().unwrap(), "<p>N/A</p>");
    assert_eq!(
        *seen.borrow(),
        vec![Diagnostic::MissingPlaceholder {
            key: "missing".to_string()
        }]
    );
}

#[test]
#[ntest::timeout(100)]
fn test_directives_expand_before_everything_else() {
    let (engine, _) = get_engine();
    engine.add_directive("custom", |args: &str, content: &str, _: &State| {
        format!("<strong>{}: {}</strong>", args, content)
    });
    let session = engine.render(
        "<div>{{#custom Important}}{{what}} content.{{/custom}}</div>",
        state(json!({ "what": "Custom" })),
    );
    assert_eq!(
        session.outer_html().unwrap(),
        "<div><strong>Important: Custom content.</strong></div>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_event_dispatch_mutates_state() {
    let (engine, seen) = get_engine();
    engine.add_event_handler("increment", |state: &Observable| {
        let count = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
        state.set("count", count + 1);
    });
    let session = engine.render(
        "<button event:increment>{{count}}</button>",
        state(json!({ "count": 0 })),
    );
    let button = session.element().unwrap();
    assert_eq!(
        session.outer_html().unwrap(),
        r#"<button data-event="increment">0</button>"#
    );

    assert!(session.dispatch(button));
    assert!(session.dispatch(button));
    assert_eq!(
        session.outer_html().unwrap(),
        r#"<button data-event="increment">2</button>"#
    );

    let text = first_child(&engine, button);
    assert!(!session.dispatch(text), "text nodes carry no events");
    assert!(seen.borrow().is_empty());
}

#[test]
#[ntest::timeout(100)]
fn test_unknown_event_handler_is_reported() {
    let (engine, seen) = get_engine();
    let session = engine.render("<a event:nowhere>x</a>", State::new());
    assert!(!session.dispatch(session.element().unwrap()));
    assert_eq!(
        *seen.borrow(),
        vec![Diagnostic::UnknownEventHandler {
            name: "nowhere".to_string()
        }]
    );
}

#[test]
#[ntest::timeout(100)]
fn test_render_mounts_a_new_root() {
    let (engine, _) = get_engine();
    let session = engine.render("<p>{{n}}</p>", state(json!({ "n": 1 })));
    let first = session.element().unwrap();
    let second = session.render().unwrap();

    assert_ne!(first, second);
    assert_eq!(session.element(), Some(second));
    // The old tree is the caller's to release.
    assert!(engine.backend().borrow().contains(first));
    engine.backend().borrow_mut().release(first);

    session.state().set("n", 2);
    assert_eq!(session.outer_html().unwrap(), "<p>2</p>");
}

#[test]
#[ntest::timeout(100)]
fn test_failed_condition_degrades() {
    let (engine, seen) = get_engine();
    let session = engine.render(
        "<p>{{#if undefinedThing > 3}}yes{{else}}no{{/if}}</p>",
        State::new(),
    );
    assert_eq!(session.outer_html().unwrap(), "<p>no</p>");
    assert!(matches!(
        seen.borrow().as_slice(),
        [Diagnostic::ConditionFailed { expression, .. }] if expression.trim() == "undefinedThing > 3"
    ));
}

#[test]
#[ntest::timeout(1000)]
fn test_render_from_source_uses_cache() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("card.html"), "<div>{{t}}</div>").unwrap();
    let (builder, seen) = get_builder();
    let engine = builder.source(FsSource::new(dir.path())).build();

    let session = engine
        .render_from_source("card.html", state(json!({ "t": "File Content" })))
        .unwrap();
    assert_eq!(session.outer_html().unwrap(), "<div>File Content</div>");
    assert_eq!(session.template(), "<div>{{t}}</div>");

    // Served from the cache once the file is gone.
    std::fs::remove_file(dir.path().join("card.html")).unwrap();
    assert!(engine.render_from_source("card.html", State::new()).is_some());

    engine.destroy();
    assert_eq!(engine.cached_templates(), 0);
    assert!(engine.render_from_source("card.html", State::new()).is_none());
    assert!(seen.borrow().iter().any(|d| matches!(
        d,
        Diagnostic::FetchFailed { locator, .. } if locator == "card.html"
    )));
}

#[test]
#[ntest::timeout(1000)]
fn test_durable_persistence_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        persistence: Some(PersistenceConfig {
            storage_key: "counter".to_string(),
            backend: StorageKind::Durable {
                directory: dir.path().to_path_buf(),
            },
        }),
        ..EngineConfig::default()
    };

    {
        let engine = Engine::builder().config(config.clone()).sink(NullSink).build();
        let session = engine.render("<p>{{n}}</p>", state(json!({ "n": 0 })));
        session.state().set("n", 41);
        session.update(state(json!({ "n": 42 })));
    }

    let engine = Engine::builder().config(config).sink(NullSink).build();
    let session = engine.render("<p>{{n}}</p>", state(json!({ "n": 0 })));
    assert_eq!(session.outer_html().unwrap(), "<p>42</p>");
    assert!(dir.path().join("counter.json").exists());
}

#[test]
#[ntest::timeout(1000)]
fn test_explicit_storage_overrides_config_backend() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        persistence: Some(PersistenceConfig {
            storage_key: "k".to_string(),
            backend: StorageKind::Session,
        }),
        ..EngineConfig::default()
    };
    let engine = Engine::builder()
        .config(config)
        .storage(FileStorage::new(dir.path()))
        .sink(NullSink)
        .build();
    let session = engine.render("<p>{{n}}</p>", state(json!({ "n": 0 })));
    session.state().set("n", 1);
    assert!(dir.path().join("k.json").exists());
}

/// Forwards to [`Dom`] while recording every mutating call.
#[derive(Default)]
struct RecordingBackend {
    dom: Dom,
    log: Rc<RefCell<Vec<String>>>,
}

impl RenderBackend for RecordingBackend {
    type Handle = NodeId;

    fn parse_fragment(&mut self, markup: &str) -> Vec<NodeId> {
        self.dom.parse_fragment(markup)
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind<'_>> {
        self.dom.kind(node)
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.dom.attributes(node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.dom.attribute(node, name)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.log.borrow_mut().push(format!("set {name}={value}"));
        self.dom.set_attribute(node, name, value);
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        self.log.borrow_mut().push(format!("remove {name}"));
        self.dom.remove_attribute(node, name);
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        self.dom.text(node)
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.log.borrow_mut().push(format!("text {text}"));
        self.dom.set_text(node, text);
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.dom.children(node)
    }

    fn deep_clone(&mut self, node: NodeId) -> NodeId {
        self.dom.deep_clone(node)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.log.borrow_mut().push("append".to_string());
        self.dom.append_child(parent, child);
    }

    fn replace(&mut self, old: NodeId, new: NodeId) {
        self.log.borrow_mut().push("replace".to_string());
        self.dom.replace(old, new);
    }

    fn remove(&mut self, node: NodeId) {
        self.log.borrow_mut().push("remove".to_string());
        self.dom.remove(node);
    }

    fn release(&mut self, node: NodeId) {
        self.dom.release(node);
    }
}

#[test]
#[ntest::timeout(100)]
fn test_only_changed_attributes_are_touched() {
    let backend = RecordingBackend::default();
    let log = Rc::clone(&backend.log);
    let engine = Engine::builder().sink(NullSink).backend(backend).build();

    let session = engine.render(
        r#"<div id="card" class="{{c}}" title="{{t}}" role="note"><b>{{label}}</b></div>"#,
        state(json!({ "c": "a", "t": "x", "label": "same" })),
    );
    assert!(log.borrow().is_empty(), "mounting goes through parsing only");

    session.update(state(json!({ "c": "b", "t": "y" })));

    // `c` and `t` each re-render on their own, and `update` renders once
    // more with nothing left to change.
    assert_eq!(*log.borrow(), vec!["set class=b", "set title=y"]);
}
