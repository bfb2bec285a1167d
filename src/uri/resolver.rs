//! Resolution algorithm (spec.md §4.C.4 "Resolution algorithm"). Walks a
//! parsed URI segment by segment against a [`GraphStore`], applying each
//! segment's accessor (filter → index → key, per spec). Never raises:
//! malformed focus, out-of-bounds indices, and non-matching filters all
//! collapse to [`Resolved::Nil`] (spec.md §4.C "Errors").

use crate::graph::{Edge, EntityId, EntityKind, GraphStore};
use crate::uri::grammar::{Accessor, FilterValue, FocusKind, ParsedUri, Root};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Entity(EntityId),
    Collection(Vec<EntityId>),
    Nil,
}

impl Resolved {
    pub fn is_nil(&self) -> bool {
        matches!(self, Resolved::Nil)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Resolved::Nil => true,
            Resolved::Collection(v) => v.is_empty(),
            Resolved::Entity(_) => false,
        }
    }
}

enum Step {
    Debugger,
    One(EntityId),
    Many(Vec<EntityId>),
    Nil,
}

impl Step {
    fn into_resolved(self) -> Resolved {
        match self {
            Step::Debugger => Resolved::Nil,
            Step::One(id) => Resolved::Entity(id),
            Step::Many(ids) => Resolved::Collection(ids),
            Step::Nil => Resolved::Nil,
        }
    }
}

/// Resolves `parsed` against `store`. `focus` maps a focus keyword to
/// the entity currently occupying that role for the consumer (spec.md
/// §4.C.4 "Contextual focus"); pass `|_| None` if the consumer has no
/// focus set. `touched` collects every edge the walk read from, so
/// callers that want reactivity (`wait_url`) can subscribe to exactly
/// the edges this resolution depended on.
pub fn resolve_tracking(store: &GraphStore, focus: &dyn Fn(FocusKind) -> Option<EntityId>, parsed: &ParsedUri, touched: &mut Vec<Edge>) -> Resolved {
    let mut current = match &parsed.root {
        Root::Debugger => Step::Debugger,
        Root::Focus { kind, relative } => match focus(*kind) {
            None => Step::Nil,
            Some(id) => match relative {
                Some(offset) if *kind == FocusKind::Frame => match apply_frame_offset(store, id, *offset) {
                    Some(target) => Step::One(target),
                    None => Step::Nil,
                },
                _ => Step::One(id),
            },
        },
    };

    for segment in &parsed.segments {
        current = match current {
            Step::Nil => Step::Nil,
            Step::Debugger => match edge_from_debugger(store, &segment.name) {
                Some(edge) => {
                    let sorted = edge.is_sorted();
                    let ids = edge.iter();
                    touched.push(edge);
                    apply_accessor(store, ids, sorted, segment.accessor.as_ref())
                }
                None => Step::Nil,
            },
            Step::One(id) => match edge_from_entity(store, id, &segment.name) {
                Some(edge) => {
                    let sorted = edge.is_sorted();
                    let ids = edge.iter();
                    touched.push(edge);
                    apply_accessor(store, ids, sorted, segment.accessor.as_ref())
                }
                None => Step::Nil,
            },
            Step::Many(ids) => {
                let mut all = Vec::new();
                let mut any_sorted = false;
                for id in ids {
                    if let Some(edge) = edge_from_entity(store, id, &segment.name) {
                        any_sorted = any_sorted || edge.is_sorted();
                        all.extend(edge.iter());
                        touched.push(edge);
                    }
                }
                apply_accessor(store, all, any_sorted, segment.accessor.as_ref())
            }
        };
    }

    current.into_resolved()
}

pub fn resolve(store: &GraphStore, focus: &dyn Fn(FocusKind) -> Option<EntityId>, parsed: &ParsedUri) -> Resolved {
    let mut touched = Vec::new();
    resolve_tracking(store, focus, parsed, &mut touched)
}

fn apply_accessor(store: &GraphStore, ids: Vec<EntityId>, sorted: bool, accessor: Option<&Accessor>) -> Step {
    match accessor {
        None => Step::Many(ids),
        Some(Accessor::Filter(filters)) => {
            let filtered: Vec<EntityId> = ids.into_iter().filter(|id| filters.iter().all(|(field, value)| matches_filter(store, *id, field, value))).collect();
            Step::Many(filtered)
        }
        Some(Accessor::Index(n)) => {
            if !sorted {
                log::warn!(target: "dap-core", "indexing a non-sorted edge, treating as nil");
                return Step::Nil;
            }
            match ids.get(*n) {
                Some(id) => Step::One(*id),
                None => Step::Nil,
            }
        }
        Some(Accessor::Key(key)) => match ids.into_iter().find(|id| entity_key(store, *id).as_deref() == Some(key.as_str())) {
            Some(id) => Step::One(id),
            None => Step::Nil,
        },
    }
}

fn edge_from_debugger(store: &GraphStore, name: &str) -> Option<Edge> {
    match name {
        "sessions" => Some(store.debugger.sessions.clone()),
        "breakpoints" => Some(store.debugger.breakpoints.clone()),
        "sources" => Some(store.debugger.sources.clone()),
        "exceptionFilters" => Some(store.debugger.exception_filters.clone()),
        _ => None,
    }
}

fn edge_from_entity(store: &GraphStore, id: EntityId, name: &str) -> Option<Edge> {
    match id.kind() {
        EntityKind::Session => store
            .sessions
            .with(id, |s| match name {
                "threads" => Some(s.threads.clone()),
                "outputs" => Some(s.outputs.clone()),
                "sourceBindings" => Some(s.source_bindings.clone()),
                "bindings" => Some(s.bindings.clone()),
                "filterBindings" => Some(s.filter_bindings.clone()),
                "children" => Some(s.children.clone()),
                _ => None,
            })
            .ok()
            .flatten(),
        EntityKind::Thread => store.threads.with(id, |t| if name == "stacks" { Some(t.stacks.clone()) } else { None }).ok().flatten(),
        EntityKind::Stack => store.stacks.with(id, |s| if name == "frames" { Some(s.frames.clone()) } else { None }).ok().flatten(),
        EntityKind::Frame => store.frames.with(id, |f| if name == "scopes" { Some(f.scopes.clone()) } else { None }).ok().flatten(),
        EntityKind::Scope => store.scopes.with(id, |s| if name == "variables" { Some(s.variables.clone()) } else { None }).ok().flatten(),
        EntityKind::Variable => store.variables.with(id, |v| if name == "variables" { Some(v.variables.clone()) } else { None }).ok().flatten(),
        EntityKind::Source => store.sources.with(id, |s| if name == "bindings" { Some(s.bindings.clone()) } else { None }).ok().flatten(),
        EntityKind::Breakpoint => store.breakpoints.with(id, |b| if name == "bindings" { Some(b.bindings.clone()) } else { None }).ok().flatten(),
        EntityKind::ExceptionFilter => store.exception_filters.with(id, |f| if name == "bindings" { Some(f.bindings.clone()) } else { None }).ok().flatten(),
        _ => None,
    }
}

fn entity_key(store: &GraphStore, id: EntityId) -> Option<String> {
    match id.kind() {
        EntityKind::Session => store.sessions.with(id, |s| s.dap_id.get().map(|v| v.to_string())).ok().flatten().or(Some(format!("{}", id.index()))),
        EntityKind::Source => store.sources.with(id, |s| s.correlation_key.clone()).ok(),
        _ => Some(format!("{}", id.index())),
    }
}

fn matches_filter(store: &GraphStore, id: EntityId, field: &str, value: &FilterValue) -> bool {
    match (id.kind(), field) {
        (EntityKind::Breakpoint, "enabled") => store.breakpoints.with(id, |b| bool_eq(b.enabled.get(), value)).unwrap_or(false),
        (EntityKind::Breakpoint, "line") => store.breakpoints.with(id, |b| number_eq(b.location.line, value)).unwrap_or(false),
        (EntityKind::Breakpoint, "condition") => store.breakpoints.with(id, |b| string_eq(b.condition.get().as_deref(), value)).unwrap_or(false),
        (EntityKind::Session, "state") => store.sessions.with(id, |s| word_eq(&format!("{:?}", s.state.get()), value)).unwrap_or(false),
        (EntityKind::Thread, "state") => store.threads.with(id, |t| word_eq(&format!("{:?}", t.state.get()), value)).unwrap_or(false),
        (EntityKind::ExceptionFilter, "enabled") => store.exception_filters.with(id, |f| bool_eq(f.enabled.get(), value)).unwrap_or(false),
        (EntityKind::BreakpointBinding, "verified") => store.breakpoint_bindings.with(id, |b| bool_eq(b.verified.get(), value)).unwrap_or(false),
        _ => false,
    }
}

fn bool_eq(actual: bool, value: &FilterValue) -> bool {
    matches!(value, FilterValue::Bool(b) if *b == actual)
}

fn number_eq(actual: i64, value: &FilterValue) -> bool {
    matches!(value, FilterValue::Number(n) if *n == actual)
}

fn string_eq(actual: Option<&str>, value: &FilterValue) -> bool {
    let expected = match value {
        FilterValue::Quoted(s) | FilterValue::Word(s) => s.as_str(),
        _ => return false,
    };
    actual == Some(expected)
}

fn word_eq(actual: &str, value: &FilterValue) -> bool {
    match value {
        FilterValue::Word(w) => actual.eq_ignore_ascii_case(w),
        FilterValue::Quoted(w) => actual.eq_ignore_ascii_case(w),
        _ => false,
    }
}

fn apply_frame_offset(store: &GraphStore, frame_id: EntityId, offset: i64) -> Option<EntityId> {
    if frame_id.kind() != EntityKind::Frame {
        return Some(frame_id);
    }
    let (stack_id, index) = store.frames.with(frame_id, |f| (f.stack, f.index)).ok()?;
    let target = index + offset;
    if target < 0 {
        return None;
    }
    store.stacks.with(stack_id, |s| s.frames.nth(target as usize)).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entities::{Breakpoint, BreakpointLocation, Session, SourceOrigin, Source};
    use crate::uri::grammar::parse;

    fn no_focus(_: FocusKind) -> Option<EntityId> {
        None
    }

    #[test]
    fn resolves_debugger_rooted_collection() {
        let store = GraphStore::new();
        let source = store.sources.insert(store.minter(), Source::new("k", SourceOrigin::Path("/a.rs".into()), "a.rs"));
        let bp = store.breakpoints.insert(
            store.minter(),
            Breakpoint::new(BreakpointLocation { source, line: 3, column: None }),
        );
        store.debugger.breakpoints.link(bp);

        let parsed = parse("/breakpoints").unwrap();
        let resolved = resolve(&store, &no_focus, &parsed);
        assert_eq!(resolved, Resolved::Collection(vec![bp]));
    }

    #[test]
    fn filter_accessor_narrows_a_collection() {
        let store = GraphStore::new();
        let source = store.sources.insert(store.minter(), Source::new("k", SourceOrigin::Path("/a.rs".into()), "a.rs"));
        let enabled = store.breakpoints.insert(store.minter(), Breakpoint::new(BreakpointLocation { source, line: 1, column: None }));
        let disabled = store.breakpoints.insert(store.minter(), Breakpoint::new(BreakpointLocation { source, line: 2, column: None }));
        store.breakpoints.with(disabled, |b| b.enabled.set(false)).unwrap();
        store.debugger.breakpoints.link(enabled);
        store.debugger.breakpoints.link(disabled);

        let parsed = parse("/breakpoints(enabled=true)").unwrap();
        let resolved = resolve(&store, &no_focus, &parsed);
        assert_eq!(resolved, Resolved::Collection(vec![enabled]));
    }

    #[test]
    fn indexing_a_non_sorted_edge_resolves_to_nil() {
        let store = GraphStore::new();
        let source = store.sources.insert(store.minter(), Source::new("k", SourceOrigin::Path("/a.rs".into()), "a.rs"));
        let bp = store.breakpoints.insert(store.minter(), Breakpoint::new(BreakpointLocation { source, line: 1, column: None }));
        store.debugger.breakpoints.link(bp);

        let parsed = parse("/breakpoints[0]").unwrap();
        let resolved = resolve(&store, &no_focus, &parsed);
        assert!(resolved.is_nil());
    }

    #[test]
    fn focus_root_with_no_focus_set_resolves_to_nil() {
        let store = GraphStore::new();
        let parsed = parse("@session").unwrap();
        let resolved = resolve(&store, &no_focus, &parsed);
        assert!(resolved.is_nil());
    }

    #[test]
    fn focus_root_resolves_to_the_focused_entity() {
        let store = GraphStore::new();
        let session_id = store.sessions.insert(store.minter(), Session::new("launch", "launch", None));
        let focus = |kind: FocusKind| if kind == FocusKind::Session { Some(session_id) } else { None };

        let parsed = parse("@session").unwrap();
        let resolved = resolve(&store, &focus, &parsed);
        assert_eq!(resolved, Resolved::Entity(session_id));
    }

    #[test]
    fn unknown_edge_name_resolves_to_nil() {
        let store = GraphStore::new();
        let parsed = parse("/notAnEdge").unwrap();
        let resolved = resolve(&store, &no_focus, &parsed);
        assert!(resolved.is_nil());
    }

    #[test]
    fn key_accessor_finds_a_source_by_correlation_key() {
        let store = GraphStore::new();
        let source = store.sources.insert(store.minter(), Source::new("main.rs", SourceOrigin::Path("/main.rs".into()), "main.rs"));
        store.debugger.sources.link(source);

        let parsed = parse("/sources:main.rs").unwrap();
        let resolved = resolve(&store, &no_focus, &parsed);
        assert_eq!(resolved, Resolved::Entity(source));
    }
}
