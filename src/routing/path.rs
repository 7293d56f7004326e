//! Path helpers for mounting declared routes.
//!
//! Router scripts declare paths Express-style (`/users/:id`, `/files/*rest`).
//! The HTTP router wants `{id}` / `{*rest}`, and two patterns that only differ
//! in parameter names are the same route as far as matching is concerned.

use std::collections::BTreeMap;

/// Join path fragments with single slashes, always with a leading `/`.
///
/// Empty fragments and surplus slashes are dropped, so
/// `join_paths(&["/api/", "", "users/"])` is `/api/users`.
pub fn join_paths(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

/// Ensure a declared path starts with exactly one `/`.
pub fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    CatchAll(&'a str),
}

fn parse_segment(segment: &str) -> Segment<'_> {
    if let Some(name) = segment.strip_prefix(':') {
        return Segment::Param(name);
    }
    if let Some(rest) = segment.strip_prefix('*') {
        return Segment::CatchAll(if rest.is_empty() { "wildcard" } else { rest });
    }
    if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        return match inner.strip_prefix('*') {
            Some(name) => Segment::CatchAll(name),
            None => Segment::Param(inner),
        };
    }
    Segment::Static(segment)
}

/// Translate a declared path into the HTTP router's syntax.
pub fn to_router_path(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match parse_segment(s) {
            Segment::Static(s) => s.to_string(),
            Segment::Param(name) => format!("{{{}}}", name),
            Segment::CatchAll(name) => format!("{{*{}}}", name),
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Matching shape of a path: parameter names erased.
pub fn route_shape(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match parse_segment(s) {
            Segment::Static(s) => s,
            Segment::Param(_) => "{}",
            Segment::CatchAll(_) => "{*}",
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Extract parameters of `pattern` from a concrete request path.
///
/// Returns an empty map when the path does not fit the pattern.
pub fn match_params(pattern: &str, path: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut actual = path.split('/').filter(|s| !s.is_empty());

    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        match parse_segment(segment) {
            Segment::Static(expected) => match actual.next() {
                Some(s) if s == expected => {}
                _ => return BTreeMap::new(),
            },
            Segment::Param(name) => match actual.next() {
                Some(value) => {
                    params.insert(name.to_string(), value.to_string());
                }
                None => return BTreeMap::new(),
            },
            Segment::CatchAll(name) => {
                let rest: Vec<&str> = actual.by_ref().collect();
                params.insert(name.to_string(), rest.join("/"));
                break;
            }
        }
    }

    params
}
