//! URI grammar and parser (spec.md §4.C.4). Hand-written recursive
//! descent over a `Peekable<Chars>` — the grammar has no recursive
//! expression sublanguage (just filters/index/key accessors), so a
//! combinator parser crate would be overkill here; see DESIGN.md for why
//! this isn't built on the teacher's query-language parser crate.
//!
//! ```text
//! uri      := "/" path? | "@" focus path-tail
//! focus    := "debugger" | "session" | "thread" | "frame" ("+"|"-" digits)?
//! path     := segment ("/" segment)*
//! segment  := name accessor?
//! accessor := "(" filter ("," filter)* ")" | "[" digits "]" | ":" key
//! filter   := field "=" value
//! value    := "true" | "false" | digits | bare-word | '"' quoted '"'
//! ```
//!
//! Malformed input never panics or raises — [`parse`] returns `None`,
//! and callers treat that as a URI resolving to nil (spec.md §4.C
//! "Errors").

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusKind {
    Debugger,
    Session,
    Thread,
    Frame,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Debugger,
    Focus { kind: FocusKind, relative: Option<i64> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Bool(bool),
    Number(i64),
    Word(String),
    Quoted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Filter(Vec<(String, FilterValue)>),
    Index(usize),
    Key(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub accessor: Option<Accessor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUri {
    pub root: Root,
    pub segments: Vec<Segment>,
}

pub fn parse(input: &str) -> Option<ParsedUri> {
    let mut chars = input.chars().peekable();
    let root = match chars.next()? {
        '/' => Root::Debugger,
        '@' => parse_focus(&mut chars)?,
        _ => return None,
    };
    let mut segments = Vec::new();
    while chars.peek().is_some() {
        if chars.peek() == Some(&'/') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        segments.push(parse_segment(&mut chars)?);
    }
    Some(ParsedUri { root, segments })
}

fn parse_focus(chars: &mut Peekable<Chars>) -> Option<Root> {
    let name = take_while(chars, |c| c.is_alphanumeric());
    let kind = match name.as_str() {
        "debugger" => FocusKind::Debugger,
        "session" => FocusKind::Session,
        "thread" => FocusKind::Thread,
        "frame" => FocusKind::Frame,
        _ => return None,
    };
    let relative = match chars.peek() {
        Some('+') => {
            chars.next();
            let digits = take_while(chars, |c| c.is_ascii_digit());
            Some(if digits.is_empty() { 1 } else { digits.parse().ok()? })
        }
        Some('-') => {
            chars.next();
            let digits = take_while(chars, |c| c.is_ascii_digit());
            Some(-(if digits.is_empty() { 1 } else { digits.parse().ok()? }))
        }
        _ => None,
    };
    Some(Root::Focus { kind, relative })
}

fn parse_segment(chars: &mut Peekable<Chars>) -> Option<Segment> {
    let name = take_while(chars, |c| c.is_alphanumeric() || c == '_');
    if name.is_empty() {
        return None;
    }
    let accessor = match chars.peek() {
        Some('(') => {
            chars.next();
            Some(Accessor::Filter(parse_filters(chars)?))
        }
        Some('[') => {
            chars.next();
            let digits = take_while(chars, |c| c.is_ascii_digit());
            if chars.next() != Some(']') {
                return None;
            }
            Some(Accessor::Index(digits.parse().ok()?))
        }
        Some(':') => {
            chars.next();
            Some(Accessor::Key(take_while(chars, |c| c != '/')))
        }
        _ => None,
    };
    Some(Segment { name, accessor })
}

fn parse_filters(chars: &mut Peekable<Chars>) -> Option<Vec<(String, FilterValue)>> {
    let mut filters = Vec::new();
    loop {
        let field = take_while(chars, |c| c.is_alphanumeric() || c == '_');
        if field.is_empty() {
            return None;
        }
        if chars.next() != Some('=') {
            return None;
        }
        let value = parse_value(chars)?;
        filters.push((field, value));
        match chars.peek() {
            Some(',') => {
                chars.next();
            }
            Some(')') => {
                chars.next();
                return Some(filters);
            }
            _ => return None,
        }
    }
}

fn parse_value(chars: &mut Peekable<Chars>) -> Option<FilterValue> {
    if chars.peek() == Some(&'"') {
        chars.next();
        let mut s = String::new();
        loop {
            match chars.next()? {
                '"' => return Some(FilterValue::Quoted(s)),
                c => s.push(c),
            }
        }
    }
    let token = take_while(chars, |c| c != ',' && c != ')');
    match token.as_str() {
        "true" => Some(FilterValue::Bool(true)),
        "false" => Some(FilterValue::Bool(false)),
        _ => match token.parse::<i64>() {
            Ok(n) => Some(FilterValue::Number(n)),
            Err(_) => Some(FilterValue::Word(token)),
        },
    }
}

fn take_while(chars: &mut Peekable<Chars>, pred: impl Fn(char) -> bool) -> String {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if pred(c) {
            s.push(c);
            chars.next();
        } else {
            break;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_debugger_root_with_filter() {
        let uri = parse("/breakpoints(enabled=true,line=5)").unwrap();
        assert_eq!(uri.root, Root::Debugger);
        assert_eq!(uri.segments.len(), 1);
        assert_eq!(uri.segments[0].name, "breakpoints");
        assert_eq!(
            uri.segments[0].accessor,
            Some(Accessor::Filter(vec![
                ("enabled".into(), FilterValue::Bool(true)),
                ("line".into(), FilterValue::Number(5)),
            ]))
        );
    }

    #[test]
    fn parses_quoted_filter_value_with_special_chars() {
        let uri = parse(r#"/breakpoints(condition="x > 10")"#).unwrap();
        assert_eq!(
            uri.segments[0].accessor,
            Some(Accessor::Filter(vec![("condition".into(), FilterValue::Quoted("x > 10".into()))]))
        );
    }

    #[test]
    fn parses_focus_with_relative_offset() {
        let uri = parse("@frame+1").unwrap();
        assert_eq!(uri.root, Root::Focus { kind: FocusKind::Frame, relative: Some(1) });
        assert!(uri.segments.is_empty());
    }

    #[test]
    fn parses_nested_index_after_focus() {
        let uri = parse("@thread/stacks[0]/frames[0]").unwrap();
        assert_eq!(uri.root, Root::Focus { kind: FocusKind::Thread, relative: None });
        assert_eq!(uri.segments[0].accessor, Some(Accessor::Index(0)));
        assert_eq!(uri.segments[1].accessor, Some(Accessor::Index(0)));
    }

    #[test]
    fn malformed_uri_returns_none() {
        assert!(parse("not-a-uri").is_none());
        assert!(parse("/sessions(").is_none());
        assert!(parse("@unknown").is_none());
    }
}
