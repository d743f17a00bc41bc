//! `{{ }}` span extraction

use regex::{Captures, Regex};
use std::sync::LazyLock;

static MUSTACHE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^{}]+)?\{\{(.*?)\}\}([^{}]+)?").expect("valid mustache pattern")
});

/// One `{{ code }}` span with the literal text directly around it.
#[derive(Debug, Clone, PartialEq)]
pub struct MustacheSpan {
    pub before: String,
    pub code: String,
    pub after: String,
}

pub fn has_mustache(value: &str) -> bool {
    MUSTACHE.is_match(value)
}

pub fn spans(value: &str) -> Vec<MustacheSpan> {
    MUSTACHE
        .captures_iter(value)
        .map(|caps| span_of(&caps))
        .collect()
}

/// Replaces every match of `pattern` with the output of a fallible `render`.
pub fn try_replace<E>(
    pattern: &Regex,
    value: &str,
    mut render: impl FnMut(&Captures<'_>) -> Result<String, E>,
) -> Result<String, E> {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in pattern.captures_iter(value) {
        let Some(full) = caps.get(0) else {
            continue;
        };
        out.push_str(&value[last..full.start()]);
        out.push_str(&render(&caps)?);
        last = full.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

fn span_of(caps: &Captures<'_>) -> MustacheSpan {
    MustacheSpan {
        before: caps.get(1).map_or("", |m| m.as_str()).to_string(),
        code: caps.get(2).map_or("", |m| m.as_str()).to_string(),
        after: caps.get(3).map_or("", |m| m.as_str()).to_string(),
    }
}

/// Rewrites every span with `render`, leaving text outside the spans untouched.
pub fn replace_spans<E>(
    value: &str,
    mut render: impl FnMut(&MustacheSpan) -> Result<String, E>,
) -> Result<String, E> {
    try_replace(&MUSTACHE, value, |caps| render(&span_of(caps)))
}

/// Inner code when the whole (trimmed) value is a single `{{ }}` span.
pub fn whole(value: &str) -> Option<&str> {
    let inner = value.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        None
    } else {
        Some(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_keep_surrounding_text() {
        let found = spans("Hi {{name}}, you have {{count}} items");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].before, "Hi ");
        assert_eq!(found[0].code, "name");
        assert_eq!(found[0].after, ", you have ");
        assert_eq!(found[1].before, "");
        assert_eq!(found[1].after, " items");
    }

    #[test]
    fn test_replace_spans_renders_each_match() {
        let out = replace_spans("Total: {{n}} pcs", |span| -> Result<String, ()> {
            Ok(format!("{}{{{}}}{}", span.before, span.code, span.after))
        })
        .unwrap();
        assert_eq!(out, "Total: {n} pcs");
    }

    #[test]
    fn test_whole_value_detection() {
        assert_eq!(whole(" {{ list }} "), Some(" list "));
        assert_eq!(whole("a {{b}}"), None);
        assert_eq!(whole("{{a}}{{b}}"), None);
        assert!(has_mustache("x-{{y}}"));
        assert!(!has_mustache("plain"));
    }
}
