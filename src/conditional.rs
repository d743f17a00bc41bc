//! Platform condition blocks in source files
//!
//! Every loader passes its text through [`strip_conditions`] before anything else sees it.
//! A block opens with `#ifdef NAME` or `#ifndef NAME` written inside a comment of the file's
//! comment style and closes with `#endif` in the same style. Conditions may list several
//! names joined by `||`. Blocks nest.
//!
//! ```text
//! // #ifdef H5                 /* #ifndef H5 */              <!-- #ifdef H5 || WEB -->
//! const web = true;            .native { }                   <view>web</view>
//! // #endif                    /* #endif */                  <!-- #endif -->
//! ```

use crate::error::{CompilerError, Result};
use regex::Regex;
use std::sync::LazyLock;

static LINE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*//\s*#(ifdef|ifndef|endif)\b(.*?)\s*$").expect("valid line directive pattern")
});

static BLOCK_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*/\*\s*#(ifdef|ifndef|endif)\b(.*?)\*/\s*$").expect("valid block directive pattern")
});

static XML_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*<!--\s*#(ifdef|ifndef|endif)\b(.*?)-->\s*$").expect("valid xml directive pattern")
});

/// Comment syntax the directives of a file are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `// #ifdef H5` in scripts, companion scripts and JSON configs.
    Line,
    /// `/* #ifdef H5 */` in stylesheets.
    Block,
    /// `<!-- #ifdef H5 -->` in markup.
    Xml,
}

impl CommentStyle {
    fn pattern(self) -> &'static Regex {
        match self {
            CommentStyle::Line => &LINE_DIRECTIVE,
            CommentStyle::Block => &BLOCK_DIRECTIVE,
            CommentStyle::Xml => &XML_DIRECTIVE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionOptions {
    pub style: CommentStyle,
    /// Blank out dropped lines instead of removing them, so line numbers survive.
    pub keep_lines: bool,
}

impl ConditionOptions {
    pub const fn new(style: CommentStyle, keep_lines: bool) -> Self {
        Self { style, keep_lines }
    }
}

enum Directive {
    Open { negated: bool, names: Vec<String> },
    Close,
}

fn directive(line: &str, style: CommentStyle) -> Option<Directive> {
    let caps = style.pattern().captures(line.trim_end_matches(['\r', '\n']))?;
    match &caps[1] {
        "endif" => Some(Directive::Close),
        keyword => Some(Directive::Open {
            negated: keyword == "ifndef",
            names: caps[2]
                .split("||")
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        }),
    }
}

/// Keeps the blocks whose condition holds for `defined` and drops the rest.
///
/// `file` only names the source in errors. An `#endif` without an opening directive and an
/// unterminated block are both parse errors.
pub fn strip_conditions(
    source: &str,
    defined: &[String],
    options: ConditionOptions,
    file: &str,
) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    // One entry per open block: whether everything up to and including it is active.
    let mut open: Vec<(usize, bool)> = Vec::new();

    for (index, line) in source.split_inclusive('\n').enumerate() {
        let active = open.last().map_or(true, |(_, active)| *active);
        match directive(line, options.style) {
            Some(Directive::Open { negated, names }) => {
                if names.is_empty() {
                    return Err(CompilerError::parse(file, index + 1, "condition without a platform name"));
                }
                let defined_here = names.iter().any(|name| defined.contains(name));
                open.push((index + 1, active && defined_here != negated));
            }
            Some(Directive::Close) => {
                if open.pop().is_none() {
                    return Err(CompilerError::parse(file, index + 1, "#endif without a matching #ifdef"));
                }
            }
            None if active => {
                out.push_str(line);
                continue;
            }
            None => {}
        }
        if options.keep_lines && line.ends_with('\n') {
            out.push('\n');
        }
    }

    match open.last() {
        Some((line, _)) => Err(CompilerError::parse(file, *line, "condition block is never closed")),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn h5() -> Vec<String> {
        vec!["H5".to_string()]
    }

    #[test]
    fn test_line_comments() {
        let source = "a();\n// #ifdef H5\nweb();\n// #endif\n// #ifdef WEAPP\nnative();\n// #endif\nb();\n";
        let out = strip_conditions(source, &h5(), ConditionOptions::new(CommentStyle::Line, false), "a.js").unwrap();
        assert_eq!(out, "a();\nweb();\nb();\n");
    }

    #[test]
    fn test_block_comments_keep_lines() {
        let source = ".a {}\n/* #ifndef H5 */\n.native {}\n/* #endif */\n.b {}";
        let out = strip_conditions(source, &h5(), ConditionOptions::new(CommentStyle::Block, true), "a.wxss").unwrap();
        assert_eq!(out, ".a {}\n\n\n\n.b {}");
    }

    #[test]
    fn test_xml_comments_nest_and_alternate() {
        let source = "<view>\n  <!-- #ifdef WEAPP || H5 -->\n  <text>shared</text>\n  <!-- #ifndef H5 -->\n  <text>native</text>\n  <!-- #endif -->\n  <!-- #endif -->\n</view>";
        let out = strip_conditions(source, &h5(), ConditionOptions::new(CommentStyle::Xml, false), "a.wxml").unwrap();
        assert_eq!(out, "<view>\n  <text>shared</text>\n</view>");
    }

    #[test]
    fn test_other_comment_styles_are_left_alone() {
        let source = "// #ifdef WEAPP\n.a {}\n// #endif\n";
        let out = strip_conditions(source, &h5(), ConditionOptions::new(CommentStyle::Block, false), "a.wxss").unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_unbalanced_blocks_are_parse_errors() {
        let options = ConditionOptions::new(CommentStyle::Line, false);
        let err = strip_conditions("// #ifdef H5\nx();\n", &h5(), options, "a.js").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("line 1"));

        let err = strip_conditions("x();\n// #endif\n", &h5(), options, "a.js").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
