//! Naming and path helpers shared across the pipeline

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static MAYBE_NPM_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[@\w](?:[^:]|$)").expect("valid npm path pattern"));

static LENGTH_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(rpx|px)").expect("valid length unit pattern"));

/// Upper-cases the first character.
pub fn first_letter_uppercase(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `foo-bar-baz` → `fooBarBaz`
pub fn camelcase(name: &str) -> String {
    name.split('-')
        .enumerate()
        .map(|(i, part)| {
            if i == 0 {
                part.to_string()
            } else {
                first_letter_uppercase(part)
            }
        })
        .collect()
}

/// `my-button` → `MyButton`, `card` → `Card`
pub fn strike2camel_case(name: &str) -> String {
    if name.contains('-') {
        first_letter_uppercase(&camelcase(name))
    } else {
        first_letter_uppercase(name)
    }
}

/// Rewrites `12rpx` / `12px` lengths into responsive-unit runtime calls.
///
/// With `as_placeholder` the call is wrapped as `${...}` for use inside a template literal.
pub fn rpx2rem(content: &str, as_placeholder: bool) -> String {
    LENGTH_UNIT
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let call = format!("this.props.wmrt.rem(\"{}{}\")", &caps[1], &caps[2]);
            if as_placeholder {
                format!("${{{}}}", call)
            } else {
                call
            }
        })
        .into_owned()
}

pub fn has_length_unit(content: &str) -> bool {
    LENGTH_UNIT.is_match(content)
}

/// Whether a raw import path may be a bare package name rather than a relative path.
pub fn maybe_npm_path(path: &str) -> bool {
    MAYBE_NPM_PATH.is_match(path)
}

/// Lexically normalizes a path, folding `.` and `..` segments.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(normalized.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Deduplication key: normalized, `/`-separated and lower-cased.
pub fn lower_case_normalize_path(path: &Path) -> String {
    normalize_path(path)
        .to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

/// Replaces everything after the first `.` of the file name with `extname`.
///
/// `a/index.wxs` with `.wxs.js` gives `a/index.wxs.js`.
pub fn change_extname(path: &Path, extname: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}{}", stem, extname);
    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Sibling of a markup file with another extension (`index.wxml` → `index.wxss`).
pub fn sibling_path(template_path: &Path, ext: &str) -> PathBuf {
    change_extname(template_path, ext)
}

/// Relative path from `base` to `path`, walking up with `..` where needed.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    let base = normalize_path(base);
    let path = normalize_path(path);
    let base_parts: Vec<_> = base.components().collect();
    let path_parts: Vec<_> = path.components().collect();

    let common = base_parts
        .iter()
        .zip(path_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }
    relative
}

/// Import specifier from a directory to a file, always `./`- or `../`-prefixed and `/`-separated.
pub fn import_specifier(from_dir: &Path, to: &Path) -> String {
    let relative = relative_path(from_dir, to).to_string_lossy().replace('\\', "/");
    if relative.starts_with("../") {
        relative
    } else {
        format!("./{}", relative)
    }
}
