//! Shared constants and small value types

use serde::Serialize;
use std::fmt;

/// Kinds of source files taking part in a module's file graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    Template,
    Script,
    Style,
    CompanionScript,
}

impl FileKind {
    pub const ALL: [FileKind; 4] = [
        FileKind::Template,
        FileKind::Script,
        FileKind::Style,
        FileKind::CompanionScript,
    ];

    pub const fn index(self) -> usize {
        match self {
            FileKind::Template => 0,
            FileKind::Script => 1,
            FileKind::Style => 2,
            FileKind::CompanionScript => 3,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "wxml" => Some(FileKind::Template),
            "js" | "ts" => Some(FileKind::Script),
            "wxss" => Some(FileKind::Style),
            "wxs" => Some(FileKind::CompanionScript),
            _ => None,
        }
    }

    /// Extensions tried, in order, when resolving an import of this kind.
    pub fn resolve_extensions(self) -> &'static [&'static str] {
        match self {
            FileKind::Template => &[TEMPLATE_EXT],
            FileKind::Script => &[".ts", ".js"],
            FileKind::Style => &[STYLE_EXT],
            FileKind::CompanionScript => &[COMPANION_EXT],
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Template => "template",
            FileKind::Script => "script",
            FileKind::Style => "style",
            FileKind::CompanionScript => "companion-script",
        };
        f.write_str(name)
    }
}

// Source extensions
pub const TEMPLATE_EXT: &str = ".wxml";
pub const CONFIG_EXT: &str = ".json";
pub const STYLE_EXT: &str = ".wxss";
pub const COMPANION_EXT: &str = ".wxs";
pub const SCRIPT_EXTS: [&str; 2] = [".js", ".ts"];

// Output extensions
pub const COMPONENT_OUTPUT_EXT: &str = ".tsx";
pub const STYLE_OUTPUT_EXT: &str = ".css.js";
pub const COMPANION_OUTPUT_EXT: &str = ".wxs.js";

/// Directive attribute prefix in markup.
pub const DIRECTIVE_PREFIX: &str = "x:";

/// Reserved prefix for paths into installed mini-program packages.
pub const PACKAGE_NPM_PREFIX: &str = "/miniprogram_npm";

/// Manifest field naming a package's mini-program sub-root.
pub const PACKAGE_SUBROOT_FIELD: &str = "miniprogram";

/// Runtime module imported by generated code.
pub const RUNTIME_PACKAGE: &str = "@matrix/runtime";

/// Class prefix of the element wrapping every generated component.
pub const COMPONENT_CLASS_PREFIX: &str = "matrix-component__";

/// Source tag → target tag.
pub const TAG_NAME_MAP: &[(&str, &str)] = &[
    ("view", "div"),
    ("text", "span"),
    ("image", "img"),
    ("block", "React.Fragment"),
    ("button", "button"),
    ("input", "input"),
    ("video", "video"),
    ("audio", "audio"),
    ("a", "a"),
    ("hr", "hr"),
    ("slot", "Slot"),
];

/// Event attribute → target prop.
pub const EVENTS_MAP: &[(&str, &str)] = &[
    ("bindtap", "onClick"),
    ("bind:tap", "onClick"),
    ("catchtap", "onClick"),
    ("catch:tap", "onClick"),
    ("bindinput", "onChange"),
    ("bindtouchstart", "onTouchStart"),
    ("bindtouchmove", "onTouchMove"),
    ("bindtouchend", "onTouchEnd"),
    ("bindtouchcancel", "onTouchCancel"),
    ("bind:touchstart", "onTouchStart"),
    ("bind:touchmove", "onTouchMove"),
    ("bind:touchend", "onTouchEnd"),
    ("bind:touchcancel", "onTouchCancel"),
];

/// Attribute → target prop, for attributes needing a rename.
pub const ATTRS_MAP: &[(&str, &str)] = &[
    ("class", "className"),
    ("ext-class", "extClass"),
    ("ext-style", "extStyle"),
];

/// Elements that never carry children.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "image", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub fn lookup<'a>(table: &'a [(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_indices_are_dense() {
        for (i, kind) in FileKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_lookup_tables() {
        assert_eq!(lookup(TAG_NAME_MAP, "view"), Some("div"));
        assert_eq!(lookup(EVENTS_MAP, "catch:tap"), Some("onClick"));
        assert_eq!(lookup(ATTRS_MAP, "style"), None);
        assert_eq!(FileKind::from_extension("wxs"), Some(FileKind::CompanionScript));
    }
}
