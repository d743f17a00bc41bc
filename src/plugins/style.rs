//! Styles: the module's stylesheet and its `@import`s, bundled into one `.css.js` module
//!
//! The bundle is a function of the runtime's responsive-unit converter:
//! ``export default (rem) => `...` ``. Lengths become `${rem("24rpx")}` placeholders and, for
//! isolated modules, class and id selectors gain a `__<Module>` suffix.

use super::TextLoader;
use crate::asset::{output_path, Asset, AssetKind};
use crate::compilation::{Compilation, DependencyScanner, DependencySet, FileTransform, StageTap};
use crate::compiler::{Compiler, Plugin};
use crate::conditional::{CommentStyle, ConditionOptions};
use crate::error::Result;
use crate::file_resolver::{File, FileContent, FileDependency, FileMeta, META_ENTRY};
use crate::types::{FileKind, STYLE_OUTPUT_EXT};
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::Value;
use std::rc::Rc;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment pattern"));

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?['"]?([^'")\s;]+)['"]?\s*\)?\s*;?"#).expect("valid @import pattern")
});

static SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.#])(-?[_a-zA-Z][_a-zA-Z0-9-]*)").expect("valid selector pattern"));

static LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)(rpx|px)\b").expect("valid length pattern"));

/// `@import` targets of a stylesheet, in source order.
pub fn style_imports(source: &str) -> Vec<String> {
    let source = COMMENT.replace_all(source, "");
    IMPORT
        .captures_iter(&source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Appends `__<module>` to class and id names in selector preludes.
pub fn scope_selectors(css: &str, module: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pending = String::new();
    for c in css.chars() {
        match c {
            '{' => {
                if pending.trim_start().starts_with('@') {
                    out.push_str(&pending);
                } else {
                    let scoped = SELECTOR.replace_all(&pending, |caps: &Captures<'_>| {
                        format!("{}{}__{}", &caps[1], &caps[2], module)
                    });
                    out.push_str(&scoped);
                }
                out.push('{');
                pending.clear();
            }
            '}' | ';' => {
                out.push_str(&pending);
                out.push(c);
                pending.clear();
            }
            _ => pending.push(c),
        }
    }
    out.push_str(&pending);
    out
}

/// Turns one stylesheet into the body of the bundle's template literal.
pub fn rewrite_stylesheet(source: &str, scope: Option<&str>) -> String {
    let css = COMMENT.replace_all(source, "");
    let css = IMPORT.replace_all(&css, "");
    let css = match scope {
        Some(module) => scope_selectors(&css, module),
        None => css.into_owned(),
    };
    let css = css.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${");
    rewrite_lengths(&css).trim().to_string()
}

/// Rewrites lengths in declaration values only; selectors and at-rule preludes keep theirs.
fn rewrite_lengths(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pending = String::new();
    for c in css.chars() {
        match c {
            '{' => {
                out.push_str(&pending);
                out.push('{');
                pending.clear();
            }
            ';' | '}' => {
                out.push_str(&declaration_lengths(&pending));
                out.push(c);
                pending.clear();
            }
            _ => pending.push(c),
        }
    }
    out.push_str(&declaration_lengths(&pending));
    out
}

fn declaration_lengths(declaration: &str) -> String {
    let Some((property, value)) = declaration.split_once(':') else {
        return declaration.to_string();
    };
    let value = LENGTH.replace_all(value, |caps: &Captures<'_>| {
        format!("${{rem(\"{}{}\")}}", &caps[1], &caps[2])
    });
    format!("{}:{}", property, value)
}

pub fn style_bundle(parts: &[String]) -> String {
    format!("export default (rem) => `\n{}\n`;\n", parts.join("\n"))
}

const STYLE_SOURCE: ConditionOptions = ConditionOptions::new(CommentStyle::Block, true);

pub struct StylePlugin;

impl Plugin for StylePlugin {
    fn name(&self) -> &'static str {
        "style"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.compilation.tap(
            "style",
            Rc::new(|cx: &mut Compilation| {
                cx.hooks
                    .load_file
                    .for_kind(FileKind::Style)
                    .tap("style", Rc::new(TextLoader(STYLE_SOURCE)));
                cx.hooks
                    .collect_dependencies
                    .for_kind(FileKind::Script)
                    .tap("style", Rc::new(ModuleStylesheet));
                cx.hooks
                    .collect_dependencies
                    .for_kind(FileKind::Style)
                    .tap("style", Rc::new(StyleImports));
                cx.hooks
                    .transform
                    .for_kind(FileKind::Style)
                    .tap("style", Rc::new(RewriteStyle));
                cx.hooks.process_assets.tap("style", Rc::new(BundleStyles));
            }),
        );
    }
}

/// Pulls the module's stylesheet in from its root script.
struct ModuleStylesheet;

#[async_trait(?Send)]
impl DependencyScanner for ModuleStylesheet {
    async fn collect(&self, cx: &Compilation, file: &File, found: &DependencySet) -> Result<()> {
        if !file.is_entry() {
            return Ok(());
        }
        if let Some(style_path) = &cx.module.style_path {
            let mut meta = FileMeta::new();
            meta.insert(META_ENTRY.to_string(), Value::Bool(true));
            found.add(FileDependency::new(style_path.clone(), FileKind::Style).with_meta(meta));
        }
        Ok(())
    }
}

struct StyleImports;

#[async_trait(?Send)]
impl DependencyScanner for StyleImports {
    async fn collect(&self, cx: &Compilation, file: &File, found: &DependencySet) -> Result<()> {
        let Some(source) = file.text() else {
            return Ok(());
        };
        for raw in style_imports(&source) {
            if let Some(path) = cx.resolve_dependency(&raw, file.dir(), FileKind::Style).await {
                found.add(FileDependency::new(path, FileKind::Style));
            }
        }
        Ok(())
    }
}

struct RewriteStyle;

#[async_trait(?Send)]
impl FileTransform for RewriteStyle {
    async fn apply(&self, cx: &Compilation, content: FileContent, file: &File) -> Result<FileContent> {
        let source = content.into_text(&file.path)?;
        let scope = cx.module.style_isolated().then_some(cx.name());
        Ok(FileContent::Text(rewrite_stylesheet(&source, scope)))
    }
}

/// Imported stylesheets first, then the module's own.
struct BundleStyles;

#[async_trait(?Send)]
impl StageTap for BundleStyles {
    async fn run(&self, cx: &Compilation) -> Result<()> {
        let Some(style_path) = &cx.module.style_path else {
            return Ok(());
        };
        let files = cx.files_of(FileKind::Style);
        let (entry, imported): (Vec<_>, Vec<_>) = files.iter().partition(|f| f.is_entry());
        let parts: Vec<String> = imported
            .iter()
            .chain(entry.iter())
            .filter_map(|f| f.text())
            .filter(|text| !text.is_empty())
            .collect();

        let path = output_path(&cx.run.options, style_path, STYLE_OUTPUT_EXT);
        cx.emit_asset(Asset::new(cx.name(), AssetKind::StyleBundle, path.clone(), style_bundle(&parts)));
        cx.context_mut().style_bundle = Some(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::FileLoader;
    use crate::module::ModuleConfig;
    use crate::plugins::test_support::compilation;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_imports_are_found_outside_comments() {
        let source = r#"/* @import "old.wxss"; */
@import "../common/base.wxss";
@import url('theme.wxss');
.a { color: red; }"#;
        assert_eq!(style_imports(source), vec!["../common/base.wxss", "theme.wxss"]);
    }

    #[test]
    fn test_isolated_selectors_are_suffixed() {
        let css = ".title, #main .row:hover { color: #fff; margin: 0.5em; }\n@media (max-width: 100px) { .a { } }";
        assert_eq!(
            scope_selectors(css, "Card"),
            ".title__Card, #main__Card .row__Card:hover { color: #fff; margin: 0.5em; }\n@media (max-width: 100px) { .a__Card { } }"
        );
    }

    #[test]
    fn test_rewrite_stylesheet() {
        let source = "@import 'a.wxss';\n/* note */\n.title { font-size: 24rpx; border: 1px solid; content: `x`; }";
        assert_eq!(
            rewrite_stylesheet(source, Some("Card")),
            ".title__Card { font-size: ${rem(\"24rpx\")}; border: ${rem(\"1px\")} solid; content: \\`x\\`; }"
        );
        assert_eq!(
            rewrite_stylesheet(".t { width: 1.5rpx }", None),
            ".t { width: ${rem(\"1.5rpx\")} }"
        );
    }

    #[test]
    fn test_lengths_in_selectors_are_kept() {
        let source = ".w100px, #h20rpx:hover { width: 100px; }\n@media (max-width: 600px) { .p2px { margin: 0 2rpx } }";
        assert_eq!(
            rewrite_stylesheet(source, None),
            ".w100px, #h20rpx:hover { width: ${rem(\"100px\")}; }\n@media (max-width: 600px) { .p2px { margin: 0 ${rem(\"2rpx\")} } }"
        );
    }

    #[test]
    fn test_bundle_shape() {
        let bundle = style_bundle(&[".a {}".to_string(), ".b {}".to_string()]);
        assert_eq!(bundle, "export default (rem) => `\n.a {}\n.b {}\n`;\n");
    }

    #[tokio::test]
    async fn test_loader_drops_other_platform_rules() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/card")).unwrap();
        let path = root.join("src/card/index.wxss");
        fs::write(&path, ".a { }\n/* #ifndef H5 */\n.native { }\n/* #endif */\n.b { }\n").unwrap();
        let cx = compilation(root, "card", "Card", ModuleConfig::default());

        let loaded = TextLoader(STYLE_SOURCE).load(&cx, &path).await.unwrap().unwrap();
        let text = loaded.content.and_then(|c| c.as_text().map(str::to_string)).unwrap();
        assert_eq!(text, ".a { }\n\n\n\n.b { }\n");
    }
}
