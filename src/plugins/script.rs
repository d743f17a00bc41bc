//! Scripts: the root script is inlined into the component, imported scripts are copied

use super::{in_node_modules, TextLoader};
use crate::asset::{output_path, Asset, AssetKind};
use crate::compilation::{Compilation, DependencyScanner, DependencySet, StageTap};
use crate::compiler::{Compiler, Plugin};
use crate::conditional::{CommentStyle, ConditionOptions};
use crate::error::Result;
use crate::file_resolver::{File, FileDependency, FileResolver, ResolveOptions};
use crate::types::FileKind;
use crate::utils::maybe_npm_path;
use async_trait::async_trait;
use regex::Regex;
use std::rc::Rc;
use std::sync::LazyLock;

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:import|export)\s+(?:[\w*${}\s,]+\s+from\s+)?['"]([^'"]+)['"]"#)
        .expect("valid import pattern")
});

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid require pattern")
});

/// Import and require specifiers of a script, in source order.
pub fn import_specifiers(source: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = IMPORT
        .captures_iter(source)
        .chain(REQUIRE.captures_iter(source))
        .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .collect();
    found.sort();
    found.into_iter().map(|(_, spec)| spec).collect()
}

const SCRIPT_SOURCE: ConditionOptions = ConditionOptions::new(CommentStyle::Line, true);

pub struct ScriptPlugin;

impl Plugin for ScriptPlugin {
    fn name(&self) -> &'static str {
        "script"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.compilation.tap(
            "script",
            Rc::new(|cx: &mut Compilation| {
                cx.hooks
                    .load_file
                    .for_kind(FileKind::Script)
                    .tap("script", Rc::new(TextLoader(SCRIPT_SOURCE)));
                cx.hooks
                    .collect_dependencies
                    .for_kind(FileKind::Script)
                    .tap("script", Rc::new(ScriptImports));
                cx.hooks.process_assets.tap("script", Rc::new(EmitScripts));
            }),
        );
    }
}

struct ScriptImports;

#[async_trait(?Send)]
impl DependencyScanner for ScriptImports {
    async fn collect(&self, cx: &Compilation, file: &File, found: &DependencySet) -> Result<()> {
        let Some(source) = file.text() else {
            return Ok(());
        };
        for raw in import_specifiers(&source) {
            let resolved = if maybe_npm_path(&raw) {
                // Unresolved package imports are left to the bundler.
                FileResolver::resolve_entry(&raw, &ResolveOptions::for_kind(file.dir(), FileKind::Script)).await
            } else {
                cx.resolve_dependency(&raw, file.dir(), FileKind::Script).await
            };
            match resolved {
                Some(path) if in_node_modules(&path) => {
                    log::trace!("[{}] {} is an installed package", cx.name(), raw)
                }
                Some(path) => found.add(FileDependency::new(path, FileKind::Script)),
                None => log::trace!("[{}] leaving import '{}' as is", cx.name(), raw),
            }
        }
        Ok(())
    }
}

struct EmitScripts;

#[async_trait(?Send)]
impl StageTap for EmitScripts {
    async fn run(&self, cx: &Compilation) -> Result<()> {
        for file in cx.files_of(FileKind::Script) {
            let text = file.text().unwrap_or_default();
            if file.is_entry() {
                cx.context_mut().entry_script = Some(text);
            } else {
                let path = output_path(&cx.run.options, &file.path, ".js");
                cx.emit_asset(Asset::new(cx.name(), AssetKind::Script, path, text));
            }
        }
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
    fn test_import_specifiers() {
        let source = r#"
import React from 'react';
import { a, b } from "./util";
import './side-effect';
export * from '../shared/index';
const fmt = require('./fmt');
const text = "import x from 'nope'";
"#;
        assert_eq!(
            import_specifiers(source),
            vec!["react", "./util", "./side-effect", "../shared/index", "./fmt"]
        );
    }

    #[tokio::test]
    async fn test_loader_keeps_only_h5_blocks() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/card")).unwrap();
        let path = root.join("src/card/index.js");
        fs::write(
            &path,
            "// #ifdef WEAPP\nimport wx from './wx';\n// #endif\n// #ifdef H5\nimport web from './web';\n// #endif\nComponent({})\n",
        )
        .unwrap();
        let cx = compilation(root, "card", "Card", ModuleConfig::default());

        let loaded = TextLoader(SCRIPT_SOURCE).load(&cx, &path).await.unwrap().unwrap();
        let text = loaded.content.and_then(|c| c.as_text().map(str::to_string)).unwrap();
        assert_eq!(import_specifiers(&text), vec!["./web"]);
        assert_eq!(text.lines().count(), 7);
        assert!(loaded.source.unwrap().contains("./wx"));
    }
}
