//! Companion scripts (`.wxs`): collected from the module and its markup, emitted as ES modules

use super::TextLoader;
use crate::asset::{output_path, Asset, AssetKind};
use crate::compilation::{Compilation, DependencyScanner, DependencySet, FileTransform, StageTap};
use crate::compiler::{Compiler, Plugin};
use crate::conditional::{strip_conditions, CommentStyle, ConditionOptions};
use crate::error::{CompilerError, Result};
use crate::file_resolver::{File, FileContent, FileDependency};
use crate::template::CompanionKind;
use crate::types::{FileKind, COMPANION_EXT, COMPANION_OUTPUT_EXT, PACKAGE_NPM_PREFIX, RUNTIME_PACKAGE};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::rc::Rc;
use std::sync::LazyLock;

static MODULE_EXPORTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"module\.exports\s*=").expect("valid exports pattern"));

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\(\s*(['"])([^'"]+)['"]\s*\)"#).expect("valid require pattern")
});

/// Rewrites a companion script into an ES module backed by the runtime.
pub fn rewrite_companion(source: &str) -> String {
    let body = MODULE_EXPORTS.replace_all(source, "export default ");
    let body = REQUIRE.replace_all(&body, |caps: &Captures<'_>| {
        let target = &caps[2];
        match target.strip_suffix(COMPANION_EXT) {
            Some(stem) => format!("require({q}{}{}{q})", stem, COMPANION_OUTPUT_EXT, q = &caps[1]),
            None => caps[0].to_string(),
        }
    });
    format!(
        "import {{ wxsRuntime }} from '{}';\nvar getRegExp = wxsRuntime.getRegExp;\n{}",
        RUNTIME_PACKAGE, body
    )
}

const COMPANION_SOURCE: ConditionOptions = ConditionOptions::new(CommentStyle::Line, false);

pub struct CompanionPlugin;

impl Plugin for CompanionPlugin {
    fn name(&self) -> &'static str {
        "companion"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.compilation.tap(
            "companion",
            Rc::new(|cx: &mut Compilation| {
                cx.hooks
                    .load_file
                    .for_kind(FileKind::CompanionScript)
                    .tap("companion", Rc::new(TextLoader(COMPANION_SOURCE)));
                cx.hooks
                    .collect_dependencies
                    .for_kind(FileKind::Script)
                    .tap("companion", Rc::new(ModuleCompanions));
                cx.hooks
                    .collect_dependencies
                    .for_kind(FileKind::CompanionScript)
                    .tap("companion", Rc::new(CompanionRequires));
                cx.hooks
                    .transform
                    .for_kind(FileKind::CompanionScript)
                    .tap("companion", Rc::new(RewriteCompanion));
                cx.hooks.process_assets.tap("companion", Rc::new(EmitCompanions));
            }),
        );
    }
}

/// Sibling `.wxs` files plus those the markup imports with `<wxs src>`.
struct ModuleCompanions;

#[async_trait(?Send)]
impl DependencyScanner for ModuleCompanions {
    async fn collect(&self, cx: &Compilation, file: &File, found: &DependencySet) -> Result<()> {
        if !file.is_entry() {
            return Ok(());
        }
        for path in &cx.module.companion_script_paths {
            found.add(FileDependency::new(path.clone(), FileKind::CompanionScript));
        }

        let declared: Vec<_> = cx
            .context()
            .template
            .iter()
            .flat_map(|t| t.registry.companions.iter())
            .filter(|c| c.kind == CompanionKind::External && !c.import_url.starts_with(PACKAGE_NPM_PREFIX))
            .cloned()
            .collect();
        for companion in declared {
            let exists = tokio::fs::metadata(&companion.source_path)
                .await
                .is_ok_and(|m| m.is_file());
            if exists {
                found.add(FileDependency::new(companion.source_path.clone(), FileKind::CompanionScript));
            } else {
                cx.report(CompilerError::resolution(
                    companion.import_url.clone(),
                    format!("companion module '{}' was not found", companion.name),
                ));
            }
        }
        Ok(())
    }
}

struct CompanionRequires;

#[async_trait(?Send)]
impl DependencyScanner for CompanionRequires {
    async fn collect(&self, cx: &Compilation, file: &File, found: &DependencySet) -> Result<()> {
        let Some(source) = file.text() else {
            return Ok(());
        };
        for caps in REQUIRE.captures_iter(&source) {
            if let Some(path) = cx.resolve_dependency(&caps[2], file.dir(), FileKind::CompanionScript).await {
                found.add(FileDependency::new(path, FileKind::CompanionScript));
            }
        }
        Ok(())
    }
}

struct RewriteCompanion;

#[async_trait(?Send)]
impl FileTransform for RewriteCompanion {
    async fn apply(&self, _cx: &Compilation, content: FileContent, file: &File) -> Result<FileContent> {
        let source = content.into_text(&file.path)?;
        Ok(FileContent::Text(rewrite_companion(&source)))
    }
}

struct EmitCompanions;

#[async_trait(?Send)]
impl StageTap for EmitCompanions {
    async fn run(&self, cx: &Compilation) -> Result<()> {
        let options = &cx.run.options;
        for file in cx.files_of(FileKind::CompanionScript) {
            let path = output_path(options, &file.path, COMPANION_OUTPUT_EXT);
            let content = file.text().unwrap_or_default();
            cx.emit_asset(Asset::new(cx.name(), AssetKind::CompanionScript, path, content));
        }

        let inline: Vec<_> = cx
            .context()
            .template
            .iter()
            .flat_map(|t| t.registry.companions.iter())
            .filter(|c| c.kind == CompanionKind::Inline)
            .cloned()
            .collect();
        for companion in inline {
            let path = output_path(options, &companion.source_path, COMPANION_OUTPUT_EXT);
            let source = strip_conditions(
                &companion.content,
                &options.conditions,
                COMPANION_SOURCE,
                &companion.source_path.display().to_string(),
            )?;
            let content = rewrite_companion(&source);
            cx.emit_asset(Asset::new(cx.name(), AssetKind::CompanionScript, path, content));
        }
        Ok(())
    }
}
