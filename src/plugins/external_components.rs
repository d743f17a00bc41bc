//! Third-party components declared under `h5Components`

use crate::asset::{output_path, Asset, AssetKind};
use crate::compilation::{Compilation, StageTap};
use crate::compiler::{Compiler, Plugin};
use crate::error::{CompilerError, Result};
use crate::module::Module;
use crate::template::{TagRule, TagRules};
use crate::types::COMPONENT_OUTPUT_EXT;
use crate::utils::{maybe_npm_path, normalize_path};
use async_trait::async_trait;
use std::path::PathBuf;
use std::rc::Rc;

const SOURCE_EXTS: [&str; 4] = [".tsx", ".ts", ".jsx", ".js"];

pub struct ExternalComponentsPlugin;

impl Plugin for ExternalComponentsPlugin {
    fn name(&self) -> &'static str {
        "external-components"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.compilation.tap(
            "external-components",
            Rc::new(|cx: &mut Compilation| {
                cx.template_hooks
                    .tag_rule
                    .tap("external-components", Rc::new(external_tag_rules));
                cx.hooks
                    .process_assets
                    .tap("external-components", Rc::new(CopyExternalSources));
            }),
        );
    }
}

/// Maps every declared tag onto its component.
pub fn external_tag_rules(module: &Module, rules: &mut TagRules) {
    for tag in module.config.external_tags() {
        if let Some(component) = module.config.external_component(tag) {
            rules.insert(tag, TagRule::External(component));
        }
    }
}

/// Relative component sources shipped with the module are copied next to its output.
struct CopyExternalSources;

#[async_trait(?Send)]
impl StageTap for CopyExternalSources {
    async fn run(&self, cx: &Compilation) -> Result<()> {
        let config = &cx.module.config;
        for tag in config.external_tags() {
            let Some(component) = config.external_component(tag) else {
                continue;
            };
            let Some(src) = component.src.as_deref() else {
                log::warn!("[{}] external component '{}' has no src; it will not be imported", cx.name(), tag);
                continue;
            };
            if maybe_npm_path(src) || !src.starts_with('.') {
                continue;
            }

            let Some(source) = find_source(cx, src).await else {
                cx.report(CompilerError::resolution(
                    src,
                    format!("external component '{}' was not found", tag),
                ));
                continue;
            };
            let content = tokio::fs::read_to_string(&source).await?;
            let path = output_path(&cx.run.options, &source, COMPONENT_OUTPUT_EXT);
            cx.emit_asset(Asset::new(cx.name(), AssetKind::ExternalComponent, path, content));
        }
        Ok(())
    }
}

async fn find_source(cx: &Compilation, src: &str) -> Option<PathBuf> {
    let target = normalize_path(&cx.module.base_path.join(src));
    let candidates = std::iter::once(target.clone()).chain(
        SOURCE_EXTS
            .iter()
            .map(|ext| PathBuf::from(format!("{}{}", target.display(), ext))),
    );
    for candidate in candidates {
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleConfig;
    use crate::plugins::test_support::compilation;
    use crate::template::{parse_markup, TemplateEngine};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config() -> ModuleConfig {
        ModuleConfig::from_json(
            r#"{ "h5Components": {
                "ti-button": { "tag": "ti-button", "src": "@ti/ui", "props": { "size": "small" } },
                "local-chart": { "tag": "local-chart", "src": "./chart" },
                "map": "map"
            } }"#,
            Path::new("index.json"),
        )
        .unwrap()
    }

    #[test]
    fn test_tags_resolve_to_external_components() {
        let dir = TempDir::new().unwrap();
        let mut cx = compilation(dir.path(), "card", "Card", config());
        cx.template_hooks.tag_rule.tap("external-components", Rc::new(external_tag_rules));
        let doc = parse_markup(r#"<ti-button type="primary">Go</ti-button>"#, "index.wxml").unwrap();
        let compiled = TemplateEngine::new(&cx.template_hooks, &cx.module).compile(doc).unwrap();
        assert!(compiled.content.starts_with("<TiButton"));
        assert!(compiled.content.contains(r#"size="small""#));
    }

    #[tokio::test]
    async fn test_relative_sources_are_copied() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/card")).unwrap();
        fs::write(root.join("src/card/chart.tsx"), "export default () => null;").unwrap();
        let cx = compilation(root, "card", "Card", config());

        CopyExternalSources.run(&cx).await.unwrap();
        let context = cx.context();
        assert_eq!(context.assets.len(), 1);
        assert_eq!(context.assets[0].output_path, root.join("dist/card/chart.tsx"));
        assert!(cx.run.stats.borrow().diagnostics.is_empty());
    }
}
