//! Module discovery: every markup file under the entry directory, plus the components they use

use crate::compiler::{Compiler, Plugin};
use crate::conditional::{strip_conditions, CommentStyle, ConditionOptions};
use crate::error::CompilerError;
use crate::module::{module_name, package_import_source, IncludedComponent, ModuleConfig, ModuleGraph, ModuleSpec};
use crate::types::{COMPANION_EXT, CONFIG_EXT, PACKAGE_NPM_PREFIX, SCRIPT_EXTS, STYLE_EXT, TEMPLATE_EXT};
use crate::utils::{maybe_npm_path, normalize_path, sibling_path};
use crate::CompilerOptions;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use walkdir::WalkDir;

const CONFIG_SOURCE: ConditionOptions = ConditionOptions::new(CommentStyle::Line, false);

pub struct EntryPlugin;

impl Plugin for EntryPlugin {
    fn name(&self) -> &'static str {
        "entry"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler
            .hooks
            .entry_dependency
            .tap("entry", Rc::new(discover_modules));
    }
}

/// Adds a module for every `*.wxml` under the entry directory, following `usingComponents`.
pub fn discover_modules(options: &CompilerOptions, graph: &mut ModuleGraph) {
    let entry_dir = normalize_path(&options.entry_dir());
    if !entry_dir.is_dir() {
        graph.report(CompilerError::resolution(
            entry_dir.display().to_string(),
            "entry directory does not exist",
        ));
        return;
    }

    let mut templates: Vec<PathBuf> = WalkDir::new(&entry_dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            name != "node_modules" && name != PACKAGE_NPM_PREFIX.trim_start_matches('/')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.to_string_lossy().ends_with(TEMPLATE_EXT))
        .collect();
    templates.sort();
    log::debug!("found {} markup files under {}", templates.len(), entry_dir.display());

    for template in templates {
        let name = default_name(&template);
        add_module(&entry_dir, &options.conditions, graph, &template, name);
    }
}

/// Adds the module at `template` and everything it uses. Returns false when it was skipped.
fn add_module(
    entry_dir: &Path,
    conditions: &[String],
    graph: &mut ModuleGraph,
    template: &Path,
    name: String,
) -> bool {
    if graph.contains(template) {
        return true;
    }
    let Some(mut spec) = load_spec(entry_dir, conditions, graph, template, name) else {
        return false;
    };

    let base_path = spec.template_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut follow = Vec::new();
    for (tag, raw) in &spec.config.using_components {
        if raw.starts_with(PACKAGE_NPM_PREFIX) {
            spec.included_components.insert(tag.clone(), included(package_import_source(raw)));
            continue;
        }
        match resolve_component(entry_dir, &base_path, raw) {
            Some(dependency) => {
                spec.included_components.insert(tag.clone(), included(raw.clone()));
                follow.push((tag.clone(), dependency));
            }
            None if maybe_npm_path(raw) => {
                spec.included_components.insert(tag.clone(), included(raw.clone()));
            }
            None => graph.report(CompilerError::resolution(
                raw.clone(),
                format!("component '{}' used by {} was not found", tag, spec.name),
            )),
        }
    }

    let issuer = spec.template_path.clone();
    graph.add(spec);
    for (tag, dependency) in follow {
        if add_module(entry_dir, conditions, graph, &dependency, module_name(&tag)) {
            graph.add_edge(&issuer, &dependency);
        }
    }
    true
}

/// `card/index.wxml` and `card.wxml` are both `Card`.
fn default_name(template: &Path) -> String {
    let stem = template.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let raw = if stem == "index" {
        template
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(stem)
    } else {
        stem
    };
    module_name(&raw)
}

fn included(from: String) -> IncludedComponent {
    IncludedComponent {
        from,
        default_export: true,
    }
}

/// `<path>.wxml`, then `<path>/index.wxml`. Absolute paths start at the entry directory.
fn resolve_component(entry_dir: &Path, base_path: &Path, raw: &str) -> Option<PathBuf> {
    let target = match raw.strip_prefix('/') {
        Some(rest) => entry_dir.join(rest),
        None => base_path.join(raw),
    };
    let target = normalize_path(&target);
    let file = PathBuf::from(format!("{}{}", target.display(), TEMPLATE_EXT));
    if file.is_file() {
        return Some(file);
    }
    let index = target.join(format!("index{}", TEMPLATE_EXT));
    index.is_file().then_some(index)
}

/// Reads the sibling files of a markup file. Modules without a config or a script are skipped.
fn load_spec(
    entry_dir: &Path,
    conditions: &[String],
    graph: &mut ModuleGraph,
    template: &Path,
    name: String,
) -> Option<ModuleSpec> {
    let template_path = normalize_path(template);
    let config_path = sibling_path(&template_path, CONFIG_EXT);
    let content = match fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("skipping {}: cannot read {}: {}", name, config_path.display(), e);
            graph.report(CompilerError::config(
                config_path.display().to_string(),
                format!("missing component config: {}", e),
            ));
            return None;
        }
    };
    let config = strip_conditions(&content, conditions, CONFIG_SOURCE, &config_path.display().to_string())
        .and_then(|content| ModuleConfig::from_json(&content, &config_path));
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            graph.report(err);
            ModuleConfig::default()
        }
    };

    let Some(script_path) = SCRIPT_EXTS
        .iter()
        .map(|ext| sibling_path(&template_path, ext))
        .find(|path| path.is_file())
    else {
        log::error!("skipping {}: no script next to {}", name, template_path.display());
        graph.report(CompilerError::resolution(
            template_path.display().to_string(),
            "module has no .js or .ts script",
        ));
        return None;
    };

    let style_path = Some(sibling_path(&template_path, STYLE_EXT)).filter(|p| p.is_file());
    let companion_script_paths = template_path
        .parent()
        .map(companion_scripts)
        .unwrap_or_default();

    Some(ModuleSpec {
        name,
        entry_root: entry_dir.to_path_buf(),
        template_path,
        script_path,
        config,
        style_path,
        companion_script_paths,
        included_components: BTreeMap::new(),
        library_sources: Vec::new(),
    })
}

fn companion_scripts(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.to_string_lossy().ends_with(COMPANION_EXT))
        .collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn discover(root: &Path) -> (Vec<Rc<crate::module::Module>>, Vec<CompilerError>) {
        let mut graph = ModuleGraph::new();
        discover_modules(&CompilerOptions::new(root), &mut graph);
        let diagnostics = graph.take_diagnostics();
        (graph.seal().to_vec(), diagnostics)
    }

    #[test]
    fn test_discovers_modules_and_sibling_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/user-card/index.wxml", "<view/>");
        write(root, "src/user-card/index.json", "{}");
        write(root, "src/user-card/index.ts", "Component({})");
        write(root, "src/user-card/index.wxss", ".a {}");
        write(root, "src/user-card/fmt.wxs", "module.exports = {}");

        let (modules, diagnostics) = discover(root);
        assert!(diagnostics.is_empty());
        assert_eq!(modules.len(), 1);
        let card = &modules[0];
        assert_eq!(card.name, "UserCard");
        assert!(card.script_path.ends_with("user-card/index.ts"));
        assert!(card.style_path.as_ref().unwrap().ends_with("user-card/index.wxss"));
        assert_eq!(card.companion_script_paths.len(), 1);
    }

    #[test]
    fn test_missing_config_skips_module() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/orphan/index.wxml", "<view/>");
        write(root, "src/orphan/index.js", "Component({})");

        let (modules, diagnostics) = discover(root);
        assert!(modules.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind(), ErrorKind::Config);
    }

    #[test]
    fn test_malformed_config_degrades_to_default() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/home/index.wxml", "<view/>");
        write(root, "src/home/index.json", "{ nope");
        write(root, "src/home/index.js", "Page({})");

        let (modules, diagnostics) = discover(root);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].config, ModuleConfig::default());
        assert_eq!(diagnostics[0].kind(), ErrorKind::Config);
    }

    #[test]
    fn test_using_components_are_followed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/pages/home/index.wxml", "<card/><ui-button/><foo/>");
        write(
            root,
            "src/pages/home/index.json",
            r#"{ "usingComponents": {
                "card": "/components/card",
                "ui-button": "/miniprogram_npm/@ti/ui/button",
                "foo": "./foo"
            } }"#,
        );
        write(root, "src/pages/home/index.js", "Page({})");
        write(root, "src/components/card.wxml", "<text/>");
        write(root, "src/components/card.json", "{}");
        write(root, "src/components/card.js", "Component({})");

        let (modules, diagnostics) = discover(root);
        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Card", "Home"]);

        let home = modules.iter().find(|m| m.name == "Home").unwrap();
        assert_eq!(home.included_components["card"].from, "/components/card");
        assert_eq!(home.included_components["ui-button"].from, "@ti/ui/button");
        assert!(!home.included_components.contains_key("foo"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind(), ErrorKind::Resolution);

        let card = modules.iter().find(|m| m.name == "Card").unwrap();
        assert_eq!(card.issuer_names(), vec!["Home"]);
    }

    #[test]
    fn test_config_condition_blocks() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "src/home/index.wxml", "<view/>");
        write(
            root,
            "src/home/index.json",
            "{\n  \"usingComponents\": {\n    // #ifdef WEAPP\n    \"native-map\": \"/miniprogram_npm/native-map\",\n    // #endif\n    \"card\": \"/miniprogram_npm/@ti/card\"\n  }\n}",
        );
        write(root, "src/home/index.js", "Page({})");

        let (modules, diagnostics) = discover(root);
        assert!(diagnostics.is_empty());
        let home = &modules[0];
        assert_eq!(home.included_components.len(), 1);
        assert_eq!(home.included_components["card"].from, "@ti/card");
    }
}
