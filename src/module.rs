//! Compiled units (components and pages) and their configuration

use crate::error::{CompilerError, Result};
use crate::types::{CONFIG_EXT, PACKAGE_NPM_PREFIX};
use crate::utils::strike2camel_case;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleKind {
    Component,
    Page,
    /// Loose scripts, stylesheets and companion scripts with no markup root.
    Library,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Component => f.write_str("Component"),
            ModuleKind::Page => f.write_str("Page"),
            ModuleKind::Library => f.write_str("Library"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StyleIsolation {
    #[default]
    Isolated,
    ApplyShared,
    Shared,
}

/// A third-party component mapped onto a markup tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalComponent {
    pub tag: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub props: BTreeMap<String, Value>,
    #[serde(default = "default_true")]
    pub default_export: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExternalComponentEntry {
    Tag(String),
    Full(ExternalComponent),
}

impl ExternalComponent {
    /// Props as markup attribute values. Non-string JSON values keep their JSON text.
    pub fn prop_attributes(&self) -> Vec<(String, String)> {
        self.props
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Contents of a module's `.json` file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    #[serde(default = "default_true")]
    pub component: bool,
    #[serde(default)]
    pub using_components: BTreeMap<String, String>,
    #[serde(default, rename = "h5Components")]
    pub external_components: BTreeMap<String, ExternalComponentEntry>,
    #[serde(default)]
    pub style_isolation: StyleIsolation,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            component: true,
            using_components: BTreeMap::new(),
            external_components: BTreeMap::new(),
            style_isolation: StyleIsolation::Isolated,
        }
    }
}

impl ModuleConfig {
    pub fn from_json(content: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| CompilerError::config(path.display().to_string(), e.to_string()))
    }

    /// Normalized entry for a tag declared under `h5Components`.
    pub fn external_component(&self, tag: &str) -> Option<ExternalComponent> {
        self.external_components.get(tag).map(|entry| match entry {
            ExternalComponentEntry::Full(component) => component.clone(),
            ExternalComponentEntry::Tag(_) => ExternalComponent {
                tag: tag.to_string(),
                src: None,
                props: BTreeMap::new(),
                default_export: true,
            },
        })
    }

    pub fn external_tags(&self) -> impl Iterator<Item = &str> {
        self.external_components.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludedComponent {
    pub from: String,
    pub default_export: bool,
}

/// One component or page: a markup root plus its sibling files.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub kind: ModuleKind,
    /// Absolute entry directory the module was discovered under.
    pub entry_root: PathBuf,
    pub template_path: PathBuf,
    /// Directory holding the module's files.
    pub base_path: PathBuf,
    pub script_path: PathBuf,
    pub config_path: PathBuf,
    pub config: ModuleConfig,
    pub style_path: Option<PathBuf>,
    pub companion_script_paths: Vec<PathBuf>,
    pub included_components: BTreeMap<String, IncludedComponent>,
    /// Every source of a library module; the collector starts from these instead of a script.
    pub library_sources: Vec<PathBuf>,
    pub issuers: RefCell<Vec<Weak<Module>>>,
}

impl Module {
    pub fn style_isolated(&self) -> bool {
        self.config.style_isolation == StyleIsolation::Isolated
    }

    pub fn add_issuer(&self, issuer: &Rc<Module>) {
        self.issuers.borrow_mut().push(Rc::downgrade(issuer));
    }

    pub fn issuer_names(&self) -> Vec<String> {
        self.issuers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|m| m.name.clone())
            .collect()
    }
}

/// Everything the entry discovery knows about a module before it is shared.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub name: String,
    pub entry_root: PathBuf,
    pub template_path: PathBuf,
    pub script_path: PathBuf,
    pub config: ModuleConfig,
    pub style_path: Option<PathBuf>,
    pub companion_script_paths: Vec<PathBuf>,
    pub included_components: BTreeMap<String, IncludedComponent>,
    pub library_sources: Vec<PathBuf>,
}

impl ModuleSpec {
    pub(crate) fn into_module(self) -> Module {
        let base_path = self
            .template_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let config_path = self.template_path.with_extension(CONFIG_EXT.trim_start_matches('.'));
        Module {
            name: self.name,
            kind: if !self.library_sources.is_empty() {
                ModuleKind::Library
            } else if self.config.component {
                ModuleKind::Component
            } else {
                ModuleKind::Page
            },
            entry_root: self.entry_root,
            template_path: self.template_path,
            base_path,
            script_path: self.script_path,
            config_path,
            config: self.config,
            style_path: self.style_path,
            companion_script_paths: self.companion_script_paths,
            included_components: self.included_components,
            library_sources: self.library_sources,
            issuers: RefCell::new(Vec::new()),
        }
    }
}

/// The modules of one run, keyed by markup path, plus their issuer edges.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    specs: Vec<ModuleSpec>,
    edges: Vec<(PathBuf, PathBuf)>,
    modules: Vec<Rc<Module>>,
    diagnostics: Vec<CompilerError>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, template_path: &Path) -> bool {
        self.specs.iter().any(|spec| spec.template_path == template_path)
    }

    pub fn add(&mut self, spec: ModuleSpec) {
        if self.contains(&spec.template_path) {
            log::warn!("'{}' is already part of the module graph", spec.name);
            return;
        }
        self.specs.push(spec);
    }

    /// Records that `issuer` uses the module at `dependency`.
    pub fn add_edge(&mut self, issuer: &Path, dependency: &Path) {
        self.edges.push((issuer.to_path_buf(), dependency.to_path_buf()));
    }

    /// Records a problem that drops an edge or a module without failing the run.
    pub fn report(&mut self, error: CompilerError) {
        log::warn!("{}", error);
        self.diagnostics.push(error);
    }

    pub fn take_diagnostics(&mut self) -> Vec<CompilerError> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty() && self.modules.is_empty()
    }

    /// Turns the discovered specs into shared modules and wires issuer back-references.
    pub fn seal(&mut self) -> &[Rc<Module>] {
        if !self.specs.is_empty() {
            let specs = std::mem::take(&mut self.specs);
            self.modules
                .extend(specs.into_iter().map(|spec| Rc::new(spec.into_module())));

            for (issuer, dependency) in std::mem::take(&mut self.edges) {
                let issuer = self.modules.iter().find(|m| m.template_path == issuer);
                let dependency = self.modules.iter().find(|m| m.template_path == dependency);
                if let (Some(issuer), Some(dependency)) = (issuer, dependency) {
                    dependency.add_issuer(issuer);
                }
            }
        }
        &self.modules
    }

    pub fn modules(&self) -> &[Rc<Module>] {
        &self.modules
    }
}

/// Import source for a component referenced by package path.
pub fn package_import_source(raw: &str) -> String {
    match raw.strip_prefix(PACKAGE_NPM_PREFIX) {
        Some(rest) => rest.trim_start_matches('/').to_string(),
        None => raw.to_string(),
    }
}

/// Module name derived from a directory or tag name.
pub fn module_name(raw: &str) -> String {
    strike2camel_case(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, template: &str) -> ModuleSpec {
        ModuleSpec {
            name: name.to_string(),
            entry_root: PathBuf::from("/p/src"),
            template_path: PathBuf::from(template),
            script_path: PathBuf::from(template).with_extension("js"),
            config: ModuleConfig::default(),
            style_path: None,
            companion_script_paths: Vec::new(),
            included_components: BTreeMap::new(),
            library_sources: Vec::new(),
        }
    }

    #[test]
    fn test_config_defaults_and_isolation() {
        let config = ModuleConfig::from_json(r#"{ "usingComponents": {} }"#, Path::new("a.json")).unwrap();
        assert!(config.component);
        assert_eq!(config.style_isolation, StyleIsolation::Isolated);

        let config = ModuleConfig::from_json(
            r#"{ "component": false, "styleIsolation": "apply-shared" }"#,
            Path::new("a.json"),
        )
        .unwrap();
        assert!(!config.component);
        assert_eq!(config.style_isolation, StyleIsolation::ApplyShared);
    }

    #[test]
    fn test_malformed_config_is_config_error() {
        let err = ModuleConfig::from_json("{ nope", Path::new("bad.json")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_external_component_entries() {
        let config = ModuleConfig::from_json(
            r#"{ "h5Components": {
                "ti-button": { "tag": "ti-button", "src": "@ti/ui", "props": { "size": "small", "round": true } },
                "map": "map"
            } }"#,
            Path::new("a.json"),
        )
        .unwrap();
        let button = config.external_component("ti-button").unwrap();
        assert_eq!(button.src.as_deref(), Some("@ti/ui"));
        assert!(button.default_export);
        assert_eq!(
            button.prop_attributes(),
            vec![("round".to_string(), "true".to_string()), ("size".to_string(), "small".to_string())]
        );
        assert_eq!(config.external_component("map").unwrap().tag, "map");
    }

    #[test]
    fn test_graph_wires_issuers() {
        let mut graph = ModuleGraph::new();
        graph.add(spec("Home", "/p/src/home/index.wxml"));
        graph.add(spec("Card", "/p/src/card/index.wxml"));
        graph.add(spec("Dup", "/p/src/card/index.wxml"));
        graph.add_edge(Path::new("/p/src/home/index.wxml"), Path::new("/p/src/card/index.wxml"));

        let modules = graph.seal().to_vec();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[1].issuer_names(), vec!["Home"]);
        assert_eq!(modules[1].config_path, PathBuf::from("/p/src/card/index.json"));
        assert_eq!(modules[0].kind, ModuleKind::Component);
    }

    #[test]
    fn test_package_import_source() {
        assert_eq!(package_import_source("/miniprogram_npm/@ti/ui/button"), "@ti/ui/button");
        assert_eq!(package_import_source("@ti/ui"), "@ti/ui");
    }
}
