//! Library mode: every script, stylesheet and companion script under the entry, no markup
//!
//! Discovery gathers the sources into one module of kind [`ModuleKind::Library`]. Its
//! collector starts from all of them at once; scripts and companion scripts are emitted by
//! their usual plugins, and each stylesheet becomes its own `.css.js` bundle.
//!
//! [`ModuleKind::Library`]: crate::module::ModuleKind::Library

use super::style::style_bundle;
use crate::asset::{output_path, Asset, AssetKind};
use crate::compilation::{Compilation, StageTap};
use crate::compiler::{Compiler, Plugin};
use crate::error::Result;
use crate::module::{module_name, ModuleConfig, ModuleGraph, ModuleSpec, StyleIsolation};
use crate::types::{FileKind, PACKAGE_NPM_PREFIX, STYLE_OUTPUT_EXT, TEMPLATE_EXT};
use crate::utils::normalize_path;
use crate::CompilerOptions;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use walkdir::WalkDir;

const DECLARATION_SUFFIX: &str = ".d.ts";

pub struct LibraryEntryPlugin;

impl Plugin for LibraryEntryPlugin {
    fn name(&self) -> &'static str {
        "library-entry"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler
            .hooks
            .entry_dependency
            .tap("library-entry", Rc::new(discover_library));
    }
}

/// Adds one module holding every library source under the entry directory.
pub fn discover_library(options: &CompilerOptions, graph: &mut ModuleGraph) {
    let entry_dir = normalize_path(&options.entry_dir());
    let sources = library_sources(&entry_dir);
    if sources.is_empty() {
        log::warn!(
            "no scripts, stylesheets or companion scripts under {}; check the entry",
            entry_dir.display()
        );
        return;
    }
    log::info!("library entry {} has {} sources", entry_dir.display(), sources.len());
    for source in &sources {
        log::trace!("library source {}", source.display());
    }

    let raw_name = entry_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "library".to_string());
    graph.add(ModuleSpec {
        name: module_name(&raw_name),
        entry_root: entry_dir.clone(),
        // No markup exists; the path only places the module in its directory.
        template_path: entry_dir.join(format!("index{}", TEMPLATE_EXT)),
        script_path: entry_dir.join("index.js"),
        config: ModuleConfig {
            style_isolation: StyleIsolation::Shared,
            ..ModuleConfig::default()
        },
        style_path: None,
        companion_script_paths: Vec::new(),
        included_components: BTreeMap::new(),
        library_sources: sources,
    });
}

/// Scripts (but not declaration files), stylesheets and companion scripts, sorted.
fn library_sources(entry_dir: &Path) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = WalkDir::new(entry_dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            name != "node_modules" && name != PACKAGE_NPM_PREFIX.trim_start_matches('/')
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_library_source(path))
        .collect();
    sources.sort();
    sources
}

fn is_library_source(path: &Path) -> bool {
    if path.to_string_lossy().ends_with(DECLARATION_SUFFIX) {
        return false;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    matches!(
        FileKind::from_extension(ext),
        Some(FileKind::Script | FileKind::Style | FileKind::CompanionScript)
    )
}

pub struct LibraryGeneratorPlugin;

impl Plugin for LibraryGeneratorPlugin {
    fn name(&self) -> &'static str {
        "library-generator"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.compilation.tap(
            "library-generator",
            Rc::new(|cx: &mut Compilation| {
                cx.hooks
                    .process_assets
                    .tap("library-generator", Rc::new(EmitStylesheets));
            }),
        );
    }
}

/// One bundle per stylesheet; a library has no root stylesheet to merge into.
struct EmitStylesheets;

#[async_trait(?Send)]
impl StageTap for EmitStylesheets {
    async fn run(&self, cx: &Compilation) -> Result<()> {
        for file in cx.files_of(FileKind::Style) {
            let text = file.text().unwrap_or_default();
            let parts: Vec<String> = Some(text).filter(|t| !t.is_empty()).into_iter().collect();
            let path = output_path(&cx.run.options, &file.path, STYLE_OUTPUT_EXT);
            cx.emit_asset(Asset::new(cx.name(), AssetKind::StyleBundle, path, style_bundle(&parts)));
        }
        Ok(())
    }
}
