//! Matrix Component Compiler
//!
//! Compiles mini-program style components (markup, script, style, companion scripts and a JSON
//! config per component) into TSX components for a React runtime.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use matrixc::{compile_project, CompilerOptions};
//!
//! fn main() -> matrixc::Result<()> {
//!     let stats = compile_project(CompilerOptions::new("./my-app"))?;
//!     println!("{}", stats.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Compilation Pipeline
//!
//! 1. **Discovery**: every `*.wxml` under the entry directory becomes a module; `usingComponents`
//!    are followed to build the module graph
//! 2. **Per-module compilation**: template passes A/B, dependency collection from the root
//!    script, keyed transforms per file kind
//! 3. **Generation**: component `.tsx`, template fragments, style bundle, companion scripts
//! 4. **Emission**: assets of modules that compiled are written under the output directory
//!
//! With [`CompilerOptions::library`] set, discovery instead gathers every script, stylesheet
//! and companion script under the entry into a single markup-less module.
//!
//! Every step is a hook; the built-in behaviour is a set of [`plugins`].

pub mod asset;
pub mod compilation;
pub mod compiler;
pub mod conditional;
pub mod dependency_collector;
pub mod error;
pub mod file_resolver;
pub mod hooks;
pub mod module;
pub mod plugins;
pub mod stats;
pub mod template;
pub mod types;
pub mod utils;

pub mod cli;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use compilation::{Compilation, Stage};
pub use compiler::{Compiler, Plugin, RunState};
pub use error::{CompilerError, ErrorKind, Result};
pub use module::{Module, ModuleConfig, ModuleGraph};
pub use stats::CompilerStats;
pub use template::{parse_markup, TemplateEngine, TemplateHooks};

/// Compiler version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Compilation options and settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Project root
    pub root: PathBuf,

    /// Entry directory, relative to the root, scanned for modules
    pub entry: String,

    /// Output directory; relative paths are taken from the root
    pub outdir: PathBuf,

    /// Write assets to disk after a run
    pub write_assets: bool,

    /// Compile every script, stylesheet and companion script under the entry as a library,
    /// without markup roots
    #[serde(default)]
    pub library: bool,

    /// Platform names that hold in `#ifdef` condition blocks
    #[serde(default = "default_conditions")]
    pub conditions: Vec<String>,
}

fn default_conditions() -> Vec<String> {
    vec![DEFAULT_CONDITION.to_string()]
}

/// Platform the generated components run on.
pub const DEFAULT_CONDITION: &str = "H5";

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            entry: "src".to_string(),
            outdir: PathBuf::from("dist"),
            write_assets: true,
            library: false,
            conditions: default_conditions(),
        }
    }
}

impl CompilerOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn entry_dir(&self) -> PathBuf {
        self.root.join(&self.entry)
    }

    pub fn output_dir(&self) -> PathBuf {
        if self.outdir.is_absolute() {
            self.outdir.clone()
        } else {
            self.root.join(&self.outdir)
        }
    }
}

/// Compiles a project with the built-in plugins on a current-thread runtime.
pub fn compile_project(options: CompilerOptions) -> Result<CompilerStats> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut compiler = Compiler::with_default_plugins(options);
    runtime.block_on(compiler.run())
}

/// Compiles a single markup string for `module_name` and returns the TSX body.
pub fn compile_markup(markup: &str, module_name: &str, file: &Path) -> Result<String> {
    let module = module::ModuleSpec {
        name: module_name.to_string(),
        entry_root: file.parent().map(Path::to_path_buf).unwrap_or_default(),
        template_path: file.to_path_buf(),
        script_path: file.with_extension("js"),
        config: ModuleConfig::default(),
        style_path: None,
        companion_script_paths: Vec::new(),
        included_components: Default::default(),
        library_sources: Vec::new(),
    }
    .into_module();
    let hooks = TemplateHooks::with_builtins();
    let name = file.display().to_string();
    let markup = conditional::strip_conditions(
        markup,
        &default_conditions(),
        conditional::ConditionOptions::new(conditional::CommentStyle::Xml, false),
        &name,
    )?;
    let doc = parse_markup(&markup, name)?;
    Ok(TemplateEngine::new(&hooks, &module).compile(doc)?.content)
}
