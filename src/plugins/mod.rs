//! Built-in plugins
//!
//! Everything the compiler does beyond running hooks is one of these. The order of
//! [`default_plugins`] is the order their `process_assets` handlers run in, so the generator
//! comes after the plugins producing the script, style bundle and companion modules it imports.

pub mod companion;
pub mod distribution;
pub mod emit;
pub mod entry;
pub mod external_components;
pub mod generator;
pub mod library;
pub mod script;
pub mod stats;
pub mod style;
pub mod template_parser;

use crate::compilation::{Compilation, FileLoader};
use crate::compiler::Plugin;
use crate::conditional::{strip_conditions, ConditionOptions};
use crate::error::Result;
use crate::file_resolver::LoadResult;
use async_trait::async_trait;
use std::path::Path;
use std::rc::Rc;

pub use companion::CompanionPlugin;
pub use distribution::DistributionPlugin;
pub use emit::EmitPlugin;
pub use entry::EntryPlugin;
pub use external_components::ExternalComponentsPlugin;
pub use generator::GeneratorPlugin;
pub use library::{LibraryEntryPlugin, LibraryGeneratorPlugin};
pub use script::ScriptPlugin;
pub use stats::StatsPlugin;
pub use style::StylePlugin;
pub use template_parser::TemplateParserPlugin;

/// Every built-in plugin, in application order.
pub fn default_plugins() -> Vec<Rc<dyn Plugin>> {
    vec![
        Rc::new(StatsPlugin),
        Rc::new(EntryPlugin),
        Rc::new(TemplateParserPlugin),
        Rc::new(ExternalComponentsPlugin),
        Rc::new(ScriptPlugin),
        Rc::new(StylePlugin),
        Rc::new(CompanionPlugin),
        Rc::new(GeneratorPlugin),
        Rc::new(DistributionPlugin),
        Rc::new(EmitPlugin),
    ]
}

/// Plugins for library mode: no markup, external components or component generation.
pub fn library_plugins() -> Vec<Rc<dyn Plugin>> {
    vec![
        Rc::new(StatsPlugin),
        Rc::new(LibraryEntryPlugin),
        Rc::new(ScriptPlugin),
        Rc::new(StylePlugin),
        Rc::new(CompanionPlugin),
        Rc::new(LibraryGeneratorPlugin),
        Rc::new(DistributionPlugin),
        Rc::new(EmitPlugin),
    ]
}

/// Reads a file from disk as text, keeping only the condition blocks of the run's platforms.
pub struct TextLoader(pub ConditionOptions);

#[async_trait(?Send)]
impl FileLoader for TextLoader {
    async fn load(&self, cx: &Compilation, path: &Path) -> Result<Option<LoadResult>> {
        let source = tokio::fs::read_to_string(path).await?;
        let content = strip_conditions(
            &source,
            &cx.run.options.conditions,
            self.0,
            &path.display().to_string(),
        )?;
        Ok(Some(LoadResult::text(content, source)))
    }
}

/// Whether a resolved path points into an installed package.
pub(crate) fn in_node_modules(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "node_modules")
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::compilation::Compilation;
    use crate::compiler::RunState;
    use crate::module::{ModuleConfig, ModuleSpec};
    use crate::CompilerOptions;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::rc::Rc;

    /// A compilation for the module at `<root>/src/<dir>/index.wxml`.
    pub fn compilation(root: &Path, dir: &str, name: &str, config: ModuleConfig) -> Compilation {
        let template_path = root.join("src").join(dir).join("index.wxml");
        let style_path = template_path.with_extension("wxss");
        let spec = ModuleSpec {
            name: name.to_string(),
            entry_root: root.join("src"),
            script_path: template_path.with_extension("js"),
            style_path: style_path.is_file().then_some(style_path),
            template_path,
            config,
            companion_script_paths: Vec::new(),
            included_components: BTreeMap::new(),
            library_sources: Vec::new(),
        };
        let options = CompilerOptions {
            root: root.to_path_buf(),
            entry: "src".into(),
            outdir: "dist".into(),
            write_assets: false,
            ..CompilerOptions::default()
        };
        Compilation::new(Rc::new(spec.into_module()), Rc::new(RunState::new(options)))
    }
}
