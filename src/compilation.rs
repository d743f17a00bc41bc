//! One module's trip through the pipeline
//!
//! A compilation runs its stages in a fixed order. Plugins take part through the keyed file
//! hooks (load, collect, transform, process) and the stage hooks. State shared between plugins
//! lives in [`CompilationContext`] behind a `RefCell`; borrows of it are never held across an
//! `.await`.

use crate::asset::Asset;
use crate::compiler::RunState;
use crate::dependency_collector::DependencyCollector;
use crate::error::{CompilerError, Result};
use crate::file_resolver::{File, FileContent, FileDependency, FileResolver, LoadResult, ResolveOptions};
use crate::hooks::{
    AsyncParallelHook, AsyncSeriesBailHook, AsyncSeriesHook, AsyncSeriesWaterfallHook, HookMap,
    SyncHook,
};
use crate::module::Module;
use crate::stats::Diagnostic;
use crate::template::{CompiledTemplate, TemplateHooks};
use crate::types::FileKind;
use async_trait::async_trait;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialize,
    ParseTemplate,
    AfterParseTemplate,
    CollectionStart,
    CollectionComplete,
    BeforeProcessAssets,
    ProcessAssets,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Initialize,
        Stage::ParseTemplate,
        Stage::AfterParseTemplate,
        Stage::CollectionStart,
        Stage::CollectionComplete,
        Stage::BeforeProcessAssets,
        Stage::ProcessAssets,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Initialize => "initialize",
            Stage::ParseTemplate => "parse_template",
            Stage::AfterParseTemplate => "after_parse_template",
            Stage::CollectionStart => "collection_start",
            Stage::CollectionComplete => "collection_complete",
            Stage::BeforeProcessAssets => "before_process_assets",
            Stage::ProcessAssets => "process_assets",
        };
        f.write_str(name)
    }
}

/// Supplies the content of a file. `Ok(None)` passes to the next loader.
#[async_trait(?Send)]
pub trait FileLoader {
    async fn load(&self, cx: &Compilation, path: &Path) -> Result<Option<LoadResult>>;
}

/// Reports the dependencies of a loaded file into `found`.
#[async_trait(?Send)]
pub trait DependencyScanner {
    async fn collect(&self, cx: &Compilation, file: &File, found: &DependencySet) -> Result<()>;
}

/// One stage of a file's transform waterfall.
#[async_trait(?Send)]
pub trait FileTransform {
    async fn apply(&self, cx: &Compilation, content: FileContent, file: &File) -> Result<FileContent>;
}

/// Receives the processed file list once collection finishes.
#[async_trait(?Send)]
pub trait FilesTap {
    async fn run(&self, cx: &Compilation, files: &[Rc<File>]) -> Result<()>;
}

/// A handler on one of the compilation's stage hooks.
#[async_trait(?Send)]
pub trait StageTap {
    async fn run(&self, cx: &Compilation) -> Result<()>;
}

/// Dependencies reported by the scanners of one file.
#[derive(Debug, Default)]
pub struct DependencySet {
    found: RefCell<Vec<FileDependency>>,
}

impl DependencySet {
    pub fn add(&self, dependency: FileDependency) {
        self.found.borrow_mut().push(dependency);
    }

    pub fn len(&self) -> usize {
        self.found.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.borrow().is_empty()
    }

    pub fn into_vec(self) -> Vec<FileDependency> {
        self.found.into_inner()
    }
}

pub type CompleteTap = dyn Fn(&Compilation);
pub type FailTap = dyn Fn(&Compilation, Stage, &CompilerError);

#[derive(Default)]
pub struct CompilationHooks {
    pub load_file: HookMap<AsyncSeriesBailHook<dyn FileLoader>>,
    pub collect_dependencies: HookMap<AsyncParallelHook<dyn DependencyScanner>>,
    pub transform: HookMap<AsyncSeriesWaterfallHook<dyn FileTransform>>,
    pub transform_to_string: HookMap<AsyncSeriesWaterfallHook<dyn FileTransform>>,
    pub process_file: HookMap<AsyncSeriesWaterfallHook<dyn FileTransform>>,
    pub collect_dependencies_complete: AsyncSeriesHook<dyn FilesTap>,

    pub initialize: AsyncSeriesHook<dyn StageTap>,
    pub parse_template: AsyncSeriesHook<dyn StageTap>,
    pub after_parse_template: AsyncSeriesHook<dyn StageTap>,
    pub collection_complete: AsyncSeriesHook<dyn StageTap>,
    pub before_process_assets: AsyncSeriesHook<dyn StageTap>,
    pub process_assets: AsyncSeriesHook<dyn StageTap>,
    pub complete: SyncHook<CompleteTap>,
    pub fail: SyncHook<FailTap>,
}

/// Plugin-visible state of one compilation.
#[derive(Debug, Default)]
pub struct CompilationContext {
    /// Compiled markup: body text, referenced data, fragments and companion modules.
    pub template: Option<CompiledTemplate>,
    /// Root script text, inlined into the generated component.
    pub entry_script: Option<String>,
    /// Output path of the module's style bundle, once generated.
    pub style_bundle: Option<PathBuf>,
    /// Files of the module graph after processing, in key order.
    pub files: Vec<Rc<File>>,
    pub assets: Vec<Asset>,
}

pub struct Compilation {
    pub module: Rc<Module>,
    pub run: Rc<RunState>,
    pub hooks: CompilationHooks,
    pub template_hooks: TemplateHooks,
    context: RefCell<CompilationContext>,
    stage: Cell<Option<Stage>>,
}

impl Compilation {
    pub fn new(module: Rc<Module>, run: Rc<RunState>) -> Self {
        Self {
            module,
            run,
            hooks: CompilationHooks::default(),
            template_hooks: TemplateHooks::with_builtins(),
            context: RefCell::new(CompilationContext::default()),
            stage: Cell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.module.name
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage.get()
    }

    pub fn context(&self) -> Ref<'_, CompilationContext> {
        self.context.borrow()
    }

    pub fn context_mut(&self) -> RefMut<'_, CompilationContext> {
        self.context.borrow_mut()
    }

    pub fn resolver(&self) -> FileResolver<'_> {
        FileResolver::new(self)
    }

    pub fn emit_asset(&self, asset: Asset) {
        log::debug!("[{}] asset {}", self.name(), asset.output_path.display());
        self.context.borrow_mut().assets.push(asset);
    }

    /// Records a non-fatal problem for this module.
    pub fn report(&self, error: CompilerError) {
        log::warn!("[{}] {}", self.name(), error);
        self.run
            .stats
            .borrow_mut()
            .diagnostics
            .push(Diagnostic::from_error(Some(self.name()), &error));
    }

    /// Resolves an import specifier, reporting a resolution diagnostic when nothing matches.
    pub async fn resolve_dependency(&self, raw: &str, basedir: &Path, kind: FileKind) -> Option<PathBuf> {
        let resolved = FileResolver::resolve_entry(raw, &ResolveOptions::for_kind(basedir, kind)).await;
        if resolved.is_none() {
            self.report(CompilerError::resolution(
                raw,
                format!("cannot resolve {} dependency from {}", kind, basedir.display()),
            ));
        }
        resolved
    }

    /// Runs every stage in order. The first failure fires the `fail` hook and stops the run.
    pub async fn compile(&self) -> Result<()> {
        log::info!("compiling {} '{}'", self.module.kind, self.name());

        for stage in Stage::ALL {
            self.stage.set(Some(stage));
            log::debug!("[{}][{}]", self.name(), stage);
            if let Err(err) = self.run_stage(stage).await {
                log::error!("[{}][{}] {}", self.name(), stage, err);
                self.hooks.fail.call(|tap| tap(self, stage, &err));
                return Err(err);
            }
        }

        let assets = std::mem::take(&mut self.context.borrow_mut().assets);
        self.run.assets.borrow_mut().extend(assets);
        self.hooks.complete.call(|tap| tap(self));
        Ok(())
    }

    async fn run_stage(&self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Initialize => self.hooks.initialize.call(|tap| tap.run(self)).await,
            Stage::ParseTemplate => self.hooks.parse_template.call(|tap| tap.run(self)).await,
            Stage::AfterParseTemplate => {
                self.hooks.after_parse_template.call(|tap| tap.run(self)).await
            }
            Stage::CollectionStart => {
                let files = DependencyCollector::new(self).run().await?;
                self.context.borrow_mut().files = files;
                Ok(())
            }
            Stage::CollectionComplete => {
                self.hooks.collection_complete.call(|tap| tap.run(self)).await
            }
            Stage::BeforeProcessAssets => {
                self.hooks.before_process_assets.call(|tap| tap.run(self)).await
            }
            Stage::ProcessAssets => self.hooks.process_assets.call(|tap| tap.run(self)).await,
        }
    }

    /// Processed files of `kind`, in key order.
    pub fn files_of(&self, kind: FileKind) -> Vec<Rc<File>> {
        self.context
            .borrow()
            .files
            .iter()
            .filter(|f| f.kind == kind)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::test_support::module;
    use crate::CompilerOptions;

    struct Failing;

    #[async_trait(?Send)]
    impl StageTap for Failing {
        async fn run(&self, cx: &Compilation) -> Result<()> {
            Err(CompilerError::parse(cx.module.template_path.display().to_string(), 1, "boom"))
        }
    }

    struct Recording(Rc<RefCell<Vec<String>>>, &'static str);

    #[async_trait(?Send)]
    impl StageTap for Recording {
        async fn run(&self, _cx: &Compilation) -> Result<()> {
            self.0.borrow_mut().push(self.1.to_string());
            Ok(())
        }
    }

    fn compilation() -> Compilation {
        let run = Rc::new(RunState::new(CompilerOptions::default()));
        Compilation::new(Rc::new(module("Card")), run)
    }

    #[tokio::test]
    async fn test_stage_failure_fires_fail_hook_and_stops() {
        let mut cx = compilation();
        let seen = Rc::new(RefCell::new(Vec::new()));
        cx.hooks.initialize.tap("init", Rc::new(Recording(Rc::clone(&seen), "initialize")));
        cx.hooks.parse_template.tap("fail", Rc::new(Failing));
        cx.hooks
            .process_assets
            .tap("never", Rc::new(Recording(Rc::clone(&seen), "process_assets")));
        let failed = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&failed);
        cx.hooks.fail.tap(
            "record",
            Rc::new(move |_: &Compilation, stage: Stage, _: &CompilerError| {
                *sink.borrow_mut() = Some(stage);
            }),
        );

        let err = cx.compile().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);
        assert_eq!(*failed.borrow(), Some(Stage::ParseTemplate));
        assert_eq!(*seen.borrow(), vec!["initialize"]);
        assert!(cx.run.assets.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_dependency_is_a_diagnostic() {
        let cx = compilation();
        let found = cx
            .resolve_dependency("./nowhere", Path::new("/definitely/missing"), FileKind::Script)
            .await;
        assert!(found.is_none());
        let stats = cx.run.stats.borrow();
        assert_eq!(stats.diagnostics.len(), 1);
        assert_eq!(stats.diagnostics[0].kind, crate::error::ErrorKind::Resolution);
        assert_eq!(stats.diagnostics[0].module.as_deref(), Some("Card"));
    }
}
