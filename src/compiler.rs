//! Run orchestration: module discovery, per-module compilations, asset emission

use crate::asset::Asset;
use crate::compilation::Compilation;
use crate::error::{CompilerError, Result};
use crate::hooks::{AsyncParallelHook, AsyncSeriesHook, SyncHook};
use crate::module::ModuleGraph;
use crate::stats::{CompilerStats, Diagnostic};
use crate::CompilerOptions;
use async_trait::async_trait;
use std::cell::RefCell;
use std::rc::Rc;

/// State shared by everything taking part in one run.
#[derive(Debug)]
pub struct RunState {
    pub options: CompilerOptions,
    pub assets: RefCell<Vec<Asset>>,
    pub stats: RefCell<CompilerStats>,
}

impl RunState {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            assets: RefCell::new(Vec::new()),
            stats: RefCell::new(CompilerStats::default()),
        }
    }
}

/// A handler on an async run-level hook.
#[async_trait(?Send)]
pub trait RunTap {
    async fn run(&self, run: &RunState) -> Result<()>;
}

/// Drives the compilations of one run.
#[async_trait(?Send)]
pub trait MakeTap {
    async fn make(&self, run: &RunState, compilations: &[Compilation]) -> Result<()>;
}

pub type EntryTap = dyn Fn(&CompilerOptions, &mut ModuleGraph);
pub type RunStateTap = dyn Fn(&RunState);
pub type CompilationTap = dyn Fn(&mut Compilation);
pub type RunFailTap = dyn Fn(&RunState, &CompilerError);

#[derive(Default)]
pub struct CompilerHooks {
    pub initialize: AsyncSeriesHook<dyn RunTap>,
    pub entry_dependency: SyncHook<EntryTap>,
    pub before_compile: SyncHook<RunStateTap>,
    pub compile: SyncHook<RunStateTap>,
    pub compilation: SyncHook<CompilationTap>,
    pub make: AsyncParallelHook<dyn MakeTap>,
    pub before_emit_assets: SyncHook<RunStateTap>,
    pub emit_assets: AsyncParallelHook<dyn RunTap>,
    pub done: SyncHook<RunStateTap>,
    pub after_done: SyncHook<RunStateTap>,
    pub fail: SyncHook<RunFailTap>,
}

/// Registers handlers on a fresh set of compiler hooks at the start of every run.
pub trait Plugin {
    fn name(&self) -> &'static str;
    fn apply(&self, compiler: &mut Compiler);
}

pub struct Compiler {
    pub options: CompilerOptions,
    pub hooks: CompilerHooks,
    plugins: Vec<Rc<dyn Plugin>>,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            hooks: CompilerHooks::default(),
            plugins: Vec::new(),
        }
    }

    /// A compiler with every built-in plugin, or the library set when `options.library` is on.
    pub fn with_default_plugins(options: CompilerOptions) -> Self {
        let plugins = if options.library {
            crate::plugins::library_plugins()
        } else {
            crate::plugins::default_plugins()
        };
        let mut compiler = Self::new(options);
        for plugin in plugins {
            compiler.add_plugin(plugin);
        }
        compiler
    }

    pub fn add_plugin(&mut self, plugin: Rc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    fn apply_plugins(&mut self) {
        self.hooks = CompilerHooks::default();
        let plugins = self.plugins.clone();
        for plugin in plugins {
            log::trace!("applying plugin {}", plugin.name());
            plugin.apply(self);
        }
    }

    /// Compiles every module under the entry directory.
    ///
    /// Module failures are recorded in the returned stats; only run-level problems (such as
    /// finding no modules) are returned as errors.
    pub async fn run(&mut self) -> Result<CompilerStats> {
        self.apply_plugins();
        let run = Rc::new(RunState::new(self.options.clone()));

        match self.run_with(&run).await {
            Ok(()) => {
                let stats = run.stats.borrow().clone();
                Ok(stats)
            }
            Err(err) => {
                log::error!("{}", err);
                run.stats.borrow_mut().finish();
                self.hooks.fail.call(|tap| tap(&run, &err));
                Err(err)
            }
        }
    }

    /// Runs again from scratch with fresh hooks and plugin state.
    pub async fn rebuild(&mut self) -> Result<CompilerStats> {
        log::info!("rebuilding {}", self.options.root.display());
        self.run().await
    }

    async fn run_with(&self, shared: &Rc<RunState>) -> Result<()> {
        let run: &RunState = shared;
        self.hooks.initialize.call(|tap| tap.run(run)).await?;

        let mut graph = ModuleGraph::new();
        self.hooks
            .entry_dependency
            .call(|tap| tap(&self.options, &mut graph));
        run.stats.borrow_mut().diagnostics.extend(
            graph
                .take_diagnostics()
                .iter()
                .map(|err| Diagnostic::from_error(None, err)),
        );

        let modules = graph.seal().to_vec();
        if modules.is_empty() {
            return Err(CompilerError::NoModules {
                root: self.options.entry_dir().display().to_string(),
            });
        }
        log::info!("found {} modules", modules.len());
        run.stats.borrow_mut().module_count = modules.len();

        self.hooks.before_compile.call(|tap| tap(run));
        self.hooks.compile.call(|tap| tap(run));

        let compilations: Vec<Compilation> = modules
            .into_iter()
            .map(|module| {
                let mut compilation = Compilation::new(module, Rc::clone(shared));
                self.hooks.compilation.call(|tap| tap(&mut compilation));
                compilation
            })
            .collect();

        self.hooks
            .make
            .call(|tap| tap.make(run, &compilations))
            .await?;

        run.stats.borrow_mut().asset_count = run.assets.borrow().len();
        self.hooks.before_emit_assets.call(|tap| tap(run));
        self.hooks.emit_assets.call(|tap| tap.run(run)).await?;
        self.hooks.done.call(|tap| tap(run));
        self.hooks.after_done.call(|tap| tap(run));
        Ok(())
    }
}
