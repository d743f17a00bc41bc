//! Walks a module's file graph from its root script, then processes every file found

use crate::compilation::{Compilation, DependencySet};
use crate::error::{CompilerError, Result};
use crate::file_resolver::{File, FileContent, FileDependency, META_ENTRY};
use crate::module::{Module, ModuleKind};
use crate::types::FileKind;
use futures::future::{join_all, FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub struct DependencyCollector<'c> {
    compilation: &'c Compilation,
    /// Claimed keys. A key maps to `None` while its file is still loading.
    visited: RefCell<BTreeMap<String, Option<Rc<File>>>>,
}

impl<'c> DependencyCollector<'c> {
    pub fn new(compilation: &'c Compilation) -> Self {
        Self {
            compilation,
            visited: RefCell::new(BTreeMap::new()),
        }
    }

    /// Collects from the root script, processes every visited file, and fires
    /// `collect_dependencies_complete`.
    pub async fn run(&self) -> Result<Vec<Rc<File>>> {
        let module = &self.compilation.module;
        let results = join_all(
            roots(module)
                .into_iter()
                .map(|root| self.collect_file_dependencies(root)),
        )
        .await;
        collect_errors(results)?;
        let files = self.files();
        log::debug!("[{}] collected {} files", module.name, files.len());

        self.process_files(&files).await?;
        self.compilation
            .hooks
            .collect_dependencies_complete
            .call(|tap| tap.run(self.compilation, &files))
            .await?;
        Ok(files)
    }

    /// Loaded files in key order.
    pub fn files(&self) -> Vec<Rc<File>> {
        self.visited.borrow().values().flatten().cloned().collect()
    }

    pub fn visited_keys(&self) -> Vec<String> {
        self.visited.borrow().keys().cloned().collect()
    }

    /// Runs the collect hook for `file`'s kind.
    pub async fn collect_module_file_dependencies(&self, file: &File) -> Result<Vec<FileDependency>> {
        let found = DependencySet::default();
        self.compilation
            .hooks
            .collect_dependencies
            .get(file.kind)
            .call(|scanner| scanner.collect(self.compilation, file, &found))
            .await?;
        Ok(found.into_vec())
    }

    /// Loads `dependency` once, then recurses into everything it depends on.
    pub fn collect_file_dependencies(
        &self,
        dependency: FileDependency,
    ) -> LocalBoxFuture<'_, Result<()>> {
        async move {
            let key = dependency.key();
            {
                let mut visited = self.visited.borrow_mut();
                if visited.contains_key(&key) {
                    return Ok(());
                }
                visited.insert(key.clone(), None);
            }

            let file = self
                .compilation
                .resolver()
                .resolve_file(&dependency.path, dependency.kind)
                .await?;
            file.meta.borrow_mut().extend(dependency.meta);
            self.visited.borrow_mut().insert(key, Some(Rc::clone(&file)));

            let dependencies = self.collect_module_file_dependencies(&file).await?;
            let results = join_all(
                dependencies
                    .into_iter()
                    .map(|dependency| self.collect_file_dependencies(dependency)),
            )
            .await;
            collect_errors(results)
        }
        .boxed_local()
    }

    /// Runs transform, transform-to-string and process over every file concurrently.
    pub async fn process_files(&self, files: &[Rc<File>]) -> Result<()> {
        let results = join_all(files.iter().map(|file| self.process_file(file))).await;
        collect_errors(results)
    }

    async fn process_file(&self, file: &File) -> Result<()> {
        let Some(content) = file.content.borrow_mut().take() else {
            return Ok(());
        };
        let cx = self.compilation;
        let hooks = &cx.hooks;

        let content = hooks
            .transform
            .get(file.kind)
            .call(content, |tap, content| tap.apply(cx, content, file))
            .await?;
        let content = hooks
            .transform_to_string
            .get(file.kind)
            .call(content, |tap, content| tap.apply(cx, content, file))
            .await?;
        let content: FileContent = hooks
            .process_file
            .get(file.kind)
            .call(content, |tap, content| tap.apply(cx, content, file))
            .await?;

        *file.content.borrow_mut() = Some(content);
        Ok(())
    }
}

/// The root script of a component or page; every source of a library, none of them an entry.
fn roots(module: &Module) -> Vec<FileDependency> {
    if module.kind == ModuleKind::Library {
        return module
            .library_sources
            .iter()
            .filter_map(|path| {
                let ext = path.extension()?.to_str()?;
                FileKind::from_extension(ext).map(|kind| FileDependency::new(path.clone(), kind))
            })
            .collect();
    }
    let mut meta = BTreeMap::new();
    meta.insert(META_ENTRY.to_string(), Value::Bool(true));
    vec![FileDependency::new(module.script_path.clone(), FileKind::Script).with_meta(meta)]
}

fn collect_errors(results: Vec<Result<()>>) -> Result<()> {
    let errors: Vec<CompilerError> = results.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CompilerError::aggregate(errors))
    }
}
