//! File records and path resolution
//!
//! Resolution runs inside compilations, so its existence checks go through `tokio::fs` like the
//! loaders do. Module discovery happens before any compilation starts and reads the disk
//! directly.

use crate::compilation::Compilation;
use crate::error::{CompilerError, Result};
use crate::template::TemplateDocument;
use crate::types::{FileKind, PACKAGE_NPM_PREFIX, PACKAGE_SUBROOT_FIELD};
use crate::utils::{lower_case_normalize_path, maybe_npm_path, normalize_path};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::OsString;
use tokio::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Free-form per-file metadata.
pub type FileMeta = BTreeMap<String, Value>;

/// Metadata key marking a module's root script (and the style it pulls in).
pub const META_ENTRY: &str = "entry";

/// Parsed or raw content of a file as it moves through the transform stages.
#[derive(Debug)]
pub enum FileContent {
    Text(String),
    Template(Box<TemplateDocument>),
}

impl FileContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            FileContent::Template(_) => None,
        }
    }

    pub fn into_text(self, path: &Path) -> Result<String> {
        match self {
            FileContent::Text(text) => Ok(text),
            FileContent::Template(_) => Err(CompilerError::transform(
                path.display().to_string(),
                "markup tree was never serialized to text",
            )),
        }
    }
}

/// One source file of a module's file graph.
#[derive(Debug)]
pub struct File {
    pub path: PathBuf,
    pub kind: FileKind,
    pub content: RefCell<Option<FileContent>>,
    pub source: Option<String>,
    pub meta: RefCell<FileMeta>,
}

impl File {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
            content: RefCell::new(None),
            source: None,
            meta: RefCell::new(FileMeta::new()),
        }
    }

    /// Deduplication identity.
    pub fn key(&self) -> String {
        lower_case_normalize_path(&self.path)
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Copy of the text content, if the file currently holds text.
    pub fn text(&self) -> Option<String> {
        self.content
            .borrow()
            .as_ref()
            .and_then(|content| content.as_text().map(str::to_string))
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.meta.borrow().get(META_ENTRY), Some(Value::Bool(true)))
    }
}

/// What a loader hands back for a path.
#[derive(Debug)]
pub struct LoadResult {
    pub content: Option<FileContent>,
    pub source: Option<String>,
}

impl LoadResult {
    pub fn text(content: String, source: String) -> Self {
        Self {
            content: Some(FileContent::Text(content)),
            source: Some(source),
        }
    }
}

/// A discovered edge of the file graph, loaded lazily by the collector.
#[derive(Debug, Clone)]
pub struct FileDependency {
    pub path: PathBuf,
    pub kind: FileKind,
    pub meta: FileMeta,
}

impl FileDependency {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
            meta: FileMeta::new(),
        }
    }

    pub fn with_meta(mut self, meta: FileMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn key(&self) -> String {
        lower_case_normalize_path(&self.path)
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions<'a> {
    pub basedir: &'a Path,
    pub extensions: &'a [&'a str],
    pub kind: FileKind,
}

impl<'a> ResolveOptions<'a> {
    pub fn for_kind(basedir: &'a Path, kind: FileKind) -> Self {
        Self {
            basedir,
            extensions: kind.resolve_extensions(),
            kind,
        }
    }
}

/// Loads files through a compilation's keyed load hooks.
pub struct FileResolver<'c> {
    compilation: &'c Compilation,
}

impl<'c> FileResolver<'c> {
    pub fn new(compilation: &'c Compilation) -> Self {
        Self { compilation }
    }

    /// Builds the record for `path` and asks the loaders of `kind` for its content.
    pub async fn resolve_file(&self, path: &Path, kind: FileKind) -> Result<Rc<File>> {
        let path = normalize_path(path);
        let mut file = File::new(path.clone(), kind);

        let loaded = self
            .compilation
            .hooks
            .load_file
            .get(kind)
            .call(|loader| loader.load(self.compilation, &path))
            .await
            .map_err(|err| match err {
                CompilerError::Io(io) => CompilerError::resolution(path.display().to_string(), io.to_string()),
                other => other,
            })?;

        match loaded {
            Some(result) => {
                file.content = RefCell::new(result.content);
                file.source = result.source;
            }
            None => log::debug!("no {} loader provided content for {}", kind, path.display()),
        }

        Ok(Rc::new(file))
    }

    /// Resolves an import specifier to a file on disk.
    pub async fn resolve_entry(raw: &str, options: &ResolveOptions<'_>) -> Option<PathBuf> {
        if let Some(rest) = raw.strip_prefix(PACKAGE_NPM_PREFIX) {
            let rest = rest.trim_start_matches('/');
            if let Some(path) = resolve_package_subroot(rest, options).await {
                return Some(path);
            }
        }

        if !maybe_npm_path(raw) {
            return resolve_path(Path::new(raw), options).await;
        }

        if let Some(path) = resolve_path(&Path::new(".").join(raw), options).await {
            return Some(path);
        }
        if options.kind == FileKind::Script {
            resolve_package(raw, options).await
        } else {
            None
        }
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

/// Splits `@scope/name/rest` or `name/rest` into package name and remainder.
fn split_package_name(spec: &str) -> (String, String) {
    let parts: Vec<&str> = spec.split('/').filter(|p| !p.is_empty()).collect();
    let name_len = if parts.first().is_some_and(|p| p.starts_with('@')) {
        2
    } else {
        1
    };
    let name_len = name_len.min(parts.len());
    (parts[..name_len].join("/"), parts[name_len..].join("/"))
}

async fn find_package_dir(name: &str, basedir: &Path) -> Option<PathBuf> {
    for dir in basedir.ancestors() {
        let package_dir = dir.join("node_modules").join(name);
        if is_file(&package_dir.join("package.json")).await {
            return Some(package_dir);
        }
    }
    None
}

async fn read_manifest(package_dir: &Path) -> Option<Value> {
    let manifest = package_dir.join("package.json");
    let content = fs::read_to_string(&manifest).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring malformed manifest {}: {}", manifest.display(), e);
            None
        }
    }
}

async fn resolve_package_subroot(spec: &str, options: &ResolveOptions<'_>) -> Option<PathBuf> {
    let (name, rest) = split_package_name(spec);
    let package_dir = find_package_dir(&name, options.basedir).await?;
    let subroot = read_manifest(&package_dir)
        .await
        .and_then(|m| m.get(PACKAGE_SUBROOT_FIELD).and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();
    let target = package_dir.join(subroot).join(rest);
    log::trace!("package path {} -> {}", spec, target.display());
    resolve_path(&target, options).await
}

async fn resolve_package(spec: &str, options: &ResolveOptions<'_>) -> Option<PathBuf> {
    let (name, rest) = split_package_name(spec);
    let package_dir = find_package_dir(&name, options.basedir).await?;
    if rest.is_empty() {
        resolve_directory(&package_dir, options.extensions).await
    } else {
        resolve_path(&package_dir.join(rest), options).await
    }
}

async fn resolve_path(raw: &Path, options: &ResolveOptions<'_>) -> Option<PathBuf> {
    let candidate = normalize_path(&options.basedir.join(raw));
    match resolve_file_candidate(&candidate, options.extensions).await {
        Some(path) => Some(path),
        None => resolve_directory(&candidate, options.extensions).await,
    }
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(ext);
    PathBuf::from(raw)
}

async fn resolve_file_candidate(candidate: &Path, extensions: &[&str]) -> Option<PathBuf> {
    if is_file(candidate).await {
        return Some(candidate.to_path_buf());
    }
    for ext in extensions {
        let path = with_appended_extension(candidate, ext);
        if is_file(&path).await {
            return Some(path);
        }
    }
    None
}

async fn resolve_directory(dir: &Path, extensions: &[&str]) -> Option<PathBuf> {
    if !is_dir(dir).await {
        return None;
    }

    let main = read_manifest(dir)
        .await
        .and_then(|m| m.get("main").and_then(Value::as_str).map(str::to_string));
    if let Some(main) = main {
        let target = normalize_path(&dir.join(main));
        if let Some(found) = resolve_file_candidate(&target, extensions).await {
            return Some(found);
        }
    }

    for ext in extensions {
        let path = dir.join(format!("index{}", ext));
        if is_file(&path).await {
            return Some(path);
        }
    }
    None
}
