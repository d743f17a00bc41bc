//! Emitted text files and where they land

use crate::utils::{change_extname, relative_path};
use crate::CompilerOptions;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Component,
    Fragment,
    StyleBundle,
    CompanionScript,
    Script,
    ExternalComponent,
}

/// One output file produced by a compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Name of the module that produced the asset.
    pub module: String,
    pub kind: AssetKind,
    pub output_path: PathBuf,
    pub content: String,
}

impl Asset {
    pub fn new(module: impl Into<String>, kind: AssetKind, output_path: PathBuf, content: String) -> Self {
        Self {
            module: module.into(),
            kind,
            output_path,
            content,
        }
    }
}

/// Output location of `source` with extension `ext`.
///
/// The path relative to the project root loses its first segment (the entry directory) and
/// is placed under the output directory.
pub fn output_path(options: &CompilerOptions, source: &Path, ext: &str) -> PathBuf {
    let relative = relative_path(&options.root, source);
    let stripped: PathBuf = relative.components().skip(1).collect();
    change_extname(&options.output_dir().join(stripped), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_strips_entry_directory() {
        let options = CompilerOptions {
            root: PathBuf::from("/project"),
            entry: "src".into(),
            outdir: PathBuf::from("dist"),
            write_assets: false,
            ..CompilerOptions::default()
        };
        assert_eq!(
            output_path(&options, Path::new("/project/src/card/index.wxml"), ".tsx"),
            PathBuf::from("/project/dist/card/index.tsx")
        );
        assert_eq!(
            output_path(&options, Path::new("/project/src/card/fmt.wxs"), ".wxs.js"),
            PathBuf::from("/project/dist/card/fmt.wxs.js")
        );
    }
}
