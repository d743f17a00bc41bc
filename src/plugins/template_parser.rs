//! Loads a module's markup and compiles it during `parse_template`

use crate::compilation::{Compilation, FileLoader, StageTap};
use crate::compiler::{Compiler, Plugin};
use crate::conditional::{strip_conditions, CommentStyle, ConditionOptions};
use crate::error::{CompilerError, Result};
use crate::file_resolver::{FileContent, LoadResult};
use crate::template::{parse_markup, TemplateEngine};
use crate::types::FileKind;
use async_trait::async_trait;
use std::path::Path;
use std::rc::Rc;

const MARKUP_SOURCE: ConditionOptions = ConditionOptions::new(CommentStyle::Xml, false);

pub struct TemplateParserPlugin;

impl Plugin for TemplateParserPlugin {
    fn name(&self) -> &'static str {
        "template-parser"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.compilation.tap(
            "template-parser",
            Rc::new(|cx: &mut Compilation| {
                cx.hooks
                    .load_file
                    .for_kind(FileKind::Template)
                    .tap("template-parser", Rc::new(MarkupLoader));
                cx.hooks.parse_template.tap("template-parser", Rc::new(ParseTemplate));
            }),
        );
    }
}

/// Reads and parses a markup file into a tree.
struct MarkupLoader;

#[async_trait(?Send)]
impl FileLoader for MarkupLoader {
    async fn load(&self, cx: &Compilation, path: &Path) -> Result<Option<LoadResult>> {
        let source = tokio::fs::read_to_string(path).await?;
        let name = path.display().to_string();
        let markup = strip_conditions(&source, &cx.run.options.conditions, MARKUP_SOURCE, &name)?;
        let doc = parse_markup(&markup, name)?;
        Ok(Some(LoadResult {
            content: Some(FileContent::Template(Box::new(doc))),
            source: Some(source),
        }))
    }
}

struct ParseTemplate;

#[async_trait(?Send)]
impl StageTap for ParseTemplate {
    async fn run(&self, cx: &Compilation) -> Result<()> {
        let path = &cx.module.template_path;
        let file = cx.resolver().resolve_file(path, FileKind::Template).await?;
        let content = file.content.borrow_mut().take();
        let doc = match content {
            Some(FileContent::Template(doc)) => *doc,
            Some(FileContent::Text(text)) => parse_markup(&text, path.display().to_string())?,
            None => {
                return Err(CompilerError::resolution(
                    path.display().to_string(),
                    "no loader provided the markup",
                ))
            }
        };

        let compiled = TemplateEngine::new(&cx.template_hooks, &cx.module).compile(doc)?;
        log::debug!(
            "[{}] markup references {} names, declares {} fragments",
            cx.name(),
            compiled.referenced.len(),
            compiled.registry.fragments.len()
        );
        cx.context_mut().template = Some(compiled);
        Ok(())
    }
}
