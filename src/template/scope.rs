//! Per-element resolution context

use super::ast::{DirectiveKind, NodeCollector, NodeId, TemplateDocument};
use super::expression::parse_expression;
use super::mustache;
use super::TemplateRegistry;
use crate::error::{CompilerError, Result};
use crate::module::Module;
use std::collections::BTreeSet;

/// Everything a tag rule or attribute handler may read or record while one element resolves.
pub struct TemplateScope<'a> {
    pub module: &'a Module,
    pub doc: &'a mut TemplateDocument,
    pub node: NodeId,
    pub referenced: &'a mut BTreeSet<String>,
    pub registry: &'a mut TemplateRegistry,
    /// Set while compiling a named template fragment.
    pub in_fragment: bool,
}

impl<'a> TemplateScope<'a> {
    pub fn file(&self) -> &str {
        &self.doc.file
    }

    pub fn line(&self) -> usize {
        self.doc
            .ancestors(self.node)
            .find_map(|id| self.doc.element(id).map(|e| e.line))
            .unwrap_or(1)
    }

    pub fn element_name(&self) -> &str {
        self.doc.element(self.node).map_or("", |e| e.name.as_str())
    }

    /// Whether `name` is bound by this element's loop or any enclosing one.
    pub fn is_loop_variable(&self, name: &str) -> bool {
        self.doc.ancestors(self.node).any(|id| {
            self.doc.collector(id).is_some_and(|collector| {
                collector.has_directive(DirectiveKind::For) && collector.variables.binds(name)
            })
        })
    }

    /// Parses and re-prints one expression, recording its free identifiers as referenced data.
    pub fn compile_expression(&mut self, source: &str) -> Result<String> {
        let expr = parse_expression(source).map_err(|err| {
            let message = match err {
                CompilerError::Parse { message, .. } => message,
                other => other.to_string(),
            };
            CompilerError::parse(
                self.doc.file.clone(),
                self.line(),
                format!("invalid expression {{{{{}}}}}: {}", source.trim(), message),
            )
        })?;

        for name in expr.free_identifiers() {
            if !self.is_loop_variable(&name) {
                self.referenced.insert(name);
            }
        }
        Ok(expr.print())
    }

    /// Compiles every span, keeping literal text around each.
    ///
    /// Gives `{ code }` for a lone span, or a `{`…`}` template literal when text surrounds it.
    pub fn interpolate(&mut self, value: &str) -> Result<String> {
        let mut literal = false;
        let mut out = String::new();
        for span in mustache::spans(value) {
            let code = self.compile_expression(&span.code)?;
            if span.before.is_empty() && span.after.is_empty() {
                out.push_str(&code);
            } else {
                literal = true;
                out.push_str(&format!("{}${{{}}}{}", span.before, code, span.after));
            }
        }
        Ok(if literal {
            format!("{{`{}`}}", out)
        } else {
            format!("{{ {} }}", out)
        })
    }

    /// Compiles the first span only, dropping any surrounding text.
    pub fn single_expression(&mut self, value: &str) -> Result<String> {
        match mustache::spans(value).into_iter().next() {
            Some(span) => self.compile_expression(&span.code),
            None => Ok(value.to_string()),
        }
    }

    pub fn collector_mut(&mut self) -> &mut NodeCollector {
        self.doc.collectors.entry(self.node).or_default()
    }

    pub fn parent_collector_mut(&mut self) -> Option<&mut NodeCollector> {
        let parent = self.doc.parent(self.node)?;
        Some(self.doc.collectors.entry(parent).or_default())
    }

    pub fn directive_error(&self, message: impl Into<String>) -> CompilerError {
        CompilerError::directive(format!("{}:{}", self.doc.file, self.line()), message)
    }
}
