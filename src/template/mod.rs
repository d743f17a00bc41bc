//! Markup to TSX compilation
//!
//! Pass A walks the tree pre-order, resolving each element's tag and attributes and recording
//! directives in the document's collector table. Pass B walks post-order, assembling element
//! text and wrapping it with the directive lowerings. Named `<template>` fragments found in
//! pass A are compiled afterwards, each with its own referenced-data set.

pub mod ast;
pub mod attributes;
pub mod directives;
pub mod expression;
pub mod mustache;
pub mod parser;
pub mod scope;
pub mod tags;

pub use ast::{NodeId, NodeKind, TemplateDocument};
pub use attributes::{AttributeHandler, AttributeOutput};
pub use parser::parse_markup;
pub use scope::TemplateScope;
pub use tags::{TagResolution, TagRule, TagRules};

use crate::error::Result;
use crate::hooks::{SyncBailHook, SyncHook, SyncWaterfallHook};
use crate::module::Module;
use crate::types::{COMPANION_OUTPUT_EXT, PACKAGE_NPM_PREFIX};
use crate::utils::strike2camel_case;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::rc::Rc;

pub type TagRuleTap = dyn Fn(&Module, &mut TagRules);
pub type DirectiveTap = dyn Fn(&TemplateDocument, NodeId, String) -> String;

/// Extension points of the template engine.
pub struct TemplateHooks {
    pub tag_rule: SyncHook<TagRuleTap>,
    pub attribute: SyncBailHook<dyn AttributeHandler>,
    pub directives: SyncWaterfallHook<DirectiveTap>,
}

impl TemplateHooks {
    /// Hooks with the built-in attribute handlers and directive lowering tapped.
    pub fn with_builtins() -> Self {
        let mut hooks = Self {
            tag_rule: SyncHook::new(),
            attribute: SyncBailHook::new(),
            directives: SyncWaterfallHook::new(),
        };
        for (name, handler) in attributes::builtin_handlers() {
            hooks.attribute.tap(name, handler);
        }
        hooks.directives.tap("directives", Rc::new(directives::lower));
        hooks
    }
}

impl Default for TemplateHooks {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// A `<template name>` block compiled into its own component.
#[derive(Debug, Clone)]
pub struct TemplateFragment {
    pub name: String,
    pub component_name: String,
    pub import_url: String,
    pub document: TemplateDocument,
    /// Compiled body and the data it references, once compiled.
    pub compiled: Option<(String, BTreeSet<String>)>,
}

impl TemplateFragment {
    pub fn new(name: String, document: TemplateDocument) -> Self {
        let component_name = format!("{}Template", strike2camel_case(&name));
        let import_url = format!("./{}.tsx", component_name);
        Self {
            name,
            component_name,
            import_url,
            document,
            compiled: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionKind {
    /// `<wxs src="…">`
    External,
    /// `<wxs>` with an inline body
    Inline,
}

/// A companion-script module declared with `<wxs module>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionModule {
    pub name: String,
    pub kind: CompanionKind,
    pub import_url: String,
    pub source_path: PathBuf,
    pub content: String,
}

impl CompanionModule {
    /// Specifier of the emitted `.wxs.js` file.
    pub fn import_source(&self) -> String {
        let url = self
            .import_url
            .strip_prefix(PACKAGE_NPM_PREFIX)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(&self.import_url);
        let url = url.strip_suffix(".wxs").unwrap_or(url);
        format!("{}{}", url, COMPANION_OUTPUT_EXT)
    }
}

/// Fragments and companion modules declared by a module's markup, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    pub fragments: Vec<TemplateFragment>,
    pub companions: Vec<CompanionModule>,
}

impl TemplateRegistry {
    pub fn fragment(&self, name: &str) -> Option<&TemplateFragment> {
        self.fragments.iter().find(|f| f.name == name)
    }

    pub fn companion(&self, name: &str) -> Option<&CompanionModule> {
        self.companions.iter().find(|c| c.name == name)
    }
}

/// Output of compiling one module's markup.
#[derive(Debug, Clone, Default)]
pub struct CompiledTemplate {
    pub content: String,
    pub referenced: BTreeSet<String>,
    pub registry: TemplateRegistry,
}

pub struct TemplateEngine<'a> {
    hooks: &'a TemplateHooks,
    module: &'a Module,
    rules: TagRules,
}

impl<'a> TemplateEngine<'a> {
    pub fn new(hooks: &'a TemplateHooks, module: &'a Module) -> Self {
        let mut rules = TagRules::builtin();
        hooks.tag_rule.call(|tap| tap(module, &mut rules));
        Self {
            hooks,
            module,
            rules,
        }
    }

    /// Compiles the module markup, then every fragment it declares.
    pub fn compile(&self, mut doc: TemplateDocument) -> Result<CompiledTemplate> {
        let mut registry = TemplateRegistry::default();
        let mut referenced = BTreeSet::new();
        let content = self.compile_document(&mut doc, &mut registry, &mut referenced, false)?;

        while let Some(index) = registry.fragments.iter().position(|f| f.compiled.is_none()) {
            let mut fragment_doc = registry.fragments[index].document.clone();
            let mut fragment_referenced = BTreeSet::new();
            log::debug!(
                "compiling template fragment '{}' of {}",
                registry.fragments[index].name,
                self.module.name
            );
            let body =
                self.compile_document(&mut fragment_doc, &mut registry, &mut fragment_referenced, true)?;
            registry.fragments[index].compiled = Some((body, fragment_referenced));
        }

        Ok(CompiledTemplate {
            content,
            referenced,
            registry,
        })
    }

    /// Pass A then pass B over one document.
    pub fn compile_document(
        &self,
        doc: &mut TemplateDocument,
        registry: &mut TemplateRegistry,
        referenced: &mut BTreeSet<String>,
        in_fragment: bool,
    ) -> Result<String> {
        self.resolve(doc, registry, referenced, in_fragment)?;
        Ok(self.generate(doc, NodeId::ROOT))
    }

    /// Pass A.
    pub fn resolve(
        &self,
        doc: &mut TemplateDocument,
        registry: &mut TemplateRegistry,
        referenced: &mut BTreeSet<String>,
        in_fragment: bool,
    ) -> Result<()> {
        let mut stack: Vec<NodeId> = doc.children(NodeId::ROOT).iter().rev().copied().collect();

        while let Some(node) = stack.pop() {
            let text = match &doc.node(node).kind {
                NodeKind::Element(_) => None,
                NodeKind::Text(text) => Some(text.clone()),
                NodeKind::Comment(_) | NodeKind::Root => continue,
            };
            let mut scope = TemplateScope {
                module: self.module,
                doc: &mut *doc,
                node,
                referenced: &mut *referenced,
                registry: &mut *registry,
                in_fragment,
            };
            let descend = match text {
                None => self.resolve_element(&mut scope)?,
                Some(text) => {
                    let resolved = mustache::replace_spans(&text, |span| -> Result<String> {
                        let code = scope.compile_expression(&span.code)?;
                        Ok(format!("{}{{{}}}{}", span.before, code, span.after))
                    })?;
                    scope.doc.texts.insert(node, resolved);
                    false
                }
            };
            if descend {
                stack.extend(doc.children(node).iter().rev().copied());
            }
        }
        Ok(())
    }

    /// Resolves one element. Returns whether its children should be visited.
    fn resolve_element(&self, scope: &mut TemplateScope<'_>) -> Result<bool> {
        let node = scope.node;
        scope.collector_mut();
        scope.parent_collector_mut();

        let tag = match tags::resolve_tag(scope, &self.rules)? {
            TagResolution::Emit(tag) => tag,
            TagResolution::Skip => return Ok(false),
        };

        let Some(element) = scope.doc.element_mut(node) else {
            return Ok(false);
        };
        attributes::preprocess(element);
        let slot = element
            .get("slot")
            .filter(|slot| !mustache::has_mustache(slot))
            .map(str::to_string);
        if slot.is_some() {
            element.remove("slot");
        }
        let keys: Vec<String> = element.attributes.iter().map(|a| a.key.clone()).collect();

        let mut rendered = Vec::new();
        for key in attributes::priority_ranking(&keys) {
            let Some(attribute) = scope
                .doc
                .element(node)
                .and_then(|e| e.attributes.iter().find(|a| a.key == key))
                .cloned()
            else {
                continue;
            };
            let output = self
                .hooks
                .attribute
                .call(|handler| handler.resolve(scope, &attribute).transpose())
                .transpose()?;
            if let Some(text) = output.and_then(|o| o.render()) {
                rendered.push(text);
            }
        }

        scope.doc.resolved.insert(
            node,
            ast::ResolvedElement {
                tag,
                attributes: rendered,
                slot,
            },
        );
        Ok(true)
    }

    /// Pass B.
    pub fn generate(&self, doc: &TemplateDocument, node: NodeId) -> String {
        match &doc.node(node).kind {
            NodeKind::Root => doc
                .children(node)
                .iter()
                .map(|child| self.generate(doc, *child))
                .collect(),
            NodeKind::Text(text) => doc.texts.get(&node).cloned().unwrap_or_else(|| text.clone()),
            NodeKind::Comment(text) => format!("{{/* {} */}}", text.trim()),
            NodeKind::Element(element) => {
                let Some(resolved) = doc.resolved.get(&node) else {
                    return String::new();
                };

                let text = if resolved.tag == "Slot" {
                    match element.get("name") {
                        Some(name) if !name.is_empty() => {
                            format!("{{this.props.slot{}}}", strike2camel_case(name))
                        }
                        _ => "{this.props.children}".to_string(),
                    }
                } else {
                    let mut attributes = resolved.attributes.clone();
                    let mut content = String::new();
                    for child in doc.children(node) {
                        let child_text = self.generate(doc, *child);
                        match doc.resolved.get(child).and_then(|r| r.slot.as_deref()) {
                            Some(slot) => attributes.push(format!(
                                "slot{}={{<React.Fragment>{}</React.Fragment>}}",
                                strike2camel_case(slot),
                                child_text
                            )),
                            None => content.push_str(&child_text),
                        }
                    }

                    let attributes = if attributes.is_empty() {
                        String::new()
                    } else {
                        format!(" {}", attributes.join(" "))
                    };
                    if content.is_empty() {
                        format!("<{}{}/>", resolved.tag, attributes)
                    } else {
                        format!("<{tag}{attributes}>{content}</{tag}>", tag = resolved.tag)
                    }
                };

                self.hooks
                    .directives
                    .call(text, |lower, text| lower(doc, node, text))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::module::{ModuleConfig, ModuleSpec};
    use std::collections::BTreeMap;

    /// An isolated component at `/project/src/<name>/index.wxml`.
    pub fn module(name: &str) -> Module {
        let template_path = PathBuf::from(format!("/project/src/{}/index.wxml", name.to_lowercase()));
        ModuleSpec {
            name: name.to_string(),
            entry_root: PathBuf::from("/project/src"),
            script_path: template_path.with_extension("js"),
            template_path,
            config: ModuleConfig::default(),
            style_path: None,
            companion_script_paths: Vec::new(),
            included_components: BTreeMap::new(),
            library_sources: Vec::new(),
        }
        .into_module()
    }

    pub fn compile(markup: &str, module_name: &str) -> CompiledTemplate {
        let hooks = TemplateHooks::with_builtins();
        let module = module(module_name);
        let doc = parse_markup(markup, "index.wxml").unwrap();
        TemplateEngine::new(&hooks, &module).compile(doc).unwrap()
    }
}
