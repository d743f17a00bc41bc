//! Source tag to target tag mapping, plus the `template` and `wxs` declarations

use super::ast::NodeId;
use super::scope::TemplateScope;
use super::{CompanionKind, CompanionModule, TemplateFragment};
use crate::error::Result;
use crate::module::ExternalComponent;
use crate::types::{COMPANION_EXT, TAG_NAME_MAP};
use crate::utils::{normalize_path, strike2camel_case};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum TagRule {
    Rename(String),
    /// A third-party component: tag replaced and its props merged into the attributes.
    External(ExternalComponent),
}

/// Tag rules for one module, seeded with the built-in renames.
#[derive(Debug, Clone, Default)]
pub struct TagRules {
    rules: BTreeMap<String, TagRule>,
}

impl TagRules {
    pub fn builtin() -> Self {
        let rules = TAG_NAME_MAP
            .iter()
            .map(|(from, to)| (from.to_string(), TagRule::Rename(to.to_string())))
            .collect();
        Self { rules }
    }

    pub fn insert(&mut self, tag: impl Into<String>, rule: TagRule) {
        self.rules.insert(tag.into(), rule);
    }

    pub fn get(&self, tag: &str) -> Option<&TagRule> {
        self.rules.get(tag)
    }
}

/// Outcome of tag resolution for one element.
#[derive(Debug, Clone, PartialEq)]
pub enum TagResolution {
    Emit(String),
    /// The element (and its subtree) is consumed by resolution and produces no output.
    Skip,
}

pub fn resolve_tag(scope: &mut TemplateScope<'_>, rules: &TagRules) -> Result<TagResolution> {
    let name = scope.element_name().to_string();
    match name.as_str() {
        "template" => return Ok(resolve_template(scope)),
        "wxs" => return Ok(register_companion(scope)),
        _ => {}
    }

    let tag = match rules.get(&name) {
        Some(TagRule::Rename(to)) => to.clone(),
        Some(TagRule::External(component)) => {
            if let Some(element) = scope.doc.element_mut(scope.node) {
                for (key, value) in component.prop_attributes() {
                    element.set(&key, value);
                }
            }
            strike2camel_case(&component.tag)
        }
        None => strike2camel_case(&name),
    };
    Ok(TagResolution::Emit(tag))
}

fn resolve_template(scope: &mut TemplateScope<'_>) -> TagResolution {
    let node = scope.node;
    let Some(element) = scope.doc.element(node) else {
        return TagResolution::Skip;
    };
    let is = element.get("is").map(str::to_string);
    let name = element.get("name").map(str::to_string);

    if let Some(is) = is {
        let component = scope.registry.fragment(&is).map(|f| f.component_name.clone());
        return match component {
            Some(component) => {
                if let Some(element) = scope.doc.element_mut(node) {
                    element.remove("is");
                    element.set("callEvent", "callEvent");
                }
                TagResolution::Emit(component)
            }
            None => {
                log::warn!("{}:{}: unknown template '{}'", scope.file(), scope.line(), is);
                TagResolution::Skip
            }
        };
    }

    match name {
        Some(name) => {
            if scope.registry.fragment(&name).is_none() {
                let document = scope.doc.extract_children(node);
                scope.registry.fragments.push(TemplateFragment::new(name, document));
            }
        }
        None => log::warn!(
            "{}:{}: <template> needs a name or an is attribute",
            scope.file(),
            scope.line()
        ),
    }
    TagResolution::Skip
}

fn register_companion(scope: &mut TemplateScope<'_>) -> TagResolution {
    let node: NodeId = scope.node;
    let Some(element) = scope.doc.element(node) else {
        return TagResolution::Skip;
    };
    let Some(name) = element.get("module").map(str::to_string) else {
        log::warn!("{}:{}: <wxs> without a module attribute", scope.file(), scope.line());
        return TagResolution::Skip;
    };
    if scope.registry.companion(&name).is_some() {
        return TagResolution::Skip;
    }

    let (kind, import_url) = match element.get("src") {
        Some(src) => (CompanionKind::External, src.to_string()),
        None => (CompanionKind::Inline, format!("./{}{}", name, COMPANION_EXT)),
    };
    let content = scope.doc.inner_text(node);
    let source_path = normalize_path(&scope.module.base_path.join(&import_url));
    scope.registry.companions.push(CompanionModule {
        name,
        kind,
        import_url,
        source_path,
        content,
    });
    TagResolution::Skip
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::test_support::module;
    use crate::template::{parse_markup, TemplateRegistry};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn resolve_all(markup: &str, rules: &TagRules, registry: &mut TemplateRegistry) -> Vec<TagResolution> {
        let mut doc = parse_markup(markup, "a.wxml").unwrap();
        let module = module("Card");
        let mut referenced = BTreeSet::new();
        let nodes = doc.children(NodeId::ROOT).to_vec();
        nodes
            .into_iter()
            .map(|node| {
                let mut scope = TemplateScope {
                    module: &module,
                    doc: &mut doc,
                    node,
                    referenced: &mut referenced,
                    registry: &mut *registry,
                    in_fragment: false,
                };
                resolve_tag(&mut scope, rules).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_builtin_and_fallback_tags() {
        let mut registry = TemplateRegistry::default();
        let resolved = resolve_all("<view/><block/><my-button/>", &TagRules::builtin(), &mut registry);
        assert_eq!(
            resolved,
            vec![
                TagResolution::Emit("div".into()),
                TagResolution::Emit("React.Fragment".into()),
                TagResolution::Emit("MyButton".into()),
            ]
        );
    }

    #[test]
    fn test_template_fragments_register_then_resolve() {
        let mut registry = TemplateRegistry::default();
        let resolved = resolve_all(
            r#"<template name="user-card"><text>{{name}}</text></template><template is="user-card" data="{{...user}}"/><template is="missing"/>"#,
            &TagRules::builtin(),
            &mut registry,
        );
        assert_eq!(
            resolved,
            vec![
                TagResolution::Skip,
                TagResolution::Emit("UserCardTemplate".into()),
                TagResolution::Skip,
            ]
        );
        let fragment = registry.fragment("user-card").unwrap();
        assert_eq!(fragment.import_url, "./UserCardTemplate.tsx");
    }

    #[test]
    fn test_companion_modules_first_wins() {
        let mut registry = TemplateRegistry::default();
        resolve_all(
            r#"<wxs module="fmt" src="./fmt.wxs"/><wxs module="fmt">module.exports = 1</wxs><wxs module="tools">module.exports = {}</wxs>"#,
            &TagRules::builtin(),
            &mut registry,
        );
        assert_eq!(registry.companions.len(), 2);
        let fmt = registry.companion("fmt").unwrap();
        assert_eq!(fmt.kind, CompanionKind::External);
        assert_eq!(fmt.import_source(), "./fmt.wxs.js");
        let tools = registry.companion("tools").unwrap();
        assert_eq!(tools.kind, CompanionKind::Inline);
        assert_eq!(tools.content, "module.exports = {}");
        assert_eq!(tools.source_path, PathBuf::from("/project/src/card/tools.wxs"));
    }

    #[test]
    fn test_external_component_props_override_attributes() {
        let mut rules = TagRules::builtin();
        let component = ExternalComponent {
            tag: "ti-button".into(),
            src: Some("@ti/ui".into()),
            props: BTreeMap::from([("size".to_string(), serde_json::json!("small"))]),
            default_export: true,
        };
        rules.insert("ti-button", TagRule::External(component));

        let mut doc = parse_markup(r#"<ti-button size="large"/>"#, "a.wxml").unwrap();
        let node = doc.children(NodeId::ROOT)[0];
        let module = module("Card");
        let mut referenced = BTreeSet::new();
        let mut registry = TemplateRegistry::default();
        let mut scope = TemplateScope {
            module: &module,
            doc: &mut doc,
            node,
            referenced: &mut referenced,
            registry: &mut registry,
            in_fragment: false,
        };
        assert_eq!(resolve_tag(&mut scope, &rules).unwrap(), TagResolution::Emit("TiButton".into()));
        assert_eq!(doc.element(node).unwrap().get("size"), Some("small"));
    }
}
