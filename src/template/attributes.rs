//! Attribute preprocessing, ranking and the built-in attribute handlers
//!
//! Handlers are tapped on a bail hook in a fixed order. Later handlers rely on earlier ones
//! having consumed directive and loop-variable attributes.

use super::ast::{Attribute, DirectiveKind, Element, SiblingCondition};
use super::mustache::{self, try_replace};
use super::scope::TemplateScope;
use crate::error::Result;
use crate::types::{lookup, ATTRS_MAP, DIRECTIVE_PREFIX, EVENTS_MAP};
use crate::utils::{camelcase, first_letter_uppercase, has_length_unit, rpx2rem};
use regex::Regex;
use std::rc::Rc;
use std::sync::LazyLock;

/// Emission priority tiers. Anything unranked follows in original order.
pub const ATTRIBUTE_PRIORITY: &[&[&str]] = &[
    &["x:for"],
    &["x:for-item", "x:for-index"],
    &["x:key"],
    &["x:if"],
];

static EVENT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(bind:|catch:|bind|catch)").expect("valid event prefix pattern"));

static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid expression pattern"));

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^{}]+)?\{PLACEHOLDER(\d+)\}([^{}]+)?").expect("valid placeholder pattern")
});

/// One resolved attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeOutput {
    pub name: String,
    pub value: String,
    /// Recorded but not emitted.
    pub drop: bool,
    /// Value is emitted as-is instead of quoted.
    pub raw: bool,
}

impl AttributeOutput {
    pub fn quoted(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            drop: false,
            raw: false,
        }
    }

    pub fn raw(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            raw: true,
            ..Self::quoted(name, value)
        }
    }

    pub fn dropped(name: impl Into<String>) -> Self {
        Self {
            drop: true,
            ..Self::quoted(name, "")
        }
    }

    pub fn render(&self) -> Option<String> {
        if self.drop {
            None
        } else if self.raw {
            Some(format!("{}={}", self.name, self.value))
        } else {
            Some(format!("{}=\"{}\"", self.name, self.value))
        }
    }
}

/// Resolves one attribute, or declines so the next handler can try.
pub trait AttributeHandler {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>>;
}

/// Orders attribute keys by [`ATTRIBUTE_PRIORITY`].
pub fn priority_ranking(keys: &[String]) -> Vec<String> {
    let mut remaining: Vec<String> = keys.to_vec();
    let mut ranked = Vec::with_capacity(keys.len());
    for tier in ATTRIBUTE_PRIORITY {
        for key in tier.iter() {
            if let Some(index) = remaining.iter().position(|k| k == key) {
                ranked.push(remaining.remove(index));
            }
        }
    }
    ranked.extend(remaining);
    ranked
}

fn hidden_display(hidden: &str) -> String {
    if mustache::has_mustache(hidden) {
        EXPRESSION
            .replacen(hidden, 1, |caps: &regex::Captures<'_>| {
                format!("{} ? \"none\" : \"\"", &caps[1])
            })
            .into_owned()
    } else if hidden.trim().is_empty() {
        "true ? \"none\" : \"\"".to_string()
    } else {
        format!("{} ? \"none\" : \"\"", hidden)
    }
}

/// Folds `hidden` into `style` and gives `x:for` an implicit empty `x:key`.
pub fn preprocess(element: &mut Element) {
    if let Some(hidden) = element.remove("hidden") {
        let display = hidden_display(&hidden);
        match element.get("style").map(str::to_string) {
            Some(style) if style.contains("display") => {}
            Some(style) => element.set("style", format!("{};display: {{{{{}}}}}", style, display)),
            None => element.set("style", format!("display: {{{{ {} }}}}", display)),
        }
    }
    if element.has("x:for") && !element.has("x:key") {
        element.set("x:key", "");
    }
}

/// `x:if` / `x:elif` / `x:else` / `x:for`: recorded on the collector, never emitted.
pub struct DirectiveAttributes;

impl AttributeHandler for DirectiveAttributes {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>> {
        let Some(kind) = DirectiveKind::from_attribute(&attribute.key) else {
            return Ok(None);
        };

        let value = if mustache::has_mustache(&attribute.value) {
            scope.single_expression(&attribute.value)?
        } else if attribute.value.is_empty() {
            String::new()
        } else {
            let items: Vec<String> = attribute
                .value
                .split(',')
                .map(|item| format!("{:?}", item.trim()))
                .collect();
            format!("[{}]", items.join(","))
        };

        let node = scope.node;
        let collector = scope.collector_mut();
        collector.set_directive(kind, value.clone());
        if kind == DirectiveKind::For {
            collector.variables.item = Some("item".to_string());
            collector.variables.index = Some("index".to_string());
        }
        if kind.is_conditional() {
            if let Some(parent) = scope.parent_collector_mut() {
                parent.sibling_conditions.push(SiblingCondition {
                    directive: kind,
                    value,
                    node,
                });
            }
        }

        Ok(Some(AttributeOutput::dropped(attribute.key.trim_start_matches(DIRECTIVE_PREFIX))))
    }
}

/// `bind*` / `catch*` event bindings.
pub struct EventAttributes;

impl EventAttributes {
    fn event_name(key: &str) -> String {
        if let Some(mapped) = lookup(EVENTS_MAP, key) {
            return mapped.to_string();
        }
        let renamed = camelcase(&EVENT_PREFIX.replace(key, "on"));
        match renamed.get(2..) {
            Some(rest) if !rest.is_empty() => format!("on{}", first_letter_uppercase(rest)),
            _ => renamed,
        }
    }
}

impl AttributeHandler for EventAttributes {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>> {
        let key = attribute.key.as_str();
        if lookup(EVENTS_MAP, key).is_none() && !EVENT_PREFIX.is_match(key) {
            return Ok(None);
        }

        let handler = if mustache::has_mustache(&attribute.value) {
            scope.single_expression(&attribute.value)?
        } else {
            format!("\"{}\"", attribute.value)
        };
        Ok(Some(AttributeOutput::raw(
            Self::event_name(key),
            format!("{{ wmrt.event({}, this) }}", handler),
        )))
    }
}

/// `x:key`, `x:for-item` and `x:for-index`.
pub struct LoopVariableAttributes;

impl AttributeHandler for LoopVariableAttributes {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>> {
        let value = attribute.value.trim().to_string();
        match attribute.key.as_str() {
            "x:key" => {
                if value.contains("{{") {
                    return Err(scope.directive_error(format!(
                        "x:key=\"{}\" on <{}> must be a property name or *this, not a binding",
                        attribute.value,
                        scope.element_name()
                    )));
                }
                let variables = &mut scope.collector_mut().variables;
                let item = variables.item.clone().unwrap_or_else(|| "item".to_string());
                let index = variables.index.clone().unwrap_or_else(|| "index".to_string());
                let key = if value == "*this" {
                    item
                } else if value.is_empty() {
                    index
                } else if value == index {
                    value
                } else {
                    format!("{}.{}", item, value)
                };
                variables.key = Some(key.clone());
                Ok(Some(AttributeOutput::raw("key", format!("{{ {} }}", key))))
            }
            "x:for-item" => {
                scope.collector_mut().variables.item = Some(value);
                Ok(Some(AttributeOutput::dropped("item")))
            }
            "x:for-index" => {
                scope.collector_mut().variables.index = Some(value);
                Ok(Some(AttributeOutput::dropped("index")))
            }
            _ => Ok(None),
        }
    }
}

/// Replaces every `{{ }}` with `{PLACEHOLDERn}` so the value can be split safely.
fn mask_expressions(value: &str) -> (String, Vec<String>) {
    let mut codes = Vec::new();
    let masked = EXPRESSION
        .replace_all(value, |caps: &regex::Captures<'_>| {
            codes.push(caps[1].to_string());
            format!("{{PLACEHOLDER{}}}", codes.len() - 1)
        })
        .into_owned();
    (masked, codes)
}

fn unmask(value: &str, codes: &[String]) -> String {
    let mut out = value.to_string();
    for (i, code) in codes.iter().enumerate() {
        out = out.replace(&format!("{{PLACEHOLDER{}}}", i), &format!("{{{{{}}}}}", code));
    }
    out
}

/// `class`, `style`, `id`, `ref` and the external class/style props.
pub struct RuntimeAttributes;

impl RuntimeAttributes {
    /// Space-separated tokens, scoped with `__<Module>` when `scoped`.
    pub fn format_class_value(
        scope: &mut TemplateScope<'_>,
        value: &str,
        scoped: bool,
    ) -> Result<(String, bool)> {
        let module_name = scope.module.name.clone();

        if !mustache::has_mustache(value) {
            let tokens: Vec<String> = value
                .split(' ')
                .filter(|token| !token.is_empty())
                .map(|token| {
                    if scoped {
                        format!("{}__{}", token, module_name)
                    } else {
                        token.to_string()
                    }
                })
                .collect();
            return Ok((tokens.join(" "), false));
        }

        let (masked, codes) = mask_expressions(value);
        let mut tokens = Vec::new();
        for token in masked.split_whitespace() {
            if !token.contains("{PLACEHOLDER") {
                tokens.push(if scoped {
                    format!("{}__{}", token, module_name)
                } else {
                    token.to_string()
                });
                continue;
            }
            let rendered = try_replace(&PLACEHOLDER, token, |caps| -> Result<String> {
                let index: usize = caps[2].parse().unwrap_or_default();
                let source = codes.get(index).map(String::as_str).unwrap_or_default();
                let code = scope.compile_expression(source)?;
                let code = if scoped {
                    format!("wmrt.cn({}, \"{}\")", code, module_name)
                } else {
                    code
                };
                let before = caps.get(1).map_or("", |m| m.as_str());
                let after = caps.get(3).map_or("", |m| m.as_str());
                Ok(format!("{}${{{}}}{}", before, code, after))
            })?;
            tokens.push(rendered);
        }
        Ok((format!("{{`{}`}}", tokens.join(" ")), true))
    }

    /// A whole-expression style item: `...wmrt.style( code )`.
    fn style_spread(scope: &mut TemplateScope<'_>, item: &str) -> Result<String> {
        let mut parts = Vec::new();
        for span in mustache::spans(item) {
            let code = scope.compile_expression(&span.code)?;
            let argument = if span.before.is_empty() && span.after.is_empty() {
                code
            } else {
                format!("`{}${{{}}}{}`", span.before, code, span.after)
            };
            parts.push(format!("...wmrt.style( {} )", argument));
        }
        Ok(parts.join(","))
    }

    /// `k: v; …` into a `{{"k": v, …}}` object expression.
    pub fn format_style_value(scope: &mut TemplateScope<'_>, value: &str) -> Result<String> {
        let (masked, codes) = mask_expressions(value);
        let mut entries = Vec::new();

        for item in masked.split(';') {
            let item = unmask(item, &codes);
            if mustache::whole(&item).is_some() {
                entries.push(Self::style_spread(scope, item.trim())?);
                continue;
            }
            let Some((key, value)) = item.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.contains("{{") {
                entries.push(Self::style_spread(scope, item.trim())?);
                continue;
            }

            let key = if !key.starts_with("--") && key.contains('-') {
                camelcase(key)
            } else {
                key.to_string()
            };

            if mustache::has_mustache(value) {
                let mut template = String::new();
                for span in mustache::spans(value) {
                    let code = scope.compile_expression(&span.code)?;
                    template.push_str(&format!("{}${{{}}}{}", span.before, code, span.after));
                }
                entries.push(format!("\"{}\": wmrt.rem(`{}`)", key, template));
            } else if has_length_unit(value) {
                entries.push(format!("\"{}\": `{}`", key, rpx2rem(value, true)));
            } else {
                entries.push(format!("\"{}\": \"{}\"", key, value));
            }
        }

        Ok(format!("{{{{{}}}}}", entries.join(",")))
    }
}

impl AttributeHandler for RuntimeAttributes {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>> {
        let key = attribute.key.as_str();
        let name = lookup(ATTRS_MAP, key).unwrap_or(key);
        let output = match key {
            "style" | "ext-style" | "extStyle" => {
                AttributeOutput::raw(name, Self::format_style_value(scope, &attribute.value)?)
            }
            "class" | "ext-class" | "id" => {
                let scoped = key != "id" && scope.module.style_isolated();
                let (value, raw) = Self::format_class_value(scope, &attribute.value, scoped)?;
                AttributeOutput {
                    raw,
                    ..AttributeOutput::quoted(name, value)
                }
            }
            "ref" => {
                if mustache::whole(&attribute.value).is_some() {
                    AttributeOutput::raw(name, scope.interpolate(&attribute.value)?)
                } else {
                    let (value, raw) = Self::format_class_value(scope, &attribute.value, false)?;
                    AttributeOutput {
                        raw,
                        ..AttributeOutput::quoted(name, value)
                    }
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(output))
    }
}

/// `data-*` attributes.
pub struct DatasetAttributes;

impl AttributeHandler for DatasetAttributes {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>> {
        if !attribute.key.starts_with("data-") {
            return Ok(None);
        }
        if !mustache::has_mustache(&attribute.value) {
            return Ok(Some(AttributeOutput::quoted(&attribute.key, &attribute.value)));
        }
        let value = mustache::replace_spans(&attribute.value, |span| -> Result<String> {
            let code = scope.compile_expression(&span.code)?;
            Ok(format!("{{wmrt.stringify({})}}", code))
        })?;
        Ok(Some(AttributeOutput::raw(&attribute.key, value)))
    }
}

/// `data` and `callEvent` on a `<template is>` reference.
pub struct TemplateTagAttributes;

impl TemplateTagAttributes {
    fn data_expression(code: &str) -> String {
        let code = code.trim();
        if code.contains("...") && code.contains(',') {
            format!("{{{}}}", code)
        } else if let Some(rest) = code.strip_prefix("...") {
            rest.to_string()
        } else {
            format!("{{{}}}", code)
        }
    }
}

impl AttributeHandler for TemplateTagAttributes {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>> {
        if scope.element_name() != "template" {
            return Ok(None);
        }
        match attribute.key.as_str() {
            "callEvent" => {
                let value = if scope.in_fragment {
                    "{this.props.callEvent}"
                } else {
                    "{this.callEvent}"
                };
                Ok(Some(AttributeOutput::raw("callEvent", value)))
            }
            "data" if mustache::has_mustache(&attribute.value) => {
                let value = mustache::replace_spans(&attribute.value, |span| -> Result<String> {
                    let code = scope.compile_expression(&Self::data_expression(&span.code))?;
                    Ok(format!("{{ {} }}", code))
                })?;
                Ok(Some(AttributeOutput::raw("data", value)))
            }
            "data" => Ok(Some(AttributeOutput::quoted("data", &attribute.value))),
            _ => Ok(None),
        }
    }
}

/// Everything else: camel-cased name, `{{ }}` promoted to an expression.
pub struct FallbackAttributes;

impl AttributeHandler for FallbackAttributes {
    fn resolve(
        &self,
        scope: &mut TemplateScope<'_>,
        attribute: &Attribute,
    ) -> Result<Option<AttributeOutput>> {
        let value = if attribute.value.is_empty() {
            "{{true}}"
        } else {
            attribute.value.as_str()
        };
        let name = camelcase(&attribute.key);
        if mustache::has_mustache(value) {
            Ok(Some(AttributeOutput::raw(name, scope.interpolate(value)?)))
        } else {
            Ok(Some(AttributeOutput::quoted(name, value)))
        }
    }
}

/// The built-in handlers in their required order.
pub fn builtin_handlers() -> Vec<(&'static str, Rc<dyn AttributeHandler>)> {
    vec![
        ("directives", Rc::new(DirectiveAttributes)),
        ("events", Rc::new(EventAttributes)),
        ("loop-variables", Rc::new(LoopVariableAttributes)),
        ("runtime-attributes", Rc::new(RuntimeAttributes)),
        ("dataset", Rc::new(DatasetAttributes)),
        ("template-tag", Rc::new(TemplateTagAttributes)),
        ("fallback", Rc::new(FallbackAttributes)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StyleIsolation;
    use crate::template::ast::{NodeId, TemplateDocument};
    use crate::template::test_support::module;
    use crate::template::{parse_markup, TemplateRegistry};
    use std::collections::BTreeSet;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    fn with_scope<T>(
        markup: &str,
        module_name: &str,
        isolation: StyleIsolation,
        f: impl FnOnce(&mut TemplateScope<'_>) -> T,
    ) -> (T, BTreeSet<String>) {
        let mut doc: TemplateDocument = parse_markup(markup, "a.wxml").unwrap();
        let node = doc.children(NodeId::ROOT)[0];
        let mut module = module(module_name);
        module.config.style_isolation = isolation;
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
        let out = f(&mut scope);
        (out, referenced)
    }

    #[test]
    fn test_ranking_orders_directive_tiers() {
        let ranked = priority_ranking(&keys(&["class", "x:if", "x:key", "x:for-index", "x:for", "x:for-item"]));
        assert_eq!(ranked, keys(&["x:for", "x:for-item", "x:for-index", "x:key", "x:if", "class"]));
    }

    #[test]
    fn test_ranking_is_stable_under_permutation() {
        let expected = keys(&["x:for", "x:for-item", "x:for-index", "x:key", "x:if", "class", "style", "data-id"]);
        let permutations: [&[&str]; 4] = [
            &["class", "x:if", "style", "x:key", "data-id", "x:for-index", "x:for-item", "x:for"],
            &["x:if", "x:for-item", "class", "x:for", "style", "x:key", "x:for-index", "data-id"],
            &["x:for-index", "class", "style", "x:for", "x:if", "x:key", "data-id", "x:for-item"],
            &["class", "style", "data-id", "x:key", "x:if", "x:for-item", "x:for", "x:for-index"],
        ];
        for input in permutations {
            let ranked = priority_ranking(&keys(input));
            assert_eq!(ranked, expected);
            assert_eq!(priority_ranking(&ranked), ranked);
        }
    }

    #[test]
    fn test_preprocess_hidden_and_implicit_key() {
        let mut doc = parse_markup(r#"<view hidden="{{closed}}" x:for="{{list}}"/>"#, "a.wxml").unwrap();
        let node = doc.children(NodeId::ROOT)[0];
        let element = doc.element_mut(node).unwrap();
        preprocess(element);
        assert_eq!(element.get("style"), Some("display: {{ closed ? \"none\" : \"\" }}"));
        assert_eq!(element.get("x:key"), Some(""));
        assert!(!element.has("hidden"));

        let mut doc = parse_markup(r#"<view style="display: flex" hidden/>"#, "a.wxml").unwrap();
        let node = doc.children(NodeId::ROOT)[0];
        let element = doc.element_mut(node).unwrap();
        preprocess(element);
        assert_eq!(element.get("style"), Some("display: flex"));
    }

    #[test]
    fn test_class_tokens_are_scoped_per_module() {
        let ((value, raw), referenced) = with_scope("<view/>", "Card", StyleIsolation::Isolated, |scope| {
            RuntimeAttributes::format_class_value(scope, "box {{active ? 'on' : ''}}", true).unwrap()
        });
        assert!(raw);
        assert_eq!(value, "{`box__Card ${wmrt.cn(active ? 'on' : '', \"Card\")}`}");
        assert!(referenced.contains("active"));

        let ((value, raw), _) = with_scope("<view/>", "Card", StyleIsolation::Shared, |scope| {
            RuntimeAttributes::format_class_value(scope, "box  big", false).unwrap()
        });
        assert!(!raw);
        assert_eq!(value, "box big");
    }

    #[test]
    fn test_style_value_grammar() {
        let (value, referenced) = with_scope("<view/>", "Card", StyleIsolation::Isolated, |scope| {
            RuntimeAttributes::format_style_value(
                scope,
                "font-size: 12rpx; color: red; width: {{w}}px; --gap: 2; {{extra}}",
            )
            .unwrap()
        });
        assert_eq!(
            value,
            "{{\"fontSize\": `${this.props.wmrt.rem(\"12rpx\")}`,\"color\": \"red\",\"width\": wmrt.rem(`${w}px`),\"--gap\": \"2\",...wmrt.style( extra )}}"
        );
        assert_eq!(referenced.into_iter().collect::<Vec<_>>(), vec!["extra", "w"]);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventAttributes::event_name("bindtap"), "onClick");
        assert_eq!(EventAttributes::event_name("bind:change"), "onChange");
        assert_eq!(EventAttributes::event_name("catchlong-press"), "onLongPress");
        assert_eq!(EventAttributes::event_name("bind:touchmove"), "onTouchMove");
    }

    #[test]
    fn test_loop_key_resolution() {
        let (out, _) = with_scope("<view/>", "List", StyleIsolation::Isolated, |scope| {
            let this = LoopVariableAttributes
                .resolve(scope, &Attribute::new("x:key", "*this"))
                .unwrap()
                .unwrap();
            let id = LoopVariableAttributes
                .resolve(scope, &Attribute::new("x:key", "id"))
                .unwrap()
                .unwrap();
            let bound = LoopVariableAttributes.resolve(scope, &Attribute::new("x:key", "{{id}}"));
            (this.render(), id.render(), bound.is_err())
        });
        assert_eq!(out.0.as_deref(), Some("key={ item }"));
        assert_eq!(out.1.as_deref(), Some("key={ item.id }"));
        assert!(out.2);
    }

    #[test]
    fn test_fallback_and_dataset() {
        let (out, _) = with_scope("<view/>", "List", StyleIsolation::Isolated, |scope| {
            let empty = FallbackAttributes.resolve(scope, &Attribute::new("disabled", "")).unwrap();
            let text = FallbackAttributes
                .resolve(scope, &Attribute::new("aria-label", "Go {{name}}"))
                .unwrap();
            let data = DatasetAttributes
                .resolve(scope, &Attribute::new("data-item", "{{row}}"))
                .unwrap();
            [empty, text, data].map(|o| o.and_then(|o| o.render()))
        });
        assert_eq!(out[0].as_deref(), Some("disabled={ true }"));
        assert_eq!(out[1].as_deref(), Some("ariaLabel={`Go ${name}`}"));
        assert_eq!(out[2].as_deref(), Some("data-item={wmrt.stringify(row)}"));
    }
}
