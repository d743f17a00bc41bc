//! Generates the component `.tsx` and one `.tsx` per named template fragment

use crate::asset::{output_path, Asset, AssetKind};
use crate::compilation::{Compilation, StageTap};
use crate::compiler::{Compiler, Plugin};
use crate::error::{CompilerError, Result};
use crate::module::Module;
use crate::template::{CompiledTemplate, TemplateFragment};
use crate::types::{COMPONENT_CLASS_PREFIX, COMPONENT_OUTPUT_EXT, RUNTIME_PACKAGE};
use crate::utils::{import_specifier, strike2camel_case};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;
use std::sync::LazyLock;

static OPTIONS_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:Component|Page)\s*\(").expect("valid options call pattern"));

pub struct GeneratorPlugin;

impl Plugin for GeneratorPlugin {
    fn name(&self) -> &'static str {
        "generator"
    }

    fn apply(&self, compiler: &mut Compiler) {
        compiler.hooks.compilation.tap(
            "generator",
            Rc::new(|cx: &mut Compilation| {
                cx.hooks.process_assets.tap("generator", Rc::new(GenerateComponent));
            }),
        );
    }
}

struct GenerateComponent;

#[async_trait(?Send)]
impl StageTap for GenerateComponent {
    async fn run(&self, cx: &Compilation) -> Result<()> {
        let options = &cx.run.options;
        let component_path = output_path(options, &cx.module.template_path, COMPONENT_OUTPUT_EXT);
        let component_dir = component_path.parent().unwrap_or(Path::new("")).to_path_buf();

        let (component, fragments) = {
            let context = cx.context();
            let Some(template) = context.template.as_ref() else {
                return Err(CompilerError::transform(
                    cx.module.template_path.display().to_string(),
                    "markup was not compiled before generation",
                ));
            };
            let style_import = context
                .style_bundle
                .as_ref()
                .map(|bundle| import_specifier(&component_dir, bundle));
            let script = context.entry_script.as_deref().unwrap_or_default();

            let component = generate_component(&cx.module, template, script, style_import.as_deref());
            let fragments: Vec<(String, String)> = template
                .registry
                .fragments
                .iter()
                .map(|fragment| (fragment.component_name.clone(), generate_fragment(&cx.module, template, fragment)))
                .collect();
            (component, fragments)
        };

        cx.emit_asset(Asset::new(cx.name(), AssetKind::Component, component_path, component));
        for (name, content) in fragments {
            let path = component_dir.join(format!("{}{}", name, COMPONENT_OUTPUT_EXT));
            cx.emit_asset(Asset::new(cx.name(), AssetKind::Fragment, path, content));
        }
        Ok(())
    }
}

/// Imports shared by components and fragments: companions, external and included components.
fn dependency_imports(module: &Module, template: &CompiledTemplate) -> Vec<String> {
    let mut imports = Vec::new();

    for companion in &template.registry.companions {
        imports.push(format!("import {} from '{}';", companion.name, companion.import_source()));
    }

    let mut named: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for tag in module.config.external_tags() {
        let Some(component) = module.config.external_component(tag) else {
            continue;
        };
        let Some(src) = component.src else {
            continue;
        };
        let name = strike2camel_case(&component.tag);
        if component.default_export {
            imports.push(format!("import {} from '{}';", name, src));
        } else {
            named.entry(src).or_default().push(name);
        }
    }
    for (src, names) in named {
        imports.push(format!("import {{ {} }} from '{}';", names.join(", "), src));
    }

    for (tag, included) in &module.included_components {
        let name = strike2camel_case(tag);
        if included.default_export {
            imports.push(format!("import {} from '{}';", name, included.from));
        } else {
            imports.push(format!("import {{ {} }} from '{}';", name, included.from));
        }
    }
    imports
}

/// `const { a, b } = <source>;` for the referenced names that are not companion modules.
fn data_binding(template: &CompiledTemplate, referenced: &BTreeSet<String>, source: &str) -> Option<String> {
    let names: Vec<&str> = referenced
        .iter()
        .filter(|name| template.registry.companion(name).is_none())
        .map(String::as_str)
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(format!("const {{ {} }} = {};", names.join(", "), source))
    }
}

/// The entry script with its `Component(`/`Page(` call turned into an options object.
pub fn options_script(script: &str) -> String {
    if OPTIONS_CALL.is_match(script) {
        OPTIONS_CALL
            .replace(script, "const withWeappOptions = (")
            .trim_end()
            .to_string()
    } else {
        let script = script.trim_end();
        if script.is_empty() {
            "const withWeappOptions = {};".to_string()
        } else {
            format!("{}\nconst withWeappOptions = {{}};", script)
        }
    }
}

pub fn generate_component(
    module: &Module,
    template: &CompiledTemplate,
    script: &str,
    style_import: Option<&str>,
) -> String {
    let name = &module.name;
    let mut imports = vec![
        "import React from 'react';".to_string(),
        format!("import {{ withWeapp }} from '{}';", RUNTIME_PACKAGE),
    ];
    imports.extend(dependency_imports(module, template));
    for fragment in &template.registry.fragments {
        imports.push(format!("import {} from '{}';", fragment.component_name, fragment.import_url));
    }
    if let Some(style) = style_import {
        imports.push(format!("import cssModule from '{}';", style));
    }

    let mut out = imports.join("\n");
    out.push_str("\n\n");
    out.push_str(&options_script(script));
    out.push_str("\n\n");
    out.push_str(&format!("class {} extends React.Component {{\n", name));
    if style_import.is_some() {
        out.push_str("  componentDidMount() {\n");
        out.push_str("    const cssModule0 = cssModule;\n");
        out.push_str("    if (cssModule0) {\n");
        out.push_str("      this.setData({\n");
        out.push_str("        styleInjections: this.data.styleInjections.concat(cssModule0(this.props.wmrt.rem))\n");
        out.push_str("      });\n");
        out.push_str("    }\n");
        out.push_str("  }\n\n");
    }
    out.push_str("  render() {\n");
    out.push_str("    const { wmrt } = this.props;\n");
    if let Some(binding) = data_binding(template, &template.referenced, "this.data") {
        out.push_str(&format!("    {}\n", binding));
    }
    out.push_str("    return (\n");
    out.push_str(&format!(
        "      <div className=\"{}{}\" ref={{this.$matrixRef}}>\n",
        COMPONENT_CLASS_PREFIX, name
    ));
    out.push_str(
        "        { this.state.styleInjections && this.state.styleInjections.map((item, i) => <style key={i}>{item}</style>) }\n",
    );
    out.push_str(&format!("        {}\n      </div>\n", template.content));
    out.push_str("    );\n  }\n}\n\n");
    out.push_str(&format!("export default withWeapp(withWeappOptions)({});\n", name));
    out
}

pub fn generate_fragment(module: &Module, template: &CompiledTemplate, fragment: &TemplateFragment) -> String {
    let (body, referenced) = fragment
        .compiled
        .as_ref()
        .map(|(body, referenced)| (body.as_str(), referenced.clone()))
        .unwrap_or_default();

    let mut imports = vec!["import React from 'react';".to_string()];
    imports.extend(dependency_imports(module, template));
    for other in &template.registry.fragments {
        if other.name != fragment.name {
            imports.push(format!("import {} from '{}';", other.component_name, other.import_url));
        }
    }

    let mut out = imports.join("\n");
    out.push_str("\n\n");
    out.push_str(&format!(
        "export default class {} extends React.Component {{\n",
        fragment.component_name
    ));
    out.push_str("  render() {\n");
    out.push_str("    const { wmrt } = this.props;\n");
    if let Some(binding) = data_binding(template, &referenced, "this.props.data || {}") {
        out.push_str(&format!("    {}\n", binding));
    }
    out.push_str(&format!("    return <React.Fragment>{}</React.Fragment>;\n", body));
    out.push_str("  }\n}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{IncludedComponent, ModuleConfig, ModuleSpec};
    use crate::template::{parse_markup, TemplateEngine, TemplateHooks};
    use std::path::PathBuf;

    fn module(config: ModuleConfig) -> Module {
        let template_path = PathBuf::from("/project/src/home/index.wxml");
        let mut included_components = BTreeMap::new();
        included_components.insert(
            "card".to_string(),
            IncludedComponent {
                from: "../card/index".into(),
                default_export: true,
            },
        );
        ModuleSpec {
            name: "Home".into(),
            entry_root: PathBuf::from("/project/src"),
            script_path: template_path.with_extension("js"),
            template_path,
            config,
            style_path: None,
            companion_script_paths: Vec::new(),
            included_components,
            library_sources: Vec::new(),
        }
        .into_module()
    }

    fn compile(module: &Module, markup: &str) -> CompiledTemplate {
        let hooks = TemplateHooks::with_builtins();
        let doc = parse_markup(markup, "index.wxml").unwrap();
        TemplateEngine::new(&hooks, module).compile(doc).unwrap()
    }

    #[test]
    fn test_options_script() {
        assert_eq!(
            options_script("Page({ data: {} })\n"),
            "const withWeappOptions = ({ data: {} })"
        );
        assert_eq!(options_script("const a = 1;"), "const a = 1;\nconst withWeappOptions = {};");
    }

    #[test]
    fn test_component_layout() {
        let module = module(ModuleConfig::default());
        let template = compile(
            &module,
            r#"<wxs module="fmt" src="./fmt.wxs"/><card title="{{fmt.upper(title)}}"/>"#,
        );
        let out = generate_component(&module, &template, "Page({})", Some("./index.css.js"));

        let imports: Vec<&str> = out.lines().take_while(|l| l.starts_with("import")).collect();
        assert_eq!(
            imports,
            vec![
                "import React from 'react';",
                "import { withWeapp } from '@matrix/runtime';",
                "import fmt from './fmt.wxs.js';",
                "import Card from '../card/index';",
                "import cssModule from './index.css.js';",
            ]
        );
        assert!(out.contains("const withWeappOptions = ({})"));
        assert!(out.contains("class Home extends React.Component {"));
        assert!(out.contains("const { title } = this.data;"));
        assert!(out.contains(r#"<div className="matrix-component__Home" ref={this.$matrixRef}>"#));
        assert!(out.contains("        <Card title={"));
        assert!(out.contains("styleInjections: this.data.styleInjections.concat(cssModule0(this.props.wmrt.rem))"));
        assert!(out.ends_with("export default withWeapp(withWeappOptions)(Home);\n"));
    }

    #[test]
    fn test_fragment_reads_props_data() {
        let module = module(ModuleConfig::default());
        let template = compile(
            &module,
            r#"<template name="row"><text>{{label}}</text></template><template is="row" data="{{item}}"/>"#,
        );
        let fragment = &template.registry.fragments[0];
        let out = generate_fragment(&module, &template, fragment);

        assert!(out.contains("export default class RowTemplate extends React.Component {"));
        assert!(out.contains("const { label } = this.props.data || {};"));
        assert!(out.contains("<React.Fragment><span>{label}</span></React.Fragment>"));
        assert!(!out.contains("import RowTemplate"));

        let component = generate_component(&module, &template, "", None);
        assert!(component.contains("import RowTemplate from './RowTemplate.tsx';"));
        assert!(component.contains("const withWeappOptions = {};"));
        assert!(!component.contains("componentDidMount"));
    }
}
