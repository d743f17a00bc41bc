//! Lowering of `x:if` / `x:elif` / `x:else` / `x:for` into target expressions

use super::ast::{DirectiveKind, NodeCollector, NodeId, SiblingCondition, TemplateDocument};

/// One wrapping step applied to an element's text in pass B.
#[derive(Debug, Clone, PartialEq)]
pub enum Lowering {
    If(String),
    Elif(String),
    Else(String),
    For(String),
    /// A `for` and an `if` on the same element, folded into one keyed map.
    ForWithIf { list: String, condition: String },
}

/// Loop bindings used by the `for` lowerings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOptions {
    pub item: String,
    pub index: String,
    pub key: String,
}

impl LoopOptions {
    pub fn from_collector(collector: &NodeCollector) -> Self {
        let item = collector.variables.item.clone().unwrap_or_else(|| "item".to_string());
        let index = collector.variables.index.clone().unwrap_or_else(|| "index".to_string());
        let key = collector.variables.key.clone().unwrap_or_else(|| index.clone());
        Self { item, index, key }
    }
}

/// The lowerings of one element in application order.
pub fn synthesize(collector: &NodeCollector) -> Vec<Lowering> {
    let mut lowerings = Vec::new();
    let for_with_if = match (
        collector.directive(DirectiveKind::For),
        collector.directive(DirectiveKind::If),
    ) {
        (Some(list), Some(condition)) => {
            lowerings.push(Lowering::ForWithIf {
                list: list.value.clone(),
                condition: condition.value.clone(),
            });
            true
        }
        _ => false,
    };

    for directive in &collector.directives {
        let value = directive.value.clone();
        let lowering = match directive.kind {
            DirectiveKind::For | DirectiveKind::If if for_with_if => continue,
            DirectiveKind::For => Lowering::For(value),
            DirectiveKind::If => Lowering::If(value),
            DirectiveKind::Elif => Lowering::Elif(value),
            DirectiveKind::Else => Lowering::Else(value),
        };
        lowerings.push(lowering);
    }
    lowerings
}

/// Conditions that must all be false for `node`'s branch: the contiguous `elif`s before it
/// back to the governing `if`, in document order.
pub fn preceding_conditions(siblings: &[SiblingCondition], node: NodeId) -> Vec<String> {
    let Some(position) = siblings.iter().position(|s| s.node == node) else {
        return Vec::new();
    };

    let mut conditions = Vec::new();
    for sibling in siblings[..position].iter().rev() {
        match sibling.directive {
            DirectiveKind::Elif => conditions.push(sibling.value.clone()),
            DirectiveKind::If => {
                conditions.push(sibling.value.clone());
                break;
            }
            _ => break,
        }
    }
    conditions.reverse();
    conditions
}

fn negation(conditions: &[String]) -> String {
    conditions
        .iter()
        .map(|c| format!("!({})", c))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Guard expression of a conditional branch. `None` means the branch always renders.
pub fn branch_condition(kind: DirectiveKind, value: &str, preceding: &[String]) -> Option<String> {
    match kind {
        DirectiveKind::If => Some(format!("!!({})", value)),
        DirectiveKind::Elif if preceding.is_empty() => Some(format!("!!({})", value)),
        DirectiveKind::Elif => Some(format!("({}) && ({})", negation(preceding), value)),
        DirectiveKind::Else if !value.trim().is_empty() => Some(format!("({})", value)),
        DirectiveKind::Else if preceding.is_empty() => None,
        DirectiveKind::Else => Some(format!("({})", negation(preceding))),
        DirectiveKind::For => None,
    }
}

fn guarded(guard: Option<String>, content: String) -> String {
    match guard {
        Some(guard) => format!("{{ {} && ( {} ) }}", guard, content),
        None => content,
    }
}

impl Lowering {
    pub fn apply(
        &self,
        doc: &TemplateDocument,
        node: NodeId,
        options: &LoopOptions,
        content: String,
    ) -> String {
        match self {
            Lowering::If(value) => guarded(branch_condition(DirectiveKind::If, value, &[]), content),
            Lowering::Elif(value) | Lowering::Else(value) => {
                let kind = if matches!(self, Lowering::Elif(_)) {
                    DirectiveKind::Elif
                } else {
                    DirectiveKind::Else
                };
                let preceding = doc
                    .parent(node)
                    .and_then(|parent| doc.collector(parent))
                    .map(|parent| preceding_conditions(&parent.sibling_conditions, node))
                    .unwrap_or_default();
                let unguarded = kind == DirectiveKind::Elif || value.trim().is_empty();
                if preceding.is_empty() && unguarded {
                    log::warn!(
                        "{}: x:{} without a preceding x:if",
                        doc.file,
                        if kind == DirectiveKind::Elif { "elif" } else { "else" }
                    );
                }
                guarded(branch_condition(kind, value, &preceding), content)
            }
            Lowering::For(list) => {
                if list.trim().is_empty() {
                    log::warn!("{}: x:for without a list expression", doc.file);
                    return content;
                }
                format!(
                    "{{ ({list}) && ({list}).map(({item}, {index}) => ({content})) }}",
                    list = list,
                    item = options.item,
                    index = options.index,
                    content = content
                )
            }
            Lowering::ForWithIf { list, condition } => format!(
                "{{ ({list}) && ({list}).map(({item}, {index}) => ({condition}) && <React.Fragment key={{{key}}}> {content} </React.Fragment>) }}",
                list = list,
                item = options.item,
                index = options.index,
                condition = condition,
                key = options.key,
                content = content
            ),
        }
    }
}

/// Applies every lowering recorded for `node` to its emitted text.
pub fn lower(doc: &TemplateDocument, node: NodeId, content: String) -> String {
    let Some(collector) = doc.collector(node) else {
        return content;
    };
    let options = LoopOptions::from_collector(collector);
    synthesize(collector)
        .iter()
        .fold(content, |text, lowering| lowering.apply(doc, node, &options, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ast::Directive;
    use crate::template::expression::{parse_expression, Expr};
    use std::collections::BTreeMap;

    fn eval(expr: &Expr, env: &BTreeMap<&str, bool>) -> bool {
        match expr {
            Expr::Identifier(name) => env[name.as_str()],
            Expr::Literal(raw) => raw == "true",
            Expr::Unary { operator, argument } if operator == "!" => !eval(argument, env),
            Expr::Binary { operator, left, right } if operator == "&&" => {
                eval(left, env) && eval(right, env)
            }
            Expr::Binary { operator, left, right } if operator == "||" => {
                eval(left, env) || eval(right, env)
            }
            other => panic!("unsupported {other:?}"),
        }
    }

    fn condition(directive: DirectiveKind, value: &str, node: usize) -> SiblingCondition {
        SiblingCondition {
            directive,
            value: value.to_string(),
            node: NodeId(node),
        }
    }

    #[test]
    fn test_if_elif_else_chain_is_exclusive_and_exhaustive() {
        let siblings = vec![
            condition(DirectiveKind::If, "a", 1),
            condition(DirectiveKind::Elif, "b", 2),
            condition(DirectiveKind::Elif, "c", 3),
            condition(DirectiveKind::Else, "", 4),
        ];
        let guards: Vec<Expr> = siblings
            .iter()
            .map(|s| {
                let preceding = preceding_conditions(&siblings, s.node);
                let guard = branch_condition(s.directive, &s.value, &preceding).unwrap();
                parse_expression(&guard).unwrap()
            })
            .collect();

        for bits in 0..8u8 {
            let env = BTreeMap::from([("a", bits & 1 != 0), ("b", bits & 2 != 0), ("c", bits & 4 != 0)]);
            let taken = guards.iter().filter(|g| eval(g, &env)).count();
            assert_eq!(taken, 1, "exactly one branch for {env:?}");
        }
    }

    #[test]
    fn test_preceding_conditions_stop_at_the_governing_if() {
        let siblings = vec![
            condition(DirectiveKind::If, "x", 1),
            condition(DirectiveKind::Else, "", 2),
            condition(DirectiveKind::If, "a", 3),
            condition(DirectiveKind::Elif, "b", 4),
            condition(DirectiveKind::Else, "", 5),
        ];
        assert_eq!(preceding_conditions(&siblings, NodeId(5)), vec!["a", "b"]);
        assert_eq!(preceding_conditions(&siblings, NodeId(2)), vec!["x"]);
        assert!(preceding_conditions(&siblings, NodeId(1)).is_empty());
    }

    #[test]
    fn test_for_with_if_yields_one_lowering() {
        let collector = NodeCollector {
            directives: vec![
                Directive { kind: DirectiveKind::For, value: "list".into() },
                Directive { kind: DirectiveKind::If, value: "item.visible".into() },
            ],
            ..NodeCollector::default()
        };
        assert_eq!(
            synthesize(&collector),
            vec![Lowering::ForWithIf {
                list: "list".into(),
                condition: "item.visible".into()
            }]
        );
    }

    #[test]
    fn test_lowering_templates() {
        let doc = TemplateDocument::new("a.wxml");
        let options = LoopOptions {
            item: "row".into(),
            index: "i".into(),
            key: "row.id".into(),
        };
        let node = NodeId::ROOT;
        assert_eq!(
            Lowering::If("a".into()).apply(&doc, node, &options, "<div/>".into()),
            "{ !!(a) && ( <div/> ) }"
        );
        assert_eq!(
            Lowering::For("rows".into()).apply(&doc, node, &options, "<div/>".into()),
            "{ (rows) && (rows).map((row, i) => (<div/>)) }"
        );
        assert_eq!(
            Lowering::ForWithIf {
                list: "rows".into(),
                condition: "row.ok".into()
            }
            .apply(&doc, node, &options, "<div/>".into()),
            "{ (rows) && (rows).map((row, i) => (row.ok) && <React.Fragment key={row.id}> <div/> </React.Fragment>) }"
        );
        assert_eq!(
            Lowering::Else(String::new()).apply(&doc, node, &options, "<div/>".into()),
            "<div/>"
        );
    }
}
