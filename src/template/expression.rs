//! Expression sub-language found inside `{{ }}`
//!
//! A small JavaScript subset: literals, identifiers, member and call chains (optional and
//! computed), unary, binary and logical operators, conditionals, arrays, objects with shorthand
//! and spread, template literals and sequences. Expressions are re-printed with the minimal
//! parentheses their precedence requires.

use crate::error::{CompilerError, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(String),
    This,
    /// Number, string, boolean or `null`, kept as written.
    Literal(String),
    Template {
        quasis: Vec<String>,
        expressions: Vec<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Spread(Box<Expr>),
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
        computed: bool,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        optional: bool,
    },
    Unary {
        operator: String,
        argument: Box<Expr>,
    },
    Binary {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Identifier(String),
    Literal(String),
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    KeyValue { key: PropertyKey, value: Expr },
    Shorthand(String),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Template {
        quasis: Vec<String>,
        sources: Vec<String>,
    },
    Punct(&'static str),
    Eof,
}

const PUNCTUATORS: &[&str] = &[
    "===", "!==", "...", ">>>", "**", "?.", "??", "==", "!=", "<=", ">=", "&&", "||", "<<", ">>",
    "+", "-", "*", "/", "%", "<", ">", "!", "~", "?", ":", ".", ",", "(", ")", "[", "]", "{", "}",
    "&", "|", "^",
];

struct Lexer<'a> {
    source: &'a str,
    input: Vec<char>,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            input: source.chars().collect(),
            position: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> CompilerError {
        CompilerError::parse(
            format!("{{{{{}}}}}", self.source.trim()),
            1,
            format!("{} at offset {}", message.into(), self.position),
        )
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.position += 1;
            } else if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
                tokens.push(self.read_number());
            } else if c == '\'' || c == '"' {
                tokens.push(self.read_string(c)?);
            } else if c == '`' {
                tokens.push(self.read_template()?);
            } else if c.is_alphabetic() || c == '_' || c == '$' {
                tokens.push(self.read_identifier());
            } else {
                tokens.push(self.read_punctuator()?);
            }
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        while let Some(c) = self.current() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(self.input.get(self.position.wrapping_sub(1)), Some('e' | 'E'));
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                self.position += 1;
            } else {
                break;
            }
        }
        Token::Number(self.input[start..self.position].iter().collect())
    }

    fn read_string(&mut self, quote: char) -> Result<Token> {
        let start = self.position;
        self.position += 1;
        loop {
            match self.current() {
                None => return Err(self.error("Unterminated string literal")),
                Some('\\') => self.position += 2,
                Some(c) if c == quote => {
                    self.position += 1;
                    break;
                }
                Some(_) => self.position += 1,
            }
        }
        Ok(Token::Str(self.input[start..self.position].iter().collect()))
    }

    fn read_template(&mut self) -> Result<Token> {
        self.position += 1;
        let mut quasis = Vec::new();
        let mut sources = Vec::new();
        let mut quasi = String::new();
        loop {
            match self.current() {
                None => return Err(self.error("Unterminated template literal")),
                Some('`') => {
                    self.position += 1;
                    quasis.push(quasi);
                    return Ok(Token::Template { quasis, sources });
                }
                Some('\\') => {
                    quasi.push('\\');
                    if let Some(escaped) = self.peek(1) {
                        quasi.push(escaped);
                    }
                    self.position += 2;
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.position += 2;
                    quasis.push(std::mem::take(&mut quasi));
                    let mut depth = 0usize;
                    let mut source = String::new();
                    loop {
                        match self.current() {
                            None => return Err(self.error("Unterminated template expression")),
                            Some('}') if depth == 0 => {
                                self.position += 1;
                                break;
                            }
                            Some(c) => {
                                if c == '{' {
                                    depth += 1;
                                } else if c == '}' {
                                    depth -= 1;
                                }
                                source.push(c);
                                self.position += 1;
                            }
                        }
                    }
                    sources.push(source);
                }
                Some(c) => {
                    quasi.push(c);
                    self.position += 1;
                }
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.position;
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.position += 1;
            } else {
                break;
            }
        }
        Token::Ident(self.input[start..self.position].iter().collect())
    }

    fn read_punctuator(&mut self) -> Result<Token> {
        for punct in PUNCTUATORS {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek(i) == Some(c));
            if !matches {
                continue;
            }
            // `a?.5:1` is a conditional, not optional chaining
            if *punct == "?." && self.peek(2).is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            self.position += punct.len();
            return Ok(Token::Punct(punct));
        }
        Err(self.error(format!(
            "Unexpected character '{}'",
            self.current().unwrap_or_default()
        )))
    }
}

/// Binding power of a binary operator. Higher binds tighter.
fn binary_precedence(op: &str) -> Option<u8> {
    let precedence = match op {
        "??" => 1,
        "||" => 2,
        "&&" => 3,
        "|" => 4,
        "^" => 5,
        "&" => 6,
        "==" | "!=" | "===" | "!==" => 7,
        "<" | ">" | "<=" | ">=" | "in" | "instanceof" => 8,
        "<<" | ">>" | ">>>" => 9,
        "+" | "-" => 10,
        "*" | "/" | "%" => 11,
        "**" => 12,
        _ => return None,
    };
    Some(precedence)
}

const UNARY_KEYWORDS: &[&str] = &["typeof", "void", "delete"];

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        self.position += 1;
        token
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.current(), Token::Punct(p) if *p == punct)
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("Expected '{}', found {:?}", punct, self.current())))
        }
    }

    fn error(&self, message: impl Into<String>) -> CompilerError {
        CompilerError::parse(format!("{{{{{}}}}}", self.source.trim()), 1, message)
    }

    fn parse_sequence(&mut self) -> Result<Expr> {
        let first = self.parse_conditional()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(",") {
            items.push(self.parse_conditional()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let test = self.parse_binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let consequent = self.parse_conditional()?;
        self.expect(":")?;
        let alternate = self.parse_conditional()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn current_binary_operator(&self) -> Option<(String, u8)> {
        let op = match self.current() {
            Token::Punct(p) => p.to_string(),
            Token::Ident(word) if word == "in" || word == "instanceof" => word.clone(),
            _ => return None,
        };
        binary_precedence(&op).map(|precedence| (op, precedence))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((operator, precedence)) = self.current_binary_operator() {
            if precedence <= min_precedence {
                break;
            }
            self.position += 1;
            let next_min = if operator == "**" {
                precedence - 1
            } else {
                precedence
            };
            let right = self.parse_binary(next_min)?;
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let operator = match self.current() {
            Token::Punct(p @ ("!" | "-" | "+" | "~")) => Some(p.to_string()),
            Token::Ident(word) if UNARY_KEYWORDS.contains(&word.as_str()) => Some(word.clone()),
            _ => None,
        };
        match operator {
            Some(operator) => {
                self.position += 1;
                let argument = self.parse_unary()?;
                Ok(Expr::Unary {
                    operator,
                    argument: Box::new(argument),
                })
            }
            None => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_property_name(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Ident(name) => Ok(Expr::Identifier(name)),
            other => Err(self.error(format!("Expected property name, found {:?}", other))),
        }
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            if self.eat(".") {
                let property = self.parse_property_name()?;
                expr = member(expr, property, false, false);
            } else if self.eat("?.") {
                if self.eat("(") {
                    let arguments = self.parse_arguments(")")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        arguments,
                        optional: true,
                    };
                } else if self.eat("[") {
                    let property = self.parse_sequence()?;
                    self.expect("]")?;
                    expr = member(expr, property, true, true);
                } else {
                    let property = self.parse_property_name()?;
                    expr = member(expr, property, false, true);
                }
            } else if self.eat("[") {
                let property = self.parse_sequence()?;
                self.expect("]")?;
                expr = member(expr, property, true, false);
            } else if self.eat("(") {
                let arguments = self.parse_arguments(")")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    arguments,
                    optional: false,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated list allowing spreads, up to and including `close`.
    fn parse_arguments(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat(close) {
            if self.eat("...") {
                items.push(Expr::Spread(Box::new(self.parse_conditional()?)));
            } else {
                items.push(self.parse_conditional()?);
            }
            if !self.is_punct(close) {
                self.expect(",")?;
            }
        }
        Ok(items)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Ident(name) => Ok(match name.as_str() {
                "this" => Expr::This,
                "true" | "false" | "null" => Expr::Literal(name),
                _ => Expr::Identifier(name),
            }),
            Token::Number(raw) | Token::Str(raw) => Ok(Expr::Literal(raw)),
            Token::Template { quasis, sources } => {
                let expressions = sources
                    .iter()
                    .map(|source| parse_expression(source))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::Template {
                    quasis,
                    expressions,
                })
            }
            Token::Punct("(") => {
                let inner = self.parse_sequence()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::Array(self.parse_arguments("]")?)),
            Token::Punct("{") => self.parse_object(),
            other => Err(self.error(format!("Unexpected token {:?}", other))),
        }
    }

    fn parse_object(&mut self) -> Result<Expr> {
        let mut properties = Vec::new();
        while !self.eat("}") {
            properties.push(self.parse_property()?);
            if !self.is_punct("}") {
                self.expect(",")?;
            }
        }
        Ok(Expr::Object(properties))
    }

    fn parse_property(&mut self) -> Result<Property> {
        if self.eat("...") {
            return Ok(Property::Spread(self.parse_conditional()?));
        }
        let key = match self.advance() {
            Token::Ident(name) => {
                if self.is_punct(",") || self.is_punct("}") {
                    return Ok(Property::Shorthand(name));
                }
                PropertyKey::Identifier(name)
            }
            Token::Str(raw) | Token::Number(raw) => PropertyKey::Literal(raw),
            Token::Punct("[") => {
                let key = self.parse_conditional()?;
                self.expect("]")?;
                PropertyKey::Computed(key)
            }
            other => return Err(self.error(format!("Unexpected object key {:?}", other))),
        };
        self.expect(":")?;
        let value = self.parse_conditional()?;
        Ok(Property::KeyValue { key, value })
    }
}

fn member(object: Expr, property: Expr, computed: bool, optional: bool) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: Box::new(property),
        computed,
        optional,
    }
}

/// Parses the source of one `{{ }}` span.
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        source,
        tokens,
        position: 0,
    };
    if matches!(parser.current(), Token::Eof) {
        return Err(parser.error("Empty expression"));
    }
    let expr = parser.parse_sequence()?;
    match parser.current() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("Unexpected trailing token {:?}", other))),
    }
}

const PREC_SEQUENCE: u8 = 1;
const PREC_CONDITIONAL: u8 = 2;
const PREC_UNARY: u8 = 15;
const PREC_POSTFIX: u8 = 17;
const PREC_PRIMARY: u8 = 18;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Sequence(_) => PREC_SEQUENCE,
            Expr::Conditional { .. } => PREC_CONDITIONAL,
            Expr::Binary { operator, .. } => PREC_CONDITIONAL + binary_precedence(operator).unwrap_or(0),
            Expr::Unary { .. } => PREC_UNARY,
            Expr::Member { .. } | Expr::Call { .. } => PREC_POSTFIX,
            _ => PREC_PRIMARY,
        }
    }

    /// Prints the expression back to source with minimal parentheses.
    pub fn print(&self) -> String {
        self.print_at(0)
    }

    fn print_at(&self, min_precedence: u8) -> String {
        let printed = self.print_bare();
        if self.precedence() < min_precedence {
            format!("({})", printed)
        } else {
            printed
        }
    }

    fn print_bare(&self) -> String {
        match self {
            Expr::Identifier(name) => name.clone(),
            Expr::This => "this".to_string(),
            Expr::Literal(raw) => raw.clone(),
            Expr::Template {
                quasis,
                expressions,
            } => {
                let mut out = String::from("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = expressions.get(i) {
                        out.push_str(&format!("${{{}}}", expr.print()));
                    }
                }
                out.push('`');
                out
            }
            Expr::Array(items) => format!("[{}]", print_list(items)),
            Expr::Object(properties) if properties.is_empty() => "{}".to_string(),
            Expr::Object(properties) => {
                let printed: Vec<String> = properties.iter().map(Property::print).collect();
                format!("{{ {} }}", printed.join(", "))
            }
            Expr::Spread(argument) => format!("...{}", argument.print_at(PREC_CONDITIONAL)),
            Expr::Member {
                object,
                property,
                computed,
                optional,
            } => {
                let object = object.print_at(PREC_POSTFIX);
                match (computed, optional) {
                    (true, true) => format!("{}?.[{}]", object, property.print()),
                    (true, false) => format!("{}[{}]", object, property.print()),
                    (false, true) => format!("{}?.{}", object, property.print()),
                    (false, false) => format!("{}.{}", object, property.print()),
                }
            }
            Expr::Call {
                callee,
                arguments,
                optional,
            } => format!(
                "{}{}({})",
                callee.print_at(PREC_POSTFIX),
                if *optional { "?." } else { "" },
                print_list(arguments)
            ),
            Expr::Unary { operator, argument } => {
                let argument = argument.print_at(PREC_UNARY);
                if operator.chars().all(char::is_alphabetic) {
                    format!("{} {}", operator, argument)
                } else if argument.starts_with(operator.as_str()) {
                    format!("{} {}", operator, argument)
                } else {
                    format!("{}{}", operator, argument)
                }
            }
            Expr::Binary {
                operator,
                left,
                right,
            } => {
                let own = self.precedence();
                let (left_min, right_min) = if operator == "**" {
                    (PREC_UNARY + 1, own)
                } else {
                    (own, own + 1)
                };
                let left = print_operand(left, operator, left_min);
                let right = print_operand(right, operator, right_min);
                format!("{} {} {}", left, operator, right)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => format!(
                "{} ? {} : {}",
                test.print_at(PREC_CONDITIONAL + 1),
                consequent.print_at(PREC_CONDITIONAL),
                alternate.print_at(PREC_CONDITIONAL)
            ),
            Expr::Sequence(items) => items
                .iter()
                .map(|item| item.print_at(PREC_CONDITIONAL))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Free identifiers in first-seen order.
    ///
    /// Callees, `undefined` and non-computed member properties are not free.
    pub fn free_identifiers(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        self.collect_identifiers(&mut |name: &str| {
            if seen.insert(name.to_string()) {
                ordered.push(name.to_string());
            }
        });
        ordered
    }

    fn collect_identifiers(&self, sink: &mut dyn FnMut(&str)) {
        match self {
            Expr::Identifier(name) => {
                if name != "undefined" {
                    sink(name);
                }
            }
            Expr::This | Expr::Literal(_) => {}
            Expr::Template { expressions, .. } => {
                expressions.iter().for_each(|e| e.collect_identifiers(sink))
            }
            Expr::Array(items) | Expr::Sequence(items) => {
                items.iter().for_each(|e| e.collect_identifiers(sink))
            }
            Expr::Object(properties) => {
                for property in properties {
                    match property {
                        Property::KeyValue { key, value } => {
                            if let PropertyKey::Computed(key) = key {
                                key.collect_identifiers(sink);
                            }
                            value.collect_identifiers(sink);
                        }
                        Property::Shorthand(name) => sink(name),
                        Property::Spread(value) => value.collect_identifiers(sink),
                    }
                }
            }
            Expr::Spread(argument) | Expr::Unary { argument, .. } => argument.collect_identifiers(sink),
            Expr::Member {
                object,
                property,
                computed,
                ..
            } => {
                object.collect_identifiers(sink);
                if *computed {
                    property.collect_identifiers(sink);
                }
            }
            Expr::Call { arguments, .. } => {
                arguments.iter().for_each(|e| e.collect_identifiers(sink))
            }
            Expr::Binary { left, right, .. } => {
                left.collect_identifiers(sink);
                right.collect_identifiers(sink);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                test.collect_identifiers(sink);
                consequent.collect_identifiers(sink);
                alternate.collect_identifiers(sink);
            }
        }
    }
}

impl Property {
    fn print(&self) -> String {
        match self {
            Property::KeyValue { key, value } => {
                let key = match key {
                    PropertyKey::Identifier(name) | PropertyKey::Literal(name) => name.clone(),
                    PropertyKey::Computed(expr) => format!("[{}]", expr.print()),
                };
                format!("{}: {}", key, value.print_at(PREC_CONDITIONAL))
            }
            Property::Shorthand(name) => name.clone(),
            Property::Spread(value) => format!("...{}", value.print_at(PREC_CONDITIONAL)),
        }
    }
}

fn print_list(items: &[Expr]) -> String {
    items
        .iter()
        .map(|item| item.print_at(PREC_CONDITIONAL))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `??` cannot be mixed with `||` or `&&` without parentheses.
fn print_operand(operand: &Expr, parent_operator: &str, min_precedence: u8) -> String {
    let mixes_nullish = match operand {
        Expr::Binary { operator, .. } => {
            (parent_operator == "??" && (operator == "||" || operator == "&&"))
                || (operator == "??" && (parent_operator == "||" || parent_operator == "&&"))
        }
        _ => false,
    };
    if mixes_nullish {
        format!("({})", operand.print())
    } else {
        operand.print_at(min_precedence)
    }
}
