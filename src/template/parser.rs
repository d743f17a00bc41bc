//! Markup parser producing a [`TemplateDocument`]

use super::ast::{Attribute, Element, NodeId, NodeKind, TemplateDocument};
use crate::error::{CompilerError, Result};
use crate::types::VOID_ELEMENTS;

pub struct MarkupParser {
    input: Vec<char>,
    position: usize,
    line: usize,
    filename: String,
}

impl MarkupParser {
    pub fn new(input: &str, filename: impl Into<String>) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            filename: filename.into(),
        }
    }

    pub fn parse(mut self) -> Result<TemplateDocument> {
        let mut doc = TemplateDocument::new(self.filename.clone());
        let mut open: Vec<(NodeId, String)> = vec![(NodeId::ROOT, String::new())];

        while !self.is_at_end() {
            let parent = open.last().map(|(id, _)| *id).unwrap_or(NodeId::ROOT);

            if self.starts_with("<!--") {
                let comment = self.read_comment()?;
                doc.append(parent, NodeKind::Comment(comment));
            } else if self.starts_with("</") {
                let name = self.read_close_tag()?;
                match open.iter().rposition(|(_, tag)| *tag == name) {
                    Some(index) if index > 0 => open.truncate(index),
                    _ => log::debug!(
                        "{}:{} ignoring stray closing tag </{}>",
                        self.filename,
                        self.line,
                        name
                    ),
                }
            } else if self.starts_with("<!") || self.starts_with("<?") {
                self.skip_declaration()?;
            } else if self.current() == '<' && self.peek(1).is_some_and(is_tag_start) {
                let (element, self_closing) = self.read_open_tag()?;
                let name = element.name.clone();
                let id = doc.append(parent, NodeKind::Element(element));
                if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
                    open.push((id, name));
                }
            } else {
                let text = self.read_text();
                if !text.trim().is_empty() {
                    doc.append(parent, NodeKind::Text(text));
                }
            }
        }

        Ok(doc)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek(i) == Some(c))
    }

    fn advance(&mut self) -> char {
        let c = self.current();
        self.position += 1;
        if c == '\n' {
            self.line += 1;
        }
        c
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current().is_whitespace() {
            self.advance();
        }
    }

    fn error(&self, line: usize, message: impl Into<String>) -> CompilerError {
        CompilerError::parse(self.filename.clone(), line, message)
    }

    fn read_comment(&mut self) -> Result<String> {
        let start_line = self.line;
        self.advance_by(4);
        let mut comment = String::new();
        while !self.starts_with("-->") {
            if self.is_at_end() {
                return Err(self.error(start_line, "Unterminated comment"));
            }
            comment.push(self.advance());
        }
        self.advance_by(3);
        Ok(comment.trim().to_string())
    }

    fn skip_declaration(&mut self) -> Result<()> {
        let start_line = self.line;
        while self.current() != '>' {
            if self.is_at_end() {
                return Err(self.error(start_line, "Unterminated declaration"));
            }
            self.advance();
        }
        self.advance();
        Ok(())
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while !self.is_at_end() {
            let c = self.current();
            if c.is_whitespace() || c == '>' || c == '/' || c == '=' {
                break;
            }
            name.push(self.advance());
        }
        name
    }

    fn read_close_tag(&mut self) -> Result<String> {
        let start_line = self.line;
        self.advance_by(2);
        let name = self.read_name();
        self.skip_whitespace();
        if self.current() != '>' {
            return Err(self.error(start_line, format!("Unterminated closing tag </{}", name)));
        }
        self.advance();
        Ok(name)
    }

    fn read_open_tag(&mut self) -> Result<(Element, bool)> {
        let start_line = self.line;
        self.advance();
        let name = self.read_name();
        let mut attributes: Vec<Attribute> = Vec::new();

        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                return Err(self.error(start_line, format!("Unterminated tag <{}", name)));
            }
            if self.starts_with("/>") {
                self.advance_by(2);
                return Ok((self.element(name, attributes, start_line), true));
            }
            if self.current() == '>' {
                self.advance();
                return Ok((self.element(name, attributes, start_line), false));
            }

            let key = self.read_name();
            if key.is_empty() {
                // a lone '/' or '=' inside the tag
                self.advance();
                continue;
            }
            self.skip_whitespace();
            let value = if self.current() == '=' {
                self.advance();
                self.skip_whitespace();
                self.read_attribute_value(&key)?
            } else {
                String::new()
            };

            if attributes.iter().any(|attr| attr.key == key) {
                log::warn!(
                    "{}:{} duplicate attribute '{}' on <{}> ignored",
                    self.filename,
                    start_line,
                    key,
                    name
                );
            } else {
                attributes.push(Attribute::new(key, value));
            }
        }
    }

    fn element(&self, name: String, attributes: Vec<Attribute>, line: usize) -> Element {
        Element {
            name,
            attributes,
            line,
        }
    }

    fn read_attribute_value(&mut self, key: &str) -> Result<String> {
        let start_line = self.line;
        let quote = self.current();
        let mut value = String::new();

        if quote == '"' || quote == '\'' {
            self.advance();
            while self.current() != quote {
                if self.is_at_end() {
                    return Err(self.error(
                        start_line,
                        format!("Unterminated value for attribute '{}'", key),
                    ));
                }
                value.push(self.advance());
            }
            self.advance();
        } else {
            while !self.is_at_end() {
                let c = self.current();
                if c.is_whitespace() || c == '>' || self.starts_with("/>") {
                    break;
                }
                value.push(self.advance());
            }
        }
        Ok(value)
    }

    /// Reads text up to the next tag, keeping `{{ }}` spans intact even if they contain `<`.
    fn read_text(&mut self) -> String {
        let mut text = String::new();
        while !self.is_at_end() {
            if self.starts_with("{{") {
                while !self.is_at_end() && !self.starts_with("}}") {
                    text.push(self.advance());
                }
                if !self.is_at_end() {
                    text.push(self.advance());
                    text.push(self.advance());
                }
                continue;
            }
            if self.current() == '<'
                && self
                    .peek(1)
                    .is_some_and(|c| is_tag_start(c) || c == '/' || c == '!' || c == '?')
            {
                break;
            }
            text.push(self.advance());
        }
        text
    }
}

fn is_tag_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

pub fn parse_markup(input: &str, filename: impl Into<String>) -> Result<TemplateDocument> {
    MarkupParser::new(input, filename).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(doc: &TemplateDocument, id: NodeId) -> Vec<String> {
        doc.children(id)
            .iter()
            .map(|child| match &doc.node(*child).kind {
                NodeKind::Element(e) => e.name.clone(),
                NodeKind::Text(t) => format!("#{}", t.trim()),
                NodeKind::Comment(c) => format!("!{}", c),
                NodeKind::Root => "root".into(),
            })
            .collect()
    }

    #[test]
    fn test_nested_elements_and_text() {
        let doc = parse_markup("<view class=\"a\"><text>hi {{name}}</text></view>", "t.wxml").unwrap();
        let view = doc.children(NodeId::ROOT)[0];
        assert_eq!(doc.element(view).unwrap().get("class"), Some("a"));
        let text = doc.children(view)[0];
        assert_eq!(names(&doc, text), vec!["#hi {{name}}"]);
    }

    #[test]
    fn test_valueless_and_single_quoted_attributes() {
        let doc = parse_markup("<input disabled value='{{v}}' />", "t.wxml").unwrap();
        let input = doc.element(doc.children(NodeId::ROOT)[0]).unwrap();
        assert_eq!(input.get("disabled"), Some(""));
        assert_eq!(input.get("value"), Some("{{v}}"));
    }

    #[test]
    fn test_void_elements_take_no_children() {
        let doc = parse_markup("<view><image src=\"a.png\"></image><text>x</text></view>", "t.wxml").unwrap();
        let view = doc.children(NodeId::ROOT)[0];
        assert_eq!(names(&doc, view), vec!["image", "text"]);
    }

    #[test]
    fn test_mustache_with_less_than_stays_text() {
        let doc = parse_markup("<view>{{a<b ? 1 : 2}}</view>", "t.wxml").unwrap();
        let view = doc.children(NodeId::ROOT)[0];
        assert_eq!(names(&doc, view), vec!["#{{a<b ? 1 : 2}}"]);
    }

    #[test]
    fn test_comments_and_stray_close_tags() {
        let doc = parse_markup("<!-- note --></text><view/>", "t.wxml").unwrap();
        assert_eq!(names(&doc, NodeId::ROOT), vec!["!note", "view"]);
    }

    #[test]
    fn test_unterminated_attribute_reports_line() {
        let err = parse_markup("<view>\n<text class=\"oops></text>", "bad.wxml").unwrap_err();
        match err {
            CompilerError::Parse { file, line, .. } => {
                assert_eq!(file, "bad.wxml");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
