//! Lenient HTML tree for template sources.
//!
//! Templates are HTML with `{{ ... }}` actions anywhere, including inside
//! tags and quoted attribute values, so a browser-grade parser would mangle
//! them. This tree keeps the source text of every tag and attribute and
//! only re-prints a start tag when its attributes were changed.

use crate::utils::{CLOSE_DELIM, OPEN_DELIM};
use crate::CompileError;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Start tags that end an open `<p>`.
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "menu",
    "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Open elements ended by the start tag `name`, and the elements that stop the search.
fn implied_end(name: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    let (closes, bounds): (&'static [&'static str], &'static [&'static str]) = match name {
        "li" => (&["li"], &["ul", "ol", "menu"]),
        "dt" | "dd" => (&["dt", "dd"], &["dl"]),
        "option" => (&["option"], &["select", "datalist", "optgroup"]),
        "optgroup" => (&["option", "optgroup"], &["select", "datalist"]),
        "tr" => (&["tr", "td", "th"], &["table", "thead", "tbody", "tfoot"]),
        "td" | "th" => (&["td", "th"], &["tr", "table"]),
        "thead" | "tbody" | "tfoot" => (
            &["thead", "tbody", "tfoot", "tr", "td", "th"],
            &["table"],
        ),
        _ if CLOSES_P.contains(&name) => (
            &["p"],
            &["button", "table", "td", "th", "caption", "template"],
        ),
        _ => return None,
    };
    Some((closes, bounds))
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Character data, template actions included, verbatim.
    Text(String),
    /// `<!-- ... -->` or `<!DOCTYPE ...>`, verbatim.
    Markup(String),
    Element(Element),
}

/// One attribute of a start tag.
///
/// Template actions sitting between attributes (`{{ if .x }}checked{{ end }}`)
/// are kept as valueless attributes and printed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    key: String,
    value: Option<String>,
    /// Source text, cleared once the attribute is changed.
    raw: Option<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
            raw: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
        self.raw = None;
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = Some(value.into());
        self.raw = None;
    }

    fn write(&self, out: &mut String) {
        if let Some(raw) = &self.raw {
            out.push_str(raw);
            return;
        }
        out.push_str(&self.key);
        if let Some(value) = &self.value {
            out.push('=');
            if !value.contains('"') {
                out.push('"');
                out.push_str(value);
                out.push('"');
            } else if !value.contains('\'') {
                out.push('\'');
                out.push_str(value);
                out.push('\'');
            } else {
                out.push('"');
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
    self_closing: bool,
    open_tag: String,
    close_tag: Option<String>,
    dirty: bool,
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.key == key)
    }

    /// Mutable access to the attributes. The start tag is re-printed.
    pub fn attributes_mut(&mut self) -> &mut Vec<Attribute> {
        self.dirty = true;
        &mut self.attributes
    }

    pub fn set_attributes(&mut self, attributes: Vec<Attribute>) {
        self.dirty = true;
        self.attributes = attributes;
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.children, &mut out);
        out
    }

    fn write_open_tag(&self, out: &mut String) {
        if !self.dirty {
            out.push_str(&self.open_tag);
            return;
        }
        out.push('<');
        out.push_str(&self.name);
        for attribute in &self.attributes {
            out.push(' ');
            attribute.write(out);
        }
        out.push_str(if self.self_closing { " />" } else { ">" });
    }

    fn write(&self, out: &mut String) {
        self.write_open_tag(out);
        write_nodes(&self.children, out);
        if let Some(close) = &self.close_tag {
            out.push_str(close);
        }
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn parse(input: &str) -> Result<Self, CompileError> {
        TreeBuilder::new(input).build()
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.nodes, &mut out);
        out
    }

    /// All elements in document order.
    pub fn elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_elements(&self.nodes, &mut out);
        out
    }

    /// Visit every element in document order, parents before children.
    pub fn try_for_each_element_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut Element) -> Result<(), E>,
    ) -> Result<(), E> {
        visit_mut(&mut self.nodes, f)
    }
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) | Node::Markup(text) => out.push_str(text),
            Node::Element(element) => element.write(out),
        }
    }
}

fn collect_elements<'a>(nodes: &'a [Node], out: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(element) = node {
            out.push(element);
            collect_elements(&element.children, out);
        }
    }
}

fn visit_mut<E>(
    nodes: &mut [Node],
    f: &mut impl FnMut(&mut Element) -> Result<(), E>,
) -> Result<(), E> {
    for node in nodes {
        if let Node::Element(element) = node {
            f(element)?;
            visit_mut(&mut element.children, f)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tree builder
// ---------------------------------------------------------------------------

struct TreeBuilder<'a> {
    input: &'a str,
    pos: usize,
    /// Open elements, innermost last.
    stack: Vec<Element>,
    root: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            stack: Vec::new(),
            root: Vec::new(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, position: usize, message: &str) -> CompileError {
        CompileError::Html {
            position,
            message: message.to_owned(),
        }
    }

    /// Advance past `needle`, returning the end offset.
    fn skip_past(&mut self, needle: &str, message: &str) -> Result<usize, CompileError> {
        let start = self.pos;
        match self.rest().find(needle) {
            Some(offset) => {
                self.pos += offset + needle.len();
                Ok(self.pos)
            }
            None => Err(self.error(start, message)),
        }
    }

    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let siblings = match self.stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.root,
        };
        if let Some(Node::Text(prev)) = siblings.last_mut() {
            prev.push_str(text);
        } else {
            siblings.push(Node::Text(text.to_owned()));
        }
    }

    fn build(mut self) -> Result<Document, CompileError> {
        let input = self.input;
        while self.pos < input.len() {
            let rest = self.rest();
            let start = self.pos;
            if rest.starts_with(OPEN_DELIM) {
                self.pos += OPEN_DELIM.len();
                let end = self.skip_past(CLOSE_DELIM, "unterminated template action")?;
                self.push_text(&input[start..end]);
            } else if rest.starts_with("<!--") {
                let end = self.skip_past("-->", "unterminated comment")?;
                self.push_node(Node::Markup(input[start..end].to_owned()));
            } else if rest.starts_with("<!") {
                let end = self.skip_past(">", "unterminated declaration")?;
                self.push_node(Node::Markup(input[start..end].to_owned()));
            } else if rest.starts_with("</") && starts_tag_name(&rest[2..]) {
                self.end_tag()?;
            } else if rest.starts_with('<') && starts_tag_name(&rest[1..]) {
                self.start_tag()?;
            } else {
                self.bump();
                let text_end = self
                    .rest()
                    .find(['<', '{'])
                    .map_or(input.len(), |offset| self.pos + offset);
                self.pos = text_end;
                self.push_text(&input[start..text_end]);
            }
        }

        // elements left open are closed implicitly at end of input
        while let Some(element) = self.stack.pop() {
            self.push_node(Node::Element(element));
        }
        Ok(Document { nodes: self.root })
    }

    fn end_tag(&mut self) -> Result<(), CompileError> {
        let input = self.input;
        let start = self.pos;
        self.pos += 2;
        let name = self.take_tag_name();
        self.skip_past(">", "unterminated end tag")?;
        let raw = &input[start..self.pos];

        let Some(index) = self
            .stack
            .iter()
            .rposition(|e| e.name.eq_ignore_ascii_case(name))
        else {
            // stray end tag
            self.push_text(raw);
            return Ok(());
        };

        self.close_from(index + 1);
        if let Some(mut element) = self.stack.pop() {
            element.close_tag = Some(raw.to_owned());
            self.push_node(Node::Element(element));
        }
        Ok(())
    }

    /// Close every open element from `index` up, without an end tag.
    fn close_from(&mut self, index: usize) {
        while self.stack.len() > index {
            if let Some(unclosed) = self.stack.pop() {
                self.push_node(Node::Element(unclosed));
            }
        }
    }

    /// `<li>` ends an open `<li>`, `<td>` an open `<td>`, and so on.
    fn close_implied(&mut self, name: &str) {
        let Some((closes, bounds)) = implied_end(name) else {
            return;
        };
        let mut index = None;
        for (i, open) in self.stack.iter().enumerate().rev() {
            let open = open.name.to_ascii_lowercase();
            if bounds.contains(&open.as_str()) {
                break;
            }
            if closes.contains(&open.as_str()) {
                index = Some(i);
            }
        }
        if let Some(index) = index {
            self.close_from(index);
        }
    }

    fn take_tag_name(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && c != '/' && c != '>')
        {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn start_tag(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.take_tag_name().to_owned();
        let mut attributes = Vec::new();
        let self_closing;

        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(start, "unterminated start tag"));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                self_closing = false;
                break;
            }
            if rest.starts_with('/') {
                self.bump();
                continue;
            }
            attributes.push(self.attribute(start)?);
        }

        let lowered = name.to_ascii_lowercase();
        self.close_implied(&lowered);
        let mut element = Element {
            name,
            attributes,
            children: Vec::new(),
            self_closing,
            open_tag: self.input[start..self.pos].to_owned(),
            close_tag: None,
            dirty: false,
        };

        if self_closing || VOID_ELEMENTS.contains(&lowered.as_str()) {
            self.push_node(Node::Element(element));
        } else if RAW_TEXT_ELEMENTS.contains(&lowered.as_str()) {
            let body_start = self.pos;
            let close = format!("</{lowered}");
            let body_end = find_ignore_case(self.rest(), &close)
                .map_or(self.input.len(), |offset| self.pos + offset);
            if body_end > body_start {
                element
                    .children
                    .push(Node::Text(self.input[body_start..body_end].to_owned()));
            }
            self.pos = body_end;
            if self.pos < self.input.len() {
                let close_start = self.pos;
                self.skip_past(">", "unterminated end tag")?;
                element.close_tag = Some(self.input[close_start..self.pos].to_owned());
            }
            self.push_node(Node::Element(element));
        } else {
            self.stack.push(element);
        }
        Ok(())
    }

    fn attribute(&mut self, tag_start: usize) -> Result<Attribute, CompileError> {
        let start = self.pos;

        if self.rest().starts_with(OPEN_DELIM) {
            self.pos += OPEN_DELIM.len();
            self.skip_past(CLOSE_DELIM, "unterminated template action")?;
            let raw = self.input[start..self.pos].to_owned();
            return Ok(Attribute {
                key: raw.clone(),
                value: None,
                raw: Some(raw),
            });
        }

        loop {
            let rest = self.rest();
            if rest.starts_with(OPEN_DELIM) {
                self.pos += OPEN_DELIM.len();
                self.skip_past(CLOSE_DELIM, "unterminated template action")?;
            } else if rest.starts_with("/>")
                || !self
                    .peek()
                    .is_some_and(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '"' | '\''))
            {
                break;
            } else {
                self.bump();
            }
        }
        let key = self.input[start..self.pos].to_owned();
        if key.is_empty() {
            // a lone quote or `=`; keep it verbatim
            self.bump();
            let raw = self.input[start..self.pos].to_owned();
            return Ok(Attribute {
                key: raw.clone(),
                value: None,
                raw: Some(raw),
            });
        }

        let before_value = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        if self.peek() != Some('=') {
            self.pos = before_value;
            return Ok(Attribute {
                key,
                value: None,
                raw: Some(self.input[start..self.pos].to_owned()),
            });
        }
        self.bump();
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let value_start = self.pos;
                loop {
                    let rest = self.rest();
                    if rest.starts_with(OPEN_DELIM) {
                        self.pos += OPEN_DELIM.len();
                        self.skip_past(CLOSE_DELIM, "unterminated template action")?;
                    } else if rest.starts_with(quote) {
                        break;
                    } else if rest.is_empty() {
                        return Err(self.error(tag_start, "unterminated attribute value"));
                    } else {
                        self.bump();
                    }
                }
                let value = self.input[value_start..self.pos].to_owned();
                self.bump();
                value
            }
            _ => {
                let value_start = self.pos;
                loop {
                    let rest = self.rest();
                    if rest.starts_with(OPEN_DELIM) {
                        self.pos += OPEN_DELIM.len();
                        self.skip_past(CLOSE_DELIM, "unterminated template action")?;
                    } else if rest.is_empty() || rest.starts_with('>') {
                        break;
                    } else if self.peek().is_some_and(char::is_whitespace) {
                        break;
                    } else {
                        self.bump();
                    }
                }
                self.input[value_start..self.pos].to_owned()
            }
        };

        Ok(Attribute {
            key,
            value: Some(value),
            raw: Some(self.input[start..self.pos].to_owned()),
        })
    }
}

fn starts_tag_name(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
