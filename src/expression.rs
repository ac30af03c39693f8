//! Event binding expressions.
//!
//! ```text
//! Expressions     := Expression (";" Expression)*
//! Expression      := Binding ("," Binding)*
//! Binding         := EventItem Target?
//! EventItem       := Eventexpression | "[" Eventexpression ("," Eventexpression)* "]"
//! Eventexpression := Name (":" State)? ("." Modifier)*
//! Target          := ("->" Template)? ("=>" Action)?
//! ```
//!
//! `create:ok,delete:error->todo=>replace` parses into two bindings, the
//! first without a target. [`Expression::groups`] folds a target-less run
//! into the next target, which is how the bindings are translated.

use std::fmt;

use serde::Serialize;

use crate::CompileError;

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// Outcome of a server event a binding reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Ok,
    Error,
    Pending,
    Done,
}

impl State {
    pub const ALL: [State; 4] = [State::Ok, State::Error, State::Pending, State::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Ok => "ok",
            State::Error => "error",
            State::Pending => "pending",
            State::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        State::ALL.into_iter().find(|state| state.as_str() == s)
    }

    /// Only `ok` and `error` outcomes carry rendered HTML.
    pub fn renders_html(self) -> bool {
        matches!(self, State::Ok | State::Error)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eventexpression {
    pub name: String,
    pub state: Option<State>,
    pub modifiers: Vec<String>,
}

impl Eventexpression {
    /// `name:state`, with a missing state read as `ok`.
    pub fn event_state(&self) -> String {
        format!("{}:{}", self.name, self.state.unwrap_or(State::Ok))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Target {
    pub template: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub eventexpressions: Vec<Eventexpression>,
    pub target: Option<Target>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expression {
    pub bindings: Vec<Binding>,
}

/// Event expressions that share one target once target-less bindings are
/// folded into the binding that follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group<'a> {
    pub events: Vec<&'a Eventexpression>,
    pub target: Option<&'a Target>,
}

impl Expression {
    pub fn groups(&self) -> Vec<Group<'_>> {
        let mut groups = Vec::new();
        let mut pending: Vec<&Eventexpression> = Vec::new();
        for binding in &self.bindings {
            pending.extend(binding.eventexpressions.iter());
            if let Some(target) = &binding.target {
                groups.push(Group {
                    events: std::mem::take(&mut pending),
                    target: Some(target),
                });
            }
        }
        if !pending.is_empty() {
            groups.push(Group {
                events: pending,
                target: None,
            });
        }
        groups
    }
}

impl Group<'_> {
    pub fn template(&self) -> Option<&str> {
        self.target.and_then(|t| t.template.as_deref())
    }

    pub fn action(&self) -> Option<&str> {
        self.target.and_then(|t| t.action.as_deref())
    }

    /// Modifiers of all events, in order of first appearance.
    pub fn modifiers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for modifier in self.events.iter().flat_map(|e| e.modifiers.iter()) {
            if !out.contains(modifier) {
                out.push(modifier.clone());
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a full directive value. Any error rejects the whole input.
pub fn parse(input: &str) -> Result<Vec<Expression>, CompileError> {
    let mut parser = Parser { input, pos: 0 };
    let expressions = parser.expressions()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected input"));
    }
    Ok(expressions)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

fn is_modifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_template_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | ':' | '_')
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Offending text at the cursor, up to the next separator.
    fn fragment(&self) -> &'a str {
        let rest = self.rest();
        let end = rest.find([',', ';']).unwrap_or(rest.len());
        if end == 0 {
            rest
        } else {
            &rest[..end]
        }
    }

    fn error(&self, message: &str) -> CompileError {
        CompileError::syntax(self.input, self.fragment(), message)
    }

    fn take_while(&mut self, accept: impl Fn(char, &str) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !accept(c, self.rest()) {
                break;
            }
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn expressions(&mut self) -> Result<Vec<Expression>, CompileError> {
        let mut expressions = vec![self.expression()?];
        loop {
            self.skip_ws();
            if !self.eat(";") {
                break;
            }
            expressions.push(self.expression()?);
        }
        Ok(expressions)
    }

    fn expression(&mut self) -> Result<Expression, CompileError> {
        let mut bindings = vec![self.binding()?];
        loop {
            self.skip_ws();
            if !self.eat(",") {
                break;
            }
            bindings.push(self.binding()?);
        }
        Ok(Expression { bindings })
    }

    fn binding(&mut self) -> Result<Binding, CompileError> {
        self.skip_ws();
        let eventexpressions = if self.eat("[") {
            self.bracket_group()?
        } else {
            vec![self.eventexpression()?]
        };
        let target = self.target()?;
        Ok(Binding {
            eventexpressions,
            target,
        })
    }

    fn bracket_group(&mut self) -> Result<Vec<Eventexpression>, CompileError> {
        let mut group = vec![self.eventexpression()?];
        loop {
            self.skip_ws();
            if self.eat("]") {
                return Ok(group);
            }
            if !self.eat(",") {
                return Err(self.error("expected `,` or `]` in event group"));
            }
            group.push(self.eventexpression()?);
        }
    }

    fn eventexpression(&mut self) -> Result<Eventexpression, CompileError> {
        self.skip_ws();
        // stop before `->` so `create->todo` reads as event `create`
        let name = self.take_while(|c, rest| is_name_char(c) && !rest.starts_with("->"));
        if name.is_empty() {
            return Err(self.error("expected event name"));
        }

        let mut event = Eventexpression {
            name: name.to_owned(),
            state: None,
            modifiers: Vec::new(),
        };

        loop {
            match self.peek() {
                Some(':') if event.state.is_none() && !self.rest().starts_with("::") => {
                    let colon = self.pos;
                    self.bump();
                    let raw = self.take_while(|c, _| c.is_ascii_alphanumeric());
                    let fragment = if raw.is_empty() {
                        // nothing readable after `:`, point at the colon and what follows
                        let tail = &self.input[colon..];
                        let end = tail[1..].find([',', ';']).map_or(tail.len(), |i| i + 1);
                        &tail[..end]
                    } else {
                        raw
                    };
                    event.state = Some(State::parse(raw).ok_or_else(|| {
                        CompileError::syntax(
                            self.input,
                            fragment,
                            "state must be one of ok, error, pending, done",
                        )
                    })?);
                }
                Some('.') => {
                    self.bump();
                    let modifier = self.take_while(|c, _| is_modifier_char(c));
                    if modifier.is_empty() {
                        return Err(self.error("expected modifier after `.`"));
                    }
                    event.modifiers.push(modifier.to_owned());
                }
                _ => break,
            }
        }
        Ok(event)
    }

    fn target(&mut self) -> Result<Option<Target>, CompileError> {
        self.skip_ws();
        let mut target = Target::default();

        if self.eat("->") {
            self.skip_ws();
            let template =
                self.take_while(|c, rest| is_template_char(c) && !rest.starts_with("=>"));
            let template = template.trim();
            if template.is_empty() {
                return Err(self.error("expected template name after `->`"));
            }
            // the name ends up inside an attribute key, which cannot hold a space
            if template.contains(' ') {
                return Err(CompileError::syntax(
                    self.input,
                    template,
                    "template name must not contain spaces",
                ));
            }
            match self.peek() {
                None | Some(',') | Some(';') | Some('=') => {}
                Some(_) => return Err(self.error("template name must be an identifier")),
            }
            target.template = Some(template.to_owned());
            self.skip_ws();
        }

        if self.eat("=>") {
            self.skip_ws();
            let action = self.action_text();
            if action.is_empty() {
                return Err(CompileError::syntax(
                    self.input,
                    "=>",
                    "expected action after `=>`",
                ));
            }
            if action.starts_with('.') {
                return Err(CompileError::syntax(
                    self.input,
                    action,
                    "action must not start with `.`",
                ));
            }
            target.action = Some(action.to_owned());
        }

        if target.template.is_none() && target.action.is_none() {
            Ok(None)
        } else {
            Ok(Some(target))
        }
    }

    /// Free-form action text up to the next top-level `,` or `;`.
    fn action_text(&mut self) -> &'a str {
        let start = self.pos;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.peek() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None => match c {
                    '\'' | '"' | '`' => quote = Some(c),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => depth = depth.saturating_sub(1),
                    ',' | ';' if depth == 0 => break,
                    _ => {}
                },
            }
            self.bump();
        }
        self.input[start..self.pos].trim()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn names(binding: &Binding) -> Vec<String> {
        binding
            .eventexpressions
            .iter()
            .map(Eventexpression::event_state)
            .collect()
    }

    #[test]
    fn parses_two_expressions() {
        let exprs = parse("create:ok,delete:error=>replace;create:ok->todo=>append").unwrap();
        assert_eq!(exprs.len(), 2);

        let first = &exprs[0];
        assert_eq!(first.bindings.len(), 2);
        assert!(first.bindings[0].target.is_none());
        assert_eq!(
            first.bindings[1].target.as_ref().unwrap().action.as_deref(),
            Some("replace")
        );

        let second = &exprs[1].bindings[0];
        let target = second.target.as_ref().unwrap();
        assert_eq!(target.template.as_deref(), Some("todo"));
        assert_eq!(target.action.as_deref(), Some("append"));
    }

    #[test]
    fn groups_fold_targetless_run() {
        let exprs = parse("create:ok,delete:error=>replace").unwrap();
        let groups = exprs[0].groups();
        assert_eq!(groups.len(), 1);
        let events: Vec<String> = groups[0].events.iter().map(|e| e.event_state()).collect();
        assert_eq!(events, vec!["create:ok", "delete:error"]);
        assert_eq!(groups[0].action(), Some("replace"));
    }

    #[test]
    fn target_closes_binding() {
        let exprs = parse("a:ok->x,b:ok->y").unwrap();
        let groups = exprs[0].groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].template(), Some("x"));
        assert_eq!(groups[1].template(), Some("y"));
    }

    #[test]
    fn trailing_run_without_target() {
        let exprs = parse("a:ok->x,b,c:error").unwrap();
        let groups = exprs[0].groups();
        assert_eq!(groups.len(), 2);
        assert!(groups[1].target.is_none());
        assert_eq!(groups[1].events.len(), 2);
    }

    #[test]
    fn bare_event_has_no_state() {
        let exprs = parse("click").unwrap();
        let event = &exprs[0].bindings[0].eventexpressions[0];
        assert_eq!(event.name, "click");
        assert_eq!(event.state, None);
        assert_eq!(event.event_state(), "click:ok");
    }

    #[test]
    fn hyphenated_event_before_template_arrow() {
        let exprs = parse("update-now->status").unwrap();
        let binding = &exprs[0].bindings[0];
        assert_eq!(binding.eventexpressions[0].name, "update-now");
        assert_eq!(
            binding.target.as_ref().unwrap().template.as_deref(),
            Some("status")
        );
    }

    #[test]
    fn bracket_group_shares_target() {
        let exprs = parse("[create:ok, update:error]->todo").unwrap();
        let binding = &exprs[0].bindings[0];
        assert_eq!(names(binding), vec!["create:ok", "update:error"]);
        assert_eq!(
            binding.target.as_ref().unwrap().template.as_deref(),
            Some("todo")
        );
    }

    #[test]
    fn modifiers_are_kept_in_order() {
        let exprs = parse("submit:ok.prevent.debounce=>save").unwrap();
        let event = &exprs[0].bindings[0].eventexpressions[0];
        assert_eq!(event.state, Some(State::Ok));
        assert_eq!(event.modifiers, vec!["prevent", "debounce"]);
    }

    #[test]
    fn action_may_be_a_call() {
        let exprs = parse("click=>$fir.emit('a', {x: 1}),other=>doIt").unwrap();
        let groups = exprs[0].groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].action(), Some("$fir.emit('a', {x: 1})"));
        assert_eq!(groups[1].action(), Some("doIt"));
    }

    #[test]
    fn whitespace_is_tolerated() {
        let exprs = parse(" create:ok , delete:error -> todo => replace ; x ").unwrap();
        assert_eq!(exprs.len(), 2);
        let groups = exprs[0].groups();
        assert_eq!(groups[0].template(), Some("todo"));
        assert_eq!(groups[0].action(), Some("replace"));
    }

    #[test]
    fn rejects_bad_state() {
        let err = parse("create:maybe").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        match err {
            CompileError::Syntax { fragment, .. } => assert_eq!(fragment, "maybe"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_state_points_at_colon() {
        for (input, expected) in [("create:", ":"), ("create:!x,b", ":!x"), ("a:;b", ":")] {
            match parse(input).unwrap_err() {
                CompileError::Syntax { fragment, .. } => {
                    assert_eq!(fragment, expected, "input: {input}")
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn rejects_template_with_inner_space() {
        let err = parse("save:ok->my block").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        match err {
            CompileError::Syntax { fragment, .. } => assert_eq!(fragment, "my block"),
            other => panic!("unexpected error: {other}"),
        }
        // surrounding whitespace is still fine
        let exprs = parse("save:ok -> my_block => replace").unwrap();
        assert_eq!(exprs[0].groups()[0].template(), Some("my_block"));
    }

    #[test]
    fn rejects_empty_positions() {
        assert!(parse("create:ok->").is_err());
        assert!(parse("create:ok=>").is_err());
        assert!(parse("create:ok->todo=>").is_err());
        assert!(parse("").is_err());
        assert!(parse("a;").is_err());
        assert!(parse("a,").is_err());
    }

    #[test]
    fn rejects_non_identifier_template() {
        assert!(parse("create:ok->{{.x}}").is_err());
        assert!(parse("create:ok->todo.x").is_err());
    }

    #[test]
    fn rejects_dangling_modifier_and_dot_action() {
        assert!(parse("click.").is_err());
        assert!(parse("click=>.foo").is_err());
    }

    #[test]
    fn rejects_unclosed_group() {
        assert!(parse("[a:ok,b:ok").is_err());
    }
}
