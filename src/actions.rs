//! Directive handlers.
//!
//! Each `x-fir-<name>` directive is handled by one [`ActionKind`]. A handler
//! turns the directive value into one or more canonical `@fir:` attributes.
//! Lower precedence numbers win when several directives share an element.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::expression::{self, Eventexpression, Group};
use crate::utils::{self, DIRECTIVE_PREFIX, FIR_PREFIX, NOHTML};
use crate::CompileError;

/// Action name → JavaScript snippet, collected from `x-fir-js:<name>` and
/// `x-fir-action-<name>` attributes of the same element.
pub type ActionsMap = HashMap<String, String>;

/// Action emitted when a `live` binding names no action.
pub const DEFAULT_ACTION: &str = "$fir.replace()";

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Live,
    Refresh,
    Remove,
    RemoveParent,
    Reset,
    ToggleDisabled,
    Dispatch,
    RunJs,
    Append,
    Prepend,
    /// Collects `x-fir-js:<name>` snippets; emits nothing itself.
    Js,
}

impl ActionKind {
    /// The standard handler set.
    pub const ALL: [ActionKind; 11] = [
        ActionKind::Live,
        ActionKind::Refresh,
        ActionKind::Remove,
        ActionKind::RemoveParent,
        ActionKind::Reset,
        ActionKind::ToggleDisabled,
        ActionKind::Dispatch,
        ActionKind::RunJs,
        ActionKind::Append,
        ActionKind::Prepend,
        ActionKind::Js,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ActionKind::Live => "live",
            ActionKind::Refresh => "refresh",
            ActionKind::Remove => "remove",
            ActionKind::RemoveParent => "remove-parent",
            ActionKind::Reset => "reset",
            ActionKind::ToggleDisabled => "toggle-disabled",
            ActionKind::Dispatch => "dispatch",
            ActionKind::RunJs => "runjs",
            ActionKind::Append => "append",
            ActionKind::Prepend => "prepend",
            ActionKind::Js => "js",
        }
    }

    pub const fn precedence(self) -> u32 {
        match self {
            ActionKind::Js => 0,
            ActionKind::Live => 10,
            ActionKind::Refresh => 20,
            ActionKind::Remove => 30,
            ActionKind::RemoveParent => 40,
            ActionKind::Reset => 50,
            ActionKind::ToggleDisabled => 60,
            ActionKind::Dispatch => 70,
            ActionKind::RunJs => 80,
            ActionKind::Append => 90,
            ActionKind::Prepend => 100,
        }
    }

    /// Exclusive directives compete; only the lowest precedence present is
    /// translated. The others compose with whatever wins.
    pub fn is_exclusive(self) -> bool {
        !matches!(
            self,
            ActionKind::Append | ActionKind::Prepend | ActionKind::Js
        )
    }

    /// Client call of handlers that ignore the author's target.
    fn fixed_call(self) -> Option<&'static str> {
        match self {
            ActionKind::Refresh => Some("$fir.replace()"),
            ActionKind::Remove => Some("$fir.removeEl()"),
            ActionKind::RemoveParent => Some("$fir.removeParentEl()"),
            ActionKind::Reset => Some("$el.reset()"),
            ActionKind::ToggleDisabled => Some("$fir.toggleDisabled()"),
            ActionKind::Append => Some("$fir.appendEl()"),
            ActionKind::Prepend => Some("$fir.prependEl()"),
            _ => None,
        }
    }

    fn forces_nohtml(self) -> bool {
        matches!(
            self,
            ActionKind::Remove
                | ActionKind::RemoveParent
                | ActionKind::Reset
                | ActionKind::ToggleDisabled
                | ActionKind::Dispatch
        )
    }

    /// Translate one directive occurrence into canonical attributes.
    pub fn translate(
        self,
        info: &ActionInfo,
        actions: &ActionsMap,
    ) -> Result<Vec<CanonicalAttr>, CompileError> {
        if self == ActionKind::Js {
            return Ok(Vec::new());
        }

        let expressions = expression::parse(&info.value)?;
        let groups = expressions.iter().flat_map(|e| e.groups());

        match self {
            ActionKind::Live => Ok(groups
                .map(|group| {
                    let action = match group.action() {
                        Some(name) => actions
                            .get(name)
                            .cloned()
                            .unwrap_or_else(|| name.to_owned()),
                        None => DEFAULT_ACTION.to_owned(),
                    };
                    CanonicalAttr::new(&group, group.template(), group.modifiers(), action)
                })
                .collect()),

            ActionKind::Refresh
            | ActionKind::Remove
            | ActionKind::RemoveParent
            | ActionKind::Reset
            | ActionKind::ToggleDisabled => {
                let call = self.fixed_call().unwrap_or(DEFAULT_ACTION);
                Ok(groups
                    .map(|group| {
                        CanonicalAttr::new(&group, None, self.modifiers(&group), call.to_owned())
                    })
                    .collect())
            }

            ActionKind::Dispatch => {
                if info.params.is_empty() || info.params.iter().any(|p| p.trim().is_empty()) {
                    return Err(CompileError::missing_parameter(
                        &info.attr_name,
                        "expected x-fir-dispatch:[event,...] with at least one event",
                    ));
                }
                let args = info
                    .params
                    .iter()
                    .map(|p| format!("'{}'", p.trim()))
                    .collect::<Vec<_>>()
                    .join(",");
                let call = format!("$dispatch({args})");
                Ok(groups
                    .map(|group| {
                        CanonicalAttr::new(
                            &group,
                            group.template(),
                            self.modifiers(&group),
                            call.clone(),
                        )
                    })
                    .collect())
            }

            ActionKind::RunJs => {
                let name = info.single_param().ok_or_else(|| {
                    CompileError::missing_parameter(
                        &info.attr_name,
                        "expected x-fir-runjs:<action> naming one action",
                    )
                })?;
                let js = actions
                    .get(name)
                    .filter(|js| !js.trim().is_empty())
                    .ok_or_else(|| {
                        CompileError::missing_parameter(
                            &info.attr_name,
                            format!("no x-fir-js:{name} snippet on the element"),
                        )
                    })?;
                Ok(groups
                    .map(|group| CanonicalAttr::new(&group, None, group.modifiers(), js.clone()))
                    .collect())
            }

            ActionKind::Append | ActionKind::Prepend => {
                let template = info.single_param().ok_or_else(|| {
                    CompileError::missing_parameter(
                        &info.attr_name,
                        format!("expected x-fir-{}:<template>", self.name()),
                    )
                })?;
                if !utils::is_valid_template_name(template) {
                    return Err(CompileError::InvalidTemplateName {
                        name: template.to_owned(),
                    });
                }
                let call = self.fixed_call().unwrap_or(DEFAULT_ACTION);
                Ok(groups
                    .map(|group| {
                        CanonicalAttr::new(
                            &group,
                            Some(template),
                            group.modifiers(),
                            call.to_owned(),
                        )
                    })
                    .collect())
            }

            ActionKind::Js => Ok(Vec::new()),
        }
    }

    fn modifiers(self, group: &Group<'_>) -> Vec<String> {
        let mut modifiers = group.modifiers();
        if self.forces_nohtml() && !modifiers.iter().any(|m| m == NOHTML) {
            modifiers.push(NOHTML.to_owned());
        }
        modifiers
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn names_unique(kinds: &[ActionKind]) -> bool {
    let mut i = 0;
    while i < kinds.len() {
        let mut j = i + 1;
        while j < kinds.len() {
            if str_eq(kinds[i].name(), kinds[j].name()) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    names_unique(&ActionKind::ALL),
    "duplicate action handler name"
);

// ---------------------------------------------------------------------------
// ActionInfo
// ---------------------------------------------------------------------------

/// Parsed shape of one directive attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionInfo {
    /// Full attribute key, e.g. `x-fir-dispatch:[a,b]`.
    pub attr_name: String,
    pub action_name: String,
    /// Prefix parameters: `x-fir-append:todo` → `["todo"]`.
    pub params: Vec<String>,
    pub value: String,
}

impl ActionInfo {
    fn single_param(&self) -> Option<&str> {
        match self.params.as_slice() {
            [param] if !param.trim().is_empty() => Some(param.trim()),
            _ => None,
        }
    }
}

fn parse_params(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(list) => list.split(',').map(|p| p.trim().to_owned()).collect(),
        None => vec![raw.to_owned()],
    }
}

// ---------------------------------------------------------------------------
// CanonicalAttr
// ---------------------------------------------------------------------------

/// A translated `@fir:` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalAttr {
    pub key: String,
    pub value: String,
}

impl CanonicalAttr {
    fn new(
        group: &Group<'_>,
        template: Option<&str>,
        modifiers: Vec<String>,
        value: String,
    ) -> Self {
        Self {
            key: canonical_key(&group.events, template, &modifiers),
            value,
        }
    }
}

impl fmt::Display for CanonicalAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.key, self.value)
    }
}

/// `@fir:<event>[::<template>][.<modifier>]*`, bracketed for several events.
pub fn canonical_key(
    events: &[&Eventexpression],
    template: Option<&str>,
    modifiers: &[String],
) -> String {
    let mut key = String::from(FIR_PREFIX);
    match events {
        [event] => key.push_str(&event.event_state()),
        _ => {
            let list: Vec<String> = events.iter().map(|e| e.event_state()).collect();
            key.push('[');
            key.push_str(&list.join(","));
            key.push(']');
        }
    }
    if let Some(template) = template {
        key.push_str("::");
        key.push_str(template);
    }
    for modifier in modifiers {
        key.push('.');
        key.push_str(modifier);
    }
    key
}

// ---------------------------------------------------------------------------
// ActionRegistry
// ---------------------------------------------------------------------------

/// The handlers a resolver recognizes, ordered by precedence.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRegistry {
    handlers: Vec<ActionKind>,
}

impl ActionRegistry {
    pub fn new(kinds: impl IntoIterator<Item = ActionKind>) -> Result<Self, CompileError> {
        let mut handlers: Vec<ActionKind> = Vec::new();
        for kind in kinds {
            if handlers.iter().any(|h| h.name() == kind.name()) {
                return Err(CompileError::DuplicateHandler {
                    name: kind.name().to_owned(),
                });
            }
            handlers.push(kind);
        }
        handlers.sort_by_key(|h| h.precedence());
        Ok(Self { handlers })
    }

    pub fn handlers(&self) -> &[ActionKind] {
        &self.handlers
    }

    pub fn get(&self, name: &str) -> Option<ActionKind> {
        self.handlers.iter().copied().find(|h| h.name() == name)
    }

    /// Match a directive attribute (`x-fir-<name>` or `x-fir-<name>:<param>`).
    pub fn match_attribute(
        &self,
        key: &str,
        value: Option<&str>,
    ) -> Option<(ActionKind, ActionInfo)> {
        let rest = key.strip_prefix(DIRECTIVE_PREFIX)?;

        let (kind, action_name, params) = if let Some(name) = rest.strip_prefix("action-") {
            (self.get(ActionKind::Js.name())?, ActionKind::Js.name(), vec![name.to_owned()])
        } else {
            let (name, param) = match rest.split_once(':') {
                Some((name, param)) => (name, Some(param)),
                None => (rest, None),
            };
            (self.get(name)?, name, parse_params(param))
        };

        Some((
            kind,
            ActionInfo {
                attr_name: key.to_owned(),
                action_name: action_name.to_owned(),
                params,
                value: value.unwrap_or_default().to_owned(),
            },
        ))
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let mut handlers = ActionKind::ALL.to_vec();
        handlers.sort_by_key(|h| h.precedence());
        Self { handlers }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
