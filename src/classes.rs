//! Class synthesis for bound elements.
//!
//! Every element bound to a block gets `fir-<event>-<state>--<block>` (plus
//! `--<key>` when it carries a `fir-key` attribute) so the client runtime
//! can address it with a class selector.

use std::convert::Infallible;

use crate::expression::State;
use crate::filter;
use crate::html::{Attribute, Document, Element};
use crate::utils::{self, FirKey, KEY_ATTR};

/// Class names addressing the blocks named by one attribute key.
pub fn class_names(key: &FirKey, fir_key: Option<&str>) -> Vec<String> {
    let Some(block) = key.block.as_deref() else {
        return Vec::new();
    };
    let block = sanitize(block);

    let mut names = Vec::new();
    for entry in filter::expand_lossy(&key.events) {
        let (event, state) = utils::split_event_state(&entry);
        // pending and done never address a block
        if state.and_then(State::parse).is_some_and(|s| !s.renders_html()) {
            continue;
        }
        let mut name = format!("fir-{event}");
        if let Some(state) = state {
            name.push('-');
            name.push_str(state);
        }
        name.push_str("--");
        name.push_str(&block);
        if let Some(fir_key) = fir_key.filter(|k| !k.trim().is_empty()) {
            name.push_str("--");
            name.push_str(fir_key.trim());
        }
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn sanitize(block: &str) -> String {
    block
        .chars()
        .map(|c| if c == ' ' || c == ':' { '-' } else { c })
        .collect()
}

/// Merge class names into the existing list, dropping duplicates.
///
/// A class list containing template actions is appended to as is.
fn merge_classes(existing: &str, extra: &[String]) -> String {
    if utils::has_template_syntax(existing) {
        let mut out = existing.to_owned();
        for name in extra {
            if !existing.split_whitespace().any(|c| c == name) {
                out.push(' ');
                out.push_str(name);
            }
        }
        return out;
    }

    let mut classes: Vec<&str> = Vec::new();
    for class in existing
        .split_whitespace()
        .chain(extra.iter().map(String::as_str))
    {
        if !classes.contains(&class) {
            classes.push(class);
        }
    }
    classes.join(" ")
}

/// Add the block classes of one element. Returns whether it changed.
pub fn finalize_element(element: &mut Element) -> bool {
    let fir_key = element.attribute(KEY_ATTR).and_then(Attribute::value);
    let mut extra: Vec<String> = Vec::new();
    for attribute in element.attributes() {
        let Some(key) = FirKey::parse(attribute.key()) else {
            continue;
        };
        for name in class_names(&key, fir_key) {
            if !extra.contains(&name) {
                extra.push(name);
            }
        }
    }
    if extra.is_empty() {
        return false;
    }

    let current = element.attribute("class").and_then(Attribute::value);
    let merged = merge_classes(current.unwrap_or_default(), &extra);
    if current == Some(merged.as_str()) {
        return false;
    }

    let attributes = element.attributes_mut();
    match attributes.iter_mut().find(|a| a.key() == "class") {
        Some(class) => class.set_value(merged),
        None => attributes.push(Attribute::new("class", Some(merged))),
    }
    true
}

pub fn finalize_document(document: &mut Document) -> usize {
    let mut changed = 0;
    let _ = document.try_for_each_element_mut(&mut |element| {
        if finalize_element(element) {
            changed += 1;
        }
        Ok::<(), Infallible>(())
    });
    changed
}
