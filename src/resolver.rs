//! Directive resolution.
//!
//! For every element, the `x-fir-*` directives present are sorted by
//! precedence. Among the exclusive ones only those sharing the lowest
//! precedence are translated; append, prepend and the `js` collectors
//! always compose with the winner. Every recognized directive attribute is
//! replaced by the canonical `@fir:` attributes, inserted where the first
//! directive stood.

use std::collections::HashSet;

use crate::actions::{ActionKind, ActionRegistry, ActionsMap, CanonicalAttr};
use crate::html::{Attribute, Document, Element};
use crate::CompileError;

/// Rewrite the directives of one element. Returns whether it changed.
pub fn resolve_element(
    element: &mut Element,
    registry: &ActionRegistry,
) -> Result<bool, CompileError> {
    let mut matches = Vec::new();
    let mut actions = ActionsMap::new();

    for (index, attribute) in element.attributes().iter().enumerate() {
        let Some((kind, info)) = registry.match_attribute(attribute.key(), attribute.value()) else {
            continue;
        };
        if kind == ActionKind::Js {
            if let Some(name) = info.params.first() {
                actions.insert(name.clone(), info.value.clone());
            }
        }
        matches.push((index, kind, info));
    }

    if matches.is_empty() {
        return Ok(false);
    }

    matches.sort_by_key(|(_, kind, _)| kind.precedence());

    let winner = matches
        .iter()
        .filter(|(_, kind, _)| kind.is_exclusive())
        .map(|(_, kind, _)| kind.precedence())
        .min();

    let existing: HashSet<&str> = element.attributes().iter().map(Attribute::key).collect();
    let mut generated: Vec<CanonicalAttr> = Vec::new();

    for (_, kind, info) in &matches {
        if kind.is_exclusive() && Some(kind.precedence()) != winner {
            log::warn!(
                "<{}>: `{}` ignored, a higher priority directive is present",
                element.name(),
                info.attr_name
            );
            continue;
        }
        for attr in kind.translate(info, &actions)? {
            if existing.contains(attr.key.as_str()) || generated.iter().any(|g| g.key == attr.key) {
                log::warn!("<{}>: duplicate attribute `{}` dropped", element.name(), attr.key);
                continue;
            }
            generated.push(attr);
        }
    }

    let directives: HashSet<usize> = matches.iter().map(|(index, _, _)| *index).collect();
    let first = matches.iter().map(|(index, _, _)| *index).min();

    let mut rewritten = Vec::with_capacity(element.attributes().len() + generated.len());
    for (index, attribute) in element.attributes().iter().enumerate() {
        if Some(index) == first {
            rewritten.extend(
                generated
                    .drain(..)
                    .map(|attr| Attribute::new(attr.key, Some(attr.value))),
            );
        }
        if !directives.contains(&index) {
            rewritten.push(attribute.clone());
        }
    }
    element.set_attributes(rewritten);
    Ok(true)
}

/// Resolve every element of a document. Returns the number of elements
/// rewritten. The first directive error aborts the whole document.
pub fn resolve_document(
    document: &mut Document,
    registry: &ActionRegistry,
) -> Result<usize, CompileError> {
    let mut rewritten = 0;
    document.try_for_each_element_mut(&mut |element| {
        if resolve_element(element, registry)? {
            rewritten += 1;
        }
        Ok::<(), CompileError>(())
    })?;
    Ok(rewritten)
}

/// Parse, resolve and print a template.
pub fn resolve_html(html: &str, registry: &ActionRegistry) -> Result<String, CompileError> {
    let mut document = Document::parse(html)?;
    resolve_document(&mut document, registry)?;
    Ok(document.to_html())
}
