//! Inline block extraction.
//!
//! An element bound with `@fir:create:ok="..."` (or `@fir:create:ok::name`)
//! whose content uses template syntax becomes a named block: its inner HTML
//! is stored under `fir-<hash>` and the attribute is rewritten to
//! `@fir:create:ok::fir-<hash>`. The name only depends on the inner HTML,
//! so identical fragments share one block and re-extraction is a no-op.
//!
//! Append and prepend bindings keep their name: it refers to the template
//! rendered as a new child, not to the element's content.
//!
//! Elements are visited children first, which makes the hash of an outer
//! block cover the already rewritten inner blocks.

use std::collections::BTreeMap;

use crate::expression::State;
use crate::html::{Document, Element, Node};
use crate::utils::{self, FirKey, NOHTML};
use crate::CompileError;

/// Client calls that render the named template as a new child.
const INSERT_CALLS: [&str; 2] = ["$fir.appendEl()", "$fir.prependEl()"];

/// Rewritten template and the blocks found in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub html: String,
    pub blocks: BTreeMap<String, String>,
}

pub fn extract_blocks(html: &str) -> Result<Extracted, CompileError> {
    let mut document = Document::parse(html)?;
    let blocks = extract_document(&mut document);
    Ok(Extracted {
        html: document.to_html(),
        blocks,
    })
}

pub fn extract_document(document: &mut Document) -> BTreeMap<String, String> {
    extract_document_with(document, &mut |_| {})
}

/// Extract blocks, running `after` on each element once its own block is
/// named and before its parent is hashed.
pub fn extract_document_with(
    document: &mut Document,
    after: &mut dyn FnMut(&mut Element),
) -> BTreeMap<String, String> {
    let mut blocks = BTreeMap::new();
    visit(&mut document.nodes, &mut blocks, after);
    blocks
}

fn visit(
    nodes: &mut [Node],
    blocks: &mut BTreeMap<String, String>,
    after: &mut dyn FnMut(&mut Element),
) {
    for node in nodes {
        if let Node::Element(element) = node {
            visit(element.children_mut(), blocks, after);
            name_block(element, blocks);
            after(element);
        }
    }
}

/// Whether the key should point at a block derived from the element.
///
/// Every event must name an `ok` or `error` state and HTML must be
/// expected. Named keys qualify unless they insert a new child.
fn wants_generated_block(key: &FirKey, value: Option<&str>) -> bool {
    if key.block.is_some() && value.is_some_and(|v| INSERT_CALLS.contains(&v.trim())) {
        return false;
    }
    !key.has_modifier(NOHTML)
        && key.event_entries().iter().all(|entry| {
            matches!(
                utils::split_event_state(entry).1.and_then(State::parse),
                Some(state) if state.renders_html()
            )
        })
}

fn name_block(element: &mut Element, blocks: &mut BTreeMap<String, String>) {
    let candidates: Vec<(usize, FirKey)> = element
        .attributes()
        .iter()
        .enumerate()
        .filter_map(|(index, attribute)| {
            FirKey::parse(attribute.key())
                .filter(|key| wants_generated_block(key, attribute.value()))
                .map(|key| (index, key))
        })
        .collect();
    if candidates.is_empty() {
        return;
    }

    let inner = element.inner_html();
    if !utils::has_template_syntax(&inner) {
        return;
    }
    let name = utils::block_name(&inner);
    log::debug!("<{}> inner HTML extracted as block {name}", element.name());

    let changed: Vec<(usize, String)> = candidates
        .into_iter()
        .filter_map(|(index, mut key)| {
            key.block = Some(name.clone());
            let rewritten = key.to_key();
            (element.attributes()[index].key() != rewritten).then_some((index, rewritten))
        })
        .collect();
    if !changed.is_empty() {
        let attributes = element.attributes_mut();
        for (index, key) in changed {
            attributes[index].set_key(key);
        }
    }

    blocks.insert(name, inner);
}
