//! Event → template mapping.
//!
//! Each file is processed on its own (resolve directives, extract blocks,
//! add classes, scan `@fir:` keys) and yields a [`FileParseResult`]. Files
//! run concurrently on a bounded pool; results are merged after the join.
//!
//! A malformed `@fir:` key never fails a file: it is logged, recorded as a
//! diagnostic and skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::actions::ActionRegistry;
use crate::expression::State;
use crate::html::Document;
use crate::source::TemplateSource;
use crate::utils::{self, NO_BLOCK};
use crate::{blocks, classes, filter, resolver, CompileError, Diagnostic};

// ---------------------------------------------------------------------------
// EventTemplates
// ---------------------------------------------------------------------------

/// Templates and blocks one event re-renders. `-` is the whole element.
pub type EventTemplate = BTreeSet<String>;

/// Event id (`event:state`) → templates to re-render.
///
/// Merging is a per-key set union: commutative, associative and idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTemplates(BTreeMap<String, EventTemplate>);

impl EventTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event_id: impl Into<String>, template: impl Into<String>) {
        self.0
            .entry(event_id.into())
            .or_default()
            .insert(template.into());
    }

    pub fn get(&self, event_id: &str) -> Option<&EventTemplate> {
        self.0.get(event_id)
    }

    pub fn merge(&mut self, other: EventTemplates) {
        for (event_id, templates) in other.0 {
            self.0.entry(event_id).or_default().extend(templates);
        }
    }

    pub fn merged(mut self, other: EventTemplates) -> Self {
        self.merge(other);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EventTemplate)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EventTemplates {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = EventTemplates::new();
        for (event_id, template) in iter {
            out.insert(event_id, template);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Validate one expanded `event[:state][::block]` entry.
pub fn parse_entry(entry: &str) -> Result<(String, String), CompileError> {
    let malformed = || CompileError::FilterFormat {
        raw: entry.to_owned(),
    };

    let (event_state, block) = match entry.split_once("::") {
        Some((event_state, block)) => (event_state, Some(block)),
        None => (entry, None),
    };
    let (event, state) = utils::split_event_state(event_state);
    if !utils::is_valid_event_name(event) {
        return Err(malformed());
    }
    let state = match state {
        Some(raw) => State::parse(raw).ok_or_else(malformed)?,
        None => State::Ok,
    };

    let template = match block {
        Some(block) => {
            // pending and done carry no HTML, so no block either
            if !state.renders_html() {
                return Err(malformed());
            }
            if !utils::is_valid_template_name(block) {
                return Err(CompileError::InvalidTemplateName {
                    name: block.to_owned(),
                });
            }
            block.to_owned()
        }
        None => NO_BLOCK.to_owned(),
    };

    Ok((format!("{event}:{state}"), template))
}

/// Scan every `@fir:`/`x-on:fir:` key of a document.
pub fn scan_document(
    document: &Document,
    file: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> EventTemplates {
    let mut event_templates = EventTemplates::new();
    for element in document.elements() {
        for attribute in element.attributes() {
            let Some((_, rest)) = utils::strip_fir_prefix(attribute.key()) else {
                continue;
            };
            let routing = rest.split('.').next().unwrap_or_default();

            let entries = match filter::expand(routing) {
                Ok(expansion) => expansion.entries,
                Err(err) => {
                    log::warn!("{file}: {err}");
                    diagnostics.push(Diagnostic::warning(err.to_string(), file));
                    vec![routing.to_owned()]
                }
            };

            for entry in entries {
                match parse_entry(&entry) {
                    Ok((event_id, template)) => event_templates.insert(event_id, template),
                    Err(err) => {
                        log::warn!("{file}: skipping `{}`: {err}", attribute.key());
                        diagnostics.push(Diagnostic::warning(
                            format!("skipping `{}`: {err}", attribute.key()),
                            file,
                        ));
                    }
                }
            }
        }
    }
    event_templates
}

// ---------------------------------------------------------------------------
// Per-file processing
// ---------------------------------------------------------------------------

/// Everything one template file contributes to a route.
#[derive(Debug, Default)]
pub struct FileParseResult {
    pub name: String,
    /// Rewritten template source.
    pub content: String,
    pub event_templates: EventTemplates,
    pub blocks: BTreeMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
    pub err: Option<CompileError>,
}

impl FileParseResult {
    fn failed(name: &str, err: CompileError) -> Self {
        Self {
            name: name.to_owned(),
            diagnostics: vec![Diagnostic::error(err.to_string(), name)],
            err: Some(err),
            ..Default::default()
        }
    }
}

/// Resolve directives, extract blocks, add classes and map events.
pub fn process_content(
    name: &str,
    content: &str,
    registry: &ActionRegistry,
) -> Result<FileParseResult, CompileError> {
    let mut document = Document::parse(content)?;
    resolver::resolve_document(&mut document, registry)?;
    // classes go in before the parent is hashed, so a second pass over
    // the output derives the same block names
    let blocks = blocks::extract_document_with(&mut document, &mut |element| {
        classes::finalize_element(element);
    });

    let mut diagnostics = Vec::new();
    let event_templates = scan_document(&document, name, &mut diagnostics);

    Ok(FileParseResult {
        name: name.to_owned(),
        content: document.to_html(),
        event_templates,
        blocks,
        diagnostics,
        err: None,
    })
}

fn process_file(
    source: &dyn TemplateSource,
    path: &str,
    registry: &ActionRegistry,
) -> FileParseResult {
    let (name, bytes) = match source.read(path) {
        Ok(read) => read,
        Err(err) => return FileParseResult::failed(path, err),
    };
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(err) => {
            let err = CompileError::Html {
                position: err.utf8_error().valid_up_to(),
                message: "template is not valid UTF-8".to_owned(),
            };
            return FileParseResult::failed(&name, err);
        }
    };
    match process_content(&name, &content, registry) {
        Ok(result) => {
            log::debug!(
                "{name}: {} events, {} blocks",
                result.event_templates.len(),
                result.blocks.len()
            );
            result
        }
        Err(err) => FileParseResult::failed(&name, err),
    }
}

/// Process `paths` concurrently, at most `concurrency` at a time.
///
/// Every file yields a result, failed ones included; results come back in
/// the order of `paths`.
pub async fn parse_files(
    source: Arc<dyn TemplateSource>,
    paths: Vec<String>,
    registry: Arc<ActionRegistry>,
    concurrency: usize,
) -> Vec<FileParseResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut slots: Vec<Option<FileParseResult>> = Vec::with_capacity(paths.len());
    slots.resize_with(paths.len(), || None);

    for (index, path) in paths.iter().cloned().enumerate() {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let source = Arc::clone(&source);
        let registry = Arc::clone(&registry);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            (index, process_file(source.as_ref(), &path, &registry))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(err) => log::error!("template worker failed: {err}"),
        }
    }

    slots
        .into_iter()
        .zip(paths)
        .map(|(slot, path)| {
            slot.unwrap_or_else(|| {
                FileParseResult::failed(&path, CompileError::Join(format!("no result for {path}")))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
