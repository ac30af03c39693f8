//! Route compilation and the compiled-route cache.
//!
//! A route is a set of template files. Each file goes through the per-file
//! pipeline on the bounded pool in [`mapper::parse_files`]; the results are
//! merged into one [`CompiledRoute`] once every worker has finished.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::ActionRegistry;
use crate::mapper::{self, EventTemplate, EventTemplates, FileParseResult};
use crate::source::TemplateSource;
use crate::{CompileError, Diagnostic};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Upper bound on files processed at the same time.
    pub concurrency: usize,
    /// Extensions of the files picked up when a directory is listed.
    pub extensions: Vec<String>,
    /// Fail the whole compile on the first file error.
    pub strict: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            extensions: vec!["html".to_string()],
            strict: true,
        }
    }
}

// ---------------------------------------------------------------------------
// CompiledRoute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRoute {
    pub id: String,
    /// File name → rewritten template.
    pub templates: BTreeMap<String, String>,
    /// Extracted block name → block content.
    pub blocks: BTreeMap<String, String>,
    pub event_templates: EventTemplates,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledRoute {
    /// Templates to re-render for an `event:state` id.
    pub fn lookup(&self, event_id: &str) -> Option<&EventTemplate> {
        self.event_templates.get(event_id)
    }

    fn absorb(&mut self, result: FileParseResult) {
        if result.err.is_none() {
            self.templates.insert(result.name, result.content);
        }
        self.blocks.extend(result.blocks);
        self.event_templates.merge(result.event_templates);
        self.diagnostics.extend(result.diagnostics);
    }
}

/// A strict compile that failed. `partial` holds what the other files
/// contributed.
#[derive(Debug, Error)]
#[error("route `{}`: {error}", partial.id)]
pub struct CompileFailure {
    #[source]
    pub error: CompileError,
    pub partial: CompiledRoute,
}

// ---------------------------------------------------------------------------
// compile_route
// ---------------------------------------------------------------------------

/// Expand directory entries into the template files below them.
fn expand_paths(
    source: &dyn TemplateSource,
    files: &[String],
    options: &CompileOptions,
) -> Result<Vec<String>, CompileError> {
    let mut out: Vec<String> = Vec::with_capacity(files.len());
    for path in files {
        let found = if source.exists(path) {
            vec![path.clone()]
        } else {
            source.list(path, &options.extensions)?
        };
        for path in found {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    Ok(out)
}

pub async fn compile_route(
    source: Arc<dyn TemplateSource>,
    route_id: &str,
    files: &[String],
    registry: Arc<ActionRegistry>,
    options: &CompileOptions,
) -> Result<CompiledRoute, CompileFailure> {
    let mut route = CompiledRoute {
        id: route_id.to_owned(),
        ..Default::default()
    };

    let paths = match expand_paths(source.as_ref(), files, options) {
        Ok(paths) => paths,
        Err(error) => {
            return Err(CompileFailure {
                error,
                partial: route,
            })
        }
    };
    log::debug!("route {route_id}: {} files", paths.len());

    let results = mapper::parse_files(source, paths, registry, options.concurrency).await;

    let mut first_error = None;
    for mut result in results {
        if let Some(err) = result.err.take() {
            log::warn!("route {route_id}: {}: {err}", result.name);
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
        route.absorb(result);
    }

    if options.strict {
        if let Some(error) = first_error {
            return Err(CompileFailure {
                error,
                partial: route,
            });
        }
    }

    log::info!(
        "route {route_id}: {} templates, {} blocks, {} events",
        route.templates.len(),
        route.blocks.len(),
        route.event_templates.len()
    );
    Ok(route)
}

// ---------------------------------------------------------------------------
// RouteCache
// ---------------------------------------------------------------------------

/// Compiled routes by id.
///
/// Readers share the lock; a rebuild swaps the whole entry, so a reader
/// sees either the old or the new route, never a mix.
#[derive(Debug, Clone, Default)]
pub struct RouteCache {
    inner: Arc<RwLock<HashMap<String, Arc<CompiledRoute>>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, route_id: &str) -> Option<Arc<CompiledRoute>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(route_id).cloned()
    }

    /// Insert or replace a route. Returns the previous entry if any.
    pub fn insert(&self, route: CompiledRoute) -> Option<Arc<CompiledRoute>> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(route.id.clone(), Arc::new(route))
    }

    pub fn invalidate(&self, route_id: &str) -> Option<Arc<CompiledRoute>> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(route_id)
    }

    pub fn clear(&self) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.clear();
    }

    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compile a route again and replace the cached entry.
    ///
    /// On failure the previous entry stays in place.
    pub async fn rebuild(
        &self,
        source: Arc<dyn TemplateSource>,
        route_id: &str,
        files: &[String],
        registry: Arc<ActionRegistry>,
        options: &CompileOptions,
    ) -> Result<Arc<CompiledRoute>, CompileFailure> {
        let route = Arc::new(compile_route(source, route_id, files, registry, options).await?);
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(route_id.to_owned(), Arc::clone(&route));
        Ok(route)
    }

    pub async fn get_or_compile(
        &self,
        source: Arc<dyn TemplateSource>,
        route_id: &str,
        files: &[String],
        registry: Arc<ActionRegistry>,
        options: &CompileOptions,
    ) -> Result<Arc<CompiledRoute>, CompileFailure> {
        if let Some(route) = self.get(route_id) {
            return Ok(route);
        }
        self.rebuild(source, route_id, files, registry, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::ErrorKind;

    fn source() -> Arc<MemorySource> {
        let source = MemorySource::new();
        source.insert(
            "todos/index.html",
            r#"<ol x-fir-append:todo="create">{{ range .Todos }}{{ block "todo" . }}<li x-fir-remove="delete">{{ .Text }}</li>{{ end }}{{ end }}</ol>"#,
        );
        source.insert(
            "todos/count.html",
            r#"<p x-fir-refresh="create:ok,delete:ok">{{ len .Todos }}</p>"#,
        );
        Arc::new(source)
    }

    fn options() -> CompileOptions {
        CompileOptions {
            concurrency: 2,
            ..Default::default()
        }
    }

    #[test]
    fn default_options() {
        let options = CompileOptions::default();
        assert!(options.concurrency >= 1);
        assert_eq!(options.extensions, vec!["html"]);
        assert!(options.strict);

        let parsed: CompileOptions = serde_json::from_str(r#"{"strict":false}"#).unwrap();
        assert!(!parsed.strict);
        assert_eq!(parsed.extensions, vec!["html"]);
    }

    #[tokio::test]
    async fn compiles_directory_into_one_route() {
        let route = compile_route(
            source(),
            "todos",
            &["todos".to_string()],
            Arc::new(ActionRegistry::default()),
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(route.id, "todos");
        assert_eq!(route.templates.len(), 2);
        assert!(route.lookup("create:ok").unwrap().contains("todo"));
        assert!(route.lookup("delete:ok").unwrap().contains("-"));
        // the count paragraph is a generated block shared by two events
        let count_block = route
            .lookup("create:ok")
            .unwrap()
            .iter()
            .find(|t| t.starts_with("fir-"))
            .cloned()
            .unwrap();
        assert!(route.lookup("delete:ok").unwrap().contains(&count_block));
        assert_eq!(route.blocks[&count_block], "{{ len .Todos }}");
    }

    #[tokio::test]
    async fn strict_compile_reports_error_with_partial_route() {
        let source = source();
        source.insert("todos/broken.html", r#"<p x-fir-live="a->"></p>"#);
        let failure = compile_route(
            source.clone(),
            "todos",
            &["todos".to_string()],
            Arc::new(ActionRegistry::default()),
            &options(),
        )
        .await
        .unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::SyntaxError);
        assert_eq!(failure.partial.templates.len(), 2);
        assert!(failure.partial.lookup("create:ok").is_some());

        let lenient = CompileOptions {
            strict: false,
            ..options()
        };
        let route = compile_route(
            source,
            "todos",
            &["todos".to_string()],
            Arc::new(ActionRegistry::default()),
            &lenient,
        )
        .await
        .unwrap();
        assert_eq!(route.templates.len(), 2);
        assert!(route
            .diagnostics
            .iter()
            .any(|d| d.context.as_deref() == Some("todos/broken.html")));
    }

    #[tokio::test]
    async fn missing_entry_fails() {
        let failure = compile_route(
            source(),
            "x",
            &["nowhere".to_string()],
            Arc::new(ActionRegistry::default()),
            &options(),
        )
        .await
        .unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::IoError);
    }

    #[tokio::test]
    async fn cache_compiles_once_and_rebuilds_on_demand() {
        let cache = RouteCache::new();
        let source = source();
        let registry = Arc::new(ActionRegistry::default());
        let files = vec!["todos".to_string()];

        let first = cache
            .get_or_compile(source.clone(), "todos", &files, registry.clone(), &options())
            .await
            .unwrap();
        let again = cache
            .get_or_compile(source.clone(), "todos", &files, registry.clone(), &options())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        source.insert("todos/extra.html", r#"<p x-fir-refresh="reload">{{.X}}</p>"#);
        let rebuilt = cache
            .rebuild(source.clone(), "todos", &files, registry.clone(), &options())
            .await
            .unwrap();
        assert!(rebuilt.lookup("reload:ok").is_some());
        assert!(first.lookup("reload:ok").is_none());
        assert!(Arc::ptr_eq(&cache.get("todos").unwrap(), &rebuilt));

        source.insert("todos/bad.html", r#"<p x-fir-live="a:nope"></p>"#);
        assert!(cache
            .rebuild(source, "todos", &files, registry, &options())
            .await
            .is_err());
        assert!(Arc::ptr_eq(&cache.get("todos").unwrap(), &rebuilt));

        assert!(cache.invalidate("todos").is_some());
        assert!(cache.is_empty());
    }
}
