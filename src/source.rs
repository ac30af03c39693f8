//! Template sources.
//!
//! The compiler only ever sees template bytes through [`TemplateSource`], so
//! a route can be compiled from disk or from templates embedded in the host
//! binary. Paths are relative, `/`-separated and used as template names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::CompileError;

pub trait TemplateSource: Send + Sync {
    /// Read a template. Returns its normalized name and raw bytes.
    fn read(&self, path: &str) -> Result<(String, Vec<u8>), CompileError>;

    /// Whether `path` names a readable template file.
    fn exists(&self, path: &str) -> bool;

    /// Templates under `dir` with one of `extensions`, sorted by name.
    fn list(&self, dir: &str, extensions: &[String]) -> Result<Vec<String>, CompileError>;
}

/// Strip `./` and leading or trailing `/`, unify separators.
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut path = path.as_str();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_matches('/').to_owned()
}

fn has_extension(path: &str, extensions: &[String]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.trim_start_matches('.') == ext))
}

// ---------------------------------------------------------------------------
// FsSource
// ---------------------------------------------------------------------------

/// Templates on disk, resolved against a root directory.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `path` onto the root. Paths may not climb out of it.
    fn resolve(&self, path: &str) -> Result<PathBuf, CompileError> {
        let name = normalize(path);
        if name.split('/').any(|segment| segment == "..") {
            return Err(CompileError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("template path `{path}` escapes the template root"),
            )));
        }
        if name.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(name))
        }
    }

    fn walk(
        &self,
        dir: &Path,
        extensions: &[String],
        out: &mut Vec<String>,
    ) -> Result<(), CompileError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.walk(&path, extensions, out)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let name = normalize(&relative.to_string_lossy());
            if has_extension(&name, extensions) {
                out.push(name);
            }
        }
        Ok(())
    }
}

impl TemplateSource for FsSource {
    fn read(&self, path: &str) -> Result<(String, Vec<u8>), CompileError> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(CompileError::TemplateNotFound {
                path: path.to_owned(),
            });
        }
        Ok((normalize(path), fs::read(full)?))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|full| full.is_file())
    }

    fn list(&self, dir: &str, extensions: &[String]) -> Result<Vec<String>, CompileError> {
        let full = self.resolve(dir)?;
        if !full.is_dir() {
            return Err(CompileError::TemplateNotFound {
                path: dir.to_owned(),
            });
        }
        let mut out = Vec::new();
        self.walk(&full, extensions, &mut out)?;
        out.sort();
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Templates held in memory, e.g. embedded in the host binary.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    templates: Arc<DashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a template.
    pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.templates.insert(normalize(path), content.into());
    }

    pub fn remove(&self, path: &str) -> bool {
        self.templates.remove(&normalize(path)).is_some()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateSource for MemorySource {
    fn read(&self, path: &str) -> Result<(String, Vec<u8>), CompileError> {
        let name = normalize(path);
        match self.templates.get(&name) {
            Some(entry) => Ok((name, entry.value().clone())),
            None => Err(CompileError::TemplateNotFound {
                path: path.to_owned(),
            }),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.templates.contains_key(&normalize(path))
    }

    fn list(&self, dir: &str, extensions: &[String]) -> Result<Vec<String>, CompileError> {
        let dir = normalize(dir);
        let mut out: Vec<String> = self
            .templates
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| dir.is_empty() || name.starts_with(&format!("{dir}/")))
            .filter(|name| has_extension(name, extensions))
            .collect();
        if out.is_empty() {
            return Err(CompileError::TemplateNotFound { path: dir });
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn html() -> Vec<String> {
        vec!["html".to_string()]
    }

    #[test]
    fn normalize_paths() {
        assert_eq!(normalize("./a/b.html"), "a/b.html");
        assert_eq!(normalize("/a\\b.html"), "a/b.html");
        assert_eq!(normalize("routes/"), "routes");
    }

    #[test]
    fn memory_source_read_and_list() {
        let source = MemorySource::new();
        source.insert("/routes/index.html", "<p></p>");
        source.insert("routes/partials/row.html", "<li></li>");
        source.insert("routes/notes.txt", "x");
        source.insert("other/a.html", "");

        let (name, bytes) = source.read("./routes/index.html").unwrap();
        assert_eq!(name, "routes/index.html");
        assert_eq!(bytes, b"<p></p>");
        assert!(source.exists("routes/partials/row.html"));
        assert!(!source.exists("routes"));
        assert_eq!(
            source.list("routes", &html()).unwrap(),
            vec!["routes/index.html", "routes/partials/row.html"]
        );
        assert!(source.list("missing", &html()).is_err());
        assert!(matches!(
            source.read("nope.html"),
            Err(CompileError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn fs_source_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("routes/partials")).unwrap();
        fs::write(dir.path().join("routes/index.html"), "<p></p>").unwrap();
        fs::write(dir.path().join("routes/partials/row.html"), "<li></li>").unwrap();
        fs::write(dir.path().join("routes/readme.md"), "#").unwrap();

        let source = FsSource::new(dir.path());
        assert!(source.exists("routes/index.html"));
        assert!(!source.exists("routes"));
        assert_eq!(
            source.list("routes", &html()).unwrap(),
            vec!["routes/index.html", "routes/partials/row.html"]
        );
        let (name, bytes) = source.read("routes/partials/row.html").unwrap();
        assert_eq!(name, "routes/partials/row.html");
        assert_eq!(bytes, b"<li></li>");
        assert_eq!(
            source.read("routes/missing.html").unwrap_err().kind(),
            crate::ErrorKind::IoError
        );
    }

    #[test]
    fn fs_source_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("root/pages")).unwrap();
        fs::write(dir.path().join("secret.html"), "<p>secret</p>").unwrap();
        fs::write(dir.path().join("root/pages/a.html"), "<p></p>").unwrap();

        let source = FsSource::new(dir.path().join("root"));
        assert!(!source.exists("../secret.html"));
        for path in ["../secret.html", "pages/../../secret.html", "..\\secret.html"] {
            let err = source.read(path).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::IoError, "path: {path}");
            assert!(err.to_string().contains("escapes the template root"));
        }
        assert!(source.list("..", &html()).is_err());
        assert!(source.read("./pages/a.html").is_ok());
    }
}
