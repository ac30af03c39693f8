//! # Fir Compiler
//!
//! Translates `x-fir-*` directives in HTML templates into canonical `@fir:`
//! event-binding attributes, extracts inline template fragments into
//! content-addressed blocks and builds the event → template index the
//! renderer uses to decide which fragments a server event re-renders.
//!
//! The crate never executes templates. It consumes raw template bytes and
//! hands rewritten bytes, named blocks and the event index to the caller.
//!
//! ```text
//! x-fir-* markup → resolver → blocks → classes → mapper → CompiledRoute
//! ```

pub mod actions;
pub mod blocks;
pub mod classes;
pub mod expression;
pub mod filter;
pub mod html;
pub mod mapper;
pub mod resolver;
pub mod route;
pub mod source;
pub mod utils;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use actions::{ActionInfo, ActionKind, ActionRegistry, CanonicalAttr};
pub use blocks::{extract_blocks, Extracted};
pub use expression::{parse, Binding, Eventexpression, Expression, State, Target};
pub use filter::expand;
pub use mapper::{EventTemplate, EventTemplates, FileParseResult};
pub use route::{compile_route, CompileOptions, CompiledRoute, RouteCache};
pub use source::{FsSource, MemorySource, TemplateSource};

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic recorded when a file is processed with degraded
/// recovery instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
            context: Some(context.into()),
        }
    }

    pub fn error(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            context: Some(context.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// CompileError
// ---------------------------------------------------------------------------

/// Coarse classification of a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    SyntaxError,
    FilterFormatError,
    MissingParameterError,
    InvalidTemplateNameError,
    DuplicateHandlerRegistration,
    HtmlError,
    IoError,
}

/// Errors raised while compiling templates.
///
/// Only `Syntax`, `MissingParameter`, `Html` and `Io` are fatal to a route
/// compile. `FilterFormat` and `InvalidTemplateName` are returned by the
/// low-level helpers but the mapper logs them and keeps going.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Syntax error in `{input}` at `{fragment}`: {message}")]
    Syntax {
        input: String,
        fragment: String,
        message: String,
    },

    #[error("Malformed event filter `{raw}`: expected [event:state,...] with state ok|error|pending|done")]
    FilterFormat { raw: String },

    #[error("Directive `{directive}`: {message}")]
    MissingParameter { directive: String, message: String },

    #[error("Invalid template name `{name}`")]
    InvalidTemplateName { name: String },

    #[error("Action handler `{name}` registered twice")]
    DuplicateHandler { name: String },

    #[error("HTML parse error at byte {position}: {message}")]
    Html { position: usize, message: String },

    #[error("Template not found: {path}")]
    TemplateNotFound { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker failed: {0}")]
    Join(String),
}

impl CompileError {
    pub(crate) fn syntax(input: &str, fragment: &str, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            input: input.to_owned(),
            fragment: fragment.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn missing_parameter(directive: &str, message: impl Into<String>) -> Self {
        CompileError::MissingParameter {
            directive: directive.to_owned(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Syntax { .. } => ErrorKind::SyntaxError,
            CompileError::FilterFormat { .. } => ErrorKind::FilterFormatError,
            CompileError::MissingParameter { .. } => ErrorKind::MissingParameterError,
            CompileError::InvalidTemplateName { .. } => ErrorKind::InvalidTemplateNameError,
            CompileError::DuplicateHandler { .. } => ErrorKind::DuplicateHandlerRegistration,
            CompileError::Html { .. } => ErrorKind::HtmlError,
            CompileError::TemplateNotFound { .. } | CompileError::Io(_) | CompileError::Join(_) => {
                ErrorKind::IoError
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Translate, extract and finalize a single template in memory.
///
/// This is the per-file pipeline of [`compile_route`] without the file
/// system and the worker pool. Fatal directive errors are returned as is.
pub fn compile_template(
    name: &str,
    content: &str,
    registry: &ActionRegistry,
) -> Result<FileParseResult, CompileError> {
    mapper::process_content(name, content, registry)
}
