//! Bracket-group event filters.
//!
//! `[create:ok,delete:error]::todo` stands for `create:ok::todo` and
//! `delete:error::todo`. Text outside the brackets is kept on every entry.

use crate::utils;
use crate::CompileError;

/// Result of expanding one raw filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub entries: Vec<String>,
    /// Whether a bracket group was found.
    pub matched_bracket: bool,
}

/// Expand a bracket group into independent `event:state` entries.
///
/// Without brackets the input comes back unchanged as a single entry.
/// Every bracket value must match `event:(ok|error|pending|done)`.
pub fn expand(raw: &str) -> Result<Expansion, CompileError> {
    let Some(open) = raw.find('[') else {
        return Ok(Expansion {
            entries: vec![raw.to_owned()],
            matched_bracket: false,
        });
    };
    let close = raw[open..]
        .find(']')
        .map(|offset| open + offset)
        .ok_or_else(|| CompileError::FilterFormat {
            raw: raw.to_owned(),
        })?;

    let before = &raw[..open];
    let after = &raw[close + 1..];
    let values: Vec<&str> = raw[open + 1..close].split(',').map(str::trim).collect();

    if values.iter().any(|v| !utils::is_valid_filter_value(v)) {
        return Err(CompileError::FilterFormat {
            raw: raw.to_owned(),
        });
    }

    Ok(Expansion {
        entries: values
            .into_iter()
            .map(|value| format!("{before}{value}{after}"))
            .collect(),
        matched_bracket: true,
    })
}

/// Expand `raw`, falling back to the raw string as one entry when the
/// bracket group is malformed.
pub fn expand_lossy(raw: &str) -> Vec<String> {
    match expand(raw) {
        Ok(expansion) => expansion.entries,
        Err(err) => {
            log::warn!("{err}; treating `{raw}` as a single filter");
            vec![raw.to_owned()]
        }
    }
}
