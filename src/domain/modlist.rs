//! Shareable modlist files.
//!
//! The current format is plain text grouped by category:
//!
//! ```text
//! [CAMO]
//! https://live.warthunder.com/dl/...
//! [SIGHT]
//! https://live.warthunder.com/dl/...
//! ```
//!
//! Older releases wrote `{"mods": [...]}` JSON, which is still read.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use super::model::{Category, MasterEntry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModlistError {
    #[error("invalid modlist JSON: {0}")]
    Json(String),

    #[error("modlist JSON must be an object with a \"mods\" array")]
    Shape,

    #[error("invalid modlist entry #{index}: {reason}")]
    Entry { index: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModlistFormat {
    Text,
    LegacyJson,
}

impl ModlistFormat {
    /// `.txt` files are text; anything else is treated as legacy JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("txt") => ModlistFormat::Text,
            _ => ModlistFormat::LegacyJson,
        }
    }
}

/// Entries read before the end of input or the first malformed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub entries: Vec<MasterEntry>,
    pub error: Option<ModlistError>,
}

#[cfg(test)]
impl Decoded {
    pub fn into_result(self) -> Result<Vec<MasterEntry>, ModlistError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.entries),
        }
    }
}

/// Grouped text form. Empty categories and unknown entries are left out.
pub fn encode(entries: &[MasterEntry]) -> String {
    let mut out = String::new();
    for category in Category::KNOWN {
        let mut urls = entries
            .iter()
            .filter(|entry| entry.category == category)
            .map(|entry| entry.url.as_str())
            .peekable();

        if urls.peek().is_none() {
            continue;
        }
        if let Some(header) = category.header() {
            out.push_str(header);
            out.push('\n');
        }
        for url in urls {
            out.push_str(url);
            out.push('\n');
        }
    }
    out
}

pub fn decode(input: &str, format: ModlistFormat) -> Decoded {
    match format {
        ModlistFormat::Text => Decoded {
            entries: decode_text(input),
            error: None,
        },
        ModlistFormat::LegacyJson => decode_legacy_json(input),
    }
}

/// Urls are attributed to the most recent header; urls before any header are dropped.
pub fn decode_text(input: &str) -> Vec<MasterEntry> {
    let mut current = None;
    let mut entries = Vec::new();

    for line in input.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(category) = Category::from_header(line) {
            current = Some(category);
        } else if line.starts_with("http") {
            if let Some(category) = current {
                entries.push(MasterEntry::new(line, category));
            }
        }
    }
    entries
}

pub fn decode_legacy_json(input: &str) -> Decoded {
    let failed = |error| Decoded {
        entries: Vec::new(),
        error: Some(error),
    };

    let document: Value = match serde_json::from_str(input) {
        Ok(value) => value,
        Err(e) => return failed(ModlistError::Json(e.to_string())),
    };
    let Value::Object(map) = document else {
        return failed(ModlistError::Shape);
    };

    let mods = match map.get("mods") {
        None | Some(Value::Null) => return Decoded { entries: Vec::new(), error: None },
        Some(Value::Array(mods)) => mods,
        Some(_) => return failed(ModlistError::Shape),
    };

    let mut entries = Vec::with_capacity(mods.len());
    for (index, value) in mods.iter().enumerate() {
        match serde_json::from_value::<MasterEntry>(value.clone()) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                return Decoded {
                    entries,
                    error: Some(ModlistError::Entry {
                        index,
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    Decoded {
        entries,
        error: None,
    }
}
