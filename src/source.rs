//! Source units: one analyzed file's text plus its content fingerprint.

use std::fs;
use std::path::Path;

/// Immutable wrapper around one file's text.
///
/// The fingerprint is a blake3 hex digest of the text and, together with the
/// rule-set fingerprint, keys the result cache: same bytes, same violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: String,
    text: String,
    fingerprint: String,
}

impl SourceUnit {
    /// Wrap already-loaded source text.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let fingerprint = fingerprint_of(&text);
        Self {
            path: path.into(),
            text,
            fingerprint,
        }
    }

    /// Read a file from disk. Fails on I/O errors or non-UTF-8 content.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Ok(Self::new(path.to_string_lossy().to_string(), text))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Content fingerprint used for cache keying.
pub fn fingerprint_of(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
