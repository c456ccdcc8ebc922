//! Location parsing and output-path derivation.
//!
//! A location is `scheme://container/object/path`. Output Markdown lands in a
//! `markdown/` directory next to the source object, in the same container.

use std::fmt;

use markbatch_shared::{MarkbatchError, Result};

/// Directory, relative to the source object, that receives Markdown output.
pub const OUTPUT_DIR: &str = "markdown";

/// A parsed `(container, object_path)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub scheme: String,
    pub container: String,
    pub object_path: String,
}

impl Location {
    /// Whether the object carries a `.gz` suffix (any case).
    pub fn is_compressed(&self) -> bool {
        strip_suffix_ci(&self.object_path, ".gz").is_some()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.container, self.object_path)
    }
}

/// Parses location strings for one scheme and maps sources to outputs.
#[derive(Debug, Clone)]
pub struct PathResolver {
    scheme: String,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new("gs")
    }
}

impl PathResolver {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Parse `scheme://container/object_path`. Both parts must be non-empty.
    pub fn parse(&self, location: &str) -> Result<Location> {
        let rest = location
            .strip_prefix(self.scheme.as_str())
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| {
                MarkbatchError::invalid_path(format!(
                    "{location:?} does not start with {}://",
                    self.scheme
                ))
            })?;

        let (container, object_path) = rest.split_once('/').ok_or_else(|| {
            MarkbatchError::invalid_path(format!("{location:?} has no object path"))
        })?;

        if container.is_empty() {
            return Err(MarkbatchError::invalid_path(format!(
                "{location:?} has an empty container"
            )));
        }
        if object_path.is_empty() {
            return Err(MarkbatchError::invalid_path(format!(
                "{location:?} has an empty object path"
            )));
        }

        Ok(Location {
            scheme: self.scheme.clone(),
            container: container.to_string(),
            object_path: object_path.to_string(),
        })
    }

    /// The Markdown output location for `source`.
    ///
    /// `docs/page.html.gz` → `docs/markdown/page.md`. A trailing `.gz` and then
    /// `.html`/`.htm` are stripped (any case); when neither was present the
    /// last extension, if any, is dropped instead.
    pub fn output_for(&self, source: &Location) -> Result<Location> {
        let (parent, filename) = match source.object_path.rsplit_once('/') {
            Some((parent, filename)) => (parent, filename),
            None => ("", source.object_path.as_str()),
        };

        if filename.is_empty() {
            return Err(MarkbatchError::invalid_path(format!(
                "{source} has no filename"
            )));
        }

        let stem = output_stem(filename);
        if stem.is_empty() {
            return Err(MarkbatchError::invalid_path(format!(
                "{source} has an empty file stem"
            )));
        }

        let object_path = if parent.is_empty() {
            format!("{OUTPUT_DIR}/{stem}.md")
        } else {
            format!("{parent}/{OUTPUT_DIR}/{stem}.md")
        };

        Ok(Location {
            scheme: source.scheme.clone(),
            container: source.container.clone(),
            object_path,
        })
    }

    /// String form of [`parse`](Self::parse) followed by [`output_for`](Self::output_for).
    pub fn derive_output_location(&self, source: &str) -> Result<String> {
        let location = self.parse(source)?;
        Ok(self.output_for(&location)?.to_string())
    }
}

fn output_stem(filename: &str) -> &str {
    let mut stem = filename;
    let mut known_suffix = false;

    if let Some(s) = strip_suffix_ci(stem, ".gz") {
        stem = s;
        known_suffix = true;
    }
    for ext in [".html", ".htm"] {
        if let Some(s) = strip_suffix_ci(stem, ext) {
            stem = s;
            known_suffix = true;
            break;
        }
    }
    if !known_suffix {
        if let Some((s, _)) = stem.rsplit_once('.') {
            stem = s;
        }
    }

    stem
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = s.len().checked_sub(suffix.len())?;
    if s.is_char_boundary(cut) && s[cut..].eq_ignore_ascii_case(suffix) {
        Some(&s[..cut])
    } else {
        None
    }
}
