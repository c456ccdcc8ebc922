//! HTML content filtering and HTML-to-Markdown conversion.
//!
//! [`ContentFilter`] parses raw HTML and strips non-content subtrees,
//! [`MarkdownConverter`] turns what is left into clean Markdown using the
//! `htmd` crate, with tables rendered separately and a series of cleanup
//! passes applied to the output.

mod cleanup;
mod document;
pub mod filter;
mod table;

use tracing::{debug, instrument};

use markbatch_shared::{MarkbatchError, Result};

pub use document::ContentDocument;
pub use filter::{ContentFilter, ElementView, MatchField, NoiseCategory, ParseMode, Pattern, Rule};

/// Tags `htmd` drops along with their contents.
const SKIP_TAGS: [&str; 6] = ["script", "style", "noscript", "iframe", "svg", "template"];

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Converts a filtered [`ContentDocument`] into Markdown.
#[derive(Debug, Clone)]
pub struct MarkdownConverter {
    skip_tags: Vec<&'static str>,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self {
            skip_tags: SKIP_TAGS.to_vec(),
        }
    }

    /// Convert the `<body>` content of `doc` to Markdown.
    ///
    /// 1. Renders each top-level table and swaps in a placeholder
    /// 2. Converts the body via `htmd`
    /// 3. Splices the rendered tables back in
    /// 4. Runs the cleanup pipeline
    ///
    /// An empty document yields an empty string.
    #[instrument(skip_all)]
    pub fn convert(&self, mut doc: ContentDocument) -> Result<String> {
        if doc.is_empty() {
            debug!("empty document");
            return Ok(String::new());
        }

        let converter = htmd::HtmlToMarkdown::builder()
            .skip_tags(self.skip_tags.clone())
            .build();

        let tables = table::extract_tables(&mut doc, &converter)?;

        let mut raw_markdown = converter
            .convert(&doc.body_html())
            .map_err(|e| MarkbatchError::Conversion(format!("htmd conversion failed: {e}")))?;

        for placed in &tables {
            raw_markdown = table::splice(&raw_markdown, placed);
        }

        debug!(
            raw_len = raw_markdown.len(),
            tables = tables.len(),
            "htmd conversion complete"
        );

        let markdown = cleanup::run_pipeline(&raw_markdown);

        debug!(final_len = markdown.len(), "conversion complete");

        Ok(markdown)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
