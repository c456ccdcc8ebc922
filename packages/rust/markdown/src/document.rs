//! Parsed HTML document handed from the filter to the converter.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// An in-memory HTML tree.
///
/// Produced by [`ContentFilter`](crate::ContentFilter), which removes noise
/// subtrees, and consumed by [`MarkdownConverter`](crate::MarkdownConverter).
#[derive(Debug, Clone)]
pub struct ContentDocument {
    pub(crate) html: Html,
}

impl ContentDocument {
    /// Parse a full HTML document. html5ever recovers from any input, so this
    /// never fails; parse errors are recorded on the tree.
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// A document with an empty body.
    pub fn empty() -> Self {
        Self {
            html: Html::new_document(),
        }
    }

    /// Number of recoverable errors the parser reported.
    pub fn parse_error_count(&self) -> usize {
        self.html.errors.len()
    }

    /// Borrow the underlying tree.
    pub fn as_html(&self) -> &Html {
        &self.html
    }

    /// `true` when the body holds no text and no elements.
    pub fn is_empty(&self) -> bool {
        match self.html.select(&BODY).next() {
            Some(body) => {
                body.text().all(|t| t.trim().is_empty())
                    && !body.children().any(|c| c.value().is_element())
            }
            None => true,
        }
    }

    /// Serialized HTML of the `<body>` contents, or of the whole tree when no
    /// body exists.
    pub fn body_html(&self) -> String {
        match self.html.select(&BODY).next() {
            Some(body) => body.inner_html(),
            None => self.html.html(),
        }
    }
}
