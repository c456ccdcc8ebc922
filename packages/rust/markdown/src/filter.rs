//! DOM-level removal of page chrome before conversion.
//!
//! Noise is described by a fixed table of [`Rule`]s. Each rule tests one field
//! of an [`ElementView`] (tag, class token, or id) against a lowercase pattern,
//! so matching is a pure predicate over typed data. Substring rules over-match
//! (a `nav` class rule also hits `canvas-wrap`).

use scraper::ElementRef;
use tracing::{debug, instrument};

use markbatch_shared::{MarkbatchError, Result};

use crate::document::ContentDocument;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Which element attribute a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Tag,
    Class,
    Id,
}

/// How a rule's pattern is compared with the field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Whole value equals the pattern.
    Exact(&'static str),
    /// Value contains the pattern anywhere.
    Contains(&'static str),
    /// Value split on `-`/`_` has a segment equal to the pattern
    /// (`ad` matches `ad-slot` and `top_ad`, not `header`).
    Segment(&'static str),
}

impl Pattern {
    fn matches(self, value: &str) -> bool {
        match self {
            Self::Exact(p) => value == p,
            Self::Contains(p) => value.contains(p),
            Self::Segment(p) => value.split(['-', '_']).any(|seg| seg == p),
        }
    }
}

/// What kind of page chrome a rule targets. Used for debug counts only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseCategory {
    Navigation,
    HeaderFooter,
    Sidebar,
    Breadcrumb,
    Social,
    Advertising,
    CookieNotice,
    Script,
}

/// A single removal rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub category: NoiseCategory,
    pub field: MatchField,
    pub pattern: Pattern,
}

impl Rule {
    const fn tag(category: NoiseCategory, name: &'static str) -> Self {
        Self {
            category,
            field: MatchField::Tag,
            pattern: Pattern::Exact(name),
        }
    }

    /// Same pattern against both class tokens and id.
    const fn attr(category: NoiseCategory, pattern: Pattern) -> [Self; 2] {
        [
            Self {
                category,
                field: MatchField::Class,
                pattern,
            },
            Self {
                category,
                field: MatchField::Id,
                pattern,
            },
        ]
    }

    /// Evaluate this rule against an element.
    pub fn matches(&self, el: &ElementView<'_>) -> bool {
        match self.field {
            MatchField::Tag => self.pattern.matches(el.tag),
            MatchField::Id => el.id.as_deref().is_some_and(|id| self.pattern.matches(id)),
            MatchField::Class => el.classes.iter().any(|c| self.pattern.matches(c)),
        }
    }
}

/// Lowercased attributes of one element, the only input rules see.
#[derive(Debug)]
pub struct ElementView<'a> {
    pub tag: &'a str,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl<'a> ElementView<'a> {
    pub fn of(el: &ElementRef<'a>) -> Self {
        let value = el.value();
        Self {
            tag: value.name(),
            id: value.id().map(str::to_ascii_lowercase),
            classes: value.classes().map(str::to_ascii_lowercase).collect(),
        }
    }
}

/// The built-in rule table, in evaluation order.
pub fn default_rules() -> Vec<Rule> {
    use NoiseCategory::*;
    use Pattern::*;

    let mut rules = vec![
        Rule::tag(Navigation, "nav"),
        Rule::tag(HeaderFooter, "header"),
        Rule::tag(HeaderFooter, "footer"),
        Rule::tag(Sidebar, "aside"),
        Rule::tag(Script, "script"),
        Rule::tag(Script, "style"),
        Rule::tag(Script, "noscript"),
        Rule::tag(Script, "template"),
    ];

    let attr_rules = [
        (Navigation, Contains("nav")),
        (Navigation, Contains("menu")),
        (HeaderFooter, Contains("footer")),
        (HeaderFooter, Contains("site-header")),
        (HeaderFooter, Contains("page-header")),
        (HeaderFooter, Contains("masthead")),
        (Sidebar, Contains("sidebar")),
        (Breadcrumb, Contains("breadcrumb")),
        (Social, Contains("social")),
        (Social, Contains("share")),
        (Social, Contains("sharing")),
        (Advertising, Contains("advert")),
        (Advertising, Contains("sponsor")),
        (Advertising, Segment("ad")),
        (Advertising, Segment("ads")),
        (CookieNotice, Contains("cookie")),
        (CookieNotice, Contains("consent")),
    ];
    for (category, pattern) in attr_rules {
        rules.extend(Rule::attr(category, pattern));
    }

    rules
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// How the HTML parser's error reports are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Recover from anything; never fail on markup.
    #[default]
    Tolerant,
    /// Fail cleaning when the parser reported any error.
    Strict,
}

/// Never removed, whatever their attributes say.
const SKELETON: &[&str] = &["html", "head", "body"];

/// Removed when they end up with no text and nothing in [`KEEP_WHEN_EMPTY`].
const PRUNABLE: &[&str] = &[
    "p", "div", "span", "section", "article", "main", "li", "ul", "ol", "a", "strong", "em", "b",
    "i", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "figure",
];

/// Content that carries meaning without text.
const KEEP_WHEN_EMPTY: &[&str] = &[
    "img", "br", "hr", "table", "iframe", "video", "audio", "picture", "svg", "input", "embed",
    "object",
];

/// Removes navigation, ads, scripts, and other non-content subtrees.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    rules: Vec<Rule>,
    mode: ParseMode,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(ParseMode::Tolerant)
    }
}

impl ContentFilter {
    /// A filter with the built-in rule table.
    pub fn new(mode: ParseMode) -> Self {
        Self::with_rules(default_rules(), mode)
    }

    /// A filter with a custom rule table.
    pub fn with_rules(rules: Vec<Rule>, mode: ParseMode) -> Self {
        Self { rules, mode }
    }

    /// Decode raw bytes as UTF-8 (a leading BOM is skipped) and clean them.
    pub fn clean_bytes(&self, raw: &[u8]) -> Result<ContentDocument> {
        let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
        let html = std::str::from_utf8(raw).map_err(|e| {
            MarkbatchError::Cleaning(format!("document is not valid UTF-8: {e}"))
        })?;
        self.clean(html)
    }

    /// Parse `html` and strip noise, comments, and emptied elements.
    #[instrument(skip_all, fields(len = html.len()))]
    pub fn clean(&self, html: &str) -> Result<ContentDocument> {
        if html.trim().is_empty() {
            return Ok(ContentDocument::empty());
        }

        let mut doc = ContentDocument::parse(html);

        if self.mode == ParseMode::Strict && !doc.html.errors.is_empty() {
            return Err(MarkbatchError::Cleaning(format!(
                "{} parse error(s), first: {}",
                doc.html.errors.len(),
                doc.html.errors[0]
            )));
        }

        // Pass 1: rule-matched noise. Must run before pruning, which relies
        // on noise already being gone.
        let noise: Vec<_> = doc
            .html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| self.is_noise(el))
            .map(|el| el.id())
            .collect();
        let noise_count = noise.len();
        for id in noise {
            if let Some(mut node) = doc.html.tree.get_mut(id) {
                node.detach();
            }
        }

        let comments: Vec<_> = doc
            .html
            .tree
            .nodes()
            .filter(|n| n.value().is_comment())
            .map(|n| n.id())
            .collect();
        for id in comments {
            if let Some(mut node) = doc.html.tree.get_mut(id) {
                node.detach();
            }
        }

        // Pass 2: elements left without content.
        let empty: Vec<_> = doc
            .html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(is_empty_element)
            .map(|el| el.id())
            .collect();
        let empty_count = empty.len();
        for id in empty {
            if let Some(mut node) = doc.html.tree.get_mut(id) {
                node.detach();
            }
        }

        debug!(noise_count, empty_count, "content filter applied");
        Ok(doc)
    }

    fn is_noise(&self, el: &ElementRef<'_>) -> bool {
        let view = ElementView::of(el);
        if SKELETON.contains(&view.tag) {
            return false;
        }
        match self.rules.iter().find(|r| r.matches(&view)) {
            Some(rule) => {
                debug!(tag = view.tag, category = ?rule.category, "removing noise element");
                true
            }
            None => false,
        }
    }
}

fn is_empty_element(el: &ElementRef<'_>) -> bool {
    if !PRUNABLE.contains(&el.value().name()) {
        return false;
    }
    if el.text().any(|t| !t.trim().is_empty()) {
        return false;
    }
    !el.descendants()
        .filter_map(ElementRef::wrap)
        .any(|d| KEEP_WHEN_EMPTY.contains(&d.value().name()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned(html: &str) -> String {
        ContentFilter::default()
            .clean(html)
            .expect("tolerant cleaning never fails")
            .body_html()
    }

    #[test]
    fn removes_nav_footer_and_script() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Title</h1><p>Body text.</p></main>
            <footer class="site-footer"><p>Copyright</p></footer>
            <script>console.log('x');</script>
        </body></html>"#;

        let body = cleaned(html);
        assert!(!body.contains("<nav"));
        assert!(!body.contains("Home"));
        assert!(!body.contains("<footer"));
        assert!(!body.contains("Copyright"));
        assert!(!body.contains("<script"));
        assert!(!body.contains("console.log"));
        assert!(body.contains("Body text."));
    }

    #[test]
    fn removes_by_class_and_id_case_insensitively() {
        let html = r#"<html><body>
            <div class="NavBar">Top navbar</div>
            <div id="Navigation">Side nav</div>
            <div class="breadcrumbs">Home / Docs</div>
            <div class="share-buttons">Share this</div>
            <div id="cookie-banner">We use cookies</div>
            <div class="sidebar-left">Sidebar content</div>
            <p>Keep me.</p>
        </body></html>"#;

        let body = cleaned(html);
        for gone in [
            "Top navbar",
            "Side nav",
            "Home / Docs",
            "Share this",
            "We use cookies",
            "Sidebar content",
        ] {
            assert!(!body.contains(gone), "{gone:?} survived: {body}");
        }
        assert!(body.contains("Keep me."));
    }

    #[test]
    fn ad_segments_match_without_hitting_lookalikes() {
        let html = r#"<html><body>
            <div class="ad-slot">Buy now</div>
            <div class="top_ads">More ads</div>
            <div class="advertisement">Sponsored</div>
            <div class="thread-reply"><p>Reply text</p></div>
            <div class="download-list"><p>Downloads here</p></div>
        </body></html>"#;

        let body = cleaned(html);
        assert!(!body.contains("Buy now"));
        assert!(!body.contains("More ads"));
        assert!(!body.contains("Sponsored"));
        assert!(body.contains("Reply text"));
        assert!(body.contains("Downloads here"));
    }

    #[test]
    fn empty_ad_div_and_emptied_parents_are_pruned() {
        let html = r#"<html><body>
            <div class="ads"></div>
            <section class="wrapper"><div class="social">Follow us</div></section>
            <ul><li><a href="/x" class="menu-link">Menu</a></li></ul>
            <p>Content</p>
        </body></html>"#;

        let body = cleaned(html);
        assert!(!body.contains("ads"));
        assert!(!body.contains("<section"), "emptied section kept: {body}");
        assert!(!body.contains("<ul"), "emptied list kept: {body}");
        assert!(!body.contains("<li"));
        assert!(body.contains("<p>Content</p>"));
    }

    #[test]
    fn empty_elements_with_media_survive() {
        let html = r#"<html><body>
            <p><img src="chart.png" alt=""></p>
            <div><br></div>
            <div><table><tr><td></td></tr></table></div>
            <span>   </span>
        </body></html>"#;

        let body = cleaned(html);
        assert!(body.contains("chart.png"));
        assert!(body.contains("<br>"));
        assert!(body.contains("<table>"));
        assert!(!body.contains("<span>"));
    }

    #[test]
    fn comments_are_removed() {
        let body = cleaned("<html><body><!-- tracking pixel --><p>Text</p></body></html>");
        assert!(!body.contains("tracking pixel"));
        assert!(body.contains("Text"));
    }

    #[test]
    fn skeleton_is_never_removed() {
        let body = cleaned(r#"<html><body class="nav-open"><p>Still here</p></body></html>"#);
        assert!(body.contains("Still here"));
    }

    #[test]
    fn empty_input_gives_empty_document() {
        let doc = ContentFilter::default().clean("   ").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn malformed_markup_is_tolerated() {
        let html = "<html><body><h1>Unclosed header<p>Para <b>bold <i>both</p></div></span>";
        let body = cleaned(html);
        assert!(body.contains("Unclosed header"));
        assert!(body.contains("both"));
    }

    #[test]
    fn strict_mode_rejects_parse_errors() {
        let filter = ContentFilter::new(ParseMode::Strict);

        let ok = filter.clean("<!DOCTYPE html><html><head></head><body><p>ok</p></body></html>");
        assert!(ok.is_ok());

        let err = filter.clean("<p>Unclosed <b>bold</div>").unwrap_err();
        assert!(matches!(err, MarkbatchError::Cleaning(_)));
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn invalid_utf8_is_a_cleaning_error() {
        let err = ContentFilter::default()
            .clean_bytes(&[0x3c, 0x70, 0x3e, 0xff, 0xfe])
            .unwrap_err();
        assert!(matches!(err, MarkbatchError::Cleaning(_)));
    }

    #[test]
    fn bom_is_skipped() {
        let doc = ContentFilter::default()
            .clean_bytes(b"\xEF\xBB\xBF<p>Hello</p>")
            .unwrap();
        assert!(doc.body_html().contains("<p>Hello</p>"));
    }

    #[test]
    fn rule_order_does_not_change_result() {
        let html = r#"<html><body>
            <nav class="sidebar">A</nav><div class="footer ad">B</div><p>C</p>
        </body></html>"#;

        let mut reversed = default_rules();
        reversed.reverse();
        let forward = ContentFilter::default().clean(html).unwrap().body_html();
        let backward = ContentFilter::with_rules(reversed, ParseMode::Tolerant)
            .clean(html)
            .unwrap()
            .body_html();
        assert_eq!(forward, backward);
    }

    #[test]
    fn pattern_kinds() {
        assert!(Pattern::Exact("nav").matches("nav"));
        assert!(!Pattern::Exact("nav").matches("navbar"));
        assert!(Pattern::Contains("nav").matches("main-navigation"));
        assert!(Pattern::Segment("ad").matches("sidebar_ad"));
        assert!(!Pattern::Segment("ad").matches("header"));
    }
}
