//! HTML `<table>` → GitHub-flavored Markdown pipe tables.
//!
//! `htmd` 0.1 has no table support, so tables are rendered here and spliced
//! into its output through placeholder tokens.

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Text;
use scraper::{ElementRef, Node};
use uuid::Uuid;

use markbatch_shared::{MarkbatchError, Result};

use crate::document::ContentDocument;

/// A rendered table and the placeholder token standing in for it.
#[derive(Debug)]
pub(crate) struct PlacedTable {
    pub marker: String,
    pub markdown: String,
}

/// Placeholder text for the `index`-th table of one conversion. Alphanumeric
/// only, so `htmd` passes it through unescaped; `nonce` keeps it from
/// colliding with text already in the document.
fn placeholder(nonce: &str, index: usize) -> String {
    format!("MARKBATCHTABLE{nonce}N{index}END")
}

/// Render every outermost table, swap it for a placeholder text node, and
/// return the rendered tables in document order.
pub(crate) fn extract_tables(
    doc: &mut ContentDocument,
    cells: &htmd::HtmlToMarkdown,
) -> Result<Vec<PlacedTable>> {
    let mut tables = Vec::new();
    for el in doc.html.root_element().descendants().filter_map(ElementRef::wrap) {
        if el.value().name() == "table" && !inside_table(&el) {
            tables.push((el.id(), render_table(&el, cells)?));
        }
    }

    let nonce = Uuid::now_v7().simple().to_string();
    let mut placed = Vec::with_capacity(tables.len());
    for (index, (id, markdown)) in tables.into_iter().enumerate() {
        let marker = placeholder(&nonce, index);
        if let Some(mut node) = doc.html.tree.get_mut(id) {
            node.insert_before(Node::Text(Text {
                text: marker.as_str().into(),
            }));
            node.detach();
        }
        placed.push(PlacedTable {
            marker,
            markdown: markdown.unwrap_or_default(),
        });
    }

    Ok(placed)
}

/// Replace the first occurrence of `table.marker` in `md` with the rendered
/// table as its own block. Inside a list item the table is indented to the
/// item's content column so it stays part of the item.
pub(crate) fn splice(md: &str, table: &PlacedTable) -> String {
    static ITEM_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^[ \t]*(?:[-*+]|\d+[.)])[ \t]+").expect("valid regex")
    });

    let Some(pos) = md.find(&table.marker) else {
        return md.to_string();
    };
    let line_start = md[..pos].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &md[line_start..pos];

    let item_prefix = ITEM_PREFIX_RE.find(prefix).map(|m| m.end());
    let indent = item_prefix.unwrap_or(prefix.len() - prefix.trim_start().len());
    let pad = " ".repeat(indent);

    let opening = if item_prefix == Some(prefix.len()) {
        String::new()
    } else {
        format!("\n\n{pad}")
    };
    let body = table
        .markdown
        .trim_end_matches('\n')
        .replace('\n', &format!("\n{pad}"));

    format!(
        "{}{opening}{body}\n\n{pad}{}",
        &md[..pos],
        &md[pos + table.marker.len()..]
    )
}

fn inside_table(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "table")
}

/// Render one table. Returns `None` when it has no cells at all.
pub(crate) fn render_table(
    table: &ElementRef<'_>,
    cells: &htmd::HtmlToMarkdown,
) -> Result<Option<String>> {
    let rows = table_rows(table);
    let Some((header, body)) = rows.split_first() else {
        return Ok(None);
    };

    let header = render_row(header, cells)?;
    let columns = header.len();

    let mut md = String::new();
    push_row(&mut md, &header, columns);
    push_row(&mut md, &vec!["---".to_string(); columns], columns);
    for row in body {
        push_row(&mut md, &render_row(row, cells)?, columns);
    }

    Ok(Some(md))
}

/// Rows carrying at least one cell, `thead` rows first, then everything
/// else in document order. The first entry is the header row.
fn table_rows<'a>(table: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut head = Vec::new();
    let mut rest = Vec::new();

    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "thead" => head.extend(child_rows(child)),
            "tbody" | "tfoot" => rest.extend(child_rows(child)),
            "tr" => rest.push(child),
            _ => {}
        }
    }

    head.into_iter()
        .chain(rest)
        .filter(|tr| row_cells(*tr).next().is_some())
        .collect()
}

fn child_rows<'a>(section: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    section
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
}

fn row_cells<'a>(tr: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "th" | "td"))
}

fn render_row(tr: &ElementRef<'_>, cells: &htmd::HtmlToMarkdown) -> Result<Vec<String>> {
    row_cells(*tr).map(|cell| render_cell(&cell, cells)).collect()
}

/// Inline Markdown for one cell: formatting kept, block structure flattened
/// onto a single line, pipes escaped.
fn render_cell(cell: &ElementRef<'_>, cells: &htmd::HtmlToMarkdown) -> Result<String> {
    let md = cells
        .convert(&cell.inner_html())
        .map_err(|e| MarkbatchError::Conversion(format!("table cell conversion failed: {e}")))?;
    let flat = md.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(escape_pipes(&flat))
}

/// Escape every `|` not already preceded by an escaping backslash.
pub(crate) fn escape_pipes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut escaped = false;
    for c in text.chars() {
        if c == '|' && !escaped {
            out.push('\\');
        }
        out.push(c);
        escaped = c == '\\' && !escaped;
    }
    out
}

/// Append `| a | b |`, padded or truncated to `columns` cells.
fn push_row(md: &mut String, cells: &[String], columns: usize) {
    md.push('|');
    for i in 0..columns {
        md.push(' ');
        md.push_str(cells.get(i).map(String::as_str).unwrap_or(""));
        md.push_str(" |");
    }
    md.push('\n');
}
