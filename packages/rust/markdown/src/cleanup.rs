//! Post-conversion cleanup pipeline for Markdown output.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! Every pass leaves fenced code blocks untouched.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = normalize_whitespace(&result);
    result = fix_code_block_languages(&result);
    result = strip_leftover_html(&result);
    result = tighten_lists(&result);
    result = space_headings(&result);
    result = collapse_blank_lines(&result);
    result = finish(&result);

    result
}

fn is_fence(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("```") || line.starts_with("~~~")
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_list_item(line: &str) -> bool {
    list_marker(line).is_some()
}

/// Indent and marker kind of a list item line. The kind is the bullet
/// character, or the delimiter of an ordered marker.
fn list_marker(line: &str) -> Option<(usize, char)> {
    static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^([ \t]*)(?:([-*+])|\d+([.)]))(?:\s|$)").expect("valid regex")
    });
    let caps = ITEM_RE.captures(line)?;
    let kind = caps.get(2).or_else(|| caps.get(3))?.as_str().chars().next()?;
    Some((caps[1].len(), kind))
}

fn is_heading(line: &str) -> bool {
    static HEADING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#{1,6}(?:\s|$)").expect("valid regex"));
    HEADING_RE.is_match(line)
}

/// Split into lines tagged with whether each sits inside (or opens/closes)
/// a fenced code block.
fn tag_lines(md: &str) -> Vec<(&str, bool)> {
    let mut in_code_block = false;
    md.lines()
        .map(|line| {
            if is_fence(line) {
                in_code_block = !in_code_block;
                (line, true)
            } else {
                (line, in_code_block)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pass 1: Normalize whitespace
// ---------------------------------------------------------------------------

/// Strip trailing whitespace from every line outside code blocks, except a
/// two-space hard break that runs on into the next line of text.
fn normalize_whitespace(md: &str) -> String {
    let lines = tag_lines(md);
    lines
        .iter()
        .enumerate()
        .map(|(i, &(line, code))| {
            if code {
                return line.to_string();
            }
            let trimmed = line.trim_end();
            if is_hard_break(line, trimmed) && continues_paragraph(lines.get(i + 1)) {
                format!("{trimmed}  ")
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_hard_break(line: &str, trimmed: &str) -> bool {
    !trimmed.is_empty()
        && !is_heading(trimmed)
        && line.len() - line.trim_end_matches(' ').len() >= 2
}

fn continues_paragraph(next: Option<&(&str, bool)>) -> bool {
    next.is_some_and(|&(line, code)| {
        !code && !is_blank(line) && !is_heading(line) && !is_list_item(line)
    })
}

// ---------------------------------------------------------------------------
// Pass 2: Fix code block language hints
// ---------------------------------------------------------------------------

/// Drop class-style prefixes from fence info strings.
///
/// Handles patterns like `language-js`, `lang-python`, `highlight-rust`.
fn fix_code_block_languages(md: &str) -> String {
    static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^([ \t]*(?:```|~~~))(?:language-|lang-|highlight-)([\w+#-]+)")
            .expect("valid regex")
    });

    LANG_PREFIX_RE.replace_all(md, "$1$2").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip leftover HTML
// ---------------------------------------------------------------------------

/// Remove layout tags that survived conversion, keeping their content.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)</?(?:div|span|section|article|main|aside|header|footer|nav|figure|figcaption|details|summary)(?:\s[^>]*)?/?>")
            .expect("valid regex")
    });

    tag_lines(md)
        .into_iter()
        .map(|(line, code)| {
            if code {
                line.to_string()
            } else {
                HTML_TAG_RE.replace_all(line, "").to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Tighten lists
// ---------------------------------------------------------------------------

/// Drop blank lines sitting between two consecutive items of the same list.
///
/// Items at the same indent with a different bullet or delimiter start a new
/// list, so the gap before them stays.
fn tighten_lists(md: &str) -> String {
    let lines = tag_lines(md);
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());

    for (i, &(line, code)) in lines.iter().enumerate() {
        if !code && is_blank(line) {
            let prev_item = out
                .iter()
                .rev()
                .find(|l| !is_blank(l))
                .is_some_and(|l| is_list_item(l));
            let same_list = lines[i + 1..]
                .iter()
                .find(|(l, _)| !is_blank(l))
                .filter(|&&(_, c)| !c)
                .and_then(|&(l, _)| list_marker(l))
                .is_some_and(|next| continues_list(&out, next));
            if prev_item && same_list {
                continue;
            }
        }
        out.push(line);
    }

    out.join("\n")
}

/// Whether an item with marker `next` belongs to the list already open at
/// the end of `out`.
fn continues_list(out: &[&str], next: (usize, char)) -> bool {
    let (indent, kind) = next;
    for line in out.iter().rev().filter(|l| !is_blank(l)) {
        match list_marker(line) {
            Some((i, k)) if i == indent => return k == kind,
            Some((i, _)) if i < indent => return true,
            Some(_) => {}
            None if line.starts_with([' ', '\t']) => {}
            None => return false,
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Pass 5: Space headings
// ---------------------------------------------------------------------------

/// Surround ATX headings with blank lines.
fn space_headings(md: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut after_heading = false;

    for (line, code) in tag_lines(md) {
        if after_heading && !is_blank(line) {
            out.push("");
        }
        after_heading = false;

        if !code && is_heading(line) {
            if out.last().is_some_and(|l| !is_blank(l)) {
                out.push("");
            }
            after_heading = true;
        }
        out.push(line);
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 6: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse every run of blank lines outside code blocks into one.
fn collapse_blank_lines(md: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = false;

    for (line, code) in tag_lines(md) {
        let blank = !code && is_blank(line);
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        out.push(if blank { "" } else { line });
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 7: Finish
// ---------------------------------------------------------------------------

/// Trim surrounding blank lines; non-empty output ends with exactly one newline.
fn finish(md: &str) -> String {
    let trimmed = md.trim_matches('\n');
    if trimmed.trim().is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
