//! Low-level HTML table scanning.
//!
//! Deliberately naive: no DOM, just case-insensitive tag scanning over the raw
//! document. Good enough for the flat statistics tables regulators publish.
//! Tag names are matched ASCII case-insensitively; lowercasing is ASCII-only so
//! byte offsets in the lowered copy line up with the original.

use super::RawTable;

/// Every top-level `<table>` in document order.
///
/// Tables nested inside another table's cells are not reported separately;
/// their text ends up in the enclosing cell.
pub fn tables(doc: &str) -> Vec<RawTable> {
    let lc = to_lowercase_fast(doc);
    let mut out = Vec::new();
    let mut from = 0;

    while let Some(el) = find_table(&lc, from) {
        out.push(parse_table(&doc[el.inner_start..el.inner_end]));
        from = el.end;
    }
    out
}

/// Replace nested tables with their flattened text.
fn flatten_nested_tables(html: &str) -> String {
    let lc = to_lowercase_fast(html);
    let mut out = String::with_capacity(html.len());
    let mut from = 0;

    while let Some(el) = find_table(&lc, from) {
        out.push_str(&html[from..el.start]);
        out.push(' ');
        out.push_str(&cell_text(&html[el.inner_start..el.inner_end]).replace('<', " "));
        out.push(' ');
        from = el.end;
    }
    out.push_str(&html[from..]);
    out
}

/// Byte span of one element: `start..end` is the whole block,
/// `inner_start..inner_end` the content between the tags.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    inner_start: usize,
    inner_end: usize,
    end: usize,
}

fn parse_table(inner: &str) -> RawTable {
    let html = flatten_nested_tables(inner);
    let lc = to_lowercase_fast(&html);
    let lc = lc.as_str();
    let mut rows: Vec<(bool, Vec<String>)> = Vec::new();
    let mut from = 0;

    while let Some(tr) = find_unnested(lc, "tr", from, &["tr"], lc.len()) {
        let cells = parse_row(&html[tr.inner_start..tr.inner_end], &lc[tr.inner_start..tr.inner_end]);
        if !cells.is_empty() {
            rows.push(cells.into_iter().fold((true, Vec::new()), |(all_th, mut acc), (is_th, text)| {
                acc.push(text);
                (all_th && is_th, acc)
            }));
        }
        from = tr.end.max(tr.start + 1);
    }

    if rows.is_empty() {
        return RawTable::default();
    }
    // Header row: first row made of <th> cells, else the first row.
    let header_idx = rows.iter().position(|(all_th, _)| *all_th).unwrap_or(0);

    let headers = rows[header_idx].1.clone();
    let body = rows
        .into_iter()
        .skip(header_idx + 1)
        .filter(|(all_th, cells)| !*all_th && cells.iter().any(|c| !c.is_empty()))
        .map(|(_, cells)| cells)
        .collect();

    RawTable { headers, rows: body }
}

/// Cells of one `<tr>` as `(is_header_cell, text)`.
fn parse_row(html: &str, lc: &str) -> Vec<(bool, String)> {
    let mut cells = Vec::new();
    let mut from = 0;

    loop {
        let td = find_unnested(lc, "td", from, &["td", "th"], lc.len());
        let th = find_unnested(lc, "th", from, &["td", "th"], lc.len());
        let (is_th, cell) = match (td, th) {
            (Some(a), Some(b)) if b.start < a.start => (true, b),
            (Some(a), _) => (false, a),
            (None, Some(b)) => (true, b),
            (None, None) => break,
        };
        let inner = &html[cell.inner_start..cell.inner_end];
        cells.push((is_th, cell_text(inner)));
        from = cell.end.max(cell.start + 1);
    }
    cells
}

/// Visible text of a cell: tags stripped, entities decoded, whitespace collapsed.
pub fn cell_text(inner: &str) -> String {
    normalize_ws(&decode_entities(&strip_tags(inner)))
}

/// Find the next `<table>` element, honouring nested tables.
fn find_table(lc: &str, from: usize) -> Option<Span> {
    let start = find_open_tag(lc, "table", from)?;
    let inner_start = lc[start..].find('>')? + start + 1;

    let mut depth = 1usize;
    let mut pos = inner_start;
    while depth > 0 {
        let next_open = find_open_tag(lc, "table", pos);
        let next_close = find_close_tag(lc, "table", pos);
        match (next_open, next_close) {
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                pos = o + 1;
            }
            (_, Some(c)) => {
                depth -= 1;
                if depth == 0 {
                    let end = lc[c..].find('>').map(|i| c + i + 1).unwrap_or(lc.len());
                    return Some(Span { start, inner_start, inner_end: c, end });
                }
                pos = c + 1;
            }
            // Unterminated table: take the rest of the document.
            (_, None) => {
                return Some(Span { start, inner_start, inner_end: lc.len(), end: lc.len() });
            }
        }
    }
    None
}

/// Find the next `<tag>` element whose closing tag may be omitted.
///
/// The content ends at the first of: its own closing tag, the next opening tag
/// of any name in `terminators`, or `limit`.
fn find_unnested(lc: &str, tag: &str, from: usize, terminators: &[&str], limit: usize) -> Option<Span> {
    let start = find_open_tag(lc, tag, from).filter(|&s| s < limit)?;
    let inner_start = (lc[start..].find('>')? + start + 1).min(limit);

    let close = find_close_tag(lc, tag, inner_start).filter(|&c| c < limit);
    let next_open = terminators
        .iter()
        .filter_map(|t| find_open_tag(lc, t, inner_start))
        .filter(|&o| o < limit)
        .min();

    let (inner_end, end) = match (close, next_open) {
        (Some(c), Some(o)) if o < c => (o, o),
        (Some(c), _) => {
            let end = lc[c..].find('>').map(|i| c + i + 1).unwrap_or(limit);
            (c, end)
        }
        (None, Some(o)) => (o, o),
        (None, None) => (limit, limit),
    };
    Some(Span { start, inner_start, inner_end, end })
}

/// Position of the next `<tag` followed by `>`, `/` or whitespace.
fn find_open_tag(lc: &str, tag: &str, from: usize) -> Option<usize> {
    find_tag(lc, &format!("<{tag}"), from)
}

fn find_close_tag(lc: &str, tag: &str, from: usize) -> Option<usize> {
    find_tag(lc, &format!("</{tag}"), from)
}

fn find_tag(lc: &str, pat: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    loop {
        let idx = lc.get(pos..)?.find(pat)? + pos;
        let after = lc.as_bytes().get(idx + pat.len()).copied();
        match after {
            None | Some(b'>') | Some(b'/') => return Some(idx),
            Some(b) if b.is_ascii_whitespace() => return Some(idx),
            // `<th` vs `<thead`, `<table` vs `<tablex`
            _ => pos = idx + pat.len(),
        }
    }
}

/// Remove all tags. `<br>` becomes a space so line-broken labels stay readable.
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    let mut tag_start = 0;

    for (i, ch) in s.char_indices() {
        match ch {
            '<' if !in_tag => {
                in_tag = true;
                tag_start = i;
            }
            '>' if in_tag => {
                in_tag = false;
                let tag = s[tag_start + 1..i].trim_start_matches('/').trim_start();
                if tag.get(..2).is_some_and(|t| t.eq_ignore_ascii_case("br")) {
                    out.push(' ');
                }
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Decode the handful of entities statistics pages actually use, plus
/// numeric character references. Unknown entities are left as-is.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi + 1)));
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some(' '),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "rsquo" => Some('\u{2019}'),
        "ndash" => Some('\u{2013}'),
        "#8377" => Some('\u{20b9}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Collapse sequences of whitespace into a single space and trim.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// ASCII-only lowercasing; keeps byte offsets stable.
pub fn to_lowercase_fast(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}
