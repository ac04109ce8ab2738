// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slot extraction: the fallback diff path for components that render a
//! single HTML buffer rather than providing a template. A single
//! left-to-right, tag-name-aware pass finds every element carrying a
//! `data-slot="<id>"` attribute and extracts its inner content.
//!
//! This deliberately replaces an earlier O(n^2) extractor (re-scanning from
//! each candidate start for its matching close tag): here, one stack of open
//! tag names is threaded through a single pass, so matching a close tag to
//! its open tag is O(1) regardless of nesting depth.

/// Void elements never carry a closing tag or a `data-slot` of interest, but
/// must not be pushed onto the open-tag stack.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// An extracted slot: its id and the byte range of its inner content within
/// the original buffer (end-exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSlot {
    pub id: String,
    pub content: String,
}

struct OpenElement {
    name: String,
    /// Slot id recorded when this element's opening tag carried `data-slot`.
    slot: Option<(String, usize)>, // (id, content start offset)
}

/// Scan `html` once and return every `data-slot`-tagged subtree's inner
/// content, in document order.
pub fn extract_slots(html: &str) -> Vec<ExtractedSlot> {
    let bytes = html.as_bytes();
    let mut i = 0usize;
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut out: Vec<ExtractedSlot> = Vec::new();

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        // Comments: <!-- ... -->
        if bytes[i..].starts_with(b"<!--") {
            if let Some(end) = find(bytes, i + 4, b"-->") {
                i = end + 3;
            } else {
                break;
            }
            continue;
        }

        // Doctype / processing instructions: skip to next '>'.
        if bytes[i..].starts_with(b"<!") || bytes[i..].starts_with(b"<?") {
            if let Some(end) = find_byte(bytes, i + 1, b'>') {
                i = end + 1;
            } else {
                break;
            }
            continue;
        }

        let is_close = i + 1 < bytes.len() && bytes[i + 1] == b'/';
        let tag_start = i;
        let name_start = if is_close { i + 2 } else { i + 1 };

        let Some(tag_end) = find_tag_end(bytes, tag_start) else {
            break; // unterminated tag: stop scanning rather than panic
        };
        let tag_text = &html[tag_start..=tag_end];
        let name = tag_name(&html[name_start..tag_end.min(html.len())]);

        if is_close {
            // Pop the matching open element, closing any slot it started.
            if let Some(pos) = stack.iter().rposition(|el| el.name == name) {
                let closed: Vec<OpenElement> = stack.split_off(pos);
                for el in closed {
                    if let Some((id, start)) = el.slot {
                        out.push(ExtractedSlot { id, content: html[start..tag_start].to_owned() });
                    }
                }
            }
            i = tag_end + 1;
            continue;
        }

        let self_closing = tag_text.trim_end().ends_with("/>") || VOID_ELEMENTS.contains(&name.as_str());
        let slot_id = extract_data_slot_attr(tag_text);

        if self_closing {
            // A self-closing element can still carry a slot with empty
            // content; record and immediately close it.
            if let Some(id) = slot_id {
                out.push(ExtractedSlot { id, content: String::new() });
            }
        } else {
            stack.push(OpenElement {
                name,
                slot: slot_id.map(|id| (id, tag_end + 1)),
            });
        }

        i = tag_end + 1;
    }

    out
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

fn find_byte(haystack: &[u8], from: usize, needle: u8) -> Option<usize> {
    haystack[from.min(haystack.len())..].iter().position(|&b| b == needle).map(|p| p + from)
}

/// Find the `>` that closes the tag starting at `start` (which must point at
/// `<`), respecting quoted attribute values that may themselves contain `>`.
fn find_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Extract the bare tag name from the text between `<`/`</` and `>`.
fn tag_name(inner: &str) -> String {
    inner
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Pull `data-slot="..."` (or single-quoted) out of a raw opening-tag
/// string, if present.
fn extract_data_slot_attr(tag_text: &str) -> Option<String> {
    let needle = "data-slot=";
    let pos = tag_text.find(needle)?;
    let rest = &tag_text[pos + needle.len()..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_owned())
}
