//! HTML-to-text cleaning for email bodies.
//!
//! Mail bodies arrive as HTML more often than not. [`html_to_text`] strips
//! markup down to readable plain text: script/style subtrees are dropped,
//! block-level boundaries become newlines, entities are unescaped, and
//! whitespace is collapsed.
//!
//! Real mail HTML is frequently malformed, so the event-driven scan falls
//! back to a forgiving tag stripper whenever the parser gives up partway.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Tags whose entire subtree is invisible text.
const SKIP_TAGS: [&str; 4] = ["script", "style", "head", "title"];

/// Tags that terminate a visual block; a newline replaces them.
const BLOCK_TAGS: [&str; 15] = [
    "p", "div", "br", "hr", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Convert HTML content to cleaned plain text.
///
/// Already-plain bodies pass through with only whitespace normalization.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    match scan_events(html) {
        Some(text) => collapse_whitespace(&text),
        None => collapse_whitespace(&strip_tags(html)),
    }
}

/// Event-driven pass. Returns `None` when the input is malformed beyond
/// what the parser tolerates, signalling the fallback.
fn scan_events(html: &str) -> Option<String> {
    let mut reader = Reader::from_reader(html.as_bytes());
    let config = reader.config_mut();
    config.check_end_names = false;
    config.trim_text(true);

    let mut out = String::new();
    let mut skip_depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if SKIP_TAGS.contains(&name.as_str()) {
                    skip_depth += 1;
                } else if skip_depth == 0 && BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if SKIP_TAGS.contains(&name.as_str()) {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if skip_depth == 0 && BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if skip_depth == 0 && BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
            }
            Ok(Event::Text(t)) => {
                if skip_depth == 0 {
                    match t.unescape() {
                        Ok(text) => out.push_str(&text),
                        Err(_) => out.push_str(&String::from_utf8_lossy(t.as_ref())),
                    }
                    out.push(' ');
                }
            }
            Ok(Event::CData(c)) => {
                if skip_depth == 0 {
                    out.push_str(&String::from_utf8_lossy(c.as_ref()));
                    out.push(' ');
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
        buf.clear();
    }

    Some(out)
}

/// Forgiving fallback: drop `<...>` runs, skip script/style blocks, decode
/// the entities that actually occur in mail.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    // ASCII-only fold keeps byte offsets aligned with the original.
    let lower = html.to_ascii_lowercase();
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'<' {
            // Skip invisible subtrees wholesale.
            let mut skipped = false;
            for tag in SKIP_TAGS {
                let open = format!("<{tag}");
                if lower[i..].starts_with(&open) {
                    let close = format!("</{tag}");
                    if let Some(rel) = lower[i..].find(&close) {
                        let after = i + rel;
                        i = match lower[after..].find('>') {
                            Some(gt) => after + gt + 1,
                            None => bytes.len(),
                        };
                    } else {
                        i = bytes.len();
                    }
                    skipped = true;
                    break;
                }
            }
            if skipped {
                continue;
            }

            // Ordinary tag: consume to '>' and substitute a separator.
            let end = match lower[i..].find('>') {
                Some(gt) => i + gt + 1,
                None => bytes.len(),
            };
            for tag in BLOCK_TAGS {
                if lower[i + 1..].starts_with(tag) || lower[i + 1..].starts_with(&format!("/{tag}"))
                {
                    out.push('\n');
                    break;
                }
            }
            i = end;
        } else if bytes[i] == b'&' {
            let (decoded, consumed) = decode_entity(&html[i..]);
            out.push_str(&decoded);
            i += consumed;
        } else {
            let ch = html[i..].chars().next().unwrap_or(' ');
            out.push(ch);
            i += ch.len_utf8();
        }
    }

    out
}

/// Decode one entity at the start of `s`; returns (text, bytes consumed).
fn decode_entity(s: &str) -> (String, usize) {
    let window = &s.as_bytes()[..s.len().min(12)];
    let semicolon = match window.iter().position(|&b| b == b';') {
        Some(pos) => pos,
        None => return ("&".to_string(), 1),
    };
    let entity = match s.get(1..semicolon) {
        Some(entity) => entity,
        None => return ("&".to_string(), 1),
    };

    let decoded = match entity {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "quot" => Some("\"".to_string()),
        "apos" => Some("'".to_string()),
        "nbsp" => Some(" ".to_string()),
        _ => entity.strip_prefix('#').and_then(|num| {
            let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                num.parse::<u32>().ok()
            };
            code.and_then(char::from_u32).map(String::from)
        }),
    };

    match decoded {
        Some(text) => (text, semicolon + 1),
        None => ("&".to_string(), 1),
    }
}

/// Collapse horizontal whitespace runs, cap blank lines at one, trim edges.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_newlines = 0usize;
    let mut pending_space = false;

    for ch in text.chars() {
        match ch {
            '\n' | '\r' => {
                pending_newlines += 1;
                pending_space = false;
            }
            c if c.is_whitespace() => pending_space = true,
            c => {
                if pending_newlines > 0 && !out.is_empty() {
                    out.push('\n');
                    if pending_newlines > 1 {
                        out.push('\n');
                    }
                } else if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_newlines = 0;
                pending_space = false;
                out.push(c);
            }
        }
    }

    out
}
