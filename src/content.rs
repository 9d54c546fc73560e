//! Inbound message decoding — headers, body text, HTML flattening.

use mail_parser::{MessageParser, PartType};

/// The parts of an inbound message the scanner cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMail {
    /// Bare sender address (no display name). Empty if the From header is
    /// missing or unparseable.
    pub sender: String,
    /// Decoded subject.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
}

/// Parse a raw RFC 5322 message. Returns `None` if it cannot be parsed at all.
pub fn parse_message(raw: &[u8]) -> Option<ParsedMail> {
    let parsed = MessageParser::default().parse(raw)?;
    Some(ParsedMail {
        sender: extract_sender(&parsed),
        subject: parsed.subject().unwrap_or_default().to_string(),
        text: extract_text(&parsed),
    })
}

fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// Readable text of a parsed message.
///
/// Every `text/plain` part is used when at least one exists; otherwise the
/// `text/html` parts are flattened. Attachment-less HTML-only mail is the
/// common case for the second branch.
fn extract_text(parsed: &mail_parser::Message) -> String {
    let plain: Vec<&str> = parsed
        .parts
        .iter()
        .filter_map(|part| match &part.body {
            PartType::Text(text) => Some(text.as_ref()),
            _ => None,
        })
        .collect();
    if !plain.is_empty() {
        return plain.join("\n").trim().to_string();
    }

    let html: Vec<String> = parsed
        .parts
        .iter()
        .filter_map(|part| match &part.body {
            PartType::Html(html) => Some(flatten_html(html)),
            _ => None,
        })
        .collect();
    html.join("\n").trim().to_string()
}

/// Flatten HTML to readable text.
///
/// Tags, comments and `<script>`/`<style>` contents are dropped; text nodes are
/// trimmed, entity-decoded and joined with newlines. Attribute values never
/// reach the output.
pub fn flatten_html(html: &str) -> String {
    let mut nodes: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut rest = html;

    while !rest.is_empty() {
        if rest.starts_with("<!--") {
            flush_node(&mut text, &mut nodes);
            rest = rest.find("-->").map_or("", |i| &rest[i + 3..]);
            continue;
        }

        if starts_tag(rest) {
            flush_node(&mut text, &mut nodes);
            let end = tag_end(rest);
            let tag = &rest[..end];
            rest = &rest[end..];

            if !tag.starts_with("</") {
                let name = tag_name(tag);
                if name == "script" || name == "style" {
                    let close = format!("</{name}");
                    rest = rest
                        .to_ascii_lowercase()
                        .find(&close)
                        .map_or("", |i| &rest[i..]);
                }
            }
            continue;
        }

        let skip = rest.chars().next().map_or(1, char::len_utf8);
        let next = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
        text.push_str(&rest[..next]);
        rest = &rest[next..];
    }
    flush_node(&mut text, &mut nodes);

    nodes.join("\n")
}

fn flush_node(text: &mut String, nodes: &mut Vec<String>) {
    let decoded = decode_entities(text.trim());
    let trimmed = decoded.trim();
    if !trimmed.is_empty() {
        nodes.push(trimmed.to_string());
    }
    text.clear();
}

fn starts_tag(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
}

/// Byte index just past the closing `>` of the tag at the start of `s`,
/// ignoring any `>` inside quoted attribute values.
///
/// A quote only opens a value when it directly follows `=` (whitespace
/// allowed); a stray quote inside an unquoted value is an ordinary character.
fn tag_end(s: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut after_eq = false;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if after_eq => quote = Some(c),
            (None, '>') => return i + 1,
            _ => {}
        }
        if !c.is_whitespace() {
            after_eq = quote.is_none() && c == '=';
        }
    }
    s.len()
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi + 1)));

        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Escape text for inclusion in an HTML body.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
