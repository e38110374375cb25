//! Canonical declaration text for API hashing.
//!
//! Comments are dropped and whitespace runs collapse to one space. Attribute
//! markers are kept: a change to `added=`/`removed=` changes the ABI, so it
//! must change the text too.

use crate::lexer::MARKER_OPEN;

pub fn canonicalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if rest.starts_with("//") {
            let end = rest.find('\n').unwrap_or(rest.len());
            rest = &rest[end..];
            pending_space = true;
            continue;
        }
        if rest.starts_with("/*") && !rest.starts_with(MARKER_OPEN) {
            let end = rest[2..].find("*/").map_or(rest.len(), |i| i + 4);
            rest = &rest[end..];
            pending_space = true;
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        if ch == '"' {
            let end = string_end(rest);
            push_token(&mut out, &rest[..end], &mut pending_space);
            rest = &rest[end..];
            continue;
        }
        let len = ch.len_utf8();
        push_token(&mut out, &rest[..len], &mut pending_space);
        rest = &rest[len..];
    }
    out
}

fn push_token(out: &mut String, token: &str, pending_space: &mut bool) {
    if *pending_space && !out.is_empty() {
        out.push(' ');
    }
    *pending_space = false;
    out.push_str(token);
}

/// Byte length of the string literal at the start of `text`, quotes included.
fn string_end(text: &str) -> usize {
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return i + 1,
            _ => escaped = false,
        }
    }
    text.len()
}
