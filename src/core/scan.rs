//! Source scanning helpers: quote-aware bracket matching over raw story text.
//!
//! All delimiters are ASCII, so scanning works on bytes and every index
//! returned is a valid `str` boundary.

/// A macro call `(name: body)` located in some text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSpan<'a> {
    /// Lower-cased macro name.
    pub name: String,
    /// Index of the opening `(`.
    pub start: usize,
    /// Index one past the closing `)`.
    pub end: usize,
    /// Text between `name:` and the closing `)`, untrimmed.
    pub body: &'a str,
}

impl MacroSpan<'_> {
    pub fn raw<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }
}

/// Whether the quote at `i` opens a string literal.
///
/// A `'` directly after a word character or closing bracket is an
/// apostrophe (`$bag's`, `l'arco`), not a quote.
pub fn is_quote_start(bytes: &[u8], i: usize) -> bool {
    match bytes[i] {
        b'"' => true,
        b'\'' => match i.checked_sub(1).map(|p| bytes[p]) {
            None => true,
            Some(prev) => !(prev.is_ascii_alphanumeric()
                || prev >= 0x80
                || matches!(prev, b'_' | b')' | b']' | b'"' | b'\'')),
        },
        _ => false,
    }
}

/// Given the index of an opening quote, returns the index one past the
/// closing quote. A backslash escapes the following character.
pub fn skip_string(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Index of the `)` matching the `(` at `open`, skipping strings.
pub fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' if is_quote_start(bytes, i) => {
                i = skip_string(bytes, i)?;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the `]` closing the hook opened at `open`.
///
/// Hook text is prose, so quotes only count inside embedded macros.
pub fn find_hook_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'[') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' if macro_name_at(text, i).is_some() => {
                i = find_matching_paren(text, i)? + 1;
                continue;
            }
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// If a macro opener `(name:` starts at `i`, returns its lower-cased name
/// and the index just past the colon.
pub fn macro_name_at(text: &str, i: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(i) != Some(&b'(') {
        return None;
    }
    let name_start = i + 1;
    if !bytes.get(name_start)?.is_ascii_alphabetic() {
        return None;
    }
    let mut j = name_start;
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || matches!(bytes[j], b'-' | b'_')) {
        j += 1;
    }
    if bytes.get(j) != Some(&b':') {
        return None;
    }
    Some((text[name_start..j].to_ascii_lowercase(), j + 1))
}

/// The complete macro call starting at `start`, if it is well formed.
pub fn macro_at(text: &str, start: usize) -> Option<MacroSpan<'_>> {
    let (name, body_start) = macro_name_at(text, start)?;
    let close = find_matching_paren(text, start)?;
    Some(MacroSpan {
        name,
        start,
        end: close + 1,
        body: &text[body_start..close],
    })
}

/// Position and name of the next macro opener at or after `from`.
pub fn next_macro_opener(text: &str, from: usize) -> Option<(usize, String)> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            if let Some((name, _)) = macro_name_at(text, i) {
                return Some((i, name));
            }
        }
        i += 1;
    }
    None
}

/// Splits a macro body on top-level commas.
///
/// Commas inside strings or nested parentheses do not split. Pieces are
/// trimmed and empty pieces dropped.
pub fn smart_split(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut piece_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' if is_quote_start(bytes, i) => {
                i = skip_string(bytes, i).unwrap_or(bytes.len());
                continue;
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&body[piece_start..i]);
                piece_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&body[piece_start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Collapses runs of whitespace to single spaces and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
