/// Expression tokenizer: flat token stream with byte spans.
use thiserror::Error;

use super::scan;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unterminated string starting at byte {0}")]
    UnterminatedString(usize),
    #[error("unterminated macro starting at byte {0}")]
    UnterminatedMacro(usize),
    #[error("unexpected character '{ch}' at byte {at}")]
    Unexpected { ch: char, at: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    /// Quoted string with escapes resolved.
    Str(String),
    /// `$name`, without the sigil.
    Variable(String),
    /// Bare word: keyword, ordinal (`1st`), datatype or unknown identifier.
    Word(String),
    /// A whole `(name: body)` call; the name is lower-cased.
    Macro { name: String, body: String },
    /// The `'s` of a property access.
    Possessive,
    LParen,
    RParen,
    Plus,
    Minus,
    Ge,
    Le,
    Gt,
    Lt,
    EqEq,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w == word)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenize an expression.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < input.len() {
        let Some(c) = input[i..].chars().next() else {
            break;
        };
        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }
        let start = i;
        let kind = match c {
            '$' => {
                let name_end = scan_name(input, i + 1);
                if name_end == i + 1 {
                    return Err(LexError::Unexpected { ch: '$', at: i });
                }
                let name = input[i + 1..name_end].to_string();
                i = name_end;
                TokenKind::Variable(name)
            }
            '\'' if !scan::is_quote_start(bytes, i) => {
                // Possessive `'s` must stand alone: `$a's b`, not `$a'sb`.
                let s_follows = matches!(bytes.get(i + 1), Some(b's') | Some(b'S'));
                let word_follows = s_follows
                    && input
                        .get(i + 2..)
                        .and_then(|rest| rest.chars().next())
                        .is_some_and(is_name_char);
                if !s_follows || word_follows {
                    return Err(LexError::Unexpected { ch: '\'', at: i });
                }
                i += 2;
                TokenKind::Possessive
            }
            '"' | '\'' => {
                let end = scan::skip_string(bytes, i).ok_or(LexError::UnterminatedString(i))?;
                let text = unescape(&input[i + 1..end - 1]);
                i = end;
                TokenKind::Str(text)
            }
            '0'..='9' => {
                let mut j = i;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                if bytes.get(j) == Some(&b'.') && bytes.get(j + 1).is_some_and(u8::is_ascii_digit) {
                    j += 1;
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                }
                // Exponent: `1e5`, `2.5E-3`.
                if matches!(bytes.get(j), Some(b'e') | Some(b'E')) {
                    let sign = usize::from(matches!(bytes.get(j + 1), Some(b'+') | Some(b'-')));
                    if bytes.get(j + 1 + sign).is_some_and(u8::is_ascii_digit) {
                        j += 1 + sign;
                        while j < bytes.len() && bytes[j].is_ascii_digit() {
                            j += 1;
                        }
                    }
                }
                let word_end = scan_name(input, j);
                if word_end > j {
                    // `1st`, `2nd`, ...
                    i = word_end;
                    TokenKind::Word(input[start..word_end].to_string())
                } else {
                    i = j;
                    let n = input[start..j]
                        .parse::<f64>()
                        .map_err(|_| LexError::Unexpected { ch: c, at: start })?;
                    TokenKind::Number(n)
                }
            }
            c if is_name_char(c) => {
                let end = scan_name(input, i);
                let word = input[i..end].to_string();
                i = end;
                TokenKind::Word(word)
            }
            '(' => match scan::macro_name_at(input, i) {
                Some((name, body_start)) => {
                    let close =
                        scan::find_matching_paren(input, i).ok_or(LexError::UnterminatedMacro(i))?;
                    let body = input[body_start..close].to_string();
                    i = close + 1;
                    TokenKind::Macro { name, body }
                }
                None => {
                    i += 1;
                    TokenKind::LParen
                }
            },
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            '+' => {
                i += 1;
                TokenKind::Plus
            }
            '-' => {
                i += 1;
                TokenKind::Minus
            }
            ',' => {
                i += 1;
                TokenKind::Comma
            }
            '>' | '<' => {
                let or_equal = bytes.get(i + 1) == Some(&b'=');
                i += if or_equal { 2 } else { 1 };
                match (c, or_equal) {
                    ('>', true) => TokenKind::Ge,
                    ('>', false) => TokenKind::Gt,
                    ('<', true) => TokenKind::Le,
                    _ => TokenKind::Lt,
                }
            }
            '=' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::EqEq
            }
            other => return Err(LexError::Unexpected { ch: other, at: i }),
        };
        tokens.push(Token { kind, start, end: i });
    }

    Ok(tokens)
}

fn scan_name(input: &str, from: usize) -> usize {
    let mut end = from;
    for c in input[from..].chars() {
        if !is_name_char(c) {
            break;
        }
        end += c.len_utf8();
    }
    end
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits `text` around the first top-level occurrence of a keyword,
/// e.g. `to` in `$x to $y + 1`. Both halves are trimmed.
pub fn split_at_word<'a>(text: &'a str, word: &str) -> Result<Option<(&'a str, &'a str)>, LexError> {
    let mut depth = 0usize;
    for token in tokenize(text)? {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Word(ref w) if depth == 0 && w == word => {
                return Ok(Some((text[..token.start].trim(), text[token.end..].trim())));
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Whether `word` appears as a bare word token (not inside a string).
pub fn contains_word(text: &str, word: &str) -> Result<bool, LexError> {
    Ok(tokenize(text)?.iter().any(|t| t.is_word(word)))
}

/// Replaces every bare-word occurrence of `word` with `replacement`.
pub fn replace_word(text: &str, word: &str, replacement: &str) -> Result<String, LexError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in tokenize(text)?.iter().filter(|t| t.is_word(word)) {
        out.push_str(&text[last..token.start]);
        out.push_str(replacement);
        last = token.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}
