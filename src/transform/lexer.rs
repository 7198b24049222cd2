// src/transform/lexer.rs

//! Just enough tokenizing for the minifiers to tell code from literals.
//!
//! [`mask`] swaps every string, template and regex literal for a
//! placeholder so whitespace and comment rules only ever see code;
//! [`Masked::restore`] puts the literals back.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{0}([0-9]+)\u{0}").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Css,
    Js,
}

/// What to do with a block comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comments {
    Keep,
    /// Keep only `/*! ... */`.
    KeepImportant,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Masked {
    pub code: String,
    literals: Vec<String>,
}

impl Masked {
    /// Substitute the original literals back into `code`.
    pub fn restore(&self, code: &str) -> String {
        PLACEHOLDER
            .replace_all(code, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| self.literals.get(i))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn hide(&mut self, literal: &str) {
        self.code.push_str(&format!("\u{0}{}\u{0}", self.literals.len()));
        self.literals.push(literal.to_string());
    }
}

/// Split `text` into code and placeholders.
///
/// Returns `None` for text that already contains NUL bytes, which the
/// placeholders rely on being absent. Dropped JS comments leave a space (or
/// a newline, for multi-line comments) so neighbouring tokens stay apart;
/// JS line comments are always dropped.
pub fn mask(text: &str, syntax: Syntax, comments: Comments) -> Option<Masked> {
    if text.contains('\u{0}') {
        return None;
    }
    let bytes = text.as_bytes();
    let mut masked = Masked {
        code: String::with_capacity(text.len()),
        literals: Vec::new(),
    };
    // Last non-whitespace byte of code, for telling a regex from division.
    let mut previous: Option<u8> = None;
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        let token = match b {
            b'/' if next == Some(b'*') => {
                let end = text[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                Some((end, Token::Comment))
            }
            b'/' if next == Some(b'/') && syntax == Syntax::Js => {
                let end = text[i..].find('\n').map_or(bytes.len(), |p| i + p);
                Some((end, Token::LineComment))
            }
            b'/' if syntax == Syntax::Js && starts_regex(previous) => {
                skip_regex(bytes, i).map(|end| (end, Token::Literal))
            }
            b'"' | b'\'' => Some((skip_quoted(bytes, i), Token::Literal)),
            b'`' if syntax == Syntax::Js => Some((skip_quoted(bytes, i), Token::Literal)),
            _ => None,
        };

        let Some((end, token)) = token else {
            if !b.is_ascii_whitespace() {
                previous = Some(b);
            }
            i += 1;
            continue;
        };

        masked.code.push_str(&text[code_start..i]);
        let slice = &text[i..end];
        match token {
            Token::Literal => {
                masked.hide(slice);
                previous = Some(b'"');
            }
            Token::Comment => {
                let keep = match comments {
                    Comments::Keep => true,
                    Comments::KeepImportant => slice.starts_with("/*!"),
                    Comments::Drop => false,
                };
                if keep {
                    masked.hide(slice);
                } else if syntax == Syntax::Js {
                    masked.code.push(if slice.contains('\n') { '\n' } else { ' ' });
                }
            }
            Token::LineComment => {}
        }
        i = end;
        code_start = end;
    }
    masked.code.push_str(&text[code_start..]);
    Some(masked)
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Literal,
    Comment,
    LineComment,
}

/// A `/` starts a regex literal when it cannot be a division operator.
///
/// Keywords such as `return /x/` are not recognised; such a regex is then
/// treated as code, which is only lossy if it contains quotes or `/*`.
fn starts_regex(previous: Option<u8>) -> bool {
    match previous {
        None => true,
        Some(b) => b"(,=:[!&|?{};+-*%<>~^".contains(&b),
    }
}

/// End of the quoted literal opening at `start`. Unterminated single-line
/// strings end at the newline; anything else runs to the end of the text.
fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' if quote != b'`' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of the regex literal opening at `start`, or `None` if the line ends
/// first.
fn skip_regex(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}
