//! Splits a template body into text and action segments

use serde_json::Value;

use crate::render::RenderError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A piece of template source
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Action(Action),
}

/// The inside of one `{{ ... }}` pair
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Action {
    pub line: usize,
    pub source: String,
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// Bare identifier with an optional field path, `name` or `name.sub`
    Ident(String, Vec<String>),
    /// Identifier directly followed by `(`
    Call(String),
    /// `.` or `.a.b`
    Field(Vec<String>),
    /// `$`, `$name` or `$name.a.b`; the root is the empty name
    Var(String, Vec<String>),
    Literal(Value),
    Pipe,
    LParen,
    RParen,
    Comma,
    Declare,
}

/// Split `src` into segments, applying `{{-` and `-}}` whitespace trimming
/// and dropping `{{/* */}}` comments.
pub(crate) fn segments(src: &str) -> Result<Vec<Segment>, RenderError> {
    let mut out: Vec<Segment> = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(start) = rest.find(OPEN) {
        push_text(&mut out, &rest[..start], trim_next);
        line += rest[..start].matches('\n').count();

        let after_open = &rest[start + OPEN.len()..];
        let end = find_close(after_open).ok_or_else(|| RenderError::Syntax {
            line,
            message: "unclosed action".to_string(),
        })?;
        let mut inner = &after_open[..end];
        rest = &after_open[end + CLOSE.len()..];

        let trim_left = has_left_trim(inner);
        if trim_left {
            inner = &inner[1..];
            if let Some(Segment::Text(text)) = out.last_mut() {
                let kept = text.trim_end().len();
                text.truncate(kept);
            }
        }
        trim_next = has_right_trim(inner);
        if trim_next {
            inner = &inner[..inner.len() - 1];
        }

        let action_line = line;
        line += inner.matches('\n').count();

        let body = inner.trim();
        if body.starts_with("/*") {
            if !body.ends_with("*/") {
                return Err(RenderError::Syntax {
                    line: action_line,
                    message: "unclosed comment".to_string(),
                });
            }
            continue;
        }

        out.push(Segment::Action(Action {
            line: action_line,
            source: body.to_string(),
            tokens: tokenize(body, action_line)?,
        }));
    }

    push_text(&mut out, rest, trim_next);
    Ok(out)
}

fn push_text(out: &mut Vec<Segment>, text: &str, trim_start: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    if !text.is_empty() {
        out.push(Segment::Text(text.to_string()));
    }
}

fn has_left_trim(inner: &str) -> bool {
    let mut chars = inner.chars();
    chars.next() == Some('-') && chars.next().map_or(true, char::is_whitespace)
}

fn has_right_trim(inner: &str) -> bool {
    let mut chars = inner.chars().rev();
    chars.next() == Some('-') && chars.next().map_or(false, char::is_whitespace)
}

/// Offset of the closing `}}`, skipping over quoted strings
fn find_close(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if bytes[i..].starts_with(CLOSE.as_bytes()) => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(src: &str, line: usize) -> Result<Vec<Token>, RenderError> {
    let syntax = |message: String| RenderError::Syntax { line, message };
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let read_ident = |i: &mut usize| -> String {
        let begin = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[begin..*i].iter().collect()
    };
    let read_path = |i: &mut usize| -> Vec<String> {
        let mut path = Vec::new();
        while *i + 1 < chars.len() && chars[*i] == '.' && is_ident_start(chars[*i + 1]) {
            *i += 1;
            path.push(read_ident(i));
        }
        path
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '"' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax("unterminated string".to_string())),
                        Some('"') => break,
                        Some('\\') => {
                            let escaped = match chars.get(i + 1) {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some('r') => '\r',
                                Some('\\') => '\\',
                                Some('"') => '"',
                                other => {
                                    return Err(syntax(format!("invalid escape {other:?}")))
                                }
                            };
                            value.push(escaped);
                            i += 2;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                i += 1;
                tokens.push(Token::Literal(Value::String(value)));
            }
            '`' => {
                let begin = i + 1;
                let end = chars[begin..]
                    .iter()
                    .position(|ch| *ch == '`')
                    .ok_or_else(|| syntax("unterminated raw string".to_string()))?;
                tokens.push(Token::Literal(Value::String(
                    chars[begin..begin + end].iter().collect(),
                )));
                i = begin + end + 1;
            }
            '.' => {
                let path = read_path(&mut i);
                if path.is_empty() {
                    i += 1;
                }
                tokens.push(Token::Field(path));
            }
            '$' => {
                i += 1;
                let name = read_ident(&mut i);
                let path = read_path(&mut i);
                tokens.push(Token::Var(name, path));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let begin = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[begin..i].iter().collect();
                tokens.push(Token::Literal(parse_number(&text).ok_or_else(|| {
                    syntax(format!("invalid number '{text}'"))
                })?));
            }
            c if is_ident_start(c) => {
                let name = read_ident(&mut i);
                if chars.get(i) == Some(&'(') {
                    i += 1;
                    tokens.push(Token::Call(name));
                    continue;
                }
                let path = read_path(&mut i);
                let token = match (name.as_str(), path.is_empty()) {
                    ("true", true) => Token::Literal(Value::Bool(true)),
                    ("false", true) => Token::Literal(Value::Bool(false)),
                    ("nil", true) => Token::Literal(Value::Null),
                    _ => Token::Ident(name, path),
                };
                tokens.push(token);
            }
            other => return Err(syntax(format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> Option<Value> {
    if text.contains('.') {
        let n: f64 = text.parse().ok()?;
        serde_json::Number::from_f64(n).map(Value::Number)
    } else {
        text.parse::<i64>().ok().map(Value::from)
    }
}
