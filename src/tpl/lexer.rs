use crate::Result;
use crate::error::{Position, TemplateError};

/// Operators and punctuation inside `{{ }}` and `{% %}` regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Pipe,
    Colon,
    Comma,
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// Literal text, after whitespace control has been applied.
    Text(&'a str),
    OutputOpen,
    OutputClose,
    TagOpen,
    TagClose,
    Ident(&'a str),
    Str(&'a str),
    Int(i64),
    Float(f64),
    Symbol(Symbol),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// The exact source slice the token was read from.
    pub raw: &'a str,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Output,
    Tag,
}

impl Region {
    fn close(self) -> &'static str {
        match self {
            Region::Output => "}}",
            Region::Tag => "%}",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Region::Output => "output region `{{`",
            Region::Tag => "tag `{%`",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Text,
    Region {
        region: Region,
        opened: Position,
        first: bool,
        /// Set when the tag is `raw` or `comment`: the body up to this end tag
        /// is emitted as a single text token.
        verbatim: Option<&'static str>,
    },
    Verbatim {
        end_tag: &'static str,
        opened: Position,
    },
}

/// Lazy tokenizer over template source.
///
/// Yields tokens one at a time; the first error ends the stream.
pub struct Lexer<'a> {
    source: &'a str,
    cursor: usize,
    line: usize,
    column: usize,
    mode: Mode,
    /// Strip leading whitespace from the next text run (after `-}}` / `-%}`).
    trim_next: bool,
    done: bool,
}

/// Main entry point: start tokenizing `source`.
pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer::new(source)
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: 0,
            line: 1,
            column: 1,
            mode: Mode::Text,
            trim_next: false,
            done: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.cursor..]
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn advance(&mut self, n: usize) {
        for c in self.source[self.cursor..self.cursor + n].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.cursor += n;
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let skipped = rest.len() - rest.trim_start().len();
        self.advance(skipped);
    }

    fn token(&mut self, kind: TokenKind<'a>, len: usize) -> Token<'a> {
        let position = self.here();
        let raw = &self.rest()[..len];
        self.advance(len);
        Token {
            kind,
            raw,
            position,
        }
    }

    fn lex_text(&mut self) -> Result<Option<Token<'a>>> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Ok(None);
            }

            let (len, trim_before) = match find_open(rest) {
                Some(0) => match self.open_region()? {
                    Some(token) => return Ok(Some(token)),
                    // Inline comment consumed, keep scanning text.
                    None => continue,
                },
                Some(idx) => (idx, rest[idx + 2..].starts_with('-')),
                None => (rest.len(), false),
            };

            let position = self.here();
            let raw = &rest[..len];
            self.advance(len);

            let mut text = raw;
            if std::mem::take(&mut self.trim_next) {
                text = text.trim_start();
            }
            if trim_before {
                text = text.trim_end();
            }
            if text.is_empty() {
                continue;
            }
            return Ok(Some(Token {
                kind: TokenKind::Text(text),
                raw,
                position,
            }));
        }
    }

    /// Consumes `{{`, `{{-`, `{%` or `{%-`. Returns `None` for an inline
    /// comment `{% # ... %}`, which produces no tokens.
    fn open_region(&mut self) -> Result<Option<Token<'a>>> {
        let rest = self.rest();
        let position = self.here();
        let region = if rest.starts_with("{%") {
            Region::Tag
        } else {
            Region::Output
        };
        let len = if rest[2..].starts_with('-') { 3 } else { 2 };
        self.trim_next = false;

        if region == Region::Tag && rest[len..].trim_start().starts_with('#') {
            let Some(end) = rest.find("%}") else {
                return Err(TemplateError::lex(
                    format!("unterminated {}", region.describe()),
                    position,
                ));
            };
            self.trim_next = rest[..end].ends_with('-');
            self.advance(end + 2);
            return Ok(None);
        }

        let kind = match region {
            Region::Output => TokenKind::OutputOpen,
            Region::Tag => TokenKind::TagOpen,
        };
        let token = self.token(kind, len);
        self.mode = Mode::Region {
            region,
            opened: position,
            first: true,
            verbatim: None,
        };
        Ok(Some(token))
    }

    fn lex_region(&mut self) -> Result<Option<Token<'a>>> {
        let Mode::Region {
            region,
            opened,
            first,
            verbatim,
        } = self.mode
        else {
            return Ok(None);
        };

        self.skip_whitespace();
        let rest = self.rest();
        if rest.is_empty() {
            return Err(TemplateError::lex(
                format!("unterminated {}", region.describe()),
                opened,
            ));
        }

        let close = region.close();
        let trim = rest.starts_with('-') && rest[1..].starts_with(close);
        if trim || rest.starts_with(close) {
            let kind = match region {
                Region::Output => TokenKind::OutputClose,
                Region::Tag => TokenKind::TagClose,
            };
            let token = self.token(kind, if trim { 3 } else { 2 });
            self.trim_next = trim;
            self.mode = match verbatim {
                Some(end_tag) => Mode::Verbatim { end_tag, opened },
                None => Mode::Text,
            };
            return Ok(Some(token));
        }

        let position = self.here();
        let (kind, len) = scan_token(rest, position)?;
        if first {
            let verbatim = match kind {
                TokenKind::Ident("raw") if region == Region::Tag => Some("endraw"),
                TokenKind::Ident("comment") if region == Region::Tag => Some("endcomment"),
                _ => None,
            };
            self.mode = Mode::Region {
                region,
                opened,
                first: false,
                verbatim,
            };
        }
        Ok(Some(self.token(kind, len)))
    }

    fn lex_verbatim(&mut self) -> Result<Option<Token<'a>>> {
        let Mode::Verbatim { end_tag, opened } = self.mode else {
            return Ok(None);
        };
        let rest = self.rest();
        let Some((end, trim_before)) = find_end_tag(rest, end_tag) else {
            return Err(TemplateError::lex(
                format!("missing {{% {} %}}", end_tag),
                opened,
            ));
        };

        self.mode = Mode::Text;
        let position = self.here();
        let raw = &rest[..end];
        self.advance(end);

        let mut text = raw;
        if std::mem::take(&mut self.trim_next) {
            text = text.trim_start();
        }
        if trim_before {
            text = text.trim_end();
        }
        if text.is_empty() {
            return self.lex_text();
        }
        Ok(Some(Token {
            kind: TokenKind::Text(text),
            raw,
            position,
        }))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = match self.mode {
            Mode::Text => self.lex_text(),
            Mode::Region { .. } => self.lex_region(),
            Mode::Verbatim { .. } => self.lex_verbatim(),
        };
        match next {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Index of the next `{{` or `{%`.
fn find_open(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'{' && (bytes[i + 1] == b'{' || bytes[i + 1] == b'%'))
}

/// Finds `{% end_tag %}` (with optional trim markers), returning its offset and
/// whether it opens with `{%-`.
fn find_end_tag(s: &str, end_tag: &str) -> Option<(usize, bool)> {
    let mut from = 0;
    while let Some(idx) = s[from..].find("{%") {
        let start = from + idx;
        let mut after = &s[start + 2..];
        let trim_before = after.starts_with('-');
        if trim_before {
            after = &after[1..];
        }
        let after = after.trim_start();
        if let Some(tail) = after.strip_prefix(end_tag) {
            let tail = tail.trim_start();
            let tail = tail.strip_prefix('-').unwrap_or(tail);
            if tail.starts_with("%}") {
                return Some((start, trim_before));
            }
        }
        from = start + 2;
    }
    None
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Reads one token from the start of `rest` (never empty, never a close
/// delimiter). Returns the kind and its byte length.
fn scan_token(rest: &str, position: Position) -> Result<(TokenKind<'_>, usize)> {
    let bytes = rest.as_bytes();
    let first = bytes[0];

    if first == b'"' || first == b'\'' {
        return match rest[1..].find(first as char) {
            Some(end) => Ok((TokenKind::Str(&rest[1..end + 1]), end + 2)),
            None => Err(TemplateError::lex("unterminated string literal", position)),
        };
    }

    if first.is_ascii_digit() || (first == b'-' && bytes.get(1).is_some_and(u8::is_ascii_digit))
    {
        let mut len = 1;
        while bytes.get(len).is_some_and(u8::is_ascii_digit) {
            len += 1;
        }
        let is_float = bytes.get(len) == Some(&b'.')
            && bytes.get(len + 1).is_some_and(u8::is_ascii_digit);
        if is_float {
            len += 1;
            while bytes.get(len).is_some_and(u8::is_ascii_digit) {
                len += 1;
            }
            let n = rest[..len]
                .parse::<f64>()
                .map_err(|_| TemplateError::lex("invalid number literal", position))?;
            return Ok((TokenKind::Float(n), len));
        }
        return match rest[..len].parse::<i64>() {
            Ok(n) => Ok((TokenKind::Int(n), len)),
            // Out of i64 range, keep it as a float.
            Err(_) => rest[..len]
                .parse::<f64>()
                .map(|n| (TokenKind::Float(n), len))
                .map_err(|_| TemplateError::lex("invalid number literal", position)),
        };
    }

    if is_ident_start(first as char) {
        let mut len = 1;
        while let Some(&b) = bytes.get(len) {
            if !is_ident_char(b as char) {
                break;
            }
            // `name-}}`: the dash is a trim marker.
            if b == b'-' && (rest[len + 1..].starts_with("}}") || rest[len + 1..].starts_with("%}"))
            {
                break;
            }
            len += 1;
        }
        if bytes.get(len) == Some(&b'?') {
            len += 1;
        }
        return Ok((TokenKind::Ident(&rest[..len]), len));
    }

    let two = rest.get(..2).unwrap_or("");
    let symbol = match two {
        "==" => Some(Symbol::Eq),
        "!=" | "<>" => Some(Symbol::Ne),
        "<=" => Some(Symbol::Le),
        ">=" => Some(Symbol::Ge),
        ".." => Some(Symbol::DotDot),
        _ => None,
    };
    if let Some(symbol) = symbol {
        return Ok((TokenKind::Symbol(symbol), 2));
    }

    let symbol = match first {
        b'<' => Symbol::Lt,
        b'>' => Symbol::Gt,
        b'|' => Symbol::Pipe,
        b':' => Symbol::Colon,
        b',' => Symbol::Comma,
        b'.' => Symbol::Dot,
        b'[' => Symbol::LBracket,
        b']' => Symbol::RBracket,
        b'(' => Symbol::LParen,
        b')' => Symbol::RParen,
        b'=' => Symbol::Assign,
        _ => {
            let c = rest.chars().next().unwrap_or_default();
            return Err(TemplateError::lex(
                format!("unexpected character '{}'", c),
                position,
            ));
        }
    };
    Ok((TokenKind::Symbol(symbol), 1))
}
